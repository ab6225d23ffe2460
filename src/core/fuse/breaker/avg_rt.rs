use super::*;

/// Trips when the average response time of the window reaches the threshold (ms).
#[derive(Debug)]
pub struct AvgRtBreaker {
    breaker: BreakerBase,
    max_avg_rt_ms: f64,
}

impl AvgRtBreaker {
    pub fn new_with_stat(
        rule: Arc<Rule>,
        stat: Arc<BucketLeapArray>,
        listeners: StateChangeListeners,
    ) -> Self {
        let max_avg_rt_ms = rule.threshold;
        Self {
            breaker: BreakerBase::new(rule, stat, listeners),
            max_avg_rt_ms,
        }
    }
}

impl CircuitBreakerTrait for AvgRtBreaker {
    fn breaker(&self) -> &BreakerBase {
        &self.breaker
    }

    fn triggered_value(&self, window: &WindowStat) -> Option<f64> {
        let avg_rt = window.avg_rt();
        if avg_rt >= self.max_avg_rt_ms {
            Some(avg_rt)
        } else {
            None
        }
    }

    /// A slow probe fails as well as an erroneous one.
    fn probe_failure(&self, rt: u64, err_count: u64) -> Option<Arc<Snapshot>> {
        if err_count > 0 {
            Some(Arc::new(err_count))
        } else if rt as f64 >= self.max_avg_rt_ms {
            Some(Arc::new(rt))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_breaker() -> AvgRtBreaker {
        AvgRtBreaker::new_with_stat(
            Arc::new(Rule {
                resource: "abc".into(),
                grade: FuseGrade::AvgResponseTime,
                threshold: 50.0,
                ..Default::default()
            }),
            Arc::new(BucketLeapArray::new(1, 1000).unwrap()),
            Default::default(),
        )
    }

    #[test]
    fn triggered() {
        let breaker = new_breaker();
        let window = WindowStat {
            pass: 10,
            rt: 400,
            ..Default::default()
        };
        assert_eq!(breaker.triggered_value(&window), None);
        let window = WindowStat { rt: 500, ..window };
        assert_eq!(breaker.triggered_value(&window), Some(50.0));
        // no passes, no average
        assert_eq!(breaker.triggered_value(&WindowStat::default()), None);
    }

    #[test]
    fn slow_probe_fails() {
        let breaker = new_breaker();
        assert!(breaker.probe_failure(10, 0).is_none());
        assert!(breaker.probe_failure(60, 0).is_some());
        assert!(breaker.probe_failure(10, 1).is_some());
    }
}
