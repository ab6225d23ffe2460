use super::*;

/// Trips when `errors / passes` of the window reaches the threshold.
#[derive(Debug)]
pub struct ErrorRatioBreaker {
    breaker: BreakerBase,
    error_ratio_threshold: f64,
}

impl ErrorRatioBreaker {
    pub fn new_with_stat(
        rule: Arc<Rule>,
        stat: Arc<BucketLeapArray>,
        listeners: StateChangeListeners,
    ) -> Self {
        let error_ratio_threshold = rule.threshold;
        Self {
            breaker: BreakerBase::new(rule, stat, listeners),
            error_ratio_threshold,
        }
    }
}

impl CircuitBreakerTrait for ErrorRatioBreaker {
    fn breaker(&self) -> &BreakerBase {
        &self.breaker
    }

    fn triggered_value(&self, window: &WindowStat) -> Option<f64> {
        let error_ratio = window.error_ratio();
        if error_ratio >= self.error_ratio_threshold {
            Some(error_ratio)
        } else {
            None
        }
    }
}
