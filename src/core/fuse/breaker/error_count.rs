use super::*;

/// Trips when the windowed error count reaches the threshold.
#[derive(Debug)]
pub struct ErrorCountBreaker {
    breaker: BreakerBase,
    min_error_count: u64,
}

impl ErrorCountBreaker {
    pub fn new_with_stat(
        rule: Arc<Rule>,
        stat: Arc<BucketLeapArray>,
        listeners: StateChangeListeners,
    ) -> Self {
        let min_error_count = rule.threshold as u64;
        Self {
            breaker: BreakerBase::new(rule, stat, listeners),
            min_error_count,
        }
    }
}

impl CircuitBreakerTrait for ErrorCountBreaker {
    fn breaker(&self) -> &BreakerBase {
        &self.breaker
    }

    fn triggered_value(&self, window: &WindowStat) -> Option<f64> {
        if window.error >= self.min_error_count {
            Some(window.error as f64)
        } else {
            None
        }
    }
}
