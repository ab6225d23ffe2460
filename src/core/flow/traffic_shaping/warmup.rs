//! `WarmUpCalculator` is based on the **Token Bucket** algorithm.
//!
//! The bucket is full after a cold start or a quiet period, and the allowed
//! threshold then sits at `threshold / cold_factor`. Passing traffic drains the
//! bucket and the threshold climbs linearly to `threshold` within
//! `warm_up_period_sec`.
use super::{Calculator, Rule, StandaloneStat};
use crate::base::MetricEvent;
use crate::{config, logging, utils};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct WarmUpCalculator {
    threshold: f64,
    cold_factor: u32,
    warning_token: u64,
    max_token: u64,
    slope: f64,
    stored_tokens: AtomicU64,
    last_filled_time: AtomicU64,
}

impl WarmUpCalculator {
    pub fn new(rule: &Rule) -> Self {
        let mut cold_factor = rule.warm_up_cold_factor;
        if cold_factor <= 1 {
            logging::warn!(
                "[WarmUpCalculator::new] Invalid warm_up_cold_factor, use default warm up cold factor value: {}",
                config::WARM_UP_COLD_FACTOR
            );
            cold_factor = config::WARM_UP_COLD_FACTOR;
        }
        let threshold = rule.threshold;
        let warm_up_period = rule.warm_up_period_sec as f64;

        let cold_factor_plus = (cold_factor + 1) as f64;
        let cold_factor_minus = (cold_factor - 1) as f64;
        let warning_token = (warm_up_period * threshold / cold_factor_minus) as u64;
        let max_token = warning_token + (2.0 * warm_up_period * threshold / cold_factor_plus) as u64;
        // a tiny threshold may leave no room between the warning line and the top
        let slope = if max_token > warning_token && threshold > 0.0 {
            cold_factor_minus / threshold / (max_token - warning_token) as f64
        } else {
            0.0
        };

        WarmUpCalculator {
            threshold,
            cold_factor,
            warning_token,
            max_token,
            slope,
            stored_tokens: AtomicU64::new(0),
            last_filled_time: AtomicU64::new(0),
        }
    }

    pub fn warning_token(&self) -> u64 {
        self.warning_token
    }

    pub fn max_token(&self) -> u64 {
        self.max_token
    }

    fn sync_token(&self, now: u64, pass_qps: f64) {
        let curr_time = now - now % 1000;

        let old_last_fill_time = self.last_filled_time.load(Ordering::SeqCst);
        if curr_time <= old_last_fill_time {
            return;
        }

        let old_value = self.stored_tokens.load(Ordering::SeqCst);
        let new_value = self.cool_down_tokens(curr_time, old_value, old_last_fill_time, pass_qps);

        if self
            .stored_tokens
            .compare_exchange(old_value, new_value, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            let consumed = pass_qps as u64;
            let prev_value = self.stored_tokens.fetch_sub(consumed, Ordering::SeqCst);
            if prev_value < consumed {
                // `prev_value < pass_qps` means that overflow has happened
                self.stored_tokens.store(0, Ordering::SeqCst);
            }
            self.last_filled_time.store(curr_time, Ordering::SeqCst);
        }
    }

    fn cool_down_tokens(&self, curr_time: u64, old_value: u64, last_time: u64, pass_qps: f64) -> u64 {
        let mut new_value = old_value;
        // Prerequisites for adding a token:
        // When token consumption is much lower than the warning line
        if old_value < self.warning_token
            || pass_qps < (self.threshold / self.cold_factor as f64).floor()
        {
            let refill = (curr_time - last_time) as f64 * self.threshold / 1000.0;
            new_value = old_value.saturating_add(refill as u64);
        }
        std::cmp::min(new_value, self.max_token)
    }
}

impl Calculator for WarmUpCalculator {
    fn calculate_allowed_threshold(&self, stat: &StandaloneStat, now: u64, _batch_count: u32) -> f64 {
        if self.threshold <= 0.0 {
            return 0.0;
        }
        let read_only_metric = stat.read_only_metric();
        let previous_qps = read_only_metric.qps_with_time(
            now.saturating_sub(read_only_metric.bucket_len_ms() as u64),
            MetricEvent::Pass,
        );
        self.sync_token(now, previous_qps);
        let rest_token = self.stored_tokens.load(Ordering::SeqCst);

        if rest_token >= self.warning_token {
            let above_token = rest_token - self.warning_token;
            // compute warning QPS
            utils::next_after(1.0 / (above_token as f64 * self.slope + 1.0 / self.threshold))
        } else {
            self.threshold
        }
    }
}

#[cfg(test)]
mod test {
    use crate::flow::ControlBehavior;
    use super::*;
    use crate::utils::curr_time_millis;

    fn warm_up_rule(threshold: f64) -> Rule {
        Rule {
            resource: "abc".into(),
            threshold,
            control_behavior: ControlBehavior::WarmUp,
            warm_up_period_sec: 10,
            warm_up_cold_factor: 3,
            ..Default::default()
        }
    }

    #[test]
    fn tokens() {
        let calculator = WarmUpCalculator::new(&warm_up_rule(100.0));
        assert_eq!(calculator.warning_token(), 500);
        assert_eq!(calculator.max_token(), 1000);
    }

    #[test]
    fn cold_start() {
        let calculator = WarmUpCalculator::new(&warm_up_rule(90.0));
        let stat = StandaloneStat::new(2, 1000).unwrap();
        let allowed = calculator.calculate_allowed_threshold(&stat, curr_time_millis(), 1);
        // a full bucket allows a third of the threshold
        assert!((allowed - 30.0).abs() < 1e-6);
    }

    #[test]
    fn warmed_up() {
        let calculator = WarmUpCalculator::new(&warm_up_rule(90.0));
        calculator.stored_tokens.store(0, Ordering::SeqCst);
        let now = curr_time_millis();
        calculator
            .last_filled_time
            .store(now - now % 1000, Ordering::SeqCst);
        let stat = StandaloneStat::new(2, 1000).unwrap();
        let allowed = calculator.calculate_allowed_threshold(&stat, now, 1);
        assert!((allowed - 90.0).abs() < 1e-6);
    }

    #[test]
    fn tiny_threshold() {
        let calculator = WarmUpCalculator::new(&Rule {
            warm_up_period_sec: 1,
            ..warm_up_rule(0.5)
        });
        let stat = StandaloneStat::new(2, 1000).unwrap();
        let allowed = calculator.calculate_allowed_threshold(&stat, curr_time_millis(), 1);
        assert!(allowed.is_finite());
        assert!(allowed <= 0.5 + 1e-6);
    }
}
