use super::{Calculator, Checker, Rule, StandaloneStat};
use crate::base::{BlockType, MetricEvent, TokenResult};
use std::sync::Arc;

/// Provide a determined threshold
#[derive(Debug)]
pub struct DirectCalculator {
    threshold: f64,
}

impl DirectCalculator {
    pub fn new(threshold: f64) -> Self {
        DirectCalculator { threshold }
    }
}

impl Calculator for DirectCalculator {
    fn calculate_allowed_threshold(
        &self,
        _stat: &StandaloneStat,
        _now: u64,
        _batch_count: u32,
    ) -> f64 {
        self.threshold
    }
}

/// Directly reject
#[derive(Debug)]
pub struct RejectChecker {
    rule: Arc<Rule>,
}

impl RejectChecker {
    pub fn new(rule: Arc<Rule>) -> Self {
        RejectChecker { rule }
    }
}

impl Checker for RejectChecker {
    fn do_check(
        &self,
        stat: &StandaloneStat,
        now: u64,
        batch_count: u32,
        threshold: f64,
    ) -> TokenResult {
        let cur_count = stat
            .read_only_metric()
            .sum_with_time(now, MetricEvent::Pass) as f64;
        if cur_count + batch_count as f64 > threshold {
            TokenResult::new_blocked_with_cause(
                BlockType::Flow,
                "flow reject check blocked".into(),
                self.rule.clone(),
                Arc::new(cur_count),
            )
        } else {
            TokenResult::new_pass()
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::Controller;
    use super::*;

    fn new_controller(threshold: f64) -> Controller {
        let rule = Arc::new(Rule {
            resource: "abc".into(),
            threshold,
            ..Default::default()
        });
        Controller::new(
            rule.clone(),
            Box::new(DirectCalculator::new(threshold)),
            Box::new(RejectChecker::new(rule)),
            Arc::new(StandaloneStat::new(1, 10000).unwrap()),
        )
    }

    #[test]
    fn reject_over_threshold() {
        let tc = new_controller(10.0);
        for _ in 0..5 {
            assert!(tc.perform_checking(2).unwrap().is_pass());
        }
        let res = tc.perform_checking(1).unwrap();
        let block_err = res.block_err().unwrap();
        assert_eq!(block_err.block_type(), BlockType::Flow);
        assert_eq!(
            (*block_err.triggered_value().unwrap())
                .as_any()
                .downcast_ref::<f64>(),
            Some(&10.0)
        );
        assert_eq!(
            block_err.triggered_rule_as::<Rule>().unwrap().resource,
            "abc"
        );
    }

    #[test]
    fn zero_threshold_blocks_all() {
        let tc = new_controller(0.0);
        assert!(tc.perform_checking(1).unwrap().is_blocked());
    }

    #[test]
    fn release_gives_back() {
        let tc = new_controller(3.0);
        assert!(tc.perform_checking(3).unwrap().is_pass());
        assert!(tc.perform_checking(1).unwrap().is_blocked());
        tc.release(2);
        assert!(tc.perform_checking(2).unwrap().is_pass());
        assert!(tc.perform_checking(1).unwrap().is_blocked());
    }
}
