//! Traffic Shaping Policy

/// Default calculator and checker
pub mod default;
/// Warm Up calculator
pub mod warmup;

pub use default::*;
pub use warmup::*;

use super::Rule;
use crate::base::{MetricEvent, TokenResult};
use crate::stat::{BucketLeapArray, SlidingWindowMetric};
use crate::utils::curr_time_millis;
use crate::Result;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Traffic Shaping `Calculator` calculates the actual traffic shaping threshold
/// based on the threshold of rule and the traffic shaping strategy.
pub trait Calculator: Send + Sync + fmt::Debug {
    fn calculate_allowed_threshold(&self, stat: &StandaloneStat, now: u64, batch_count: u32)
        -> f64;
}

/// Traffic Shaping `Checker` performs checking according to current metrics and the traffic
/// shaping strategy, then yield the token result.
pub trait Checker: Send + Sync + fmt::Debug {
    fn do_check(
        &self,
        stat: &StandaloneStat,
        now: u64,
        batch_count: u32,
        threshold: f64,
    ) -> TokenResult;
}

/// StandaloneStat is the independent statistic of a Traffic Shaping Controller.
/// It only counts the passes admitted by its controller.
#[derive(Debug)]
pub struct StandaloneStat {
    read_only_metric: Arc<SlidingWindowMetric>,
    write_only_metric: Arc<BucketLeapArray>,
}

impl StandaloneStat {
    pub fn new(sample_count: u32, interval_ms: u32) -> Result<Self> {
        let write_only_metric = Arc::new(BucketLeapArray::new(sample_count, interval_ms)?);
        let read_only_metric = Arc::new(SlidingWindowMetric::new(
            sample_count,
            interval_ms,
            write_only_metric.clone(),
        )?);
        Ok(StandaloneStat {
            read_only_metric,
            write_only_metric,
        })
    }

    pub fn read_only_metric(&self) -> &Arc<SlidingWindowMetric> {
        &self.read_only_metric
    }

    pub fn write_only_metric(&self) -> &Arc<BucketLeapArray> {
        &self.write_only_metric
    }
}

/// Controller binds a flow rule to its calculator, checker and statistic.
#[derive(Debug)]
pub struct Controller {
    rule: Arc<Rule>,
    calculator: Box<dyn Calculator>,
    checker: Box<dyn Checker>,
    /// stat is the statistic of current Traffic Shaping Controller
    stat: Arc<StandaloneStat>,
    /// serializes check-and-record so that concurrent callers never overshoot the threshold
    check_lock: Mutex<()>,
}

impl Controller {
    pub fn new(
        rule: Arc<Rule>,
        calculator: Box<dyn Calculator>,
        checker: Box<dyn Checker>,
        stat: Arc<StandaloneStat>,
    ) -> Self {
        Controller {
            rule,
            calculator,
            checker,
            stat,
            check_lock: Mutex::new(()),
        }
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn stat(&self) -> &Arc<StandaloneStat> {
        &self.stat
    }

    /// Checks the request against the rule and, when it passes, records the
    /// pass in the controller's statistic right away.
    pub fn perform_checking(&self, batch_count: u32) -> Result<TokenResult> {
        let _guard = self.check_lock.lock().unwrap();
        let now = curr_time_millis();
        let allowed_threshold = self
            .calculator
            .calculate_allowed_threshold(&self.stat, now, batch_count);
        let res = self
            .checker
            .do_check(&self.stat, now, batch_count, allowed_threshold);
        if res.is_pass() {
            self.stat
                .write_only_metric
                .add_count_with_time(now, MetricEvent::Pass, batch_count as u64)?;
        }
        Ok(res)
    }

    /// Gives back passes recorded by `perform_checking` for a request that was
    /// blocked afterwards by another rule or slot.
    pub fn release(&self, batch_count: u32) {
        let _guard = self.check_lock.lock().unwrap();
        self.stat.write_only_metric.sub_count_with_time(
            curr_time_millis(),
            MetricEvent::Pass,
            batch_count as u64,
        );
    }
}
