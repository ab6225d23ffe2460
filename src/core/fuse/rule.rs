use crate::{base::GuardRule, config, logging, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `FuseGrade` decides which statistic trips the circuit breaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuseGrade {
    /// trips when the windowed error count reaches the threshold
    ExceptionCount,
    /// trips when `errors / passes` reaches the threshold, a fraction in [0, 1]
    ExceptionRate,
    /// trips when the windowed average response time (ms) reaches the threshold
    AvgResponseTime,
}

impl Default for FuseGrade {
    fn default() -> FuseGrade {
        FuseGrade::ExceptionRate
    }
}

/// Rule encompasses the fields of circuit breaking rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// unique id
    pub id: String,
    /// resource name
    pub resource: String,
    pub grade: FuseGrade,
    /// `threshold` represents the threshold of circuit breaker,
    /// its meaning depends on `grade`
    pub threshold: f64,
    /// `warning_line` is the minimum amount of passes in the statistic window
    /// before the breaker is allowed to trip.
    pub warning_line: u64,
    /// `restore_time_ms` represents the cool-down (in milliseconds) after the circuit breaker opens.
    /// During the open period, no requests are permitted until the timeout has elapsed.
    /// After that, the circuit breaker will transform to half-open state for a "trial" request.
    pub restore_time_ms: u32,
    /// stat_interval_ms represents statistic time interval of the internal circuit breaker (in ms).
    /// 0 means the engine-level default.
    pub stat_interval_ms: u32,
    /// `stat_sliding_window_bucket_count` represents the bucket count of statistic sliding window.
    /// `stat_interval_ms % stat_sliding_window_bucket_count == 0` must hold, otherwise a single bucket is used.
    /// 0 means the engine-level default.
    pub stat_sliding_window_bucket_count: u32,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            grade: FuseGrade::default(),
            threshold: 0.0,
            warning_line: 0,
            restore_time_ms: 0,
            stat_interval_ms: 0,
            stat_sliding_window_bucket_count: 0,
        }
    }
}

impl Rule {
    pub fn is_stat_reusable(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.grade == other.grade
            && self.get_rule_stat_interval_ms() == other.get_rule_stat_interval_ms()
            && self.get_rule_stat_sliding_window_bucket_count()
                == other.get_rule_stat_sliding_window_bucket_count()
    }

    pub fn get_rule_stat_interval_ms(&self) -> u32 {
        if self.stat_interval_ms == 0 {
            config::fuse_stat_interval_ms()
        } else {
            self.stat_interval_ms
        }
    }

    pub fn get_rule_stat_sliding_window_bucket_count(&self) -> u32 {
        let interval_ms = self.get_rule_stat_interval_ms();
        let mut bucket_count = self.stat_sliding_window_bucket_count;
        if bucket_count == 0 {
            bucket_count = config::fuse_stat_sample_count();
        }
        if bucket_count == 0 || interval_ms % bucket_count != 0 {
            bucket_count = 1
        }
        bucket_count
    }
}

impl GuardRule for Rule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn is_valid(&self) -> Result<()> {
        if self.resource.is_empty() {
            return Err(Error::msg("empty resource name"));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(Error::msg("invalid threshold"));
        }
        if self.grade == FuseGrade::ExceptionRate && self.threshold > 1.0 {
            return Err(Error::msg(
                "invalid ExceptionRate threshold (valid range: [0.0, 1.0])",
            ));
        }
        if self.stat_sliding_window_bucket_count != 0
            && self.get_rule_stat_interval_ms() % self.stat_sliding_window_bucket_count != 0
        {
            logging::warn!("[FuseRule] The following must be true: stat_interval_ms % stat_sliding_window_bucket_count == 0. stat_sliding_window_bucket_count will be replaced by 1, rule {:?}", self);
        }
        Ok(())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.grade == other.grade
            && self.threshold == other.threshold
            && self.warning_line == other.warning_line
            && self.restore_time_ms == other.restore_time_ms
            && self.stat_interval_ms == other.stat_interval_ms
            && self.stat_sliding_window_bucket_count == other.stat_sliding_window_bucket_count
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap_or_default();
        write!(f, "{}", fmtted)
    }
}
