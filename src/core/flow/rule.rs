use crate::{base::GuardRule, config, logging, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ControlBehavior decides how the threshold of a flow rule is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlBehavior {
    /// Reject blocks the request once the windowed pass count would exceed the threshold.
    Reject,
    /// WarmUp ramps the allowed threshold up to the configured one after a cold start.
    WarmUp,
}

impl Default for ControlBehavior {
    fn default() -> ControlBehavior {
        ControlBehavior::Reject
    }
}

/// Rule describes the strategy of flow control, based on the pass count of a sliding window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// unique id
    pub id: String,
    /// resource name
    pub resource: String,
    /// allowed passes per statistic interval, i.e. QPS with the default 1s interval
    pub threshold: f64,
    pub control_behavior: ControlBehavior,
    /// time to ramp from the cold threshold to `threshold`, only read by `WarmUp`
    pub warm_up_period_sec: u32,
    /// the cold threshold is `threshold / warm_up_cold_factor`, only read by `WarmUp`
    pub warm_up_cold_factor: u32,
    /// the statistic window of the rule, 0 means the engine-level default
    pub stat_interval_ms: u32,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            threshold: 0.0,
            control_behavior: ControlBehavior::default(),
            warm_up_period_sec: config::WARM_UP_PERIOD_SEC,
            warm_up_cold_factor: config::WARM_UP_COLD_FACTOR,
            stat_interval_ms: 0,
        }
    }
}

impl Rule {
    /// Two rules may share a statistic when they count the same resource over the same window.
    pub fn is_stat_reusable(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.effective_stat_interval_ms() == other.effective_stat_interval_ms()
    }

    pub fn effective_stat_interval_ms(&self) -> u32 {
        if self.stat_interval_ms == 0 {
            config::metric_stat_interval_ms()
        } else {
            self.stat_interval_ms
        }
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
            return Err(Error::msg("negative threshold"));
        }
        if self.control_behavior == ControlBehavior::WarmUp {
            if self.warm_up_period_sec == 0 {
                return Err(Error::msg("warm_up_period_sec must be great than 0"));
            }
            if self.warm_up_cold_factor <= 1 {
                return Err(Error::msg("warm_up_cold_factor must be great than 1"));
            }
        }
        if self.stat_interval_ms > 10 * 60 * 1000 {
            logging::info!(
                "[FlowRule] stat_interval_ms is great than 10 minutes, less than 10 minutes is recommended."
            )
        }
        Ok(())
    }
}

/// Equality ignores the id, two rules are the same when they behave the same.
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.threshold == other.threshold
            && self.control_behavior == other.control_behavior
            && self.warm_up_period_sec == other.warm_up_period_sec
            && self.warm_up_cold_factor == other.warm_up_cold_factor
            && self.stat_interval_ms == other.stat_interval_ms
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap_or_default();
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn is_stat_reusable() {
        let r1 = Rule {
            resource: "abc1".into(),
            threshold: 100.0,
            stat_interval_ms: 1000,
            ..Default::default()
        };
        // Not same resource
        let r2 = Rule {
            resource: "abc2".into(),
            ..r1.clone()
        };
        assert!(!r1.is_stat_reusable(&r2));
        // Not same stat interval
        let r3 = Rule {
            stat_interval_ms: 2000,
            ..r1.clone()
        };
        assert!(!r1.is_stat_reusable(&r3));
        // 0 stands for the default interval
        let r4 = Rule {
            stat_interval_ms: 0,
            ..r1.clone()
        };
        assert!(r1.is_stat_reusable(&r4));
        // Not same threshold or behavior
        let r5 = Rule {
            threshold: 200.0,
            control_behavior: ControlBehavior::WarmUp,
            ..r1.clone()
        };
        assert!(r1.is_stat_reusable(&r5));
    }

    #[test]
    fn is_valid() {
        let valid = Rule {
            resource: "abc".into(),
            threshold: 10.0,
            ..Default::default()
        };
        assert!(valid.is_valid().is_ok());

        let empty = Rule {
            resource: String::new(),
            ..valid.clone()
        };
        assert!(empty.is_valid().is_err());

        let negative = Rule {
            threshold: -1.0,
            ..valid.clone()
        };
        assert!(negative.is_valid().is_err());

        let cold = Rule {
            control_behavior: ControlBehavior::WarmUp,
            warm_up_cold_factor: 1,
            ..valid.clone()
        };
        assert!(cold.is_valid().is_err());

        let no_period = Rule {
            control_behavior: ControlBehavior::WarmUp,
            warm_up_period_sec: 0,
            ..valid
        };
        assert!(no_period.is_valid().is_err());
    }

    #[test]
    fn ids_and_equality() {
        let r1 = Rule {
            resource: "abc".into(),
            threshold: 10.0,
            ..Default::default()
        };
        let r2 = Rule {
            resource: "abc".into(),
            threshold: 10.0,
            ..Default::default()
        };
        assert_ne!(r1.id, r2.id);
        assert_eq!(r1, r2);
        assert!(format!("{}", r1).contains("\"resource\": \"abc\""));
    }
}
