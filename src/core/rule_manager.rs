//! The flat rule record accepted by the engine and the manager dispatching it
//! to the typed rule managers.

use crate::{
    base::GuardRule,
    flow::{self, ControlBehavior, FlowRuleManager},
    fuse::{self, FuseGrade, FuseRuleManager},
    limit_key::{self, LimitKeyRuleManager},
    logging, utils, Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleType {
    Flow,
    Fuse,
    #[serde(alias = "LIMIT_KEY")]
    LimitKey,
}

impl Default for RuleType {
    fn default() -> RuleType {
        RuleType::Flow
    }
}

/// RuleConfig is the flat rule record, `rule_type` decides which fields are read.
///
/// ```yaml
/// type: FUSE
/// resource: GET:/api/orders
/// threshold: 0.2
/// fuse_grade: ExceptionRate
/// warning_line: 10
/// restore_time_ms: 2000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub resource: String,
    pub threshold: f64,
    pub control_behavior: ControlBehavior,
    pub fuse_grade: FuseGrade,
    pub warning_line: u64,
    pub restore_time_ms: u32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig {
            rule_type: RuleType::default(),
            resource: String::new(),
            threshold: 0.0,
            control_behavior: ControlBehavior::default(),
            fuse_grade: FuseGrade::default(),
            warning_line: 0,
            restore_time_ms: 0,
        }
    }
}

impl RuleConfig {
    pub fn flow(resource: &str, threshold: f64) -> Self {
        RuleConfig {
            rule_type: RuleType::Flow,
            resource: resource.into(),
            threshold,
            ..Default::default()
        }
    }

    pub fn warm_up(resource: &str, threshold: f64) -> Self {
        RuleConfig {
            control_behavior: ControlBehavior::WarmUp,
            ..Self::flow(resource, threshold)
        }
    }

    pub fn fuse(
        resource: &str,
        fuse_grade: FuseGrade,
        threshold: f64,
        warning_line: u64,
        restore_time_ms: u32,
    ) -> Self {
        RuleConfig {
            rule_type: RuleType::Fuse,
            resource: resource.into(),
            threshold,
            fuse_grade,
            warning_line,
            restore_time_ms,
            ..Default::default()
        }
    }

    pub fn limit_key(resource: &str, threshold: u64) -> Self {
        RuleConfig {
            rule_type: RuleType::LimitKey,
            resource: resource.into(),
            threshold: threshold as f64,
            ..Default::default()
        }
    }

    /// A record with a blank resource or a non-positive threshold is never applied.
    fn is_acceptable(&self) -> bool {
        !utils::is_blank(&self.resource) && self.threshold.is_finite() && self.threshold > 0.0
    }
}

/// A typed rule built from a `RuleConfig`.
#[derive(Debug, Clone)]
pub enum TypedRule {
    Flow(Arc<flow::Rule>),
    Fuse(Arc<fuse::Rule>),
    LimitKey(Arc<limit_key::Rule>),
}

impl TypedRule {
    pub fn from_config(config: &RuleConfig) -> Result<TypedRule> {
        let rule = match config.rule_type {
            RuleType::Flow => TypedRule::Flow(Arc::new(flow::Rule {
                resource: config.resource.clone(),
                threshold: config.threshold,
                control_behavior: config.control_behavior,
                ..Default::default()
            })),
            RuleType::Fuse => TypedRule::Fuse(Arc::new(fuse::Rule {
                resource: config.resource.clone(),
                grade: config.fuse_grade,
                threshold: config.threshold,
                warning_line: config.warning_line,
                restore_time_ms: config.restore_time_ms,
                ..Default::default()
            })),
            RuleType::LimitKey => {
                // the per-key threshold counts whole passes
                let threshold = config.threshold.floor() as u64;
                if threshold == 0 {
                    return Err(Error::msg("limit-key threshold must be at least 1"));
                }
                TypedRule::LimitKey(Arc::new(limit_key::Rule {
                    resource: config.resource.clone(),
                    threshold,
                    ..Default::default()
                }))
            }
        };
        rule.as_guard_rule().is_valid()?;
        Ok(rule)
    }

    pub fn as_guard_rule(&self) -> &dyn GuardRule {
        match self {
            TypedRule::Flow(rule) => rule.as_ref(),
            TypedRule::Fuse(rule) => rule.as_ref(),
            TypedRule::LimitKey(rule) => rule.as_ref(),
        }
    }
}

/// RuleManager owns the typed rule managers of one registry and
/// accepts flat `RuleConfig` records for all of them.
#[derive(Debug, Default)]
pub struct RuleManager {
    flow: Arc<FlowRuleManager>,
    fuse: Arc<FuseRuleManager>,
    limit_key: Arc<LimitKeyRuleManager>,
}

impl RuleManager {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn flow(&self) -> &Arc<FlowRuleManager> {
        &self.flow
    }

    pub fn fuse(&self) -> &Arc<FuseRuleManager> {
        &self.fuse
    }

    pub fn limit_key(&self) -> &Arc<LimitKeyRuleManager> {
        &self.limit_key
    }

    /// `load_rule` replaces the rules of the record's kind on its resource with the record.
    /// Returns false when the record is rejected: blank resource, a threshold not above 0,
    /// or otherwise invalid settings for its kind.
    pub fn load_rule(&self, config: &RuleConfig) -> bool {
        if !config.is_acceptable() {
            logging::warn!(
                "[RuleManager] Rejecting rule config with blank resource or non-positive threshold: {:?}",
                config
            );
            return false;
        }
        let rule = match TypedRule::from_config(config) {
            Ok(rule) => rule,
            Err(err) => {
                logging::warn!(
                    "[RuleManager] Rejecting invalid rule config {:?}, reason: {:?}",
                    config,
                    err
                );
                return false;
            }
        };
        let res = config.resource.as_str();
        let loaded = match rule {
            TypedRule::Flow(rule) => self.flow.load_rules_of_resource(res, vec![rule]),
            TypedRule::Fuse(rule) => self.fuse.load_rules_of_resource(res, vec![rule]),
            TypedRule::LimitKey(rule) => self.limit_key.load_rules_of_resource(res, vec![rule]),
        };
        match loaded {
            Ok(_) => true,
            Err(err) => {
                logging::warn!(
                    "[RuleManager] Fail to load rule config {:?}, error: {:?}",
                    config,
                    err
                );
                false
            }
        }
    }

    /// `load_rules` replaces every rule of every kind with the acceptable records.
    /// Returns false if any record was rejected, the other records are still applied.
    pub fn load_rules(&self, configs: &[RuleConfig]) -> bool {
        let mut all_accepted = true;
        let mut flow_rules = Vec::new();
        let mut fuse_rules = Vec::new();
        let mut limit_key_rules = Vec::new();
        for config in configs {
            if !config.is_acceptable() {
                logging::warn!("[RuleManager] Rejecting rule config {:?}", config);
                all_accepted = false;
                continue;
            }
            match TypedRule::from_config(config) {
                Ok(TypedRule::Flow(rule)) => flow_rules.push(rule),
                Ok(TypedRule::Fuse(rule)) => fuse_rules.push(rule),
                Ok(TypedRule::LimitKey(rule)) => limit_key_rules.push(rule),
                Err(err) => {
                    logging::warn!(
                        "[RuleManager] Rejecting invalid rule config {:?}, reason: {:?}",
                        config,
                        err
                    );
                    all_accepted = false;
                }
            }
        }
        self.flow.load_rules(flow_rules);
        self.fuse.load_rules(fuse_rules);
        self.limit_key.load_rules(limit_key_rules);
        all_accepted
    }

    pub fn clear_rules(&self) {
        self.flow.clear_rules();
        self.fuse.clear_rules();
        self.limit_key.clear_rules();
    }
}
