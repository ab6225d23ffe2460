use super::*;
use crate::{base::GuardRule, logging, stat::BucketLeapArray, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

pub type BreakerList = Vec<Arc<dyn CircuitBreakerTrait>>;
pub type BreakerMap = HashMap<String, Arc<BreakerList>>;
pub type RuleMap = HashMap<String, Vec<Arc<Rule>>>;

/// Holds the fuse rules, the circuit breakers built from them and the
/// state change listeners shared by all breakers.
#[derive(Default)]
pub struct FuseRuleManager {
    rule_map: Mutex<RuleMap>,
    breaker_map: RwLock<BreakerMap>,
    listeners: StateChangeListeners,
}

impl std::fmt::Debug for FuseRuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuseRuleManager")
            .field("breaker_map", &self.breaker_map)
            .field("listeners", &self.listeners.read().unwrap().len())
            .finish()
    }
}

impl FuseRuleManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// `load_rules` replaces all circuit breaking rules.
    /// Returns false when the rules are the same as the current ones.
    pub fn load_rules(&self, rules: Vec<Arc<Rule>>) -> bool {
        let mut rule_map = RuleMap::new();
        for rule in rules {
            rule_map
                .entry(rule.resource.clone())
                .or_insert_with(Vec::new)
                .push(rule);
        }

        let mut global_rule_map = self.rule_map.lock().unwrap();
        if *global_rule_map == rule_map {
            logging::info!(
                "[FuseRuleManager] Load rules is the same with current rules, so ignore load operation."
            );
            return false;
        }

        let old_breaker_map = self.breaker_map.read().unwrap().clone();
        let mut new_breaker_map = BreakerMap::with_capacity(rule_map.len());
        for (res, rules) in rule_map.iter() {
            let old_breakers = old_breaker_map
                .get(res)
                .map(|breakers| breakers.as_slice())
                .unwrap_or(&[]);
            let breakers = self.build_resource_circuit_breaker(filter_valid_rules(rules), old_breakers);
            if !breakers.is_empty() {
                new_breaker_map.insert(res.clone(), Arc::new(breakers));
            }
        }
        *self.breaker_map.write().unwrap() = new_breaker_map;
        *global_rule_map = rule_map;
        if global_rule_map.is_empty() {
            logging::info!("[FuseRuleManager] Circuit breaking rules were cleared")
        } else {
            logging::info!(
                "[FuseRuleManager] Circuit breaking rules were loaded: {:?}",
                global_rule_map.values()
            )
        }
        true
    }

    /// `load_rules_of_resource` replaces the rules of one resource, an empty list clears them.
    pub fn load_rules_of_resource(&self, res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
        if res.is_empty() {
            return Err(Error::msg("empty resource"));
        }
        let mut global_rule_map = self.rule_map.lock().unwrap();
        if rules.is_empty() {
            global_rule_map.remove(res);
            self.breaker_map.write().unwrap().remove(res);
            logging::info!("[FuseRuleManager] clear resource level rules, resource {}", res);
            return Ok(true);
        }
        if global_rule_map.get(res) == Some(&rules) {
            logging::info!("[FuseRuleManager] Load resource level rules is the same with current resource level rules, so ignore load operation.");
            return Ok(false);
        }

        let old_breakers = self
            .breaker_map
            .read()
            .unwrap()
            .get(res)
            .cloned()
            .unwrap_or_default();
        let breakers = self.build_resource_circuit_breaker(filter_valid_rules(&rules), &old_breakers);
        {
            let mut breaker_map = self.breaker_map.write().unwrap();
            if breakers.is_empty() {
                breaker_map.remove(res);
            } else {
                breaker_map.insert(res.into(), Arc::new(breakers));
            }
        }
        logging::info!(
            "[FuseRuleManager] load resource level rules, resource: {}, rules: {:?}",
            res,
            rules
        );
        global_rule_map.insert(res.into(), rules);
        Ok(true)
    }

    /// `get_rules` returns all the effective rules.
    pub fn get_rules(&self) -> Vec<Arc<Rule>> {
        self.breaker_map
            .read()
            .unwrap()
            .values()
            .flat_map(|breakers| breakers.iter().map(|b| Arc::clone(b.bound_rule())))
            .collect()
    }

    pub fn get_rules_of_resource(&self, res: &str) -> Vec<Arc<Rule>> {
        match self.breaker_map.read().unwrap().get(res) {
            Some(breakers) => breakers.iter().map(|b| Arc::clone(b.bound_rule())).collect(),
            None => Vec::new(),
        }
    }

    pub fn clear_rules(&self) {
        let mut rule_map = self.rule_map.lock().unwrap();
        rule_map.clear();
        self.breaker_map.write().unwrap().clear();
    }

    pub fn clear_rules_of_resource(&self, res: &str) {
        let mut rule_map = self.rule_map.lock().unwrap();
        rule_map.remove(res);
        self.breaker_map.write().unwrap().remove(res);
    }

    /// The breakers currently guarding `res`, as one consistent generation.
    pub fn get_breakers_of_resource(&self, res: &str) -> Option<Arc<BreakerList>> {
        self.breaker_map.read().unwrap().get(res).cloned()
    }

    /// Listeners are shared by the existing breakers and the ones built later.
    pub fn register_state_change_listeners(&self, mut listeners: Vec<Arc<dyn StateChangeListener>>) {
        if listeners.is_empty() {
            return;
        }
        self.listeners.write().unwrap().append(&mut listeners);
    }

    pub fn clear_state_change_listeners(&self) {
        self.listeners.write().unwrap().clear();
    }

    /// Builds the breakers of one resource. An equivalent old breaker is kept as is,
    /// state included, and a compatible one hands over its window.
    fn build_resource_circuit_breaker(
        &self,
        rules_of_res: Vec<Arc<Rule>>,
        old_breakers: &[Arc<dyn CircuitBreakerTrait>],
    ) -> BreakerList {
        let mut old_breakers: Vec<Option<Arc<dyn CircuitBreakerTrait>>> =
            old_breakers.iter().cloned().map(Some).collect();
        let mut new_breakers = BreakerList::with_capacity(rules_of_res.len());
        for rule in rules_of_res {
            let (eq_idx, reuse_stat_idx) = calculate_reuse_index_for(&rule, &old_breakers);
            if let Some(breaker) = eq_idx.and_then(|idx| old_breakers[idx].take()) {
                new_breakers.push(breaker);
                continue;
            }
            let stat = match reuse_stat_idx.and_then(|idx| old_breakers[idx].take()) {
                Some(old) => Arc::clone(old.breaker().stat()),
                None => {
                    match BucketLeapArray::new(
                        rule.get_rule_stat_sliding_window_bucket_count(),
                        rule.get_rule_stat_interval_ms(),
                    ) {
                        Ok(stat) => Arc::new(stat),
                        Err(err) => {
                            logging::warn!(
                                "[FuseRuleManager] Ignoring rule {:?}, fail to create its window: {:?}",
                                rule,
                                err
                            );
                            continue;
                        }
                    }
                }
            };
            new_breakers.push(new_circuit_breaker(rule, stat, self.listeners.clone()));
        }
        new_breakers
    }
}

fn new_circuit_breaker(
    rule: Arc<Rule>,
    stat: Arc<BucketLeapArray>,
    listeners: StateChangeListeners,
) -> Arc<dyn CircuitBreakerTrait> {
    match rule.grade {
        FuseGrade::ExceptionCount => {
            Arc::new(ErrorCountBreaker::new_with_stat(rule, stat, listeners))
        }
        FuseGrade::ExceptionRate => {
            Arc::new(ErrorRatioBreaker::new_with_stat(rule, stat, listeners))
        }
        FuseGrade::AvgResponseTime => Arc::new(AvgRtBreaker::new_with_stat(rule, stat, listeners)),
    }
}

fn filter_valid_rules(rules: &[Arc<Rule>]) -> Vec<Arc<Rule>> {
    let mut valid_rules = Vec::with_capacity(rules.len());
    for rule in rules {
        match rule.is_valid() {
            Ok(_) => valid_rules.push(Arc::clone(rule)),
            Err(err) => logging::warn!(
                "[FuseRuleManager] Ignoring invalid circuit breaking rule {:?}, reason: {:?}",
                rule,
                err
            ),
        }
    }
    valid_rules
}

fn calculate_reuse_index_for(
    rule: &Rule,
    old_breakers: &[Option<Arc<dyn CircuitBreakerTrait>>],
) -> (Option<usize>, Option<usize>) {
    let mut eq_idx = None;
    let mut reuse_stat_idx = None;
    for (idx, old) in old_breakers.iter().enumerate() {
        let old_rule = match old {
            Some(old) => old.bound_rule(),
            None => continue,
        };
        if **old_rule == *rule {
            eq_idx = Some(idx);
            break;
        }
        if reuse_stat_idx.is_none() && old_rule.is_stat_reusable(rule) {
            reuse_stat_idx = Some(idx);
        }
    }
    (eq_idx, reuse_stat_idx)
}
