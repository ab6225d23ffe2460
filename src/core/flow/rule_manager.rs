use super::*;
use crate::{
    base::{check_validity_for_statistic, GuardRule},
    config, logging, utils, Error, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// ControllerMap represents the map storage for Controller.
/// Each resource owns an immutable list that is swapped as a whole.
pub type ControllerMap = HashMap<String, Arc<Vec<Arc<Controller>>>>;
pub type RuleMap = HashMap<String, Vec<Arc<Rule>>>;

/// Holds the flow rules and the traffic shaping controllers built from them.
///
/// Writers are serialized by the lock on the loaded rules, readers only take
/// the read lock of the controller map long enough to clone one `Arc`.
#[derive(Debug, Default)]
pub struct FlowRuleManager {
    rule_map: Mutex<RuleMap>,
    controller_map: RwLock<ControllerMap>,
}

impl FlowRuleManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// `load_rules` loads the given flow rules to the rule manager, while all previous rules will be replaced.
    /// The returned value indicates whether do real load operation, if the rules is the same with previous rules, return false
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
                "[FlowRuleManager] Load rules is the same with current rules, so ignore load operation."
            );
            return false;
        }

        let start = utils::curr_time_nanos();
        let old_controller_map = self.controller_map.read().unwrap().clone();
        let mut valid_controller_map = ControllerMap::with_capacity(rule_map.len());
        for (res, rules) in rule_map.iter() {
            let valid_rules = filter_valid_rules(rules);
            let old_res_tcs = old_controller_map
                .get(res)
                .map(|tcs| tcs.as_slice())
                .unwrap_or(&[]);
            let new_res_tcs = build_resource_traffic_shaping_controller(valid_rules, old_res_tcs);
            if !new_res_tcs.is_empty() {
                valid_controller_map.insert(res.clone(), Arc::new(new_res_tcs));
            }
        }
        *self.controller_map.write().unwrap() = valid_controller_map;
        *global_rule_map = rule_map;
        logging::debug!(
            "[FlowRuleManager] Time statistic(ns) for updating flow rule, time cost {}",
            utils::curr_time_nanos() - start
        );
        log_rule_update(&global_rule_map);
        true
    }

    /// `load_rules_of_resource` loads the given resource's flow rules to the rule manager, while all previous resource's rules will be replaced.
    /// The returned value indicates whether do real load operation, if the rules is the same with previous resource's rules, return false
    pub fn load_rules_of_resource(&self, res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
        if res.is_empty() {
            return Err(Error::msg("empty resource"));
        }
        let mut global_rule_map = self.rule_map.lock().unwrap();
        // clear resource rules
        if rules.is_empty() {
            global_rule_map.remove(res);
            self.controller_map.write().unwrap().remove(res);
            logging::info!("[FlowRuleManager] clear resource level rules, resource {}", res);
            return Ok(true);
        }
        if global_rule_map.get(res) == Some(&rules) {
            logging::info!("[FlowRuleManager] Load resource level rules is the same with current resource level rules, so ignore load operation.");
            return Ok(false);
        }

        let start = utils::curr_time_nanos();
        let valid_res_rules = filter_valid_rules(&rules);
        let old_res_tcs = self
            .controller_map
            .read()
            .unwrap()
            .get(res)
            .cloned()
            .unwrap_or_default();
        let new_res_tcs = build_resource_traffic_shaping_controller(valid_res_rules, &old_res_tcs);

        {
            let mut controller_map = self.controller_map.write().unwrap();
            if new_res_tcs.is_empty() {
                controller_map.remove(res);
            } else {
                controller_map.insert(res.into(), Arc::new(new_res_tcs));
            }
        }
        logging::debug!(
            "[FlowRuleManager] Time statistic(ns) for updating flow rule, timeCost: {}",
            utils::curr_time_nanos() - start
        );
        logging::info!(
            "[FlowRuleManager] load resource level rules, resource: {}, rules: {:?}",
            res,
            rules
        );
        global_rule_map.insert(res.into(), rules);
        Ok(true)
    }

    /// `get_rules` returns all the effective rules.
    /// It doesn't take effect for flow module if user changes the rule.
    pub fn get_rules(&self) -> Vec<Arc<Rule>> {
        self.controller_map
            .read()
            .unwrap()
            .values()
            .flat_map(|tcs| tcs.iter().map(|tc| Arc::clone(tc.rule())))
            .collect()
    }

    /// `get_rules_of_resource` returns specific resource's effective rules.
    pub fn get_rules_of_resource(&self, res: &str) -> Vec<Arc<Rule>> {
        match self.controller_map.read().unwrap().get(res) {
            Some(tcs) => tcs.iter().map(|tc| Arc::clone(tc.rule())).collect(),
            None => Vec::new(),
        }
    }

    /// clear_rules clears all the rules in flow module.
    pub fn clear_rules(&self) {
        let mut rule_map = self.rule_map.lock().unwrap();
        rule_map.clear();
        self.controller_map.write().unwrap().clear();
    }

    /// `clear_rules_of_resource` clears resource level rules in flow module.
    pub fn clear_rules_of_resource(&self, res: &str) {
        let mut rule_map = self.rule_map.lock().unwrap();
        rule_map.remove(res);
        self.controller_map.write().unwrap().remove(res);
    }

    /// The controllers currently guarding `res`, as one consistent generation.
    pub fn get_traffic_controller_list_for(&self, res: &str) -> Option<Arc<Vec<Arc<Controller>>>> {
        self.controller_map.read().unwrap().get(res).cloned()
    }
}

fn filter_valid_rules(rules: &[Arc<Rule>]) -> Vec<Arc<Rule>> {
    let mut valid_rules = Vec::with_capacity(rules.len());
    for rule in rules {
        match rule.is_valid() {
            Ok(_) => valid_rules.push(Arc::clone(rule)),
            Err(err) => logging::warn!(
                "[FlowRuleManager] Ignoring invalid flow rule {:?}, reason: {:?}",
                rule,
                err
            ),
        }
    }
    valid_rules
}

fn log_rule_update(map: &RuleMap) {
    if map.is_empty() {
        logging::info!("[FlowRuleManager] Flow rules were cleared")
    } else {
        logging::info!(
            "[FlowRuleManager] Flow rules were loaded: {:?}",
            map.values()
        )
    }
}

/// `generate_stat_for` generates a standalone statistic for the window of the rule.
/// The buckets follow the engine-level bucket length when the interval allows it.
fn generate_stat_for(rule: &Rule) -> Result<Arc<StandaloneStat>> {
    let interval_ms = rule.effective_stat_interval_ms();
    let bucket_len_ms = config::global_stat_bucket_length_ms();
    let mut sample_count: u32 = 1;
    // calculate the sample count
    if interval_ms > bucket_len_ms
        && interval_ms <= config::global_stat_interval_ms_total()
        && interval_ms % bucket_len_ms == 0
    {
        sample_count = interval_ms / bucket_len_ms;
    }
    check_validity_for_statistic(
        sample_count,
        interval_ms,
        "invalid stat_interval_ms in flow::Rule",
    )?;
    Ok(Arc::new(StandaloneStat::new(sample_count, interval_ms)?))
}

fn gen_controller(rule: Arc<Rule>, stat: Arc<StandaloneStat>) -> Arc<Controller> {
    let calculator: Box<dyn Calculator> = match rule.control_behavior {
        ControlBehavior::Reject => Box::new(DirectCalculator::new(rule.threshold)),
        ControlBehavior::WarmUp => Box::new(WarmUpCalculator::new(&rule)),
    };
    let checker: Box<dyn Checker> = Box::new(RejectChecker::new(Arc::clone(&rule)));
    Arc::new(Controller::new(rule, calculator, checker, stat))
}

/// Returns the index of an equivalent old controller, or else of the first one
/// whose statistic can be reused. Controllers already taken are skipped.
fn calculate_reuse_index_for(
    rule: &Rule,
    old_res_tcs: &[Option<Arc<Controller>>],
) -> (Option<usize>, Option<usize>) {
    // the index of equivalent rule in old traffic shaping controller slice
    let mut eq_idx = None;
    // the index of statistic reusable rule in old traffic shaping controller slice
    let mut reuse_stat_idx = None;

    for (idx, old_tc) in old_res_tcs.iter().enumerate() {
        let old_tc = match old_tc {
            Some(old_tc) => old_tc,
            None => continue,
        };
        let old_rule = old_tc.rule();
        if **old_rule == *rule {
            // break if there is equivalent rule
            eq_idx = Some(idx);
            break;
        }
        // search the index of first stat reusable rule
        if reuse_stat_idx.is_none() && old_rule.is_stat_reusable(rule) {
            reuse_stat_idx = Some(idx);
        }
    }
    (eq_idx, reuse_stat_idx)
}

/// build_resource_traffic_shaping_controller builds Controller slice from rules of one resource.
/// Unchanged rules keep their controller, and a changed rule keeps the statistic of
/// a compatible old controller so that a reload does not reset the window.
pub fn build_resource_traffic_shaping_controller(
    rules_of_res: Vec<Arc<Rule>>,
    old_res_tcs: &[Arc<Controller>],
) -> Vec<Arc<Controller>> {
    let mut old_res_tcs: Vec<Option<Arc<Controller>>> =
        old_res_tcs.iter().cloned().map(Some).collect();
    let mut new_res_tcs = Vec::with_capacity(rules_of_res.len());
    for rule in rules_of_res {
        let (eq_idx, reuse_stat_idx) = calculate_reuse_index_for(&rule, &old_res_tcs);

        // First check equals scenario
        if let Some(eq_idx) = eq_idx {
            if let Some(tc) = old_res_tcs[eq_idx].take() {
                new_res_tcs.push(tc);
                continue;
            }
        }

        let stat = match reuse_stat_idx.and_then(|idx| old_res_tcs[idx].take()) {
            Some(old_tc) => Arc::clone(old_tc.stat()),
            None => match generate_stat_for(&rule) {
                Ok(stat) => stat,
                Err(err) => {
                    logging::error!(
                        "[FlowRuleManager] Fail to generate statistic for rule {:?}, error: {:?}",
                        rule,
                        err
                    );
                    continue;
                }
            },
        };
        new_res_tcs.push(gen_controller(rule, stat));
    }
    new_res_tcs
}
