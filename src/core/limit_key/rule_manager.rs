use super::*;
use crate::{base::GuardRule, config, logging, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

pub type RuleList = Vec<Arc<Rule>>;
pub type RuleMap = HashMap<String, Arc<RuleList>>;
pub type WindowMap = HashMap<String, Arc<LimitKeyLeapArray>>;

/// Holds the limit-key rules and the per-key window of every guarded resource.
///
/// A window outlives rule reloads as long as its resource keeps a rule,
/// so replacing a threshold does not forget the keys counted so far.
#[derive(Debug, Default)]
pub struct LimitKeyRuleManager {
    update_lock: Mutex<()>,
    rule_map: RwLock<RuleMap>,
    window_map: RwLock<WindowMap>,
}

impl LimitKeyRuleManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// `load_rules` replaces all limit-key rules.
    /// Returns false when the rules are the same as the current ones.
    pub fn load_rules(&self, rules: Vec<Arc<Rule>>) -> bool {
        let mut grouped: HashMap<String, RuleList> = HashMap::new();
        for rule in rules {
            if let Err(err) = rule.is_valid() {
                logging::warn!(
                    "[LimitKeyRuleManager] Ignoring invalid limit-key rule {:?}, reason: {:?}",
                    rule,
                    err
                );
                continue;
            }
            grouped
                .entry(rule.resource.clone())
                .or_insert_with(Vec::new)
                .push(rule);
        }

        let _guard = self.update_lock.lock().unwrap();
        let unchanged = {
            let rule_map = self.rule_map.read().unwrap();
            rule_map.len() == grouped.len()
                && grouped
                    .iter()
                    .all(|(res, rules)| rule_map.get(res).map(|old| **old == *rules) == Some(true))
        };
        if unchanged {
            logging::info!(
                "[LimitKeyRuleManager] Load rules is the same with current rules, so ignore load operation."
            );
            return false;
        }

        let mut new_window_map = WindowMap::with_capacity(grouped.len());
        {
            let window_map = self.window_map.read().unwrap();
            for res in grouped.keys() {
                match window_map.get(res) {
                    Some(window) => {
                        new_window_map.insert(res.clone(), Arc::clone(window));
                    }
                    None => match new_window() {
                        Ok(window) => {
                            new_window_map.insert(res.clone(), window);
                        }
                        Err(err) => logging::error!(
                            "[LimitKeyRuleManager] Fail to create the window of {}, error: {:?}",
                            res,
                            err
                        ),
                    },
                }
            }
        }
        let new_rule_map: RuleMap = grouped
            .into_iter()
            .filter(|(res, _)| new_window_map.contains_key(res))
            .map(|(res, rules)| (res, Arc::new(rules)))
            .collect();

        *self.window_map.write().unwrap() = new_window_map;
        *self.rule_map.write().unwrap() = new_rule_map;
        logging::info!(
            "[LimitKeyRuleManager] Limit-key rules were loaded: {:?}",
            self.get_rules()
        );
        true
    }

    /// `load_rules_of_resource` replaces the rules of one resource, an empty list clears them.
    pub fn load_rules_of_resource(&self, res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
        if res.is_empty() {
            return Err(Error::msg("empty resource"));
        }
        let _guard = self.update_lock.lock().unwrap();
        if rules.is_empty() {
            self.rule_map.write().unwrap().remove(res);
            self.window_map.write().unwrap().remove(res);
            logging::info!("[LimitKeyRuleManager] clear resource level rules, resource {}", res);
            return Ok(true);
        }
        let valid_rules: RuleList = rules
            .into_iter()
            .filter(|rule| match rule.is_valid() {
                Ok(_) if rule.resource == res => true,
                Ok(_) => {
                    logging::warn!(
                        "[LimitKeyRuleManager] Ignoring rule {:?} of another resource than {}",
                        rule,
                        res
                    );
                    false
                }
                Err(err) => {
                    logging::warn!(
                        "[LimitKeyRuleManager] Ignoring invalid limit-key rule {:?}, reason: {:?}",
                        rule,
                        err
                    );
                    false
                }
            })
            .collect();
        if self.rule_map.read().unwrap().get(res).map(|old| **old == valid_rules) == Some(true) {
            return Ok(false);
        }
        if valid_rules.is_empty() {
            self.rule_map.write().unwrap().remove(res);
            self.window_map.write().unwrap().remove(res);
            return Ok(true);
        }

        let existing = self.window_map.read().unwrap().get(res).cloned();
        if existing.is_none() {
            self.window_map
                .write()
                .unwrap()
                .insert(res.into(), new_window()?);
        }
        self.rule_map
            .write()
            .unwrap()
            .insert(res.into(), Arc::new(valid_rules));
        Ok(true)
    }

    pub fn get_rules(&self) -> Vec<Arc<Rule>> {
        self.rule_map
            .read()
            .unwrap()
            .values()
            .flat_map(|rules| rules.iter().cloned())
            .collect()
    }

    pub fn get_rules_of_resource(&self, res: &str) -> Vec<Arc<Rule>> {
        self.rule_map
            .read()
            .unwrap()
            .get(res)
            .map(|rules| rules.as_ref().clone())
            .unwrap_or_default()
    }

    pub fn clear_rules(&self) {
        let _guard = self.update_lock.lock().unwrap();
        self.rule_map.write().unwrap().clear();
        self.window_map.write().unwrap().clear();
    }

    pub fn clear_rules_of_resource(&self, res: &str) {
        let _guard = self.update_lock.lock().unwrap();
        self.rule_map.write().unwrap().remove(res);
        self.window_map.write().unwrap().remove(res);
    }

    /// The current rule list of `res`, swapped as a whole on reload.
    pub fn get_rule_list_for(&self, res: &str) -> Option<Arc<RuleList>> {
        self.rule_map.read().unwrap().get(res).cloned()
    }

    pub fn get_window_of(&self, res: &str) -> Option<Arc<LimitKeyLeapArray>> {
        self.window_map.read().unwrap().get(res).cloned()
    }
}

fn new_window() -> Result<Arc<LimitKeyLeapArray>> {
    Ok(Arc::new(LimitKeyLeapArray::new(
        config::limit_key_stat_sample_count(),
        config::limit_key_stat_interval_ms(),
    )?))
}

#[cfg(test)]
mod test {
    use super::*;

    fn rule(res: &str, threshold: u64) -> Arc<Rule> {
        Arc::new(Rule {
            resource: res.into(),
            threshold,
            ..Default::default()
        })
    }

    #[test]
    fn load_and_get() {
        let manager = LimitKeyRuleManager::new();
        assert!(manager.load_rules(vec![rule("abc", 6), rule("def", 3), rule("", 1)]));
        assert_eq!(manager.get_rules().len(), 2);
        assert_eq!(manager.get_rules_of_resource("abc")[0].threshold, 6);
        assert!(manager.get_window_of("def").is_some());
        assert!(!manager.load_rules(vec![rule("def", 3), rule("abc", 6)]));

        manager.clear_rules_of_resource("abc");
        assert!(manager.get_rule_list_for("abc").is_none());
        assert!(manager.get_window_of("abc").is_none());
        manager.clear_rules();
        assert!(manager.get_rules().is_empty());
    }

    #[test]
    fn reload_keeps_window() {
        let manager = LimitKeyRuleManager::new();
        assert!(manager.load_rules_of_resource("abc", vec![rule("abc", 6)]).unwrap());
        let window = manager.get_window_of("abc").unwrap();
        window.add_key("tenant-a", 2).unwrap();

        assert!(!manager.load_rules_of_resource("abc", vec![rule("abc", 6)]).unwrap());
        assert!(manager.load_rules_of_resource("abc", vec![rule("abc", 10)]).unwrap());
        let reloaded = manager.get_window_of("abc").unwrap();
        assert!(Arc::ptr_eq(&window, &reloaded));
        assert_eq!(reloaded.key_sum("tenant-a"), 2);

        assert!(manager.load_rules_of_resource("abc", vec![]).unwrap());
        assert!(manager.get_window_of("abc").is_none());
        assert!(manager.load_rules_of_resource("", vec![]).is_err());
    }
}
