use crate::{
    base::SlotChain,
    callback::CallbackRegistry,
    flow::FlowSlot,
    fuse::FuseSlot,
    limit_key::LimitKeySlot,
    logging,
    rule_manager::{RuleConfig, RuleManager},
    stat::{NodeStorage, ResourceNodeStatSlot},
    Result,
};
use lazy_static::lazy_static;
use std::sync::{Arc, RwLock};

/// Registry owns the shared state of an engine instance: the resource nodes,
/// the rules and the statistic callbacks, together with the slot chain wired to them.
///
/// Separate registries never share any statistic or rule.
#[derive(Debug)]
pub struct Registry {
    nodes: Arc<NodeStorage>,
    rule_manager: Arc<RuleManager>,
    callbacks: Arc<CallbackRegistry>,
    slot_chain: Arc<SlotChain>,
}

impl Registry {
    pub fn new() -> Result<Self> {
        let nodes = Arc::new(NodeStorage::new()?);
        let rule_manager = Arc::new(RuleManager::new());
        let callbacks = Arc::new(CallbackRegistry::new());
        let slot_chain = Arc::new(build_default_slot_chain(
            &nodes,
            &rule_manager,
            &callbacks,
        ));
        Ok(Registry {
            nodes,
            rule_manager,
            callbacks,
            slot_chain,
        })
    }

    pub fn nodes(&self) -> &Arc<NodeStorage> {
        &self.nodes
    }

    pub fn rule_manager(&self) -> &Arc<RuleManager> {
        &self.rule_manager
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    pub fn slot_chain(&self) -> Arc<SlotChain> {
        self.slot_chain.clone()
    }

    pub fn load_rule(&self, config: &RuleConfig) -> bool {
        self.rule_manager.load_rule(config)
    }
}

/// Statistic(1000) -> Flow(2000) -> Fuse(3000) -> LimitKey(4000)
pub fn build_default_slot_chain(
    nodes: &Arc<NodeStorage>,
    rule_manager: &RuleManager,
    callbacks: &Arc<CallbackRegistry>,
) -> SlotChain {
    let mut sc = SlotChain::new();
    sc.add_slot(Arc::new(ResourceNodeStatSlot::new(
        nodes.clone(),
        callbacks.clone(),
    )));
    sc.add_slot(Arc::new(FlowSlot::new(rule_manager.flow().clone())));
    sc.add_slot(Arc::new(FuseSlot::new(rule_manager.fuse().clone())));
    sc.add_slot(Arc::new(LimitKeySlot::new(rule_manager.limit_key().clone())));
    sc
}

lazy_static! {
    static ref GLOBAL_REGISTRY: RwLock<Option<Arc<Registry>>> = RwLock::new(None);
}

/// The process-wide registry, created on first use with the global config in effect.
pub fn global_registry() -> Result<Arc<Registry>> {
    if let Some(registry) = GLOBAL_REGISTRY.read().unwrap().as_ref() {
        return Ok(registry.clone());
    }
    let mut global = GLOBAL_REGISTRY.write().unwrap();
    if let Some(registry) = global.as_ref() {
        return Ok(registry.clone());
    }
    let registry = Arc::new(Registry::new()?);
    *global = Some(registry.clone());
    Ok(registry)
}

/// The slot chain of the global registry. When the registry cannot be created,
/// an empty chain is returned and every entry passes.
pub fn global_slot_chain() -> Arc<SlotChain> {
    match global_registry() {
        Ok(registry) => registry.slot_chain(),
        Err(err) => {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!("[Registry] Fail to create the global registry, error: {:?}", err);
            });
            Arc::new(SlotChain::new())
        }
    }
}

/// `load_rule` applies a flat rule record to the global registry.
pub fn load_rule(config: &RuleConfig) -> bool {
    match global_registry() {
        Ok(registry) => registry.load_rule(config),
        Err(err) => {
            logging::error!(
                "[Registry] Fail to load rule {:?} into the global registry, error: {:?}",
                config,
                err
            );
            false
        }
    }
}
