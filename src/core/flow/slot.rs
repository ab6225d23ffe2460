use super::*;
use crate::{
    base::{BaseSlot, EntryContext, Next, Slot, TokenResult},
    logging, Result,
};
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 2000;

/// A rule checking slot for the flow rules.
///
/// Every controller of the resource records its pass while checking.
/// When a later controller or a downstream slot blocks the request,
/// the reserved passes are released again.
pub struct FlowSlot {
    manager: Arc<FlowRuleManager>,
}

impl FlowSlot {
    pub fn new(manager: Arc<FlowRuleManager>) -> Self {
        FlowSlot { manager }
    }
}

fn release_all(tcs: &[&Arc<Controller>], batch_count: u32) {
    for tc in tcs {
        tc.release(batch_count);
    }
}

impl BaseSlot for FlowSlot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl Slot for FlowSlot {
    fn entry(&self, ctx: &mut EntryContext, next: Next<'_>) -> Result<TokenResult> {
        let tcs = match self
            .manager
            .get_traffic_controller_list_for(ctx.resource().name())
        {
            Some(tcs) => tcs,
            None => return Ok(next.entry(ctx)),
        };
        let batch_count = ctx.input().batch_count();
        let mut passed = Vec::with_capacity(tcs.len());
        for tc in tcs.iter() {
            match tc.perform_checking(batch_count) {
                Ok(TokenResult::Pass) => passed.push(tc),
                Ok(blocked) => {
                    release_all(&passed, batch_count);
                    return Ok(blocked);
                }
                Err(err) => {
                    logging::FREQUENT_ERROR_ONCE.call_once(|| {
                        logging::error!(
                            "[FlowSlot] Fail to check flow rule {:?}, error: {:?}",
                            tc.rule(),
                            err
                        );
                    });
                    ctx.add_slot_error(err);
                }
            }
        }

        let res = next.entry(ctx);
        if res.is_blocked() {
            release_all(&passed, batch_count);
        }
        Ok(res)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{
        BlockType, ContextPtr, MetricEvent, ReadStat, ResourceType, ResourceWrapper,
        EntryInput, SlotChain, TrafficType,
    };
    use std::sync::RwLock;

    struct DenyAll;

    impl BaseSlot for DenyAll {
        fn order(&self) -> u32 {
            5000
        }
    }

    impl Slot for DenyAll {
        fn entry(&self, _ctx: &mut EntryContext, _next: Next<'_>) -> Result<TokenResult> {
            Ok(TokenResult::new_blocked(BlockType::Other(7)))
        }
    }

    fn new_ctx(res_name: &str, batch_count: u32) -> ContextPtr {
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            res_name.into(),
            ResourceType::Common,
            TrafficType::Inbound,
        ));
        ctx.set_input(EntryInput::new(batch_count));
        Arc::new(RwLock::new(ctx))
    }

    fn load(manager: &FlowRuleManager, res_name: &str, thresholds: &[f64]) {
        let rules = thresholds
            .iter()
            .map(|&threshold| {
                Arc::new(Rule {
                    resource: res_name.into(),
                    threshold,
                    stat_interval_ms: 10000,
                    ..Default::default()
                })
            })
            .collect();
        manager.load_rules_of_resource(res_name, rules).unwrap();
    }

    #[test]
    fn no_rules() {
        let manager = Arc::new(FlowRuleManager::new());
        let mut sc = SlotChain::new();
        sc.add_slot(Arc::new(FlowSlot::new(manager)));
        assert!(sc.entry(&new_ctx("abc", 1)).is_pass());
    }

    #[test]
    fn block_over_threshold() {
        let manager = Arc::new(FlowRuleManager::new());
        load(&manager, "abc", &[5.0]);
        let mut sc = SlotChain::new();
        sc.add_slot(Arc::new(FlowSlot::new(manager.clone())));
        for _ in 0..5 {
            assert!(sc.entry(&new_ctx("abc", 1)).is_pass());
        }
        let res = sc.entry(&new_ctx("abc", 1));
        assert_eq!(res.block_err().unwrap().block_type(), BlockType::Flow);
        // other resources are not affected
        assert!(sc.entry(&new_ctx("def", 1)).is_pass());
    }

    #[test]
    fn release_on_later_block() {
        let manager = Arc::new(FlowRuleManager::new());
        // the second rule blocks a batch of 3 after the first one reserved it
        load(&manager, "abc", &[10.0, 2.0]);
        let mut sc = SlotChain::new();
        sc.add_slot(Arc::new(FlowSlot::new(manager.clone())));
        assert!(sc.entry(&new_ctx("abc", 3)).is_blocked());
        let tcs = manager.get_traffic_controller_list_for("abc").unwrap();
        assert_eq!(tcs[0].stat().read_only_metric().sum(MetricEvent::Pass), 0);

        // a downstream block releases every reservation
        sc.add_slot(Arc::new(DenyAll));
        assert!(sc.entry(&new_ctx("abc", 1)).is_blocked());
        assert_eq!(tcs[0].stat().read_only_metric().sum(MetricEvent::Pass), 0);
        assert_eq!(tcs[1].stat().read_only_metric().sum(MetricEvent::Pass), 0);
    }
}
