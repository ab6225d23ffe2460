use super::*;
use crate::base::{BaseSlot, BlockType, EntryContext, Next, Slot, TokenResult};
use crate::{utils, Result};
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 4000;

/// A rule checking slot for the limit-key rules.
/// Invocations without a first argument carry no key and are never limited here.
///
/// An admitted key counts its passes right away, they are given back when a
/// downstream slot blocks the invocation.
pub struct LimitKeySlot {
    manager: Arc<LimitKeyRuleManager>,
}

impl LimitKeySlot {
    pub fn new(manager: Arc<LimitKeyRuleManager>) -> Self {
        LimitKeySlot { manager }
    }
}

impl BaseSlot for LimitKeySlot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl Slot for LimitKeySlot {
    fn entry(&self, ctx: &mut EntryContext, next: Next<'_>) -> Result<TokenResult> {
        let res = ctx.resource().name();
        let (rules, window) = match (
            self.manager.get_rule_list_for(res),
            self.manager.get_window_of(res),
        ) {
            (Some(rules), Some(window)) => (rules, window),
            _ => return Ok(next.entry(ctx)),
        };
        // the strictest rule decides
        let rule = match rules.iter().min_by_key(|rule| rule.threshold) {
            Some(rule) => rule,
            None => return Ok(next.entry(ctx)),
        };
        let key = match ctx.input().first_arg() {
            Some(key) => key,
            None => return Ok(next.entry(ctx)),
        };
        let batch_count = ctx.input().batch_count() as u64;
        let reservation = match window.try_reserve_key_with_time(
            utils::curr_time_millis(),
            key,
            batch_count,
            rule.threshold,
        )? {
            KeyAdmission::Reserved(reservation) => reservation,
            KeyAdmission::Exceeded(sum) => {
                return Ok(TokenResult::new_blocked_with_cause(
                    BlockType::LimitKey,
                    format!("limit key check blocked, key: {}", key),
                    rule.clone(),
                    Arc::new(sum),
                ));
            }
        };
        let result = next.entry(ctx);
        if result.is_blocked() {
            reservation.release();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{
        ContextPtr, ResourceType, ResourceWrapper, EntryInput, SlotChain, TrafficType,
    };
    use std::sync::RwLock;

    fn new_ctx(key: Option<&str>) -> ContextPtr {
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            "abc".into(),
            ResourceType::Common,
            TrafficType::Inbound,
        ));
        let mut input = EntryInput::new(1);
        if let Some(key) = key {
            input.set_args(vec![key.into()]);
        }
        ctx.set_input(input);
        Arc::new(RwLock::new(ctx))
    }

    #[test]
    fn check_key_sum() {
        let manager = Arc::new(LimitKeyRuleManager::new());
        manager
            .load_rules_of_resource(
                "abc",
                vec![Arc::new(Rule {
                    resource: "abc".into(),
                    threshold: 2,
                    ..Default::default()
                })],
            )
            .unwrap();
        let mut sc = SlotChain::new();
        sc.add_slot(Arc::new(LimitKeySlot::new(manager.clone())));

        let window = manager.get_window_of("abc").unwrap();
        window.add_key("tenant-a", 2).unwrap();
        let res = sc.entry(&new_ctx(Some("tenant-a")));
        let block_err = res.block_err().unwrap();
        assert_eq!(block_err.block_type(), BlockType::LimitKey);
        assert_eq!(
            block_err
                .triggered_value()
                .and_then(|v| (*v).as_any().downcast_ref::<u64>().copied()),
            Some(2)
        );
        assert!(sc.entry(&new_ctx(Some("tenant-b"))).is_pass());
        assert_eq!(window.key_sum("tenant-b"), 1);
        assert!(sc.entry(&new_ctx(None)).is_pass());
    }

    struct BlockAll;

    impl BaseSlot for BlockAll {
        fn order(&self) -> u32 {
            5000
        }
    }

    impl Slot for BlockAll {
        fn entry(&self, _ctx: &mut EntryContext, _next: Next<'_>) -> Result<TokenResult> {
            Ok(TokenResult::new_blocked(BlockType::Other(1)))
        }
    }

    #[test]
    fn downstream_block_releases_key() {
        let manager = Arc::new(LimitKeyRuleManager::new());
        manager
            .load_rules_of_resource(
                "abc",
                vec![Arc::new(Rule {
                    resource: "abc".into(),
                    threshold: 1,
                    ..Default::default()
                })],
            )
            .unwrap();
        let mut sc = SlotChain::new();
        sc.add_slot(Arc::new(LimitKeySlot::new(manager.clone())));
        sc.add_slot(Arc::new(BlockAll));

        let window = manager.get_window_of("abc").unwrap();
        for _ in 0..3 {
            let res = sc.entry(&new_ctx(Some("tenant-a")));
            assert_eq!(res.block_err().unwrap().block_type(), BlockType::Other(1));
            assert_eq!(window.key_sum("tenant-a"), 0);
        }
    }
}
