use super::*;
use crate::base::{BaseSlot, BlockType, EntryContext, Next, Slot, Snapshot, TokenResult};
use crate::Result;
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 3000;

/// A rule checking slot for the circuit breakers.
///
/// The breakers of a resource are asked for permission on entry, and are told
/// about the outcome of every passed invocation on exit.
pub struct FuseSlot {
    manager: Arc<FuseRuleManager>,
}

impl FuseSlot {
    pub fn new(manager: Arc<FuseRuleManager>) -> Self {
        FuseSlot { manager }
    }
}

impl BaseSlot for FuseSlot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl Slot for FuseSlot {
    fn entry(&self, ctx: &mut EntryContext, next: Next<'_>) -> Result<TokenResult> {
        let breakers = match self.manager.get_breakers_of_resource(ctx.resource().name()) {
            Some(breakers) => breakers,
            None => return Ok(next.entry(ctx)),
        };
        let mut probes = Vec::new();
        for breaker in breakers.iter() {
            match breaker.try_pass() {
                Permit::Granted => {}
                Permit::Probe => probes.push(breaker),
                Permit::Denied => {
                    for probe in &probes {
                        probe.on_probe_blocked();
                    }
                    let snapshot = breaker
                        .triggered_value(&breaker.breaker().window_stat(crate::utils::curr_time_millis()))
                        .map(|value| Arc::new(value) as Arc<Snapshot>)
                        .unwrap_or_else(|| Arc::new(breaker.current_state()) as Arc<Snapshot>);
                    return Ok(TokenResult::new_blocked_with_cause(
                        BlockType::Fuse,
                        "circuit breaker check blocked".into(),
                        breaker.bound_rule().clone(),
                        snapshot,
                    ));
                }
            }
        }

        let res = next.entry(ctx);
        if res.is_pass() {
            let batch_count = ctx.input().batch_count();
            for breaker in breakers.iter() {
                breaker.on_request_pass(batch_count);
            }
        } else {
            for probe in &probes {
                probe.on_probe_blocked();
            }
        }
        Ok(res)
    }

    fn exit(&self, ctx: &mut EntryContext) -> Result<()> {
        if ctx.is_blocked() {
            return Ok(());
        }
        let breakers = match self.manager.get_breakers_of_resource(ctx.resource().name()) {
            Some(breakers) => breakers,
            None => return Ok(()),
        };
        let rt = ctx.round_trip();
        let err_count = ctx.err_count();
        for breaker in breakers.iter() {
            breaker.on_request_complete(rt, err_count);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{
        ContextPtr, ResourceType, ResourceWrapper, EntryInput, SlotChain, TrafficType,
    };
    use crate::utils::sleep_for_ms;
    use crate::Error;
    use std::sync::RwLock;

    fn new_ctx(res_name: &str) -> ContextPtr {
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            res_name.into(),
            ResourceType::Common,
            TrafficType::Outbound,
        ));
        ctx.set_input(EntryInput::new(1));
        Arc::new(RwLock::new(ctx))
    }

    fn chain(grade: FuseGrade, threshold: f64) -> (SlotChain, Arc<FuseRuleManager>) {
        let manager = Arc::new(FuseRuleManager::new());
        manager
            .load_rules_of_resource(
                "abc",
                vec![Arc::new(Rule {
                    resource: "abc".into(),
                    grade,
                    threshold,
                    warning_line: 3,
                    restore_time_ms: 100,
                    stat_interval_ms: 10000,
                    stat_sliding_window_bucket_count: 10,
                    ..Default::default()
                })],
            )
            .unwrap();
        let mut sc = SlotChain::new();
        sc.add_slot(Arc::new(FuseSlot::new(manager.clone())));
        (sc, manager)
    }

    fn call(sc: &SlotChain, failed: bool) -> TokenResult {
        let ctx = new_ctx("abc");
        let res = sc.entry(&ctx);
        if res.is_pass() && failed {
            ctx.write().unwrap().set_err(Error::msg("biz error"), 1);
        }
        sc.exit(&ctx);
        res
    }

    #[test]
    fn open_then_recover() {
        let (sc, manager) = chain(FuseGrade::ExceptionCount, 2.0);
        for _ in 0..4 {
            assert!(call(&sc, true).is_pass());
        }
        let res = call(&sc, false);
        let block_err = res.block_err().unwrap();
        assert_eq!(block_err.block_type(), BlockType::Fuse);
        assert_eq!(
            block_err.triggered_rule_as::<Rule>().unwrap().grade,
            FuseGrade::ExceptionCount
        );
        let breaker = manager.get_breakers_of_resource("abc").unwrap()[0].clone();
        assert_eq!(breaker.current_state(), State::Open);

        sleep_for_ms(150);
        // the probe succeeds and closes the breaker
        assert!(call(&sc, false).is_pass());
        assert_eq!(breaker.current_state(), State::Closed);
        assert!(call(&sc, false).is_pass());
    }

    #[test]
    fn failed_probe_reopens() {
        let (sc, manager) = chain(FuseGrade::ExceptionCount, 2.0);
        for _ in 0..4 {
            call(&sc, true);
        }
        assert!(call(&sc, false).is_blocked());
        sleep_for_ms(150);
        assert!(call(&sc, true).is_pass());
        let breaker = manager.get_breakers_of_resource("abc").unwrap()[0].clone();
        assert_eq!(breaker.current_state(), State::Open);
        assert!(call(&sc, false).is_blocked());
    }

    #[test]
    fn unguarded_resource() {
        let (sc, _) = chain(FuseGrade::ExceptionCount, 1.0);
        let ctx = new_ctx("def");
        assert!(sc.entry(&ctx).is_pass());
        sc.exit(&ctx);
    }
}
