use super::NodeStorage;
use crate::{
    base::{
        BaseSlot, EntryContext, MetricEvent, Next, Slot, StatNode, TokenResult, TrafficType,
    },
    callback::CallbackRegistry,
    logging, Result,
};
use std::sync::Arc;

pub const STAT_SLOT_ORDER: u32 = 1000;

/// The statistic slot runs first and wraps every rule checking slot,
/// so the pass/block counters reflect every attempt on the resource.
pub struct ResourceNodeStatSlot {
    nodes: Arc<NodeStorage>,
    callbacks: Arc<CallbackRegistry>,
}

impl ResourceNodeStatSlot {
    pub fn new(nodes: Arc<NodeStorage>, callbacks: Arc<CallbackRegistry>) -> Self {
        ResourceNodeStatSlot { nodes, callbacks }
    }

    fn record_pass_for(&self, node: &dyn StatNode, count: u32) {
        node.increase_concurrency();
        node.add_count(MetricEvent::Pass, count as u64);
    }

    fn record_block_for(&self, node: &dyn StatNode, count: u32) {
        node.add_count(MetricEvent::Block, count as u64)
    }

    fn record_complete_for(&self, node: &dyn StatNode, count: u32, round_trip: u64, errors: u64) {
        node.add_count(MetricEvent::Rt, round_trip);
        node.add_count(MetricEvent::Complete, count as u64);
        if errors > 0 {
            node.add_count(MetricEvent::Error, errors);
        }
        node.decrease_concurrency();
    }
}

impl BaseSlot for ResourceNodeStatSlot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl Slot for ResourceNodeStatSlot {
    fn entry(&self, ctx: &mut EntryContext, next: Next<'_>) -> Result<TokenResult> {
        let node = match self
            .nodes
            .get_or_create_resource_node(ctx.resource().name(), *ctx.resource().resource_type())
        {
            Ok(node) => node,
            Err(err) => {
                // without a node there is nothing to record, the rules still apply
                logging::warn!(
                    "[ResourceNodeStatSlot] Fail to get resource node of {}, error: {:?}",
                    ctx.resource().name(),
                    err
                );
                ctx.add_slot_error(err);
                return Ok(next.entry(ctx));
            }
        };
        ctx.set_stat_node(node.clone());

        let result = next.entry(ctx);

        let count = ctx.input().batch_count();
        let inbound = *ctx.resource().traffic_type() == TrafficType::Inbound;
        match &result {
            TokenResult::Pass => {
                self.record_pass_for(node.as_ref(), count);
                if inbound {
                    self.record_pass_for(self.nodes.inbound_node().as_ref(), count);
                }
                self.callbacks.after_pass(ctx);
            }
            TokenResult::Blocked(block_err) => {
                self.record_block_for(node.as_ref(), count);
                if inbound {
                    self.record_block_for(self.nodes.inbound_node().as_ref(), count);
                }
                self.callbacks.after_blocked(ctx, block_err);
            }
        }
        Ok(result)
    }

    fn exit(&self, ctx: &mut EntryContext) -> Result<()> {
        // blocked invocations never increased the concurrency
        if ctx.is_blocked() {
            return Ok(());
        }
        let node = match ctx.stat_node() {
            Some(node) => node,
            None => return Ok(()),
        };
        let count = ctx.input().batch_count();
        let round_trip = ctx.round_trip();
        let errors = ctx.err_count();
        self.record_complete_for(node.as_ref(), count, round_trip, errors);
        if *ctx.resource().traffic_type() == TrafficType::Inbound {
            self.record_complete_for(
                self.nodes.inbound_node().as_ref(),
                count,
                round_trip,
                errors,
            );
        }
        Ok(())
    }
}
