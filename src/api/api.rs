use super::global_slot_chain;
use crate::base::{
    BlockError, EntryContext, ParamsList, ResourceToken, ResourceType, ResourceWrapper,
    EntryInput, SlotChain, TokenResult, TrafficType,
};
use crate::Error;
use std::sync::{Arc, RwLock};

/// EntryBuilder is the basic API of the engine.
pub struct EntryBuilder {
    resource_name: String,
    resource_type: ResourceType,
    traffic_type: TrafficType,
    batch_count: u32,
    /// the global slot chain when absent
    slot_chain: Option<Arc<SlotChain>>,
    args: Option<ParamsList>,
}

impl EntryBuilder {
    pub fn new(resource_name: String) -> Self {
        EntryBuilder {
            resource_name,
            resource_type: ResourceType::default(),
            traffic_type: TrafficType::default(),
            batch_count: 1,
            slot_chain: None,
            args: None,
        }
    }

    /// `build()` consumes the EntryBuilder and drives the forward pass of the slot chain.
    /// A blocked invocation has already gone through its exit pass when the error is returned.
    pub fn build(self) -> Result<ResourceToken, BlockError> {
        let slot_chain = self.slot_chain.unwrap_or_else(global_slot_chain);

        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            self.resource_name,
            self.resource_type,
            self.traffic_type,
        ));
        let mut input = EntryInput::new(self.batch_count);
        if let Some(args) = self.args {
            input.set_args(args);
        }
        ctx.set_input(input);

        let ctx = Arc::new(RwLock::new(ctx));
        let token = ResourceToken::new(Arc::clone(&ctx), Arc::clone(&slot_chain));
        match slot_chain.entry(&ctx) {
            TokenResult::Blocked(block_err) => {
                token.exit();
                Err(block_err)
            }
            TokenResult::Pass => Ok(token),
        }
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn with_traffic_type(mut self, traffic_type: TrafficType) -> Self {
        self.traffic_type = traffic_type;
        self
    }

    pub fn with_batch_count(mut self, batch_count: u32) -> Self {
        self.batch_count = batch_count;
        self
    }

    pub fn with_slot_chain(mut self, slot_chain: Arc<SlotChain>) -> Self {
        self.slot_chain = Some(slot_chain);
        self
    }

    /// The first argument is the limit key of the invocation.
    pub fn with_args(mut self, args: ParamsList) -> Self {
        self.args = Some(args);
        self
    }
}

/// `entry` guards `resource_name` on the global slot chain.
pub fn entry(resource_name: &str, args: ParamsList) -> Result<ResourceToken, BlockError> {
    let builder = EntryBuilder::new(resource_name.into());
    if args.is_empty() {
        builder.build()
    } else {
        builder.with_args(args).build()
    }
}

/// `trace_error` records a business error of a passed invocation, reported to the slots on exit.
/// Block errors are admission decisions rather than business errors and are ignored.
pub fn trace_error(token: &ResourceToken, err: Error, count: u64) {
    if err.downcast_ref::<BlockError>().is_some() {
        return;
    }
    token.set_err(err, count);
}
