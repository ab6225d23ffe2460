use super::{BlockError, ResourceWrapper, StatNode, TokenResult};
use crate::utils::time::curr_time_millis;
use crate::Error;
use std::sync::{Arc, RwLock};

pub type ContextPtr = Arc<RwLock<EntryContext>>;

/// Per-invocation state threaded through the slot chain on entry and on exit.
#[derive(Debug, Default)]
pub struct EntryContext {
    /// Use to calculate RT
    start_time: u64,
    /// The round trip time of this invocation, set right before the exit pass
    round_trip: u64,
    resource: ResourceWrapper,
    stat_node: Option<Arc<dyn StatNode>>,
    input: EntryInput,
    /// the result of rule slots check
    rule_check_result: TokenResult,
    /// business error reported by `trace_error`
    err: Option<Error>,
    err_count: u64,
    /// errors and panics swallowed at the slot boundaries
    slot_errors: Vec<Error>,
}

impl EntryContext {
    pub fn new() -> Self {
        EntryContext {
            start_time: curr_time_millis(),
            ..Default::default()
        }
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn is_blocked(&self) -> bool {
        self.rule_check_result.is_blocked()
    }

    pub fn set_round_trip(&mut self, round_trip: u64) {
        self.round_trip = round_trip
    }

    pub fn round_trip(&self) -> u64 {
        self.round_trip
    }

    pub fn set_resource(&mut self, resource: ResourceWrapper) {
        self.resource = resource;
    }

    pub fn resource(&self) -> &ResourceWrapper {
        &self.resource
    }

    pub fn set_input(&mut self, input: EntryInput) {
        self.input = input;
    }

    pub fn input(&self) -> &EntryInput {
        &self.input
    }

    pub fn set_stat_node(&mut self, stat_node: Arc<dyn StatNode>) {
        self.stat_node = Some(stat_node);
    }

    pub fn stat_node(&self) -> Option<Arc<dyn StatNode>> {
        self.stat_node.clone()
    }

    pub fn set_result(&mut self, result: TokenResult) {
        self.rule_check_result = result;
    }

    pub fn result(&self) -> &TokenResult {
        &self.rule_check_result
    }

    pub fn block_err(&self) -> Option<BlockError> {
        self.rule_check_result.block_err()
    }

    /// Records a business error. Repeated calls accumulate the count and keep the latest cause.
    pub fn set_err(&mut self, err: Error, count: u64) {
        self.err = Some(err);
        self.err_count += count;
    }

    pub fn get_err(&self) -> &Option<Error> {
        &self.err
    }

    pub fn err_count(&self) -> u64 {
        self.err_count
    }

    pub fn add_slot_error(&mut self, err: Error) {
        self.slot_errors.push(err);
    }

    pub fn slot_errors(&self) -> &[Error] {
        &self.slot_errors
    }
}

pub type ParamKey = String;
pub type ParamsList = Vec<ParamKey>;

/// Input of the rule checking slots
#[derive(Debug)]
pub struct EntryInput {
    batch_count: u32,
    /// the first argument is used as the limit key
    args: Option<ParamsList>,
}

impl Default for EntryInput {
    fn default() -> Self {
        EntryInput {
            batch_count: 1,
            args: None,
        }
    }
}

impl EntryInput {
    pub fn new(batch_count: u32) -> Self {
        EntryInput {
            batch_count,
            ..Default::default()
        }
    }

    pub fn set_batch_count(&mut self, batch_count: u32) {
        self.batch_count = batch_count;
    }

    pub fn batch_count(&self) -> u32 {
        self.batch_count
    }

    pub fn set_args(&mut self, args: ParamsList) {
        self.args = Some(args);
    }

    pub fn args(&self) -> Option<&ParamsList> {
        self.args.as_ref()
    }

    /// The limit key of this invocation, if any.
    pub fn first_arg(&self) -> Option<&ParamKey> {
        self.args.as_ref().and_then(|args| args.first())
    }
}
