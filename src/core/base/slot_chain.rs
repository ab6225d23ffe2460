use super::{ContextPtr, EntryContext, TokenResult, SLOT_INIT};
use crate::utils::{curr_time_millis, AsAny};
use crate::{logging, Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// trait `PartialOrd` is not object safe.
/// SlotChain sorts its slots by ascending `order()`.
pub trait BaseSlot: Any + AsAny + Sync + Send {
    /// order returns the sort value of the slot.
    fn order(&self) -> u32 {
        0
    }
}

/// A stage of the admission pipeline.
///
/// On entry a slot either returns a blocked `TokenResult`, halting the chain,
/// or hands over to the downstream slots through `next` and may run its own
/// logic around them. On exit every slot is visited in reverse order,
/// regardless of what the other slots do.
pub trait Slot: BaseSlot {
    fn entry(&self, ctx: &mut EntryContext, next: Next<'_>) -> Result<TokenResult> {
        Ok(next.entry(ctx))
    }

    fn exit(&self, _ctx: &mut EntryContext) -> Result<()> {
        Ok(())
    }
}

/// Cursor over the slots downstream of the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    slots: &'a [Arc<dyn Slot>],
}

impl<'a> Next<'a> {
    fn new(slots: &'a [Arc<dyn Slot>]) -> Self {
        Next { slots }
    }

    /// Runs the forward pass of the remaining slots. An error or a panic raised
    /// by a slot is recorded on the context, the invocation then keeps the result
    /// the downstream slots already reached, or passes when they never ran.
    pub fn entry(self, ctx: &mut EntryContext) -> TokenResult {
        let (slot, rest) = match self.slots.split_first() {
            Some(split) => split,
            None => return TokenResult::new_pass(),
        };
        let next = Next::new(rest);
        match panic::catch_unwind(AssertUnwindSafe(|| slot.entry(ctx, next))) {
            Ok(Ok(result)) => {
                ctx.set_result(result.clone());
                result
            }
            Ok(Err(err)) => {
                logging::warn!(
                    "[SlotChain] Slot (order {}) failed on entry of {}, error: {:?}",
                    slot.order(),
                    ctx.resource().name(),
                    err
                );
                ctx.add_slot_error(err);
                ctx.result().clone()
            }
            Err(payload) => {
                let err = panic_to_error(payload);
                logging::error!(
                    "[SlotChain] Slot (order {}) panicked on entry of {}, error: {:?}",
                    slot.order(),
                    ctx.resource().name(),
                    err
                );
                ctx.add_slot_error(err);
                ctx.result().clone()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub(crate) fn panic_to_error(payload: Box<dyn Any + Send>) -> Error {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        Error::msg(format!("panicked: {}", msg))
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        Error::msg(format!("panicked: {}", msg))
    } else {
        Error::msg("panicked")
    }
}

/// SlotChain holds the system slots and customized slots in ascending `order()`.
pub struct SlotChain {
    slots: Vec<Arc<dyn Slot>>,
}

impl Default for SlotChain {
    fn default() -> Self {
        Self {
            slots: Vec::with_capacity(SLOT_INIT),
        }
    }
}

impl std::fmt::Debug for SlotChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|slot| slot.order()))
            .finish()
    }
}

impl SlotChain {
    pub fn new() -> Self {
        Default::default()
    }

    /// add_slot adds a slot and keeps the chain sorted by `order()` in ascending order.
    /// Slots with equal order keep their insertion order.
    /// add_slot is only meant to be called while the chain is being wired up.
    pub fn add_slot(&mut self, s: Arc<dyn Slot>) {
        self.slots.push(s);
        self.slots.sort_by_key(|a| a.order());
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The entrance of slot chain.
    /// The final result is also stored in the context.
    pub fn entry(&self, ctx_ptr: &ContextPtr) -> TokenResult {
        let mut ctx = ctx_ptr.write().unwrap();
        let result = Next::new(&self.slots).entry(&mut ctx);
        ctx.set_result(result.clone());
        result
    }

    /// Drives the reverse pass. Blocked invocations go through it as well,
    /// each slot decides from the context what to record.
    pub fn exit(&self, ctx_ptr: &ContextPtr) {
        let mut ctx = ctx_ptr.write().unwrap();
        if !ctx.is_blocked() {
            let round_trip = curr_time_millis().saturating_sub(ctx.start_time());
            ctx.set_round_trip(round_trip);
        }
        for slot in self.slots.iter().rev() {
            let res = panic::catch_unwind(AssertUnwindSafe(|| slot.exit(&mut ctx)));
            let err = match res {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(payload) => panic_to_error(payload),
            };
            logging::warn!(
                "[SlotChain] Slot (order {}) failed on exit of {}, error: {:?}",
                slot.order(),
                ctx.resource().name(),
                err
            );
            ctx.add_slot_error(err);
        }
    }
}
