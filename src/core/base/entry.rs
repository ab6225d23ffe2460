use super::{ContextPtr, SlotChain};
use crate::{logging, Error};
use std::sync::Arc;

/// The per-call handle returned by a successful entry.
///
/// `exit` consumes the token, so an invocation can only be completed once.
/// A token dropped without calling `exit` (an early return or an unwinding panic
/// in the guarded code) completes itself in `Drop`.
pub struct ResourceToken {
    ctx: ContextPtr,
    /// each token traverses the slot chain it entered through
    sc: Arc<SlotChain>,
    exited: bool,
}

impl ResourceToken {
    pub fn new(ctx: ContextPtr, sc: Arc<SlotChain>) -> Self {
        ResourceToken {
            ctx,
            sc,
            exited: false,
        }
    }

    pub fn context(&self) -> &ContextPtr {
        &self.ctx
    }

    pub fn resource_name(&self) -> String {
        self.ctx.read().unwrap().resource().name().clone()
    }

    /// Records a business error that will be reported to the slots on exit.
    pub fn set_err(&self, err: Error, count: u64) {
        self.ctx.write().unwrap().set_err(err, count);
    }

    pub fn exit(mut self) {
        self.do_exit();
    }

    fn do_exit(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        self.sc.exit(&self.ctx);
    }
}

impl Drop for ResourceToken {
    fn drop(&mut self) {
        if !self.exited {
            let name = self
                .ctx
                .read()
                .map(|ctx| ctx.resource().name().clone())
                .unwrap_or_default();
            logging::warn!(
                "[ResourceToken] Token of {} dropped without exit, completing it",
                name
            );
            self.do_exit();
        }
    }
}
