//! Statistic callbacks are notified by the statistic slot after the rule checks,
//! which lets cross-cutting statistics hook into the admission pipeline without
//! becoming slots themselves.

use crate::base::{slot_chain::panic_to_error, BlockError, EntryContext};
use crate::logging;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

pub trait StatCallback: Send + Sync {
    /// Invoked when the invocation passed every slot.
    /// The context carries the resource, the node, the batch count and the arguments.
    fn after_pass(&self, _ctx: &EntryContext) {}

    /// Invoked when the invocation was blocked by `block_error`.
    fn after_blocked(&self, _ctx: &EntryContext, _block_error: &BlockError) {}
}

/// Callbacks are copied on write, the notification path never holds the lock.
/// A panicking callback is logged and skipped, the others are still notified.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<Arc<Vec<Arc<dyn StatCallback>>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackRegistry {{ callbacks: {} }}", self.len())
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: Arc<dyn StatCallback>) {
        let mut callbacks = self.callbacks.write().unwrap();
        let mut updated = Vec::with_capacity(callbacks.len() + 1);
        updated.extend(callbacks.iter().cloned());
        updated.push(callback);
        *callbacks = Arc::new(updated);
    }

    pub fn clear(&self) {
        *self.callbacks.write().unwrap() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn StatCallback>>> {
        self.callbacks.read().unwrap().clone()
    }

    pub fn after_pass(&self, ctx: &EntryContext) {
        for callback in self.snapshot().iter() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback.after_pass(ctx)))
            {
                logging::error!(
                    "[CallbackRegistry] after_pass callback failed on {}, error: {:?}",
                    ctx.resource().name(),
                    panic_to_error(payload)
                );
            }
        }
    }

    pub fn after_blocked(&self, ctx: &EntryContext, block_error: &BlockError) {
        for callback in self.snapshot().iter() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| {
                callback.after_blocked(ctx, block_error)
            })) {
                logging::error!(
                    "[CallbackRegistry] after_blocked callback failed on {}, error: {:?}",
                    ctx.resource().name(),
                    panic_to_error(payload)
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::base::BlockType;
    use mockall::*;

    mock! {
        pub(crate) StatCallback {}
        impl StatCallback for StatCallback {
            fn after_pass(&self, ctx: &EntryContext);
            fn after_blocked(&self, ctx: &EntryContext, block_error: &BlockError);
        }
    }

    #[test]
    fn notify_in_registration_order() {
        let mut seq = Sequence::new();
        let mut first = MockStatCallback::new();
        let mut second = MockStatCallback::new();
        first
            .expect_after_pass()
            .once()
            .in_sequence(&mut seq)
            .return_const(());
        second
            .expect_after_pass()
            .once()
            .in_sequence(&mut seq)
            .return_const(());
        second
            .expect_after_blocked()
            .withf(|_, err| err.block_type() == BlockType::Flow)
            .once()
            .return_const(());
        first.expect_after_blocked().once().return_const(());

        let registry = CallbackRegistry::new();
        registry.register(Arc::new(first));
        registry.register(Arc::new(second));
        assert_eq!(registry.len(), 2);

        let ctx = EntryContext::new();
        registry.after_pass(&ctx);
        registry.after_blocked(&ctx, &BlockError::new(BlockType::Flow));

        registry.clear();
        assert!(registry.is_empty());
        registry.after_pass(&ctx);
    }

    #[test]
    fn panicking_callback_is_skipped() {
        let mut faulty = MockStatCallback::new();
        faulty
            .expect_after_blocked()
            .once()
            .returning(|_, _| panic!("broken callback"));
        let mut healthy = MockStatCallback::new();
        healthy.expect_after_blocked().once().return_const(());

        let registry = CallbackRegistry::new();
        registry.register(Arc::new(faulty));
        registry.register(Arc::new(healthy));
        let ctx = EntryContext::new();
        registry.after_blocked(&ctx, &BlockError::new(BlockType::Flow));
    }
}
