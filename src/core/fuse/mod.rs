//! Circuit breaking ("fuse") guards a resource against a failing or slow dependency.
//!
//! Every fuse rule is turned into a circuit breaker that owns its own sliding window.

pub mod breaker;
pub mod rule;
pub mod rule_manager;
pub mod slot;

pub use breaker::*;
pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
