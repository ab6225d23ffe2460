//! Per-key admission limits.
//!
//! The key of an invocation is its first argument, e.g. a tenant id. Every key of a
//! resource is counted in its own slot of the resource's limit-key window, so one
//! saturated key never affects the admission of another.

pub mod counter;
pub mod rule;
pub mod rule_manager;
pub mod slot;

pub use counter::*;
pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
