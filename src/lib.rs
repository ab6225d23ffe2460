//! # Warden
//!
//! Warden guards in-process access to named resources (method calls, RPC endpoints,
//! business actions) against overload. Each guarded call enters a resource, is driven
//! through an ordered chain of slots, and exits again once the business logic finishes.
//!
//! The default slot chain is
//!
//! ```text
//!   Statistic(1000) -> Flow(2000) -> Fuse(3000) -> LimitKey(4000)
//! ```
//!
//! - The statistic slot records pass/block/complete events on the resource node and fires
//!   the registered statistic callbacks.
//! - The flow slot enforces per-resource thresholds, either rejecting directly or ramping
//!   up slowly after a cold start (warm-up).
//! - The fuse slot runs a circuit breaker per fuse rule, graded on exception count,
//!   exception rate or average response time.
//! - The limit-key slot limits admissions per distinct key, taken from the first argument
//!   of the entry.
//!
//! All decisions are made synchronously on the caller's thread against sliding-window
//! statistics that rotate lazily, there is no background timer in the admission path.
//!
//! ```ignore
//! use warden::{api::EntryBuilder, core::rule_manager::RuleConfig};
//!
//! warden::init_default()?;
//! warden::load_rule(&RuleConfig::flow("GET:/api/orders", 20.0));
//!
//! match EntryBuilder::new("GET:/api/orders".into()).build() {
//!     Ok(token) => {
//!         // Passed, run the guarded logic here.
//!         token.exit();
//!     }
//!     Err(block_err) => {
//!         // Blocked, map it to a rejection response.
//!     }
//! }
//! ```
//!
//! Shared state (rules, nodes and callbacks) lives in an [`api::Registry`]. A process-wide
//! default registry backs the free functions, tests and embedders can construct their own
//! and build an isolated slot chain from it.

pub mod api;
pub mod core;
pub mod logging;
pub mod utils;

pub use crate::api::*;
pub use crate::core::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
