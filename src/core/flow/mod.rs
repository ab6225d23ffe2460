//! Package flow implements the flow shaping control.
//!
//! flow module is based on the pass count of a sliding window, every rule
//! owns a traffic shaping `Controller` that consists of two parts:
//!
//!  1. `Calculator` calculates the actual threshold. Two strategies are supported: Direct and WarmUp.
//!  2. `Checker` compares the current statistic with the threshold and yields the token result.

pub mod rule;
pub mod rule_manager;
pub mod slot;
pub mod traffic_shaping;

pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
pub use traffic_shaping::*;
