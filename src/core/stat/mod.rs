//! Sliding-window statistics and the resource nodes built on them.

pub mod base;
pub mod node_storage;
pub mod resource_node;
pub mod stat_slot;

pub use self::base::*;
pub use node_storage::*;
pub use resource_node::*;
pub use stat_slot::*;
