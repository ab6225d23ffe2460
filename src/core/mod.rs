pub mod base;
// statistic callbacks notified by the statistic slot
pub mod callback;
pub mod config;
// rule checking slots
pub mod flow;
pub mod fuse;
pub mod limit_key;
pub mod rule_manager;
// statistic slot, resource nodes and sliding windows
pub mod stat;
