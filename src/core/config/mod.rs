//! Engine-level configuration, loaded from YAML and overridden by the system environment.

#[allow(clippy::module_inception)]
pub mod config;
pub mod constant;
pub mod entity;

pub use self::config::*;
pub use constant::*;
pub use entity::*;
