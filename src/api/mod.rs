//! mod `api` provides the topmost APIs of the engine.
//!
//! Rules can be loaded before or after initialization, the engine works with the
//! default configuration until one of the following is called:
//!
//!  1. `init_default()`, using the default config and the system environment.
//!  2. `init_with_config(config_entity)`, using a customized `ConfigEntity`.
//!  3. `init_with_config_file(config_path)`, using a YAML file.
//!
//! A guarded call looks like this:
//!
//! ```ignore
//! use warden::{api::EntryBuilder, base::TrafficType, core::rule_manager::RuleConfig};
//!
//! warden::init_default().unwrap_or_else(|err| warden::logging::error!("{:?}", err));
//! warden::load_rule(&RuleConfig::flow("some-test", 10.0));
//!
//! let entry_builder = EntryBuilder::new("some-test".into())
//!     .with_traffic_type(TrafficType::Inbound);
//! match entry_builder.build() {
//!     Ok(token) => {
//!         // Passed, wrap the logic here.
//!         // Be sure the token is exited finally.
//!         token.exit();
//!     }
//!     Err(block_err) => {
//!         // Blocked. The reason is in the BlockError.
//!         println!("{}", block_err);
//!     }
//! }
//! ```

pub mod api;
pub mod init;
pub mod slot_chain;

pub use api::*;
pub use init::*;
pub use slot_chain::*;

pub use crate::core::config;
