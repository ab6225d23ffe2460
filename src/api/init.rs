//! Initialization prepares the runtime environment of the engine:
//! 1. override the global config, from a given entity, a YAML file or the system environment
//! 2. initialize the logging backend
//! 3. start the time ticker when cached time is enabled

use super::{config, config::ConfigEntity};
use crate::{utils, Result};

/// `init_default` initializes the engine using the configuration from the system
/// environment and the default values.
#[inline]
pub fn init_default() -> Result<()> {
    init_warden(&mut String::new())
}

/// `init_with_config` initializes the engine using the given config.
#[inline]
pub fn init_with_config(config_entity: ConfigEntity) -> Result<()> {
    config_entity.check()?;
    config::reset_global_config(config_entity);
    config::override_items_from_system_env()?;
    config::init_log()?;
    init_core_components()
}

/// `init_with_config_file` loads the general configuration from the given YAML file
/// and initializes the engine. A blank path falls back to `WARDEN_CONFIG_FILE_PATH`.
#[inline]
pub fn init_with_config_file(config_path: &mut String) -> Result<()> {
    init_warden(config_path)
}

#[inline]
fn init_warden(config_path: &mut String) -> Result<()> {
    config::init_config_with_yaml(config_path)?;
    config::init_log()?;
    init_core_components()
}

#[inline]
fn init_core_components() -> Result<()> {
    if config::use_cache_time() {
        utils::ticker::start_time_ticker();
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn init_with_missing_file() {
        let mut path = String::from("testdata/config/not_exist.yaml");
        assert!(init_with_config_file(&mut path).is_err());
    }

    #[test]
    fn init_with_file() {
        let mut path = String::from("testdata/config/warden.yaml");
        init_with_config_file(&mut path).unwrap();
        assert_eq!(config::limit_key_capacity(), 10000);
    }

    #[test]
    fn init_with_invalid_config() {
        let mut entity = ConfigEntity::new();
        entity.config.stat.limit_key.max_key_capacity = 0;
        assert!(init_with_config(entity).is_err());
    }
}
