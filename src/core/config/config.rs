use super::{constant::*, ConfigEntity};
use crate::{base::ResourceType, logging, utils, Error, Result};
use lazy_static::lazy_static;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<ConfigEntity> = RwLock::new(ConfigEntity::new());
}

pub fn reset_global_config(entity: ConfigEntity) {
    *GLOBAL_CONFIG.write().unwrap() = entity;
}

/// init_config_with_yaml loads general configuration from the YAML file under provided path.
/// Priority: system environment > YAML file > default config
pub fn init_config_with_yaml(config_path: &mut String) -> Result<()> {
    apply_yaml_config_file(config_path)?;
    override_items_from_system_env()?;
    Ok(())
}

fn apply_yaml_config_file(config_path: &mut String) -> Result<()> {
    if utils::is_blank(config_path) {
        // If the config file path is absent, try to resolve it from the system env.
        *config_path = env::var(CONF_FILE_PATH_ENV_KEY).unwrap_or_else(|_| CONFIG_FILENAME.into());
    }
    load_global_config_from_yaml_file(config_path)
}

fn load_global_config_from_yaml_file(path_str: &str) -> Result<()> {
    if path_str == CONFIG_FILENAME {
        // keep the default config
        return Ok(());
    }
    let path = Path::new(path_str);
    if !path.exists() {
        return Err(Error::msg(format!(
            "YAML configuration file {} does not exist",
            path_str
        )));
    }
    let content = fs::read_to_string(path)?;
    let entity = parse_config_yaml(&content)?;
    logging::info!("[Config] Resolving config from file, file {}", path_str);
    reset_global_config(entity);
    Ok(())
}

/// Parses and validates a YAML config document.
pub fn parse_config_yaml(content: &str) -> Result<ConfigEntity> {
    let entity: ConfigEntity = serde_yaml::from_str(content)?;
    entity.check()?;
    Ok(entity)
}

/// Items present in the system environment override the loaded config.
pub fn override_items_from_system_env() -> Result<()> {
    let app_name = env::var(APP_NAME_ENV_KEY).ok();
    let app_type: Option<ResourceType> = env::var(APP_TYPE_ENV_KEY)
        .ok()
        .and_then(|t| t.parse::<u8>().ok())
        .map(ResourceType::from);

    let mut cfg = GLOBAL_CONFIG.write().unwrap();
    let mut overridden = cfg.clone();
    if let Some(app_name) = app_name {
        if !utils::is_blank(&app_name) {
            overridden.config.app.app_name = app_name;
        }
    }
    if let Some(app_type) = app_type {
        overridden.config.app.app_type = app_type;
    }
    overridden.check()?;
    *cfg = overridden;
    Ok(())
}

/// Installs the logging backend selected by the cargo features.
pub fn init_log() -> Result<()> {
    logging::logger_init(Some(log_config_file()));
    logging::info!("[Config] App name resolved, app_name {}", app_name());
    logging::info!(
        "[Config] Print effective global config, global_config {}",
        GLOBAL_CONFIG.read().unwrap()
    );
    Ok(())
}

#[inline]
pub fn log_config_file() -> String {
    GLOBAL_CONFIG.read().unwrap().log_config_file().clone()
}

#[inline]
pub fn app_name() -> String {
    GLOBAL_CONFIG.read().unwrap().app_name().clone()
}

#[inline]
pub fn app_type() -> ResourceType {
    *GLOBAL_CONFIG.read().unwrap().app_type()
}

#[inline]
pub fn use_cache_time() -> bool {
    GLOBAL_CONFIG.read().unwrap().use_cache_time()
}

#[inline]
pub fn global_stat_interval_ms_total() -> u32 {
    GLOBAL_CONFIG.read().unwrap().global_stat_interval_ms_total()
}

#[inline]
pub fn global_stat_sample_count_total() -> u32 {
    GLOBAL_CONFIG.read().unwrap().global_stat_sample_count_total()
}

#[inline]
pub fn global_stat_bucket_length_ms() -> u32 {
    global_stat_interval_ms_total() / global_stat_sample_count_total()
}

#[inline]
pub fn metric_stat_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().metric_stat_interval_ms()
}

#[inline]
pub fn metric_stat_sample_count() -> u32 {
    GLOBAL_CONFIG.read().unwrap().metric_stat_sample_count()
}

#[inline]
pub fn limit_key_stat_sample_count() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.limit_key.sample_count
}

#[inline]
pub fn limit_key_stat_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.limit_key.interval_ms
}

#[inline]
pub fn limit_key_capacity() -> usize {
    GLOBAL_CONFIG
        .read()
        .unwrap()
        .config
        .stat
        .limit_key
        .max_key_capacity
}

#[inline]
pub fn fuse_stat_sample_count() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.fuse.sample_count
}

#[inline]
pub fn fuse_stat_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.fuse.interval_ms
}

#[cfg(test)]
mod test {
    use super::*;

    // the global config is shared by the whole test binary, only read it here
    #[test]
    fn defaults() {
        assert_eq!(global_stat_bucket_length_ms(), 500);
        assert_eq!(limit_key_stat_interval_ms() % limit_key_stat_sample_count(), 0);
        assert!(limit_key_capacity() > 0);
        assert_eq!(fuse_stat_interval_ms() % fuse_stat_sample_count(), 0);
    }

    #[test]
    fn missing_file() {
        let mut path = String::from("/not/exist/warden.yaml");
        assert!(init_config_with_yaml(&mut path).is_err());
    }

    #[test]
    fn parse_invalid_yaml() {
        let yaml = "version: v1\nconfig:\n  stat:\n    sample_count: 3\n";
        assert!(parse_config_yaml(yaml).is_err());
        assert!(parse_config_yaml("version: [").is_err());
    }
}
