use super::constant::*;
use crate::{
    base::{check_validity_for_reuse_statistic, check_validity_for_statistic, constant::*, ResourceType},
    utils, Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// app_name represents the name of current running service.
    pub app_name: String,
    /// app_type indicates the resource_type of the service (e.g. web service, API gateway).
    pub app_type: ResourceType,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.into(),
            app_type: DEFAULT_APP_TYPE.into(),
        }
    }
}

/// LogConfig represent the configuration of logging.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// configuration file of the log4rs backend
    pub config_file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            config_file: LOG_CONFIG_FILE.into(),
        }
    }
}

/// Window of the per-key counters used by limit-key rules.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LimitKeyStatConfig {
    pub sample_count: u32,
    pub interval_ms: u32,
    /// max amount of distinct keys tracked in each bucket, the least recently used are evicted
    pub max_key_capacity: usize,
}

impl Default for LimitKeyStatConfig {
    fn default() -> Self {
        LimitKeyStatConfig {
            sample_count: DEFAULT_LIMIT_KEY_SAMPLE_COUNT,
            interval_ms: DEFAULT_LIMIT_KEY_INTERVAL_MS,
            max_key_capacity: DEFAULT_LIMIT_KEY_CAPACITY,
        }
    }
}

/// Default window of the circuit breakers, used when a fuse rule does not set its own.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FuseStatConfig {
    pub sample_count: u32,
    pub interval_ms: u32,
}

impl Default for FuseStatConfig {
    fn default() -> Self {
        FuseStatConfig {
            sample_count: DEFAULT_FUSE_SAMPLE_COUNT,
            interval_ms: DEFAULT_FUSE_INTERVAL_MS,
        }
    }
}

/// StatConfig represents configuration items related to statistics.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StatConfig {
    /// sample_count_total and interval_ms_total is the per resource's global default statistic sliding window config
    pub sample_count_total: u32,
    pub interval_ms_total: u32,
    /// sample_count and interval_ms is the per resource's default readonly metric statistic,
    /// it must be reusable based on the global statistic.
    pub sample_count: u32,
    pub interval_ms: u32,
    pub limit_key: LimitKeyStatConfig,
    pub fuse: FuseStatConfig,
}

impl Default for StatConfig {
    fn default() -> Self {
        StatConfig {
            sample_count_total: DEFAULT_SAMPLE_COUNT_TOTAL,
            interval_ms_total: DEFAULT_INTERVAL_MS_TOTAL,
            sample_count: DEFAULT_SAMPLE_COUNT,
            interval_ms: DEFAULT_INTERVAL_MS,
            limit_key: LimitKeyStatConfig::default(),
            fuse: FuseStatConfig::default(),
        }
    }
}

/// WardenConfig represent the general configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WardenConfig {
    pub app: AppConfig,
    pub log: LogConfig,
    pub stat: StatConfig,
    /// use_cache_time indicates whether to cache time(ms) in a background ticker
    pub use_cache_time: bool,
}

impl Default for WardenConfig {
    fn default() -> Self {
        WardenConfig {
            app: AppConfig::default(),
            log: LogConfig::default(),
            stat: StatConfig::default(),
            use_cache_time: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConfigEntity {
    pub version: String,
    pub config: WardenConfig,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        ConfigEntity {
            version: WARDEN_VERSION.into(),
            config: WardenConfig::default(),
        }
    }
}

impl ConfigEntity {
    pub fn new() -> Self {
        ConfigEntity::default()
    }

    pub fn check(&self) -> Result<()> {
        if utils::is_blank(&self.version) {
            return Err(Error::msg("empty version"));
        }
        if utils::is_blank(&self.config.app.app_name) {
            return Err(Error::msg("empty app name"));
        }
        let stat = &self.config.stat;
        check_validity_for_reuse_statistic(
            stat.sample_count,
            stat.interval_ms,
            stat.sample_count_total,
            stat.interval_ms_total,
        )?;
        check_validity_for_statistic(
            stat.limit_key.sample_count,
            stat.limit_key.interval_ms,
            "Invalid parameters, sample_count or interval_ms, for limit key statistic",
        )?;
        if stat.limit_key.max_key_capacity == 0 {
            return Err(Error::msg("illegal limit key configuration: max_key_capacity is 0"));
        }
        check_validity_for_statistic(
            stat.fuse.sample_count,
            stat.fuse.interval_ms,
            "Invalid parameters, sample_count or interval_ms, for circuit breaker statistic",
        )?;
        Ok(())
    }

    pub fn app_name(&self) -> &String {
        &self.config.app.app_name
    }

    pub fn app_type(&self) -> &ResourceType {
        &self.config.app.app_type
    }

    pub fn log_config_file(&self) -> &String {
        &self.config.log.config_file
    }

    pub fn use_cache_time(&self) -> bool {
        self.config.use_cache_time
    }

    pub fn global_stat_interval_ms_total(&self) -> u32 {
        self.config.stat.interval_ms_total
    }

    pub fn global_stat_sample_count_total(&self) -> u32 {
        self.config.stat.sample_count_total
    }

    pub fn metric_stat_interval_ms(&self) -> u32 {
        self.config.stat.interval_ms
    }

    pub fn metric_stat_sample_count(&self) -> u32 {
        self.config.stat.sample_count
    }
}

impl fmt::Display for ConfigEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(fmtted) => write!(f, "{}", fmtted),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        ConfigEntity::new().check().unwrap();
    }

    #[test]
    fn invalid_entity() {
        let mut entity = ConfigEntity::new();
        entity.config.app.app_name = " ".into();
        assert_eq!(entity.check().unwrap_err().to_string(), "empty app name");

        let mut entity = ConfigEntity::new();
        entity.config.stat.interval_ms = 3000;
        assert!(entity.check().is_err());

        let mut entity = ConfigEntity::new();
        entity.config.stat.limit_key.max_key_capacity = 0;
        assert!(entity.check().is_err());

        let mut entity = ConfigEntity::new();
        entity.config.stat.fuse.sample_count = 3;
        assert!(entity.check().is_err());
    }

    #[test]
    fn from_yaml() {
        let yaml = r#"
version: v1
config:
  app:
    app_name: order-service
    app_type: Web
  stat:
    limit_key:
      max_key_capacity: 64
"#;
        let entity: ConfigEntity = serde_yaml::from_str(yaml).unwrap();
        entity.check().unwrap();
        assert_eq!(entity.app_name(), "order-service");
        assert_eq!(*entity.app_type(), ResourceType::Web);
        assert_eq!(entity.config.stat.limit_key.max_key_capacity, 64);
        assert_eq!(
            entity.config.stat.limit_key.interval_ms,
            DEFAULT_LIMIT_KEY_INTERVAL_MS
        );
        assert_eq!(entity.metric_stat_sample_count(), DEFAULT_SAMPLE_COUNT);
        assert!(!entity.use_cache_time());
    }
}
