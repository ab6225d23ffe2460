use crate::base::ResourceType;

// default app settings
pub const WARDEN_VERSION: &str = "v1";
pub const DEFAULT_APP_NAME: &str = "unknown_service";
pub const DEFAULT_APP_TYPE: u8 = ResourceType::Common as _;
pub const APP_NAME_ENV_KEY: &str = "WARDEN_APP_NAME";
pub const APP_TYPE_ENV_KEY: &str = "WARDEN_APP_TYPE";
pub const CONF_FILE_PATH_ENV_KEY: &str = "WARDEN_CONFIG_FILE_PATH";
/// Placeholder path meaning "keep the default configuration".
pub const CONFIG_FILENAME: &str = "USE_DEFAULT_CONFIGURATION";

// default log settings
pub const DEFAULT_LOG_LEVEL: &str = "warn";
pub const LOG_CONFIG_FILE: &str = "testdata/config/log4rs.yaml";

// default flow control settings
pub const WARM_UP_COLD_FACTOR: u32 = 3;
pub const WARM_UP_PERIOD_SEC: u32 = 10;
