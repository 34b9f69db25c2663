use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    pub websocket: bool,
    pub analytics: bool,
    pub error_reporting: bool,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub socket_url: String,
    pub api_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub features: FeatureFlags,
    pub analytics_id: Option<String>,
    pub error_tracking_url: Option<String>,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub keyring_fallback: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            socket_url: "ws://localhost:5000/socket".to_string(),
            api_timeout_secs: 10,
            cache_ttl_secs: 30,
            features: FeatureFlags::default(),
            analytics_id: None,
            error_tracking_url: None,
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            keyring_fallback: false,
        }
    }
}

fn flag(name: &str) -> bool {
    env::var(name).map(|v| v == "true" || v == "1").unwrap_or(false)
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            api_url: env::var("EMPATHY_API_URL").unwrap_or(defaults.api_url),
            socket_url: env::var("EMPATHY_SOCKET_URL").unwrap_or(defaults.socket_url),
            api_timeout_secs: env::var("EMPATHY_API_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.api_timeout_secs),
            cache_ttl_secs: env::var("EMPATHY_CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.cache_ttl_secs),
            features: FeatureFlags {
                websocket: flag("ENABLE_WEBSOCKET"),
                analytics: flag("ENABLE_ANALYTICS"),
                error_reporting: flag("ENABLE_ERROR_REPORTING"),
            },
            analytics_id: optional("ANALYTICS_ID"),
            error_tracking_url: optional("ERROR_TRACKING_URL"),
            data_dir: env::var("EMPATHY_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            keyring_fallback: flag("KEYRING_FALLBACK"),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
