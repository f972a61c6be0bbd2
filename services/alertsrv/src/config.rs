//! AlertSrv configuration
//!
//! Loaded from built-in defaults, then `config/alertsrv.yaml` (or the path
//! given with `--config`), then `ALERTSRV_*` environment variables with `__`
//! separating nested keys, e.g. `ALERTSRV_RATE_LIMIT__MAX_REQUESTS=120`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use common::ConfigLoader;
use errors::{StockwatchError, StockwatchResult};

use crate::notifier::{DeliveryKind, NotifierConfig};
use crate::services::{RateLimitBackend, RateLimitConfig, SweeperConfig, Thresholds};

pub const DEFAULT_CONFIG_PATH: &str = "config/alertsrv.yaml";
pub const ENV_PREFIX: &str = "ALERTSRV_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSrvConfig {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub detector: Thresholds,
    pub sweeper: SweeperConfig,
    pub notifier: NotifierConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Upper bound for webhook request bodies
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "alertsrv".to_string(),
            host: "0.0.0.0".to_string(),
            port: 6010,
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "stockwatch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            json: false,
        }
    }
}

impl AlertSrvConfig {
    /// Load with file and environment overrides
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> StockwatchResult<Self> {
        let mut loader = ConfigLoader::<Self>::new().with_env_prefix(ENV_PREFIX);
        loader = match path {
            Some(path) => loader.with_yaml_file(path).require_file(),
            None => loader.with_yaml_file(DEFAULT_CONFIG_PATH),
        };

        let config = loader
            .build()
            .map_err(|e| StockwatchError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }

    pub fn validate(&self) -> StockwatchResult<()> {
        let invalid = |field: &str, reason: &str| {
            Err(StockwatchError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.service.port == 0 {
            return invalid("service.port", "must be non-zero");
        }
        if self.rate_limit.window_secs == 0 {
            return invalid("rate_limit.window_secs", "must be at least one second");
        }
        if self.rate_limit.max_requests == 0 {
            return invalid("rate_limit.max_requests", "must be at least one");
        }
        if self.detector.temperature_min >= self.detector.temperature_max {
            return invalid("detector.temperature_min", "must be below temperature_max");
        }
        if self.detector.battery_critical_below > self.detector.battery_warning_below {
            return invalid(
                "detector.battery_critical_below",
                "must not exceed battery_warning_below",
            );
        }
        if self.sweeper.stale_after_secs == 0 {
            return invalid("sweeper.stale_after_secs", "must be non-zero");
        }
        self.sweeper.parse_schedule()?;

        let needs_redis = self.store.backend == StoreBackend::Redis
            || self.rate_limit.backend == RateLimitBackend::Redis;
        if needs_redis && self.store.redis_url.trim().is_empty() {
            return invalid("store.redis_url", "required for the redis backend");
        }
        if self.notifier.delivery == DeliveryKind::Webhook
            && self
                .notifier
                .webhook_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return invalid("notifier.webhook_url", "required for webhook delivery");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AlertSrvConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rate_limit.max_requests, 60);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.sweeper.stale_after_secs, 900);
        assert_eq!(config.detector.temperature_max, 30.0);
        assert_eq!(config.bind_address(), "0.0.0.0:6010");
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "service:\n  port: 7010\nrate_limit:\n  max_requests: 10\nsweeper:\n  schedule: \"0 */5 * * * *\""
        )
        .unwrap();

        let config = AlertSrvConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.service.port, 7010);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.sweeper.schedule, "0 */5 * * * *");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let err = AlertSrvConfig::load(Some(Path::new("/nonexistent/alertsrv.yaml"))).unwrap_err();
        assert!(matches!(err, StockwatchError::Configuration(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AlertSrvConfig::default();
        config.detector.temperature_min = 40.0;
        assert!(config.validate().is_err());

        let mut config = AlertSrvConfig::default();
        config.notifier.delivery = DeliveryKind::Webhook;
        assert!(config.validate().is_err());
        config.notifier.webhook_url = Some("http://relay.local/notify".into());
        config.validate().unwrap();

        let mut config = AlertSrvConfig::default();
        config.sweeper.schedule = "*/15 * * * * * * *".into();
        assert!(config.validate().is_err());
        config.sweeper.schedule = "*/15 * * * *".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_sample_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/alertsrv.yaml");
        let config = AlertSrvConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sweeper.schedule, "0 */15 * * * *");
        // The formatter appends /alerts/<id> itself
        let dashboard = config.notifier.dashboard_url.unwrap();
        assert!(!dashboard.trim_end_matches('/').ends_with("/alerts"));
    }
}
