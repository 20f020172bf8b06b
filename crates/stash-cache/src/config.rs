use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sweeper::SweeperConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Cache manager configuration
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Which store backs the global keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Built-in DashMap store.
    #[default]
    Memory,
    /// Supplied by the embedding application via `CacheManager::with_backend`.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Soft bound on the number of keys (0 = unlimited)
    #[serde(default)]
    pub max_entries: usize,

    /// TTL applied when callers pass none (0 = no expiration)
    #[serde(default)]
    pub default_ttl_secs: u64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Max deadlines drained from the expiry index per batch
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// Idle time after which an uncleared request cache is reclaimed (0 = never)
    #[serde(default = "default_region_idle_secs")]
    pub region_idle_secs: u64,
}

/// Upper bound for `default_ttl_secs` (ten years).
pub const MAX_DEFAULT_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_sweep_batch_size() -> usize {
    1024
}

fn default_region_idle_secs() -> u64 {
    300 // 5 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            max_entries: 0,
            default_ttl_secs: 0,
            sweep_interval_ms: default_sweep_interval_ms(),
            sweep_batch_size: default_sweep_batch_size(),
            region_idle_secs: default_region_idle_secs(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_ms == 0 {
            return Err("cache.sweep_interval_ms must be > 0".into());
        }
        if self.sweep_batch_size == 0 {
            return Err("cache.sweep_batch_size must be > 0".into());
        }
        if self.default_ttl_secs > MAX_DEFAULT_TTL_SECS {
            return Err(format!(
                "cache.default_ttl_secs must be <= {MAX_DEFAULT_TTL_SECS}"
            ));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn region_idle_threshold(&self) -> Option<Duration> {
        (self.region_idle_secs > 0).then(|| Duration::from_secs(self.region_idle_secs))
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            interval: self.sweep_interval(),
            batch_size: self.sweep_batch_size,
            region_idle: self.region_idle_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Layered loading: TOML file, then `STASH__`-prefixed environment variables.
pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File};

    use super::AppConfig;

    /// File read when no path is given. Missing is fine.
    pub const DEFAULT_CONFIG_FILE: &str = "stash.toml";

    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist; the default `stash.toml` is optional.
    /// `STASH__CACHE__DEFAULT_TTL_SECS=30` style variables override the file.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let file = match path {
            Some(p) if !Path::new(p).exists() => {
                return Err(format!("config file not found: {p}"));
            }
            Some(p) => File::with_name(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let merged: AppConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("STASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| format!("config build error: {e}"))?
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;

        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.default_ttl(), None);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(1));
        assert_eq!(cfg.region_idle_threshold(), Some(Duration::from_secs(300)));
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_disables_optional_durations() {
        let cfg = CacheConfig {
            default_ttl_secs: 30,
            region_idle_secs: 0,
            ..CacheConfig::default()
        };
        assert_eq!(cfg.default_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.sweeper().region_idle, None);
    }

    #[test]
    fn test_validation_errors() {
        let cfg = CacheConfig {
            sweep_interval_ms: 0,
            ..CacheConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("sweep_interval_ms"));

        let cfg = CacheConfig {
            default_ttl_secs: u64::MAX,
            ..CacheConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("default_ttl_secs"));
        let cfg = CacheConfig {
            default_ttl_secs: MAX_DEFAULT_TTL_SECS,
            ..CacheConfig::default()
        };
        assert!(cfg.validate().is_ok());

        let app = AppConfig {
            logging: LoggingConfig {
                level: "loud".into(),
            },
            ..AppConfig::default()
        };
        assert!(app.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn test_deserialize_partial_table() {
        let cfg: AppConfig = serde_json::from_value(serde_json::json!({
            "cache": { "backend": "custom", "max_entries": 10 }
        }))
        .unwrap();
        assert_eq!(cfg.cache.backend, BackendKind::Custom);
        assert_eq!(cfg.cache.max_entries, 10);
        assert_eq!(cfg.cache.sweep_batch_size, 1024);
        assert_eq!(cfg.logging.level, "info");
    }
}
