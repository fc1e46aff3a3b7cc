//! slate.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use slate_pool::PoolConfig;
use slate_tasks::RetryPolicy;
use slate_watchdog::WatchdogConfig;

/// Aggregated service configuration. Every section and field has a
/// default, so an empty file (or no file) is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
    pub watchdog: WatchdogConfig,
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.pool.max_connections, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.watchdog.interval_secs, 300);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let toml_str = r#"
[pool]
min_connections = 4
max_connections = 32
connection_timeout_ms = 5000

[watchdog]
stale_task_max_age_secs = 900
ignore_suffix = "_probe"
"#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pool.min_connections, 4);
        assert_eq!(config.pool.max_connections, 32);
        // Unset fields keep their defaults.
        assert_eq!(config.pool.max_retries, 3);
        assert_eq!(config.watchdog.stale_task_max_age_secs, 900);
        assert_eq!(config.watchdog.ignore_suffix.as_deref(), Some("_probe"));
        assert_eq!(config.retry.base_delay_ms, 50);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ServiceConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed: ServiceConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pool.max_connections, config.pool.max_connections);
        assert_eq!(parsed.watchdog.task_retention_hours, config.watchdog.task_retention_hours);
    }

    #[test]
    fn from_file_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slate.toml");
        std::fs::write(&path, "[pool]\nmax_connections = 3\n").unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.pool.max_connections, 3);
    }
}
