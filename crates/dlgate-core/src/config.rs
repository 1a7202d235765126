use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on concurrently running async tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 15;
/// Default idle time after which a pooled worker thread exits.
pub const DEFAULT_WORKER_IDLE_TIMEOUT_SECS: u64 = 60;

/// Invalid values in a loaded configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("worker_idle_timeout_secs must be at least 1")]
    ZeroIdleTimeout,
    #[error("thread_name_prefix must not be empty")]
    EmptyThreadPrefix,
}

/// Dispatcher configuration loaded from `~/.config/dlgate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of async tasks running at once. Sync tasks are not counted.
    pub max_concurrency: usize,
    /// Seconds an idle worker thread waits for new work before exiting.
    #[serde(default = "default_idle_timeout_secs")]
    pub worker_idle_timeout_secs: u64,
    /// Worker threads are named `<prefix>-<n>`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_WORKER_IDLE_TIMEOUT_SECS
}

fn default_thread_name_prefix() -> String {
    "dlgate-download".to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            worker_idle_timeout_secs: default_idle_timeout_secs(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl DispatchConfig {
    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_idle_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.worker_idle_timeout_secs == 0 {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyThreadPrefix);
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlgate")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load and validate configuration from `path`.
pub fn load_from_path(path: &Path) -> Result<DispatchConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: DispatchConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load configuration from `path`, writing the defaults there first if it does not exist.
pub fn load_or_init_at(path: &Path) -> Result<DispatchConfig> {
    if !path.exists() {
        let default_cfg = DispatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(path)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DispatchConfig> {
    load_or_init_at(&config_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.max_concurrency, 15);
        assert_eq!(cfg.worker_idle_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.thread_name_prefix, "dlgate-download");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrency = 4
            worker_idle_timeout_secs = 5
            thread_name_prefix = "fetch"
        "#;
        let cfg: DispatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrency, 4);
        assert_eq!(cfg.worker_idle_timeout_secs, 5);
        assert_eq!(cfg.thread_name_prefix, "fetch");
    }

    #[test]
    fn config_toml_optional_fields_default() {
        let cfg: DispatchConfig = toml::from_str("max_concurrency = 2").unwrap();
        assert_eq!(cfg.worker_idle_timeout_secs, 60);
        assert_eq!(cfg.thread_name_prefix, "dlgate-download");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = DispatchConfig {
            max_concurrency: 0,
            ..DispatchConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroConcurrency));
        cfg.max_concurrency = 1;
        cfg.worker_idle_timeout_secs = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroIdleTimeout));
        cfg.worker_idle_timeout_secs = 1;
        cfg.thread_name_prefix = "  ".into();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyThreadPrefix));
    }

    #[test]
    fn load_or_init_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let created = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.max_concurrency, DEFAULT_MAX_CONCURRENCY);

        fs::write(&path, "max_concurrency = 3\n").unwrap();
        let loaded = load_or_init_at(&path).unwrap();
        assert_eq!(loaded.max_concurrency, 3);
    }

    #[test]
    fn load_from_path_rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_concurrency = 0\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroConcurrency)
        );
    }
}
