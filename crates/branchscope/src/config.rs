//! Engine configuration.
//!
//! Read from `~/.branchscope/config.toml` when present; every key is optional.
//!
//! ```toml
//! database_path = "/var/lib/branchscope/store.sqlite3"
//! scan_concurrency = 4
//! lock_ttl_secs = 900
//! debug_mode = false
//! extended_features = true
//!
//! [[tables]]
//! name = "orders"
//!
//! [[tables]]
//! name = "customers"
//! feature_key = "customers"
//! shared_flag_column = "is_shared"
//! ```

use crate::error::{EngineError, Result};
use crate::registry::{FeatureKey, ScopedTable, TableRegistry};
use branchscope_logging::{branchscope_home, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_FILE: &str = "branchscope.sqlite3";
const MAX_SCAN_CONCURRENCY: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// SQLite file; defaults to `~/.branchscope/branchscope.sqlite3`.
    pub database_path: Option<PathBuf>,
    /// Upper bound on concurrent table scans.
    pub scan_concurrency: usize,
    /// Age after which a maintenance lock is considered abandoned.
    pub lock_ttl_secs: u64,
    /// Verbose per-query logging for every call.
    pub debug_mode: bool,
    /// Also audit gift cards and employees in isolation tests.
    pub extended_features: bool,
    /// Replaces the built-in table registry when set.
    pub tables: Option<Vec<ScopedTable>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            scan_concurrency: 4,
            lock_ttl_secs: 900,
            debug_mode: false,
            extended_features: false,
            tables: None,
        }
    }
}

impl EngineConfig {
    /// `~/.branchscope/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(home()?.join(CONFIG_FILE))
    }

    /// Load the default config file, or defaults when it does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| EngineError::configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::configuration(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_concurrency == 0 || self.scan_concurrency > MAX_SCAN_CONCURRENCY {
            return Err(EngineError::configuration(format!(
                "scan_concurrency must be between 1 and {}, got {}",
                MAX_SCAN_CONCURRENCY, self.scan_concurrency
            )));
        }
        if self.lock_ttl_secs == 0 {
            return Err(EngineError::configuration("lock_ttl_secs must be positive"));
        }
        self.registry().map(|_| ())
    }

    pub fn registry(&self) -> Result<TableRegistry> {
        match &self.tables {
            Some(tables) => TableRegistry::new(tables.clone()),
            None => Ok(TableRegistry::default()),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(home()?.join(DEFAULT_DB_FILE)),
        }
    }

    pub fn features(&self) -> &'static [FeatureKey] {
        if self.extended_features {
            &FeatureKey::EXTENDED_SET
        } else {
            &FeatureKey::DEFAULT_SET
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_debug_flag(self.debug_mode)
    }
}

fn home() -> Result<PathBuf> {
    branchscope_home().map_err(|e| EngineError::configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.features().len(), 5);
        assert_eq!(config.lock_ttl(), Duration::from_secs(900));
        assert_eq!(config.log_level(), LogLevel::Normal);
    }

    #[test]
    fn parses_registry_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            scan_concurrency = 2
            extended_features = true
            debug_mode = true

            [[tables]]
            name = "orders"

            [[tables]]
            name = "customers"
            feature_key = "customers"
            shared_flag_column = "is_shared"
            "#,
        )
        .unwrap();

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(config.features().len(), 7);
        assert!(config.log_level().is_verbose());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(EngineConfig::from_toml_str("scan_concurrency = 0").is_err());
        assert!(EngineConfig::from_toml_str("lock_ttl_secs = 0").is_err());
        assert!(EngineConfig::from_toml_str("unknown_key = 1").is_err());
        assert!(EngineConfig::from_toml_str("tables = []").is_err());

        let bad_feature = r#"
            [[tables]]
            name = "orders"
            feature_key = "widgets"
        "#;
        assert!(matches!(
            EngineConfig::from_toml_str(bad_feature),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "database_path = \"/tmp/x.sqlite3\"\n").unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/x.sqlite3")
        );

        assert!(EngineConfig::load_from(&tmp.path().join("missing.toml")).is_err());
    }
}
