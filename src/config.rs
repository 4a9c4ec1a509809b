//! Configuration loading and management.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "city-loader/config.yaml";

/// Loader configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub preferences: PreferencesConfig,

    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Local store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Persisted preferences (completion flag) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// Path to the preferences JSON file.
    #[serde(default = "default_prefs_path")]
    pub path: PathBuf,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_prefs_path(),
        }
    }
}

/// Migration tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source asset holding the city array.
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,

    /// Rows per write transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Malformed records tolerated before a strategy gives up.
    #[serde(default = "default_error_ceiling")]
    pub error_ceiling: u64,

    /// Upper bound for the whole migration, in seconds. 0 disables it.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Move progress from 90 to 100 as soon as data is committed. When false
    /// the caller finalizes once its consumers have caught up.
    #[serde(default = "default_auto_finalize")]
    pub auto_finalize: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            batch_size: default_batch_size(),
            error_ceiling: default_error_ceiling(),
            timeout_seconds: default_timeout_seconds(),
            auto_finalize: default_auto_finalize(),
        }
    }
}

impl MigrationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("migration.batch_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Base directory for local state.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".city-loader"))
        .unwrap_or_else(|| PathBuf::from(".city-loader"))
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("cities.db")
}

fn default_prefs_path() -> PathBuf {
    default_data_dir().join("prefs.json")
}

fn default_source_path() -> PathBuf {
    PathBuf::from(crate::source::DEFAULT_ASSET_NAME)
}

fn default_batch_size() -> usize {
    1000
}

fn default_error_ceiling() -> u64 {
    100
}

fn default_timeout_seconds() -> u64 {
    600 // 10 minutes
}

fn default_auto_finalize() -> bool {
    true
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from the default location or return defaults,
    /// then apply environment overrides.
    pub fn load_or_default() -> Self {
        let path = std::env::var("CITY_LOADER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("Ignoring config {:?}: {:#}", path, e);
                }
                Self::default()
            }
        };

        config.apply_env_overrides();
        config
    }

    /// Apply `CITY_LOADER_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = std::env::var("CITY_LOADER_DB_PATH") {
            self.database.path = PathBuf::from(db_path);
        }

        if let Ok(prefs_path) = std::env::var("CITY_LOADER_PREFS_PATH") {
            self.preferences.path = PathBuf::from(prefs_path);
        }

        if let Ok(source) = std::env::var("CITY_LOADER_SOURCE") {
            self.migration.source_path = PathBuf::from(source);
        }

        if let Ok(size) = std::env::var("CITY_LOADER_BATCH_SIZE")
            && let Ok(size) = size.parse()
        {
            self.migration.batch_size = size;
        }

        if let Ok(ceiling) = std::env::var("CITY_LOADER_ERROR_CEILING")
            && let Ok(ceiling) = ceiling.parse()
        {
            self.migration.error_ceiling = ceiling;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.error_ceiling, 100);
        assert!(config.migration.auto_finalize);
        assert_eq!(config.migration.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.migration.source_path, PathBuf::from("cities.json"));
        assert!(config.database.path.ends_with("cities.db"));
        assert!(config.preferences.path.ends_with("prefs.json"));
    }

    #[test]
    fn test_load_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("city-loader.yaml");
        std::fs::write(
            &path,
            "database:\n  path: /tmp/x.db\nmigration:\n  batch_size: 250\n  timeout_seconds: 0\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.migration.batch_size, 250);
        assert_eq!(config.migration.error_ceiling, 100);
        assert_eq!(config.migration.timeout(), None);
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        std::fs::write(&path, "migration: [unclosed").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_validate_batch_size() {
        let mut config = MigrationConfig::default();
        assert!(config.validate().is_ok());
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
