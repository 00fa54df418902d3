//! Centralized configuration for Lightning Search.
//!
//! Constants live on holder structs (`EngineConfig`, `NetworkConfig`). Runtime
//! settings are a `LightningConfig` loaded from a JSON file and overridden by
//! `LIGHTNING_SEARCH_*` / `DB_*` environment variables.

use crate::error::{LightningError, Result};
use crate::search::SearchMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Engine binary and process constants.
pub struct EngineConfig;

impl EngineConfig {
    /// Base name of the engine executable.
    pub const BINARY_NAME: &'static str = "lightning-search";
    /// Cargo package that builds the engine.
    pub const PACKAGE_NAME: &'static str = "lightning-engine";
    /// Marker prefix for in-place progress lines.
    pub const PROGRESS_MARKER: &'static str = "Progress:";
    /// Prefix of the FTS5 index table created for an entity table.
    pub const INDEX_PREFIX: &'static str = "lightning_search_";
    pub const PID_FILE_NAME: &'static str = "lightning-search.pid";
    pub const LOG_FILE_NAME: &'static str = "lightning-search.log";
    pub const STOP_TIMEOUT_MS: u64 = 2000;
    pub const READY_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8081;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
    pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(1);
    pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
}

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lightning-search.json";

/// Engine network endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: NetworkConfig::DEFAULT_HOST.to_string(),
            port: NetworkConfig::DEFAULT_PORT,
            timeout: NetworkConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Entity store connection parameters handed to the engine process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection: String,
    pub host: String,
    pub port: String,
    /// Database name; for SQLite this is the database file path.
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: "sqlite".to_string(),
            host: "127.0.0.1".to_string(),
            port: String::new(),
            database: "lightning.db".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_local_host(&self) -> bool {
        matches!(self.host.as_str(), "127.0.0.1" | "localhost" | "::1")
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database)
    }
}

/// Engine performance tuning hints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    pub cpu_cores: usize,
    pub max_connections: usize,
    /// Result cache lifetime in seconds.
    pub cache_duration: u64,
    pub result_limit: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            max_connections: 10,
            cache_duration: 300,
            result_limit: 1000,
        }
    }
}

/// Search mode selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModesConfig {
    /// Mode used when a request does not name one.
    pub default: Option<SearchMode>,
    /// Mode used when the engine fails; only `embedded` enables fallback.
    /// Defaults to `embedded`; set to `null` to surface engine failures.
    pub fallback: Option<SearchMode>,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            default: None,
            fallback: Some(SearchMode::Embedded),
        }
    }
}

impl ModesConfig {
    pub fn fallback_enabled(&self) -> bool {
        self.fallback == Some(SearchMode::Embedded)
    }
}

/// Per-entity index settings from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EntityIndexConfig {
    pub searchable_fields: Option<Vec<String>>,
    pub index_fields: Option<Vec<String>>,
    pub table: Option<String>,
}

/// Build toolchain and artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Workspace directory the toolchain runs in.
    pub source_dir: PathBuf,
    /// Directory compiled binaries are installed into.
    pub bin_dir: PathBuf,
    /// Cargo target directory for intermediate artifacts.
    pub target_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            bin_dir: PathBuf::from("bin"),
            target_dir: PathBuf::from("target"),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LightningConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub performance: PerformanceConfig,
    pub modes: ModesConfig,
    pub build: BuildConfig,
    /// Entity type name to index settings.
    pub models: HashMap<String, EntityIndexConfig>,
}

impl LightningConfig {
    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| LightningError::io("read config", path, e))?;
            serde_json::from_str::<LightningConfig>(&content).map_err(|e| {
                LightningError::Config {
                    message: format!("invalid config file {}: {}", path.display(), e),
                }
            })?
        } else {
            debug!("Config file {} not found, using defaults", path.display());
            LightningConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LightningError::io("create config directory", parent, e))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LightningError::io("write config", path, e))
    }

    /// Apply overrides from an environment lookup function.
    ///
    /// `LIGHTNING_SEARCH_DB_*` wins over the plain `DB_*` variable.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = |name: &str| {
            lookup(&format!("LIGHTNING_SEARCH_DB_{}", name)).or_else(|| lookup(&format!("DB_{}", name)))
        };

        if let Some(v) = lookup("LIGHTNING_SEARCH_HOST") {
            self.service.host = v;
        }
        set_parsed(&mut self.service.port, lookup("LIGHTNING_SEARCH_PORT"), "LIGHTNING_SEARCH_PORT");
        set_parsed(
            &mut self.service.timeout,
            lookup("LIGHTNING_SEARCH_TIMEOUT"),
            "LIGHTNING_SEARCH_TIMEOUT",
        );

        if let Some(v) = db("CONNECTION") {
            self.database.connection = v;
        }
        if let Some(v) = db("HOST") {
            self.database.host = v;
        }
        if let Some(v) = db("PORT") {
            self.database.port = v;
        }
        if let Some(v) = db("DATABASE") {
            self.database.database = v;
        }
        if let Some(v) = db("USERNAME") {
            self.database.username = v;
        }
        if let Some(v) = db("PASSWORD") {
            self.database.password = v;
        }

        set_parsed(
            &mut self.performance.cpu_cores,
            lookup("LIGHTNING_SEARCH_CPU_CORES"),
            "LIGHTNING_SEARCH_CPU_CORES",
        );
        set_parsed(
            &mut self.performance.max_connections,
            lookup("LIGHTNING_SEARCH_MAX_CONNECTIONS"),
            "LIGHTNING_SEARCH_MAX_CONNECTIONS",
        );
        set_parsed(
            &mut self.performance.cache_duration,
            lookup("LIGHTNING_SEARCH_CACHE_DURATION"),
            "LIGHTNING_SEARCH_CACHE_DURATION",
        );
        set_parsed(
            &mut self.performance.result_limit,
            lookup("LIGHTNING_SEARCH_RESULT_LIMIT"),
            "LIGHTNING_SEARCH_RESULT_LIMIT",
        );

        if let Some(v) = lookup("LIGHTNING_SEARCH_DEFAULT_MODE") {
            self.modes.default = parse_mode(&v, "LIGHTNING_SEARCH_DEFAULT_MODE");
        }
        if let Some(v) = lookup("LIGHTNING_SEARCH_FALLBACK_MODE") {
            self.modes.fallback = parse_mode(&v, "LIGHTNING_SEARCH_FALLBACK_MODE");
        }
    }

    /// Index settings configured for an entity type, if any.
    pub fn entity(&self, entity_type: &str) -> Option<&EntityIndexConfig> {
        self.models.get(entity_type)
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: Option<String>, key: &str) {
    if let Some(raw) = value {
        match raw.trim().parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!("Ignoring invalid value {:?} for {}", raw, key),
        }
    }
}

fn parse_mode(raw: &str, key: &str) -> Option<SearchMode> {
    if raw.trim().is_empty() || raw.eq_ignore_ascii_case("none") {
        return None;
    }
    match raw.parse::<SearchMode>() {
        Ok(mode) => Some(mode),
        Err(_) => {
            warn!("Ignoring invalid search mode {:?} for {}", raw, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LightningConfig::default();
        assert_eq!(config.service.base_url(), "http://127.0.0.1:8081");
        assert_eq!(config.service.timeout(), Duration::from_secs(5));
        assert_eq!(config.performance.result_limit, 1000);
        assert!(config.modes.default.is_none());
        assert!(config.modes.fallback_enabled());
    }

    #[test]
    fn test_fallback_can_be_disabled() {
        let loaded: LightningConfig =
            serde_json::from_str(r#"{"modes": {"fallback": null}}"#).unwrap();
        assert!(!loaded.modes.fallback_enabled());

        let mut config = LightningConfig::default();
        config.apply_env_overrides(env_from(&[("LIGHTNING_SEARCH_FALLBACK_MODE", "none")]));
        assert!(!config.modes.fallback_enabled());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LightningConfig::default();
        config.apply_env_overrides(env_from(&[
            ("LIGHTNING_SEARCH_PORT", "9090"),
            ("DB_DATABASE", "plain.db"),
            ("LIGHTNING_SEARCH_DB_DATABASE", "preferred.db"),
            ("LIGHTNING_SEARCH_DEFAULT_MODE", "embedded"),
            ("LIGHTNING_SEARCH_FALLBACK_MODE", "eloquent"),
            ("LIGHTNING_SEARCH_CPU_CORES", "not-a-number"),
        ]));

        assert_eq!(config.service.port, 9090);
        assert_eq!(config.database.database, "preferred.db");
        assert_eq!(config.modes.default, Some(SearchMode::Embedded));
        // "eloquent" is the legacy alias for embedded
        assert!(config.modes.fallback_enabled());
        assert_eq!(config.performance.cpu_cores, 1);
    }

    #[test]
    fn test_save_and_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("lightning-search.json");

        let mut config = LightningConfig::default();
        config.models.insert(
            "companies".into(),
            EntityIndexConfig {
                searchable_fields: Some(vec!["name".into(), "city".into()]),
                ..Default::default()
            },
        );
        config.save(&path).unwrap();

        let loaded: LightningConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let loaded: LightningConfig =
            serde_json::from_str(r#"{"service": {"port": 7000}, "modes": {"fallback": "embedded"}}"#)
                .unwrap();
        assert_eq!(loaded.service.port, 7000);
        assert_eq!(loaded.service.host, "127.0.0.1");
        assert!(loaded.modes.fallback_enabled());
    }
}
