//! Engine settings read from the environment the supervisor injects.

use lightning_core::config::NetworkConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Table used by `GET /search` when the request names none.
pub const DEFAULT_TABLE: &str = "companies";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub cpu_cores: usize,
    pub max_connections: usize,
    pub cache_duration: Duration,
    pub result_limit: usize,
    pub default_table: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            host: NetworkConfig::DEFAULT_HOST.to_string(),
            port: NetworkConfig::DEFAULT_PORT,
            database: PathBuf::from("lightning.db"),
            cpu_cores: 1,
            max_connections: 10,
            cache_duration: Duration::from_secs(300),
            result_limit: 1000,
            default_table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from a lookup; absent or invalid values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(host) = lookup("LIGHTNING_SEARCH_HOST") {
            settings.host = host;
        }
        if let Some(db) = lookup("LIGHTNING_SEARCH_DB_DATABASE").or_else(|| lookup("DB_DATABASE")) {
            if !db.is_empty() {
                settings.database = PathBuf::from(db);
            }
        }
        if let Some(table) = lookup("LIGHTNING_SEARCH_DEFAULT_TABLE") {
            settings.default_table = table;
        }
        if let Some(connection) = lookup("DB_CONNECTION") {
            if !connection.eq_ignore_ascii_case("sqlite") {
                warn!(
                    "DB_CONNECTION={} is not supported by this engine; using SQLite at {}",
                    connection,
                    settings.database.display()
                );
            }
        }

        parse_into(&mut settings.port, &lookup, "LIGHTNING_SEARCH_PORT");
        parse_into(&mut settings.cpu_cores, &lookup, "LIGHTNING_SEARCH_CPU_CORES");
        parse_into(
            &mut settings.max_connections,
            &lookup,
            "LIGHTNING_SEARCH_MAX_CONNECTIONS",
        );
        parse_into(&mut settings.result_limit, &lookup, "LIGHTNING_SEARCH_RESULT_LIMIT");

        let mut cache_secs = settings.cache_duration.as_secs();
        parse_into(&mut cache_secs, &lookup, "LIGHTNING_SEARCH_CACHE_DURATION");
        settings.cache_duration = Duration::from_secs(cache_secs);

        settings.cpu_cores = settings.cpu_cores.max(1);
        settings.max_connections = settings.max_connections.max(1);
        settings
    }
}

fn parse_into<T, F>(slot: &mut T, lookup: &F, key: &str)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!("Ignoring invalid {}={:?}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = EngineSettings::from_lookup(|_| None);
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn test_reads_injected_variables() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("LIGHTNING_SEARCH_PORT", "9200"),
            ("LIGHTNING_SEARCH_CPU_CORES", "0"),
            ("LIGHTNING_SEARCH_CACHE_DURATION", "5"),
            ("LIGHTNING_SEARCH_RESULT_LIMIT", "abc"),
            ("DB_DATABASE", "/tmp/x.db"),
        ]));
        assert_eq!(settings.port, 9200);
        assert_eq!(settings.cpu_cores, 1);
        assert_eq!(settings.cache_duration, Duration::from_secs(5));
        assert_eq!(settings.result_limit, 1000);
        assert_eq!(settings.database, PathBuf::from("/tmp/x.db"));
    }
}
