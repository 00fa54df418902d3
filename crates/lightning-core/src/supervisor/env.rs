//! Environment passed to the engine process.

use crate::config::LightningConfig;

/// Variables the engine reads, in a fixed order.
pub const ENGINE_ENV_VARS: [&str; 12] = [
    "DB_CONNECTION",
    "DB_HOST",
    "DB_PORT",
    "DB_DATABASE",
    "DB_USERNAME",
    "DB_PASSWORD",
    "LIGHTNING_SEARCH_HOST",
    "LIGHTNING_SEARCH_PORT",
    "LIGHTNING_SEARCH_CPU_CORES",
    "LIGHTNING_SEARCH_MAX_CONNECTIONS",
    "LIGHTNING_SEARCH_CACHE_DURATION",
    "LIGHTNING_SEARCH_RESULT_LIMIT",
];

/// Host variables passed through even when the environment is cleared.
#[cfg(windows)]
const PASSTHROUGH_VARS: &[&str] = &["PATH", "SYSTEMROOT"];
#[cfg(not(windows))]
const PASSTHROUGH_VARS: &[&str] = &["PATH"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEnvironment {
    vars: Vec<(String, String)>,
}

impl EngineEnvironment {
    pub fn from_config(config: &LightningConfig) -> Self {
        let db = &config.database;
        let perf = &config.performance;
        let values = [
            db.connection.clone(),
            db.host.clone(),
            db.port.clone(),
            db.database.clone(),
            db.username.clone(),
            db.password.clone(),
            config.service.host.clone(),
            config.service.port.to_string(),
            perf.cpu_cores.to_string(),
            perf.max_connections.to_string(),
            perf.cache_duration.to_string(),
            perf.result_limit.to_string(),
        ];

        Self {
            vars: ENGINE_ENV_VARS
                .iter()
                .zip(values)
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Engine variables plus the host passthrough set.
    pub fn isolated(&self) -> Vec<(String, String)> {
        let mut vars = self.vars.clone();
        for key in PASSTHROUGH_VARS {
            if let Ok(value) = std::env::var(key) {
                vars.push((key.to_string(), value));
            }
        }
        vars
    }

    /// Replace the command's environment with `isolated()`.
    pub fn apply_isolated(&self, cmd: &mut tokio::process::Command) {
        cmd.env_clear().envs(self.isolated());
    }

    /// Add the engine variables on top of the inherited environment.
    pub fn apply_inherited(&self, cmd: &mut tokio::process::Command) {
        cmd.envs(self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}
