//! Wire types shared by the engine client and the engine service.

use crate::store::EntityId;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Search kind sent to the engine. The dispatcher always uses `Fulltext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    #[default]
    Fulltext,
    Like,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Fulltext => "fulltext",
            QueryKind::Like => "like",
        }
    }
}

/// Body of `POST /search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSearchRequest {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub mode: QueryKind,
}

/// Body of a successful search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSearchResponse {
    /// Rows in relevance order; each carries at least `id`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub time_ms: u64,
    #[serde(default)]
    pub from_cache: bool,
}

/// An empty result set may be encoded as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ranked identifiers returned by a successful engine query.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineQueryResult {
    pub ids: Vec<EntityId>,
    pub elapsed_ms: u64,
    pub count: usize,
    pub from_cache: bool,
}

impl EngineSearchResponse {
    /// Extract the ranked ids. Fails on the first row without a usable `id`.
    pub fn into_result(self) -> std::result::Result<EngineQueryResult, BackendFault> {
        let mut ids = Vec::with_capacity(self.results.len());
        for (pos, row) in self.results.iter().enumerate() {
            let id = row.get("id").and_then(EntityId::from_json).ok_or_else(|| {
                BackendFault::new(FaultKind::Decode, format!("result {} has no usable id", pos))
            })?;
            ids.push(id);
        }
        Ok(EngineQueryResult {
            ids,
            elapsed_ms: self.time_ms,
            count: self.count,
            from_cache: self.from_cache,
        })
    }
}

/// Why an engine call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The engine answered with a non-2xx status.
    Status(u16),
    Timeout,
    Connect,
    Decode,
    Transport,
}

/// A failed engine call, recoverable through the embedded fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFault {
    pub kind: FaultKind,
    pub message: String,
}

impl BackendFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FaultKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for BackendFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Status(code) => write!(f, "status {}: {}", code, self.message),
            FaultKind::Timeout => write!(f, "timeout: {}", self.message),
            FaultKind::Connect => write!(f, "connection failed: {}", self.message),
            FaultKind::Decode => write!(f, "invalid response: {}", self.message),
            FaultKind::Transport => write!(f, "transport error: {}", self.message),
        }
    }
}

impl From<reqwest::Error> for BackendFault {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FaultKind::Timeout
        } else if err.is_connect() {
            FaultKind::Connect
        } else if err.is_decode() {
            FaultKind::Decode
        } else if let Some(status) = err.status() {
            FaultKind::Status(status.as_u16())
        } else {
            FaultKind::Transport
        };
        BackendFault::new(kind, err.to_string())
    }
}
