//! Search dispatch: engine first, embedded substring fallback second.
//!
//! ```rust,ignore
//! let dispatcher = SearchDispatcher::new(Arc::new(client), store.clone(), config.modes.clone());
//! let request = SearchRequest::new("companies", "lon");
//! let entities = dispatcher.search(&request, &descriptor).await?;
//! ```

mod dispatcher;
mod fallback;
mod reconciler;

pub use dispatcher::{DispatchOutcome, SearchDispatcher};
pub use fallback::fallback_search;
pub use reconciler::reconcile;

use crate::store::Filter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which backend answers a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// External fulltext engine.
    #[serde(alias = "go")]
    Engine,
    /// In-process substring match against the store.
    #[serde(alias = "eloquent")]
    Embedded,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Engine => "engine",
            SearchMode::Embedded => "embedded",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "engine" | "go" => Ok(SearchMode::Engine),
            "embedded" | "eloquent" => Ok(SearchMode::Embedded),
            other => Err(format!("unknown search mode: {}", other)),
        }
    }
}

/// Resolve the effective mode: request, then configured default, then engine.
pub fn resolve_mode(requested: Option<SearchMode>, configured: Option<SearchMode>) -> SearchMode {
    requested.or(configured).unwrap_or(SearchMode::Engine)
}

/// One search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub entity_type: String,
    pub query: String,
    pub mode: Option<SearchMode>,
    /// Caller filters ANDed with the search predicate.
    pub filters: Vec<Filter>,
}

impl SearchRequest {
    pub fn new(entity_type: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            query: query.into(),
            mode: None,
            filters: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mode_precedence() {
        use SearchMode::*;
        assert_eq!(resolve_mode(Some(Embedded), Some(Engine)), Embedded);
        assert_eq!(resolve_mode(Some(Engine), Some(Embedded)), Engine);
        assert_eq!(resolve_mode(None, Some(Embedded)), Embedded);
        assert_eq!(resolve_mode(None, None), Engine);
    }

    #[test]
    fn test_mode_parsing_accepts_legacy_names() {
        assert_eq!("go".parse::<SearchMode>(), Ok(SearchMode::Engine));
        assert_eq!("Eloquent".parse::<SearchMode>(), Ok(SearchMode::Embedded));
        assert!("vector".parse::<SearchMode>().is_err());

        let mode: SearchMode = serde_json::from_str("\"eloquent\"").unwrap();
        assert_eq!(mode, SearchMode::Embedded);
        assert_eq!(serde_json::to_string(&SearchMode::Engine).unwrap(), "\"engine\"");
    }
}
