//! Client side of the external search engine.
//!
//! The dispatcher talks to the engine through the `EngineBackend` trait so the
//! transport can be swapped in tests.

mod client;
pub mod protocol;

pub use client::EngineClient;
pub use protocol::{
    BackendFault, EngineQueryResult, EngineSearchRequest, EngineSearchResponse, FaultKind,
    QueryKind,
};

use async_trait::async_trait;

/// A fulltext engine that returns ranked identifiers for a query.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Run a fulltext query against `table`.
    ///
    /// Any failure (non-success status, timeout, refused connection, bad body)
    /// is reported as a `BackendFault` so the caller can decide on fallback.
    async fn query(
        &self,
        table: &str,
        query_text: &str,
    ) -> std::result::Result<EngineQueryResult, BackendFault>;
}
