//! Fulltext indexing over SQLite FTS5.
//!
//! This module provides:
//! - Per-entity FTS5 index creation, sync triggers and rebuilds
//! - MATCH expression building for the engine's fulltext mode

mod fts5;
mod query;

pub use fts5::{indexed_columns, FulltextIndex, FulltextStats, DEFAULT_TOKENIZER};
pub use query::{build_match_query, quote_term};
