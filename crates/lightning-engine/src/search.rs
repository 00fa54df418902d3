//! Query execution against SQLite with a TTL result cache.

use crate::pool::ConnectionPool;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lightning_core::config::EngineConfig;
use lightning_core::engine::protocol::{EngineSearchRequest, EngineSearchResponse, QueryKind};
use lightning_core::index::{build_match_query, indexed_columns};
use lightning_core::store::sqlite::{escape_like, quote_ident, row_to_json, table_exists};
use lightning_core::LightningError;
use mini_moka::sync::Cache;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

type Row = Map<String, Value>;

/// Errors mapped onto HTTP statuses.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Database error: {0}")]
    Database(#[from] LightningError),
}

impl SearchError {
    pub fn status(&self) -> StatusCode {
        match self {
            SearchError::MissingFields => StatusCode::BAD_REQUEST,
            SearchError::UnknownTable(_) => StatusCode::NOT_FOUND,
            SearchError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(err: rusqlite::Error) -> Self {
        SearchError::Database(err.into())
    }
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Search failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
struct CachedResult {
    results: Arc<Vec<Row>>,
    time_ms: u64,
}

/// Runs searches on the pool and caches responses by `table:query:mode`.
pub struct SearchExecutor {
    pool: Arc<ConnectionPool>,
    cache: Cache<String, CachedResult>,
    result_limit: usize,
}

impl SearchExecutor {
    pub fn new(pool: Arc<ConnectionPool>, cache_duration: Duration, result_limit: usize) -> Self {
        let cache = Cache::builder()
            .time_to_live(cache_duration.max(Duration::from_millis(1)))
            .max_capacity(10_000)
            .build();
        Self {
            pool,
            cache,
            result_limit: result_limit.max(1),
        }
    }

    pub async fn search(
        &self,
        request: EngineSearchRequest,
    ) -> Result<EngineSearchResponse, SearchError> {
        let table = request.table.trim().to_string();
        let query = request.query.trim().to_string();
        if table.is_empty() || query.is_empty() {
            return Err(SearchError::MissingFields);
        }

        let key = format!("{}:{}:{}", table, query, request.mode.as_str());
        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(EngineSearchResponse {
                count: hit.results.len(),
                results: hit.results.as_ref().clone(),
                time_ms: hit.time_ms,
                from_cache: true,
            });
        }

        let started = Instant::now();
        let limit = self.result_limit;
        let kind = request.mode;
        let results = self
            .pool
            .with_conn(move |conn| Ok(run_query(conn, &table, &query, kind, limit)))
            .await??;
        let time_ms = started.elapsed().as_millis() as u64;

        let results = Arc::new(results);
        self.cache.insert(
            key,
            CachedResult {
                results: Arc::clone(&results),
                time_ms,
            },
        );

        Ok(EngineSearchResponse {
            count: results.len(),
            results: Arc::try_unwrap(results).unwrap_or_else(|shared| shared.as_ref().clone()),
            time_ms,
            from_cache: false,
        })
    }
}

/// Execute one search on a connection.
///
/// Fulltext mode joins the `lightning_search_<table>` index and orders by
/// bm25; like mode, or a table without an index, scans the indexed columns
/// (or all text columns) with a case-insensitive substring match.
pub fn run_query(
    conn: &Connection,
    table: &str,
    query: &str,
    kind: QueryKind,
    limit: usize,
) -> Result<Vec<Row>, SearchError> {
    if !table_exists(conn, table)? {
        return Err(SearchError::UnknownTable(table.to_string()));
    }

    let index_name = format!("{}{}", EngineConfig::INDEX_PREFIX, table);
    let indexed = indexed_columns(conn, &index_name)?;
    let primary_key = primary_key(conn, table)?;
    let match_expr = build_match_query(query);

    let (sql, params) = if kind == QueryKind::Fulltext && !indexed.is_empty() && !match_expr.is_empty()
    {
        let idx = quote_ident(&index_name);
        (
            format!(
                "SELECT t.rowid AS \"__rowid\", t.* FROM {idx} JOIN {} t ON t.rowid = {idx}.rowid \
                 WHERE {idx} MATCH ?1 ORDER BY bm25({idx}) LIMIT ?2",
                quote_ident(table),
            ),
            vec![
                SqlValue::Text(match_expr),
                SqlValue::Integer(limit as i64),
            ],
        )
    } else {
        let columns = if indexed.is_empty() {
            text_columns(conn, table)?
        } else {
            indexed
        };
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let conditions: Vec<String> = columns
            .iter()
            .map(|c| format!("LOWER({}) LIKE ? ESCAPE '\\'", quote_ident(c)))
            .collect();
        let mut params: Vec<SqlValue> = columns
            .iter()
            .map(|_| SqlValue::Text(pattern.clone()))
            .collect();
        params.push(SqlValue::Integer(limit as i64));
        (
            format!(
                "SELECT rowid AS \"__rowid\", * FROM {} WHERE {} LIMIT ?",
                quote_ident(table),
                conditions.join(" OR "),
            ),
            params,
        )
    };

    debug!("{} search on {}: {}", kind.as_str(), table, sql);
    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt.query_map(params_from_iter(params), |row| row_to_json(row, &names))?;

    let mut results = Vec::new();
    for row in rows {
        let mut row = row?;
        let rowid = row.remove("__rowid").unwrap_or(Value::Null);
        if !row.contains_key("id") {
            let id = primary_key
                .as_ref()
                .and_then(|pk| row.get(pk).cloned())
                .unwrap_or(rowid);
            row.insert("id".to_string(), id);
        }
        results.push(row);
    }
    Ok(results)
}

fn table_info(conn: &Connection, table: &str) -> rusqlite::Result<Vec<(String, String, i64)>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let info = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(5)?,
        ))
    })?;
    info.collect()
}

fn primary_key(conn: &Connection, table: &str) -> rusqlite::Result<Option<String>> {
    Ok(table_info(conn, table)?
        .into_iter()
        .filter(|(_, _, pk)| *pk > 0)
        .min_by_key(|(_, _, pk)| *pk)
        .map(|(name, _, _)| name))
}

fn text_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    Ok(table_info(conn, table)?
        .into_iter()
        .filter(|(_, ty, pk)| {
            let ty = ty.to_uppercase();
            *pk == 0 && (ty.is_empty() || ty.contains("CHAR") || ty.contains("TEXT") || ty.contains("CLOB"))
        })
        .map(|(name, _, _)| name)
        .collect())
}
