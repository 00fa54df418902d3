//! SQLite-backed entity store.

use super::{Entity, EntityId, EntityStore, Filter, StoreQuery};
use crate::error::{LightningError, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Entity store over a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| LightningError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        register_functions(&conn)?;

        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory store.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure connection with optimal settings.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Acquire the connection for direct use (schema setup, indexing).
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LightningError::Store {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Run a batch of SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    /// Whether a table exists in the database.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.connection()?;
        table_exists(&conn, table)
    }

    fn read_rows(
        conn: &Connection,
        sql: &str,
        params: Vec<SqlValue>,
        primary_key: &str,
    ) -> Result<Vec<Entity>> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let rows = stmt.query_map(params_from_iter(params), |row| {
            row_to_entity(row, &columns, primary_key)
        })?;

        let mut entities = Vec::new();
        for row in rows {
            if let Some(entity) = row? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

impl EntityStore for SqliteStore {
    fn fetch_by_ids(
        &self,
        table: &str,
        primary_key: &str,
        ids: &[EntityId],
    ) -> Result<Vec<Entity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            quote_ident(table),
            quote_ident(primary_key),
            placeholders
        );
        let params: Vec<SqlValue> = ids.iter().map(id_to_sql).collect();

        debug!("fetch_by_ids on {} with {} ids", table, ids.len());
        let conn = self.connection()?;
        Self::read_rows(&conn, &sql, params, primary_key)
    }

    fn find(&self, query: &StoreQuery, primary_key: &str) -> Result<Vec<Entity>> {
        let (where_clause, params) = build_where(&query.filters)?;
        let mut sql = format!("SELECT * FROM {}{}", quote_ident(&query.table), where_clause);
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        debug!("find on {}: {}", query.table, sql);
        let conn = self.connection()?;
        Self::read_rows(&conn, &sql, params, primary_key)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn primary_key(&self, table: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let mut keyed = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(5)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        keyed.retain(|(pk, _)| *pk > 0);
        keyed.sort_by_key(|(pk, _)| *pk);
        Ok(keyed.into_iter().next().map(|(_, name)| name))
    }
}

/// Replace SQLite's ASCII-only `LOWER` with a Unicode-aware one.
///
/// Substring predicates compare `LOWER(column)` against a needle lowercased
/// in Rust, so both sides must fold the same way.
pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(t) | ValueRef::Blob(t) => {
                    Some(String::from_utf8_lossy(t).to_lowercase())
                }
            })
        },
    )?;
    Ok(())
}

/// Whether a table exists, on a borrowed connection.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape LIKE wildcards so the needle matches literally (escape char `\`).
pub fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn build_where(filters: &[Filter]) -> Result<(String, Vec<SqlValue>)> {
    let mut groups = Vec::new();
    let mut params = Vec::new();

    for filter in filters {
        match filter {
            Filter::Equals { field, value } => {
                groups.push(format!("{} = ?", quote_ident(field)));
                params.push(json_to_sql(value));
            }
            Filter::AnyContains { fields, needle } => {
                if fields.is_empty() {
                    return Err(LightningError::Validation {
                        field: "fields".to_string(),
                        message: "substring filter needs at least one field".to_string(),
                    });
                }
                let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
                let ors: Vec<String> = fields
                    .iter()
                    .map(|f| format!("LOWER({}) LIKE ? ESCAPE '\\'", quote_ident(f)))
                    .collect();
                for _ in fields {
                    params.push(SqlValue::Text(pattern.clone()));
                }
                groups.push(format!("({})", ors.join(" OR ")));
            }
        }
    }

    if groups.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", groups.join(" AND ")), params))
    }
}

fn id_to_sql(id: &EntityId) -> SqlValue {
    match id {
        EntityId::Int(v) => SqlValue::Integer(*v),
        EntityId::Text(v) => SqlValue::Text(v.clone()),
    }
}

fn json_to_sql(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(*b as i64),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a column value into JSON.
pub fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Convert a row into a JSON object keyed by column name.
pub fn row_to_json(
    row: &Row<'_>,
    columns: &[String],
) -> rusqlite::Result<serde_json::Map<String, serde_json::Value>> {
    let mut fields = serde_json::Map::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        fields.insert(name.clone(), value_ref_to_json(row.get_ref(i)?));
    }
    Ok(fields)
}

fn row_to_entity(
    row: &Row<'_>,
    columns: &[String],
    primary_key: &str,
) -> rusqlite::Result<Option<Entity>> {
    let fields = row_to_json(row, columns)?;
    let id = fields.get(primary_key).and_then(EntityId::from_json);
    Ok(id.map(|id| Entity { id, fields }))
}
