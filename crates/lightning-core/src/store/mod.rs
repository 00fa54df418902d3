//! Entity store abstraction.
//!
//! The dispatcher and reconciler only need two read operations from the
//! store: fetch a set of rows by primary key, and find rows matching a
//! filter tree. `SqliteStore` implements both over rusqlite.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key value of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    /// Convert a JSON value (as returned by the engine) into an identifier.
    ///
    /// A string is normalized to `Int` only when it is the canonical
    /// rendering of that integer, so `"42"` and `42` compare equal while
    /// text keys such as `"007"` stay text.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(EntityId::Int),
            serde_json::Value::String(s) => Some(match s.parse::<i64>() {
                Ok(n) if n.to_string() == *s => EntityId::Int(n),
                _ => EntityId::Text(s.clone()),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(v) => write!(f, "{}", v),
            EntityId::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        EntityId::Int(v)
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self {
        EntityId::Text(v.to_string())
    }
}

/// A single row from the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Field value as a string, if it is one.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }
}

/// Predicate over store rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given value.
    Equals {
        field: String,
        value: serde_json::Value,
    },
    /// Case-insensitive substring match on any of the fields (OR group).
    AnyContains { fields: Vec<String>, needle: String },
}

impl Filter {
    /// Evaluate the filter against an already loaded entity.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Filter::Equals { field, value } => entity.get(field) == Some(value),
            Filter::AnyContains { fields, needle } => {
                let needle = needle.to_lowercase();
                fields.iter().any(|f| match entity.get(f) {
                    Some(serde_json::Value::String(s)) => s.to_lowercase().contains(&needle),
                    Some(serde_json::Value::Null) | None => false,
                    Some(other) => other.to_string().to_lowercase().contains(&needle),
                })
            }
        }
    }
}

/// A filtered read against one table. All filters are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub table: String,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl StoreQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read-only query capability over the entity store.
///
/// All operations are synchronous to match rusqlite's API.
pub trait EntityStore: Send + Sync {
    /// Fetch the rows whose primary key is in `ids`, in store order.
    ///
    /// Missing ids are simply absent from the result.
    fn fetch_by_ids(&self, table: &str, primary_key: &str, ids: &[EntityId])
        -> Result<Vec<Entity>>;

    /// Find rows matching all filters of the query, in store order.
    fn find(&self, query: &StoreQuery, primary_key: &str) -> Result<Vec<Entity>>;

    /// Column names of a table, in declaration order.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Primary key column of a table, if it declares one.
    fn primary_key(&self, table: &str) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_id_from_json() {
        assert_eq!(EntityId::from_json(&json!(7)), Some(EntityId::Int(7)));
        assert_eq!(EntityId::from_json(&json!("42")), Some(EntityId::Int(42)));
        assert_eq!(
            EntityId::from_json(&json!("007")),
            Some(EntityId::Text("007".into()))
        );
        assert_eq!(
            EntityId::from_json(&json!("+5")),
            Some(EntityId::Text("+5".into()))
        );
        assert_eq!(
            EntityId::from_json(&json!("abc-1")),
            Some(EntityId::Text("abc-1".into()))
        );
        assert_eq!(EntityId::from_json(&json!(null)), None);
        assert_eq!(EntityId::from_json(&json!(1.5)), None);
    }

    #[test]
    fn test_query_builder() {
        let query = StoreQuery::new("companies")
            .filter(Filter::Equals {
                field: "city".into(),
                value: json!("London"),
            })
            .limit(10);
        assert_eq!(query.table, "companies");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.limit, Some(10));
    }
}
