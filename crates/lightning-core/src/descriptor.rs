//! Index descriptors: which fields of an entity type are searchable and
//! which are carried into the index.
//!
//! Resolution runs once per entity type through three ordered sources:
//! an explicit override registered in code, the configuration's `models`
//! section, and a structural default derived from the table itself.

use crate::config::{EntityIndexConfig, LightningConfig};
use crate::error::{LightningError, Result};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Resolved search description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub entity_type: String,
    pub searchable_fields: Vec<String>,
    pub index_fields: Vec<String>,
    pub table: String,
    pub primary_key: String,
}

impl IndexDescriptor {
    /// Build a descriptor, enforcing the primary-key and uniqueness invariants.
    pub fn new(
        entity_type: impl Into<String>,
        table: impl Into<String>,
        primary_key: impl Into<String>,
        searchable_fields: Vec<String>,
        index_fields: Vec<String>,
    ) -> Self {
        let primary_key = primary_key.into();
        let mut index_fields = dedup(index_fields);
        if !index_fields.contains(&primary_key) {
            index_fields.insert(0, primary_key.clone());
        }

        Self {
            entity_type: entity_type.into(),
            searchable_fields: dedup(searchable_fields),
            index_fields,
            table: table.into(),
            primary_key,
        }
    }

    /// Whether the entity can be sent to the engine.
    pub fn is_searchable(&self) -> bool {
        !self.searchable_fields.is_empty()
    }

    /// Fail with `NotSearchable` when there are no searchable fields.
    pub fn ensure_searchable(&self) -> Result<()> {
        if self.is_searchable() {
            Ok(())
        } else {
            Err(LightningError::NotSearchable {
                entity_type: self.entity_type.clone(),
            })
        }
    }

    /// Name of the fulltext index table built for this entity.
    pub fn index_name(&self) -> String {
        format!("{}{}", crate::config::EngineConfig::INDEX_PREFIX, self.table)
    }
}

fn dedup(fields: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(fields.len());
    for field in fields {
        if !out.contains(&field) {
            out.push(field);
        }
    }
    out
}

/// Explicit per-entity settings registered in code. Any `None` falls
/// through to configuration, then to the structural default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorOverride {
    pub searchable_fields: Option<Vec<String>>,
    pub index_fields: Option<Vec<String>>,
    pub table: Option<String>,
    pub primary_key: Option<String>,
}

impl DescriptorOverride {
    pub fn searchable(mut self, fields: &[&str]) -> Self {
        self.searchable_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn indexed(mut self, fields: &[&str]) -> Self {
        self.index_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }
}

/// Shape of a table as seen by the store, used for structural defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct TableShape {
    pub primary_key: String,
    /// Non-key columns, in declaration order.
    pub fillable: Vec<String>,
}

/// Columns that are never treated as fillable by default.
const GUARDED_COLUMNS: &[&str] = &["created_at", "updated_at", "deleted_at"];

impl TableShape {
    /// Inspect a table through the store.
    pub fn inspect(store: &dyn EntityStore, table: &str) -> Result<Self> {
        let columns = store.columns(table)?;
        if columns.is_empty() {
            return Err(LightningError::Validation {
                field: "table".to_string(),
                message: format!("table {} does not exist or has no columns", table),
            });
        }
        let primary_key = store.primary_key(table)?.unwrap_or_else(|| "id".to_string());
        let fillable = columns
            .into_iter()
            .filter(|c| *c != primary_key && !GUARDED_COLUMNS.contains(&c.as_str()))
            .collect();
        Ok(Self {
            primary_key,
            fillable,
        })
    }
}

/// Resolves `IndexDescriptor`s from override, configuration and table shape.
#[derive(Debug, Clone, Default)]
pub struct DescriptorResolver {
    overrides: HashMap<String, DescriptorOverride>,
    configured: HashMap<String, EntityIndexConfig>,
}

impl DescriptorResolver {
    pub fn new(config: &LightningConfig) -> Self {
        Self {
            overrides: HashMap::new(),
            configured: config.models.clone(),
        }
    }

    /// Register an explicit override for an entity type.
    pub fn with_override(mut self, entity_type: impl Into<String>, o: DescriptorOverride) -> Self {
        self.overrides.insert(entity_type.into(), o);
        self
    }

    /// Entity types known from overrides or configuration, sorted.
    pub fn known_entity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .overrides
            .keys()
            .chain(self.configured.keys())
            .cloned()
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// Table an entity type maps to, before consulting the store.
    pub fn table_for(&self, entity_type: &str) -> String {
        self.overrides
            .get(entity_type)
            .and_then(|o| o.table.clone())
            .or_else(|| self.configured.get(entity_type).and_then(|c| c.table.clone()))
            .unwrap_or_else(|| entity_type.to_string())
    }

    /// Resolve using a store to derive the structural default.
    pub fn resolve(&self, entity_type: &str, store: &dyn EntityStore) -> Result<IndexDescriptor> {
        let table = self.table_for(entity_type);
        let shape = TableShape::inspect(store, &table)?;
        Ok(self.resolve_with_shape(entity_type, &table, &shape))
    }

    /// Resolve against an already known table shape.
    pub fn resolve_with_shape(
        &self,
        entity_type: &str,
        table: &str,
        shape: &TableShape,
    ) -> IndexDescriptor {
        let explicit = self.overrides.get(entity_type);
        let configured = self.configured.get(entity_type);

        let primary_key = explicit
            .and_then(|o| o.primary_key.clone())
            .unwrap_or_else(|| shape.primary_key.clone());

        let searchable = explicit
            .and_then(|o| o.searchable_fields.clone())
            .or_else(|| configured.and_then(|c| c.searchable_fields.clone()))
            .unwrap_or_else(|| shape.fillable.clone());

        let index_fields = explicit
            .and_then(|o| o.index_fields.clone())
            .or_else(|| configured.and_then(|c| c.index_fields.clone()))
            .unwrap_or_else(|| {
                let mut fields = vec![primary_key.clone()];
                fields.extend(shape.fillable.iter().cloned());
                fields
            });

        debug!(
            "Resolved descriptor for {}: table={}, searchable={:?}",
            entity_type, table, searchable
        );

        IndexDescriptor::new(entity_type, table, primary_key, searchable, index_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> TableShape {
        TableShape {
            primary_key: "id".into(),
            fillable: vec!["name".into(), "city".into(), "email".into()],
        }
    }

    fn config_with_companies() -> LightningConfig {
        let mut config = LightningConfig::default();
        config.models.insert(
            "Company".into(),
            EntityIndexConfig {
                searchable_fields: Some(vec!["name".into()]),
                index_fields: Some(vec!["name".into(), "city".into()]),
                table: Some("companies".into()),
            },
        );
        config
    }

    #[test]
    fn test_structural_default() {
        let resolver = DescriptorResolver::default();
        let d = resolver.resolve_with_shape("companies", "companies", &shape());
        assert_eq!(d.searchable_fields, vec!["name", "city", "email"]);
        assert_eq!(d.index_fields, vec!["id", "name", "city", "email"]);
        assert_eq!(d.table, "companies");
    }

    #[test]
    fn test_config_beats_default_and_keeps_primary_key() {
        let resolver = DescriptorResolver::new(&config_with_companies());
        assert_eq!(resolver.table_for("Company"), "companies");

        let d = resolver.resolve_with_shape("Company", "companies", &shape());
        assert_eq!(d.searchable_fields, vec!["name"]);
        assert_eq!(d.index_fields, vec!["id", "name", "city"]);
    }

    #[test]
    fn test_override_beats_config() {
        let resolver = DescriptorResolver::new(&config_with_companies()).with_override(
            "Company",
            DescriptorOverride::default()
                .searchable(&["city", "email", "city"])
                .table("firms"),
        );
        assert_eq!(resolver.table_for("Company"), "firms");

        let d = resolver.resolve_with_shape("Company", "firms", &shape());
        assert_eq!(d.searchable_fields, vec!["city", "email"]);
        // index fields still come from config
        assert_eq!(d.index_fields, vec!["id", "name", "city"]);
    }

    #[test]
    fn test_not_searchable() {
        let d = IndexDescriptor::new("empty", "empty", "id", vec![], vec![]);
        assert!(!d.is_searchable());
        assert!(matches!(
            d.ensure_searchable(),
            Err(LightningError::NotSearchable { .. })
        ));
        assert_eq!(d.index_fields, vec!["id"]);
        assert_eq!(d.index_name(), "lightning_search_empty");
    }

    #[test]
    fn test_known_entity_types() {
        let resolver = DescriptorResolver::new(&config_with_companies())
            .with_override("Person", DescriptorOverride::default());
        assert_eq!(resolver.known_entity_types(), vec!["Company", "Person"]);
    }
}
