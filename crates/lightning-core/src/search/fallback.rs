//! Embedded substring search executed directly against the store.

use crate::descriptor::IndexDescriptor;
use crate::error::Result;
use crate::store::{Entity, EntityStore, Filter, StoreQuery};
use tracing::debug;

/// Case-insensitive substring search over the descriptor's searchable fields.
///
/// The per-field predicates are ORed inside a single group which is ANDed
/// with the caller's filters. Results come back in store order.
pub fn fallback_search(
    query_text: &str,
    descriptor: &IndexDescriptor,
    store: &dyn EntityStore,
    filters: &[Filter],
) -> Result<Vec<Entity>> {
    descriptor.ensure_searchable()?;

    let query = StoreQuery::new(&descriptor.table)
        .with_filters(filters.iter().cloned())
        .filter(Filter::AnyContains {
            fields: descriptor.searchable_fields.clone(),
            needle: query_text.to_string(),
        });

    let entities = store.find(&query, &descriptor.primary_key)?;
    debug!(
        "Embedded search on {} for {:?} matched {} rows",
        descriptor.table,
        query_text,
        entities.len()
    );
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LightningError;
    use crate::store::{EntityId, SqliteStore};
    use serde_json::json;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT, city TEXT, active INTEGER);
                 INSERT INTO companies VALUES
                    (1, 'Londis', 'Leeds', 1),
                    (2, 'Globex', 'LONDON', 1),
                    (3, 'Initech', 'Paris', 1),
                    (4, 'Salon Ltd', 'Nice', 0);",
            )
            .unwrap();
        store
    }

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor::new(
            "companies",
            "companies",
            "id",
            vec!["name".into(), "city".into()],
            vec![],
        )
    }

    fn ids(entities: Vec<Entity>) -> Vec<EntityId> {
        entities.into_iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_matches_any_searchable_field() {
        let result = fallback_search("lon", &descriptor(), &store(), &[]).unwrap();
        assert_eq!(
            ids(result),
            vec![EntityId::Int(1), EntityId::Int(2), EntityId::Int(4)]
        );
    }

    #[test]
    fn test_or_group_composes_with_filters() {
        let filters = vec![Filter::Equals {
            field: "active".into(),
            value: json!(1),
        }];
        let result = fallback_search("lon", &descriptor(), &store(), &filters).unwrap();
        assert_eq!(ids(result), vec![EntityId::Int(1), EntityId::Int(2)]);
    }

    #[test]
    fn test_non_ascii_needles_fold_case() {
        let store = store();
        store
            .execute_batch(
                "INSERT INTO companies VALUES (5, 'ÖLKRAFT GmbH', 'Köln', 1), (6, 'Émile Café', 'Lyon', 1);",
            )
            .unwrap();

        let result = fallback_search("ölkraft", &descriptor(), &store, &[]).unwrap();
        assert_eq!(ids(result), vec![EntityId::Int(5)]);
        let result = fallback_search("émile", &descriptor(), &store, &[]).unwrap();
        assert_eq!(ids(result), vec![EntityId::Int(6)]);
    }

    #[test]
    fn test_store_errors_propagate() {
        let d = IndexDescriptor::new("ghosts", "ghosts", "id", vec!["name".into()], vec![]);
        let err = fallback_search("x", &d, &store(), &[]).unwrap_err();
        assert!(err.is_store_error());
    }

    #[test]
    fn test_requires_searchable_fields() {
        let d = IndexDescriptor::new("companies", "companies", "id", vec![], vec![]);
        let err = fallback_search("x", &d, &store(), &[]).unwrap_err();
        assert!(matches!(err, LightningError::NotSearchable { .. }));
    }
}
