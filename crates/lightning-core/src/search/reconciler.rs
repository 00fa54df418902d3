//! Maps engine identifiers back to full entities in ranked order.

use crate::descriptor::IndexDescriptor;
use crate::error::Result;
use crate::store::{Entity, EntityId, EntityStore, Filter};
use std::collections::HashMap;
use tracing::debug;

/// Fetch the entities for `ids` and return them in exactly the order of `ids`.
///
/// One store round-trip; the re-sort happens in memory keyed by position.
/// Ids missing from the store are dropped. Duplicate ids are emitted at
/// every position they occur. Entities failing a caller filter are dropped.
pub fn reconcile(
    ids: &[EntityId],
    store: &dyn EntityStore,
    descriptor: &IndexDescriptor,
    filters: &[Filter],
) -> Result<Vec<Entity>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = store.fetch_by_ids(&descriptor.table, &descriptor.primary_key, ids)?;
    let mut by_id: HashMap<EntityId, Entity> =
        rows.into_iter().map(|e| (e.id.clone(), e)).collect();

    let mut remaining: HashMap<&EntityId, usize> = HashMap::new();
    for id in ids {
        *remaining.entry(id).or_default() += 1;
    }

    let mut ordered = Vec::with_capacity(ids.len());
    let mut dropped = 0usize;
    for id in ids {
        // Last occurrence takes ownership
        let left = remaining.get_mut(id).map(|n| {
            *n -= 1;
            *n
        });
        let entity = if left == Some(0) {
            by_id.remove(id)
        } else {
            by_id.get(id).cloned()
        };

        match entity {
            Some(e) if filters.iter().all(|f| f.matches(&e)) => ordered.push(e),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(
            "Reconcile on {} dropped {} of {} ids",
            descriptor.table,
            dropped,
            ids.len()
        );
    }

    Ok(ordered)
}
