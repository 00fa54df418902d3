//! Chooses the backend for a query and applies the fallback policy.

use super::{fallback_search, reconcile, resolve_mode, SearchMode, SearchRequest};
use crate::config::ModesConfig;
use crate::descriptor::IndexDescriptor;
use crate::engine::{BackendFault, EngineBackend, EngineQueryResult};
use crate::error::{LightningError, Result};
use crate::store::{Entity, EntityStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a dispatch: ranked ids from the engine, or entities from the
/// embedded path.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Ranked(EngineQueryResult),
    Embedded {
        entities: Vec<Entity>,
        /// Engine fault that triggered the fallback; `None` when the embedded
        /// mode was selected directly.
        cause: Option<BackendFault>,
    },
}

impl DispatchOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DispatchOutcome::Embedded { cause: Some(_), .. })
    }
}

/// Engine-first search dispatcher with single-shot embedded fallback.
#[derive(Clone)]
pub struct SearchDispatcher {
    backend: Arc<dyn EngineBackend>,
    store: Arc<dyn EntityStore>,
    modes: ModesConfig,
}

impl SearchDispatcher {
    pub fn new(
        backend: Arc<dyn EngineBackend>,
        store: Arc<dyn EntityStore>,
        modes: ModesConfig,
    ) -> Self {
        Self {
            backend,
            store,
            modes,
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Route one request. No retries happen here.
    pub async fn dispatch(
        &self,
        request: &SearchRequest,
        descriptor: &IndexDescriptor,
    ) -> Result<DispatchOutcome> {
        descriptor.ensure_searchable()?;

        let mode = resolve_mode(request.mode, self.modes.default);
        if mode == SearchMode::Embedded {
            debug!("Embedded search selected for {}", descriptor.entity_type);
            let entities = self.run_embedded(request, descriptor).await?;
            return Ok(DispatchOutcome::Embedded {
                entities,
                cause: None,
            });
        }

        match self.backend.query(&descriptor.table, &request.query).await {
            Ok(result) => Ok(DispatchOutcome::Ranked(result)),
            Err(fault) if self.modes.fallback_enabled() => {
                warn!(
                    "Search engine failed for {} ({}); falling back to embedded search",
                    descriptor.table, fault
                );
                let entities = self.run_embedded(request, descriptor).await?;
                Ok(DispatchOutcome::Embedded {
                    entities,
                    cause: Some(fault),
                })
            }
            Err(fault) => {
                warn!(
                    "Search engine failed for {} ({}); no fallback configured",
                    descriptor.table, fault
                );
                Err(LightningError::SearchBackendUnavailable {
                    table: descriptor.table.clone(),
                    status: fault.status(),
                    message: fault.message,
                })
            }
        }
    }

    /// Dispatch, then turn ranked ids into entities in engine order.
    pub async fn search(
        &self,
        request: &SearchRequest,
        descriptor: &IndexDescriptor,
    ) -> Result<Vec<Entity>> {
        match self.dispatch(request, descriptor).await? {
            DispatchOutcome::Ranked(result) => {
                let store = Arc::clone(&self.store);
                let descriptor = descriptor.clone();
                let filters = request.filters.clone();
                tokio::task::spawn_blocking(move || {
                    reconcile(&result.ids, store.as_ref(), &descriptor, &filters)
                })
                .await
                .map_err(|e| LightningError::Other(format!("Reconcile task failed: {}", e)))?
            }
            DispatchOutcome::Embedded { entities, .. } => Ok(entities),
        }
    }

    async fn run_embedded(
        &self,
        request: &SearchRequest,
        descriptor: &IndexDescriptor,
    ) -> Result<Vec<Entity>> {
        let store = Arc::clone(&self.store);
        let descriptor = descriptor.clone();
        let query = request.query.clone();
        let filters = request.filters.clone();
        tokio::task::spawn_blocking(move || {
            fallback_search(&query, &descriptor, store.as_ref(), &filters)
        })
        .await
        .map_err(|e| LightningError::Other(format!("Embedded search task failed: {}", e)))?
    }
}
