//! Lightning Search core: engine-first search with an embedded fallback,
//! and a supervisor for the external engine process.
//!
//! # Example
//!
//! ```rust,ignore
//! use lightning_core::{LightningConfig, LightningSearch};
//!
//! #[tokio::main]
//! async fn main() -> lightning_core::Result<()> {
//!     let config = LightningConfig::load("lightning-search.json")?;
//!     let search = LightningSearch::open(config)?;
//!
//!     // Ranked by the engine, or substring matches if it is down
//!     let companies = search.search("companies", "lon", None).await?;
//!     println!("Found {} companies", companies.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod index;
pub mod search;
pub mod store;
pub mod supervisor;

pub use config::{LightningConfig, DEFAULT_CONFIG_FILE};
pub use descriptor::{DescriptorOverride, DescriptorResolver, IndexDescriptor, TableShape};
pub use engine::{BackendFault, EngineBackend, EngineClient, EngineQueryResult, FaultKind};
pub use error::{LightningError, Result};
pub use index::{FulltextIndex, FulltextStats};
pub use search::{DispatchOutcome, SearchDispatcher, SearchMode, SearchRequest};
pub use store::{Entity, EntityId, EntityStore, Filter, SqliteStore, StoreQuery};
pub use supervisor::{
    EngineSupervisor, OutputRenderer, PlatformTarget, ProcessState, StartOutcome, StopOutcome,
};

use std::sync::Arc;
use tracing::info;

/// Entry point for application code.
///
/// Resolves descriptors per entity type, routes queries through the
/// dispatcher, and manages the fulltext indexes the engine reads.
pub struct LightningSearch {
    config: LightningConfig,
    resolver: DescriptorResolver,
    store: SqliteStore,
    dispatcher: SearchDispatcher,
}

impl LightningSearch {
    /// Open the configured SQLite database and an HTTP engine client.
    pub fn open(config: LightningConfig) -> Result<Self> {
        let store = SqliteStore::open(config.database.database_path())?;
        let client = EngineClient::new(&config.service)?;
        Ok(Self::with_backend(config, store, Arc::new(client)))
    }

    /// Build over an existing store and engine backend.
    pub fn with_backend(
        config: LightningConfig,
        store: SqliteStore,
        backend: Arc<dyn EngineBackend>,
    ) -> Self {
        let resolver = DescriptorResolver::new(&config);
        let dispatcher =
            SearchDispatcher::new(backend, Arc::new(store.clone()), config.modes.clone());
        Self {
            config,
            resolver,
            store,
            dispatcher,
        }
    }

    /// Register an explicit descriptor override for an entity type.
    pub fn with_override(mut self, entity_type: impl Into<String>, o: DescriptorOverride) -> Self {
        self.resolver = self.resolver.with_override(entity_type, o);
        self
    }

    pub fn config(&self) -> &LightningConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn descriptor(&self, entity_type: &str) -> Result<IndexDescriptor> {
        self.resolver.resolve(entity_type, &self.store)
    }

    /// Search one entity type. `mode` overrides the configured default.
    pub async fn search(
        &self,
        entity_type: &str,
        query: &str,
        mode: Option<SearchMode>,
    ) -> Result<Vec<Entity>> {
        let mut request = SearchRequest::new(entity_type, query);
        request.mode = mode;
        self.search_request(&request).await
    }

    pub async fn search_request(&self, request: &SearchRequest) -> Result<Vec<Entity>> {
        let descriptor = self.descriptor(&request.entity_type)?;
        self.dispatcher.search(request, &descriptor).await
    }

    /// Dispatch without reconciling, exposing which path answered.
    pub async fn dispatch(&self, request: &SearchRequest) -> Result<DispatchOutcome> {
        let descriptor = self.descriptor(&request.entity_type)?;
        self.dispatcher.dispatch(request, &descriptor).await
    }

    /// Entity types named in configuration or overrides.
    pub fn known_entity_types(&self) -> Vec<String> {
        self.resolver.known_entity_types()
    }

    /// Create or repair the fulltext index for one entity type.
    pub fn ensure_index(&self, entity_type: &str) -> Result<FulltextStats> {
        let descriptor = self.descriptor(entity_type)?;
        descriptor.ensure_searchable()?;
        let conn = self.store.connection()?;
        let index = FulltextIndex::new(&descriptor);
        index.ensure(&conn)?;
        let stats = index.stats(&conn)?;
        info!(
            "Indexed {} rows of {} into {}",
            stats.row_count, descriptor.table, stats.index_name
        );
        Ok(stats)
    }

    /// Drop, recreate and optimize the fulltext index for one entity type.
    ///
    /// Picks up changed searchable fields, which `ensure_index` does not.
    pub fn rebuild_index(&self, entity_type: &str) -> Result<FulltextStats> {
        let descriptor = self.descriptor(entity_type)?;
        descriptor.ensure_searchable()?;
        let conn = self.store.connection()?;
        let index = FulltextIndex::new(&descriptor);
        index.rebuild(&conn)?;
        index.optimize(&conn)?;
        let stats = index.stats(&conn)?;
        info!(
            "Rebuilt {} with {} rows of {}",
            stats.index_name, stats.row_count, descriptor.table
        );
        Ok(stats)
    }

    /// Remove the fulltext index for one entity type.
    pub fn drop_index(&self, entity_type: &str) -> Result<()> {
        let descriptor = self.descriptor(entity_type)?;
        let conn = self.store.connection()?;
        FulltextIndex::new(&descriptor).drop(&conn)
    }
}
