//! Graph service: the operation surface over one connected driver.
//!
//! # Example
//!
//! ```rust,no_run
//! use memorygraph::{GraphService, MemoryGraphConfig, MemoryType, NewMemory};
//!
//! let service = GraphService::open(&MemoryGraphConfig::load_default())?;
//! let memory = service.create_memory(NewMemory::new(MemoryType::Fix, "Pin tokio", "Pin to 1.50"))?;
//! let related = service.get_related(memory.id.as_str(), &[], 2, None)?;
//! # Ok::<(), memorygraph::Error>(())
//! ```

use crate::config::{DecaySettings, MemoryGraphConfig};
use crate::models::{
    BridgeNode, Cluster, Direction, GraphStats, HealthStatus, Memory, MemorySearch, MemoryUpdate,
    NewMemory, NewRelationship, PathResult, RelatedMemory, Relationship, RelationshipQuery,
    RelationshipType, TraversalQuery, TraversalStep,
};
use crate::services::{
    BackendFactory, DecayHandle, DecayReport, DecayScheduler, GraphAnalytics, MemoryService,
    RelationshipEngine,
};
use crate::storage::GraphDriver;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;

/// High-level memory graph operations.
///
/// Wraps one [`GraphDriver`] and provides:
/// - Memory CRUD, search, and access tracking
/// - Relationship CRUD, reinforcement, validation, and structured search
/// - Traversal, path-finding, clustering, and bridge detection
/// - Decay, either on demand or as a background task
///
/// # Thread Safety
///
/// The service is `Send + Sync`; share it behind an [`Arc`].
pub struct GraphService {
    driver: Arc<dyn GraphDriver>,
    memories: MemoryService,
    relationships: Arc<RelationshipEngine>,
    analytics: GraphAnalytics,
}

impl GraphService {
    /// Selects, connects, and wraps a backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's connection or schema error.
    pub fn open(config: &MemoryGraphConfig) -> Result<Self> {
        let driver = BackendFactory::connect(config)?;
        Ok(Self::with_driver(driver, config))
    }

    /// Wraps an already connected driver.
    #[must_use]
    pub fn with_driver(driver: Arc<dyn GraphDriver>, config: &MemoryGraphConfig) -> Self {
        let relationships = Arc::new(RelationshipEngine::from_config(Arc::clone(&driver), config));
        Self {
            memories: MemoryService::new(Arc::clone(&driver), Arc::clone(&relationships)),
            analytics: GraphAnalytics::new(Arc::clone(&driver)),
            relationships,
            driver,
        }
    }

    /// Returns the underlying driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn GraphDriver> {
        &self.driver
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.driver.backend_name()
    }

    /// Returns the relationship engine.
    #[must_use]
    pub const fn relationships(&self) -> &Arc<RelationshipEngine> {
        &self.relationships
    }

    /// Disconnects the driver.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn close(&self) -> Result<()> {
        self.driver.disconnect()
    }

    // =========================================================================
    // Memories
    // =========================================================================

    /// Stores a memory.
    ///
    /// # Errors
    ///
    /// See [`MemoryService::create`].
    pub fn create_memory(&self, request: NewMemory) -> Result<Memory> {
        self.memories.create(request)
    }

    /// Fetches a memory.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        self.memories.get(id)
    }

    /// Updates or supersedes a memory.
    ///
    /// # Errors
    ///
    /// See [`MemoryService::update`].
    pub fn update_memory(&self, id: &str, update: &MemoryUpdate) -> Result<Memory> {
        self.memories.update(id, update)
    }

    /// Deletes a memory and its relationships.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        self.memories.delete(id)
    }

    /// Searches memories.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn search_memories(&self, search: &MemorySearch) -> Result<Vec<Memory>> {
        self.memories.search(search)
    }

    /// Records an access to a memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown id.
    pub fn record_access(&self, id: &str) -> Result<Memory> {
        self.memories.record_access(id)
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    /// Creates a relationship.
    ///
    /// # Errors
    ///
    /// See [`RelationshipEngine::create`].
    pub fn create_relationship(&self, request: NewRelationship) -> Result<Relationship> {
        self.relationships.create(request)
    }

    /// Fetches a relationship.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn get_relationship(&self, id: &str) -> Result<Option<Relationship>> {
        self.relationships.get(id)
    }

    /// Deletes a relationship.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn delete_relationship(&self, id: &str) -> Result<bool> {
        self.relationships.delete(id)
    }

    /// Reinforces a relationship.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown id.
    pub fn reinforce_relationship(&self, id: &str) -> Result<Relationship> {
        self.relationships.reinforce(id)
    }

    /// Records supporting evidence or counter-evidence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown id.
    pub fn record_validation(&self, id: &str, supports: bool) -> Result<Relationship> {
        self.relationships.record_validation(id, supports)
    }

    /// Lists the relationships touching a memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown memory.
    pub fn relationships_of(&self, memory_id: &str, direction: Direction) -> Result<Vec<Relationship>> {
        self.relationships.relationships_of(memory_id, direction)
    }

    /// Searches relationships by extracted context.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn search_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        self.relationships.search(query)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Raw breadth-first traversal from a memory.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn traverse(&self, start_id: &str, query: &TraversalQuery) -> Result<Vec<TraversalStep>> {
        self.driver.traverse(start_id, query)
    }

    /// Ranked memories around a memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown memory.
    pub fn get_related(
        &self,
        memory_id: &str,
        rel_types: &[RelationshipType],
        depth: u32,
        min_strength: Option<f64>,
    ) -> Result<Vec<RelatedMemory>> {
        self.analytics
            .get_related(memory_id, rel_types, depth, min_strength)
    }

    /// Fewest-hop path between two memories.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] when either memory is unknown.
    pub fn find_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: u32,
        rel_types: &[RelationshipType],
    ) -> Result<PathResult> {
        self.analytics.find_path(from_id, to_id, max_depth, rel_types)
    }

    /// Densely connected groups of memories.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn find_clusters(&self, min_size: usize, min_density: f64) -> Result<Vec<Cluster>> {
        self.analytics.find_clusters(min_size, min_density)
    }

    /// Memories whose removal disconnects the graph.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn find_bridges(&self) -> Result<Vec<BridgeNode>> {
        self.analytics.find_bridges()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Aggregate node and relationship counts.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn stats(&self) -> Result<GraphStats> {
        self.driver.stats()
    }

    /// Probes the backend.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    pub fn health(&self) -> Result<HealthStatus> {
        self.driver.health_check()
    }

    /// Runs one decay sweep synchronously.
    ///
    /// # Errors
    ///
    /// Returns the first batch error.
    pub fn run_decay(&self) -> Result<DecayReport> {
        self.relationships.run_decay(Utc::now())
    }

    /// Starts background decay at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_decay(&self) -> DecayHandle {
        let settings: &DecaySettings = self.relationships.decay_settings();
        DecayScheduler::spawn(Arc::clone(&self.relationships), settings.interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryType;

    #[test]
    fn test_open_in_memory_and_round_trip() {
        let service = GraphService::open(&MemoryGraphConfig::in_memory()).unwrap();
        assert_eq!(service.backend_name(), "sqlite");

        let problem = service
            .create_memory(NewMemory::new(MemoryType::Problem, "Timeout", "Requests time out"))
            .unwrap();
        let fix = service
            .create_memory(NewMemory::new(MemoryType::Solution, "Retry", "Add retry with backoff"))
            .unwrap();
        let link = service
            .create_relationship(
                NewRelationship::new(fix.id.clone(), problem.id.clone(), RelationshipType::Solves)
                    .with_context("partially fixes the timeout in production, verified by integration tests"),
            )
            .unwrap();

        let path = service
            .find_path(fix.id.as_str(), problem.id.as_str(), 3, &[])
            .unwrap();
        assert!(path.found);
        assert_eq!(path.relationships[0].id, link.id);

        let stats = service.stats().unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.relationship_count, 1);
        assert!(service.health().unwrap().connected);

        let report = service.run_decay().unwrap();
        assert!(report.completed);
        assert_eq!(report.weakened, 0);
        service.close().unwrap();
    }
}
