//! Data models for memories, relationships, and graph queries.

mod analytics;
mod context;
pub mod graph;
mod memory;
mod relationship;

pub use analytics::{BridgeNode, Cluster, PathResult, RelatedMemory};
pub use context::{ContextScope, RelationshipContext, StructuredContext};
pub use graph::{
    Direction, EdgeFilter, EdgeRecord, GraphStats, HealthStatus, NodeFilter, NodeRecord,
    ID_KEY, Properties, PropertyFilter, STRENGTH_KEY, TEXT_FIELDS, TraversalQuery, TraversalStep,
    merge_properties, resolve_id, validate_identifier,
};
pub use memory::{
    DEFAULT_IMPORTANCE, DEFAULT_MEMORY_CONFIDENCE, MEMORY_LABEL, Memory, MemoryContext, MemoryId,
    MemorySearch, MemoryType, MemoryUpdate, NewMemory, normalize_tags,
};
pub use relationship::{
    DEFAULT_DECAY_RATE, DEFAULT_RELATIONSHIP_CONFIDENCE, NewRelationship, Relationship,
    RelationshipCategory, RelationshipId, RelationshipQuery, RelationshipType,
};

use crate::{Error, Result};

/// Rejects values outside `[0, 1]` (including NaN).
pub fn validate_unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}
