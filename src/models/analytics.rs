//! Result types for traversal and graph analytics.

use super::memory::{Memory, MemoryId};
use super::relationship::{Relationship, RelationshipType};
use serde::Serialize;

/// Outcome of a path search.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// Whether a path was found within the depth bound.
    pub found: bool,
    /// Memory ids along the path, start to end.
    pub memory_ids: Vec<MemoryId>,
    /// Relationships along the path, in order.
    pub relationships: Vec<Relationship>,
    /// Product of edge strengths along the path (1 for a zero-hop path).
    pub total_strength: f64,
}

impl PathResult {
    /// The "no path" result.
    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            found: false,
            memory_ids: Vec::new(),
            relationships: Vec::new(),
            total_strength: 0.0,
        }
    }

    /// Number of hops.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.relationships.len()
    }
}

/// A memory reached from a start memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedMemory {
    /// The related memory.
    pub memory: Memory,
    /// Hops from the start memory.
    pub depth: u32,
    /// Product of edge strengths along the best fewest-hop route.
    pub path_strength: f64,
    /// Type of the last relationship on that route.
    pub via_type: RelationshipType,
    /// Id of the last relationship on that route.
    pub via_relationship: String,
}

/// A group of densely interconnected memories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Stable id within one analysis (`cluster-0` is the largest).
    pub id: String,
    /// Member ids, sorted.
    pub members: Vec<MemoryId>,
    /// Member with the highest internal degree.
    pub representative: MemoryId,
    /// Internal edge density in `[0, 1]`.
    pub cohesion: f64,
    /// Mean strength of internal edges.
    pub average_strength: f64,
    /// Number of distinct internal links.
    pub internal_edges: usize,
}

/// A memory whose removal disconnects parts of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeNode {
    /// The bridging memory.
    pub memory_id: MemoryId,
    /// Connected components among its neighbors once it is removed.
    pub components_separated: usize,
    /// Clusters its neighbors belong to, sorted.
    pub connected_clusters: Vec<String>,
    /// Number of distinct neighbors.
    pub degree: usize,
}
