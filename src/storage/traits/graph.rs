//! Graph driver contract.
//!
//! Every storage engine implements [`GraphDriver`]. The contract is
//! label-generic: memories are nodes labelled `Memory`, relationships are
//! typed edges, and all payload travels as a JSON property map.
//!
//! # Contract guarantees
//!
//! For the same sequence of logical operations every driver returns the same
//! observable results. The shared compatibility suite in
//! `tests/backend_compat.rs` holds each driver to this.
//!
//! | Operation | Failure modes |
//! |-----------|---------------|
//! | `connect` | `Connection`, `Timeout`, `Schema` |
//! | `store_node` | `Duplicate` (id taken), `Validation` (bad label) |
//! | `update_node` | `NotFound` |
//! | `store_relationship` | `NotFound` (missing endpoint), `Duplicate` (id taken) |
//! | `update_relationship` | `NotFound` |
//! | all | `Connection`, `Timeout` after bounded retries |

use crate::models::{
    EdgeFilter, EdgeRecord, GraphStats, HealthStatus, NodeFilter, NodeRecord, Properties,
    TraversalQuery, TraversalStep,
};
use crate::Result;
use std::collections::HashSet;

/// Uniform operation set implemented by every storage engine.
///
/// Implementations must be thread-safe; all methods take `&self`.
pub trait GraphDriver: Send + Sync {
    /// Short backend name used in logs, metrics, and errors.
    fn backend_name(&self) -> &'static str;

    /// Connects and initializes the schema. Idempotent.
    fn connect(&self) -> Result<()>;

    /// Releases backend resources. Idempotent.
    fn disconnect(&self) -> Result<()>;

    /// Returns true while connected.
    fn is_connected(&self) -> bool;

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Stores a new node and returns its id.
    ///
    /// The id is taken from `properties["id"]` when it is a string, otherwise
    /// generated and written back into the stored properties.
    fn store_node(&self, label: &str, properties: &Properties) -> Result<String>;

    /// Fetches a node by id.
    fn get_node(&self, id: &str) -> Result<Option<NodeRecord>>;

    /// Shallow-merges `properties` into a node; `null` values remove keys.
    fn update_node(&self, id: &str, properties: &Properties) -> Result<NodeRecord>;

    /// Deletes a node and every incident relationship.
    ///
    /// Returns `false` when the node did not exist.
    fn delete_node(&self, id: &str) -> Result<bool>;

    /// Searches nodes with the given label.
    ///
    /// With a text query, results are ordered by relevance; otherwise by id.
    fn search_nodes(&self, label: &str, filter: &NodeFilter) -> Result<Vec<NodeRecord>>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Stores a directed relationship and returns its id.
    fn store_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<String>;

    /// Fetches a relationship by id.
    fn get_relationship(&self, id: &str) -> Result<Option<EdgeRecord>>;

    /// Shallow-merges `properties` into a relationship.
    fn update_relationship(&self, id: &str, properties: &Properties) -> Result<EdgeRecord>;

    /// Deletes a relationship. Returns `false` when it did not exist.
    fn delete_relationship(&self, id: &str) -> Result<bool>;

    /// Lists relationships matching the filter, ordered by id.
    fn query_relationships(&self, filter: &EdgeFilter) -> Result<Vec<EdgeRecord>>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Breadth-first traversal from `start_id`.
    ///
    /// Each level emits every admissible edge from the previous frontier to a
    /// node not settled at a shallower depth, ordered by `(depth, edge id)`.
    fn traverse(&self, start_id: &str, query: &TraversalQuery) -> Result<Vec<TraversalStep>>;

    /// Returns true when `to_id` is reachable from `from_id` over outgoing
    /// edges of the given types (all types when `None`).
    ///
    /// The default walks [`GraphDriver::query_relationships`] depth-first and
    /// stops at the first hit.
    fn path_exists(&self, from_id: &str, to_id: &str, rel_types: Option<&[String]>) -> Result<bool> {
        if from_id == to_id {
            return Ok(true);
        }
        let mut visited: HashSet<String> = HashSet::from([from_id.to_string()]);
        let mut stack = vec![from_id.to_string()];
        while let Some(node) = stack.pop() {
            let mut filter = EdgeFilter::outgoing(node);
            filter.rel_types = rel_types.map(<[String]>::to_vec);
            for edge in self.query_relationships(&filter)? {
                if edge.to_id == to_id {
                    return Ok(true);
                }
                if visited.insert(edge.to_id.clone()) {
                    stack.push(edge.to_id);
                }
            }
        }
        Ok(false)
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Probes the backend.
    fn health_check(&self) -> Result<HealthStatus>;

    /// Aggregate counts.
    fn stats(&self) -> Result<GraphStats>;
}
