//! # memorygraph
//!
//! Backend-agnostic graph memory store for AI coding assistants.
//!
//! memorygraph records discrete knowledge units ("memories") and typed,
//! weighted relationships between them, and answers graph queries (search,
//! traversal, path-finding, clustering) across interchangeable storage engines.
//!
//! ## Features
//!
//! - One driver contract ([`GraphDriver`]) with a native Cypher driver for
//!   Neo4j and FalkorDB and an embedded fallback (`SQLite` + in-memory graph index)
//! - Automatic backend selection with graceful fallback ([`BackendFactory`])
//! - A relationship engine with a 36-type taxonomy, cycle prevention,
//!   reinforcement, decay, and natural-language context extraction
//! - Path-finding, ranked neighborhood expansion, cluster and bridge detection
//!
//! ## Example
//!
//! ```rust,no_run
//! use memorygraph::{GraphService, MemoryGraphConfig, MemoryType, NewMemory, NewRelationship, RelationshipType};
//!
//! let service = GraphService::open(&MemoryGraphConfig::in_memory())?;
//! let problem = service.create_memory(NewMemory::new(MemoryType::Problem, "Timeout", "Requests time out"))?;
//! let fix = service.create_memory(NewMemory::new(MemoryType::Solution, "Retry", "Add retry with backoff"))?;
//! service.create_relationship(
//!     NewRelationship::new(fix.id.as_str(), problem.id.as_str(), RelationshipType::Solves)
//!         .with_context("partially fixes the timeout in production, verified by integration tests"),
//! )?;
//! # Ok::<(), memorygraph::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{BackendKind, MemoryGraphConfig};
pub use models::{
    BridgeNode, Cluster, ContextScope, Direction, Memory, MemoryContext, MemoryId, MemorySearch,
    MemoryType, MemoryUpdate, NewMemory, NewRelationship, PathResult, RelatedMemory, Relationship,
    RelationshipCategory, RelationshipContext, RelationshipId, RelationshipQuery,
    RelationshipType, StructuredContext,
};
pub use services::{
    BackendFactory, DecayHandle, DecayReport, DecayScheduler, GraphAnalytics, GraphService,
    MemoryService, RelationshipEngine,
};
pub use storage::{FallbackDriver, GraphDriver};

/// Error type for memorygraph operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | A memory, node, or relationship id does not exist |
/// | `Validation` | Property out of range, empty title, malformed identifier |
/// | `UnknownType` | A relationship or memory type name is not in the taxonomy |
/// | `Duplicate` | Duplicate node id, or duplicate (pair, type) relationship |
/// | `CycleDetected` | A new relationship would close a directed cycle |
/// | `Connection` | A backend is unreachable after bounded retries |
/// | `Schema` | Schema/constraint creation failed during startup |
/// | `Timeout` | An operation exceeded its deadline |
/// | `OperationFailed` | Any other backend or I/O failure |
#[derive(Debug, ThisError)]
pub enum Error {
    /// An entity referenced by id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity ("memory", "node", "relationship").
        kind: &'static str,
        /// The missing id.
        id: String,
    },

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A type name is not part of the known taxonomy.
    ///
    /// This is a validation error; [`Error::is_validation`] returns `true`.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A uniqueness constraint would be violated.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Creating the relationship would close a directed cycle.
    #[error("relationship {from} -[{rel_type}]-> {to} would create a cycle")]
    CycleDetected {
        /// Proposed source memory id.
        from: String,
        /// Proposed target memory id.
        to: String,
        /// Proposed relationship type.
        rel_type: String,
    },

    /// The backend could not be reached.
    #[error("connection to {backend} failed: {cause}")]
    Connection {
        /// Backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// Schema or constraint initialization failed.
    #[error("schema initialization for {backend} failed: {cause}")]
    Schema {
        /// Backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {after_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Elapsed milliseconds.
        after_ms: u64,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail for reasons other than constraints
    /// - Property blobs cannot be (de)serialized
    /// - A backend returns a malformed response
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true when retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Returns true for input validation failures, including unknown types.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnknownType(_))
    }

    /// Shorthand for a not-found memory.
    pub fn memory_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "memory",
            id: id.into(),
        }
    }

    /// Shorthand for a not-found relationship.
    pub fn relationship_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "relationship",
            id: id.into(),
        }
    }
}

/// Result type alias for memorygraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("strength out of range".to_string());
        assert_eq!(err.to_string(), "validation failed: strength out of range");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::memory_not_found("m-1");
        assert_eq!(err.to_string(), "memory not found: m-1");

        let err = Error::CycleDetected {
            from: "a".to_string(),
            to: "b".to_string(),
            rel_type: "CAUSES".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "relationship a -[CAUSES]-> b would create a cycle"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(
            Error::Connection {
                backend: "neo4j".to_string(),
                cause: "refused".to_string(),
            }
            .is_retryable()
        );
        assert!(
            Error::Timeout {
                operation: "query".to_string(),
                after_ms: 10,
            }
            .is_retryable()
        );
        assert!(
            !Error::Schema {
                backend: "neo4j".to_string(),
                cause: "bad".to_string(),
            }
            .is_retryable()
        );
        assert!(Error::UnknownType("FOO".to_string()).is_validation());
        assert!(!Error::Duplicate("x".to_string()).is_validation());
    }
}
