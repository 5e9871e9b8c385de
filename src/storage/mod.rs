//! Storage engines behind the [`GraphDriver`] contract.
//!
//! - [`FallbackDriver`]: `SQLite` durability plus an in-process graph index
//! - [`CypherDriver`]: Neo4j or `FalkorDB` through a [`CypherTransport`]
//!
//! All drivers share the breadth-first kernel in [`traversal`] and the retry
//! policy in [`resilience`].

// Allow significant_drop_tightening - lock scopes are kept explicit around
// durable write plus index update.
#![allow(clippy::significant_drop_tightening)]
// Allow match_same_arms for explicit error classification.
#![allow(clippy::match_same_arms)]

pub mod fallback;
mod metrics;
pub mod native;
pub mod resilience;
pub mod sqlite;
pub mod traits;
pub mod traversal;

pub use fallback::{FallbackDriver, GraphIndex};
#[cfg(feature = "falkordb")]
pub use native::{FalkorDbDriver, FalkorDbTransport};
pub use native::{CypherDialect, CypherDriver, CypherTransport, Neo4jDriver, Neo4jHttpTransport};
pub use resilience::RetryPolicy;
pub use sqlite::{acquire_lock, read_lock, write_lock};
pub use traits::GraphDriver;
