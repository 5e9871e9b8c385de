//! Business logic services.
//!
//! Services orchestrate a connected [`GraphDriver`](crate::storage::GraphDriver)
//! and provide the high-level operations:
//!
//! - [`BackendFactory`]: picks and connects a driver
//! - [`RelationshipEngine`]: relationship lifecycle and structured search
//! - [`GraphAnalytics`]: paths, neighborhoods, clusters, bridges
//! - [`MemoryService`]: memory CRUD and supersession
//! - [`DecayScheduler`]: background decay
//! - [`GraphService`]: all of the above behind one facade

mod analytics;
mod backend_factory;
pub mod context_extraction;
mod decay;
mod graph;
mod memory;
mod relationships;

pub use analytics::GraphAnalytics;
pub use backend_factory::BackendFactory;
pub use context_extraction::extract_context;
pub use decay::{DecayHandle, DecayScheduler};
pub use graph::GraphService;
pub use memory::MemoryService;
pub use relationships::{
    DecayBatch, DecayOutcome, DecayReport, RelationshipEngine, apply_decay, decayed_strength,
    reinforced,
};
