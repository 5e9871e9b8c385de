//! Observability Tests
//!
//! Logging and the Prometheus recorder are process-global, so this binary
//! owns them.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use memorygraph::observability::{
    LogFormat, LoggingConfig, init_logging, install_prometheus_recorder, render_metrics,
};
use memorygraph::{GraphService, MemoryGraphConfig, MemoryType, NewMemory, NewRelationship, RelationshipType};

#[test]
fn test_operations_are_logged_and_counted() {
    let logging = LoggingConfig {
        format: LogFormat::Json,
        ..LoggingConfig::default()
    };
    init_logging(&logging).unwrap();
    assert!(init_logging(&logging).is_err());

    let handle = install_prometheus_recorder().unwrap();
    install_prometheus_recorder().unwrap();

    let service = GraphService::open(&MemoryGraphConfig::in_memory()).unwrap();
    let a = service
        .create_memory(NewMemory::new(MemoryType::Error, "E0502", "borrow conflict"))
        .unwrap();
    let b = service
        .create_memory(NewMemory::new(MemoryType::Fix, "clone first", "clone before borrow"))
        .unwrap();
    service
        .create_relationship(NewRelationship::new(b.id.clone(), a.id.clone(), RelationshipType::Solves))
        .unwrap();
    service
        .create_relationship(NewRelationship::new(b.id, a.id, RelationshipType::Solves))
        .unwrap_err();
    service.run_decay().unwrap();

    let rendered = render_metrics().expect("recorder installed");
    assert!(rendered.contains("relationships_created_total"));
    assert!(rendered.contains("relationship_duplicates_rejected_total"));
    assert!(rendered.contains("graph_driver_operations_total"));
    assert!(handle.render().contains("decay_relationships_weakened_total"));
}
