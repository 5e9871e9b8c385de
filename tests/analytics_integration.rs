//! Graph Analytics Integration Tests
//!
//! Path-finding, neighborhood ranking, clusters, and bridges on small graphs
//! with known structure.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]

use memorygraph::{
    Error, GraphService, Memory, MemoryGraphConfig, MemoryType, NewMemory, NewRelationship,
    RelationshipType,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn service() -> GraphService {
    GraphService::open(&MemoryGraphConfig::in_memory().with_prevent_cycles(false))
        .expect("open in-memory service")
}

/// Creates memories with ids `ids`, so ordering in assertions is predictable.
fn nodes(service: &GraphService, ids: &[&str]) -> Vec<Memory> {
    ids.iter()
        .map(|id| {
            service
                .create_memory(NewMemory::new(MemoryType::General, *id, format!("node {id}")).with_id(*id))
                .expect("create memory")
        })
        .collect()
}

fn edge(service: &GraphService, from: &str, to: &str, rel_type: RelationshipType, strength: f64) {
    service
        .create_relationship(NewRelationship::new(from, to, rel_type).with_strength(strength))
        .expect("create relationship");
}

// ============================================================================
// find_path
// ============================================================================

#[test]
fn test_find_path_prefers_fewest_hops_then_strength() {
    let service = service();
    nodes(&service, &["a", "b", "c", "d", "e"]);
    // Two 2-hop routes a->d: via b (0.9 * 0.9) and via c (0.5 * 0.5).
    edge(&service, "a", "b", RelationshipType::Causes, 0.9);
    edge(&service, "b", "d", RelationshipType::Causes, 0.9);
    edge(&service, "a", "c", RelationshipType::Causes, 0.5);
    edge(&service, "c", "d", RelationshipType::Causes, 0.5);
    // A stronger but longer route a->e->... does not reach d in fewer hops.
    edge(&service, "a", "e", RelationshipType::Causes, 1.0);

    let path = service.find_path("a", "d", 4, &[]).unwrap();
    assert!(path.found);
    assert_eq!(path.hops(), 2);
    let ids: Vec<&str> = path.memory_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "d"]);
    assert!((path.total_strength - 0.81).abs() < 1e-9);
}

#[test]
fn test_find_path_respects_depth_and_type_filters() {
    let service = service();
    nodes(&service, &["a", "b", "c"]);
    edge(&service, "a", "b", RelationshipType::Causes, 0.8);
    edge(&service, "b", "c", RelationshipType::Triggers, 0.8);

    assert!(!service.find_path("a", "c", 1, &[]).unwrap().found);
    assert!(service.find_path("a", "c", 2, &[]).unwrap().found);
    let causes_only = service
        .find_path("a", "c", 5, &[RelationshipType::Causes])
        .unwrap();
    assert!(!causes_only.found);
    assert!(causes_only.memory_ids.is_empty());
}

#[test]
fn test_find_path_to_self_and_unknown_ids() {
    let service = service();
    nodes(&service, &["a"]);

    let itself = service.find_path("a", "a", 3, &[]).unwrap();
    assert!(itself.found);
    assert_eq!(itself.hops(), 0);
    assert_eq!(itself.total_strength, 1.0);

    let err = service.find_path("a", "ghost", 3, &[]).unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "memory", .. }));
}

// ============================================================================
// get_related
// ============================================================================

#[test]
fn test_get_related_ranks_by_path_strength() {
    let service = service();
    nodes(&service, &["center", "near", "far", "weak", "other"]);
    edge(&service, "center", "near", RelationshipType::Solves, 0.9);
    edge(&service, "near", "far", RelationshipType::Causes, 0.8);
    // Incoming edges count too.
    edge(&service, "weak", "center", RelationshipType::RelatedTo, 0.3);

    let related = service.get_related("center", &[], 2, None).unwrap();
    let ids: Vec<&str> = related.iter().map(|r| r.memory.id.as_str()).collect();
    assert_eq!(ids, vec!["near", "far", "weak"]);
    assert_eq!(related[0].depth, 1);
    assert_eq!(related[0].via_type, RelationshipType::Solves);
    assert_eq!(related[1].depth, 2);
    assert!((related[1].path_strength - 0.72).abs() < 1e-9);

    let direct = service.get_related("center", &[], 1, None).unwrap();
    assert_eq!(direct.len(), 2);

    let strong = service.get_related("center", &[], 2, Some(0.5)).unwrap();
    let ids: Vec<&str> = strong.iter().map(|r| r.memory.id.as_str()).collect();
    assert_eq!(ids, vec!["near", "far"]);

    let typed = service
        .get_related("center", &[RelationshipType::RelatedTo], 2, None)
        .unwrap();
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].memory.id.as_str(), "weak");
}

#[test]
fn test_get_related_isolated_memory_is_empty() {
    let service = service();
    nodes(&service, &["alone"]);
    assert!(service.get_related("alone", &[], 3, None).unwrap().is_empty());
    assert!(service.get_related("missing", &[], 3, None).is_err());
}

// ============================================================================
// Clusters and Bridges
// ============================================================================

/// Two triangles joined through `c -> d`.
fn barbell(service: &GraphService) {
    nodes(service, &["a", "b", "c", "d", "e", "f"]);
    for (from, to) in [("a", "b"), ("b", "c"), ("a", "c"), ("d", "e"), ("e", "f"), ("d", "f")] {
        edge(service, from, to, RelationshipType::WorksWith, 0.8);
    }
    edge(service, "c", "d", RelationshipType::DependsOn, 0.2);
}

#[test]
fn test_find_clusters_on_barbell() {
    let service = service();
    barbell(&service);

    let clusters = service.find_clusters(3, 0.5).unwrap();
    assert_eq!(clusters.len(), 2);
    for cluster in &clusters {
        assert_eq!(cluster.members.len(), 3);
        assert_eq!(cluster.internal_edges, 3);
        assert_eq!(cluster.cohesion, 1.0);
        assert!((cluster.average_strength - 0.8).abs() < 1e-9);
        assert!(cluster.members.contains(&cluster.representative));
    }
    let first: Vec<&str> = clusters[0].members.iter().map(|id| id.as_str()).collect();
    assert_eq!(first, vec!["a", "b", "c"]);

    assert!(service.find_clusters(4, 0.0).unwrap().is_empty());
}

#[test]
fn test_find_bridges_on_barbell() {
    let service = service();
    barbell(&service);

    let bridges = service.find_bridges().unwrap();
    let ids: Vec<&str> = bridges.iter().map(|b| b.memory_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "d"]);
    for bridge in &bridges {
        assert_eq!(bridge.components_separated, 2);
        assert_eq!(bridge.degree, 3);
        assert_eq!(bridge.connected_clusters.len(), 2);
    }
}

#[test]
fn test_empty_graph_has_no_structure() {
    let service = service();
    assert!(service.find_clusters(1, 0.0).unwrap().is_empty());
    assert!(service.find_bridges().unwrap().is_empty());
}
