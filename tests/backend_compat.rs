//! Backend Compatibility Tests
//!
//! One behavioral suite run against every available driver. The fallback
//! driver always runs; native drivers run when their connection is provided:
//!
//! - `MEMORYGRAPH_TEST_NEO4J_URI` (plus optional `MEMORYGRAPH_TEST_NEO4J_USER`,
//!   `MEMORYGRAPH_TEST_NEO4J_PASSWORD`)
//! - `MEMORYGRAPH_TEST_FALKORDB_URL` (requires the `falkordb` feature)
//!
//! Native databases may hold other data, so every assertion is scoped to the
//! memories the suite itself creates.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::print_stderr, clippy::float_cmp)]

use memorygraph::config::Neo4jSettings;
use memorygraph::{
    BackendKind, Direction, Error, GraphService, Memory, MemoryGraphConfig, MemorySearch,
    MemoryType, MemoryUpdate, NewMemory, NewRelationship, RelationshipQuery, RelationshipType,
};
use tempfile::TempDir;

// ============================================================================
// Shared Suite
// ============================================================================

/// A token that makes text searches hit only this run's memories.
fn run_token() -> String {
    format!("zq{}", uuid::Uuid::new_v4().simple())
}

fn remember(service: &GraphService, memory_type: MemoryType, title: &str, token: &str) -> Memory {
    service
        .create_memory(
            NewMemory::new(memory_type, title, format!("{title} {token}"))
                .with_tags(["compat", token])
                .with_importance(0.6),
        )
        .expect("create memory")
}

fn run_suite(service: &GraphService) {
    let token = run_token();

    // Memory round trip
    let problem = remember(service, MemoryType::Problem, "Connection pool exhausted", &token);
    let solution = remember(service, MemoryType::Solution, "Raise pool size", &token);
    let tech = remember(service, MemoryType::Technology, "PostgreSQL", &token);

    let loaded = service
        .get_memory(problem.id.as_str())
        .unwrap()
        .expect("stored memory");
    assert_eq!(loaded.id, problem.id);
    assert_eq!(loaded.memory_type, MemoryType::Problem);
    assert_eq!(loaded.title, problem.title);
    assert_eq!(loaded.tags, problem.tags);
    assert_eq!(loaded.version, 1);
    assert!(loaded.is_current);

    // Search scoped by the run token
    let found = service
        .search_memories(&MemorySearch::text(token.as_str()).with_limit(10))
        .unwrap();
    assert_eq!(found.len(), 3);
    let typed = service
        .search_memories(&MemorySearch::default().with_tags([token.as_str()]).with_types([MemoryType::Solution]))
        .unwrap();
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].id, solution.id);

    // Relationships
    let solves = service
        .create_relationship(
            NewRelationship::new(solution.id.clone(), problem.id.clone(), RelationshipType::Solves)
                .with_context("fully fixes the outage in production, verified by load tests"),
        )
        .unwrap();
    let occurs = service
        .create_relationship(NewRelationship::new(
            problem.id.clone(),
            tech.id.clone(),
            RelationshipType::OccursIn,
        ))
        .unwrap();

    let stored = service
        .get_relationship(solves.id.as_str())
        .unwrap()
        .expect("stored relationship");
    assert_eq!(stored.rel_type, RelationshipType::Solves);
    assert_eq!(stored.from_id, solution.id);
    assert_eq!(stored.context.structure.conditions, vec!["production"]);

    let duplicate = service
        .create_relationship(NewRelationship::new(
            solution.id.clone(),
            problem.id.clone(),
            RelationshipType::Solves,
        ))
        .unwrap_err();
    assert!(matches!(duplicate, Error::Duplicate(_)));

    let cycle = service
        .create_relationship(NewRelationship::new(
            tech.id.clone(),
            solution.id.clone(),
            RelationshipType::Requires,
        ))
        .unwrap_err();
    assert!(matches!(cycle, Error::CycleDetected { .. }));

    let incoming = service
        .relationships_of(problem.id.as_str(), Direction::Incoming)
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, solves.id);

    // Traversal and paths
    let path = service
        .find_path(solution.id.as_str(), tech.id.as_str(), 3, &[])
        .unwrap();
    assert!(path.found);
    assert_eq!(path.hops(), 2);
    assert_eq!(path.memory_ids, vec![solution.id.clone(), problem.id.clone(), tech.id.clone()]);
    assert!((path.total_strength - solves.strength * occurs.strength).abs() < 1e-9);

    let reverse = service
        .find_path(tech.id.as_str(), solution.id.as_str(), 3, &[])
        .unwrap();
    assert!(!reverse.found);

    let related = service
        .get_related(problem.id.as_str(), &[], 1, None)
        .unwrap();
    let ids: Vec<_> = related.iter().map(|r| r.memory.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&solution.id));
    assert!(ids.contains(&tech.id));
    // Solves (0.9) outranks OccursIn.
    assert_eq!(related[0].memory.id, solution.id);

    // Structured relationship search
    let with_evidence = service
        .search_relationships(
            &RelationshipQuery::new()
                .with_types([RelationshipType::Solves])
                .with_evidence(["load tests"]),
        )
        .unwrap();
    assert!(with_evidence.iter().any(|r| r.id == solves.id));

    // Weights
    let reinforced = service.reinforce_relationship(occurs.id.as_str()).unwrap();
    assert!(reinforced.strength > occurs.strength);
    assert_eq!(reinforced.reinforcement_count, 1);
    let persisted = service
        .get_relationship(occurs.id.as_str())
        .unwrap()
        .unwrap();
    assert!((persisted.strength - reinforced.strength).abs() < 1e-12);

    // Supersession
    let update = MemoryUpdate {
        content: Some(format!("Raise pool size to 50 {token}")),
        supersede: true,
        ..MemoryUpdate::default()
    };
    let next = service.update_memory(solution.id.as_str(), &update).unwrap();
    assert_eq!(next.version, 2);
    assert_ne!(next.id, solution.id);
    let prior = service.get_memory(solution.id.as_str()).unwrap().unwrap();
    assert!(!prior.is_current);

    // Delete cascades relationships
    assert!(service.delete_memory(problem.id.as_str()).unwrap());
    assert!(service.get_memory(problem.id.as_str()).unwrap().is_none());
    assert!(service.get_relationship(solves.id.as_str()).unwrap().is_none());
    assert!(service.get_relationship(occurs.id.as_str()).unwrap().is_none());
    assert!(!service.delete_memory(problem.id.as_str()).unwrap());
    let after_delete = service
        .get_related(solution.id.as_str(), &[], 2, None)
        .unwrap();
    assert!(after_delete.iter().all(|r| r.memory.id != problem.id));
    assert!(after_delete.iter().all(|r| r.via_relationship != solves.id.as_str()));

    let health = service.health().unwrap();
    assert!(health.connected);
    assert_eq!(health.backend, service.backend_name());

    for id in [&solution.id, &tech.id, &next.id] {
        service.delete_memory(id.as_str()).unwrap();
    }
}

// ============================================================================
// Drivers
// ============================================================================

#[test]
fn test_fallback_in_memory() {
    let service = GraphService::open(&MemoryGraphConfig::in_memory()).unwrap();
    assert_eq!(service.backend_name(), "sqlite");
    run_suite(&service);
    service.close().unwrap();
}

#[test]
fn test_fallback_file_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let config = MemoryGraphConfig::sqlite(dir.path().join("graph.db"));

    let service = GraphService::open(&config).unwrap();
    run_suite(&service);
    let kept = service
        .create_memory(NewMemory::new(MemoryType::Command, "cargo nextest run", "Run tests"))
        .unwrap();
    service.close().unwrap();

    let reopened = GraphService::open(&config).unwrap();
    let loaded = reopened.get_memory(kept.id.as_str()).unwrap().unwrap();
    assert_eq!(loaded.title, "cargo nextest run");
    let stats = reopened.stats().unwrap();
    assert_eq!(stats.node_count, 1);
    assert_eq!(stats.relationship_count, 0);
}

#[test]
fn test_auto_without_native_backends_uses_fallback() {
    let mut config = MemoryGraphConfig::in_memory().with_backend(BackendKind::Auto);
    config.neo4j = None;
    config.falkordb = None;
    let service = GraphService::open(&config).unwrap();
    assert_eq!(service.backend_name(), "sqlite");
}

#[test]
fn test_neo4j_when_configured() {
    let Ok(uri) = std::env::var("MEMORYGRAPH_TEST_NEO4J_URI") else {
        eprintln!("MEMORYGRAPH_TEST_NEO4J_URI not set, skipping");
        return;
    };
    let settings = Neo4jSettings {
        uri,
        user: std::env::var("MEMORYGRAPH_TEST_NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
        password: std::env::var("MEMORYGRAPH_TEST_NEO4J_PASSWORD")
            .unwrap_or_default()
            .into(),
        ..Neo4jSettings::default()
    };
    let config = MemoryGraphConfig::new()
        .with_backend(BackendKind::Neo4j)
        .with_neo4j(settings);
    let service = GraphService::open(&config).unwrap();
    assert_eq!(service.backend_name(), "neo4j");
    run_suite(&service);
}

#[cfg(feature = "falkordb")]
#[test]
fn test_falkordb_when_configured() {
    use memorygraph::config::FalkorDbSettings;

    let Ok(url) = std::env::var("MEMORYGRAPH_TEST_FALKORDB_URL") else {
        eprintln!("MEMORYGRAPH_TEST_FALKORDB_URL not set, skipping");
        return;
    };
    let config = MemoryGraphConfig::new()
        .with_backend(BackendKind::FalkorDb)
        .with_falkordb(FalkorDbSettings {
            url,
            graph: format!("memorygraph_test_{}", uuid::Uuid::new_v4().simple()),
        });
    let service = GraphService::open(&config).unwrap();
    assert_eq!(service.backend_name(), "falkordb");
    run_suite(&service);
}
