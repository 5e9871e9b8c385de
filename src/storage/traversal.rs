//! Breadth-first traversal kernel shared by every driver.
//!
//! Drivers only supply level expansion (the edges incident to a frontier);
//! settling, filtering, and ordering happen here, so traversal output is the
//! same for every backend.

use crate::Result;
use crate::models::{EdgeRecord, NodeRecord, TraversalQuery, TraversalStep};
use std::collections::{BTreeSet, HashSet};

/// An edge incident to a frontier node, with the node on its far side.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Frontier node the edge was reached from.
    pub via: String,
    /// The incident edge.
    pub edge: EdgeRecord,
    /// The far endpoint.
    pub node: NodeRecord,
}

/// Runs a depth-bounded breadth-first traversal.
///
/// `expand` receives the current frontier (sorted ids) and returns every edge
/// incident to it in the query's direction. Type and strength filtering is
/// applied here, so `expand` may over-approximate.
pub fn breadth_first<F>(start_id: &str, query: &TraversalQuery, mut expand: F) -> Result<Vec<TraversalStep>>
where
    F: FnMut(&[String]) -> Result<Vec<Expansion>>,
{
    let mut settled: HashSet<String> = HashSet::from([start_id.to_string()]);
    let mut frontier = vec![start_id.to_string()];
    let mut steps = Vec::new();

    for depth in 1..=query.max_depth {
        if frontier.is_empty() {
            break;
        }

        let mut seen_edges = HashSet::new();
        let mut next = BTreeSet::new();
        let mut level: Vec<TraversalStep> = expand(frontier.as_slice())?
            .into_iter()
            .filter(|e| query.admits(&e.edge) && !settled.contains(&e.node.id))
            .filter(|e| seen_edges.insert(e.edge.id.clone()))
            .map(|e| {
                next.insert(e.node.id.clone());
                TraversalStep {
                    node: e.node,
                    edge: e.edge,
                    via: e.via,
                    depth,
                }
            })
            .collect();
        level.sort_by(|a, b| a.edge.id.cmp(&b.edge.id));
        steps.extend(level);

        settled.extend(next.iter().cloned());
        frontier = next.into_iter().collect();
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Properties};
    use serde_json::json;
    use std::collections::HashMap;

    fn node(id: &str) -> NodeRecord {
        NodeRecord {
            id: id.to_string(),
            label: "Memory".to_string(),
            properties: Properties::new(),
        }
    }

    fn edge(id: &str, from: &str, to: &str, strength: f64) -> EdgeRecord {
        let mut properties = Properties::new();
        properties.insert("strength".to_string(), json!(strength));
        EdgeRecord {
            id: id.to_string(),
            from_id: from.to_string(),
            to_id: to.to_string(),
            rel_type: "CAUSES".to_string(),
            properties,
        }
    }

    /// Directed adjacency expansion over a fixed edge list.
    fn expander(edges: Vec<EdgeRecord>) -> impl FnMut(&[String]) -> Result<Vec<Expansion>> {
        let mut outgoing: HashMap<String, Vec<EdgeRecord>> = HashMap::new();
        for e in edges {
            outgoing.entry(e.from_id.clone()).or_default().push(e);
        }
        move |frontier: &[String]| {
            Ok(frontier
                .iter()
                .flat_map(|id| outgoing.get(id).cloned().unwrap_or_default())
                .map(|e| Expansion {
                    via: e.from_id.clone(),
                    node: node(&e.to_id),
                    edge: e,
                })
                .collect())
        }
    }

    #[test]
    fn test_levels_and_ordering() {
        // a -> b -> d, a -> c -> d, d -> a (back edge)
        let edges = vec![
            edge("e1", "a", "b", 0.9),
            edge("e2", "a", "c", 0.5),
            edge("e3", "b", "d", 0.9),
            edge("e4", "c", "d", 0.9),
            edge("e5", "d", "a", 0.9),
        ];
        let steps = breadth_first("a", &TraversalQuery::new(3), expander(edges)).unwrap();
        let summary: Vec<(&str, &str, u32)> = steps
            .iter()
            .map(|s| (s.edge.id.as_str(), s.node.id.as_str(), s.depth))
            .collect();
        assert_eq!(
            summary,
            vec![("e1", "b", 1), ("e2", "c", 1), ("e3", "d", 2), ("e4", "d", 2)]
        );
    }

    #[test]
    fn test_depth_bound() {
        let edges = vec![edge("e1", "a", "b", 0.9), edge("e2", "b", "c", 0.9)];
        let steps = breadth_first("a", &TraversalQuery::new(1), expander(edges)).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].node.id, "b");
    }

    #[test]
    fn test_min_strength_prunes_reachability() {
        let edges = vec![edge("e1", "a", "b", 0.2), edge("e2", "b", "c", 0.9)];
        let query = TraversalQuery::new(3)
            .with_min_strength(0.5)
            .with_direction(Direction::Outgoing);
        let steps = breadth_first("a", &query, expander(edges)).unwrap();
        assert!(steps.is_empty());
    }
}
