//! Path-finding, neighborhood ranking, clustering, and bridge detection.
//!
//! Every query reads through the [`GraphDriver`] contract, so results are
//! identical across backends. Multi-hop strength is the product of edge
//! strengths; among fewest-hop routes the strongest wins, then the
//! lexicographically smallest sequence of edge ids.

// Graph sizes are node counts; f64 precision is ample for densities.
#![allow(clippy::cast_precision_loss)]

use crate::models::{
    BridgeNode, Cluster, Direction, EdgeFilter, EdgeRecord, MEMORY_LABEL, Memory, MemoryId,
    NodeFilter, PathResult, RelatedMemory, Relationship, RelationshipType, TraversalQuery,
    TraversalStep,
};
use crate::storage::GraphDriver;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;

/// Label propagation stops after this many rounds even if labels still move.
const MAX_PROPAGATION_ROUNDS: usize = 100;

/// Page size for whole-graph scans.
const SCAN_PAGE: usize = 1_000;

/// Read-only graph analytics.
pub struct GraphAnalytics {
    driver: Arc<dyn GraphDriver>,
}

/// Best route found so far to one node: indices into the traversal steps.
#[derive(Debug, Clone)]
struct Route {
    strength: f64,
    steps: Vec<usize>,
}

impl Route {
    /// True when `self` beats `other`: stronger, then smaller edge ids.
    fn beats(&self, other: &Self, steps: &[TraversalStep]) -> bool {
        match self.strength.total_cmp(&other.strength) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                let mine = self.steps.iter().map(|&i| steps[i].edge.id.as_str());
                let theirs = other.steps.iter().map(|&i| steps[i].edge.id.as_str());
                mine.cmp(theirs) == Ordering::Less
            },
        }
    }
}

/// Picks the best fewest-hop route to every node reached by a traversal.
///
/// `steps` must be in traversal order (depth, then edge id).
fn best_routes(start_id: &str, steps: &[TraversalStep]) -> HashMap<String, Route> {
    let mut routes: HashMap<String, Route> = HashMap::from([(
        start_id.to_string(),
        Route {
            strength: 1.0,
            steps: Vec::new(),
        },
    )]);
    for (i, step) in steps.iter().enumerate() {
        let Some(via) = routes.get(&step.via) else {
            continue;
        };
        let mut candidate = via.clone();
        candidate.strength *= step.edge.strength();
        candidate.steps.push(i);
        let replace = routes
            .get(&step.node.id)
            .is_none_or(|current| candidate.beats(current, steps));
        if replace {
            routes.insert(step.node.id.clone(), candidate);
        }
    }
    routes
}

fn type_names(rel_types: &[RelationshipType]) -> Option<Vec<String>> {
    (!rel_types.is_empty()).then(|| rel_types.iter().map(|t| t.as_str().to_string()).collect())
}

impl GraphAnalytics {
    /// Creates analytics over a connected driver.
    #[must_use]
    pub const fn new(driver: Arc<dyn GraphDriver>) -> Self {
        Self { driver }
    }

    fn require_memory(&self, id: &str) -> Result<()> {
        if self.driver.get_node(id)?.is_none() {
            return Err(Error::memory_not_found(id));
        }
        Ok(())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Finds the fewest-hop path over outgoing relationships.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when either memory is unknown. A missing
    /// path is not an error.
    pub fn find_path(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: u32,
        rel_types: &[RelationshipType],
    ) -> Result<PathResult> {
        self.find_path_directed(from_id, to_id, max_depth, rel_types, Direction::Outgoing)
    }

    /// Finds the fewest-hop path following relationships in `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when either memory is unknown.
    #[instrument(skip(self, rel_types))]
    pub fn find_path_directed(
        &self,
        from_id: &str,
        to_id: &str,
        max_depth: u32,
        rel_types: &[RelationshipType],
        direction: Direction,
    ) -> Result<PathResult> {
        self.require_memory(from_id)?;
        self.require_memory(to_id)?;
        metrics::counter!("analytics_queries_total", "query" => "find_path").increment(1);

        if from_id == to_id {
            return Ok(PathResult {
                found: true,
                memory_ids: vec![MemoryId::new(from_id)],
                relationships: Vec::new(),
                total_strength: 1.0,
            });
        }

        let query = TraversalQuery {
            max_depth,
            rel_types: type_names(rel_types),
            direction,
            min_strength: None,
        };
        let steps = self.driver.traverse(from_id, &query)?;
        let routes = best_routes(from_id, &steps);
        let Some(route) = routes.get(to_id) else {
            return Ok(PathResult::not_found());
        };

        let mut memory_ids = vec![MemoryId::new(from_id)];
        let mut relationships = Vec::with_capacity(route.steps.len());
        for &i in &route.steps {
            memory_ids.push(MemoryId::new(steps[i].node.id.clone()));
            relationships.push(Relationship::from_edge(&steps[i].edge)?);
        }
        Ok(PathResult {
            found: true,
            memory_ids,
            relationships,
            total_strength: route.strength,
        })
    }

    // ========================================================================
    // Neighborhood
    // ========================================================================

    /// Returns memories within `depth` hops in either direction, ranked by
    /// path strength, then importance, then recency, then id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown memory.
    #[instrument(skip(self, rel_types))]
    pub fn get_related(
        &self,
        memory_id: &str,
        rel_types: &[RelationshipType],
        depth: u32,
        min_strength: Option<f64>,
    ) -> Result<Vec<RelatedMemory>> {
        self.require_memory(memory_id)?;
        metrics::counter!("analytics_queries_total", "query" => "get_related").increment(1);

        let query = TraversalQuery {
            max_depth: depth,
            rel_types: type_names(rel_types),
            direction: Direction::Both,
            min_strength,
        };
        let steps = self.driver.traverse(memory_id, &query)?;
        let routes = best_routes(memory_id, &steps);

        let mut related = Vec::with_capacity(routes.len().saturating_sub(1));
        for (node_id, route) in &routes {
            let Some(&last) = route.steps.last() else {
                continue;
            };
            let step = &steps[last];
            if step.node.label != MEMORY_LABEL {
                tracing::debug!(node = %node_id, label = %step.node.label, "Skipping non-memory node");
                continue;
            }
            let via_type = RelationshipType::parse(&step.edge.rel_type).ok_or_else(|| {
                Error::UnknownType(format!("relationship type '{}'", step.edge.rel_type))
            })?;
            related.push(RelatedMemory {
                memory: Memory::from_node(&step.node)?,
                depth: step.depth,
                path_strength: route.strength,
                via_type,
                via_relationship: step.edge.id.clone(),
            });
        }

        related.sort_by(|a, b| {
            b.path_strength
                .total_cmp(&a.path_strength)
                .then_with(|| b.memory.importance.total_cmp(&a.memory.importance))
                .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        Ok(related)
    }

    // ========================================================================
    // Structure
    // ========================================================================

    fn load_graph(&self) -> Result<UndirectedGraph> {
        let nodes = self
            .driver
            .search_nodes(MEMORY_LABEL, &NodeFilter::new())?;
        let mut edges = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut filter = EdgeFilter::all().with_limit(SCAN_PAGE);
            if let Some(cursor) = &cursor {
                filter = filter.after(cursor.clone());
            }
            let page = self.driver.query_relationships(&filter)?;
            let full_page = page.len() == SCAN_PAGE;
            cursor = page.last().map(|edge| edge.id.clone());
            edges.extend(page);
            if !full_page {
                break;
            }
        }
        Ok(UndirectedGraph::build(
            nodes.into_iter().map(|node| node.id),
            &edges,
        ))
    }

    /// Detects clusters of densely connected memories.
    ///
    /// Clusters smaller than `min_size` or sparser than `min_density` are
    /// dropped. Cluster ids are assigned before filtering, largest first.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    #[instrument(skip(self))]
    pub fn find_clusters(&self, min_size: usize, min_density: f64) -> Result<Vec<Cluster>> {
        metrics::counter!("analytics_queries_total", "query" => "find_clusters").increment(1);
        let graph = self.load_graph()?;
        let clusters = graph
            .communities()
            .iter()
            .enumerate()
            .map(|(i, members)| graph.describe(i, members))
            .filter(|c| c.members.len() >= min_size && c.cohesion >= min_density)
            .collect();
        Ok(clusters)
    }

    /// Finds articulation points of the undirected memory graph.
    ///
    /// Ordered by the number of components separated (most first), then id.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    #[instrument(skip(self))]
    pub fn find_bridges(&self) -> Result<Vec<BridgeNode>> {
        metrics::counter!("analytics_queries_total", "query" => "find_bridges").increment(1);
        let graph = self.load_graph()?;

        let mut cluster_of = vec![0usize; graph.len()];
        for (i, members) in graph.communities().iter().enumerate() {
            for &member in members {
                cluster_of[member] = i;
            }
        }

        let mut bridges: Vec<BridgeNode> = graph
            .articulation_points()
            .into_iter()
            .map(|(node, components_separated)| {
                let mut connected: Vec<usize> = graph.neighbors[node]
                    .keys()
                    .map(|&n| cluster_of[n])
                    .collect();
                connected.sort_unstable();
                connected.dedup();
                BridgeNode {
                    memory_id: MemoryId::new(graph.ids[node].clone()),
                    components_separated,
                    connected_clusters: connected.into_iter().map(cluster_id).collect(),
                    degree: graph.neighbors[node].len(),
                }
            })
            .collect();
        bridges.sort_by(|a, b| {
            b.components_separated
                .cmp(&a.components_separated)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        Ok(bridges)
    }
}

fn cluster_id(index: usize) -> String {
    format!("cluster-{index}")
}

// ============================================================================
// Undirected projection
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    strength_sum: f64,
    edges: usize,
}

/// Undirected simple-graph projection of the memory graph.
///
/// Node indices follow id order; parallel and reverse edges merge into one
/// link; self-loops are ignored.
struct UndirectedGraph {
    ids: Vec<String>,
    neighbors: Vec<BTreeMap<usize, Link>>,
}

impl UndirectedGraph {
    fn build(node_ids: impl IntoIterator<Item = String>, edges: &[EdgeRecord]) -> Self {
        let mut ids: Vec<String> = node_ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut neighbors = vec![BTreeMap::new(); ids.len()];
        for edge in edges {
            let (Some(&a), Some(&b)) = (index.get(edge.from_id.as_str()), index.get(edge.to_id.as_str()))
            else {
                continue;
            };
            if a == b {
                continue;
            }
            for (x, y) in [(a, b), (b, a)] {
                let link: &mut Link = neighbors[x].entry(y).or_default();
                link.strength_sum += edge.strength();
                link.edges += 1;
            }
        }
        Self { ids, neighbors }
    }

    const fn len(&self) -> usize {
        self.ids.len()
    }

    /// Deterministic weighted label propagation.
    ///
    /// Nodes update in id order, adopting the label with the greatest total
    /// link strength among their neighbors; ties keep the current label if it
    /// is among the best, else take the smallest. Returns communities ordered
    /// by size (largest first), then smallest member.
    fn communities(&self) -> Vec<Vec<usize>> {
        let mut labels: Vec<usize> = (0..self.len()).collect();
        for _ in 0..MAX_PROPAGATION_ROUNDS {
            let mut changed = false;
            for node in 0..self.len() {
                if self.neighbors[node].is_empty() {
                    continue;
                }
                let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
                for (&neighbor, link) in &self.neighbors[node] {
                    *weights.entry(labels[neighbor]).or_default() += link.strength_sum;
                }
                let best = weights.values().copied().fold(f64::NEG_INFINITY, f64::max);
                let current = labels[node];
                if weights.get(&current).is_some_and(|w| *w >= best) {
                    continue;
                }
                if let Some((&label, _)) = weights.iter().find(|&(_, w)| *w >= best) {
                    labels[node] = label;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (node, label) in labels.into_iter().enumerate() {
            groups.entry(label).or_default().push(node);
        }
        let mut communities: Vec<Vec<usize>> = groups.into_values().collect();
        communities.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        communities
    }

    fn describe(&self, index: usize, members: &[usize]) -> Cluster {
        let mut internal_links = 0usize;
        let mut internal_edges = 0usize;
        let mut strength_sum = 0.0;
        let mut representative = members[0];
        let mut best_degree = 0usize;

        for &member in members {
            let mut degree = 0usize;
            for (neighbor, link) in &self.neighbors[member] {
                if members.binary_search(neighbor).is_err() {
                    continue;
                }
                degree += 1;
                if member < *neighbor {
                    internal_links += 1;
                    internal_edges += link.edges;
                    strength_sum += link.strength_sum;
                }
            }
            if degree > best_degree {
                best_degree = degree;
                representative = member;
            }
        }

        let n = members.len();
        let possible = n * n.saturating_sub(1) / 2;
        Cluster {
            id: cluster_id(index),
            members: members.iter().map(|&m| MemoryId::new(self.ids[m].clone())).collect(),
            representative: MemoryId::new(self.ids[representative].clone()),
            cohesion: if possible == 0 {
                0.0
            } else {
                internal_links as f64 / possible as f64
            },
            average_strength: if internal_edges == 0 {
                0.0
            } else {
                strength_sum / internal_edges as f64
            },
            internal_edges: internal_links,
        }
    }

    /// Articulation points with the number of components their removal
    /// leaves among their neighbors (iterative Tarjan).
    fn articulation_points(&self) -> Vec<(usize, usize)> {
        const UNVISITED: usize = usize::MAX;
        let n = self.len();
        let adjacency: Vec<Vec<usize>> = self
            .neighbors
            .iter()
            .map(|links| links.keys().copied().collect())
            .collect();
        let mut discovered = vec![UNVISITED; n];
        let mut low = vec![0usize; n];
        let mut separated = vec![0usize; n];
        let mut is_root = vec![false; n];
        let mut timer = 0usize;

        for root in 0..n {
            if discovered[root] != UNVISITED {
                continue;
            }
            is_root[root] = true;
            discovered[root] = timer;
            low[root] = timer;
            timer += 1;
            let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];

            while let Some(&(node, parent, next)) = stack.last() {
                if let Some(&neighbor) = adjacency[node].get(next) {
                    if let Some(top) = stack.last_mut() {
                        top.2 += 1;
                    }
                    if discovered[neighbor] == UNVISITED {
                        discovered[neighbor] = timer;
                        low[neighbor] = timer;
                        timer += 1;
                        stack.push((neighbor, Some(node), 0));
                    } else if Some(neighbor) != parent {
                        low[node] = low[node].min(discovered[neighbor]);
                    }
                } else {
                    stack.pop();
                    if let Some(parent) = parent {
                        low[parent] = low[parent].min(low[node]);
                        if low[node] >= discovered[parent] {
                            separated[parent] += 1;
                        }
                    }
                }
            }
        }

        (0..n)
            .filter_map(|node| {
                let components = if is_root[node] {
                    separated[node]
                } else {
                    separated[node] + 1
                };
                let cut = if is_root[node] {
                    separated[node] >= 2
                } else {
                    separated[node] >= 1
                };
                cut.then_some((node, components))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::models::Properties;
    use serde_json::json;

    fn edge(id: &str, from: &str, to: &str, strength: f64) -> EdgeRecord {
        let mut properties = Properties::new();
        properties.insert("strength".to_string(), json!(strength));
        EdgeRecord {
            id: id.to_string(),
            from_id: from.to_string(),
            to_id: to.to_string(),
            rel_type: "RELATED_TO".to_string(),
            properties,
        }
    }

    fn graph(ids: &[&str], edges: &[EdgeRecord]) -> UndirectedGraph {
        UndirectedGraph::build(ids.iter().map(ToString::to_string), edges)
    }

    #[test]
    fn test_two_triangles_joined_by_a_bridge() {
        // a-b-c triangle, d-e-f triangle, c-d bridge link.
        let g = graph(
            &["a", "b", "c", "d", "e", "f"],
            &[
                edge("e1", "a", "b", 0.9),
                edge("e2", "b", "c", 0.9),
                edge("e3", "c", "a", 0.9),
                edge("e4", "d", "e", 0.9),
                edge("e5", "e", "f", 0.9),
                edge("e6", "f", "d", 0.9),
                edge("e7", "c", "d", 0.2),
            ],
        );
        let communities = g.communities();
        assert_eq!(communities, vec![vec![0, 1, 2], vec![3, 4, 5]]);

        let cluster = g.describe(0, &communities[0]);
        assert_eq!(cluster.cohesion, 1.0);
        assert_eq!(cluster.internal_edges, 3);
        assert_eq!(cluster.representative, MemoryId::new("a"));
        assert!((cluster.average_strength - 0.9).abs() < 1e-9);

        let points = g.articulation_points();
        assert_eq!(points, vec![(2, 2), (3, 2)]);
    }

    #[test]
    fn test_star_center_separates_every_leaf() {
        let g = graph(
            &["hub", "x", "y", "z"],
            &[
                edge("e1", "hub", "x", 0.5),
                edge("e2", "y", "hub", 0.5),
                edge("e3", "hub", "z", 0.5),
            ],
        );
        assert_eq!(g.articulation_points(), vec![(0, 3)]);
    }

    #[test]
    fn test_cycle_has_no_articulation_points() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[
                edge("e1", "a", "b", 0.5),
                edge("e2", "b", "c", 0.5),
                edge("e3", "c", "d", 0.5),
                edge("e4", "d", "a", 0.5),
                edge("e5", "a", "a", 0.5),
            ],
        );
        assert!(g.articulation_points().is_empty());
        assert!(g.neighbors[0].get(&0).is_none());
    }

    #[test]
    fn test_isolated_nodes_form_singletons() {
        let g = graph(&["a", "b"], &[]);
        let communities = g.communities();
        assert_eq!(communities, vec![vec![0], vec![1]]);
        assert_eq!(g.describe(0, &communities[0]).cohesion, 0.0);
    }
}
