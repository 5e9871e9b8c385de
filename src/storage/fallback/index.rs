//! In-memory directed graph index.
//!
//! A cache of the durable store: nodes and edges keyed by id plus outgoing
//! and incoming adjacency sets. It is rebuilt from `SQLite` on connect and is
//! always safe to discard.

use crate::models::{Direction, EdgeFilter, EdgeRecord, GraphStats, NodeRecord};
use crate::storage::traversal::Expansion;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Adjacency index over nodes and edges.
#[derive(Debug, Default)]
pub struct GraphIndex {
    nodes: HashMap<String, NodeRecord>,
    edges: BTreeMap<String, EdgeRecord>,
    outgoing: HashMap<String, BTreeSet<String>>,
    incoming: HashMap<String, BTreeSet<String>>,
}

impl GraphIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from stored records.
    ///
    /// Edges whose endpoints are missing are skipped.
    #[must_use]
    pub fn from_records(nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>) -> Self {
        let mut index = Self::new();
        for node in nodes {
            index.upsert_node(node);
        }
        for edge in edges {
            index.insert_edge(edge);
        }
        index
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the node is indexed.
    #[must_use]
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Looks up an edge.
    #[must_use]
    pub fn edge(&self, id: &str) -> Option<&EdgeRecord> {
        self.edges.get(id)
    }

    /// Inserts or replaces a node.
    pub fn upsert_node(&mut self, node: NodeRecord) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Removes a node and its incident edges, returning the removed edge ids.
    pub fn remove_node(&mut self, id: &str) -> Vec<String> {
        if self.nodes.remove(id).is_none() {
            return Vec::new();
        }
        let incident: BTreeSet<String> = self
            .outgoing
            .remove(id)
            .unwrap_or_default()
            .into_iter()
            .chain(self.incoming.remove(id).unwrap_or_default())
            .collect();
        for edge_id in &incident {
            self.remove_edge(edge_id);
        }
        incident.into_iter().collect()
    }

    /// Inserts or replaces an edge. Returns false if an endpoint is missing.
    pub fn insert_edge(&mut self, edge: EdgeRecord) -> bool {
        if !self.contains_node(&edge.from_id) || !self.contains_node(&edge.to_id) {
            return false;
        }
        self.outgoing
            .entry(edge.from_id.clone())
            .or_default()
            .insert(edge.id.clone());
        self.incoming
            .entry(edge.to_id.clone())
            .or_default()
            .insert(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
        true
    }

    /// Removes an edge.
    pub fn remove_edge(&mut self, id: &str) -> Option<EdgeRecord> {
        let edge = self.edges.remove(id)?;
        if let Some(set) = self.outgoing.get_mut(&edge.from_id) {
            set.remove(id);
        }
        if let Some(set) = self.incoming.get_mut(&edge.to_id) {
            set.remove(id);
        }
        Some(edge)
    }

    /// Lists edges matching the filter, ordered by id.
    #[must_use]
    pub fn query(&self, filter: &EdgeFilter) -> Vec<EdgeRecord> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let candidates: Box<dyn Iterator<Item = &EdgeRecord> + '_> =
            match (&filter.from_id, &filter.to_id) {
                (Some(from), _) => Box::new(self.adjacent(&self.outgoing, from)),
                (None, Some(to)) => Box::new(self.adjacent(&self.incoming, to)),
                (None, None) => Box::new(self.edges.values()),
            };
        candidates
            .filter(|edge| filter.matches(edge))
            .take(limit)
            .cloned()
            .collect()
    }

    fn adjacent<'a>(
        &'a self,
        adjacency: &'a HashMap<String, BTreeSet<String>>,
        node_id: &str,
    ) -> impl Iterator<Item = &'a EdgeRecord> + use<'a> {
        adjacency
            .get(node_id)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.edges.get(edge_id))
    }

    /// Edges incident to the frontier in `direction`, with their far endpoints.
    #[must_use]
    pub fn expand(&self, frontier: &[String], direction: Direction) -> Vec<Expansion> {
        let mut expansions = Vec::new();
        for via in frontier {
            if matches!(direction, Direction::Outgoing | Direction::Both) {
                for edge in self.adjacent(&self.outgoing, via) {
                    self.push_expansion(&mut expansions, via, edge, &edge.to_id);
                }
            }
            if matches!(direction, Direction::Incoming | Direction::Both) {
                for edge in self.adjacent(&self.incoming, via) {
                    self.push_expansion(&mut expansions, via, edge, &edge.from_id);
                }
            }
        }
        expansions
    }

    fn push_expansion(&self, out: &mut Vec<Expansion>, via: &str, edge: &EdgeRecord, far: &str) {
        if let Some(node) = self.nodes.get(far) {
            out.push(Expansion {
                via: via.to_string(),
                edge: edge.clone(),
                node: node.clone(),
            });
        }
    }

    /// Depth-first reachability over outgoing edges of the given types.
    #[must_use]
    pub fn reachable(&self, from: &str, to: &str, rel_types: Option<&[String]>) -> bool {
        if from == to {
            return true;
        }
        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            for edge in self.adjacent(&self.outgoing, current) {
                if rel_types.is_some_and(|types| !types.iter().any(|t| *t == edge.rel_type)) {
                    continue;
                }
                if edge.to_id == to {
                    return true;
                }
                if visited.insert(edge.to_id.as_str()) {
                    stack.push(edge.to_id.as_str());
                }
            }
        }
        false
    }

    /// Aggregate counts.
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len() as u64,
            relationship_count: self.edges.len() as u64,
            ..GraphStats::default()
        };
        for node in self.nodes.values() {
            *stats.nodes_by_label.entry(node.label.clone()).or_default() += 1;
        }
        for edge in self.edges.values() {
            *stats
                .relationships_by_type
                .entry(edge.rel_type.clone())
                .or_default() += 1;
        }
        stats
    }
}
