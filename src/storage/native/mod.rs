//! Native graph drivers speaking Cypher.
//!
//! [`CypherDriver`] translates the driver contract into Cypher for one
//! [`CypherDialect`] and runs it through a [`CypherTransport`]:
//!
//! | Transport | Wire | Feature |
//! |-----------|------|---------|
//! | [`Neo4jHttpTransport`] | HTTP `POST /db/{db}/tx/commit` | always |
//! | `FalkorDbTransport` | Redis `GRAPH.QUERY` | `falkordb` |
//!
//! # Storage layout
//!
//! Every node carries the shared `:Node` label plus its own label. Primitive
//! properties are written as real properties so indexes and full-text search
//! see them; the complete canonical map is kept in `_json` and is what reads
//! return, so nested values round-trip exactly on every transport.
//!
//! Labels, relationship types, and property keys are validated identifiers
//! before they reach a statement. Values always travel as parameters.

mod dialect;
#[cfg(feature = "falkordb")]
mod falkordb;
mod neo4j;

pub use dialect::{
    CypherDialect, NODE_LABEL, SchemaKind, SchemaOutcome, SchemaStatement,
    classify_schema_failure,
};
#[cfg(feature = "falkordb")]
pub use falkordb::FalkorDbTransport;
pub use neo4j::Neo4jHttpTransport;

use crate::models::graph::ID_KEY;
use crate::models::{
    Direction, EdgeFilter, EdgeRecord, GraphStats, HealthStatus, NodeFilter, NodeRecord,
    Properties, TEXT_FIELDS, TraversalQuery, TraversalStep, merge_properties, resolve_id,
    validate_identifier,
};
use crate::storage::metrics::timed;
use crate::storage::resilience::RetryPolicy;
use crate::storage::traits::GraphDriver;
use crate::storage::traversal::{Expansion, breadth_first};
use crate::{Error, Result};
use dialect::{is_missing_procedure, quote};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::instrument;

/// Property holding the canonical JSON encoding of a record.
pub const JSON_KEY: &str = "_json";

/// One result row, columns in `RETURN` order.
pub type CypherRow = Vec<Value>;

/// Executes Cypher statements against a graph database.
///
/// Each call is its own transaction.
pub trait CypherTransport: Send + Sync {
    /// The dialect this transport speaks.
    fn dialect(&self) -> CypherDialect;

    /// Runs one statement with parameters.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] or [`Error::Timeout`] for transport failures,
    /// [`Error::Duplicate`] for constraint violations, and
    /// [`Error::OperationFailed`] for anything the server rejects.
    fn run(&self, statement: &str, params: &Properties) -> Result<Vec<CypherRow>>;

    /// Checks the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns the transport error.
    fn ping(&self) -> Result<()> {
        self.run("RETURN 1", &Properties::new()).map(|_| ())
    }

    /// Releases pooled connections.
    ///
    /// # Errors
    ///
    /// Returns the transport error.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Neo4j driver.
pub type Neo4jDriver = CypherDriver<Neo4jHttpTransport>;

/// `FalkorDB` driver.
#[cfg(feature = "falkordb")]
pub type FalkorDbDriver = CypherDriver<FalkorDbTransport>;

/// [`GraphDriver`] over a Cypher transport.
pub struct CypherDriver<T: CypherTransport> {
    transport: T,
    retry: RetryPolicy,
    connected: AtomicBool,
    fulltext: AtomicBool,
}

impl<T: CypherTransport> CypherDriver<T> {
    /// Creates a driver. Nothing is sent until [`GraphDriver::connect`].
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            connected: AtomicBool::new(false),
            fulltext: AtomicBool::new(true),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns false once full-text search has degraded to substring matching.
    #[must_use]
    pub fn fulltext_available(&self) -> bool {
        self.fulltext.load(Ordering::Acquire)
    }

    fn dialect(&self) -> CypherDialect {
        self.transport.dialect()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Connection {
                backend: self.backend_name().to_string(),
                cause: "driver is not connected".to_string(),
            })
        }
    }

    fn run(
        &self,
        operation: &'static str,
        statement: &str,
        params: &Properties,
    ) -> Result<Vec<CypherRow>> {
        let backend = self.backend_name();
        tracing::trace!(backend, operation, statement, "Running Cypher");
        timed(backend, operation, || {
            self.retry
                .run(backend, operation, || self.transport.run(statement, params))
        })
    }

    // ========================================================================
    // Schema
    // ========================================================================

    fn ensure_schema(&self) -> Result<()> {
        let backend = self.backend_name();
        for statement in self.dialect().schema() {
            let result = self.retry.run(backend, "schema", || {
                self.transport.run(&statement.cypher, &Properties::new())
            });
            match result {
                Ok(_) => {},
                Err(err) if err.is_retryable() => return Err(err),
                Err(err) => self.schema_failure(&statement, &err.to_string())?,
            }
        }
        Ok(())
    }

    fn schema_failure(&self, statement: &SchemaStatement, message: &str) -> Result<()> {
        let backend = self.backend_name();
        match classify_schema_failure(message) {
            SchemaOutcome::AlreadyExists => {
                tracing::debug!(backend, statement = %statement.name, "Schema object already exists");
                Ok(())
            },
            SchemaOutcome::Unsupported if statement.kind != SchemaKind::Required => {
                if let Some(fallback) = &statement.fallback {
                    match self.transport.run(fallback, &Properties::new()) {
                        Ok(_) => return Ok(()),
                        Err(err) => match classify_schema_failure(&err.to_string()) {
                            SchemaOutcome::AlreadyExists => return Ok(()),
                            SchemaOutcome::Unsupported => {},
                            SchemaOutcome::Fatal => return Err(schema_error(backend, statement, &err.to_string())),
                        },
                    }
                }
                tracing::warn!(
                    backend,
                    statement = %statement.name,
                    cause = message,
                    "Schema feature not supported by server, skipping"
                );
                if statement.kind == SchemaKind::FullText {
                    self.fulltext.store(false, Ordering::Release);
                }
                Ok(())
            },
            _ => Err(schema_error(backend, statement, message)),
        }
    }

    // ========================================================================
    // Row decoding
    // ========================================================================

    fn fetch_nodes(
        &self,
        operation: &'static str,
        statement: &str,
        params: &Properties,
    ) -> Result<Vec<NodeRecord>> {
        self.run(operation, statement, params)?
            .iter()
            .map(|row| decode_node(row))
            .collect()
    }

    fn fetch_edges(
        &self,
        operation: &'static str,
        statement: &str,
        params: &Properties,
    ) -> Result<Vec<EdgeRecord>> {
        self.run(operation, statement, params)?
            .iter()
            .map(|row| decode_edge(row))
            .collect()
    }

    fn scan_label(&self, label: &str) -> Result<Vec<NodeRecord>> {
        self.fetch_nodes(
            "search_nodes",
            &format!(
                "MATCH (n:{NODE_LABEL}:{}) RETURN n.id, labels(n), n.{JSON_KEY} ORDER BY n.id",
                quote(label)
            ),
            &Properties::new(),
        )
    }

    /// Full-text hits ordered by score, or `None` when full text is unavailable.
    fn search_fulltext(&self, label: &str, terms: &[String]) -> Result<Option<Vec<NodeRecord>>> {
        if !self.fulltext_available() {
            return Ok(None);
        }
        let statement = format!(
            "{} WITH node, score WHERE node:{} \
             RETURN node.id, labels(node), node.{JSON_KEY} ORDER BY score DESC, node.id",
            self.dialect().fulltext_call(),
            quote(label)
        );
        let params = params([("query", json!(self.dialect().fulltext_query(terms)))]);
        match self.fetch_nodes("search_nodes", &statement, &params) {
            Ok(nodes) => Ok(Some(nodes)),
            Err(err) if !err.is_retryable() && is_missing_procedure(&err.to_string()) => {
                tracing::warn!(
                    backend = self.backend_name(),
                    error = %err,
                    "Full-text procedure unavailable, using substring matching"
                );
                self.fulltext.store(false, Ordering::Release);
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    fn expand(&self, frontier: &[String], query: &TraversalQuery) -> Result<Vec<Expansion>> {
        match query.direction {
            Direction::Both => {
                let mut expansions = self.expand_one_way(frontier, query, Direction::Outgoing)?;
                expansions.extend(self.expand_one_way(frontier, query, Direction::Incoming)?);
                Ok(expansions)
            },
            direction => self.expand_one_way(frontier, query, direction),
        }
    }

    fn expand_one_way(
        &self,
        frontier: &[String],
        query: &TraversalQuery,
        direction: Direction,
    ) -> Result<Vec<Expansion>> {
        let pattern = if direction == Direction::Incoming {
            format!("(a:{NODE_LABEL})<-[r]-(b:{NODE_LABEL})")
        } else {
            format!("(a:{NODE_LABEL})-[r]->(b:{NODE_LABEL})")
        };
        let mut params = params([("frontier", json!(frontier))]);
        let type_clause = match &query.rel_types {
            Some(types) => {
                params.insert("types".to_string(), json!(types));
                " AND type(r) IN $types"
            },
            None => "",
        };
        let statement = format!(
            "MATCH {pattern} WHERE a.id IN $frontier{type_clause} \
             RETURN a.id, r.id, type(r), r.{JSON_KEY}, b.id, labels(b), b.{JSON_KEY}"
        );
        self.run("traverse", &statement, &params)?
            .iter()
            .map(|row| decode_expansion(row, direction))
            .collect()
    }

    /// Explains why a relationship insert matched nothing.
    fn diagnose_failed_insert(
        &self,
        id: &str,
        id_supplied: bool,
        from_id: &str,
        to_id: &str,
    ) -> Error {
        if id_supplied && matches!(self.get_relationship(id), Ok(Some(_))) {
            return Error::Duplicate(format!("relationship '{id}' already exists"));
        }
        for endpoint in [from_id, to_id] {
            if matches!(self.get_node(endpoint), Ok(None)) {
                return Error::NotFound {
                    kind: "node",
                    id: endpoint.to_string(),
                };
            }
        }
        Error::OperationFailed {
            operation: "store_relationship".to_string(),
            cause: "insert matched no rows".to_string(),
        }
    }
}

fn schema_error(backend: &str, statement: &SchemaStatement, message: &str) -> Error {
    Error::Schema {
        backend: backend.to_string(),
        cause: format!("{}: {message}", statement.name),
    }
}

fn params<const N: usize>(entries: [(&str, Value); N]) -> Properties {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn encode_json(properties: &Properties) -> Result<Value> {
    serde_json::to_string(properties)
        .map(Value::String)
        .map_err(|e| Error::OperationFailed {
            operation: "encode_properties".to_string(),
            cause: e.to_string(),
        })
}

/// Values that can be stored as a native property.
fn is_primitive(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
        Value::Array(items) => {
            !items.is_empty()
                && (items.iter().all(Value::is_string)
                    || items.iter().all(Value::is_number)
                    || items.iter().all(Value::is_boolean))
        },
        _ => false,
    }
}

/// Builds `, var.key = $pN` assignments for the primitive entries.
///
/// With `clear_others`, keys whose value is null or nested are set to null so
/// no stale native copy survives an update.
fn property_assignments(
    var: &str,
    properties: &Properties,
    clear_others: bool,
    params: &mut Properties,
) -> String {
    let mut clause = String::new();
    for (key, value) in properties {
        if key == ID_KEY || key == JSON_KEY || validate_identifier("property", key).is_err() {
            continue;
        }
        if is_primitive(value) {
            let name = format!("p{}", params.len());
            clause.push_str(&format!(", {var}.{} = ${name}", quote(key)));
            params.insert(name, value.clone());
        } else if clear_others {
            clause.push_str(&format!(", {var}.{} = null", quote(key)));
        }
    }
    clause
}

fn column(row: &[Value], index: usize) -> Result<&Value> {
    row.get(index).ok_or_else(|| Error::OperationFailed {
        operation: "decode_row".to_string(),
        cause: format!("missing column {index}"),
    })
}

fn string_column(row: &[Value], index: usize) -> Result<String> {
    column(row, index)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::OperationFailed {
            operation: "decode_row".to_string(),
            cause: format!("column {index} is not a string"),
        })
}

fn json_column(row: &[Value], index: usize) -> Result<Properties> {
    serde_json::from_str(&string_column(row, index)?).map_err(|e| Error::OperationFailed {
        operation: "decode_row".to_string(),
        cause: e.to_string(),
    })
}

fn label_column(row: &[Value], index: usize) -> Result<String> {
    let labels = column(row, index)?;
    Ok(labels
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|label| *label != NODE_LABEL)
        .unwrap_or(NODE_LABEL)
        .to_string())
}

/// `[id, labels, _json]`
fn decode_node(row: &[Value]) -> Result<NodeRecord> {
    Ok(NodeRecord {
        id: string_column(row, 0)?,
        label: label_column(row, 1)?,
        properties: json_column(row, 2)?,
    })
}

/// `[id, from_id, to_id, type, _json]`
fn decode_edge(row: &[Value]) -> Result<EdgeRecord> {
    Ok(EdgeRecord {
        id: string_column(row, 0)?,
        from_id: string_column(row, 1)?,
        to_id: string_column(row, 2)?,
        rel_type: string_column(row, 3)?,
        properties: json_column(row, 4)?,
    })
}

/// `[via, r.id, type, r._json, b.id, labels(b), b._json]`
fn decode_expansion(row: &[Value], direction: Direction) -> Result<Expansion> {
    let via = string_column(row, 0)?;
    let far = string_column(row, 4)?;
    let (from_id, to_id) = if direction == Direction::Incoming {
        (far.clone(), via.clone())
    } else {
        (via.clone(), far.clone())
    };
    Ok(Expansion {
        via,
        edge: EdgeRecord {
            id: string_column(row, 1)?,
            from_id,
            to_id,
            rel_type: string_column(row, 2)?,
            properties: json_column(row, 3)?,
        },
        node: NodeRecord {
            id: far,
            label: label_column(row, 5)?,
            properties: json_column(row, 6)?,
        },
    })
}

/// Number of query terms found in the text fields (substring, case-insensitive).
fn substring_score(properties: &Properties, terms: &[String]) -> usize {
    let haystacks: Vec<String> = TEXT_FIELDS
        .iter()
        .filter_map(|field| properties.get(*field).and_then(Value::as_str))
        .map(str::to_lowercase)
        .collect();
    terms
        .iter()
        .filter(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
        .count()
}

fn count_column(row: &[Value], index: usize) -> u64 {
    row.get(index).and_then(Value::as_u64).unwrap_or(0)
}

impl<T: CypherTransport> GraphDriver for CypherDriver<T> {
    fn backend_name(&self) -> &'static str {
        self.dialect().name()
    }

    #[instrument(skip(self), fields(backend = self.backend_name()))]
    fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.retry
            .run(self.backend_name(), "connect", || self.transport.ping())?;
        self.fulltext.store(true, Ordering::Release);
        self.ensure_schema()?;
        self.connected.store(true, Ordering::Release);
        tracing::info!(
            backend = self.backend_name(),
            fulltext = self.fulltext_available(),
            "Native graph driver connected"
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.transport.close()?;
            tracing::info!(backend = self.backend_name(), "Native graph driver disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    #[instrument(skip(self, properties), fields(backend = self.backend_name(), label = label))]
    fn store_node(&self, label: &str, properties: &Properties) -> Result<String> {
        self.ensure_connected()?;
        validate_identifier("label", label)?;
        let (id, stored) = resolve_id(properties)?;

        let mut params = params([("id", json!(id)), ("json", encode_json(&stored)?)]);
        let assignments = property_assignments("n", &stored, false, &mut params);
        let statement = format!(
            "OPTIONAL MATCH (existing:{NODE_LABEL} {{id: $id}}) \
             WITH existing WHERE existing IS NULL \
             CREATE (n:{NODE_LABEL}:{} {{id: $id}}) SET n.{JSON_KEY} = $json{assignments} \
             RETURN n.id",
            quote(label)
        );
        let rows = self
            .run("store_node", &statement, &params)
            .map_err(|err| match err {
                Error::Duplicate(_) => Error::Duplicate(format!("node '{id}' already exists")),
                other => other,
            })?;
        if rows.is_empty() {
            return Err(Error::Duplicate(format!("node '{id}' already exists")));
        }

        metrics::counter!("graph_nodes_stored_total", "backend" => self.backend_name())
            .increment(1);
        Ok(id)
    }

    fn get_node(&self, id: &str) -> Result<Option<NodeRecord>> {
        self.ensure_connected()?;
        let nodes = self.fetch_nodes(
            "get_node",
            &format!("MATCH (n:{NODE_LABEL} {{id: $id}}) RETURN n.id, labels(n), n.{JSON_KEY}"),
            &params([("id", json!(id))]),
        )?;
        Ok(nodes.into_iter().next())
    }

    #[instrument(skip(self, properties), fields(backend = self.backend_name(), node_id = id))]
    fn update_node(&self, id: &str, properties: &Properties) -> Result<NodeRecord> {
        let mut node = self.get_node(id)?.ok_or_else(|| Error::NotFound {
            kind: "node",
            id: id.to_string(),
        })?;
        merge_properties(&mut node.properties, properties);

        let mut params = params([("id", json!(id)), ("json", encode_json(&node.properties)?)]);
        let assignments = property_assignments("n", properties, true, &mut params);
        let statement = format!(
            "MATCH (n:{NODE_LABEL} {{id: $id}}) SET n.{JSON_KEY} = $json{assignments} RETURN n.id"
        );
        if self.run("update_node", &statement, &params)?.is_empty() {
            return Err(Error::NotFound {
                kind: "node",
                id: id.to_string(),
            });
        }
        Ok(node)
    }

    #[instrument(skip(self), fields(backend = self.backend_name(), node_id = id))]
    fn delete_node(&self, id: &str) -> Result<bool> {
        self.ensure_connected()?;
        let rows = self.run(
            "delete_node",
            &format!(
                "MATCH (n:{NODE_LABEL} {{id: $id}}) WITH n, n.id AS id DETACH DELETE n RETURN id"
            ),
            &params([("id", json!(id))]),
        )?;
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self, filter), fields(backend = self.backend_name(), label = label))]
    fn search_nodes(&self, label: &str, filter: &NodeFilter) -> Result<Vec<NodeRecord>> {
        self.ensure_connected()?;
        validate_identifier("label", label)?;
        let terms = filter.text_terms();

        let candidates = if terms.is_empty() {
            self.scan_label(label)?
        } else if let Some(hits) = self.search_fulltext(label, &terms)? {
            hits
        } else {
            let mut scored: Vec<(usize, NodeRecord)> = self
                .scan_label(label)?
                .into_iter()
                .map(|node| (substring_score(&node.properties, &terms), node))
                .filter(|(score, _)| *score > 0)
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
            scored.into_iter().map(|(_, node)| node).collect()
        };

        Ok(candidates
            .into_iter()
            .filter(|node| filter.matches_properties(&node.properties))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    #[instrument(
        skip(self, properties),
        fields(backend = self.backend_name(), from = from_id, to = to_id, rel_type = rel_type)
    )]
    fn store_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<String> {
        self.ensure_connected()?;
        validate_identifier("relationship type", rel_type)?;
        let id_supplied = properties.get(ID_KEY).is_some_and(|v| !v.is_null());
        let (id, stored) = resolve_id(properties)?;

        let mut params = params([
            ("id", json!(id)),
            ("from", json!(from_id)),
            ("to", json!(to_id)),
            ("json", encode_json(&stored)?),
        ]);
        let assignments = property_assignments("r", &stored, false, &mut params);
        // Generated ids are fresh UUIDs; only caller-supplied ids need the
        // relationship scan.
        let guard = if id_supplied {
            "OPTIONAL MATCH ()-[existing]->() WHERE existing.id = $id \
             WITH count(existing) AS taken "
        } else {
            "WITH 0 AS taken "
        };
        let statement = format!(
            "{guard}MATCH (a:{NODE_LABEL} {{id: $from}}), (b:{NODE_LABEL} {{id: $to}}) \
             WHERE taken = 0 \
             CREATE (a)-[r:{} {{id: $id}}]->(b) SET r.{JSON_KEY} = $json{assignments} \
             RETURN r.id",
            quote(rel_type)
        );

        let rows = self.run("store_relationship", &statement, &params)?;
        if rows.is_empty() {
            return Err(self.diagnose_failed_insert(&id, id_supplied, from_id, to_id));
        }

        metrics::counter!(
            "graph_relationships_stored_total",
            "backend" => self.backend_name(),
            "rel_type" => rel_type.to_string()
        )
        .increment(1);
        Ok(id)
    }

    fn get_relationship(&self, id: &str) -> Result<Option<EdgeRecord>> {
        self.ensure_connected()?;
        let edges = self.fetch_edges(
            "get_relationship",
            &format!(
                "MATCH (a:{NODE_LABEL})-[r]->(b:{NODE_LABEL}) WHERE r.id = $id \
                 RETURN r.id, a.id, b.id, type(r), r.{JSON_KEY}"
            ),
            &params([("id", json!(id))]),
        )?;
        Ok(edges.into_iter().next())
    }

    #[instrument(skip(self, properties), fields(backend = self.backend_name(), relationship_id = id))]
    fn update_relationship(&self, id: &str, properties: &Properties) -> Result<EdgeRecord> {
        let mut edge = self
            .get_relationship(id)?
            .ok_or_else(|| Error::relationship_not_found(id))?;
        merge_properties(&mut edge.properties, properties);

        let mut params = params([("id", json!(id)), ("json", encode_json(&edge.properties)?)]);
        let assignments = property_assignments("r", properties, true, &mut params);
        let statement = format!(
            "MATCH ()-[r]->() WHERE r.id = $id SET r.{JSON_KEY} = $json{assignments} RETURN r.id"
        );
        if self.run("update_relationship", &statement, &params)?.is_empty() {
            return Err(Error::relationship_not_found(id));
        }
        Ok(edge)
    }

    #[instrument(skip(self), fields(backend = self.backend_name(), relationship_id = id))]
    fn delete_relationship(&self, id: &str) -> Result<bool> {
        self.ensure_connected()?;
        let rows = self.run(
            "delete_relationship",
            "MATCH ()-[r]->() WHERE r.id = $id WITH r, r.id AS id DELETE r RETURN id",
            &params([("id", json!(id))]),
        )?;
        Ok(!rows.is_empty())
    }

    fn query_relationships(&self, filter: &EdgeFilter) -> Result<Vec<EdgeRecord>> {
        self.ensure_connected()?;
        let mut conditions = Vec::new();
        let mut params = Properties::new();
        if let Some(from) = &filter.from_id {
            conditions.push("a.id = $from");
            params.insert("from".to_string(), json!(from));
        }
        if let Some(to) = &filter.to_id {
            conditions.push("b.id = $to");
            params.insert("to".to_string(), json!(to));
        }
        if let Some(types) = &filter.rel_types {
            conditions.push("type(r) IN $types");
            params.insert("types".to_string(), json!(types));
        }
        if let Some(after) = &filter.after_id {
            conditions.push("r.id > $after");
            params.insert("after".to_string(), json!(after));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let limit = filter
            .limit
            .map(|limit| format!(" LIMIT {limit}"))
            .unwrap_or_default();
        self.fetch_edges(
            "query_relationships",
            &format!(
                "MATCH (a:{NODE_LABEL})-[r]->(b:{NODE_LABEL}){where_clause} \
                 RETURN r.id, a.id, b.id, type(r), r.{JSON_KEY} ORDER BY r.id{limit}"
            ),
            &params,
        )
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    #[instrument(skip(self, query), fields(backend = self.backend_name(), start = start_id, depth = query.max_depth))]
    fn traverse(&self, start_id: &str, query: &TraversalQuery) -> Result<Vec<TraversalStep>> {
        if self.get_node(start_id)?.is_none() {
            return Ok(Vec::new());
        }
        breadth_first(start_id, query, |frontier| self.expand(frontier, query))
    }

    // ========================================================================
    // Health
    // ========================================================================

    fn health_check(&self) -> Result<HealthStatus> {
        let start = Instant::now();
        let probe = self.transport.ping();
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let details = match &probe {
            Ok(()) if self.fulltext_available() => "full-text search available".to_string(),
            Ok(()) => "full-text unavailable, substring search in use".to_string(),
            Err(err) => err.to_string(),
        };
        Ok(HealthStatus {
            backend: self.backend_name().to_string(),
            connected: probe.is_ok() && self.is_connected(),
            latency_ms,
            details: Some(details),
        })
    }

    fn stats(&self) -> Result<GraphStats> {
        self.ensure_connected()?;
        let mut stats = GraphStats::default();
        for row in self.run(
            "stats",
            &format!("MATCH (n:{NODE_LABEL}) RETURN labels(n), count(n)"),
            &Properties::new(),
        )? {
            let count = count_column(&row, 1);
            *stats.nodes_by_label.entry(label_column(&row, 0)?).or_default() += count;
            stats.node_count += count;
        }
        for row in self.run(
            "stats",
            "MATCH ()-[r]->() RETURN type(r), count(r)",
            &Properties::new(),
        )? {
            let count = count_column(&row, 1);
            *stats
                .relationships_by_type
                .entry(string_column(&row, 0)?)
                .or_default() += count;
            stats.relationship_count += count;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that records statements and replays canned responses.
    struct ScriptedTransport {
        dialect: CypherDialect,
        responses: Mutex<VecDeque<Result<Vec<CypherRow>>>>,
        statements: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(dialect: CypherDialect) -> Self {
            Self {
                dialect,
                responses: Mutex::new(VecDeque::new()),
                statements: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, response: Result<Vec<CypherRow>>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl CypherTransport for ScriptedTransport {
        fn dialect(&self) -> CypherDialect {
            self.dialect
        }

        fn run(&self, statement: &str, _params: &Properties) -> Result<Vec<CypherRow>> {
            self.statements.lock().unwrap().push(statement.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn failure(cause: &str) -> Result<Vec<CypherRow>> {
        Err(Error::OperationFailed {
            operation: "cypher".to_string(),
            cause: cause.to_string(),
        })
    }

    fn driver(dialect: CypherDialect) -> CypherDriver<ScriptedTransport> {
        CypherDriver::new(ScriptedTransport::new(dialect)).with_retry(RetryPolicy::none())
    }

    #[test]
    fn test_connect_skips_unsupported_fulltext() {
        let driver = driver(CypherDialect::FalkorDb);
        let schema = CypherDialect::FalkorDb.schema();
        driver.transport().respond(Ok(vec![])); // ping
        for statement in &schema {
            if statement.kind == SchemaKind::FullText {
                driver
                    .transport()
                    .respond(failure("There is no procedure with the name `db.idx.fulltext.createNodeIndex`"));
            } else {
                driver
                    .transport()
                    .respond(failure("Attribute 'id' is already indexed"));
            }
        }
        driver.connect().unwrap();
        assert!(driver.is_connected());
        assert!(!driver.fulltext_available());
    }

    #[test]
    fn test_connect_fails_on_fatal_schema_error() {
        let driver = driver(CypherDialect::Neo4j);
        driver.transport().respond(Ok(vec![]));
        driver.transport().respond(failure("Neo.ClientError.Security.Forbidden"));
        let err = driver.connect().unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(!driver.is_connected());
    }

    #[test]
    fn test_relationship_constraint_falls_back_to_index() {
        let driver = driver(CypherDialect::Neo4j);
        driver.transport().respond(Ok(vec![])); // ping
        driver.transport().respond(Ok(vec![])); // node constraint
        driver
            .transport()
            .respond(failure("Relationship uniqueness constraints are not supported"));
        driver.connect().unwrap();
        let statements = driver.transport().statements();
        assert!(statements[3].starts_with("CREATE INDEX rel_causes_id"));
        assert!(driver.fulltext_available());
    }

    #[test]
    fn test_decode_rows() {
        let node = decode_node(&[
            json!("m1"),
            json!(["Node", "Memory"]),
            json!(r#"{"id":"m1","tags":["a"],"context":{"files":["x.rs"]}}"#),
        ])
        .unwrap();
        assert_eq!(node.label, "Memory");
        assert_eq!(node.properties["context"]["files"][0], "x.rs");

        let incoming = decode_expansion(
            &[
                json!("b"),
                json!("r1"),
                json!("CAUSES"),
                json!(r#"{"strength":0.5}"#),
                json!("a"),
                json!(["Memory", "Node"]),
                json!(r#"{"id":"a"}"#),
            ],
            Direction::Incoming,
        )
        .unwrap();
        assert_eq!(incoming.edge.from_id, "a");
        assert_eq!(incoming.edge.to_id, "b");
        assert_eq!(incoming.via, "b");

        assert!(decode_node(&[json!("m1")]).is_err());
    }

    #[test]
    fn test_property_assignments() {
        let properties = params([
            ("id", json!("m1")),
            ("title", json!("t")),
            ("tags", json!(["a", "b"])),
            ("context", json!({"files": []})),
            ("summary", Value::Null),
            ("bad key", json!(1)),
        ]);
        let mut bound = Properties::new();
        let clause = property_assignments("n", &properties, true, &mut bound);
        assert!(clause.contains("n.`title` = $p"));
        assert!(clause.contains("n.`tags` = $p"));
        assert!(clause.contains("n.`context` = null"));
        assert!(clause.contains("n.`summary` = null"));
        assert!(!clause.contains("bad key"));
        assert!(!clause.contains("`id`"));
        assert_eq!(bound.len(), 2);
    }

    #[test]
    fn test_substring_score() {
        let properties = params([("title", json!("Redis Timeout")), ("content", json!("pool"))]);
        let terms = vec!["redis".to_string(), "pool".to_string(), "zebra".to_string()];
        assert_eq!(substring_score(&properties, &terms), 2);
    }
}
