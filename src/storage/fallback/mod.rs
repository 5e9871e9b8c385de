//! Fallback graph driver: `SQLite` for durability plus an in-memory index.
//!
//! # Concurrency Model
//!
//! One `Mutex<Option<Connection>>` serializes every durable write. Each
//! mutation commits its `SQLite` transaction first and then updates the
//! [`GraphIndex`] while still holding the connection lock, so the index never
//! runs ahead of disk. Traversal and relationship reads only take the index
//! read lock and run concurrently with each other.
//!
//! # Schema
//!
//! - `nodes`: id, label, JSON property blob, timestamps
//! - `relationships`: id, endpoints (`ON DELETE CASCADE`), type, JSON blob
//! - `nodes_fts`: FTS5 table over title, content, and summary
//!
//! The index is a disposable cache; [`FallbackDriver::rebuild_index`]
//! rematerializes it from the tables.

// SQLite counts and millisecond timestamps fit comfortably in i64/u64.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

mod index;
mod schema;

pub use index::GraphIndex;

use crate::config::{IN_MEMORY_PATH, SqliteSettings};
use crate::models::{
    EdgeFilter, EdgeRecord, GraphStats, HealthStatus, NodeFilter, NodeRecord, Properties,
    TEXT_FIELDS, TraversalQuery, TraversalStep, merge_properties, resolve_id, validate_identifier,
};
use crate::storage::metrics::timed;
use crate::storage::resilience::{RetryPolicy, connection_error};
use crate::storage::sqlite::{
    acquire_lock, configure_connection, map_sqlite_error, read_lock, write_lock,
};
use crate::storage::traits::GraphDriver;
use crate::storage::traversal::breadth_first;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use schema::{edge_from_row, encode_properties, fts_query, node_from_row};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// Graph driver backed by `SQLite` and an in-process adjacency index.
pub struct FallbackDriver {
    path: PathBuf,
    retry: RetryPolicy,
    conn: Mutex<Option<Connection>>,
    index: RwLock<GraphIndex>,
    connected: AtomicBool,
}

impl FallbackDriver {
    /// Creates a driver for the database at `path` (`:memory:` for an
    /// in-memory database). Nothing is opened until [`GraphDriver::connect`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: RetryPolicy::default(),
            conn: Mutex::new(None),
            index: RwLock::new(GraphIndex::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Creates a driver over a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    /// Creates a driver from configuration.
    #[must_use]
    pub fn from_settings(settings: &SqliteSettings, retry: RetryPolicy) -> Self {
        Self::new(settings.path.clone()).with_retry(retry)
    }

    /// Sets the retry policy for writes.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    /// Rematerializes the in-memory index from durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is not connected or the tables cannot
    /// be read.
    #[instrument(skip(self), fields(backend = BACKEND))]
    pub fn rebuild_index(&self) -> Result<()> {
        let guard = acquire_lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(not_connected)?;
        let index = load_index(conn)?;
        tracing::info!(
            nodes = index.node_count(),
            relationships = index.edge_count(),
            "Rebuilt graph index"
        );
        *write_lock(&self.index) = index;
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        let conn = if self.is_in_memory() {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| connection_error(BACKEND, e))?;
            }
            Connection::open(&self.path)
        }
        .map_err(|e| connection_error(BACKEND, e))?;
        configure_connection(&conn)?;
        Ok(conn)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(not_connected())
        }
    }

    /// Runs a durable write under the connection lock, retrying busy errors.
    fn write<T, F>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> Result<T>,
    {
        self.retry.run(BACKEND, operation, || {
            let mut guard = acquire_lock(&self.conn);
            let conn = guard.as_mut().ok_or_else(not_connected)?;
            f(conn)
        })
    }
}

fn not_connected() -> Error {
    connection_error(BACKEND, "driver is not connected")
}

fn sql_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| map_sqlite_error(operation, &e)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn query_all<T>(
    conn: &Connection,
    operation: &'static str,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(sql_err(operation))?;
    let rows = stmt.query_map(params, map).map_err(sql_err(operation))?;
    let records = rows.collect::<rusqlite::Result<Vec<T>>>();
    records.map_err(sql_err(operation))
}

fn load_index(conn: &Connection) -> Result<GraphIndex> {
    let nodes = query_all(
        conn,
        "load_nodes",
        "SELECT id, label, properties FROM nodes",
        [],
        node_from_row,
    )?;
    let edges = query_all(
        conn,
        "load_relationships",
        "SELECT id, from_id, to_id, rel_type, properties FROM relationships",
        [],
        edge_from_row,
    )?;
    Ok(GraphIndex::from_records(nodes, edges))
}

fn node_exists(conn: &Connection, id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )
    .map_err(sql_err("node_exists"))
}

fn index_text(conn: &Connection, node: &NodeRecord) -> Result<()> {
    let [title, content, summary] =
        TEXT_FIELDS.map(|field| node.properties.get(field).and_then(Value::as_str));
    conn.execute(
        "INSERT INTO nodes_fts (id, title, content, summary) VALUES (?1, ?2, ?3, ?4)",
        params![node.id, title, content, summary],
    )
    .map_err(sql_err("index_text"))?;
    Ok(())
}

fn duplicate_id(kind: &str, id: &str) -> impl Fn(Error) -> Error {
    let message = format!("{kind} '{id}' already exists");
    move |err| match err {
        Error::Duplicate(_) => Error::Duplicate(message.clone()),
        other => other,
    }
}

impl GraphDriver for FallbackDriver {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(backend = BACKEND, path = %self.path.display()))]
    fn connect(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        if guard.is_some() {
            return Ok(());
        }
        let conn = self.retry.run(BACKEND, "connect", || self.open())?;
        schema::initialize(&conn)?;
        let index = load_index(&conn)?;
        tracing::info!(
            nodes = index.node_count(),
            relationships = index.edge_count(),
            "Fallback driver connected"
        );
        *write_lock(&self.index) = index;
        *guard = Some(conn);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        if guard.take().is_some() {
            *write_lock(&self.index) = GraphIndex::new();
            tracing::info!(backend = BACKEND, "Fallback driver disconnected");
        }
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    #[instrument(skip(self, properties), fields(backend = BACKEND, label = label))]
    fn store_node(&self, label: &str, properties: &Properties) -> Result<String> {
        validate_identifier("label", label)?;
        let (id, stored) = resolve_id(properties)?;
        let blob = encode_properties(&stored)?;
        let node = NodeRecord {
            id: id.clone(),
            label: label.to_string(),
            properties: stored,
        };

        timed(BACKEND, "store_node", || {
            self.write("store_node", |conn| {
                let now = now_millis();
                let tx = conn.transaction().map_err(sql_err("store_node"))?;
                tx.execute(
                    "INSERT INTO nodes (id, label, properties, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![node.id, node.label, blob, now],
                )
                .map_err(sql_err("store_node"))?;
                index_text(&tx, &node)?;
                tx.commit().map_err(sql_err("store_node"))?;
                write_lock(&self.index).upsert_node(node.clone());
                Ok(())
            })
        })
        .map_err(duplicate_id("node", &id))?;

        metrics::counter!("graph_nodes_stored_total", "backend" => BACKEND).increment(1);
        Ok(id)
    }

    fn get_node(&self, id: &str) -> Result<Option<NodeRecord>> {
        self.ensure_connected()?;
        Ok(read_lock(&self.index).node(id).cloned())
    }

    #[instrument(skip(self, properties), fields(backend = BACKEND, node_id = id))]
    fn update_node(&self, id: &str, properties: &Properties) -> Result<NodeRecord> {
        timed(BACKEND, "update_node", || {
            self.write("update_node", |conn| {
                let tx = conn.transaction().map_err(sql_err("update_node"))?;
                let mut node = tx
                    .query_row(
                        "SELECT id, label, properties FROM nodes WHERE id = ?1",
                        [id],
                        node_from_row,
                    )
                    .optional()
                    .map_err(sql_err("update_node"))?
                    .ok_or_else(|| Error::NotFound {
                        kind: "node",
                        id: id.to_string(),
                    })?;
                merge_properties(&mut node.properties, properties);

                tx.execute(
                    "UPDATE nodes SET properties = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, encode_properties(&node.properties)?, now_millis()],
                )
                .map_err(sql_err("update_node"))?;
                tx.execute("DELETE FROM nodes_fts WHERE id = ?1", [id])
                    .map_err(sql_err("update_node"))?;
                index_text(&tx, &node)?;
                tx.commit().map_err(sql_err("update_node"))?;

                write_lock(&self.index).upsert_node(node.clone());
                Ok(node)
            })
        })
    }

    #[instrument(skip(self), fields(backend = BACKEND, node_id = id))]
    fn delete_node(&self, id: &str) -> Result<bool> {
        timed(BACKEND, "delete_node", || {
            self.write("delete_node", |conn| {
                let tx = conn.transaction().map_err(sql_err("delete_node"))?;
                tx.execute("DELETE FROM nodes_fts WHERE id = ?1", [id])
                    .map_err(sql_err("delete_node"))?;
                // relationships go with the node via ON DELETE CASCADE
                let deleted = tx
                    .execute("DELETE FROM nodes WHERE id = ?1", [id])
                    .map_err(sql_err("delete_node"))?;
                tx.commit().map_err(sql_err("delete_node"))?;

                if deleted > 0 {
                    let removed = write_lock(&self.index).remove_node(id);
                    tracing::debug!(cascaded = removed.len(), "Deleted node");
                }
                Ok(deleted > 0)
            })
        })
    }

    #[instrument(skip(self, filter), fields(backend = BACKEND, label = label))]
    fn search_nodes(&self, label: &str, filter: &NodeFilter) -> Result<Vec<NodeRecord>> {
        validate_identifier("label", label)?;
        let terms = filter.text_terms();

        let candidates = timed(BACKEND, "search_nodes", || {
            let guard = acquire_lock(&self.conn);
            let conn = guard.as_ref().ok_or_else(not_connected)?;
            if terms.is_empty() {
                query_all(
                    conn,
                    "search_nodes",
                    "SELECT id, label, properties FROM nodes WHERE label = ?1 ORDER BY id",
                    [label],
                    node_from_row,
                )
            } else {
                // bm25() is more negative for better matches
                query_all(
                    conn,
                    "search_nodes",
                    "SELECT n.id, n.label, n.properties
                     FROM nodes_fts
                     JOIN nodes n ON n.id = nodes_fts.id
                     WHERE nodes_fts MATCH ?1 AND n.label = ?2
                     ORDER BY bm25(nodes_fts), n.id",
                    params![fts_query(&terms), label],
                    node_from_row,
                )
            }
        })?;

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
        fields(backend = BACKEND, from = from_id, to = to_id, rel_type = rel_type)
    )]
    fn store_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        properties: &Properties,
    ) -> Result<String> {
        validate_identifier("relationship type", rel_type)?;
        let (id, stored) = resolve_id(properties)?;
        let blob = encode_properties(&stored)?;
        let edge = EdgeRecord {
            id: id.clone(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            rel_type: rel_type.to_string(),
            properties: stored,
        };

        timed(BACKEND, "store_relationship", || {
            self.write("store_relationship", |conn| {
                let tx = conn.transaction().map_err(sql_err("store_relationship"))?;
                for endpoint in [from_id, to_id] {
                    if !node_exists(&tx, endpoint)? {
                        return Err(Error::NotFound {
                            kind: "node",
                            id: endpoint.to_string(),
                        });
                    }
                }
                let now = now_millis();
                tx.execute(
                    "INSERT INTO relationships
                        (id, from_id, to_id, rel_type, properties, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![edge.id, edge.from_id, edge.to_id, edge.rel_type, blob, now],
                )
                .map_err(sql_err("store_relationship"))?;
                tx.commit().map_err(sql_err("store_relationship"))?;
                write_lock(&self.index).insert_edge(edge.clone());
                Ok(())
            })
        })
        .map_err(duplicate_id("relationship", &id))?;

        metrics::counter!(
            "graph_relationships_stored_total",
            "backend" => BACKEND,
            "rel_type" => rel_type.to_string()
        )
        .increment(1);
        Ok(id)
    }

    fn get_relationship(&self, id: &str) -> Result<Option<EdgeRecord>> {
        self.ensure_connected()?;
        Ok(read_lock(&self.index).edge(id).cloned())
    }

    #[instrument(skip(self, properties), fields(backend = BACKEND, relationship_id = id))]
    fn update_relationship(&self, id: &str, properties: &Properties) -> Result<EdgeRecord> {
        timed(BACKEND, "update_relationship", || {
            self.write("update_relationship", |conn| {
                let tx = conn.transaction().map_err(sql_err("update_relationship"))?;
                let mut edge = tx
                    .query_row(
                        "SELECT id, from_id, to_id, rel_type, properties
                         FROM relationships WHERE id = ?1",
                        [id],
                        edge_from_row,
                    )
                    .optional()
                    .map_err(sql_err("update_relationship"))?
                    .ok_or_else(|| Error::relationship_not_found(id))?;
                merge_properties(&mut edge.properties, properties);

                tx.execute(
                    "UPDATE relationships SET properties = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, encode_properties(&edge.properties)?, now_millis()],
                )
                .map_err(sql_err("update_relationship"))?;
                tx.commit().map_err(sql_err("update_relationship"))?;

                write_lock(&self.index).insert_edge(edge.clone());
                Ok(edge)
            })
        })
    }

    #[instrument(skip(self), fields(backend = BACKEND, relationship_id = id))]
    fn delete_relationship(&self, id: &str) -> Result<bool> {
        timed(BACKEND, "delete_relationship", || {
            self.write("delete_relationship", |conn| {
                let deleted = conn
                    .execute("DELETE FROM relationships WHERE id = ?1", [id])
                    .map_err(sql_err("delete_relationship"))?;
                if deleted > 0 {
                    write_lock(&self.index).remove_edge(id);
                }
                Ok(deleted > 0)
            })
        })
    }

    fn query_relationships(&self, filter: &EdgeFilter) -> Result<Vec<EdgeRecord>> {
        self.ensure_connected()?;
        Ok(read_lock(&self.index).query(filter))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    #[instrument(skip(self, query), fields(backend = BACKEND, start = start_id, depth = query.max_depth))]
    fn traverse(&self, start_id: &str, query: &TraversalQuery) -> Result<Vec<TraversalStep>> {
        self.ensure_connected()?;
        timed(BACKEND, "traverse", || {
            let index = read_lock(&self.index);
            if !index.contains_node(start_id) {
                return Ok(Vec::new());
            }
            breadth_first(start_id, query, |frontier| {
                Ok(index.expand(frontier, query.direction))
            })
        })
    }

    fn path_exists(&self, from_id: &str, to_id: &str, rel_types: Option<&[String]>) -> Result<bool> {
        self.ensure_connected()?;
        Ok(read_lock(&self.index).reachable(from_id, to_id, rel_types))
    }

    // ========================================================================
    // Health
    // ========================================================================

    fn health_check(&self) -> Result<HealthStatus> {
        let start = Instant::now();
        let guard = acquire_lock(&self.conn);
        let probe = guard
            .as_ref()
            .map(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)));
        let (connected, details) = match probe {
            Some(Ok(_)) => {
                let index = read_lock(&self.index);
                (
                    true,
                    format!(
                        "{} nodes, {} relationships indexed",
                        index.node_count(),
                        index.edge_count()
                    ),
                )
            },
            Some(Err(e)) => (false, e.to_string()),
            None => (false, "not connected".to_string()),
        };
        drop(guard);

        Ok(HealthStatus {
            backend: BACKEND.to_string(),
            connected,
            latency_ms: start.elapsed().as_millis() as u64,
            details: Some(details),
        })
    }

    fn stats(&self) -> Result<GraphStats> {
        self.ensure_connected()?;
        Ok(read_lock(&self.index).stats())
    }
}
