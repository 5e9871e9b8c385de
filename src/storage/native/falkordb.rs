//! `FalkorDB` transport over the Redis protocol.
//!
//! Statements run through `GRAPH.QUERY`. The command has no separate
//! parameter channel, so parameters are encoded as a `CYPHER k=v ...` prefix
//! of escaped literals.

use super::{CypherDialect, CypherRow, CypherTransport};
use crate::config::FalkorDbSettings;
use crate::models::{Properties, validate_identifier};
use crate::storage::acquire_lock;
use crate::{Error, Result};
use redis::{Client, Connection};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

const BACKEND: &str = "falkordb";

/// Response timeout for one `GRAPH.QUERY`.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs Cypher through `GRAPH.QUERY` on one graph key.
///
/// Reuses a single cached connection; a connection that fails with an I/O
/// error is dropped and the next call reconnects.
pub struct FalkorDbTransport {
    client: Client,
    graph: String,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl FalkorDbTransport {
    /// Creates a transport from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed URL.
    pub fn new(settings: &FalkorDbSettings, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(settings.url.as_str())
            .map_err(|e| Error::Validation(format!("invalid FalkorDB URL '{}': {e}", settings.url)))?;
        Ok(Self {
            client,
            graph: settings.graph.clone(),
            connect_timeout,
            connection: Mutex::new(None),
        })
    }

    /// The graph key queries run against.
    #[must_use]
    pub fn graph(&self) -> &str {
        &self.graph
    }

    fn get_connection(&self) -> Result<Connection> {
        if let Some(conn) = acquire_lock(&self.connection).take() {
            return Ok(conn);
        }
        let conn = self
            .client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(|e| redis_error(&e))?;
        conn.set_read_timeout(Some(COMMAND_TIMEOUT))
            .map_err(|e| redis_error(&e))?;
        conn.set_write_timeout(Some(COMMAND_TIMEOUT))
            .map_err(|e| redis_error(&e))?;
        Ok(conn)
    }

    fn return_connection(&self, conn: Connection) {
        *acquire_lock(&self.connection) = Some(conn);
    }
}

fn redis_error(err: &redis::RedisError) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            operation: "falkordb_query".to_string(),
            after_ms: u64::try_from(COMMAND_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        }
    } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        Error::Connection {
            backend: BACKEND.to_string(),
            cause: err.to_string(),
        }
    } else {
        let message = err.to_string();
        let lower = message.to_lowercase();
        if lower.contains("constraint") && lower.contains("violat") {
            Error::Duplicate(message)
        } else {
            Error::OperationFailed {
                operation: "falkordb_query".to_string(),
                cause: message,
            }
        }
    }
}

/// Encodes a JSON value as a Cypher literal.
fn cypher_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('"');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        },
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(cypher_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("`{}`: {}", k.replace('`', "``"), cypher_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Builds the `CYPHER k=v ... ` prefix for a statement.
fn parameter_prefix(params: &Properties) -> Result<String> {
    if params.is_empty() {
        return Ok(String::new());
    }
    let mut prefix = String::from("CYPHER");
    for (name, value) in params {
        validate_identifier("parameter", name)?;
        prefix.push(' ');
        prefix.push_str(name);
        prefix.push('=');
        prefix.push_str(&cypher_literal(value));
    }
    prefix.push(' ');
    Ok(prefix)
}

fn to_json(value: &redis::Value) -> Value {
    match value {
        redis::Value::Int(i) => Value::from(*i),
        redis::Value::BulkString(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Value::String(s.clone()),
        redis::Value::Okay => Value::String("OK".to_string()),
        redis::Value::Double(f) => Value::from(*f),
        redis::Value::Boolean(b) => Value::Bool(*b),
        redis::Value::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        _ => Value::Null,
    }
}

/// Extracts rows from a `GRAPH.QUERY` reply.
///
/// Replies with results are `[header, rows, statistics]`; write-only
/// statements reply with `[statistics]`.
fn rows_from_reply(reply: &redis::Value) -> Vec<CypherRow> {
    let redis::Value::Array(parts) = reply else {
        return Vec::new();
    };
    if parts.len() < 3 {
        return Vec::new();
    }
    let redis::Value::Array(rows) = &parts[1] else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| match row {
            redis::Value::Array(columns) => columns.iter().map(to_json).collect(),
            other => vec![to_json(other)],
        })
        .collect()
}

impl CypherTransport for FalkorDbTransport {
    fn dialect(&self) -> CypherDialect {
        CypherDialect::FalkorDb
    }

    fn run(&self, statement: &str, params: &Properties) -> Result<Vec<CypherRow>> {
        let query = format!("{}{statement}", parameter_prefix(params)?);
        let mut conn = self.get_connection()?;
        let result: redis::RedisResult<redis::Value> = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph)
            .arg(&query)
            .query(&mut conn);
        match result {
            Ok(reply) => {
                self.return_connection(conn);
                Ok(rows_from_reply(&reply))
            },
            Err(err) => {
                if !err.is_io_error() {
                    self.return_connection(conn);
                }
                Err(redis_error(&err))
            },
        }
    }

    fn close(&self) -> Result<()> {
        acquire_lock(&self.connection).take();
        Ok(())
    }
}
