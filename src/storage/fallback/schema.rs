//! Durable schema for the fallback driver.

use crate::models::{EdgeRecord, NodeRecord, Properties};
use crate::{Error, Result};
use rusqlite::{Connection, Row};

const TABLES: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    properties TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    from_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    properties TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
    id UNINDEXED,
    title,
    content,
    summary
);
";

const INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(rel_type)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_id)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_id)",
];

/// Creates tables, indexes, and the full-text table. Idempotent.
///
/// # Errors
///
/// Returns [`Error::Schema`] if any statement fails.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(TABLES).map_err(|e| schema_error(&e))?;
    for statement in INDEXES {
        conn.execute(statement, []).map_err(|e| schema_error(&e))?;
    }
    Ok(())
}

fn schema_error(err: &rusqlite::Error) -> Error {
    Error::Schema {
        backend: "sqlite".to_string(),
        cause: err.to_string(),
    }
}

/// Parses a stored property blob.
pub fn parse_properties(blob: &str) -> rusqlite::Result<Properties> {
    serde_json::from_str(blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Serializes a property map for storage.
pub fn encode_properties(properties: &Properties) -> Result<String> {
    serde_json::to_string(properties).map_err(|e| Error::OperationFailed {
        operation: "encode_properties".to_string(),
        cause: e.to_string(),
    })
}

/// Maps a `SELECT id, label, properties` row.
pub fn node_from_row(row: &Row<'_>) -> rusqlite::Result<NodeRecord> {
    let blob: String = row.get(2)?;
    Ok(NodeRecord {
        id: row.get(0)?,
        label: row.get(1)?,
        properties: parse_properties(&blob)?,
    })
}

/// Maps a `SELECT id, from_id, to_id, rel_type, properties` row.
pub fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<EdgeRecord> {
    let blob: String = row.get(4)?;
    Ok(EdgeRecord {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        rel_type: row.get(3)?,
        properties: parse_properties(&blob)?,
    })
}

/// Quotes each term and joins them with `OR` for an FTS5 `MATCH`.
pub fn fts_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('nodes', 'relationships', 'nodes_fts')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        let terms = vec!["timeout".to_string(), "re-try".to_string()];
        assert_eq!(fts_query(&terms), "\"timeout\" OR \"re-try\"");
    }
}
