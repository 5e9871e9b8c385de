//! Cypher dialect differences between Neo4j and `FalkorDB`.

use crate::models::{MEMORY_LABEL, RelationshipType};

/// Label carried by every node, used for id lookups.
pub const NODE_LABEL: &str = "Node";

/// Name of the Neo4j full-text index.
const NEO4J_FULLTEXT_INDEX: &str = "node_text";

/// A supported Cypher dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CypherDialect {
    /// Neo4j 5.x over the HTTP transactional endpoint.
    Neo4j,
    /// `FalkorDB` over `GRAPH.QUERY`.
    FalkorDb,
}

/// Whether a schema statement may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Failure aborts `connect`.
    Required,
    /// Skipped with a warning when the server does not support it.
    Optional,
    /// Optional; when skipped, text search degrades to substring matching.
    FullText,
}

/// One idempotent schema statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatement {
    /// Short name used in logs.
    pub name: String,
    /// Cypher to execute.
    pub cypher: String,
    /// Failure handling.
    pub kind: SchemaKind,
    /// Statement tried instead when this one is unsupported.
    pub fallback: Option<String>,
}

impl SchemaStatement {
    fn new(name: impl Into<String>, cypher: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            cypher: cypher.into(),
            kind,
            fallback: None,
        }
    }

    fn with_fallback(mut self, cypher: impl Into<String>) -> Self {
        self.fallback = Some(cypher.into());
        self
    }
}

/// How a failed schema statement is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// The object already exists; success.
    AlreadyExists,
    /// The server lacks the feature.
    Unsupported,
    /// Anything else.
    Fatal,
}

/// Classifies a schema failure message.
#[must_use]
pub fn classify_schema_failure(message: &str) -> SchemaOutcome {
    let message = message.to_lowercase();
    if ["already exists", "already indexed", "equivalent"]
        .iter()
        .any(|m| message.contains(m))
    {
        SchemaOutcome::AlreadyExists
    } else if [
        "not supported",
        "unsupported",
        "unknown procedure",
        "procedurenotfound",
        "no procedure",
        "unknown function",
    ]
    .iter()
    .any(|m| message.contains(m))
    {
        SchemaOutcome::Unsupported
    } else {
        SchemaOutcome::Fatal
    }
}

/// Returns true when a query failed because a procedure is missing.
#[must_use]
pub fn is_missing_procedure(message: &str) -> bool {
    classify_schema_failure(message) == SchemaOutcome::Unsupported
}

/// Wraps an identifier in backticks. Callers validate identifiers first.
#[must_use]
pub fn quote(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

impl CypherDialect {
    /// Backend name used in logs, metrics, and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Neo4j => "neo4j",
            Self::FalkorDb => "falkordb",
        }
    }

    /// The idempotent schema run on every connect.
    #[must_use]
    pub fn schema(self) -> Vec<SchemaStatement> {
        match self {
            Self::Neo4j => neo4j_schema(),
            Self::FalkorDb => falkordb_schema(),
        }
    }

    /// Builds the full-text query string for the given terms.
    #[must_use]
    pub fn fulltext_query(self, terms: &[String]) -> String {
        match self {
            // Lucene: quoted terms, any may match
            Self::Neo4j => terms
                .iter()
                .map(|t| format!("\"{t}\""))
                .collect::<Vec<_>>()
                .join(" OR "),
            // RediSearch: union operator
            Self::FalkorDb => terms.join("|"),
        }
    }

    /// Full-text node search yielding `node` and `score`.
    ///
    /// Expects the query string in `$query`.
    #[must_use]
    pub fn fulltext_call(self) -> String {
        match self {
            Self::Neo4j => format!(
                "CALL db.index.fulltext.queryNodes('{NEO4J_FULLTEXT_INDEX}', $query) YIELD node, score"
            ),
            Self::FalkorDb => {
                format!("CALL db.idx.fulltext.queryNodes('{NODE_LABEL}', $query) YIELD node, score")
            },
        }
    }
}

fn memory_property_indexes() -> impl Iterator<Item = &'static str> {
    ["type", "tags", "created_at"].into_iter()
}

fn neo4j_schema() -> Vec<SchemaStatement> {
    let mut statements = vec![SchemaStatement::new(
        "node_id_unique",
        format!(
            "CREATE CONSTRAINT node_id_unique IF NOT EXISTS FOR (n:{NODE_LABEL}) REQUIRE n.id IS UNIQUE"
        ),
        SchemaKind::Required,
    )];

    for rel_type in RelationshipType::all() {
        let name = rel_type.as_str().to_lowercase();
        statements.push(
            SchemaStatement::new(
                format!("rel_{name}_id_unique"),
                format!(
                    "CREATE CONSTRAINT rel_{name}_id_unique IF NOT EXISTS \
                     FOR ()-[r:{}]-() REQUIRE r.id IS UNIQUE",
                    quote(rel_type.as_str())
                ),
                SchemaKind::Optional,
            )
            .with_fallback(format!(
                "CREATE INDEX rel_{name}_id IF NOT EXISTS FOR ()-[r:{}]-() ON (r.id)",
                quote(rel_type.as_str())
            )),
        );
    }

    for property in memory_property_indexes() {
        statements.push(SchemaStatement::new(
            format!("memory_{property}"),
            format!(
                "CREATE INDEX memory_{property} IF NOT EXISTS FOR (n:{MEMORY_LABEL}) ON (n.{property})"
            ),
            SchemaKind::Optional,
        ));
    }

    statements.push(SchemaStatement::new(
        NEO4J_FULLTEXT_INDEX,
        format!(
            "CREATE FULLTEXT INDEX {NEO4J_FULLTEXT_INDEX} IF NOT EXISTS \
             FOR (n:{NODE_LABEL}) ON EACH [n.title, n.content, n.summary]"
        ),
        SchemaKind::FullText,
    ));
    statements
}

fn falkordb_schema() -> Vec<SchemaStatement> {
    // Unique constraints live outside Cypher (GRAPH.CONSTRAINT); a plain
    // index on id is what Cypher can express.
    let mut statements = vec![SchemaStatement::new(
        "node_id",
        format!("CREATE INDEX FOR (n:{NODE_LABEL}) ON (n.id)"),
        SchemaKind::Required,
    )];

    for rel_type in RelationshipType::all() {
        statements.push(SchemaStatement::new(
            format!("rel_{}_id", rel_type.as_str().to_lowercase()),
            format!("CREATE INDEX FOR ()-[r:{}]-() ON (r.id)", quote(rel_type.as_str())),
            SchemaKind::Optional,
        ));
    }

    for property in memory_property_indexes() {
        statements.push(SchemaStatement::new(
            format!("memory_{property}"),
            format!("CREATE INDEX FOR (n:{MEMORY_LABEL}) ON (n.{property})"),
            SchemaKind::Optional,
        ));
    }

    statements.push(SchemaStatement::new(
        "node_text",
        format!(
            "CALL db.idx.fulltext.createNodeIndex('{NODE_LABEL}', 'title', 'content', 'summary')"
        ),
        SchemaKind::FullText,
    ));
    statements
}
