//! Backend-neutral graph records and queries.
//!
//! These types form the vocabulary of the driver contract: every driver
//! stores and returns [`NodeRecord`]s and [`EdgeRecord`]s, and answers the same
//! [`NodeFilter`], [`EdgeFilter`], and [`TraversalQuery`] shapes.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Property map stored on nodes and edges.
pub type Properties = serde_json::Map<String, Value>;

/// Property keys indexed for full-text search.
pub const TEXT_FIELDS: [&str; 3] = ["title", "content", "summary"];

/// Edge property holding the relationship strength.
pub const STRENGTH_KEY: &str = "strength";

/// Property key holding the record id.
pub const ID_KEY: &str = "id";

/// Checks that a label or relationship type is a plain identifier
/// (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// # Errors
///
/// Returns [`Error::Validation`] for anything else.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid {kind} '{name}'")))
    }
}

/// Resolves the id of a record about to be stored.
///
/// Uses `properties["id"]` when present, otherwise generates a UUID v4. The
/// returned map always carries the id.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `id` is present but not a non-empty string.
pub fn resolve_id(properties: &Properties) -> Result<(String, Properties)> {
    let id = match properties.get(ID_KEY) {
        None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(other) => {
            return Err(Error::Validation(format!(
                "id must be a non-empty string, got {other}"
            )));
        },
    };
    let mut stored = properties.clone();
    stored.insert(ID_KEY.to_string(), Value::String(id.clone()));
    Ok((id, stored))
}

/// Shallow-merges `patch` into `target`; `null` values remove keys.
///
/// The `id` key is never changed.
pub fn merge_properties(target: &mut Properties, patch: &Properties) {
    for (key, value) in patch {
        if key == ID_KEY {
            continue;
        }
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// A stored node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique node id.
    pub id: String,
    /// Node label (e.g. `Memory`).
    pub label: String,
    /// Node properties.
    pub properties: Properties,
}

impl NodeRecord {
    /// Returns a string property.
    #[must_use]
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Returns a numeric property.
    #[must_use]
    pub fn f64_property(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }
}

/// A stored directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Unique edge id.
    pub id: String,
    /// Source node id.
    pub from_id: String,
    /// Target node id.
    pub to_id: String,
    /// Relationship type name.
    pub rel_type: String,
    /// Edge properties.
    pub properties: Properties,
}

impl EdgeRecord {
    /// Returns the edge strength, or 0 when absent.
    #[must_use]
    pub fn strength(&self) -> f64 {
        self.properties
            .get(STRENGTH_KEY)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Returns the endpoint opposite to `node_id`.
    #[must_use]
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.from_id == node_id {
            &self.to_id
        } else {
            &self.from_id
        }
    }
}

/// Edge direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow edges from source to target.
    #[default]
    Outgoing,
    /// Follow edges from target to source.
    Incoming,
    /// Follow edges either way.
    Both,
}

impl Direction {
    /// Returns the direction as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A predicate on a single property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyFilter {
    /// Property equals the value.
    Equals {
        /// Property key.
        key: String,
        /// Expected value.
        value: Value,
    },
    /// Property equals one of the values.
    OneOf {
        /// Property key.
        key: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Numeric property is at least the bound.
    AtLeast {
        /// Property key.
        key: String,
        /// Inclusive lower bound.
        value: f64,
    },
    /// Numeric property is at most the bound.
    AtMost {
        /// Property key.
        key: String,
        /// Inclusive upper bound.
        value: f64,
    },
    /// Array property contains any of the strings.
    ContainsAny {
        /// Property key.
        key: String,
        /// Accepted elements.
        values: Vec<String>,
    },
}

impl PropertyFilter {
    /// Returns the filtered property key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. }
            | Self::OneOf { key, .. }
            | Self::AtLeast { key, .. }
            | Self::AtMost { key, .. }
            | Self::ContainsAny { key, .. } => key,
        }
    }

    /// Evaluates the predicate against a property map.
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        let Some(actual) = properties.get(self.key()) else {
            return false;
        };
        match self {
            Self::Equals { value, .. } => actual == value,
            Self::OneOf { values, .. } => values.contains(actual),
            Self::AtLeast { value, .. } => actual.as_f64().is_some_and(|v| v >= *value),
            Self::AtMost { value, .. } => actual.as_f64().is_some_and(|v| v <= *value),
            Self::ContainsAny { values, .. } => actual.as_array().is_some_and(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|item| values.iter().any(|v| v == item))
            }),
        }
    }
}

/// Node search criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFilter {
    /// Full-text query; any term may match.
    pub text: Option<String>,
    /// Property predicates, combined with AND.
    pub filters: Vec<PropertyFilter>,
    /// Maximum results.
    pub limit: Option<usize>,
}

impl NodeFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full-text query.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds a property predicate.
    #[must_use]
    pub fn with_filter(mut self, filter: PropertyFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lowercased search terms, or empty when there is no text query.
    #[must_use]
    pub fn text_terms(&self) -> Vec<String> {
        self.text
            .as_deref()
            .map(|text| {
                text.split_whitespace()
                    .map(|term| {
                        term.chars()
                            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                            .collect::<String>()
                            .to_lowercase()
                    })
                    .filter(|term| !term.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true when every property predicate holds.
    #[must_use]
    pub fn matches_properties(&self, properties: &Properties) -> bool {
        self.filters.iter().all(|f| f.matches(properties))
    }

    /// Case-insensitive substring match of any term against the text fields.
    #[must_use]
    pub fn matches_text(&self, properties: &Properties) -> bool {
        let terms = self.text_terms();
        if terms.is_empty() {
            return true;
        }
        TEXT_FIELDS
            .iter()
            .filter_map(|field| properties.get(*field).and_then(Value::as_str))
            .map(str::to_lowercase)
            .any(|haystack| terms.iter().any(|term| haystack.contains(term.as_str())))
    }
}

/// Relationship query criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    /// Source node id.
    pub from_id: Option<String>,
    /// Target node id.
    pub to_id: Option<String>,
    /// Accepted relationship types; `None` accepts all.
    pub rel_types: Option<Vec<String>>,
    /// Keyset cursor: only edges with an id greater than this.
    pub after_id: Option<String>,
    /// Maximum results.
    pub limit: Option<usize>,
}

impl EdgeFilter {
    /// Matches every edge.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Edges leaving `id`.
    #[must_use]
    pub fn outgoing(id: impl Into<String>) -> Self {
        Self {
            from_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Edges entering `id`.
    #[must_use]
    pub fn incoming(id: impl Into<String>) -> Self {
        Self {
            to_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Edges from `from` to `to`.
    #[must_use]
    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_id: Some(from.into()),
            to_id: Some(to.into()),
            ..Self::default()
        }
    }

    /// Restricts to the given types.
    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rel_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the keyset cursor.
    #[must_use]
    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after_id = Some(id.into());
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates the filter against an edge (ignores `limit`).
    #[must_use]
    pub fn matches(&self, edge: &EdgeRecord) -> bool {
        self.from_id.as_ref().is_none_or(|id| *id == edge.from_id)
            && self.to_id.as_ref().is_none_or(|id| *id == edge.to_id)
            && type_admitted(self.rel_types.as_deref(), &edge.rel_type)
            && self
                .after_id
                .as_ref()
                .is_none_or(|cursor| edge.id.as_str() > cursor.as_str())
    }
}

/// Breadth-first traversal parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalQuery {
    /// Maximum hops from the start node.
    pub max_depth: u32,
    /// Accepted relationship types; `None` accepts all.
    pub rel_types: Option<Vec<String>>,
    /// Direction edges are followed in.
    pub direction: Direction,
    /// Edges weaker than this are not followed.
    pub min_strength: Option<f64>,
}

impl Default for TraversalQuery {
    fn default() -> Self {
        Self {
            max_depth: 2,
            rel_types: None,
            direction: Direction::Outgoing,
            min_strength: None,
        }
    }
}

impl TraversalQuery {
    /// Creates a query with the given depth.
    #[must_use]
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// Restricts to the given types.
    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rel_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the minimum edge strength.
    #[must_use]
    pub const fn with_min_strength(mut self, min_strength: f64) -> Self {
        self.min_strength = Some(min_strength);
        self
    }

    /// Returns true when the edge may be followed.
    #[must_use]
    pub fn admits(&self, edge: &EdgeRecord) -> bool {
        type_admitted(self.rel_types.as_deref(), &edge.rel_type)
            && self.min_strength.is_none_or(|min| edge.strength() >= min)
    }
}

fn type_admitted(types: Option<&[String]>, rel_type: &str) -> bool {
    types.is_none_or(|types| types.iter().any(|t| t == rel_type))
}

/// One edge crossed during traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalStep {
    /// The node reached.
    pub node: NodeRecord,
    /// The edge crossed to reach it.
    pub edge: EdgeRecord,
    /// Id of the node the edge was crossed from.
    pub via: String,
    /// Hop count of `node` from the start.
    pub depth: u32,
}

/// Aggregate counts reported by a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total nodes.
    pub node_count: u64,
    /// Total relationships.
    pub relationship_count: u64,
    /// Node counts per label.
    pub nodes_by_label: BTreeMap<String, u64>,
    /// Relationship counts per type.
    pub relationships_by_type: BTreeMap<String, u64>,
}

/// Driver health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Backend name.
    pub backend: String,
    /// Whether the driver is connected.
    pub connected: bool,
    /// Round-trip latency of the health probe.
    pub latency_ms: u64,
    /// Backend-specific detail.
    pub details: Option<String>,
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap_or_default()
    }

    fn edge(id: &str, rel_type: &str, strength: f64) -> EdgeRecord {
        EdgeRecord {
            id: id.to_string(),
            from_id: "a".to_string(),
            to_id: "b".to_string(),
            rel_type: rel_type.to_string(),
            properties: props(json!({ "strength": strength })),
        }
    }

    #[test]
    fn test_property_filters() {
        let p = props(json!({"type": "problem", "importance": 0.7, "tags": ["rust", "db"]}));
        assert!(
            PropertyFilter::Equals {
                key: "type".to_string(),
                value: json!("problem"),
            }
            .matches(&p)
        );
        assert!(
            PropertyFilter::AtLeast {
                key: "importance".to_string(),
                value: 0.5,
            }
            .matches(&p)
        );
        assert!(
            !PropertyFilter::AtMost {
                key: "importance".to_string(),
                value: 0.5,
            }
            .matches(&p)
        );
        assert!(
            PropertyFilter::ContainsAny {
                key: "tags".to_string(),
                values: vec!["db".to_string(), "x".to_string()],
            }
            .matches(&p)
        );
        assert!(
            !PropertyFilter::Equals {
                key: "missing".to_string(),
                value: json!(1),
            }
            .matches(&p)
        );
    }

    #[test]
    fn test_text_terms_and_matching() {
        let filter = NodeFilter::new().with_text("  Timeout, RETRY!  ");
        assert_eq!(filter.text_terms(), vec!["timeout", "retry"]);

        let p = props(json!({"title": "Connection timeout", "content": "..."}));
        assert!(filter.matches_text(&p));
        assert!(!NodeFilter::new().with_text("zebra").matches_text(&p));
        assert!(NodeFilter::new().with_text("   ").matches_text(&p));
    }

    #[test]
    fn test_edge_filter() {
        let e = edge("e2", "SOLVES", 0.9);
        assert!(EdgeFilter::all().matches(&e));
        assert!(EdgeFilter::outgoing("a").matches(&e));
        assert!(!EdgeFilter::incoming("a").matches(&e));
        assert!(EdgeFilter::all().with_types(["SOLVES"]).matches(&e));
        assert!(!EdgeFilter::all().with_types(["CAUSES"]).matches(&e));
        assert!(EdgeFilter::all().after("e1").matches(&e));
        assert!(!EdgeFilter::all().after("e2").matches(&e));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("label", "Memory").is_ok());
        assert!(validate_identifier("type", "SOLVES_2").is_ok());
        assert!(validate_identifier("label", "").is_err());
        assert!(validate_identifier("label", "1abc").is_err());
        assert!(validate_identifier("type", "A`) DETACH DELETE n //").is_err());
    }

    #[test]
    fn test_resolve_id_and_merge() {
        let (id, stored) = resolve_id(&props(json!({"id": "m1", "title": "t"}))).unwrap();
        assert_eq!(id, "m1");
        assert_eq!(stored.get("title"), Some(&json!("t")));

        let (generated, stored) = resolve_id(&Properties::new()).unwrap();
        assert_eq!(stored.get("id"), Some(&json!(generated)));
        assert!(resolve_id(&props(json!({"id": 5}))).is_err());

        let mut target = props(json!({"id": "m1", "a": 1, "b": 2}));
        merge_properties(&mut target, &props(json!({"id": "x", "a": null, "c": 3})));
        assert_eq!(target, props(json!({"id": "m1", "b": 2, "c": 3})));
    }

    #[test]
    fn test_traversal_admits() {
        let query = TraversalQuery::new(2).with_min_strength(0.5);
        assert!(query.admits(&edge("e", "CAUSES", 0.5)));
        assert!(!query.admits(&edge("e", "CAUSES", 0.4)));
        assert_eq!(edge("e", "CAUSES", 0.4).other_end("b"), "a");
        assert_eq!(edge("e", "CAUSES", 0.4).strength(), 0.4);
    }
}
