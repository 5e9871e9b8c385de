//! Memory types and identifiers.

use super::graph::{NodeRecord, Properties};
use super::validate_unit_interval;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node label under which memories are stored.
pub const MEMORY_LABEL: &str = "Memory";

/// Default importance for new memories.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Default confidence for new memories.
pub const DEFAULT_MEMORY_CONFIDENCE: f64 = 0.8;

/// Unique identifier for a memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a new memory ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random memory ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of knowledge a memory captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A unit of work.
    Task,
    /// A reusable code pattern.
    CodePattern,
    /// A problem that was encountered.
    Problem,
    /// A solution to a problem.
    Solution,
    /// A project description.
    Project,
    /// A technology, library, or tool.
    Technology,
    /// An error message or failure.
    Error,
    /// A fix applied to an error.
    Fix,
    /// A shell or tool command.
    Command,
    /// Context about a specific file.
    FileContext,
    /// A multi-step workflow.
    Workflow,
    /// Anything else.
    General,
    /// A conversation excerpt.
    Conversation,
}

impl MemoryType {
    /// Returns all memory type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Task,
            Self::CodePattern,
            Self::Problem,
            Self::Solution,
            Self::Project,
            Self::Technology,
            Self::Error,
            Self::Fix,
            Self::Command,
            Self::FileContext,
            Self::Workflow,
            Self::General,
            Self::Conversation,
        ]
    }

    /// Returns the memory type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::CodePattern => "code_pattern",
            Self::Problem => "problem",
            Self::Solution => "solution",
            Self::Project => "project",
            Self::Technology => "technology",
            Self::Error => "error",
            Self::Fix => "fix",
            Self::Command => "command",
            Self::FileContext => "file_context",
            Self::Workflow => "workflow",
            Self::General => "general",
            Self::Conversation => "conversation",
        }
    }

    /// Parses a memory type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::UnknownType(format!("memory type '{s}'")))
    }
}

/// Structured context describing where a memory came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryContext {
    /// Project root path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// Files involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Programming languages involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Frameworks involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,
    /// Session that produced the memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// User that produced the memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Free-form additional entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

impl MemoryContext {
    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A stored knowledge unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// Kind of memory.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Short title.
    pub title: String,
    /// Full content.
    pub content: String,
    /// Optional summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Tags, sorted and deduplicated.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Observed effectiveness in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<f64>,
    /// Number of recorded accesses.
    #[serde(default)]
    pub usage_count: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Last access timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Origin context.
    #[serde(default, skip_serializing_if = "MemoryContext::is_empty")]
    pub context: MemoryContext,
    /// False once a newer version supersedes this memory.
    #[serde(default = "default_true")]
    pub is_current: bool,
    /// Version number, starting at 1.
    #[serde(default = "default_version")]
    pub version: u32,
}

const fn default_true() -> bool {
    true
}

const fn default_version() -> u32 {
    1
}

impl Memory {
    /// Converts the memory into a driver property map.
    pub fn to_properties(&self) -> Result<Properties> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::OperationFailed {
                operation: "serialize_memory".to_string(),
                cause: format!("expected object, got {other}"),
            }),
            Err(e) => Err(Error::OperationFailed {
                operation: "serialize_memory".to_string(),
                cause: e.to_string(),
            }),
        }
    }

    /// Reads a memory back from a stored node.
    pub fn from_node(node: &NodeRecord) -> Result<Self> {
        let mut properties = node.properties.clone();
        properties
            .entry("id")
            .or_insert_with(|| serde_json::Value::String(node.id.clone()));
        serde_json::from_value(serde_json::Value::Object(properties)).map_err(|e| {
            Error::OperationFailed {
                operation: "deserialize_memory".to_string(),
                cause: format!("node {}: {e}", node.id),
            }
        })
    }
}

/// Request to create a memory.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    /// Explicit id; generated when absent.
    pub id: Option<MemoryId>,
    /// Kind of memory.
    pub memory_type: MemoryType,
    /// Short title.
    pub title: String,
    /// Full content.
    pub content: String,
    /// Optional summary.
    pub summary: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Effectiveness in `[0, 1]`.
    pub effectiveness: Option<f64>,
    /// Origin context.
    pub context: MemoryContext,
}

impl NewMemory {
    /// Creates a request with default scores.
    #[must_use]
    pub fn new(memory_type: MemoryType, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            memory_type,
            title: title.into(),
            content: content.into(),
            summary: None,
            tags: Vec::new(),
            importance: DEFAULT_IMPORTANCE,
            confidence: DEFAULT_MEMORY_CONFIDENCE,
            effectiveness: None,
            context: MemoryContext::default(),
        }
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MemoryId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Adds tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets importance.
    #[must_use]
    pub const fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Sets confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets effectiveness.
    #[must_use]
    pub const fn with_effectiveness(mut self, effectiveness: f64) -> Self {
        self.effectiveness = Some(effectiveness);
        self
    }

    /// Sets the origin context.
    #[must_use]
    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = context;
        self
    }

    /// Validates ranges and required fields.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("memory title must not be empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Validation(
                "memory content must not be empty".to_string(),
            ));
        }
        validate_unit_interval("importance", self.importance)?;
        validate_unit_interval("confidence", self.confidence)?;
        if let Some(effectiveness) = self.effectiveness {
            validate_unit_interval("effectiveness", effectiveness)?;
        }
        Ok(())
    }

    /// Builds the stored memory, stamping timestamps and normalizing tags.
    #[must_use]
    pub fn into_memory(self, now: DateTime<Utc>) -> Memory {
        Memory {
            id: self.id.unwrap_or_else(MemoryId::generate),
            memory_type: self.memory_type,
            title: self.title.trim().to_string(),
            content: self.content,
            summary: self.summary,
            tags: normalize_tags(self.tags),
            importance: self.importance,
            confidence: self.confidence,
            effectiveness: self.effectiveness,
            usage_count: 0,
            created_at: now,
            updated_at: now,
            last_accessed: None,
            context: self.context,
            is_current: true,
            version: 1,
        }
    }
}

/// Partial update of a memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryUpdate {
    /// New title.
    pub title: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New summary.
    pub summary: Option<String>,
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
    /// New importance.
    pub importance: Option<f64>,
    /// New confidence.
    pub confidence: Option<f64>,
    /// New effectiveness.
    pub effectiveness: Option<f64>,
    /// Replacement context.
    pub context: Option<MemoryContext>,
    /// Store the result as a new version linked to the prior one.
    pub supersede: bool,
}

impl MemoryUpdate {
    /// Validates score ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title
            && title.trim().is_empty()
        {
            return Err(Error::Validation("memory title must not be empty".to_string()));
        }
        if let Some(v) = self.importance {
            validate_unit_interval("importance", v)?;
        }
        if let Some(v) = self.confidence {
            validate_unit_interval("confidence", v)?;
        }
        if let Some(v) = self.effectiveness {
            validate_unit_interval("effectiveness", v)?;
        }
        Ok(())
    }

    /// Applies the update onto a memory, bumping `updated_at`.
    pub fn apply_to(&self, memory: &mut Memory, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            memory.title = title.trim().to_string();
        }
        if let Some(content) = &self.content {
            memory.content.clone_from(content);
        }
        if let Some(summary) = &self.summary {
            memory.summary = Some(summary.clone());
        }
        if let Some(tags) = &self.tags {
            memory.tags = normalize_tags(tags.clone());
        }
        if let Some(v) = self.importance {
            memory.importance = v;
        }
        if let Some(v) = self.confidence {
            memory.confidence = v;
        }
        if let Some(v) = self.effectiveness {
            memory.effectiveness = Some(v);
        }
        if let Some(context) = &self.context {
            memory.context = context.clone();
        }
        memory.updated_at = now;
    }
}

/// Memory search criteria.
///
/// Different fields combine with AND; entries within `memory_types` and
/// `tags` combine with OR.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySearch {
    /// Full-text query over title, content, and summary.
    pub query: Option<String>,
    /// Restrict to these memory types.
    pub memory_types: Vec<MemoryType>,
    /// Match memories carrying any of these tags.
    pub tags: Vec<String>,
    /// Minimum importance.
    pub min_importance: Option<f64>,
    /// Exclude superseded memories.
    pub current_only: bool,
    /// Maximum results.
    pub limit: usize,
}

impl Default for MemorySearch {
    fn default() -> Self {
        Self {
            query: None,
            memory_types: Vec::new(),
            tags: Vec::new(),
            min_importance: None,
            current_only: true,
            limit: 20,
        }
    }
}

impl MemorySearch {
    /// Creates a full-text search.
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// Restricts to the given memory types.
    #[must_use]
    pub fn with_types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.memory_types.extend(types);
        self
    }

    /// Restricts to memories with any of the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the minimum importance.
    #[must_use]
    pub const fn with_min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Includes superseded memories.
    #[must_use]
    pub const fn including_superseded(mut self) -> Self {
        self.current_only = false;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Trims, lowercases, deduplicates, and sorts tags.
#[must_use]
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_roundtrip() {
        for t in MemoryType::all() {
            assert_eq!(MemoryType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(MemoryType::parse("Code-Pattern"), Some(MemoryType::CodePattern));
        assert!("bogus".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " Rust ".to_string(),
            "async".to_string(),
            "rust".to_string(),
            String::new(),
        ]);
        assert_eq!(tags, vec!["async".to_string(), "rust".to_string()]);
    }

    #[test]
    fn test_new_memory_validation() {
        let ok = NewMemory::new(MemoryType::Problem, "Title", "Body");
        assert!(ok.validate().is_ok());

        let empty_title = NewMemory::new(MemoryType::Problem, "  ", "Body");
        assert!(empty_title.validate().is_err());

        let bad_importance = NewMemory::new(MemoryType::Problem, "T", "B").with_importance(1.5);
        assert!(matches!(bad_importance.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_properties_roundtrip() {
        let memory = NewMemory::new(MemoryType::Solution, "Retry", "Use backoff")
            .with_tags(["net", "retry"])
            .with_summary("retry it")
            .into_memory(Utc::now());
        let properties = memory.to_properties().unwrap();
        assert_eq!(properties["type"], "solution");

        let node = NodeRecord {
            id: memory.id.to_string(),
            label: MEMORY_LABEL.to_string(),
            properties,
        };
        assert_eq!(Memory::from_node(&node).unwrap(), memory);
    }

    #[test]
    fn test_update_apply() {
        let now = Utc::now();
        let mut memory = NewMemory::new(MemoryType::Problem, "Old", "Body").into_memory(now);
        let update = MemoryUpdate {
            title: Some("New".to_string()),
            importance: Some(0.9),
            ..MemoryUpdate::default()
        };
        update.apply_to(&mut memory, now);
        assert_eq!(memory.title, "New");
        assert!((memory.importance - 0.9).abs() < f64::EPSILON);
    }
}
