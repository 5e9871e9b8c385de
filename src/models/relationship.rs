//! Relationship taxonomy and relationship records.

use super::context::{ContextScope, RelationshipContext, StructuredContext};
use super::graph::{EdgeRecord, Properties};
use super::memory::MemoryId;
use super::validate_unit_interval;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default confidence for new relationships.
pub const DEFAULT_RELATIONSHIP_CONFIDENCE: f64 = 0.8;

/// Default strength lost per day without reinforcement.
pub const DEFAULT_DECAY_RATE: f64 = 0.01;

/// Unique identifier for a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    /// Creates a new relationship ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random relationship ID.
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

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelationshipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RelationshipId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Category grouping of relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipCategory {
    /// Cause and effect.
    Causal,
    /// Problem solving.
    Solution,
    /// Situational applicability.
    Context,
    /// Knowledge building.
    Learning,
    /// Likeness.
    Similarity,
    /// Ordering and dependency.
    Workflow,
    /// Effectiveness and preference.
    Quality,
    /// Versioning.
    Temporal,
}

impl RelationshipCategory {
    /// Returns all categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Causal,
            Self::Solution,
            Self::Context,
            Self::Learning,
            Self::Similarity,
            Self::Workflow,
            Self::Quality,
            Self::Temporal,
        ]
    }

    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Causal => "causal",
            Self::Solution => "solution",
            Self::Context => "context",
            Self::Learning => "learning",
            Self::Similarity => "similarity",
            Self::Workflow => "workflow",
            Self::Quality => "quality",
            Self::Temporal => "temporal",
        }
    }

    /// Returns the relationship types in this category.
    #[must_use]
    pub fn types(self) -> Vec<RelationshipType> {
        RelationshipType::all()
            .iter()
            .copied()
            .filter(|t| t.category() == self)
            .collect()
    }
}

impl fmt::Display for RelationshipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type of relationship between memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    // Causal
    /// Source causes target.
    Causes,
    /// Source triggers target.
    Triggers,
    /// Source leads to target.
    LeadsTo,
    /// Source prevents target.
    Prevents,
    /// Source breaks target.
    Breaks,
    // Solution
    /// Source solves target.
    Solves,
    /// Source addresses target.
    Addresses,
    /// Source is an alternative to target.
    AlternativeTo,
    /// Source improves target.
    Improves,
    /// Source replaces target.
    Replaces,
    // Context
    /// Source occurs in target.
    OccursIn,
    /// Source applies to target.
    AppliesTo,
    /// Source works with target.
    WorksWith,
    /// Source requires target.
    Requires,
    /// Source is used in target.
    UsedIn,
    // Learning
    /// Source builds on target.
    BuildsOn,
    /// Source contradicts target.
    Contradicts,
    /// Source confirms target.
    Confirms,
    /// Source generalizes target.
    Generalizes,
    /// Source specializes target.
    Specializes,
    // Similarity
    /// Source is similar to target.
    SimilarTo,
    /// Source is a variant of target.
    VariantOf,
    /// Source is related to target.
    RelatedTo,
    /// Source is an analogy to target.
    AnalogyTo,
    /// Source is the opposite of target.
    OppositeOf,
    // Workflow
    /// Source follows target.
    Follows,
    /// Source depends on target.
    DependsOn,
    /// Source enables target.
    Enables,
    /// Source blocks target.
    Blocks,
    /// Source runs in parallel to target.
    ParallelTo,
    // Quality
    /// Source is effective for target.
    EffectiveFor,
    /// Source is ineffective for target.
    IneffectiveFor,
    /// Source is preferred over target.
    PreferredOver,
    /// Source is deprecated by target.
    DeprecatedBy,
    /// Source is validated by target.
    ValidatedBy,
    // Temporal
    /// Source is a newer version of target.
    Supersedes,
}

impl RelationshipType {
    /// Returns all relationship type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Causes,
            Self::Triggers,
            Self::LeadsTo,
            Self::Prevents,
            Self::Breaks,
            Self::Solves,
            Self::Addresses,
            Self::AlternativeTo,
            Self::Improves,
            Self::Replaces,
            Self::OccursIn,
            Self::AppliesTo,
            Self::WorksWith,
            Self::Requires,
            Self::UsedIn,
            Self::BuildsOn,
            Self::Contradicts,
            Self::Confirms,
            Self::Generalizes,
            Self::Specializes,
            Self::SimilarTo,
            Self::VariantOf,
            Self::RelatedTo,
            Self::AnalogyTo,
            Self::OppositeOf,
            Self::Follows,
            Self::DependsOn,
            Self::Enables,
            Self::Blocks,
            Self::ParallelTo,
            Self::EffectiveFor,
            Self::IneffectiveFor,
            Self::PreferredOver,
            Self::DeprecatedBy,
            Self::ValidatedBy,
            Self::Supersedes,
        ]
    }

    /// Returns the type name as stored in the graph.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "CAUSES",
            Self::Triggers => "TRIGGERS",
            Self::LeadsTo => "LEADS_TO",
            Self::Prevents => "PREVENTS",
            Self::Breaks => "BREAKS",
            Self::Solves => "SOLVES",
            Self::Addresses => "ADDRESSES",
            Self::AlternativeTo => "ALTERNATIVE_TO",
            Self::Improves => "IMPROVES",
            Self::Replaces => "REPLACES",
            Self::OccursIn => "OCCURS_IN",
            Self::AppliesTo => "APPLIES_TO",
            Self::WorksWith => "WORKS_WITH",
            Self::Requires => "REQUIRES",
            Self::UsedIn => "USED_IN",
            Self::BuildsOn => "BUILDS_ON",
            Self::Contradicts => "CONTRADICTS",
            Self::Confirms => "CONFIRMS",
            Self::Generalizes => "GENERALIZES",
            Self::Specializes => "SPECIALIZES",
            Self::SimilarTo => "SIMILAR_TO",
            Self::VariantOf => "VARIANT_OF",
            Self::RelatedTo => "RELATED_TO",
            Self::AnalogyTo => "ANALOGY_TO",
            Self::OppositeOf => "OPPOSITE_OF",
            Self::Follows => "FOLLOWS",
            Self::DependsOn => "DEPENDS_ON",
            Self::Enables => "ENABLES",
            Self::Blocks => "BLOCKS",
            Self::ParallelTo => "PARALLEL_TO",
            Self::EffectiveFor => "EFFECTIVE_FOR",
            Self::IneffectiveFor => "INEFFECTIVE_FOR",
            Self::PreferredOver => "PREFERRED_OVER",
            Self::DeprecatedBy => "DEPRECATED_BY",
            Self::ValidatedBy => "VALIDATED_BY",
            Self::Supersedes => "SUPERSEDES",
        }
    }

    /// Returns the category this type belongs to.
    #[must_use]
    pub const fn category(&self) -> RelationshipCategory {
        match self {
            Self::Causes | Self::Triggers | Self::LeadsTo | Self::Prevents | Self::Breaks => {
                RelationshipCategory::Causal
            },
            Self::Solves
            | Self::Addresses
            | Self::AlternativeTo
            | Self::Improves
            | Self::Replaces => RelationshipCategory::Solution,
            Self::OccursIn | Self::AppliesTo | Self::WorksWith | Self::Requires | Self::UsedIn => {
                RelationshipCategory::Context
            },
            Self::BuildsOn
            | Self::Contradicts
            | Self::Confirms
            | Self::Generalizes
            | Self::Specializes => RelationshipCategory::Learning,
            Self::SimilarTo
            | Self::VariantOf
            | Self::RelatedTo
            | Self::AnalogyTo
            | Self::OppositeOf => RelationshipCategory::Similarity,
            Self::Follows | Self::DependsOn | Self::Enables | Self::Blocks | Self::ParallelTo => {
                RelationshipCategory::Workflow
            },
            Self::EffectiveFor
            | Self::IneffectiveFor
            | Self::PreferredOver
            | Self::DeprecatedBy
            | Self::ValidatedBy => RelationshipCategory::Quality,
            Self::Supersedes => RelationshipCategory::Temporal,
        }
    }

    /// Strength assigned when the caller gives none.
    #[must_use]
    pub const fn default_strength(&self) -> f64 {
        match self {
            Self::Solves | Self::Supersedes => 0.9,
            Self::Causes
            | Self::Breaks
            | Self::Replaces
            | Self::Requires
            | Self::DependsOn
            | Self::Blocks
            | Self::EffectiveFor
            | Self::DeprecatedBy
            | Self::ValidatedBy => 0.8,
            Self::Triggers
            | Self::Prevents
            | Self::Addresses
            | Self::Improves
            | Self::BuildsOn
            | Self::Confirms
            | Self::VariantOf
            | Self::Follows
            | Self::Enables
            | Self::PreferredOver => 0.7,
            Self::LeadsTo
            | Self::AlternativeTo
            | Self::OccursIn
            | Self::AppliesTo
            | Self::WorksWith
            | Self::UsedIn
            | Self::Contradicts
            | Self::Generalizes
            | Self::Specializes
            | Self::SimilarTo
            | Self::IneffectiveFor => 0.6,
            Self::RelatedTo | Self::AnalogyTo | Self::OppositeOf | Self::ParallelTo => 0.5,
        }
    }

    /// Confidence assigned when the caller gives none.
    #[must_use]
    pub const fn default_confidence(&self) -> f64 {
        DEFAULT_RELATIONSHIP_CONFIDENCE
    }

    /// Returns true when the relation reads the same in both directions.
    ///
    /// Symmetric relationships never take part in cycle detection.
    #[must_use]
    pub const fn is_symmetric(&self) -> bool {
        matches!(
            self,
            Self::AlternativeTo
                | Self::WorksWith
                | Self::Contradicts
                | Self::SimilarTo
                | Self::RelatedTo
                | Self::OppositeOf
                | Self::ParallelTo
        )
    }

    /// Type names of all directed (non-symmetric) relationships.
    #[must_use]
    pub fn directed_type_names() -> Vec<String> {
        Self::all()
            .iter()
            .filter(|t| !t.is_symmetric())
            .map(|t| t.as_str().to_string())
            .collect()
    }

    /// Parses a relationship type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::UnknownType(format!("relationship type '{s}'")))
    }
}

/// A typed, weighted, directed relationship between two memories.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    /// Unique identifier.
    pub id: RelationshipId,
    /// Source memory.
    pub from_id: MemoryId,
    /// Target memory.
    pub to_id: MemoryId,
    /// Relationship type.
    pub rel_type: RelationshipType,
    /// Strength in `[0, 1]`.
    pub strength: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Raw and structured context.
    pub context: RelationshipContext,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last reinforcement (creation counts as one).
    pub last_reinforced: DateTime<Utc>,
    /// Number of reinforcements.
    pub reinforcement_count: u64,
    /// Strength lost per day without reinforcement.
    pub decay_rate: f64,
    /// Supporting validations recorded.
    pub validation_count: u64,
    /// Counter-evidence recorded.
    pub counter_evidence_count: u64,
    /// Last time decay was applied.
    pub last_decayed: Option<DateTime<Utc>>,
    /// Set when decay pushed strength under the review threshold.
    pub flagged_for_review: bool,
}

/// Edge property layout for relationships.
#[derive(Serialize, Deserialize)]
struct StoredRelationship {
    id: RelationshipId,
    strength: f64,
    confidence: f64,
    #[serde(default)]
    context: String,
    #[serde(default, skip_serializing_if = "StructuredContext::is_empty")]
    context_structured: StructuredContext,
    created_at: DateTime<Utc>,
    last_reinforced: DateTime<Utc>,
    #[serde(default)]
    reinforcement_count: u64,
    decay_rate: f64,
    #[serde(default)]
    validation_count: u64,
    #[serde(default)]
    counter_evidence_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_decayed: Option<DateTime<Utc>>,
    #[serde(default)]
    flagged_for_review: bool,
}

impl Relationship {
    /// Converts the relationship into edge properties.
    pub fn to_properties(&self) -> Result<Properties> {
        let stored = StoredRelationship {
            id: self.id.clone(),
            strength: self.strength,
            confidence: self.confidence,
            context: self.context.text.clone(),
            context_structured: self.context.structure.clone(),
            created_at: self.created_at,
            last_reinforced: self.last_reinforced,
            reinforcement_count: self.reinforcement_count,
            decay_rate: self.decay_rate,
            validation_count: self.validation_count,
            counter_evidence_count: self.counter_evidence_count,
            last_decayed: self.last_decayed,
            flagged_for_review: self.flagged_for_review,
        };
        match serde_json::to_value(stored) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::OperationFailed {
                operation: "serialize_relationship".to_string(),
                cause: "relationship did not serialize to an object".to_string(),
            }),
            Err(e) => Err(Error::OperationFailed {
                operation: "serialize_relationship".to_string(),
                cause: e.to_string(),
            }),
        }
    }

    /// Reads a relationship back from a stored edge.
    pub fn from_edge(edge: &EdgeRecord) -> Result<Self> {
        let rel_type = RelationshipType::parse(&edge.rel_type)
            .ok_or_else(|| Error::UnknownType(format!("relationship type '{}'", edge.rel_type)))?;
        let mut properties = edge.properties.clone();
        properties
            .entry("id")
            .or_insert_with(|| serde_json::Value::String(edge.id.clone()));
        let stored: StoredRelationship =
            serde_json::from_value(serde_json::Value::Object(properties)).map_err(|e| {
                Error::OperationFailed {
                    operation: "deserialize_relationship".to_string(),
                    cause: format!("edge {}: {e}", edge.id),
                }
            })?;
        Ok(Self {
            id: stored.id,
            from_id: MemoryId::new(edge.from_id.clone()),
            to_id: MemoryId::new(edge.to_id.clone()),
            rel_type,
            strength: stored.strength,
            confidence: stored.confidence,
            context: RelationshipContext {
                text: stored.context,
                structure: stored.context_structured,
            },
            created_at: stored.created_at,
            last_reinforced: stored.last_reinforced,
            reinforcement_count: stored.reinforcement_count,
            decay_rate: stored.decay_rate,
            validation_count: stored.validation_count,
            counter_evidence_count: stored.counter_evidence_count,
            last_decayed: stored.last_decayed,
            flagged_for_review: stored.flagged_for_review,
        })
    }
}

/// Request to create a relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelationship {
    /// Source memory.
    pub from_id: MemoryId,
    /// Target memory.
    pub to_id: MemoryId,
    /// Relationship type name, validated against the taxonomy.
    pub rel_type: String,
    /// Strength; the type default when absent.
    pub strength: Option<f64>,
    /// Confidence; the type default when absent.
    pub confidence: Option<f64>,
    /// Free-text context.
    pub context: Option<String>,
    /// Decay rate; [`DEFAULT_DECAY_RATE`] when absent.
    pub decay_rate: Option<f64>,
    /// Permit a second relationship with the same pair and type.
    pub allow_duplicate: bool,
}

impl NewRelationship {
    /// Creates a request for a known type.
    #[must_use]
    pub fn new(
        from_id: impl Into<MemoryId>,
        to_id: impl Into<MemoryId>,
        rel_type: RelationshipType,
    ) -> Self {
        Self::named(from_id, to_id, rel_type.as_str())
    }

    /// Creates a request from a type name, validated at creation time.
    #[must_use]
    pub fn named(
        from_id: impl Into<MemoryId>,
        to_id: impl Into<MemoryId>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            rel_type: rel_type.into(),
            strength: None,
            confidence: None,
            context: None,
            decay_rate: None,
            allow_duplicate: false,
        }
    }

    /// Sets the strength.
    #[must_use]
    pub const fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the context text.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Sets the decay rate.
    #[must_use]
    pub const fn with_decay_rate(mut self, decay_rate: f64) -> Self {
        self.decay_rate = Some(decay_rate);
        self
    }

    /// Permits duplicates of the same pair and type.
    #[must_use]
    pub const fn allowing_duplicate(mut self) -> Self {
        self.allow_duplicate = true;
        self
    }

    /// Resolves the type and validates property ranges.
    pub fn validate(&self) -> Result<RelationshipType> {
        let rel_type = self.rel_type.parse::<RelationshipType>()?;
        if let Some(strength) = self.strength {
            validate_unit_interval("strength", strength)?;
        }
        if let Some(confidence) = self.confidence {
            validate_unit_interval("confidence", confidence)?;
        }
        if let Some(rate) = self.decay_rate
            && !(rate.is_finite() && rate >= 0.0)
        {
            return Err(Error::Validation(format!(
                "decay_rate must be a non-negative number, got {rate}"
            )));
        }
        Ok(rel_type)
    }
}

/// Structured relationship search.
///
/// Different fields combine with AND; entries within a list field combine
/// with OR. List membership is a case-insensitive substring match against the
/// extracted values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipQuery {
    /// Restrict to these types.
    pub rel_types: Vec<RelationshipType>,
    /// Required scope.
    pub scope: Option<ContextScope>,
    /// Any of these conditions.
    pub conditions: Vec<String>,
    /// Any of these evidence entries.
    pub evidence: Vec<String>,
    /// Any of these components.
    pub components: Vec<String>,
    /// Temporal qualifier substring.
    pub temporal: Option<String>,
    /// Require (or forbid) extracted evidence.
    pub has_evidence: Option<bool>,
    /// Minimum strength.
    pub min_strength: Option<f64>,
    /// Maximum results.
    pub limit: Option<usize>,
}

impl RelationshipQuery {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given types.
    #[must_use]
    pub fn with_types(mut self, types: impl IntoIterator<Item = RelationshipType>) -> Self {
        self.rel_types.extend(types);
        self
    }

    /// Requires a scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: ContextScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Adds condition alternatives.
    #[must_use]
    pub fn with_conditions<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.extend(conditions.into_iter().map(Into::into));
        self
    }

    /// Adds evidence alternatives.
    #[must_use]
    pub fn with_evidence<I, S>(mut self, evidence: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evidence.extend(evidence.into_iter().map(Into::into));
        self
    }

    /// Adds component alternatives.
    #[must_use]
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components.extend(components.into_iter().map(Into::into));
        self
    }

    /// Requires evidence to be present or absent.
    #[must_use]
    pub const fn with_has_evidence(mut self, has_evidence: bool) -> Self {
        self.has_evidence = Some(has_evidence);
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates the query against a relationship.
    #[must_use]
    pub fn matches(&self, relationship: &Relationship) -> bool {
        let structure = &relationship.context.structure;
        (self.rel_types.is_empty() || self.rel_types.contains(&relationship.rel_type))
            && self.scope.is_none_or(|scope| structure.scope == Some(scope))
            && any_member(&self.conditions, &structure.conditions)
            && any_member(&self.evidence, &structure.evidence)
            && any_member(&self.components, &structure.components)
            && self.temporal.as_ref().is_none_or(|wanted| {
                structure
                    .temporal
                    .as_ref()
                    .is_some_and(|t| contains_ignore_case(t, wanted))
            })
            && self
                .has_evidence
                .is_none_or(|wanted| structure.has_evidence() == wanted)
            && self
                .min_strength
                .is_none_or(|min| relationship.strength >= min)
    }
}

fn any_member(wanted: &[String], actual: &[String]) -> bool {
    wanted.is_empty()
        || wanted
            .iter()
            .any(|w| actual.iter().any(|a| contains_ignore_case(a, w)))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(needle.trim().to_lowercase().as_str())
}
