//! Relationship context: raw text plus its structured extraction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How broadly a relationship applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    /// Applies in some cases only.
    Partial,
    /// Applies completely.
    Full,
    /// Applies when stated conditions hold.
    Conditional,
}

impl ContextScope {
    /// Returns all scope variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Partial, Self::Full, Self::Conditional]
    }

    /// Returns the scope as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Full => "full",
            Self::Conditional => "conditional",
        }
    }

    /// Parses a scope from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "partial" => Some(Self::Partial),
            "full" => Some(Self::Full),
            "conditional" => Some(Self::Conditional),
            _ => None,
        }
    }
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured form of a relationship's context text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredContext {
    /// Applicability scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ContextScope>,
    /// Components mentioned (modules, services, files).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    /// Conditions under which the relationship holds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    /// Evidence supporting the relationship.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    /// Temporal qualifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<String>,
    /// Stated exceptions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<String>,
}

impl StructuredContext {
    /// Returns true when nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns true when evidence was extracted.
    #[must_use]
    pub fn has_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }
}

/// Relationship context: original text preserved alongside its structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipContext {
    /// Original free text.
    #[serde(default)]
    pub text: String,
    /// Extracted structure.
    #[serde(flatten)]
    pub structure: StructuredContext,
}

impl RelationshipContext {
    /// Returns true when there is neither text nor structure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.structure.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parse() {
        for scope in ContextScope::all() {
            assert_eq!(ContextScope::parse(scope.as_str()), Some(*scope));
        }
        assert_eq!(ContextScope::parse("Partial "), Some(ContextScope::Partial));
        assert_eq!(ContextScope::parse("sometimes"), None);
    }

    #[test]
    fn test_context_serializes_flat() {
        let context = RelationshipContext {
            text: "fixes it in production".to_string(),
            structure: StructuredContext {
                conditions: vec!["production".to_string()],
                ..StructuredContext::default()
            },
        };
        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["text"], "fixes it in production");
        assert_eq!(json["conditions"][0], "production");
        assert!(json.get("scope").is_none());

        let back: RelationshipContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, context);
    }
}
