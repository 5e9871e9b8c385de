//! Natural-language relationship context extraction.
//!
//! Maps free text such as
//! `"partially fixes the timeout in production, verified by integration tests"`
//! to a [`StructuredContext`] (`scope: partial`, `conditions: [production]`,
//! `evidence: [integration tests]`).
//!
//! Extraction is driven by an ordered rule table; each rule pairs a pattern
//! with the field its captures feed. Exception clauses are matched first and
//! blanked out so their conditions are not reported twice.

use crate::models::{ContextScope, RelationshipContext, StructuredContext};
use regex::Regex;
use std::sync::LazyLock;

/// Target field of an extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Scope(ContextScope),
    Components,
    Conditions,
    Evidence,
    Temporal,
    Exceptions,
}

struct Rule {
    field: Field,
    pattern: Regex,
}

/// Terminates a clause capture: a comma, semicolon, sentence end, or the end
/// of input.
const CLAUSE_END: &str = r"\s*(?:[,;]|\.(?:\s|$)|$)";

const COMPONENT_KINDS: &str = "module|service|component|api|layer|library|class|function|package|crate|endpoint|handler|database|cache|queue|worker|client|server";

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let clause = |lead: &str| format!(r"\b(?:{lead})\s+([^,;]+?){CLAUSE_END}");
    [
        (
            Field::Exceptions,
            clause(r"except(?:\s+(?:for|when|in|if))?|unless|excluding|other than|but not(?:\s+(?:for|when|in))?"),
        ),
        (
            Field::Scope(ContextScope::Conditional),
            r"\b(?:only (?:if|when)|conditional(?:ly)?|depending on|provided that)\b".to_string(),
        ),
        (
            Field::Scope(ContextScope::Partial),
            r"\b(?:partial(?:ly)?|in part|some cases|sometimes|somewhat|mostly)\b".to_string(),
        ),
        (
            Field::Scope(ContextScope::Full),
            r"\b(?:fully|full|completely|complete|entirely|always|all cases|totally)\b".to_string(),
        ),
        (
            Field::Conditions,
            clause(r"(?:only\s+)?(?:when|if|while|during|under|provided that)"),
        ),
        (
            Field::Conditions,
            r"\b(?:in|on)\s+(production|prod|staging|development|dev|testing|test|ci|local|windows|linux|macos)\b"
                .to_string(),
        ),
        (
            Field::Evidence,
            clause(r"(?:verified|confirmed|validated|proven|tested|shown|demonstrated|measured)\s+(?:by|in|with|through|via|using)"),
        ),
        (
            Field::Evidence,
            clause(r"according to|based on|evidenced by"),
        ),
        (
            Field::Components,
            format!(r"\b(?:the\s+|a\s+|an\s+)?([a-z0-9_./-]+\s+(?:{COMPONENT_KINDS}))\b"),
        ),
        (
            Field::Components,
            r"\b([a-z0-9_/-]+\.(?:rs|py|ts|tsx|js|go|java|rb|toml|json|yaml|yml|sql))\b".to_string(),
        ),
        (
            Field::Temporal,
            format!(r"\b((?:since|after|before|until|as of)\s+[^,;]+?){CLAUSE_END}"),
        ),
        (
            Field::Temporal,
            r"\b(temporarily|permanently|currently|recently|previously|initially)\b".to_string(),
        ),
    ]
    .into_iter()
    .filter_map(|(field, pattern)| {
        Regex::new(&pattern).ok().map(|pattern| Rule { field, pattern })
    })
    .collect()
});

/// Extracts structured context from free text.
///
/// Never fails: unrecognized text yields an empty structure. The original text
/// is preserved. Text that is itself a serialized [`RelationshipContext`]
/// (a JSON object with a `text` key) is returned as stored.
#[must_use]
pub fn extract_context(text: &str) -> RelationshipContext {
    if let Some(stored) = parse_serialized(text) {
        return stored;
    }
    RelationshipContext {
        text: text.to_string(),
        structure: extract_structure(text),
    }
}

fn parse_serialized(text: &str) -> Option<RelationshipContext> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    if !value.get("text").is_some_and(serde_json::Value::is_string) {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn extract_structure(text: &str) -> StructuredContext {
    let mut structure = StructuredContext::default();
    if text.trim().is_empty() {
        return structure;
    }

    let mut remaining = text.to_lowercase();
    let mut scope_at: Option<usize> = None;

    for rule in RULES.iter() {
        if let Field::Scope(scope) = rule.field {
            if let Some(found) = rule.pattern.find(&remaining)
                && scope_at.is_none_or(|at| found.start() < at)
            {
                scope_at = Some(found.start());
                structure.scope = Some(scope);
            }
            continue;
        }

        let mut spans = Vec::new();
        for captures in rule.pattern.captures_iter(&remaining) {
            let Some(value) = captures.get(1).or_else(|| captures.get(0)) else {
                continue;
            };
            if let Some(whole) = captures.get(0) {
                spans.push(whole.range());
            }
            record(&mut structure, rule.field, value.as_str());
        }

        if rule.field == Field::Exceptions {
            for span in spans {
                remaining.replace_range(span.clone(), &" ".repeat(span.len()));
            }
        }
    }
    structure
}

fn record(structure: &mut StructuredContext, field: Field, raw: &str) {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return;
    }
    let target = match field {
        Field::Components => &mut structure.components,
        Field::Conditions => &mut structure.conditions,
        Field::Evidence => &mut structure.evidence,
        Field::Exceptions => &mut structure.exceptions,
        Field::Temporal => {
            if structure.temporal.is_none() {
                structure.temporal = Some(value);
            }
            return;
        },
        Field::Scope(_) => return,
    };
    if !target.contains(&value) {
        target.push(value);
    }
}
