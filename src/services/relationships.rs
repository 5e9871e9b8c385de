//! Relationship engine: creation with validation, reinforcement, and decay.
//!
//! # Creation
//!
//! ```text
//! validate type + ranges ──> endpoints exist ──> not a duplicate ──> no cycle
//!        │                                                             │
//!   UnknownType / Validation   NotFound       Duplicate     CycleDetected
//!                                                                      v
//!                               defaults + context extraction ──> store
//! ```
//!
//! The check-then-insert sequence runs under one engine-level writer lock, so
//! two concurrent creations cannot both pass the duplicate or cycle check.
//!
//! # Weight Lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | reinforce | `strength += (1 - strength) * k`, same for confidence |
//! | supporting evidence | `confidence += (1 - confidence) * k` |
//! | counter-evidence | `confidence -= confidence * k` |
//! | decay sweep | `strength -= decay_rate * elapsed_days`, floored at 0 |

use crate::config::{DecaySettings, MemoryGraphConfig, RelationshipSettings};
use crate::models::{
    Direction, EdgeFilter, MemoryId, NewRelationship, Relationship, RelationshipId,
    RelationshipQuery, RelationshipType,
};
use crate::services::context_extraction::extract_context;
use crate::storage::{GraphDriver, acquire_lock};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Page size used when scanning every relationship.
const SCAN_PAGE: usize = 500;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Result of one decay batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecayBatch {
    /// Relationships examined.
    pub processed: usize,
    /// Relationships whose strength dropped.
    pub weakened: usize,
    /// Relationships newly flagged for review.
    pub flagged: usize,
    /// Cursor for the next batch; `None` once the sweep is complete.
    pub next_cursor: Option<String>,
}

/// Totals of a decay sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecayReport {
    /// Batches run.
    pub batches: usize,
    /// Relationships examined.
    pub processed: usize,
    /// Relationships whose strength dropped.
    pub weakened: usize,
    /// Relationships newly flagged for review.
    pub flagged: usize,
    /// False when the sweep was cancelled before the last batch.
    pub completed: bool,
}

impl DecayReport {
    /// Folds one batch into the totals.
    pub fn absorb(&mut self, batch: &DecayBatch) {
        self.batches += 1;
        self.processed += batch.processed;
        self.weakened += batch.weakened;
        self.flagged += batch.flagged;
    }
}

/// Outcome of decaying one relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayOutcome {
    /// Reinforced within the window, or no time has elapsed.
    Untouched,
    /// Strength dropped; `flagged` when the review flag was newly set.
    Weakened {
        /// Review flag newly set.
        flagged: bool,
    },
}

/// Returns `value` moved toward 1 by fraction `factor` of its headroom.
#[must_use]
pub fn reinforced(value: f64, factor: f64) -> f64 {
    value.mul_add(1.0 - factor, factor).clamp(0.0, 1.0)
}

/// Returns the strength after decaying for `elapsed_days`.
///
/// Never negative.
#[must_use]
pub fn decayed_strength(strength: f64, decay_rate: f64, elapsed_days: f64) -> f64 {
    if elapsed_days <= 0.0 || decay_rate <= 0.0 {
        return strength;
    }
    decay_rate.mul_add(-elapsed_days, strength).clamp(0.0, 1.0)
}

/// Applies one decay step to `relationship` at `now`.
///
/// Relationships reinforced within the window are untouched. Otherwise the
/// elapsed time is measured from the later of `last_reinforced` and
/// `last_decayed`.
pub fn apply_decay(
    relationship: &mut Relationship,
    now: DateTime<Utc>,
    settings: &DecaySettings,
) -> DecayOutcome {
    let window = chrono::Duration::days(i64::from(settings.window_days));
    if now - relationship.last_reinforced < window {
        return DecayOutcome::Untouched;
    }
    let reference = relationship
        .last_decayed
        .map_or(relationship.last_reinforced, |decayed| {
            decayed.max(relationship.last_reinforced)
        });
    #[allow(clippy::cast_precision_loss)]
    let elapsed_days = (now - reference).num_seconds() as f64 / SECONDS_PER_DAY;
    let strength = decayed_strength(relationship.strength, relationship.decay_rate, elapsed_days);
    if strength >= relationship.strength {
        return DecayOutcome::Untouched;
    }

    relationship.strength = strength;
    relationship.last_decayed = Some(now);
    let flagged = !relationship.flagged_for_review && strength < settings.review_threshold;
    if flagged {
        relationship.flagged_for_review = true;
    }
    DecayOutcome::Weakened { flagged }
}

/// Creates, reinforces, decays, and queries relationships.
pub struct RelationshipEngine {
    driver: Arc<dyn GraphDriver>,
    settings: RelationshipSettings,
    decay: DecaySettings,
    writer: Mutex<()>,
}

impl RelationshipEngine {
    /// Creates an engine over a connected driver.
    #[must_use]
    pub fn new(
        driver: Arc<dyn GraphDriver>,
        settings: RelationshipSettings,
        decay: DecaySettings,
    ) -> Self {
        Self {
            driver,
            settings,
            decay,
            writer: Mutex::new(()),
        }
    }

    /// Creates an engine with settings taken from configuration.
    #[must_use]
    pub fn from_config(driver: Arc<dyn GraphDriver>, config: &MemoryGraphConfig) -> Self {
        Self::new(driver, config.relationships.clone(), config.decay.clone())
    }

    /// Returns the decay settings.
    #[must_use]
    pub const fn decay_settings(&self) -> &DecaySettings {
        &self.decay
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Creates a relationship.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownType`] or [`Error::Validation`] for bad input
    /// - [`Error::NotFound`] when either memory is missing
    /// - [`Error::Duplicate`] when the pair already has this type
    /// - [`Error::CycleDetected`] when cycles are prevented and the edge would
    ///   close one
    #[instrument(
        skip(self, request),
        fields(from = %request.from_id, to = %request.to_id, rel_type = %request.rel_type)
    )]
    pub fn create(&self, request: NewRelationship) -> Result<Relationship> {
        let rel_type = request.validate()?;
        let _writer = acquire_lock(&self.writer);

        for id in [&request.from_id, &request.to_id] {
            if self.driver.get_node(id.as_str())?.is_none() {
                return Err(Error::memory_not_found(id.as_str()));
            }
        }

        if !request.allow_duplicate {
            self.check_duplicate(&request.from_id, &request.to_id, rel_type)?;
        }
        if self.settings.prevent_cycles && !rel_type.is_symmetric() {
            self.check_cycle(&request.from_id, &request.to_id, rel_type)?;
        }

        let now = Utc::now();
        let relationship = Relationship {
            id: RelationshipId::generate(),
            from_id: request.from_id,
            to_id: request.to_id,
            rel_type,
            strength: request
                .strength
                .unwrap_or_else(|| rel_type.default_strength()),
            confidence: request
                .confidence
                .unwrap_or_else(|| rel_type.default_confidence()),
            context: extract_context(request.context.as_deref().unwrap_or_default()),
            created_at: now,
            last_reinforced: now,
            reinforcement_count: 0,
            decay_rate: request
                .decay_rate
                .unwrap_or(crate::models::DEFAULT_DECAY_RATE),
            validation_count: 0,
            counter_evidence_count: 0,
            last_decayed: None,
            flagged_for_review: false,
        };

        self.driver.store_relationship(
            relationship.from_id.as_str(),
            relationship.to_id.as_str(),
            rel_type.as_str(),
            &relationship.to_properties()?,
        )?;

        metrics::counter!(
            "relationships_created_total",
            "type" => rel_type.as_str(),
            "category" => rel_type.category().as_str()
        )
        .increment(1);
        tracing::debug!(id = %relationship.id, strength = relationship.strength, "Created relationship");
        Ok(relationship)
    }

    fn check_duplicate(&self, from: &MemoryId, to: &MemoryId, rel_type: RelationshipType) -> Result<()> {
        let mut pairs = vec![(from, to)];
        if rel_type.is_symmetric() {
            pairs.push((to, from));
        }
        for (a, b) in pairs {
            let filter = EdgeFilter::between(a.as_str(), b.as_str())
                .with_types([rel_type.as_str()])
                .with_limit(1);
            if !self.driver.query_relationships(&filter)?.is_empty() {
                metrics::counter!("relationship_duplicates_rejected_total").increment(1);
                return Err(Error::Duplicate(format!(
                    "relationship {from} -[{rel_type}]-> {to} already exists"
                )));
            }
        }
        Ok(())
    }

    /// Rejects `from -> to` when `from` is already reachable from `to` over
    /// directed relationships. A self-loop is a cycle.
    fn check_cycle(&self, from: &MemoryId, to: &MemoryId, rel_type: RelationshipType) -> Result<()> {
        let directed = RelationshipType::directed_type_names();
        let closes_cycle = from == to
            || self
                .driver
                .path_exists(to.as_str(), from.as_str(), Some(&directed))?;
        if closes_cycle {
            metrics::counter!("relationship_cycles_rejected_total").increment(1);
            tracing::info!(%from, %to, %rel_type, "Rejected relationship closing a cycle");
            return Err(Error::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
                rel_type: rel_type.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Fetches a relationship.
    ///
    /// # Errors
    ///
    /// Returns a driver error, or [`Error::OperationFailed`] for a stored edge
    /// that does not decode.
    pub fn get(&self, id: &str) -> Result<Option<Relationship>> {
        self.driver
            .get_relationship(id)?
            .map(|edge| Relationship::from_edge(&edge))
            .transpose()
    }

    fn require(&self, id: &str) -> Result<Relationship> {
        self.get(id)?
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    /// Deletes a relationship. Returns `false` when it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _writer = acquire_lock(&self.writer);
        let deleted = self.driver.delete_relationship(id)?;
        if deleted {
            metrics::counter!("relationships_deleted_total").increment(1);
        }
        Ok(deleted)
    }

    /// Lists the relationships touching a memory, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown memory.
    pub fn relationships_of(&self, memory_id: &str, direction: Direction) -> Result<Vec<Relationship>> {
        if self.driver.get_node(memory_id)?.is_none() {
            return Err(Error::memory_not_found(memory_id));
        }
        let mut edges = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            edges.extend(self.driver.query_relationships(&EdgeFilter::outgoing(memory_id))?);
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            edges.extend(self.driver.query_relationships(&EdgeFilter::incoming(memory_id))?);
        }
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges.dedup_by(|a, b| a.id == b.id);
        edges.iter().map(Relationship::from_edge).collect()
    }

    // ========================================================================
    // Weights
    // ========================================================================

    /// Strengthens a relationship after it proved useful.
    ///
    /// Clears the review flag once strength is back at or above the review
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    #[instrument(skip(self))]
    pub fn reinforce(&self, id: &str) -> Result<Relationship> {
        let _writer = acquire_lock(&self.writer);
        let mut relationship = self.require(id)?;
        let k = self.settings.reinforcement_factor;
        relationship.strength = reinforced(relationship.strength, k);
        relationship.confidence = reinforced(relationship.confidence, k);
        relationship.reinforcement_count = relationship.reinforcement_count.saturating_add(1);
        relationship.last_reinforced = Utc::now();
        if relationship.strength >= self.decay.review_threshold {
            relationship.flagged_for_review = false;
        }
        self.persist(&relationship)?;
        metrics::counter!("relationships_reinforced_total").increment(1);
        Ok(relationship)
    }

    /// Records supporting evidence or counter-evidence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    #[instrument(skip(self))]
    pub fn record_validation(&self, id: &str, supports: bool) -> Result<Relationship> {
        let _writer = acquire_lock(&self.writer);
        let mut relationship = self.require(id)?;
        let k = self.settings.reinforcement_factor;
        if supports {
            relationship.validation_count = relationship.validation_count.saturating_add(1);
            relationship.confidence = reinforced(relationship.confidence, k);
        } else {
            relationship.counter_evidence_count =
                relationship.counter_evidence_count.saturating_add(1);
            relationship.confidence = (relationship.confidence * (1.0 - k)).max(0.0);
        }
        self.persist(&relationship)?;
        let outcome = if supports { "support" } else { "counter" };
        metrics::counter!("relationship_validations_total", "outcome" => outcome).increment(1);
        Ok(relationship)
    }

    fn persist(&self, relationship: &Relationship) -> Result<()> {
        self.driver
            .update_relationship(relationship.id.as_str(), &relationship.to_properties()?)?;
        Ok(())
    }

    // ========================================================================
    // Decay
    // ========================================================================

    /// Decays one batch of relationships with ids after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns a driver error; relationships updated before the error keep
    /// their new strength.
    #[instrument(skip(self), fields(batch_size = self.decay.batch_size))]
    pub fn decay_batch(&self, cursor: Option<&str>, now: DateTime<Utc>) -> Result<DecayBatch> {
        let batch_size = self.decay.batch_size.max(1);
        let mut filter = EdgeFilter::all().with_limit(batch_size);
        if let Some(cursor) = cursor {
            filter = filter.after(cursor);
        }

        let _writer = acquire_lock(&self.writer);
        let edges = self.driver.query_relationships(&filter)?;
        let mut batch = DecayBatch {
            processed: edges.len(),
            next_cursor: (edges.len() == batch_size)
                .then(|| edges.last().map(|e| e.id.clone()))
                .flatten(),
            ..DecayBatch::default()
        };

        for edge in &edges {
            let mut relationship = match Relationship::from_edge(edge) {
                Ok(relationship) => relationship,
                Err(e) => {
                    tracing::warn!(id = %edge.id, error = %e, "Skipping undecodable relationship");
                    continue;
                },
            };
            if let DecayOutcome::Weakened { flagged } =
                apply_decay(&mut relationship, now, &self.decay)
            {
                self.persist(&relationship)?;
                batch.weakened += 1;
                if flagged {
                    batch.flagged += 1;
                }
            }
        }

        metrics::counter!("decay_relationships_weakened_total").increment(batch.weakened as u64);
        metrics::counter!("decay_relationships_flagged_total").increment(batch.flagged as u64);
        Ok(batch)
    }

    /// Runs a complete decay sweep synchronously.
    ///
    /// # Errors
    ///
    /// Returns the first batch error.
    pub fn run_decay(&self, now: DateTime<Utc>) -> Result<DecayReport> {
        let mut report = DecayReport::default();
        let mut cursor: Option<String> = None;
        loop {
            let batch = self.decay_batch(cursor.as_deref(), now)?;
            report.absorb(&batch);
            match batch.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        report.completed = true;
        tracing::info!(
            processed = report.processed,
            weakened = report.weakened,
            flagged = report.flagged,
            "Decay sweep complete"
        );
        Ok(report)
    }

    // ========================================================================
    // Structured Query
    // ========================================================================

    /// Finds relationships by their extracted context.
    ///
    /// Results are ordered by strength (strongest first), then id.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    #[instrument(skip(self, query))]
    pub fn search(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        let types: Vec<&str> = query.rel_types.iter().map(RelationshipType::as_str).collect();
        let mut matches = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut filter = EdgeFilter::all().with_limit(SCAN_PAGE);
            if !types.is_empty() {
                filter = filter.with_types(types.iter().copied());
            }
            if let Some(cursor) = &cursor {
                filter = filter.after(cursor.clone());
            }
            let page = self.driver.query_relationships(&filter)?;
            let full_page = page.len() == SCAN_PAGE;
            cursor = page.last().map(|edge| edge.id.clone());
            for edge in &page {
                match Relationship::from_edge(edge) {
                    Ok(relationship) if query.matches(&relationship) => matches.push(relationship),
                    Ok(_) => {},
                    Err(e) => {
                        tracing::warn!(id = %edge.id, error = %e, "Skipping undecodable relationship");
                    },
                }
            }
            if !full_page {
                break;
            }
        }

        matches.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::models::{MEMORY_LABEL, RelationshipContext};
    use crate::storage::FallbackDriver;
    use serde_json::json;

    fn engine() -> RelationshipEngine {
        let driver = FallbackDriver::in_memory();
        driver.connect().unwrap();
        for id in ["a", "b", "c"] {
            let mut props = crate::models::Properties::new();
            props.insert("id".to_string(), json!(id));
            driver.store_node(MEMORY_LABEL, &props).unwrap();
        }
        RelationshipEngine::new(
            Arc::new(driver),
            RelationshipSettings::default(),
            DecaySettings::default(),
        )
    }

    fn relationship(strength: f64, last_reinforced: DateTime<Utc>) -> Relationship {
        Relationship {
            id: RelationshipId::new("r"),
            from_id: MemoryId::new("a"),
            to_id: MemoryId::new("b"),
            rel_type: RelationshipType::Causes,
            strength,
            confidence: 0.8,
            context: RelationshipContext::default(),
            created_at: last_reinforced,
            last_reinforced,
            reinforcement_count: 0,
            decay_rate: 0.01,
            validation_count: 0,
            counter_evidence_count: 0,
            last_decayed: None,
            flagged_for_review: false,
        }
    }

    #[test]
    fn test_reinforced_approaches_one() {
        assert!((reinforced(0.5, 0.1) - 0.55).abs() < 1e-12);
        assert_eq!(reinforced(1.0, 0.1), 1.0);
        assert_eq!(reinforced(0.0, 1.0), 1.0);
    }

    #[test]
    fn test_decayed_strength_floors_at_zero() {
        assert!((decayed_strength(0.8, 0.01, 10.0) - 0.7).abs() < 1e-12);
        assert_eq!(decayed_strength(0.05, 0.01, 100.0), 0.0);
        assert_eq!(decayed_strength(0.5, 0.01, -3.0), 0.5);
    }

    #[test]
    fn test_apply_decay_respects_window_and_reference() {
        let settings = DecaySettings::default();
        let now = Utc::now();

        let mut fresh = relationship(0.8, now - chrono::Duration::days(3));
        assert_eq!(apply_decay(&mut fresh, now, &settings), DecayOutcome::Untouched);

        let mut stale = relationship(0.8, now - chrono::Duration::days(10));
        assert_eq!(
            apply_decay(&mut stale, now, &settings),
            DecayOutcome::Weakened { flagged: false }
        );
        assert!((stale.strength - 0.7).abs() < 1e-9);
        assert_eq!(stale.last_decayed, Some(now));

        // A second pass at the same instant has nothing left to subtract.
        assert_eq!(apply_decay(&mut stale, now, &settings), DecayOutcome::Untouched);

        let mut weak = relationship(0.15, now - chrono::Duration::days(10));
        assert_eq!(
            apply_decay(&mut weak, now, &settings),
            DecayOutcome::Weakened { flagged: true }
        );
        assert!(weak.flagged_for_review);
    }

    #[test]
    fn test_create_applies_defaults_and_extracts_context() {
        let engine = engine();
        let created = engine
            .create(
                NewRelationship::new("a", "b", RelationshipType::Solves)
                    .with_context("fully fixes it in production"),
            )
            .unwrap();
        assert_eq!(created.strength, 0.9);
        assert_eq!(created.confidence, 0.8);
        assert_eq!(created.decay_rate, crate::models::DEFAULT_DECAY_RATE);
        assert_eq!(created.context.structure.conditions, vec!["production"]);

        let stored = engine.get(created.id.as_str()).unwrap().unwrap();
        assert_eq!(stored, created);
    }

    #[test]
    fn test_create_rejections() {
        let engine = engine();
        engine
            .create(NewRelationship::new("a", "b", RelationshipType::Causes))
            .unwrap();

        let missing = engine
            .create(NewRelationship::new("a", "zzz", RelationshipType::Causes))
            .unwrap_err();
        assert!(matches!(missing, Error::NotFound { kind: "memory", .. }));

        let duplicate = engine
            .create(NewRelationship::new("a", "b", RelationshipType::Causes))
            .unwrap_err();
        assert!(matches!(duplicate, Error::Duplicate(_)));
        engine
            .create(NewRelationship::new("a", "b", RelationshipType::Causes).allowing_duplicate())
            .unwrap();

        let cycle = engine
            .create(NewRelationship::new("b", "a", RelationshipType::LeadsTo))
            .unwrap_err();
        assert!(matches!(cycle, Error::CycleDetected { .. }));

        let self_loop = engine
            .create(NewRelationship::new("c", "c", RelationshipType::DependsOn))
            .unwrap_err();
        assert!(matches!(self_loop, Error::CycleDetected { .. }));

        let unknown = engine.create(NewRelationship::named("a", "c", "FIXES_MAYBE")).unwrap_err();
        assert!(unknown.is_validation());
    }

    #[test]
    fn test_symmetric_types_skip_cycles_but_check_reverse_duplicates() {
        let engine = engine();
        engine
            .create(NewRelationship::new("a", "b", RelationshipType::SimilarTo))
            .unwrap();
        let reverse = engine
            .create(NewRelationship::new("b", "a", RelationshipType::SimilarTo))
            .unwrap_err();
        assert!(matches!(reverse, Error::Duplicate(_)));

        engine
            .create(NewRelationship::new("a", "c", RelationshipType::Causes))
            .unwrap();
        engine
            .create(NewRelationship::new("c", "a", RelationshipType::WorksWith))
            .unwrap();
    }

    #[test]
    fn test_reinforce_and_validation() {
        let engine = engine();
        let created = engine
            .create(NewRelationship::new("a", "b", RelationshipType::RelatedTo))
            .unwrap();
        let reinforced_rel = engine.reinforce(created.id.as_str()).unwrap();
        assert!((reinforced_rel.strength - 0.55).abs() < 1e-9);
        assert!((reinforced_rel.confidence - 0.82).abs() < 1e-9);
        assert_eq!(reinforced_rel.reinforcement_count, 1);

        let supported = engine.record_validation(created.id.as_str(), true).unwrap();
        assert_eq!(supported.validation_count, 1);
        assert!(supported.confidence > reinforced_rel.confidence);

        let countered = engine.record_validation(created.id.as_str(), false).unwrap();
        assert_eq!(countered.counter_evidence_count, 1);
        assert!(countered.confidence < supported.confidence);

        assert!(matches!(
            engine.reinforce("missing").unwrap_err(),
            Error::NotFound { kind: "relationship", .. }
        ));
    }

    #[test]
    fn test_relationships_of_directions() {
        let engine = engine();
        let ab = engine
            .create(NewRelationship::new("a", "b", RelationshipType::Causes))
            .unwrap();
        let cb = engine
            .create(NewRelationship::new("c", "b", RelationshipType::Triggers))
            .unwrap();

        assert!(engine.relationships_of("b", Direction::Outgoing).unwrap().is_empty());
        assert_eq!(engine.relationships_of("b", Direction::Incoming).unwrap().len(), 2);
        let both = engine.relationships_of("a", Direction::Both).unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, ab.id);
        assert!(engine.delete(cb.id.as_str()).unwrap());
        assert!(!engine.delete(cb.id.as_str()).unwrap());
        assert!(engine.relationships_of("nope", Direction::Both).is_err());
    }

    #[test]
    fn test_search_skips_undecodable_edges() {
        let engine = engine();
        let good = engine
            .create(NewRelationship::new("a", "b", RelationshipType::Causes))
            .unwrap();
        engine
            .driver
            .store_relationship("b", "c", "FIXES", &crate::models::Properties::new())
            .unwrap();

        let found = engine.search(&RelationshipQuery::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, good.id);
    }
}
