//! Memory CRUD, search, supersession, and access tracking.

// Result counts are recorded as f64 histogram samples.
#![allow(clippy::cast_precision_loss)]

use crate::models::{
    MEMORY_LABEL, Memory, MemoryId, MemorySearch, MemoryUpdate, NewMemory, NewRelationship,
    NodeFilter, Properties, PropertyFilter, RelationshipType,
};
use crate::services::RelationshipEngine;
use crate::storage::{GraphDriver, acquire_lock};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Stores and retrieves memories.
///
/// Supersession stores the updated memory as a new version, links it to the
/// prior one with `SUPERSEDES`, and marks the prior version not current.
///
/// Read-modify-write operations (`update`, `record_access`) hold a writer
/// lock from the read through the write, so concurrent callers neither lose
/// updates nor both supersede the same version.
pub struct MemoryService {
    driver: Arc<dyn GraphDriver>,
    relationships: Arc<RelationshipEngine>,
    writer: Mutex<()>,
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Builds a patch turning `old` into `new`: changed keys carry their new
/// value, dropped keys carry `null`.
fn property_patch(old: &Properties, new: &Properties) -> Properties {
    let mut patch: Properties = new
        .iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for key in old.keys() {
        if !new.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }
    patch
}

impl MemoryService {
    /// Creates a memory service.
    #[must_use]
    pub const fn new(driver: Arc<dyn GraphDriver>, relationships: Arc<RelationshipEngine>) -> Self {
        Self {
            driver,
            relationships,
            writer: Mutex::new(()),
        }
    }

    /// Stores a new memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty title or content or an
    /// out-of-range score, and [`Error::Duplicate`] for a taken id.
    #[instrument(skip(self, request), fields(memory_type = %request.memory_type))]
    pub fn create(&self, request: NewMemory) -> Result<Memory> {
        request.validate()?;
        let memory = request.into_memory(Utc::now());
        self.driver
            .store_node(MEMORY_LABEL, &memory.to_properties()?)?;
        metrics::counter!("memories_created_total", "type" => memory.memory_type.as_str())
            .increment(1);
        tracing::debug!(id = %memory.id, "Stored memory");
        Ok(memory)
    }

    /// Fetches a memory. Nodes with another label are not memories.
    ///
    /// # Errors
    ///
    /// Returns a driver error, or [`Error::OperationFailed`] for a node that
    /// does not decode.
    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        match self.driver.get_node(id)? {
            Some(node) if node.label == MEMORY_LABEL => Memory::from_node(&node).map(Some),
            _ => Ok(None),
        }
    }

    fn require(&self, id: &str) -> Result<Memory> {
        self.get(id)?.ok_or_else(|| Error::memory_not_found(id))
    }

    /// Updates a memory in place, or stores a superseding version when
    /// `update.supersede` is set.
    ///
    /// Returns the updated (or new) memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id and
    /// [`Error::Validation`] for bad input or when superseding a memory that
    /// is no longer current.
    #[instrument(skip(self, update), fields(supersede = update.supersede))]
    pub fn update(&self, id: &str, update: &MemoryUpdate) -> Result<Memory> {
        update.validate()?;
        let _writer = acquire_lock(&self.writer);
        let prior = self.require(id)?;
        let now = Utc::now();

        if !update.supersede {
            let mut memory = prior.clone();
            update.apply_to(&mut memory, now);
            let patch = property_patch(&prior.to_properties()?, &memory.to_properties()?);
            self.driver.update_node(id, &patch)?;
            return Ok(memory);
        }

        if !prior.is_current {
            return Err(Error::Validation(format!(
                "memory {id} has already been superseded"
            )));
        }

        let mut next = prior.clone();
        update.apply_to(&mut next, now);
        next.id = MemoryId::generate();
        next.version = prior.version.saturating_add(1);
        next.created_at = now;
        next.last_accessed = None;
        next.is_current = true;
        self.driver.store_node(MEMORY_LABEL, &next.to_properties()?)?;

        let link = NewRelationship::new(next.id.clone(), prior.id.clone(), RelationshipType::Supersedes)
            .with_context(format!("version {} replaces version {}", next.version, prior.version));
        if let Err(e) = self.relationships.create(link) {
            tracing::warn!(id = %next.id, error = %e, "Supersession link failed, removing new version");
            self.driver.delete_node(next.id.as_str())?;
            return Err(e);
        }

        let mut retired = Properties::new();
        retired.insert("is_current".to_string(), Value::Bool(false));
        retired.insert("updated_at".to_string(), timestamp(now));
        self.driver.update_node(id, &retired)?;

        metrics::counter!("memories_superseded_total").increment(1);
        tracing::info!(prior = %prior.id, next = %next.id, version = next.version, "Superseded memory");
        Ok(next)
    }

    /// Deletes a memory and every relationship touching it.
    ///
    /// Returns `false` when it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        if self.get(id)?.is_none() {
            return Ok(false);
        }
        let deleted = self.driver.delete_node(id)?;
        if deleted {
            metrics::counter!("memories_deleted_total").increment(1);
        }
        Ok(deleted)
    }

    /// Searches memories.
    ///
    /// With a text query, results are ordered by relevance; otherwise by id.
    ///
    /// # Errors
    ///
    /// Returns a driver error.
    #[instrument(skip(self, search))]
    pub fn search(&self, search: &MemorySearch) -> Result<Vec<Memory>> {
        let mut filter = NodeFilter::new().with_limit(search.limit);
        if let Some(text) = search.query.as_deref().filter(|q| !q.trim().is_empty()) {
            filter = filter.with_text(text);
        }
        if !search.memory_types.is_empty() {
            filter = filter.with_filter(PropertyFilter::OneOf {
                key: "type".to_string(),
                values: search
                    .memory_types
                    .iter()
                    .map(|t| Value::String(t.as_str().to_string()))
                    .collect(),
            });
        }
        if !search.tags.is_empty() {
            filter = filter.with_filter(PropertyFilter::ContainsAny {
                key: "tags".to_string(),
                values: crate::models::normalize_tags(search.tags.clone()),
            });
        }
        if let Some(min) = search.min_importance {
            filter = filter.with_filter(PropertyFilter::AtLeast {
                key: "importance".to_string(),
                value: min,
            });
        }
        if search.current_only {
            filter = filter.with_filter(PropertyFilter::Equals {
                key: "is_current".to_string(),
                value: Value::Bool(true),
            });
        }

        let nodes = self.driver.search_nodes(MEMORY_LABEL, &filter)?;
        metrics::histogram!("memory_search_results").record(nodes.len() as f64);
        nodes.iter().map(Memory::from_node).collect()
    }

    /// Records one access: bumps `usage_count` and sets `last_accessed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn record_access(&self, id: &str) -> Result<Memory> {
        let _writer = acquire_lock(&self.writer);
        let mut memory = self.require(id)?;
        memory.usage_count = memory.usage_count.saturating_add(1);
        let now = Utc::now();
        memory.last_accessed = Some(now);

        let mut patch = Properties::new();
        patch.insert("usage_count".to_string(), Value::from(memory.usage_count));
        patch.insert("last_accessed".to_string(), timestamp(now));
        self.driver.update_node(id, &patch)?;
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecaySettings, RelationshipSettings};
    use crate::models::{Direction, MemoryType};
    use crate::storage::FallbackDriver;
    use serde_json::json;

    fn service() -> (MemoryService, Arc<RelationshipEngine>) {
        let driver = FallbackDriver::in_memory();
        driver.connect().unwrap();
        let driver: Arc<dyn GraphDriver> = Arc::new(driver);
        let engine = Arc::new(RelationshipEngine::new(
            Arc::clone(&driver),
            RelationshipSettings::default(),
            DecaySettings::default(),
        ));
        (MemoryService::new(driver, Arc::clone(&engine)), engine)
    }

    #[test]
    fn test_property_patch() {
        let old: Properties = serde_json::from_value(json!({"a": 1, "b": 2, "c": 3})).unwrap();
        let new: Properties = serde_json::from_value(json!({"a": 1, "b": 5, "d": 4})).unwrap();
        let patch = property_patch(&old, &new);
        assert_eq!(
            Value::Object(patch),
            json!({"b": 5, "c": null, "d": 4})
        );
    }

    #[test]
    fn test_create_get_update_delete() {
        let (service, _) = service();
        let created = service
            .create(
                NewMemory::new(MemoryType::Problem, "Timeout", "Requests time out")
                    .with_tags(["Net", "net", "http"]),
            )
            .unwrap();
        assert_eq!(created.tags, vec!["http", "net"]);
        assert_eq!(service.get(created.id.as_str()).unwrap().unwrap(), created);

        let updated = service
            .update(
                created.id.as_str(),
                &MemoryUpdate {
                    content: Some("Requests time out under load".to_string()),
                    ..MemoryUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(
            service.get(created.id.as_str()).unwrap().unwrap().content,
            "Requests time out under load"
        );

        assert!(service.delete(created.id.as_str()).unwrap());
        assert!(service.get(created.id.as_str()).unwrap().is_none());
        assert!(!service.delete(created.id.as_str()).unwrap());
        assert!(service.create(NewMemory::new(MemoryType::Fix, "", "x")).is_err());
    }

    #[test]
    fn test_supersede_chains_versions() {
        let (service, engine) = service();
        let v1 = service
            .create(NewMemory::new(MemoryType::Solution, "Retry", "Retry once"))
            .unwrap();
        let v2 = service
            .update(
                v1.id.as_str(),
                &MemoryUpdate {
                    content: Some("Retry with backoff".to_string()),
                    supersede: true,
                    ..MemoryUpdate::default()
                },
            )
            .unwrap();
        assert_ne!(v2.id, v1.id);
        assert_eq!(v2.version, 2);
        assert!(v2.is_current);
        assert!(!service.get(v1.id.as_str()).unwrap().unwrap().is_current);

        let links = engine.relationships_of(v2.id.as_str(), Direction::Outgoing).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].rel_type, RelationshipType::Supersedes);
        assert_eq!(links[0].to_id, v1.id);

        let again = service.update(
            v1.id.as_str(),
            &MemoryUpdate {
                supersede: true,
                ..MemoryUpdate::default()
            },
        );
        assert!(matches!(again, Err(Error::Validation(_))));

        let current = service.search(&MemorySearch::default()).unwrap();
        assert_eq!(current.len(), 1);
        let all = service
            .search(&MemorySearch::default().including_superseded())
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_search_filters() {
        let (service, _) = service();
        service
            .create(
                NewMemory::new(MemoryType::Problem, "Pool exhausted", "Connection pool runs dry")
                    .with_tags(["db"])
                    .with_importance(0.9),
            )
            .unwrap();
        service
            .create(
                NewMemory::new(MemoryType::Solution, "Bigger pool", "Raise the pool size")
                    .with_tags(["db", "config"])
                    .with_importance(0.4),
            )
            .unwrap();

        let text = service.search(&MemorySearch::text("pool")).unwrap();
        assert_eq!(text.len(), 2);

        let typed = service
            .search(&MemorySearch::text("pool").with_types([MemoryType::Solution]))
            .unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].title, "Bigger pool");

        let important = service
            .search(&MemorySearch::default().with_min_importance(0.5))
            .unwrap();
        assert_eq!(important.len(), 1);

        let tagged = service
            .search(&MemorySearch::default().with_tags(["CONFIG"]))
            .unwrap();
        assert_eq!(tagged.len(), 1);
    }

    #[test]
    fn test_record_access() {
        let (service, _) = service();
        let memory = service
            .create(NewMemory::new(MemoryType::Command, "Build", "cargo build"))
            .unwrap();
        service.record_access(memory.id.as_str()).unwrap();
        let accessed = service.record_access(memory.id.as_str()).unwrap();
        assert_eq!(accessed.usage_count, 2);
        let stored = service.get(memory.id.as_str()).unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
        assert!(stored.last_accessed.is_some());
        assert!(service.record_access("missing").is_err());
    }

    #[test]
    fn test_concurrent_access_counts_every_call() {
        let (service, _) = service();
        let memory = service
            .create(NewMemory::new(MemoryType::Command, "Test", "cargo test"))
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        service.record_access(memory.id.as_str()).unwrap();
                    }
                });
            }
        });

        let stored = service.get(memory.id.as_str()).unwrap().unwrap();
        assert_eq!(stored.usage_count, 200);
    }

    #[test]
    fn test_concurrent_supersede_leaves_one_current_version() {
        let (service, _) = service();
        let v1 = service
            .create(NewMemory::new(MemoryType::Solution, "Retry", "Retry once"))
            .unwrap();
        let update = MemoryUpdate {
            content: Some("Retry with backoff".to_string()),
            supersede: true,
            ..MemoryUpdate::default()
        };

        let outcomes: Vec<Result<Memory>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|_| scope.spawn(|| service.update(v1.id.as_str(), &update)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|o| o.as_ref().err())
                .all(Error::is_validation)
        );
        let current = service.search(&MemorySearch::default()).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].version, 2);
    }
}
