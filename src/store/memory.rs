//! In-memory evidence store
//!
//! DashMap-backed backend for tests and ephemeral use. Implements the
//! same contracts as the SQLite backend, including the live-entity
//! uniqueness claim that serializes concurrent create races.

use dashmap::DashMap;
use std::sync::Mutex;

use super::traits::{EvidenceStore, ResolutionCommit, StorageError, StorageResult};
use crate::ledger::{MergeLedger, MergeRecord};
use crate::model::{Entity, EntityId, MentionId, MentionRecord, OrgId};

/// In-memory store over concurrent maps.
///
/// The ledger is a plain append-only vec behind a mutex; entries are
/// never mutated or removed after push.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mentions: DashMap<MentionId, MentionRecord>,
    entities: DashMap<EntityId, Entity>,
    /// Uniqueness claim on live (org, normalized_text) pairs
    live_index: DashMap<(String, String), EntityId>,
    ledger: Mutex<Vec<MergeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_key(org: &OrgId, normalized: &str) -> (String, String) {
        (org.as_str().to_string(), normalized.to_string())
    }

    fn release_live_claim(&self, entity: &Entity) {
        let key = Self::live_key(&entity.org_id, &entity.normalized_text);
        self.live_index.remove_if(&key, |_, id| *id == entity.id);
    }
}

impl EvidenceStore for MemoryStore {
    fn insert_mention(&self, record: &MentionRecord) -> StorageResult<()> {
        self.mentions.insert(record.id, record.clone());
        Ok(())
    }

    fn get_mention(&self, id: &MentionId) -> StorageResult<Option<MentionRecord>> {
        Ok(self.mentions.get(id).map(|r| r.clone()))
    }

    fn mentions_for_entity(&self, entity_id: &EntityId) -> StorageResult<Vec<MentionRecord>> {
        let mut out: Vec<MentionRecord> = self
            .mentions
            .iter()
            .filter(|r| r.resolved_entity_id.as_ref() == Some(entity_id))
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|m| (m.created_at, m.id));
        Ok(out)
    }

    fn mention_count_for_entity(&self, entity_id: &EntityId) -> StorageResult<usize> {
        Ok(self
            .mentions
            .iter()
            .filter(|r| r.resolved_entity_id.as_ref() == Some(entity_id))
            .count())
    }

    fn create_entity(&self, entity: &Entity) -> StorageResult<()> {
        let key = Self::live_key(&entity.org_id, &entity.normalized_text);
        // entry() holds the shard lock, so exactly one concurrent
        // creator claims the normalized form.
        match self.live_index.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                return Err(StorageError::DuplicateEntity {
                    existing: *existing.get(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entity.id);
            }
        }
        self.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        Ok(self.entities.get(id).map(|e| e.clone()))
    }

    fn update_entity(&self, entity: &Entity) -> StorageResult<()> {
        if !self.entities.contains_key(&entity.id) {
            return Err(StorageError::EntityNotFound(entity.id));
        }
        if entity.absorbed_into.is_some() {
            self.release_live_claim(entity);
        }
        self.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    fn find_live_by_normalized_text(
        &self,
        org: &OrgId,
        normalized: &str,
    ) -> StorageResult<Vec<Entity>> {
        let mut out: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.org_id == *org && e.normalized_text == normalized && e.is_live())
            .map(|e| e.clone())
            .collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    fn find_live_by_tokens(&self, org: &OrgId, tokens: &[String]) -> StorageResult<Vec<Entity>> {
        let mut out: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| {
                e.org_id == *org
                    && e.is_live()
                    && e.normalized_text
                        .split_whitespace()
                        .any(|t| tokens.iter().any(|q| q == t))
            })
            .map(|e| e.clone())
            .collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    fn live_normalized_texts(&self) -> StorageResult<Vec<(OrgId, String)>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.is_live())
            .map(|e| (e.org_id.clone(), e.normalized_text.clone()))
            .collect())
    }

    fn commit_resolution(&self, commit: &ResolutionCommit) -> StorageResult<()> {
        {
            let mut mention = self
                .mentions
                .get_mut(&commit.mention_id)
                .ok_or(StorageError::MentionNotFound(commit.mention_id))?;
            mention.resolved_entity_id = Some(commit.entity_id);
        }

        if let Some(merge) = &commit.merge {
            self.ledger.lock().unwrap().push(merge.clone());

            // Fold the source entity when it no longer owns evidence.
            if self.mention_count_for_entity(&merge.source)? == 0 {
                if let Some(mut source) = self.entities.get_mut(&merge.source) {
                    source.absorbed_into = Some(merge.target);
                    let snapshot = source.clone();
                    drop(source);
                    self.release_live_claim(&snapshot);
                }
            }
        }
        Ok(())
    }

    fn commit_split(
        &self,
        new_entity: &Entity,
        detached: &[MentionId],
        record: &MergeRecord,
    ) -> StorageResult<()> {
        self.create_entity(new_entity)?;
        for mention_id in detached {
            let mut mention = self
                .mentions
                .get_mut(mention_id)
                .ok_or(StorageError::MentionNotFound(*mention_id))?;
            mention.resolved_entity_id = Some(new_entity.id);
        }
        self.ledger.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl MergeLedger for MemoryStore {
    fn record_merge(&self, record: &MergeRecord) -> StorageResult<()> {
        self.ledger.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn history_for(&self, entity: &EntityId) -> StorageResult<Vec<MergeRecord>> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.source == *entity || r.target == *entity)
            .cloned()
            .collect())
    }

    fn entry_count(&self) -> StorageResult<usize> {
        Ok(self.ledger.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MergeReason;
    use crate::model::MentionInput;

    fn mention(org: &str, text: &str) -> MentionRecord {
        MentionRecord::from_input(
            OrgId::from(org),
            &MentionInput {
                raw_text: text.to_string(),
                start_char: 0,
                end_char: text.len(),
                confidence: 0.9,
                extraction_id: "run-1".into(),
                document_id: "doc-1".into(),
                chunk_index: 0,
                mention_type: None,
                raw_response: None,
            },
        )
    }

    #[test]
    fn insert_and_get_mention() {
        let store = MemoryStore::new();
        let m = mention("acme", "Acme Corp");
        store.insert_mention(&m).unwrap();
        let loaded = store.get_mention(&m.id).unwrap().unwrap();
        assert_eq!(loaded.raw_text, "Acme Corp");
    }

    // === Scenario: Duplicate live entity creation is rejected ===
    #[test]
    fn create_entity_rejects_duplicate_normalized_text() {
        let store = MemoryStore::new();
        let first = Entity::seeded(OrgId::from("acme"), "Acme Corp", "acme corp", 0.9);
        let second = Entity::seeded(OrgId::from("acme"), "ACME CORP", "acme corp", 0.8);

        store.create_entity(&first).unwrap();
        match store.create_entity(&second) {
            Err(StorageError::DuplicateEntity { existing }) => assert_eq!(existing, first.id),
            other => panic!("expected DuplicateEntity, got {:?}", other.map(|_| ())),
        }
    }

    // === Scenario: Different tenants never collide ===
    #[test]
    fn uniqueness_is_scoped_per_org() {
        let store = MemoryStore::new();
        store
            .create_entity(&Entity::seeded(OrgId::from("a"), "Acme", "acme", 0.9))
            .unwrap();
        store
            .create_entity(&Entity::seeded(OrgId::from("b"), "Acme", "acme", 0.9))
            .unwrap();
    }

    // === Scenario: Commit folds an emptied source entity ===
    #[test]
    fn commit_resolution_absorbs_empty_source() {
        let store = MemoryStore::new();
        let org = OrgId::from("acme");

        let source = Entity::seeded(org.clone(), "Acme Corp", "acme corp", 0.9);
        let target = Entity::seeded(org.clone(), "Acme Corporation", "acme corporation", 0.9);
        store.create_entity(&source).unwrap();
        store.create_entity(&target).unwrap();

        let mut m = mention("acme", "Acme Corp");
        m.resolved_entity_id = Some(source.id);
        store.insert_mention(&m).unwrap();

        let merge = MergeRecord::new(
            org,
            source.id,
            target.id,
            0.92,
            MergeReason::EmbeddingSimilarity,
            "resolver",
        );
        store
            .commit_resolution(&ResolutionCommit {
                mention_id: m.id,
                entity_id: target.id,
                merge: Some(merge),
            })
            .unwrap();

        let folded = store.get_entity(&source.id).unwrap().unwrap();
        assert_eq!(folded.absorbed_into, Some(target.id));
        // Absorbed entities leave candidate lookup
        assert!(store
            .find_live_by_normalized_text(&OrgId::from("acme"), "acme corp")
            .unwrap()
            .is_empty());
        assert_eq!(store.entry_count().unwrap(), 1);
    }
}
