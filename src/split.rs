//! Split service — moving evidence out of an over-merged entity.
//!
//! A split is not an undo. It detaches a chosen subset of an entity's
//! mentions into a fresh entity and records the move as a new ledger
//! entry with the split-reversal reason; the original merge entries
//! stay in the ledger untouched. Replaying the ledger therefore shows
//! the full decision history, wrong turns included.

use std::sync::Arc;
use tracing::info;

use crate::error::{ResolveError, ResolveResult};
use crate::ledger::{MergeReason, MergeRecord};
use crate::model::{Entity, EntityId, MentionId, MentionRecord};
use crate::registry::{normalize, EntityRegistry};
use crate::store::{EvidenceStore, StorageError};

/// Result of a split: the entity seeded from the detached mentions and
/// the ledger entry that records the move.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub new_entity: Entity,
    pub detached: Vec<MentionId>,
    pub record: MergeRecord,
}

pub struct SplitService {
    store: Arc<dyn EvidenceStore>,
    registry: Arc<EntityRegistry>,
    actor: String,
}

impl SplitService {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        registry: Arc<EntityRegistry>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            actor: actor.into(),
        }
    }

    /// Detach `mention_ids` from `entity_id` into a fresh entity.
    ///
    /// Every listed mention must currently resolve to `entity_id`;
    /// anything else is a validation error and nothing is written. The
    /// new entity is seeded from the detached evidence: representative
    /// text from the highest-confidence mention, type labels and
    /// grounding confidence aggregated across the subset. The caller's
    /// `reason` is recorded on the ledger entry.
    pub fn split_entity(
        &self,
        entity_id: &EntityId,
        mention_ids: &[MentionId],
        reason: &str,
    ) -> ResolveResult<SplitOutcome> {
        if mention_ids.is_empty() {
            return Err(ResolveError::Validation(
                "split requires at least one mention to detach".into(),
            ));
        }

        let entity = self
            .store
            .get_entity(entity_id)?
            .ok_or_else(|| ResolveError::Validation(format!("unknown entity {}", entity_id)))?;

        let mut detached = Vec::with_capacity(mention_ids.len());
        for mention_id in mention_ids {
            let mention = self.store.get_mention(mention_id)?.ok_or_else(|| {
                ResolveError::Validation(format!("unknown mention {}", mention_id))
            })?;
            if mention.resolved_entity_id != Some(*entity_id) {
                return Err(ResolveError::Validation(format!(
                    "mention {} does not resolve to entity {}",
                    mention_id, entity_id
                )));
            }
            detached.push(mention);
        }

        let mut new_entity = seed_from_mentions(&entity, &detached);
        let mut record = MergeRecord::new(
            entity.org_id.clone(),
            entity.id,
            new_entity.id,
            1.0,
            MergeReason::SplitReversal,
            self.actor.clone(),
        );
        let reason = reason.trim();
        if !reason.is_empty() {
            record = record.with_note(reason);
        }

        let ids: Vec<MentionId> = detached.iter().map(|m| m.id).collect();
        match self.store.commit_split(&new_entity, &ids, &record) {
            Ok(()) => {}
            Err(StorageError::DuplicateEntity { .. }) => {
                // The detached mentions carry a surface form a live entity
                // already claims (typically the original's own). The
                // uniqueness claim serializes create races, not splits:
                // both referents must stay live, so suffix the normalized
                // form with a fragment of the new id and retry.
                let id_hex = new_entity.id.as_uuid().simple().to_string();
                new_entity.normalized_text =
                    format!("{} {}", new_entity.normalized_text, &id_hex[..8]);
                self.store.commit_split(&new_entity, &ids, &record)?;
            }
            Err(e) => return Err(e.into()),
        }
        self.registry
            .register(&new_entity.org_id, &new_entity.normalized_text);

        info!(
            from = %entity.id,
            to = %new_entity.id,
            mentions = ids.len(),
            "entity split"
        );
        Ok(SplitOutcome {
            new_entity,
            detached: ids,
            record,
        })
    }
}

/// Seed the split-off entity from the detached evidence. The surface
/// form comes from the highest-confidence detached mention, since the
/// original entity's representative text belongs to the referent that
/// keeps the remaining mentions.
fn seed_from_mentions(original: &Entity, detached: &[MentionRecord]) -> Entity {
    let best = detached
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(&detached[0]);

    let mut entity = Entity::seeded(
        original.org_id.clone(),
        best.raw_text.trim(),
        normalize(&best.raw_text),
        best.confidence,
    );
    for mention in detached {
        if let Some(label) = &mention.mention_type {
            entity.type_labels.insert(label.clone());
        }
    }
    entity
}
