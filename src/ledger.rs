//! Merge history ledger — append-only audit log of merge and split decisions.
//!
//! Entries are immutable once written; the trait exposes no update or
//! delete. All higher-level reasoning about "why does entity E look the
//! way it does" depends on this log being faithful and ordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::{EntityId, OrgId};
use crate::store::StorageResult;

/// Why a merge (or split) was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeReason {
    /// Automatic merge justified by embedding similarity
    EmbeddingSimilarity,
    /// Operator-initiated merge
    Manual,
    /// Reversal of an earlier merge (split/unmerge)
    SplitReversal,
}

impl MergeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddingSimilarity => "embedding_similarity",
            Self::Manual => "manual",
            Self::SplitReversal => "split_reversal",
        }
    }
}

impl std::fmt::Display for MergeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`MergeReason`] from its stored string form.
#[derive(Debug, Error)]
#[error("unknown merge reason: {0}")]
pub struct ParseMergeReasonError(String);

impl std::str::FromStr for MergeReason {
    type Err = ParseMergeReasonError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedding_similarity" => Ok(Self::EmbeddingSimilarity),
            "manual" => Ok(Self::Manual),
            "split_reversal" => Ok(Self::SplitReversal),
            other => Err(ParseMergeReasonError(other.to_string())),
        }
    }
}

/// One append-only audit entry.
///
/// For a normal merge, `source` is the absorbed entity and `target` the
/// surviving one. For a split the orientation is reversed: `source` is
/// the original entity and `target` the newly split-off entity, so audit
/// traversal can tell the two apart by reason and direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub org_id: OrgId,
    pub source: EntityId,
    pub target: EntityId,
    /// Similarity (or operator) confidence that justified the decision
    pub confidence: f64,
    pub reason: MergeReason,
    /// Acting principal ("resolver", an operator name, ...)
    pub actor: String,
    /// Free-form rationale supplied by the caller, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MergeRecord {
    pub fn new(
        org_id: OrgId,
        source: EntityId,
        target: EntityId,
        confidence: f64,
        reason: MergeReason,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            org_id,
            source,
            target,
            confidence,
            reason,
            actor: actor.into(),
            note: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attach a free-form rationale to the entry.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Append-and-query surface of the merge history ledger.
///
/// Implementations must never mutate or delete an existing entry; the
/// entry count for an organization only grows.
pub trait MergeLedger: Send + Sync {
    /// Append one entry. Never rejects a well-formed record.
    fn record_merge(&self, record: &MergeRecord) -> StorageResult<()>;

    /// All entries touching the entity as source or target, in append order.
    fn history_for(&self, entity: &EntityId) -> StorageResult<Vec<MergeRecord>>;

    /// Total number of entries ever written (audit monotonicity checks).
    fn entry_count(&self) -> StorageResult<usize>;
}

/// Walk source→target merge edges backwards from `entity`, collecting
/// every entity id that was ever folded into it (directly or through a
/// chain of merges). Split-reversal entries are skipped: they point away
/// from the entity, not into it.
pub fn provenance_of(
    ledger: &dyn MergeLedger,
    entity: &EntityId,
) -> StorageResult<Vec<EntityId>> {
    let mut seen: HashSet<EntityId> = HashSet::new();
    let mut frontier = vec![*entity];
    let mut absorbed = Vec::new();

    while let Some(current) = frontier.pop() {
        for record in ledger.history_for(&current)? {
            if record.reason == MergeReason::SplitReversal {
                continue;
            }
            if record.target == current && seen.insert(record.source) {
                absorbed.push(record.source);
                frontier.push(record.source);
            }
        }
    }

    absorbed.sort();
    Ok(absorbed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn record(source: EntityId, target: EntityId, reason: MergeReason) -> MergeRecord {
        MergeRecord::new(OrgId::from("acme"), source, target, 0.9, reason, "resolver")
    }

    #[test]
    fn reason_round_trips_through_str() {
        for reason in [
            MergeReason::EmbeddingSimilarity,
            MergeReason::Manual,
            MergeReason::SplitReversal,
        ] {
            assert_eq!(reason.as_str().parse::<MergeReason>().unwrap(), reason);
        }
        let err = "telepathy".parse::<MergeReason>().unwrap_err();
        assert_eq!(err.to_string(), "unknown merge reason: telepathy");
    }

    #[test]
    fn note_is_optional_and_attachable() {
        let plain = record(EntityId::new(), EntityId::new(), MergeReason::Manual);
        assert!(plain.note.is_none());
        let annotated = plain.with_note("wrong referent");
        assert_eq!(annotated.note.as_deref(), Some("wrong referent"));
    }

    // === Scenario: Provenance reconstructs chains of merges ===
    #[test]
    fn provenance_walks_merge_chain() {
        let store = MemoryStore::new();
        let (a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new());

        // a was folded into b, then b into c
        store.record_merge(&record(a, b, MergeReason::EmbeddingSimilarity)).unwrap();
        store.record_merge(&record(b, c, MergeReason::Manual)).unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(provenance_of(&store, &c).unwrap(), expected);
    }

    // === Scenario: Splits do not count as provenance ===
    #[test]
    fn provenance_ignores_split_reversals() {
        let store = MemoryStore::new();
        let (original, split_off) = (EntityId::new(), EntityId::new());

        store
            .record_merge(&record(original, split_off, MergeReason::SplitReversal))
            .unwrap();

        assert!(provenance_of(&store, &split_off).unwrap().is_empty());
    }
}
