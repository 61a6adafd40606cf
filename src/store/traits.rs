//! Storage trait definitions

use thiserror::Error;

use crate::ledger::MergeRecord;
use crate::model::{Entity, EntityId, MentionId, MentionRecord, OrgId};

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Mention not found: {0}")]
    MentionNotFound(MentionId),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// A live entity with the same (org, normalized_text) already exists.
    /// This is the uniqueness-race signal: the loser of a concurrent
    /// create re-runs candidate lookup against `existing` instead of
    /// retrying the insert.
    #[error("Duplicate live entity, existing: {existing}")]
    DuplicateEntity { existing: EntityId },

    #[error("Storage busy: {0}")]
    Busy(String),

    /// A stored value failed to parse back into its typed form
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Busy(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The atomic unit of one resolution decision.
///
/// The mention link, the optional ledger entry justifying it, and any
/// absorption mark on the prior entity are committed together; a
/// decision is never half-visible.
#[derive(Debug, Clone)]
pub struct ResolutionCommit {
    pub mention_id: MentionId,
    /// Entity the mention now resolves to
    pub entity_id: EntityId,
    /// Present when this decision is a merge (re-resolution away from a
    /// different prior entity). Plain first resolutions carry no entry.
    pub merge: Option<MergeRecord>,
}

/// Trait for evidence storage backends.
///
/// Implementations must be thread-safe (Send + Sync) to support
/// concurrent per-mention resolution. Mention evidence fields are
/// write-once by construction: nothing here can rewrite raw text,
/// offsets, confidence, or the response hash after insert.
pub trait EvidenceStore: Send + Sync {
    // === Mention operations ===

    /// Persist a new mention record.
    fn insert_mention(&self, record: &MentionRecord) -> StorageResult<()>;

    /// Load a mention by ID.
    fn get_mention(&self, id: &MentionId) -> StorageResult<Option<MentionRecord>>;

    /// All mentions currently resolving to the entity.
    fn mentions_for_entity(&self, entity_id: &EntityId) -> StorageResult<Vec<MentionRecord>>;

    /// Number of mentions currently resolving to the entity.
    fn mention_count_for_entity(&self, entity_id: &EntityId) -> StorageResult<usize>;

    // === Entity operations ===

    /// Insert a new entity. Fails with [`StorageError::DuplicateEntity`]
    /// when a live entity with the same (org, normalized_text) exists —
    /// this is how the concurrent-create race is serialized.
    fn create_entity(&self, entity: &Entity) -> StorageResult<()>;

    /// Load an entity by ID.
    fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>>;

    /// Update an entity's mutable attributes (labels, attributes,
    /// confidence, ontology ref, absorption mark).
    fn update_entity(&self, entity: &Entity) -> StorageResult<()>;

    /// Live (non-absorbed) entities sharing a normalized surface form.
    fn find_live_by_normalized_text(
        &self,
        org: &OrgId,
        normalized: &str,
    ) -> StorageResult<Vec<Entity>>;

    /// Live entities whose normalized text shares at least one blocking
    /// token with the query. Candidate generation only; the similarity
    /// ranker does the actual discrimination.
    fn find_live_by_tokens(&self, org: &OrgId, tokens: &[String]) -> StorageResult<Vec<Entity>>;

    /// Every live entity's (org, normalized_text), for rebuilding the
    /// candidate filter when a registry opens over an existing store.
    fn live_normalized_texts(&self) -> StorageResult<Vec<(OrgId, String)>>;

    // === Atomic decision commits ===

    /// Commit one resolution decision as a unit: set the mention's
    /// resolved entity, append the merge ledger entry if present, and
    /// mark the merge source absorbed when it no longer owns mentions.
    fn commit_resolution(&self, commit: &ResolutionCommit) -> StorageResult<()>;

    /// Commit a split as a unit: persist the new entity, repoint exactly
    /// the given mentions at it, and append the reversal ledger entry.
    fn commit_split(
        &self,
        new_entity: &Entity,
        detached: &[MentionId],
        record: &MergeRecord,
    ) -> StorageResult<()>;
}
