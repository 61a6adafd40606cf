//! Mention evidence records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{EntityId, OrgId};

/// Unique identifier for a mention record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MentionId(Uuid);

impl MentionId {
    /// Create a new random MentionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a MentionId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MentionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MentionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MentionId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The shape upstream extraction hands us, before persistence.
///
/// One input is persisted into exactly one [`MentionRecord`] per arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionInput {
    pub raw_text: String,
    pub start_char: usize,
    pub end_char: usize,
    /// Extractor confidence in [0, 1]
    pub confidence: f64,
    pub extraction_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_type: Option<String>,
    /// Raw extractor response this mention was parsed from, if the caller
    /// wants a reproducibility hash recorded. Hashed, never stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// One piece of immutable extraction evidence.
///
/// Every field except `resolved_entity_id` is write-once at creation:
/// the store exposes no way to mutate text, offsets, confidence, or the
/// response hash after insert. Re-resolution must always be able to
/// re-derive what the extractor actually said.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionRecord {
    pub id: MentionId,
    pub org_id: OrgId,
    pub extraction_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub raw_text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub confidence: f64,
    /// blake3 hex digest of the raw extractor response
    pub response_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_type: Option<String>,
    /// The canonical entity this mention currently resolves to.
    /// Rewritten only by the resolver or the split service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_entity_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
}

impl MentionRecord {
    /// Persist-ready record from an upstream input.
    pub fn from_input(org_id: OrgId, input: &MentionInput) -> Self {
        let response_hash = match &input.raw_response {
            Some(raw) => blake3::hash(raw.as_bytes()).to_hex().to_string(),
            // Hash the evidence fields themselves when no raw response
            // accompanies the input, so the audit hash is never empty.
            None => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(input.raw_text.as_bytes());
                hasher.update(&(input.start_char as u64).to_le_bytes());
                hasher.update(&(input.end_char as u64).to_le_bytes());
                hasher.finalize().to_hex().to_string()
            }
        };

        Self {
            id: MentionId::new(),
            org_id,
            extraction_id: input.extraction_id.clone(),
            document_id: input.document_id.clone(),
            chunk_index: input.chunk_index,
            raw_text: input.raw_text.clone(),
            start_char: input.start_char,
            end_char: input.end_char,
            confidence: input.confidence,
            response_hash,
            mention_type: input.mention_type.clone(),
            resolved_entity_id: None,
            created_at: Utc::now(),
        }
    }
}
