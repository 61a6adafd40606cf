//! Entity registry — two-stage candidate search.
//!
//! Stage one is a cheap bloom-filter check over the blocking tokens of
//! the normalized surface form: when no token was ever registered, the
//! lookup prunes and ranking is skipped entirely. A positive answer
//! (possible false positive) triggers a targeted store lookup of live
//! entities sharing a token, which the similarity ranker then scores
//! against the mention.
//!
//! The filter may say "maybe" for an entity whose storage write has not
//! committed yet; that is an accepted false-positive-tolerant
//! optimization — the store lookup stays the source of truth.

use std::sync::Arc;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::filter::CandidateFilter;
use crate::model::{MentionRecord, OrgId};
use crate::ranker::{Embedder, ScoredCandidate, SimilarityRanker};
use crate::store::EvidenceStore;

/// Normalize a surface form for candidate lookup: case-fold, trim,
/// collapse internal whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Blocking tokens of a normalized surface form. Candidate generation
/// matches on token overlap ("acme corporation" must be able to find the
/// entity registered as "acme corp"); the ranker discriminates from there.
pub fn blocking_tokens(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

/// Orchestrates candidate lookup: filter → targeted lookup → ranking.
pub struct EntityRegistry {
    store: Arc<dyn EvidenceStore>,
    filter: CandidateFilter,
    ranker: SimilarityRanker,
    similarity_floor: f64,
}

impl EntityRegistry {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        embedder: Box<dyn Embedder>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            store,
            filter: CandidateFilter::with_capacity(
                config.filter.expected_items,
                config.filter.fp_rate,
            ),
            ranker: SimilarityRanker::new(embedder),
            similarity_floor: config.similarity_floor,
        }
    }

    /// Rebuild the candidate filter from every live entity in the store.
    /// Required when opening a registry over pre-existing data; without
    /// it the filter would wrongly prune entities it never saw.
    pub fn warm_start(&self) -> ResolveResult<usize> {
        let texts = self.store.live_normalized_texts()?;
        let count = texts.len();
        for (org, normalized) in texts {
            for token in blocking_tokens(&normalized) {
                self.filter.insert(&org, &token);
            }
        }
        debug!(entities = count, "candidate filter warm start");
        Ok(count)
    }

    /// Find ranked candidate entities for a mention.
    ///
    /// Never fails for valid input: no match is an empty list. A mention
    /// with empty (post-trim) text is a validation error, not retried.
    pub fn find_candidates(
        &self,
        mention: &MentionRecord,
    ) -> ResolveResult<Vec<ScoredCandidate>> {
        let normalized = normalize(&mention.raw_text);
        if normalized.is_empty() {
            return Err(ResolveError::Validation(format!(
                "mention {} has empty raw text",
                mention.id
            )));
        }

        let tokens: Vec<String> = blocking_tokens(&normalized)
            .into_iter()
            .filter(|t| self.filter.maybe_contains(&mention.org_id, t))
            .collect();
        if tokens.is_empty() {
            debug!(mention = %mention.id, "candidate filter pruned lookup");
            return Ok(Vec::new());
        }

        let entities = self.store.find_live_by_tokens(&mention.org_id, &tokens)?;
        if entities.is_empty() {
            // Bloom false positive (or an uncommitted write); nothing to rank.
            return Ok(Vec::new());
        }

        let mut candidates = Vec::with_capacity(entities.len());
        for entity in entities {
            let count = self.store.mention_count_for_entity(&entity.id)?;
            candidates.push((entity, count));
        }

        let ranked = self
            .ranker
            .rank(&mention.raw_text, candidates, self.similarity_floor)?;
        Ok(ranked)
    }

    /// Register a new entity's normalized surface form so future
    /// mentions can find it cheaply. Side-effect only.
    pub fn register(&self, org: &OrgId, normalized: &str) {
        for token in blocking_tokens(normalized) {
            self.filter.insert(org, &token);
        }
    }
}
