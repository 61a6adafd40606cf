//! Cross-batch resolver — per-mention merge-vs-create decisions.
//!
//! For each mention the resolver consults the entity registry, links the
//! mention to the best candidate or creates a fresh entity, and records a
//! ledger entry when the decision re-resolves a mention away from a prior
//! entity (a merge event). Per-mention failures are caught at the mention
//! boundary and folded into the batch report as skips; one bad record can
//! never abort a batch.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug_span, info, warn};

use crate::config::ResolverConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::ledger::{MergeReason, MergeRecord};
use crate::model::{EntityId, MentionId, MentionRecord};
use crate::registry::{normalize, EntityRegistry};
use crate::store::{EvidenceStore, ResolutionCommit, StorageError};

/// Outcome of resolving one mention. Aggregation matches exhaustively;
/// there is no string-tag dispatch anywhere downstream.
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// Linked to an existing entity
    Resolved {
        mention_id: MentionId,
        entity_id: EntityId,
        score: f64,
        /// The different entity this mention resolved to before, if the
        /// decision was a merge
        merged_from: Option<EntityId>,
    },
    /// No acceptable candidate; a new entity was created
    Created {
        mention_id: MentionId,
        entity_id: EntityId,
    },
    /// Per-mention failure, caught and logged
    Skipped {
        mention_id: MentionId,
        reason: String,
    },
}

/// A mention linked to an existing entity.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMention {
    pub mention_id: MentionId,
    pub entity_id: EntityId,
    pub score: f64,
    pub had_prior_entity: bool,
}

/// A mention that seeded a brand-new entity.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedEntity {
    pub mention_id: MentionId,
    pub entity_id: EntityId,
}

/// A mention skipped due to a per-mention failure.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedMention {
    pub mention_id: MentionId,
    pub reason: String,
}

/// Batch-level aggregation of resolution outcomes.
///
/// Grouped by outcome type, not completion order, so the report is
/// deterministic even though in-batch scheduling is not. Invariant:
/// `resolved + created + skipped == mention_count` for every batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    pub resolved: Vec<ResolvedMention>,
    pub created: Vec<CreatedEntity>,
    pub merges: Vec<MergeRecord>,
    pub skipped: Vec<SkippedMention>,
    pub mention_count: usize,
}

impl ResolutionReport {
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// The accounting invariant every batch must satisfy.
    pub fn is_balanced(&self) -> bool {
        self.resolved_count() + self.created_count() + self.skipped_count() == self.mention_count
    }

    fn absorb(&mut self, outcome: ResolutionOutcome, merges: &mut Vec<MergeRecord>) {
        match outcome {
            ResolutionOutcome::Resolved {
                mention_id,
                entity_id,
                score,
                merged_from,
            } => {
                self.resolved.push(ResolvedMention {
                    mention_id,
                    entity_id,
                    score,
                    had_prior_entity: merged_from.is_some(),
                });
            }
            ResolutionOutcome::Created {
                mention_id,
                entity_id,
            } => {
                self.created.push(CreatedEntity {
                    mention_id,
                    entity_id,
                });
            }
            ResolutionOutcome::Skipped { mention_id, reason } => {
                self.skipped.push(SkippedMention { mention_id, reason });
            }
        }
        self.merges.append(merges);
    }
}

/// The merge-vs-create orchestrator.
///
/// Cheap to clone: all state is shared behind `Arc`, so batch fan-out
/// hands each task its own handle.
pub struct CrossBatchResolver {
    store: Arc<dyn EvidenceStore>,
    registry: Arc<EntityRegistry>,
    config: ResolverConfig,
}

impl Clone for CrossBatchResolver {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl CrossBatchResolver {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        registry: Arc<EntityRegistry>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a batch of already-persisted mentions.
    ///
    /// Per-mention work runs concurrently up to the configured ceiling;
    /// results are aggregated by input order, so identical input against
    /// identical registry state produces an identical report. Never fails
    /// as a whole for per-mention reasons.
    pub async fn resolve_mentions(
        &self,
        mentions: Vec<MentionRecord>,
    ) -> ResolveResult<ResolutionReport> {
        let mention_count = mentions.len();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrent));

        let mut handles = Vec::with_capacity(mention_count);
        for mention in mentions {
            let resolver = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                // Never closed; holding the Ok keeps the permit alive.
                let _permit = semaphore.acquire_owned().await.ok();
                resolver.resolve_with_retry(mention).await
            }));
        }

        let mut report = ResolutionReport {
            mention_count,
            ..Default::default()
        };
        for handle in handles {
            let (outcome, mut merges) = match handle.await {
                Ok(result) => result,
                Err(e) => return Err(ResolveError::Cluster(format!("resolution task failed: {}", e))),
            };
            report.absorb(outcome, &mut merges);
        }

        info!(
            resolved = report.resolved_count(),
            created = report.created_count(),
            merges = report.merges.len(),
            skipped = report.skipped_count(),
            "batch resolved"
        );
        Ok(report)
    }

    /// Resolve one mention, retrying transient failures with backoff
    /// before converting any remaining failure into a skip.
    async fn resolve_with_retry(
        &self,
        mention: MentionRecord,
    ) -> (ResolutionOutcome, Vec<MergeRecord>) {
        let span = debug_span!("resolve_mention", mention = %mention.id);
        let _entered = span.enter();

        let mut attempt = 0;
        loop {
            match self.resolve_one(&mention) {
                Ok(result) => return result,
                Err(e) if e.is_transient() && attempt + 1 < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(mention = %mention.id, error = %e, attempt, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(mention = %mention.id, error = %e, "mention skipped");
                    return (
                        ResolutionOutcome::Skipped {
                            mention_id: mention.id,
                            reason: e.to_string(),
                        },
                        Vec::new(),
                    );
                }
            }
        }
    }

    /// One merge-vs-create decision.
    pub fn resolve_one(
        &self,
        mention: &MentionRecord,
    ) -> ResolveResult<(ResolutionOutcome, Vec<MergeRecord>)> {
        let candidates = self.registry.find_candidates(mention)?;

        if let Some(best) = candidates.first() {
            return self.link(mention, best.entity.id, best.score);
        }

        // Re-resolution with no acceptable candidate: keep the existing
        // link rather than detaching evidence into a fresh entity.
        if let Some(prior) = mention.resolved_entity_id {
            return Ok((
                ResolutionOutcome::Resolved {
                    mention_id: mention.id,
                    entity_id: prior,
                    score: 0.0,
                    merged_from: None,
                },
                Vec::new(),
            ));
        }

        self.create(mention)
    }

    /// Link the mention to an entity, recording a merge when it had a
    /// different prior resolution.
    fn link(
        &self,
        mention: &MentionRecord,
        entity_id: EntityId,
        score: f64,
    ) -> ResolveResult<(ResolutionOutcome, Vec<MergeRecord>)> {
        let merged_from = mention
            .resolved_entity_id
            .filter(|prior| *prior != entity_id);

        let merge = merged_from.map(|prior| {
            MergeRecord::new(
                mention.org_id.clone(),
                prior,
                entity_id,
                score,
                MergeReason::EmbeddingSimilarity,
                self.config.actor.clone(),
            )
        });

        self.store.commit_resolution(&ResolutionCommit {
            mention_id: mention.id,
            entity_id,
            merge: merge.clone(),
        })?;

        self.refine_target(mention, entity_id, merged_from)?;

        Ok((
            ResolutionOutcome::Resolved {
                mention_id: mention.id,
                entity_id,
                score,
                merged_from,
            },
            merge.into_iter().collect(),
        ))
    }

    /// Create a fresh entity seeded from the mention. Losing the
    /// uniqueness race downgrades to a regular lookup against the winner.
    fn create(
        &self,
        mention: &MentionRecord,
    ) -> ResolveResult<(ResolutionOutcome, Vec<MergeRecord>)> {
        let normalized = normalize(&mention.raw_text);
        let mut entity = crate::model::Entity::seeded(
            mention.org_id.clone(),
            mention.raw_text.trim(),
            normalized.clone(),
            mention.confidence,
        );
        if let Some(label) = &mention.mention_type {
            entity.type_labels.insert(label.clone());
        }

        match self.store.create_entity(&entity) {
            Ok(()) => {
                self.store.commit_resolution(&ResolutionCommit {
                    mention_id: mention.id,
                    entity_id: entity.id,
                    merge: None,
                })?;
                self.registry.register(&mention.org_id, &normalized);
                Ok((
                    ResolutionOutcome::Created {
                        mention_id: mention.id,
                        entity_id: entity.id,
                    },
                    Vec::new(),
                ))
            }
            Err(StorageError::DuplicateEntity { existing }) => {
                // Another resolution committed this surface form first.
                self.registry.register(&mention.org_id, &normalized);
                let ranked = self.registry.find_candidates(mention)?;
                match ranked.first() {
                    Some(best) => self.link(mention, best.entity.id, best.score),
                    // Same normalized text that still ranks below the
                    // floor: the winner is the canonical target for this
                    // surface form by construction.
                    None => self.link(mention, existing, 1.0),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refine the surviving entity with evidence from the mention and,
    /// on a merge, from the absorbed entity: union of type labels,
    /// higher grounding confidence, missing attributes filled.
    fn refine_target(
        &self,
        mention: &MentionRecord,
        entity_id: EntityId,
        merged_from: Option<EntityId>,
    ) -> ResolveResult<()> {
        let Some(mut target) = self.store.get_entity(&entity_id)? else {
            return Ok(());
        };
        let mut dirty = false;

        if let Some(label) = &mention.mention_type {
            dirty |= target.type_labels.insert(label.clone());
        }
        if let Some(source_id) = merged_from {
            if let Some(source) = self.store.get_entity(&source_id)? {
                // Attribute and ontology carry-over is not cheaply
                // diffable; a merge always persists the target.
                target.refine_from(&source);
                dirty = true;
            }
        }

        if dirty {
            self.store.update_entity(&target)?;
        }
        Ok(())
    }
}
