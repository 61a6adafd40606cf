//! Incremental batch clustering — the ingest-facing entry point.
//!
//! Each call persists one extraction batch as immutable mention records
//! and hands the batch to the resolver. Persistence is all-or-nothing in
//! intent: a transient storage failure is retried with backoff, and a
//! persistent one fails the whole batch before any resolution decision
//! is made, so the evidence trail never holds half a batch of decisions
//! against unrecorded mentions.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ResolveError, ResolveResult};
use crate::model::{MentionId, MentionInput, MentionRecord, OrgId};
use crate::resolver::{CrossBatchResolver, ResolutionReport};
use crate::store::EvidenceStore;

/// Result of ingesting one batch: the persisted mention ids, in input
/// order, and the resolution report over them.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub mention_ids: Vec<MentionId>,
    pub report: ResolutionReport,
}

pub struct IncrementalClusterer {
    store: Arc<dyn EvidenceStore>,
    resolver: CrossBatchResolver,
}

impl IncrementalClusterer {
    pub fn new(store: Arc<dyn EvidenceStore>, resolver: CrossBatchResolver) -> Self {
        Self { store, resolver }
    }

    /// Persist and resolve one extraction batch for a tenant.
    ///
    /// An empty batch is a no-op that returns an empty, balanced report.
    /// Per-mention resolution failures become skips in the report; only
    /// persistence failures and task-level faults fail the call.
    pub async fn add_batch(
        &self,
        org: &OrgId,
        inputs: Vec<MentionInput>,
    ) -> ResolveResult<BatchResult> {
        if inputs.is_empty() {
            return Ok(BatchResult {
                mention_ids: Vec::new(),
                report: ResolutionReport::default(),
            });
        }

        info!(org = %org, mentions = inputs.len(), "batch received");
        let records = self.persist_batch(org, &inputs).await?;
        let mention_ids = records.iter().map(|r| r.id).collect();

        let report = self.resolver.resolve_mentions(records).await?;
        Ok(BatchResult {
            mention_ids,
            report,
        })
    }

    /// Re-run resolution over mentions that are already persisted, e.g.
    /// after the entity registry has grown from later batches.
    pub async fn reresolve(&self, mention_ids: &[MentionId]) -> ResolveResult<ResolutionReport> {
        let mut records = Vec::with_capacity(mention_ids.len());
        for id in mention_ids {
            let record = self
                .store
                .get_mention(id)?
                .ok_or_else(|| ResolveError::Validation(format!("unknown mention {}", id)))?;
            records.push(record);
        }
        self.resolver.resolve_mentions(records).await
    }

    /// Persist every input before any resolution starts. Transient
    /// storage failures are retried with the resolver's backoff policy.
    async fn persist_batch(
        &self,
        org: &OrgId,
        inputs: &[MentionInput],
    ) -> ResolveResult<Vec<MentionRecord>> {
        let retry = &self.resolver.config().retry;
        let mut records = Vec::with_capacity(inputs.len());
        for input in inputs {
            let record = MentionRecord::from_input(org.clone(), input);
            let mut attempt = 0;
            loop {
                match self.store.insert_mention(&record) {
                    Ok(()) => break,
                    Err(e) if e.is_transient() && attempt + 1 < retry.max_attempts => {
                        warn!(mention = %record.id, error = %e, attempt, "persist retry");
                        tokio::time::sleep(retry.delay_for(attempt)).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::ledger::MergeRecord;
    use crate::model::{Entity, EntityId};
    use crate::ranker::{Embedder, EmbeddingError};
    use crate::registry::EntityRegistry;
    use crate::store::{MemoryStore, ResolutionCommit, StorageError, StorageResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockEmbedder(HashMap<String, Vec<f32>>);

    impl Embedder for MockEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| self.0.get(*t).cloned().unwrap_or_else(|| vec![0.0; 3]))
                .collect())
        }
    }

    fn vectors() -> HashMap<String, Vec<f32>> {
        let mut m = HashMap::new();
        m.insert("Acme Corp".to_string(), vec![1.0, 0.0, 0.0]);
        m.insert("Acme Corporation".to_string(), vec![0.92, 0.392, 0.0]);
        m.insert("XYZ Inc".to_string(), vec![0.0, 0.1, 0.995]);
        m
    }

    fn input(text: &str) -> MentionInput {
        MentionInput {
            raw_text: text.to_string(),
            start_char: 0,
            end_char: text.len(),
            confidence: 0.9,
            extraction_id: "run-1".into(),
            document_id: "doc-1".into(),
            chunk_index: 0,
            mention_type: Some("organization".into()),
            raw_response: None,
        }
    }

    fn setup() -> (Arc<MemoryStore>, IncrementalClusterer) {
        let store = Arc::new(MemoryStore::new());
        let config = ResolverConfig::default().with_max_concurrent(1);
        let registry = Arc::new(EntityRegistry::new(
            Arc::clone(&store) as Arc<dyn EvidenceStore>,
            Box::new(MockEmbedder(vectors())),
            &config,
        ));
        let resolver = CrossBatchResolver::new(
            Arc::clone(&store) as Arc<dyn EvidenceStore>,
            registry,
            config,
        );
        let clusterer =
            IncrementalClusterer::new(Arc::clone(&store) as Arc<dyn EvidenceStore>, resolver);
        (store, clusterer)
    }

    // === Scenario: Inputs are persisted before resolution ===
    #[tokio::test]
    async fn batch_persists_every_input() {
        let (store, clusterer) = setup();
        let result = clusterer
            .add_batch(
                &OrgId::from("acme"),
                vec![input("Acme Corp"), input("XYZ Inc")],
            )
            .await
            .unwrap();

        assert_eq!(result.mention_ids.len(), 2);
        for id in &result.mention_ids {
            let record = store.get_mention(id).unwrap().unwrap();
            assert!(record.resolved_entity_id.is_some());
        }
        assert!(result.report.is_balanced());
    }

    // === Scenario: Later batches cluster into earlier entities ===
    #[tokio::test]
    async fn cross_batch_mentions_share_an_entity() {
        let (store, clusterer) = setup();
        let org = OrgId::from("acme");

        let first = clusterer
            .add_batch(&org, vec![input("Acme Corp")])
            .await
            .unwrap();
        assert_eq!(first.report.created_count(), 1);

        let second = clusterer
            .add_batch(&org, vec![input("Acme Corporation")])
            .await
            .unwrap();
        assert_eq!(second.report.created_count(), 0);
        assert_eq!(second.report.resolved_count(), 1);

        let a = store
            .get_mention(&first.mention_ids[0])
            .unwrap()
            .unwrap()
            .resolved_entity_id;
        let b = store
            .get_mention(&second.mention_ids[0])
            .unwrap()
            .unwrap()
            .resolved_entity_id;
        assert_eq!(a, b);
    }

    // === Scenario: Empty batch is a balanced no-op ===
    #[tokio::test]
    async fn empty_batch_is_noop() {
        let (_store, clusterer) = setup();
        let result = clusterer
            .add_batch(&OrgId::from("acme"), vec![])
            .await
            .unwrap();
        assert!(result.mention_ids.is_empty());
        assert!(result.report.is_balanced());
        assert_eq!(result.report.mention_count, 0);
    }

    // === Scenario: Re-resolution over persisted mentions is idempotent ===
    #[tokio::test]
    async fn reresolve_is_stable() {
        let (_store, clusterer) = setup();
        let org = OrgId::from("acme");
        let first = clusterer
            .add_batch(&org, vec![input("Acme Corp"), input("XYZ Inc")])
            .await
            .unwrap();

        let report = clusterer.reresolve(&first.mention_ids).await.unwrap();
        assert_eq!(report.created_count(), 0);
        assert_eq!(report.resolved_count(), 2);
        assert!(report.merges.is_empty());
    }

    #[tokio::test]
    async fn reresolve_rejects_unknown_mentions() {
        let (_store, clusterer) = setup();
        let result = clusterer.reresolve(&[MentionId::new()]).await;
        assert!(matches!(result, Err(ResolveError::Validation(_))));
    }

    /// Store wrapper whose `insert_mention` fails with a transient error
    /// a fixed number of times before delegating.
    struct FlakyInsertStore {
        inner: Arc<MemoryStore>,
        failures_left: AtomicUsize,
    }

    impl FlakyInsertStore {
        fn failing(inner: Arc<MemoryStore>, failures: usize) -> Self {
            Self {
                inner,
                failures_left: AtomicUsize::new(failures),
            }
        }
    }

    impl EvidenceStore for FlakyInsertStore {
        fn insert_mention(&self, record: &MentionRecord) -> StorageResult<()> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StorageError::Busy("database is locked".into()));
            }
            self.inner.insert_mention(record)
        }
        fn get_mention(&self, id: &MentionId) -> StorageResult<Option<MentionRecord>> {
            self.inner.get_mention(id)
        }
        fn mentions_for_entity(&self, entity_id: &EntityId) -> StorageResult<Vec<MentionRecord>> {
            self.inner.mentions_for_entity(entity_id)
        }
        fn mention_count_for_entity(&self, entity_id: &EntityId) -> StorageResult<usize> {
            self.inner.mention_count_for_entity(entity_id)
        }
        fn create_entity(&self, entity: &Entity) -> StorageResult<()> {
            self.inner.create_entity(entity)
        }
        fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
            self.inner.get_entity(id)
        }
        fn update_entity(&self, entity: &Entity) -> StorageResult<()> {
            self.inner.update_entity(entity)
        }
        fn find_live_by_normalized_text(
            &self,
            org: &OrgId,
            normalized: &str,
        ) -> StorageResult<Vec<Entity>> {
            self.inner.find_live_by_normalized_text(org, normalized)
        }
        fn find_live_by_tokens(
            &self,
            org: &OrgId,
            tokens: &[String],
        ) -> StorageResult<Vec<Entity>> {
            self.inner.find_live_by_tokens(org, tokens)
        }
        fn live_normalized_texts(&self) -> StorageResult<Vec<(OrgId, String)>> {
            self.inner.live_normalized_texts()
        }
        fn commit_resolution(&self, commit: &ResolutionCommit) -> StorageResult<()> {
            self.inner.commit_resolution(commit)
        }
        fn commit_split(
            &self,
            new_entity: &Entity,
            detached: &[MentionId],
            record: &MergeRecord,
        ) -> StorageResult<()> {
            self.inner.commit_split(new_entity, detached, record)
        }
    }

    fn clusterer_over(
        store: Arc<dyn EvidenceStore>,
        config: ResolverConfig,
    ) -> IncrementalClusterer {
        let registry = Arc::new(EntityRegistry::new(
            Arc::clone(&store),
            Box::new(MockEmbedder(vectors())),
            &config,
        ));
        let resolver = CrossBatchResolver::new(Arc::clone(&store), registry, config);
        IncrementalClusterer::new(store, resolver)
    }

    fn fast_retry_config() -> ResolverConfig {
        let mut config = ResolverConfig::default().with_max_concurrent(1);
        config.retry.base_delay_ms = 1;
        config
    }

    // === Scenario: Transient persist failures are retried, not fatal ===
    #[tokio::test]
    async fn persist_retries_through_transient_failures() {
        let inner = Arc::new(MemoryStore::new());
        let config = fast_retry_config();
        assert_eq!(config.retry.max_attempts, 3);

        // Two failures fit inside three attempts.
        let flaky = Arc::new(FlakyInsertStore::failing(Arc::clone(&inner), 2));
        let clusterer = clusterer_over(flaky as Arc<dyn EvidenceStore>, config);

        let result = clusterer
            .add_batch(&OrgId::from("acme"), vec![input("Acme Corp")])
            .await
            .unwrap();

        assert_eq!(result.mention_ids.len(), 1);
        assert!(result.report.is_balanced());
        let persisted = inner.get_mention(&result.mention_ids[0]).unwrap().unwrap();
        assert!(persisted.resolved_entity_id.is_some());
    }

    // === Scenario: A persistently failing store fails the whole batch ===
    #[tokio::test]
    async fn persist_exhaustion_fails_the_batch() {
        let inner = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyInsertStore::failing(Arc::clone(&inner), 10));
        let clusterer = clusterer_over(flaky as Arc<dyn EvidenceStore>, fast_retry_config());

        let result = clusterer
            .add_batch(&OrgId::from("acme"), vec![input("Acme Corp")])
            .await;

        assert!(matches!(
            result,
            Err(ResolveError::Storage(StorageError::Busy(_)))
        ));
        // No evidence was half-written.
        assert!(inner.live_normalized_texts().unwrap().is_empty());
    }
}
