//! Shared fixtures for end-to-end resolution tests.
//!
//! Builds the full stack (store, registry, resolver, clusterer) over
//! either backend, with a deterministic keyed embedder so similarity
//! scores are exact and stable across runs.

use std::collections::HashMap;
use std::sync::Arc;

use coalesce::{
    CrossBatchResolver, Embedder, EmbeddingError, EntityRegistry, EvidenceStore,
    IncrementalClusterer, MentionInput, ResolverConfig, SqliteStore,
};

/// Embedder returning fixed vectors per text; unknown texts embed to the
/// zero vector and therefore never clear the similarity floor.
pub struct KeyedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl KeyedEmbedder {
    /// Fixture vocabulary: "Acme Corp" and "Acme Corporation" score
    /// ~0.92 against each other, "XYZ Inc" is far from both.
    pub fn fixture() -> Self {
        let mut vectors = HashMap::new();
        vectors.insert("Acme Corp".to_string(), vec![1.0, 0.0, 0.0]);
        vectors.insert("Acme Corporation".to_string(), vec![0.92, 0.392, 0.0]);
        vectors.insert("XYZ Inc".to_string(), vec![0.0, 0.1, 0.995]);
        vectors.insert("Initech".to_string(), vec![0.0, 0.995, 0.1]);
        Self { vectors }
    }
}

impl Embedder for KeyedEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(*t).cloned().unwrap_or_else(|| vec![0.0; 3]))
            .collect())
    }
}

/// One extraction input with evidence offsets filled in.
pub fn input(text: &str) -> MentionInput {
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

/// Full stack over an existing store. Sequential resolution (limit 1)
/// keeps in-batch entity visibility deterministic.
pub fn stack_over(store: Arc<SqliteStore>) -> (IncrementalClusterer, Arc<EntityRegistry>) {
    let config = ResolverConfig::default().with_max_concurrent(1);
    let registry = Arc::new(EntityRegistry::new(
        Arc::clone(&store) as Arc<dyn EvidenceStore>,
        Box::new(KeyedEmbedder::fixture()),
        &config,
    ));
    registry.warm_start().expect("warm start");
    let resolver = CrossBatchResolver::new(
        Arc::clone(&store) as Arc<dyn EvidenceStore>,
        Arc::clone(&registry),
        config,
    );
    let clusterer = IncrementalClusterer::new(store, resolver);
    (clusterer, registry)
}

/// Fresh SQLite-backed stack on a temp file.
pub fn sqlite_stack(dir: &tempfile::TempDir) -> (Arc<SqliteStore>, IncrementalClusterer) {
    let store = Arc::new(SqliteStore::open(dir.path().join("coalesce.db")).expect("open store"));
    let (clusterer, _registry) = stack_over(Arc::clone(&store));
    (store, clusterer)
}
