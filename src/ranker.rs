//! Similarity ranker — embedding-based scoring of candidate entities.
//!
//! Uses a trait-based embedding backend (`Embedder`) so production code
//! can plug in a real model while tests use deterministic mocks. Ranking
//! is fully deterministic: score descending, then resolved-mention count
//! descending (more evidence, more trustworthy canonical target), then
//! entity id ascending.

use thiserror::Error;

use crate::model::Entity;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding backend returned no results
    #[error("embedding returned no results")]
    EmptyResult,
    /// Model loading or inference failed
    #[error("embedding model error: {0}")]
    ModelError(String),
}

/// Trait for embedding text into vectors.
///
/// Implementations handle model loading and inference; the engine only
/// ever compares vectors from the same backend.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// A candidate entity with its similarity to the queried mention.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub entity: Entity,
    pub score: f64,
    /// Number of mentions already resolving to this entity
    pub mention_count: usize,
}

/// Scores candidate entities against a mention's embedding.
pub struct SimilarityRanker {
    embedder: Box<dyn Embedder>,
}

impl SimilarityRanker {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Score each candidate against the mention text, drop those below
    /// the floor, and return the rest highest-score-first.
    ///
    /// One batched embed call covers the mention and every candidate.
    pub fn rank(
        &self,
        mention_text: &str,
        candidates: Vec<(Entity, usize)>,
        floor: f64,
    ) -> Result<Vec<ScoredCandidate>, EmbeddingError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut texts: Vec<&str> = Vec::with_capacity(candidates.len() + 1);
        texts.push(mention_text);
        for (entity, _) in &candidates {
            texts.push(entity.representative_text.as_str());
        }

        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::EmptyResult);
        }
        let (query, candidate_vectors) = vectors.split_first().ok_or(EmbeddingError::EmptyResult)?;

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(candidate_vectors.iter())
            .filter_map(|((entity, mention_count), vector)| {
                let score = cosine_similarity(query, vector) as f64;
                (score >= floor).then_some(ScoredCandidate {
                    entity,
                    score,
                    mention_count,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.mention_count.cmp(&a.mention_count))
                .then(a.entity.id.cmp(&b.entity.id))
        });
        Ok(scored)
    }
}

/// Hashed character-trigram embedder.
///
/// Feature-hashes the case-folded trigrams of a text into a fixed-width
/// count vector. No model, no I/O, fully deterministic; surface forms
/// that share most of their characters score high ("acme corp" against
/// "acme corporation"), unrelated strings score near zero. The default
/// backend for the CLI; services with a real embedding model implement
/// [`Embedder`] over it instead.
pub struct TrigramEmbedder {
    dimensions: usize,
}

impl TrigramEmbedder {
    pub fn new() -> Self {
        Self { dimensions: 256 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let folded: Vec<char> = text.to_lowercase().chars().collect();
        let mut vector = vec![0.0f32; self.dimensions];
        if folded.len() < 3 {
            // Too short for trigrams; hash the whole string.
            let digest = blake3::hash(folded.iter().collect::<String>().as_bytes());
            let index = u64::from_le_bytes(
                digest.as_bytes()[..8].try_into().unwrap_or([0u8; 8]),
            ) as usize
                % self.dimensions;
            vector[index] = 1.0;
            return vector;
        }
        for window in folded.windows(3) {
            let gram: String = window.iter().collect();
            let digest = blake3::hash(gram.as_bytes());
            let index = u64::from_le_bytes(
                digest.as_bytes()[..8].try_into().unwrap_or([0u8; 8]),
            ) as usize
                % self.dimensions;
            vector[index] += 1.0;
        }
        vector
    }
}

impl Default for TrigramEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for TrigramEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
