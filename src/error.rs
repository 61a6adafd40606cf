//! Resolution error taxonomy

use thiserror::Error;

use crate::enrich::EnrichmentError;
use crate::ranker::EmbeddingError;
use crate::store::StorageError;

/// Errors surfaced by resolution operations.
///
/// Validation errors are never retried. Storage errors are retried with
/// backoff when [`StorageError::is_transient`] says so. Cluster errors
/// fail a whole batch, as opposed to per-mention skips which are folded
/// into the batch report.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),
}

impl ResolveError {
    /// True for failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Enrichment(e) => e.is_transient(),
            // Similarity computation crosses an I/O boundary; its
            // failures are treated as transient infrastructure.
            Self::Embedding(_) => true,
            Self::Validation(_) | Self::Cluster(_) => false,
        }
    }
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_never_transient() {
        assert!(!ResolveError::Validation("empty text".into()).is_transient());
    }

    #[test]
    fn busy_storage_is_transient() {
        let err = ResolveError::Storage(StorageError::Busy("locked".into()));
        assert!(err.is_transient());
    }
}
