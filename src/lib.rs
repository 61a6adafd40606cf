//! Coalesce: Cross-Batch Entity Resolution Engine
//!
//! Mentions extracted from documents arrive in batches; coalesce decides,
//! for each one, whether it refers to an entity it has already seen or to
//! something new. Mentions are immutable evidence, entities are the
//! mutable conclusions drawn from them, and every merge decision lands in
//! an append-only ledger so any entity's lineage can be reconstructed and
//! wrong merges can be unwound by splitting.
//!
//! # Core Concepts
//!
//! - **Mentions**: write-once extraction evidence with provenance
//! - **Entities**: canonical referents, refined and merged over time
//! - **Ledger**: append-only history of merge and split decisions
//!
//! # Example
//!
//! ```
//! use coalesce::{
//!     CrossBatchResolver, EntityRegistry, EvidenceStore, IncrementalClusterer, MemoryStore,
//!     ResolverConfig, TrigramEmbedder,
//! };
//! use std::sync::Arc;
//!
//! let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
//! let config = ResolverConfig::default();
//! let registry = Arc::new(EntityRegistry::new(
//!     Arc::clone(&store) as Arc<dyn EvidenceStore>,
//!     Box::new(TrigramEmbedder::new()),
//!     &config,
//! ));
//! let resolver = CrossBatchResolver::new(store.clone(), registry, config);
//! let clusterer = IncrementalClusterer::new(store, resolver);
//! // clusterer.add_batch(&org, inputs).await resolves a batch
//! ```

pub mod clusterer;
pub mod config;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod model;
pub mod ranker;
pub mod registry;
pub mod resolver;
pub mod split;
pub mod store;

pub use clusterer::{BatchResult, IncrementalClusterer};
pub use config::{FilterConfig, ResolverConfig, RetryConfig};
pub use enrich::{Enricher, EnrichmentError, KbCandidate, KbLookup};
pub use error::{ResolveError, ResolveResult};
pub use filter::CandidateFilter;
pub use ledger::{provenance_of, MergeLedger, MergeReason, MergeRecord, ParseMergeReasonError};
pub use model::{Entity, EntityId, MentionId, MentionInput, MentionRecord, OrgId};
pub use ranker::{Embedder, EmbeddingError, ScoredCandidate, SimilarityRanker, TrigramEmbedder};
pub use registry::EntityRegistry;
pub use resolver::{CrossBatchResolver, ResolutionOutcome, ResolutionReport};
pub use split::{SplitOutcome, SplitService};
pub use store::{EvidenceStore, MemoryStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
