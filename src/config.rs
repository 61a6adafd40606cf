//! Tunable resolution configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the resolution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum cosine similarity for a candidate to be considered a
    /// match. Candidates below the floor are dropped.
    pub similarity_floor: f64,
    /// Maximum concurrent per-mention resolutions within one batch.
    /// Deliberate backpressure: each resolution does at least one
    /// storage write and one similarity computation.
    pub max_concurrent: usize,
    /// Acting principal recorded on automatic ledger entries
    pub actor: String,
    pub retry: RetryConfig,
    pub filter: FilterConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.8,
            max_concurrent: 5,
            actor: "resolver".to_string(),
            retry: RetryConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_similarity_floor(mut self, floor: f64) -> Self {
        self.similarity_floor = floor;
        self
    }

    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = limit.max(1);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Backoff policy for transient storage failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per mention before it is marked skipped
    pub max_attempts: u32,
    /// Base delay, doubled per attempt
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// Candidate filter sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub expected_items: usize,
    pub fp_rate: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_items: 100_000,
            fp_rate: 0.01,
        }
    }
}
