//! Optional external knowledge-base enrichment.
//!
//! The lookup service is an external collaborator specified only at this
//! trait boundary. Enrichment is best-effort and additive: it decorates
//! an entity's attributes and never participates in merge/create
//! decisions, and a failing lookup never blocks resolution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::error::ResolveResult;
use crate::model::EntityId;
use crate::store::EvidenceStore;

/// Typed failures from the external lookup.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment service error: {0}")]
    Service(String),

    #[error("enrichment request timed out")]
    Timeout,

    #[error("enrichment rate limited")]
    RateLimited {
        /// Server-provided hint, when present
        retry_after: Option<Duration>,
    },
}

impl EnrichmentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited { .. })
    }
}

/// One ranked candidate from the external knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbCandidate {
    pub external_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub score: f64,
}

/// Free-text entity lookup against an external knowledge base.
#[async_trait]
pub trait KbLookup: Send + Sync {
    /// Query the service, returning candidates ranked best-first.
    async fn lookup(
        &self,
        query: &str,
        language: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KbCandidate>, EnrichmentError>;
}

/// Applies the best external candidate onto an entity's attributes.
pub struct Enricher {
    store: Arc<dyn EvidenceStore>,
    lookup: Arc<dyn KbLookup>,
    language: Option<String>,
    limit: usize,
}

impl Enricher {
    pub fn new(store: Arc<dyn EvidenceStore>, lookup: Arc<dyn KbLookup>) -> Self {
        Self {
            store,
            lookup,
            language: None,
            limit: 5,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Best-effort enrichment of one entity. Returns `Ok(true)` when an
    /// external candidate was applied, `Ok(false)` when the entity is
    /// unknown, already absorbed, the service failed, or nothing came
    /// back. Lookup failures are logged, never propagated.
    pub async fn enrich_entity(&self, entity_id: &EntityId) -> ResolveResult<bool> {
        let Some(mut entity) = self.store.get_entity(entity_id)? else {
            return Ok(false);
        };
        if !entity.is_live() {
            return Ok(false);
        }

        let candidates = match self
            .lookup
            .lookup(
                &entity.representative_text,
                self.language.as_deref(),
                self.limit,
            )
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(entity = %entity_id, error = %e, "enrichment lookup failed");
                return Ok(false);
            }
        };

        let Some(best) = candidates.into_iter().max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            return Ok(false);
        };

        entity
            .attributes
            .insert("kb_id".into(), best.external_id.clone().into());
        entity
            .attributes
            .insert("kb_label".into(), best.label.into());
        if let Some(description) = best.description {
            entity
                .attributes
                .insert("kb_description".into(), description.into());
        }
        if let Some(url) = best.url {
            entity.attributes.insert("kb_url".into(), url.into());
        }
        entity.attributes.insert("kb_score".into(), best.score.into());
        if entity.ontology_ref.is_none() {
            entity.ontology_ref = Some(best.external_id);
        }

        self.store.update_entity(&entity)?;
        Ok(true)
    }
}
