//! Canonical entities and tenant identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Tenant (organization) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgId(String);

impl OrgId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrgId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OrgId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a canonical entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new random EntityId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EntityId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A canonical, deduplicated real-world referent.
///
/// An entity exists because a mention needed one; its identity is stable
/// even as the representative text or attributes are refined by later
/// merges. When a merge folds this entity into another, `absorbed_into`
/// is set and the entity stops participating in candidate lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub org_id: OrgId,
    /// Representative surface form shown to consumers
    pub representative_text: String,
    /// Normalized surface form used for candidate lookup
    pub normalized_text: String,
    /// Type labels, union-merged across mentions. BTreeSet keeps the
    /// serialized order deterministic.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub type_labels: BTreeSet<String>,
    /// Free-form attributes (enrichment lands here)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_ref: Option<String>,
    /// Confidence in [0, 1] that this entity is correctly grounded
    pub grounding_confidence: f64,
    /// Set when this entity was absorbed into another by a merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absorbed_into: Option<EntityId>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Seed a new entity from a mention's surface form.
    pub fn seeded(
        org_id: OrgId,
        representative_text: impl Into<String>,
        normalized_text: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: EntityId::new(),
            org_id,
            representative_text: representative_text.into(),
            normalized_text: normalized_text.into(),
            type_labels: BTreeSet::new(),
            attributes: HashMap::new(),
            ontology_ref: None,
            grounding_confidence: confidence,
            absorbed_into: None,
            created_at: Utc::now(),
        }
    }

    /// Add a type label
    pub fn with_type_label(mut self, label: impl Into<String>) -> Self {
        self.type_labels.insert(label.into());
        self
    }

    /// True while this entity is a live canonical target (not absorbed).
    pub fn is_live(&self) -> bool {
        self.absorbed_into.is_none()
    }

    /// Refine this entity with evidence from another: union the type
    /// labels, keep the higher grounding confidence, and fill attribute
    /// keys we do not already have. Identity and representative text are
    /// untouched.
    pub fn refine_from(&mut self, other: &Entity) {
        for label in &other.type_labels {
            self.type_labels.insert(label.clone());
        }
        if other.grounding_confidence > self.grounding_confidence {
            self.grounding_confidence = other.grounding_confidence;
        }
        for (k, v) in &other.attributes {
            self.attributes.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if self.ontology_ref.is_none() {
            self.ontology_ref = other.ontology_ref.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_entity_is_live() {
        let e = Entity::seeded(OrgId::from("acme"), "Acme Corp", "acme corp", 0.9);
        assert!(e.is_live());
        assert_eq!(e.normalized_text, "acme corp");
    }

    #[test]
    fn refine_unions_labels_and_keeps_max_confidence() {
        let mut a = Entity::seeded(OrgId::from("acme"), "Acme Corp", "acme corp", 0.6)
            .with_type_label("organization");
        let b = Entity::seeded(OrgId::from("acme"), "Acme Corporation", "acme corporation", 0.9)
            .with_type_label("company");

        a.refine_from(&b);
        assert!(a.type_labels.contains("organization"));
        assert!(a.type_labels.contains("company"));
        assert_eq!(a.grounding_confidence, 0.9);
        assert_eq!(a.representative_text, "Acme Corp");
    }
}
