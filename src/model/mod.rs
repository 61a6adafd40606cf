//! Data model: mention evidence, canonical entities, identifiers

mod entity;
mod mention;

pub use entity::{Entity, EntityId, OrgId};
pub use mention::{MentionId, MentionInput, MentionRecord};
