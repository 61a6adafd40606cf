//! Evidence storage backends

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{EvidenceStore, ResolutionCommit, StorageError, StorageResult};
