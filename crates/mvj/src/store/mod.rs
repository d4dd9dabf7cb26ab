//! Persistence seams shared by every domain module.
//!
//! Each domain module declares its own repository trait; the in-memory [`MemoryStore`]
//! implements all of them so services can be composed over a single backing store.

pub mod memory;
pub mod nested;

pub use memory::MemoryStore;
pub use nested::{create_nested, merge_nested, NestedError, NestedRecord};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("{entity} {id} is still referenced by {referenced_by}")]
    Protected {
        entity: &'static str,
        id: u64,
        referenced_by: &'static str,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Source of record identifiers, shared across every table of a store.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> u64;
}
