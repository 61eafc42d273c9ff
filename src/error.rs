//! Error types for the indexing and retrieval engine.
//!
//! The engine returns [`IndexError`] so callers can tell "index not built yet"
//! and "no such conversation" apart from storage failures. Application edges
//! (CLI, tool handlers, config loading) wrap these in `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by [`SearchIndex`](crate::index::SearchIndex) and the store.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A query was issued before any successful build.
    #[error("search index not initialized: run build_search_index first")]
    NotInitialized,

    /// A lookup by identifier found nothing.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The archive directory itself could not be listed.
    #[error("archive directory unreadable: {}: {source}", path.display())]
    ArchiveUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Fuzzy search was requested but no snapshot has been built.
    #[error("fuzzy index unavailable: the index has not been built in this process")]
    FuzzyUnavailable,

    /// The caller supplied an unusable query or filter.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        IndexError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = IndexError::not_found("conversation", "abc-123");
        assert_eq!(err.to_string(), "conversation not found: abc-123");
    }

    #[test]
    fn not_initialized_message_is_explicit() {
        assert!(IndexError::NotInitialized
            .to_string()
            .contains("not initialized"));
    }
}
