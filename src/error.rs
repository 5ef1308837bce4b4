//! Typed errors for the lending core. Every variant except `Storage` is an
//! expected, recoverable outcome that the presentation layer reports and then
//! carries on; `Storage` wraps SQLite failures that nothing above the core can
//! fix.

use std::fmt;

use thiserror::Error;

/// Convenience alias used by every repository and workflow function.
pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

/// The three entity kinds, used to say *what* could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Book,
    Member,
    Record,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Book => "Book",
            EntityKind::Member => "Member",
            EntityKind::Record => "Borrow record",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    /// A field value was rejected before it reached the store.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} #{id} not found.")]
    NotFound { entity: EntityKind, id: i64 },

    /// Uniqueness violation, or a delete/edit blocked by active loans.
    #[error("{0}")]
    Conflict(String),

    #[error("No copies of \"{title}\" are available to borrow.")]
    Unavailable { book_id: i64, title: String },

    #[error("Borrow record #{0} has already been returned.")]
    AlreadyReturned(i64),

    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl LibraryError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LibraryError::Validation(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        LibraryError::Conflict(message.into())
    }

    pub(crate) fn not_found(entity: EntityKind, id: i64) -> Self {
        LibraryError::NotFound { entity, id }
    }

    /// Whether the caller can recover by re-prompting or picking another
    /// entity. Only storage failures are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LibraryError::Storage { .. })
    }
}

/// Attach a short "failed to …" description to raw SQLite errors, mirroring
/// the `anyhow::Context` messages used in the bootstrap code.
pub(crate) trait StorageContext<T> {
    fn storage(self, context: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self, context: &'static str) -> Result<T> {
        self.map_err(|source| LibraryError::Storage { context, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_entity() {
        let err = LibraryError::not_found(EntityKind::Record, 7);
        assert_eq!(err.to_string(), "Borrow record #7 not found.");
    }

    #[test]
    fn only_storage_errors_are_fatal() {
        assert!(LibraryError::validation("bad").is_recoverable());
        assert!(LibraryError::AlreadyReturned(1).is_recoverable());

        let storage: Result<()> = Err(rusqlite::Error::InvalidQuery).storage("failed to load");
        let err = storage.unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "failed to load");
    }
}
