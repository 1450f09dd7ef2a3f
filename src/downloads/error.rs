//! Error types for download lifecycle operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for download persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out or is closed.
    PoolUnavailable,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl DownloadDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::PoolUnavailable,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                let code = database_error.code();
                if matches!(code.as_deref(), Some("5" | "6" | "SQLITE_BUSY" | "SQLITE_LOCKED"))
                    || database_error.message().to_ascii_lowercase().contains("locked")
                {
                    Self::BusyOrLocked
                } else if database_error.is_unique_violation()
                    || database_error.is_check_violation()
                    || code.as_deref().is_some_and(|c| c.starts_with("SQLITE_CONSTRAINT"))
                {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DownloadDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolUnavailable => "pool_unavailable",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Errors that can occur while managing downloads.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Persisting or loading the download set failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification.
        kind: DownloadDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// A persisted row could not be decoded.
    #[error("corrupt download record '{id}': {reason}")]
    CorruptRecord {
        /// Internal download id.
        id: String,
        /// What could not be decoded.
        reason: String,
    },
}

impl From<sqlx::Error> for DownloadError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DownloadDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl DownloadError {
    /// Creates a `CorruptRecord` error.
    #[must_use]
    pub fn corrupt(id: &str, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<DownloadDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::CorruptRecord { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_database_message() {
        let err = DownloadError::Database {
            kind: DownloadDbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("busy_or_locked"));
        assert_eq!(err.database_kind(), Some(DownloadDbErrorKind::BusyOrLocked));
    }

    #[test]
    fn test_download_error_from_sqlx_pool_timeout() {
        let err = DownloadError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.database_kind(), Some(DownloadDbErrorKind::PoolUnavailable));
    }

    #[test]
    fn test_download_error_corrupt_record() {
        let err = DownloadError::corrupt("abc", "bad status");
        assert!(err.to_string().contains("abc"));
        assert_eq!(err.database_kind(), None);
    }
}
