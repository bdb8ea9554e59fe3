//! Error types for store operations.

use sqlx::error::DatabaseError;
use thiserror::Error;

/// Operational fault that may clear if the operation is simply re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientFault {
    /// `SQLite` reported the database busy or locked.
    Locked,
    /// No pooled connection became free in time.
    PoolTimeout,
    Io,
    /// Raised by a store implementation other than `SQLite`.
    External,
}

impl TransientFault {
    /// Classifies a sqlx error. `None` means re-issuing will not help.
    #[must_use]
    pub fn of(error: &sqlx::Error) -> Option<Self> {
        match error {
            sqlx::Error::PoolTimedOut => Some(Self::PoolTimeout),
            sqlx::Error::Io(_) => Some(Self::Io),
            sqlx::Error::Database(database_error) if is_locked(database_error.as_ref()) => {
                Some(Self::Locked)
            }
            _ => None,
        }
    }
}

/// `SQLITE_BUSY` (5) or `SQLITE_LOCKED` (6), extended codes included.
fn is_locked(error: &dyn DatabaseError) -> bool {
    let primary = error
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff);
    matches!(primary, Some(5 | 6)) || error.message().contains("database is locked")
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Cursors are recreated on this rather than abandoned.
    #[error("transient store fault ({fault:?}): {message}")]
    Transient {
        fault: TransientFault,
        message: String,
    },

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be (de)serialized.
    #[error("invalid stored value in {field}: {message}")]
    Serialization {
        field: &'static str,
        message: String,
    },

    /// The owning document does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The owning attachment does not exist on the document.
    #[error("attachment {attachment_id} not found on document {document_id}")]
    AttachmentNotFound {
        document_id: String,
        attachment_id: String,
    },
}

impl StoreError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// A transient fault raised outside sqlx, e.g. by a test double.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            fault: TransientFault::External,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        let message = error.to_string();
        match TransientFault::of(&error) {
            Some(fault) => Self::Transient { fault, message },
            None => Self::Database(message),
        }
    }
}
