//! Error taxonomy of the article store

use super::codec::CodecError;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures of the article store.
///
/// A query that matches nothing is `Ok(vec![])`; every variant here means the
/// operation itself did not complete.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection parameters or schema settings are unusable
    #[error("store configuration error: {message}")]
    Configuration { message: String },

    /// An article with this URL is already stored
    #[error("article already stored: {url}")]
    DuplicateKey { url: String },

    /// Malformed input (empty or mis-sized embedding, zero `k`, ...)
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Connection, pool or lock failure that may clear up on retry
    #[error("storage unavailable: {source}")]
    Unavailable {
        #[source]
        source: sqlx::Error,
    },

    /// Any other database failure
    #[error("storage error: {source}")]
    Storage {
        #[source]
        source: sqlx::Error,
    },

    /// A stored row cannot be decoded
    #[error("corrupt record {url}: {source}")]
    Corrupt {
        url: String,
        #[source]
        source: CodecError,
    },
}

impl StoreError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether the failed operation may succeed if attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(source: sqlx::Error) -> Self {
        if is_transient_sqlx(&source) {
            Self::Unavailable { source }
        } else {
            Self::Storage { source }
        }
    }
}

/// SQLite primary result codes for a locked database
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // extended codes carry the primary code in the low byte
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}
