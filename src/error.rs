//! Error types for the PostgreSQL client layers.
//!
//! All driver failures are converted into [`PqError`] so every layer of the
//! decorator chain speaks the same error type. Transaction bookkeeping errors
//! keep the underlying cause, which lets [`PqError::sql_state`] see through
//! the `begin`/`commit`/`rollback` annotations.

use thiserror::Error;

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum PqError {
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g. "23505" for a unique violation
        sql_state: Option<String>,
        constraint: Option<String>,
    },

    #[error("no rows in result set")]
    NoRows,

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("begin transaction: {0}")]
    Begin(#[source] Box<PqError>),

    #[error("commit transaction: {0}")]
    Commit(#[source] Box<PqError>),

    #[error("transaction aborted by a failed statement, rolled back")]
    TxAborted,

    #[error("{cause}; rollback transaction: {rollback}")]
    Rollback {
        #[source]
        cause: Box<PqError>,
        rollback: Box<PqError>,
    },

    #[error("pool '{name}' already registered")]
    AlreadyRegistered { name: String },

    #[error("batch statement {index} skipped: statement {failed} failed")]
    BatchAborted { index: usize, failed: usize },

    #[error("batch has no more results")]
    BatchExhausted,

    #[error("{message}")]
    Other { message: String },
}

impl PqError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQLSTATE and constraint name.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        constraint: Option<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            constraint,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create an error for a failure raised by caller code, typically inside
    /// a transaction callback.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    pub fn begin(cause: PqError) -> Self {
        Self::Begin(Box::new(cause))
    }

    pub fn commit(cause: PqError) -> Self {
        Self::Commit(Box::new(cause))
    }

    /// Merge a callback failure with the rollback failure that followed it.
    pub fn rollback(cause: PqError, rollback: PqError) -> Self {
        Self::Rollback {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }

    /// SQLSTATE carried by this error or by the error it annotates.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            Self::Begin(inner) | Self::Commit(inner) => inner.sql_state(),
            Self::Rollback { cause, .. } => cause.sql_state(),
            _ => None,
        }
    }

    /// Name of the violated constraint, when the server reported one.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            Self::Database { constraint, .. } => constraint.as_deref(),
            Self::Begin(inner) | Self::Commit(inner) => inner.constraint(),
            Self::Rollback { cause, .. } => cause.constraint(),
            _ => None,
        }
    }

    /// True when the server rejected a statement with `unique_violation`.
    pub fn is_unique_violation(&self) -> bool {
        self.sql_state() == Some(UNIQUE_VIOLATION)
    }

    /// True for the empty single-row read.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }
}

/// Report whether `result` failed with a duplicate key (SQLSTATE `23505`).
///
/// `Ok` results are never duplicates.
pub fn is_duplicated<T>(result: &PqResult<T>) -> bool {
    matches!(result, Err(err) if err.is_unique_violation())
}

/// Convert sqlx errors to PqError.
impl From<sqlx::Error> for PqError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => PqError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => PqError::database(
                db_err.message(),
                db_err.code().map(|code| code.into_owned()),
                db_err.constraint().map(String::from),
            ),
            sqlx::Error::RowNotFound => PqError::NoRows,
            sqlx::Error::PoolTimedOut => PqError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => PqError::connection("connection pool is closed"),
            sqlx::Error::Io(io_err) => PqError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => PqError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => PqError::connection(format!("Protocol error: {}", msg)),
            sqlx::Error::TypeNotFound { type_name } => PqError::Decode {
                message: format!("type not found: {}", type_name),
            },
            sqlx::Error::ColumnNotFound(col) => PqError::Decode {
                message: format!("column not found: {}", col),
            },
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => PqError::Decode {
                message: format!("column index {} out of bounds (len: {})", index, len),
            },
            sqlx::Error::ColumnDecode { index, source } => PqError::Decode {
                message: format!("failed to decode column {}: {}", index, source),
            },
            sqlx::Error::Decode(source) => PqError::Decode {
                message: source.to_string(),
            },
            sqlx::Error::WorkerCrashed => PqError::connection("database worker crashed"),
            other => PqError::other(other.to_string()),
        }
    }
}

/// Result type alias for client operations.
pub type PqResult<T> = Result<T, PqError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn duplicate() -> PqError {
        PqError::database(
            "duplicate key value violates unique constraint \"users_email_key\"",
            Some("23505".to_string()),
            Some("users_email_key".to_string()),
        )
    }

    #[test]
    fn test_duplicate_detected_by_sql_state() {
        let result: PqResult<()> = Err(duplicate());
        assert!(is_duplicated(&result));
    }

    #[test]
    fn test_other_sql_state_is_not_duplicate() {
        let result: PqResult<()> = Err(PqError::database(
            "null value in column \"email\"",
            Some("23502".to_string()),
            None,
        ));
        assert!(!is_duplicated(&result));
    }

    #[test]
    fn test_ok_is_not_duplicate() {
        let result: PqResult<u64> = Ok(1);
        assert!(!is_duplicated(&result));
    }

    #[test]
    fn test_non_database_errors_are_not_duplicates() {
        for err in [
            PqError::NoRows,
            PqError::timeout("exec"),
            PqError::connection("refused"),
            PqError::other("23505"),
            PqError::database("no code", None, None),
        ] {
            assert!(!err.is_unique_violation(), "{err}");
        }
    }

    #[test]
    fn test_duplicate_seen_through_commit() {
        // deferred constraints fire at commit time
        let err = PqError::commit(duplicate());
        assert!(err.is_unique_violation());
        assert_eq!(err.constraint(), Some("users_email_key"));
        assert!(err.to_string().starts_with("commit transaction: "));
    }

    #[test]
    fn test_rollback_message_contains_both_failures() {
        let err = PqError::rollback(duplicate(), PqError::connection("connection reset"));
        let msg = err.to_string();
        assert!(msg.contains("duplicate key value"));
        assert!(msg.contains("rollback transaction: Connection failed: connection reset"));
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_aborted_commit_message() {
        let err = PqError::commit(PqError::TxAborted);
        assert_eq!(
            err.to_string(),
            "commit transaction: transaction aborted by a failed statement, rolled back"
        );
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_begin_message() {
        let err = PqError::begin(PqError::timeout("connection pool acquire"));
        assert_eq!(
            err.to_string(),
            "begin transaction: Timeout: connection pool acquire"
        );
    }

    #[test]
    fn test_row_not_found_maps_to_no_rows() {
        let err: PqError = sqlx::Error::RowNotFound.into();
        assert!(err.is_no_rows());
    }

    #[test]
    fn test_pool_errors_map_to_connection_and_timeout() {
        let closed: PqError = sqlx::Error::PoolClosed.into();
        assert!(matches!(closed, PqError::Connection { .. }));
        let timed_out: PqError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(timed_out, PqError::Timeout { .. }));
    }
}
