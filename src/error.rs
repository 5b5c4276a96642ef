//! Error types for the pooled data-access layer.
//!
//! All fallible operations return [`DaoResult`]. Absence of a row is never an
//! error: lookups return `Option`, `delete` returns `bool`. Operating on a
//! closed DAO is a programmer error and panics instead of returning a value
//! here.
//!
//! Variants are `Clone` on purpose: a background failure is logged eagerly
//! and also delivered through the fire-and-forget handle.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DaoError {
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        message: String,
        /// Driver error code, e.g. "2067" for a SQLite unique violation.
        code: Option<String>,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        code: Option<String>,
    },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Background operation cancelled before completion")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DaoError {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a pool exhaustion error.
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create a constraint violation error.
    pub fn constraint(message: impl Into<String>, code: Option<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
            code,
        }
    }

    /// Create a database error with optional driver code.
    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable by acquiring a fresh unit of work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolExhausted { .. })
    }
}

/// Convert sqlx errors to DaoError.
impl From<sqlx::Error> for DaoError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::Configuration(msg) => DaoError::connection(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match db_err.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => {
                        DaoError::constraint(db_err.message().to_string(), code)
                    }
                    _ => DaoError::database(db_err.message().to_string(), code),
                }
            }
            sqlx::Error::PoolTimedOut => {
                DaoError::pool_exhausted("timed out waiting for a free connection")
            }
            sqlx::Error::PoolClosed => DaoError::connection("connection pool is closed"),
            sqlx::Error::Io(io_err) => DaoError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DaoError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                DaoError::connection(format!("protocol error: {}", msg))
            }
            sqlx::Error::RowNotFound => {
                // Lookups use fetch_optional; hitting this means a query was
                // built with the wrong fetch mode.
                DaoError::internal("query unexpectedly returned no rows")
            }
            sqlx::Error::ColumnNotFound(col) => {
                DaoError::decode(format!("column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                DaoError::decode(format!("column index {} out of bounds (len: {})", index, len))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DaoError::decode(format!("failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DaoError::decode(format!("decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DaoError::internal("database worker crashed"),
            other => DaoError::internal(format!("unexpected database error: {}", other)),
        }
    }
}

impl From<serde_json::Error> for DaoError {
    fn from(err: serde_json::Error) -> Self {
        DaoError::decode(err.to_string())
    }
}

/// Result type alias for data-access operations.
pub type DaoResult<T> = Result<T, DaoError>;
