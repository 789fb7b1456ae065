//! Error types for sqlmagic.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Connection failures carry a suggestion so callers can surface something actionable
//! instead of a bare driver message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Cannot {operation}: the Sql instance has been disposed")]
    Disposed { operation: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SqlError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create an error for an operation attempted after disposal.
    pub fn disposed(operation: impl Into<String>) -> Self {
        Self::Disposed {
            operation: operation.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
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

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error came from establishing a connection.
    ///
    /// These are the only failures `try_create_connection` swallows; everything
    /// else (disposal, bad input, internal faults) still propagates.
    pub fn is_establishment_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error reports use after disposal.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed { .. })
    }
}

/// Convert sqlx errors to SqlError.
impl From<sqlx::Error> for SqlError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => SqlError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                SqlError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => SqlError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => SqlError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => SqlError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => SqlError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                SqlError::invalid_input(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                SqlError::invalid_input(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => SqlError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                SqlError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => SqlError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => SqlError::connection(
                "Database worker crashed",
                "Create a new connection",
            ),
            _ => SqlError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for sqlmagic operations.
pub type SqlResult<T> = Result<T, SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqlError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = SqlError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(SqlError::disposed("begin a transaction").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(SqlError::timeout("connect", 5).is_retryable());
        assert!(SqlError::connection("err", "sugg").is_retryable());
        assert!(!SqlError::transaction("ended", "tx_1").is_retryable());
    }

    #[test]
    fn test_establishment_failures() {
        assert!(SqlError::connection("refused", "start the server").is_establishment_failure());
        assert!(SqlError::timeout("connect", 5).is_establishment_failure());
        assert!(!SqlError::disposed("create a connection").is_establishment_failure());
        assert!(!SqlError::invalid_input("empty statement").is_establishment_failure());
        assert!(!SqlError::internal("boom").is_establishment_failure());
    }

    #[test]
    fn test_disposed_display() {
        let err = SqlError::disposed("create a connection");
        assert!(err.is_disposed());
        assert_eq!(
            err.to_string(),
            "Cannot create a connection: the Sql instance has been disposed"
        );
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let err: SqlError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, SqlError::Database { .. }));
    }

    #[test]
    fn test_from_sqlx_io_is_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: SqlError = sqlx::Error::Io(io).into();
        assert!(matches!(err, SqlError::Connection { .. }));
    }
}
