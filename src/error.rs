//! Error types for the SQL bridge.
//!
//! Driver errors never cross the facade unwrapped: every `sqlx::Error` is
//! translated into a [`DbError`] carrying the failure category and, for
//! statement failures, the (truncated) statement text.

use crate::instrument::truncate_sql;
use thiserror::Error;

/// Maximum display width of statement text carried inside errors.
const ERROR_SQL_WIDTH: usize = 160;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error(
        "Connection pool exhausted: no connection became free within {waited_ms}ms (max_connections: {max_connections})"
    )]
    PoolExhausted { max_connections: u32, waited_ms: u64 },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        /// Truncated statement text, empty until attached by the facade.
        sql: String,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Query rejected by validator: {rule} - {reason}")]
    Validation { rule: String, reason: String },

    #[error("Migration {version} of namespace '{namespace}' failed: {message}")]
    Migration {
        namespace: String,
        version: i64,
        message: String,
    },

    #[error("Row mapping failed at row {row}: {message}")]
    Mapping { row: usize, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse failure category used by callers to choose between retry and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Statement,
    Migration,
    Validation,
    Internal,
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool exhaustion error.
    pub fn pool_exhausted(max_connections: u32, waited_ms: u64) -> Self {
        Self::PoolExhausted {
            max_connections,
            waited_ms,
        }
    }

    /// Create a statement error with optional SQL state.
    pub fn statement(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
            sql: String::new(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a validation rejection.
    pub fn validation(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Create a migration failure.
    pub fn migration(
        namespace: impl Into<String>,
        version: i64,
        message: impl Into<String>,
    ) -> Self {
        Self::Migration {
            namespace: namespace.into(),
            version,
            message: message.into(),
        }
    }

    /// Create a row mapping failure.
    pub fn mapping(row: usize, message: impl Into<String>) -> Self {
        Self::Mapping {
            row,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach the attempted statement to a statement error.
    ///
    /// Other kinds are returned unchanged.
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            Self::Statement {
                message,
                sql_state,
                suggestion,
                ..
            } => Self::Statement {
                message,
                sql_state,
                sql: truncate_sql(sql, ERROR_SQL_WIDTH),
                suggestion,
            },
            other => other,
        }
    }

    /// The statement text attached to this error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } if !sql.is_empty() => Some(sql),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Statement { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Increase max_connections or release connections sooner")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::PoolExhausted { .. } | Self::Timeout { .. }
        )
    }

    /// Failure category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. }
            | Self::PoolExhausted { .. }
            | Self::PoolClosed
            | Self::Timeout { .. } => ErrorCategory::Connection,
            Self::Statement { .. } | Self::Schema { .. } | Self::Mapping { .. } => {
                ErrorCategory::Statement
            }
            Self::Migration { .. } => ErrorCategory::Migration,
            Self::Validation { .. } | Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::Config { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::statement(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, constraints and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::statement(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Reconnect to the database",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
