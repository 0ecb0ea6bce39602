//! Error types for the iSeries SQL engine.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! The variants follow the engine's failure taxonomy: configuration problems are raised
//! before any I/O, connection and network failures come from the transport, and SQL errors
//! carry the normalized backend message together with the SQL state and code so callers can
//! still branch on them.

use crate::db::diagnostics::{self, Diagnostic};
use thiserror::Error;

/// SQL state raised by a datalock guard when the authorization predicate does not hold.
pub const DATALOCK_SQL_STATE: &str = "JHDLE";

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("DB Connect Error: {message}")]
    Connection {
        message: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        diagnostics: Vec<Diagnostic>,
        /// Index of the statement that was running when the transport failed.
        statement_index: Option<usize>,
    },

    #[error("{message}")]
    Sql {
        message: String,
        sql_state: Option<String>,
        code: Option<i32>,
        diagnostics: Vec<Diagnostic>,
        statement_index: Option<usize>,
        /// Statement text, kept for logging only.
        sql: Option<String>,
    },

    #[error("SQL missing DATALOCKS slot in query: {sql}")]
    DatalockSlotMissing { sql: String },

    #[error("Composition error: {message}")]
    Composition { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error without backend diagnostics.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Create a transport failure without backend diagnostics.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            diagnostics: Vec::new(),
            statement_index: None,
        }
    }

    /// Create a plain SQL error with no structured diagnostics.
    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
            sql_state: None,
            code: None,
            diagnostics: Vec::new(),
            statement_index: None,
            sql: None,
        }
    }

    /// Classify a structured backend error raised while executing a statement.
    ///
    /// Diagnostics carrying a transport failure code produce [`DbError::Network`];
    /// everything else becomes a normalized [`DbError::Sql`].
    pub fn backend(message: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let message = message.into();
        let normalized = diagnostics::normalize_message(&message, &diagnostics);
        if diagnostics::is_network_failure(&diagnostics) {
            return Self::Network {
                message: normalized,
                diagnostics,
                statement_index: None,
            };
        }
        let first = diagnostics
            .iter()
            .find(|d| !diagnostics::is_benign(d.code));
        Self::Sql {
            message: normalized,
            sql_state: first.map(|d| d.state.clone()),
            code: first.map(|d| d.code),
            diagnostics,
            statement_index: None,
            sql: None,
        }
    }

    /// Classify a failure to establish a connection or a pool.
    pub fn connect_failed(message: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let message = message.into();
        let normalized = diagnostics::normalize_message(&message, &diagnostics);
        if diagnostics::is_network_failure(&diagnostics) {
            Self::Network {
                message: normalized,
                diagnostics,
                statement_index: None,
            }
        } else {
            Self::Connection {
                message: normalized,
                diagnostics,
            }
        }
    }

    /// Create a missing-datalock-slot error for the given statement.
    pub fn datalock_slot_missing(sql: impl Into<String>) -> Self {
        Self::DatalockSlotMissing { sql: sql.into() }
    }

    /// Create a composition error.
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
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

    /// Attach the index of the failing statement within its unit of work.
    pub fn at_statement(mut self, index: usize) -> Self {
        match &mut self {
            Self::Network {
                statement_index, ..
            }
            | Self::Sql {
                statement_index, ..
            } => *statement_index = Some(index),
            _ => {}
        }
        self
    }

    /// Attach the statement text to a SQL error.
    pub fn with_sql(mut self, text: impl Into<String>) -> Self {
        if let Self::Sql { sql, .. } = &mut self {
            *sql = Some(text.into());
        }
        self
    }

    /// Index of the failing statement, when the error came from a statement.
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::Network {
                statement_index, ..
            }
            | Self::Sql {
                statement_index, ..
            } => *statement_index,
            _ => None,
        }
    }

    /// Check if this error indicates the transport itself is unusable.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// SQL state of a backend error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Sql { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if a datalock guard rejected the statement.
    pub fn is_datalock_violation(&self) -> bool {
        self.sql_state() == Some(DATALOCK_SQL_STATE)
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.is_network()
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let state = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                let code = state.parse::<i32>().unwrap_or(-1);
                let message = db_err.message().to_string();
                DbError::backend(
                    message.clone(),
                    vec![Diagnostic::new(state, code, message)],
                )
            }
            sqlx::Error::Io(io_err) => {
                let message = format!("Communication link failure: {}", io_err);
                match diagnostics::io_failure_code(io_err.kind()) {
                    Some(code) => DbError::backend(
                        message.clone(),
                        vec![Diagnostic::new("08S01", code, message)],
                    ),
                    None => DbError::connection(message),
                }
            }
            sqlx::Error::PoolTimedOut => DbError::backend(
                "Connection acquire timed out",
                vec![Diagnostic::new(
                    "08S01",
                    diagnostics::CONNECTION_TIMED_OUT,
                    "Connection acquire timed out",
                )],
            ),
            sqlx::Error::PoolClosed => DbError::connection("Connection pool is closed"),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("Protocol error: {}", msg)),
            sqlx::Error::RowNotFound => DbError::sql("No rows returned"),
            sqlx::Error::ColumnNotFound(col) => DbError::sql(format!("Column not found: {}", col)),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::AnyDriverError(err) => {
                DbError::connection(format!("Driver error: {}", err))
            }
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_with_network_code_is_network() {
        let err = DbError::backend(
            "Communication link failure",
            vec![Diagnostic::new(
                "08S01",
                10054,
                "[IBM][System i Access ODBC Driver]Communication link failure. comm rc=10054",
            )],
        );
        assert!(err.is_network());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_backend_error_keeps_state_and_code() {
        let err = DbError::backend(
            "[odbc] Error executing the sql statement",
            vec![
                Diagnostic::new(
                    "HY000",
                    69898,
                    "[IBM][System i Access ODBC Driver][DB2 for i5/OS]PWS0005 - Error occurred in the database host server code.",
                ),
                Diagnostic::new(
                    "42601",
                    -104,
                    "[IBM][System i Access ODBC Driver][DB2 for i5/OS]SQL0104 - Token <END-OF-STATEMENT> was not valid.",
                ),
            ],
        );
        assert!(!err.is_network());
        assert_eq!(err.sql_state(), Some("42601"));
        match &err {
            DbError::Sql { code, .. } => assert_eq!(*code, Some(-104)),
            other => panic!("unexpected error: {other:?}"),
        }
        let text = err.to_string();
        assert!(text.contains("Token"));
        assert!(!text.contains("host server code"));
        assert!(!text.contains("System i"));
    }

    #[test]
    fn test_statement_index_attached() {
        let err = DbError::sql("boom").at_statement(2);
        assert_eq!(err.statement_index(), Some(2));

        let err = DbError::config("missing").at_statement(2);
        assert_eq!(err.statement_index(), None);
    }

    #[test]
    fn test_datalock_violation_detected() {
        let err = DbError::backend(
            "INVALID ACCESS",
            vec![Diagnostic::new(DATALOCK_SQL_STATE, -438, "SQL0438 - INVALID ACCESS")],
        );
        assert!(err.is_datalock_violation());
        assert_eq!(err.to_string(), "INVALID ACCESS :: INVALID ACCESS");
    }

    #[test]
    fn test_connect_failure_classification() {
        let err = DbError::connect_failed(
            "Communication link failure",
            vec![Diagnostic::new("08S01", 10060, "comm rc=10060")],
        );
        assert!(err.is_network());

        let err = DbError::connect_failed(
            "Login failed",
            vec![Diagnostic::new("28000", 8002, "invalid password")],
        );
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.to_string().starts_with("DB Connect Error: "));
    }

    #[test]
    fn test_io_error_maps_to_network() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: DbError = sqlx::Error::Io(io).into();
        assert!(err.is_network());
    }
}
