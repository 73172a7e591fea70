//! Error types for talk2sql.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Column {column} has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("Pool runtime error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),
}

impl DatabaseError {
    /// Whether the error happened while obtaining a connection and may
    /// clear up on its own.
    ///
    /// `PgStore` retries only these; a statement that was sent is never re-run.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            Self::Pool(_) => true,
            #[cfg(feature = "postgres")]
            Self::PoolRuntime(e) => matches!(
                e,
                deadpool_postgres::PoolError::Timeout(_) | deadpool_postgres::PoolError::Backend(_)
            ),
            _ => false,
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reading or writing tabular artifacts and rendered views.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact {path} not found")]
    NotFound { path: String },

    #[error("Artifact reference {reference} is outside {root}")]
    OutsideRoot { reference: String, root: String },

    #[error("Invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("Artifact {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Tool execution errors.
///
/// Every variant maps onto one [`FailureKind`] through [`ToolError::kind`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Store fault: {0}")]
    Store(#[from] DatabaseError),

    #[error("Artifact fault: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Display fault: {0}")]
    Display(String),

    #[error("Invalid input for tool {name}: {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Tool {name} timed out after {timeout:?}")]
    Timeout {
        name: String,
        timeout: Duration,
        kind: FailureKind,
    },
}

impl ToolError {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SchemaViolation(_) => FailureKind::SchemaViolation,
            Self::Store(_) => FailureKind::StoreFault,
            Self::Artifact(_) => FailureKind::ArtifactFault,
            Self::Display(_) => FailureKind::DisplayFault,
            Self::InvalidInput { .. } | Self::NotFound { .. } => FailureKind::PlanFault,
            Self::Timeout { kind, .. } => *kind,
        }
    }
}

/// Classes of failure a run can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A query or result referenced a field outside the schema contract.
    SchemaViolation,
    /// Connection or execution failure against the record store.
    StoreFault,
    /// Read or write failure on the tabular artifact or rendered document.
    ArtifactFault,
    /// The display surface could not be launched. Never terminal.
    DisplayFault,
    /// The planner asked for an unknown tool or passed an incompatible input.
    PlanFault,
}

impl FailureKind {
    /// Whether a run hitting this kind of failure should stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DisplayFault)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SchemaViolation => "schema_violation",
            Self::StoreFault => "store_fault",
            Self::ArtifactFault => "artifact_fault",
            Self::DisplayFault => "display_fault",
            Self::PlanFault => "plan_fault",
        };
        write!(f, "{}", s)
    }
}

/// Structured failure reported to the caller of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn plan(message: impl Into<String>) -> Self {
        Self::new(FailureKind::PlanFault, message)
    }
}

impl From<&ToolError> for Failure {
    fn from(err: &ToolError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<ToolError> for Failure {
    fn from(err: ToolError) -> Self {
        Self::from(&err)
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_kinds() {
        assert_eq!(
            ToolError::SchemaViolation("x".into()).kind(),
            FailureKind::SchemaViolation
        );
        assert_eq!(
            ToolError::Store(DatabaseError::Query("boom".into())).kind(),
            FailureKind::StoreFault
        );
        assert_eq!(
            ToolError::Artifact(ArtifactError::NotFound { path: "a.csv".into() }).kind(),
            FailureKind::ArtifactFault
        );
        assert_eq!(
            ToolError::InvalidInput {
                name: "t".into(),
                reason: "bad".into()
            }
            .kind(),
            FailureKind::PlanFault
        );
        assert_eq!(
            ToolError::Timeout {
                name: "t".into(),
                timeout: Duration::from_secs(1),
                kind: FailureKind::StoreFault,
            }
            .kind(),
            FailureKind::StoreFault
        );
    }

    #[test]
    fn test_display_fault_is_not_fatal() {
        assert!(!FailureKind::DisplayFault.is_fatal());
        assert!(FailureKind::StoreFault.is_fatal());
        assert!(FailureKind::PlanFault.is_fatal());
    }

    #[test]
    fn test_failure_serializes_kind_and_message() {
        let failure = Failure::new(FailureKind::StoreFault, "relation does not exist");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "store_fault");
        assert_eq!(json["message"], "relation does not exist");
    }

    #[test]
    fn test_connection_fault_classification() {
        assert!(DatabaseError::Pool("refused".into()).is_connection_fault());
        assert!(!DatabaseError::Query("syntax".into()).is_connection_fault());
        assert!(
            !DatabaseError::UnsupportedType {
                column: "price".into(),
                type_name: "numeric".into()
            }
            .is_connection_fault()
        );
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_closed_pool_is_not_retried() {
        let err = DatabaseError::from(deadpool_postgres::PoolError::Closed);
        assert!(!err.is_connection_fault());
    }
}
