//! Error types for contract enforcement and response composition

use bnpl_core::CoreError;
use chrono::NaiveDate;
use thiserror::Error;

/// Contract layer errors
///
/// Policy denials are not errors: they are returned as
/// [`Decision::Deny`](crate::Decision::Deny) so that they are logged and
/// reported like any other decision.
#[derive(Error, Debug)]
pub enum ContractError {
    /// The audit sink could not durably record the decision
    #[error("Audit log unavailable: {0}")]
    AuditUnavailable(String),

    /// The query result cannot support a composed response
    #[error("Incomplete evidence for {metric} in {table}: {detail}")]
    IncompleteEvidence {
        metric: String,
        table: String,
        date: Option<NaiveDate>,
        detail: String,
    },

    /// Rows were requested for a denied decision
    #[error("Query was denied: {0}")]
    NotAuthorized(String),

    /// Contract set rejected on load or reload
    #[error("Invalid contracts: {0}")]
    InvalidContracts(String),
}

impl ContractError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ContractError::AuditUnavailable(_) => "AUDIT_UNAVAILABLE",
            ContractError::IncompleteEvidence { .. } => "INCOMPLETE_EVIDENCE",
            ContractError::NotAuthorized(_) => "NOT_AUTHORIZED",
            ContractError::InvalidContracts(_) => "INVALID_CONTRACTS",
        }
    }

    /// Create an audit error
    pub fn audit(msg: impl Into<String>) -> Self {
        ContractError::AuditUnavailable(msg.into())
    }

    /// Check if this error means the query must fail closed
    pub fn is_fail_closed(&self) -> bool {
        matches!(self, ContractError::AuditUnavailable(_))
    }
}

impl From<CoreError> for ContractError {
    fn from(err: CoreError) -> Self {
        ContractError::InvalidContracts(err.to_string())
    }
}

/// Result type alias for contract operations
pub type Result<T> = std::result::Result<T, ContractError>;
