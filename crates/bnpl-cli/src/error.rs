//! Error type for CLI commands

use bnpl_contracts::ContractError;
use bnpl_core::CoreError;
use bnpl_ingest::IngestError;
use bnpl_metrics::MetricError;
use bnpl_schema::SchemaError;
use thiserror::Error;

use crate::cli::ExitCode;

/// Errors surfaced by a command
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl CliError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    /// Exit code reported for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(CoreError::FileError(_)) => ExitCode::FileError,
            CliError::Config(e) if e.is_user_error() => ExitCode::InvalidInput,
            CliError::Ingest(IngestError::Io { .. }) => ExitCode::FileError,
            CliError::Ingest(_) | CliError::InvalidInput(_) => ExitCode::InvalidInput,
            CliError::Schema(_) => ExitCode::SchemaError,
            CliError::Metric(MetricError::UnknownMetric(_) | MetricError::InvalidInput(_)) => {
                ExitCode::InvalidInput
            }
            CliError::Contract(ContractError::InvalidContracts(_)) => ExitCode::InvalidInput,
            _ => ExitCode::InternalError,
        }
    }
}

/// Result type alias for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;
