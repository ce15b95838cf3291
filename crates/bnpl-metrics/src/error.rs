//! Error types for metric computation and Gold publication

use chrono::NaiveDate;
use thiserror::Error;

/// Metric engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    /// A required Silver source was not loaded for the bucket
    #[error("Insufficient data for {metric} on {date}: source table '{table}' not loaded")]
    InsufficientData {
        metric: String,
        table: String,
        date: NaiveDate,
    },

    /// A Gold dependency has not been published for the bucket
    #[error("Upstream not ready for {metric} on {date}: '{dependency}' is not published")]
    UpstreamNotReady {
        metric: String,
        dependency: String,
        date: NaiveDate,
    },

    /// More than one currency contributes to a single sum
    #[error("Mixed currencies in {metric} on {date}: {}", .currencies.join(", "))]
    MixedCurrency {
        metric: String,
        date: NaiveDate,
        currencies: Vec<String>,
    },

    /// Partition version moved between read and publish
    #[error("Publish conflict on {table}/{metric}/{date}: expected version {expected}, found {found}")]
    PublishConflict {
        table: String,
        metric: String,
        date: NaiveDate,
        expected: u64,
        found: u64,
    },

    /// Metric dependencies form a cycle
    #[error("Dependency cycle between metrics: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// No metric with that name
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Bad argument, e.g. an inverted date range
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MetricError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            MetricError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            MetricError::UpstreamNotReady { .. } => "UPSTREAM_NOT_READY",
            MetricError::MixedCurrency { .. } => "MIXED_CURRENCY",
            MetricError::PublishConflict { .. } => "PUBLISH_CONFLICT",
            MetricError::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            MetricError::UnknownMetric(_) => "UNKNOWN_METRIC",
            MetricError::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        MetricError::InvalidInput(msg.into())
    }

    /// Errors that may clear up on a later scheduling tick
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetricError::InsufficientData { .. }
                | MetricError::UpstreamNotReady { .. }
                | MetricError::PublishConflict { .. }
        )
    }
}

/// Result type alias for metric operations
pub type Result<T> = std::result::Result<T, MetricError>;
