//! Enforcer decisions

use bnpl_core::{FilterKind, MaskPolicy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a query was denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// Table not in the consumer's contract, or not a Gold table
    TableNotAllowed { table: String },
    /// No explicit time range on a query that needs one
    MissingTimeFilter,
    /// A filter required by the contract is absent
    MissingRequiredFilter { filter: FilterKind },
    /// Time range starts after it ends
    InvalidTimeRange { from: NaiveDate, to: NaiveDate },
    /// Field is not part of the table schema
    UnknownField { table: String, field: String },
    /// A filter tests a field the consumer only sees masked
    MaskedFilterField { field: String },
}

impl DenyReason {
    /// Machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::TableNotAllowed { .. } => "TABLE_NOT_ALLOWED",
            DenyReason::MissingTimeFilter => "MISSING_TIME_FILTER",
            DenyReason::MissingRequiredFilter { .. } => "MISSING_REQUIRED_FILTER",
            DenyReason::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            DenyReason::UnknownField { .. } => "UNKNOWN_FIELD",
            DenyReason::MaskedFilterField { .. } => "MASKED_FILTER_FIELD",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::TableNotAllowed { table } => {
                write!(f, "table '{}' is not allowed for this consumer", table)
            }
            DenyReason::MissingTimeFilter => write!(f, "an explicit time range filter is required"),
            DenyReason::MissingRequiredFilter { filter } => {
                write!(f, "the contract requires a {:?} filter", filter)
            }
            DenyReason::InvalidTimeRange { from, to } => {
                write!(f, "time range start {} is after end {}", from, to)
            }
            DenyReason::UnknownField { table, field } => {
                write!(f, "field '{}' does not exist in table '{}'", field, table)
            }
            DenyReason::MaskedFilterField { field } => {
                write!(f, "field '{}' is masked for this consumer and cannot be filtered on", field)
            }
        }
    }
}

/// Outcome recorded in the query log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Allowed,
    Denied,
    Masked,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Allowed => "allowed",
            DecisionKind::Denied => "denied",
            DecisionKind::Masked => "masked",
        }
    }
}

/// Result of authorizing a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        fields: Vec<String>,
    },
    AllowWithMask {
        fields: Vec<String>,
        /// Masked field -> how it is rendered
        masked: BTreeMap<String, MaskPolicy>,
    },
    Deny {
        reason: DenyReason,
    },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Allow { .. } => DecisionKind::Allowed,
            Decision::AllowWithMask { .. } => DecisionKind::Masked,
            Decision::Deny { .. } => DecisionKind::Denied,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny { .. })
    }

    /// Fields the consumer receives; empty when denied
    pub fn fields(&self) -> &[String] {
        match self {
            Decision::Allow { fields } | Decision::AllowWithMask { fields, .. } => fields,
            Decision::Deny { .. } => &[],
        }
    }

    /// Names of masked fields
    pub fn masked_fields(&self) -> Vec<String> {
        match self {
            Decision::AllowWithMask { masked, .. } => masked.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn mask_policy(&self, field: &str) -> Option<MaskPolicy> {
        match self {
            Decision::AllowWithMask { masked, .. } => masked.get(field).copied(),
            _ => None,
        }
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Decision::Deny { reason } => Some(reason),
            _ => None,
        }
    }
}
