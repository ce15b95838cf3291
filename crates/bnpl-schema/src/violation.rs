//! Per-record violation reasons
//!
//! Violations are data, not errors: a record with violations is rejected
//! but the batch carries on.

use bnpl_core::FieldType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a record was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ViolationReason {
    /// Required field absent or null
    MissingField { field: String },
    /// Value does not conform to the declared type
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: String,
    },
    /// Enum value outside the declared domain
    InvalidEnumValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
    /// Amount-like field below zero
    NegativeAmount { field: String, value: f64 },
    /// `earlier` field is after `later` field
    InvalidDateOrder {
        earlier: String,
        later: String,
        earlier_value: NaiveDate,
        later_value: NaiveDate,
    },
}

impl ViolationReason {
    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ViolationReason::MissingField { .. } => "MISSING_FIELD",
            ViolationReason::TypeMismatch { .. } => "TYPE_MISMATCH",
            ViolationReason::InvalidEnumValue { .. } => "INVALID_ENUM_VALUE",
            ViolationReason::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            ViolationReason::InvalidDateOrder { .. } => "INVALID_DATE_ORDER",
        }
    }

    /// Field the violation is about (the later field for date orderings)
    pub fn field(&self) -> &str {
        match self {
            ViolationReason::MissingField { field }
            | ViolationReason::TypeMismatch { field, .. }
            | ViolationReason::InvalidEnumValue { field, .. }
            | ViolationReason::NegativeAmount { field, .. } => field,
            ViolationReason::InvalidDateOrder { later, .. } => later,
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::MissingField { field } => {
                write!(f, "required field '{}' is missing", field)
            }
            ViolationReason::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "field '{}' expected {}, got {}", field, expected, actual),
            ViolationReason::InvalidEnumValue {
                field,
                value,
                allowed,
            } => write!(
                f,
                "field '{}' value '{}' not in [{}]",
                field,
                value,
                allowed.join(", ")
            ),
            ViolationReason::NegativeAmount { field, value } => {
                write!(f, "field '{}' is negative ({})", field, value)
            }
            ViolationReason::InvalidDateOrder {
                earlier,
                later,
                earlier_value,
                later_value,
            } => write!(
                f,
                "'{}' ({}) is after '{}' ({})",
                earlier, earlier_value, later, later_value
            ),
        }
    }
}
