//! Error types for the schema registry

use bnpl_core::SchemaVersion;
use thiserror::Error;

/// Schema lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Same name and version already registered with a different definition
    #[error("Schema conflict: {table} v{version} is already registered with a different definition")]
    SchemaConflict { table: String, version: SchemaVersion },

    /// New minor version is not backward compatible
    #[error("Breaking schema change for {table} ({from} -> {to}): {}", .reasons.join("; "))]
    BreakingSchemaChange {
        table: String,
        from: SchemaVersion,
        to: SchemaVersion,
        reasons: Vec<String>,
    },

    /// Table was never registered
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Table exists but has no version at or below the requested one
    #[error("No version of {table} at or below v{as_of}")]
    UnknownVersion { table: String, as_of: SchemaVersion },

    /// Schema definition is internally inconsistent
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl SchemaError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::SchemaConflict { .. } => "SCHEMA_CONFLICT",
            SchemaError::BreakingSchemaChange { .. } => "BREAKING_SCHEMA_CHANGE",
            SchemaError::UnknownTable(_) => "UNKNOWN_TABLE",
            SchemaError::UnknownVersion { .. } => "UNKNOWN_VERSION",
            SchemaError::InvalidSchema(_) => "INVALID_SCHEMA",
        }
    }

    /// Check if this is an unknown-table error
    pub fn is_unknown_table(&self) -> bool {
        matches!(self, SchemaError::UnknownTable(_))
    }
}

/// Result type alias for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaking_change_lists_reasons() {
        let err = SchemaError::BreakingSchemaChange {
            table: "orders".to_string(),
            from: SchemaVersion::new(1, 0),
            to: SchemaVersion::new(1, 1),
            reasons: vec!["field 'amount' removed".to_string(), "x".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("1.0 -> 1.1"));
        assert!(msg.contains("field 'amount' removed; x"));
        assert_eq!(err.code(), "BREAKING_SCHEMA_CHANGE");
    }
}
