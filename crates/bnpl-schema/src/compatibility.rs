//! Schema evolution checks
//!
//! A new version of a table is backward compatible with an older one when
//! every change is one of:
//!
//! - a new field that is nullable
//! - new values added to an existing enum domain
//!
//! Everything else (removals, type changes, tightened nullability, narrowed
//! enums, key or constraint changes) is breaking.

use bnpl_core::{FieldDef, TableSchema};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Outcome of comparing two schema versions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Accepted additive changes
    pub additions: Vec<String>,
    /// Reasons the change is breaking; empty means compatible
    pub breaking: Vec<String>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        self.breaking.is_empty()
    }
}

/// Compare `new` against `old` and list every difference
pub fn check_compatibility(old: &TableSchema, new: &TableSchema) -> CompatibilityReport {
    let mut report = CompatibilityReport::default();

    if old.name != new.name {
        report
            .breaking
            .push(format!("table renamed from '{}' to '{}'", old.name, new.name));
    }
    if old.layer != new.layer {
        report
            .breaking
            .push(format!("layer changed from {} to {}", old.layer, new.layer));
    }

    for old_field in &old.fields {
        match new.field(&old_field.name) {
            None => report
                .breaking
                .push(format!("field '{}' removed", old_field.name)),
            Some(new_field) => compare_field(old_field, new_field, &mut report),
        }
    }

    for new_field in &new.fields {
        if old.has_field(&new_field.name) {
            continue;
        }
        if new_field.nullable {
            report
                .additions
                .push(format!("nullable field '{}' added", new_field.name));
        } else {
            report
                .breaking
                .push(format!("required field '{}' added", new_field.name));
        }
    }

    if old.primary_key != new.primary_key {
        report.breaking.push(format!(
            "primary key changed from {:?} to {:?}",
            old.primary_key, new.primary_key
        ));
    }
    if old.bucket_field != new.bucket_field {
        report.breaking.push(format!(
            "bucket field changed from {:?} to {:?}",
            old.bucket_field, new.bucket_field
        ));
    }
    if old.foreign_keys != new.foreign_keys {
        report.breaking.push("foreign keys changed".to_string());
    }
    if old.date_orderings != new.date_orderings {
        report.breaking.push("date ordering constraints changed".to_string());
    }

    report
}

fn compare_field(old: &FieldDef, new: &FieldDef, report: &mut CompatibilityReport) {
    let name = &old.name;

    if old.field_type != new.field_type {
        report.breaking.push(format!(
            "field '{}' type changed from {} to {}",
            name, old.field_type, new.field_type
        ));
    }
    if old.nullable != new.nullable {
        let change = if new.nullable { "relaxed" } else { "tightened" };
        report
            .breaking
            .push(format!("field '{}' nullability {}", name, change));
    }
    if old.non_negative != new.non_negative {
        report
            .breaking
            .push(format!("field '{}' non-negative constraint changed", name));
    }
    if old.pii != new.pii {
        report
            .breaking
            .push(format!("field '{}' PII classification changed", name));
    }

    let removed: Vec<&String> = old.enum_values.difference(&new.enum_values).collect();
    if !removed.is_empty() {
        report.breaking.push(format!(
            "field '{}' enum values removed: {}",
            name,
            removed
                .iter()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for added in new.enum_values.difference(&old.enum_values) {
        report
            .additions
            .push(format!("enum value '{}' added to field '{}'", added, name));
    }
}

/// Fail with `BreakingSchemaChange` unless `new` is backward compatible with `old`
pub fn compatible(old: &TableSchema, new: &TableSchema) -> Result<()> {
    let report = check_compatibility(old, new);
    if report.is_compatible() {
        Ok(())
    } else {
        Err(SchemaError::BreakingSchemaChange {
            table: new.name.clone(),
            from: old.version,
            to: new.version,
            reasons: report.breaking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnpl_core::{FieldType, Layer, SchemaVersion};

    fn base() -> TableSchema {
        TableSchema::new("orders", Layer::Silver)
            .with_field(FieldDef::new("order_id", FieldType::String))
            .with_field(FieldDef::enumeration("status", ["approved", "rejected"]))
            .with_field(FieldDef::new("amount", FieldType::Float).non_negative())
            .with_primary_key("order_id")
    }

    #[test]
    fn test_nullable_addition_is_compatible() {
        let new = base()
            .with_version(SchemaVersion::new(1, 1))
            .with_field(FieldDef::new("channel", FieldType::String).nullable());
        let report = check_compatibility(&base(), &new);
        assert!(report.is_compatible());
        assert_eq!(report.additions.len(), 1);
    }

    #[test]
    fn test_enum_extension_is_compatible() {
        let mut new = base().with_version(SchemaVersion::new(1, 1));
        new.fields[1] = FieldDef::enumeration("status", ["approved", "rejected", "cancelled"]);
        assert!(compatible(&base(), &new).is_ok());
    }

    #[test]
    fn test_every_breaking_reason_listed() {
        let mut new = base().with_version(SchemaVersion::new(1, 1));
        new.fields.retain(|f| f.name != "amount");
        new.fields[1] = FieldDef::enumeration("status", ["approved"]);
        new = new.with_field(FieldDef::new("currency", FieldType::String));

        match compatible(&base(), &new) {
            Err(SchemaError::BreakingSchemaChange { reasons, .. }) => {
                assert_eq!(reasons.len(), 3, "{:?}", reasons);
            }
            other => panic!("expected breaking change, got {:?}", other),
        }
    }

    #[test]
    fn test_type_change_is_breaking() {
        let mut new = base();
        new.fields[2] = FieldDef::new("amount", FieldType::Int).non_negative();
        assert!(!check_compatibility(&base(), &new).is_compatible());
    }
}
