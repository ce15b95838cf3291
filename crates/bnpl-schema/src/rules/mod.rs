//! Rule framework for record validation
//!
//! Each rule inspects one record against its table schema and returns the
//! violations it finds. Rules are independent; the validator runs all of
//! them and collects every violation of a record.

pub mod bounds;
pub mod date_order;
pub mod enum_check;
pub mod required;
pub mod type_check;

pub use bounds::NonNegativeRule;
pub use date_order::DateOrderRule;
pub use enum_check::EnumRule;
pub use required::RequiredFieldRule;
pub use type_check::TypeRule;

use bnpl_core::{RawRecord, TableSchema, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::violation::ViolationReason;

/// Categories of record rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Required fields present and non-null
    Required,
    /// Values conform to declared types
    Type,
    /// Enum membership
    Enum,
    /// Numeric bounds
    Bounds,
    /// Cross-field date ordering
    DateOrder,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Required => write!(f, "required"),
            RuleCategory::Type => write!(f, "type"),
            RuleCategory::Enum => write!(f, "enum"),
            RuleCategory::Bounds => write!(f, "bounds"),
            RuleCategory::DateOrder => write!(f, "date_order"),
        }
    }
}

/// Inputs available to every rule for one record
pub struct RecordContext<'a> {
    pub schema: &'a TableSchema,
    pub raw: &'a RawRecord,
    /// Declared fields that coerced successfully; non-conforming fields are
    /// absent here and reported by the type rule only
    pub typed: &'a BTreeMap<String, Value>,
}

impl<'a> RecordContext<'a> {
    /// Typed value of a field, ignoring nulls
    pub fn value(&self, field: &str) -> Option<&'a Value> {
        self.typed.get(field).filter(|v| !v.is_null())
    }
}

/// Trait for record validation rules
pub trait RecordRule: Send + Sync {
    /// Rule identifier
    fn id(&self) -> &str;

    /// Rule name
    fn name(&self) -> &str;

    fn category(&self) -> RuleCategory;

    /// Check if rule applies to this schema
    fn applies_to(&self, _schema: &TableSchema) -> bool {
        true
    }

    /// Evaluate one record and return its violations
    fn evaluate(&self, ctx: &RecordContext<'_>) -> Vec<ViolationReason>;
}

/// Standard rule set in evaluation order
pub fn default_rules() -> Vec<Box<dyn RecordRule>> {
    vec![
        Box::new(RequiredFieldRule),
        Box::new(TypeRule),
        Box::new(EnumRule),
        Box::new(NonNegativeRule),
        Box::new(DateOrderRule),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use bnpl_core::catalog::silver_schemas;

    pub fn schema(name: &str) -> TableSchema {
        silver_schemas()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap()
    }

    /// Coerce declared fields the way the validator does
    pub fn typed(schema: &TableSchema, raw: &RawRecord) -> BTreeMap<String, Value> {
        schema
            .fields
            .iter()
            .filter_map(|f| {
                raw.get(&f.name)
                    .and_then(|json| Value::coerce(json, f.field_type))
                    .map(|v| (f.name.clone(), v))
            })
            .collect()
    }

    pub fn run(rule: &dyn RecordRule, table: &str, json: serde_json::Value) -> Vec<ViolationReason> {
        let schema = schema(table);
        let raw = RawRecord::from_json(table, json);
        let typed = typed(&schema, &raw);
        rule.evaluate(&RecordContext {
            schema: &schema,
            raw: &raw,
            typed: &typed,
        })
    }
}
