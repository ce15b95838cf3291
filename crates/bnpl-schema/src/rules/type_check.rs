//! Type conformance validation

use bnpl_core::Value;

use super::{RecordContext, RecordRule, RuleCategory};
use crate::violation::ViolationReason;

/// Present, non-null values must coerce to the declared type
pub struct TypeRule;

impl RecordRule for TypeRule {
    fn id(&self) -> &str {
        "type_check"
    }

    fn name(&self) -> &str {
        "Type Conformance Validation"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Type
    }

    fn evaluate(&self, ctx: &RecordContext<'_>) -> Vec<ViolationReason> {
        let mut violations = Vec::new();

        for field in &ctx.schema.fields {
            let Some(json) = ctx.raw.get(&field.name) else {
                continue;
            };
            if json.is_null() {
                continue;
            }
            if Value::coerce(json, field.field_type).is_none() {
                let actual = match json {
                    serde_json::Value::String(s) => format!("string \"{}\"", s),
                    other => Value::json_type_name(other).to_string(),
                };
                violations.push(ViolationReason::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.field_type,
                    actual,
                });
            }
        }

        violations
    }
}
