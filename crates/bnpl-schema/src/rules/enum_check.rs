//! Enum membership validation

use bnpl_core::FieldType;

use super::{RecordContext, RecordRule, RuleCategory};
use crate::violation::ViolationReason;

/// Enum fields must hold a value from their declared domain
pub struct EnumRule;

impl RecordRule for EnumRule {
    fn id(&self) -> &str {
        "enum_check"
    }

    fn name(&self) -> &str {
        "Enum Membership Validation"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Enum
    }

    fn applies_to(&self, schema: &bnpl_core::TableSchema) -> bool {
        schema.fields.iter().any(|f| f.field_type == FieldType::Enum)
    }

    fn evaluate(&self, ctx: &RecordContext<'_>) -> Vec<ViolationReason> {
        ctx.schema
            .fields
            .iter()
            .filter(|f| f.field_type == FieldType::Enum)
            .filter_map(|f| {
                let value = ctx.value(&f.name)?.as_str()?;
                if f.enum_values.contains(value) {
                    None
                } else {
                    Some(ViolationReason::InvalidEnumValue {
                        field: f.name.clone(),
                        value: value.to_string(),
                        allowed: f.enum_values.iter().cloned().collect(),
                    })
                }
            })
            .collect()
    }
}
