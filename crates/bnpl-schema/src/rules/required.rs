//! Required field validation

use super::{RecordContext, RecordRule, RuleCategory};
use crate::violation::ViolationReason;

/// Every non-nullable field must be present and non-null
pub struct RequiredFieldRule;

impl RecordRule for RequiredFieldRule {
    fn id(&self) -> &str {
        "required_field"
    }

    fn name(&self) -> &str {
        "Required Field Validation"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Required
    }

    fn evaluate(&self, ctx: &RecordContext<'_>) -> Vec<ViolationReason> {
        ctx.schema
            .fields
            .iter()
            .filter(|f| f.is_required())
            .filter(|f| ctx.raw.get(&f.name).map_or(true, |v| v.is_null()))
            .map(|f| ViolationReason::MissingField {
                field: f.name.clone(),
            })
            .collect()
    }
}
