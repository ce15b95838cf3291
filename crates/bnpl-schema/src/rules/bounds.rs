//! Numeric bounds validation

use super::{RecordContext, RecordRule, RuleCategory};
use crate::violation::ViolationReason;

/// Amount-like fields must not be negative
pub struct NonNegativeRule;

impl RecordRule for NonNegativeRule {
    fn id(&self) -> &str {
        "non_negative"
    }

    fn name(&self) -> &str {
        "Non-Negative Amount Validation"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Bounds
    }

    fn applies_to(&self, schema: &bnpl_core::TableSchema) -> bool {
        schema.fields.iter().any(|f| f.non_negative)
    }

    fn evaluate(&self, ctx: &RecordContext<'_>) -> Vec<ViolationReason> {
        ctx.schema
            .fields
            .iter()
            .filter(|f| f.non_negative)
            .filter_map(|f| {
                let value = ctx.value(&f.name)?.as_f64()?;
                (value < 0.0).then(|| ViolationReason::NegativeAmount {
                    field: f.name.clone(),
                    value,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use serde_json::json;

    #[test]
    fn test_negative_amounts() {
        let violations = run(
            &NonNegativeRule,
            "orders",
            json!({"amount": -5.0, "installments_count": -1}),
        );
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].code(), "NEGATIVE_AMOUNT");
    }

    #[test]
    fn test_zero_is_allowed() {
        assert!(run(&NonNegativeRule, "orders", json!({"amount": 0})).is_empty());
    }
}
