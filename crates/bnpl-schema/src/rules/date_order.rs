//! Cross-field date ordering validation

use super::{RecordContext, RecordRule, RuleCategory};
use crate::violation::ViolationReason;

/// Declared `earlier <= later` constraints must hold when both are present
pub struct DateOrderRule;

impl RecordRule for DateOrderRule {
    fn id(&self) -> &str {
        "date_order"
    }

    fn name(&self) -> &str {
        "Date Ordering Validation"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::DateOrder
    }

    fn applies_to(&self, schema: &bnpl_core::TableSchema) -> bool {
        !schema.date_orderings.is_empty()
    }

    fn evaluate(&self, ctx: &RecordContext<'_>) -> Vec<ViolationReason> {
        ctx.schema
            .date_orderings
            .iter()
            .filter_map(|ordering| {
                let earlier = ctx.value(&ordering.earlier)?.as_date()?;
                let later = ctx.value(&ordering.later)?.as_date()?;
                (earlier > later).then(|| ViolationReason::InvalidDateOrder {
                    earlier: ordering.earlier.clone(),
                    later: ordering.later.clone(),
                    earlier_value: earlier,
                    later_value: later,
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
    fn test_paid_before_order_rejected() {
        let violations = run(
            &DateOrderRule,
            "installments",
            json!({
                "order_date": "2024-01-10",
                "due_date": "2024-02-10",
                "paid_date": "2024-01-05",
            }),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field(), "paid_date");
    }

    #[test]
    fn test_missing_side_is_skipped() {
        let violations = run(
            &DateOrderRule,
            "installments",
            json!({"order_date": "2024-01-10", "due_date": "2024-02-10", "paid_date": null}),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_same_day_is_fine() {
        let violations = run(
            &DateOrderRule,
            "installments",
            json!({"order_date": "2024-01-10", "due_date": "2024-01-10", "paid_date": "2024-01-10"}),
        );
        assert!(violations.is_empty());
    }
}
