//! Silver record validator
//!
//! Applies the registry's schema for a table to a batch of raw records.
//! Each record is judged on its own: a rejection never affects another
//! record, and the outcome does not depend on batch order.

use bnpl_core::{PlatformMetrics, RawRecord, SchemaVersion, SilverRecord, TableSchema, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::rules::{default_rules, RecordContext, RecordRule};
use crate::violation::ViolationReason;

/// A raw record together with every reason it was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub record: RawRecord,
    pub reasons: Vec<ViolationReason>,
}

/// Outcome of validating one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub table: String,
    pub schema_version: SchemaVersion,
    pub accepted: Vec<SilverRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl ValidationResult {
    /// Check if every record was accepted
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Violation counts by code
    pub fn violation_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for rejected in &self.rejected {
            for reason in &rejected.reasons {
                *counts.entry(reason.code()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Record validator backed by a schema registry
pub struct RecordValidator {
    registry: Arc<SchemaRegistry>,
    rules: Vec<Box<dyn RecordRule>>,
    metrics: Option<Arc<PlatformMetrics>>,
}

impl RecordValidator {
    /// Create a validator with the standard rule set
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            rules: default_rules(),
            metrics: None,
        }
    }

    /// Report counters to a metrics registry
    pub fn with_metrics(mut self, metrics: Arc<PlatformMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add a custom rule after the standard ones
    pub fn with_rule(mut self, rule: Box<dyn RecordRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate records against the current schema of `table`
    pub fn validate<I>(&self, table: &str, records: I) -> Result<ValidationResult>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        self.validate_as_of(table, None, records)
    }

    /// Validate records against the schema in effect at `as_of`
    #[instrument(skip(self, records))]
    pub fn validate_as_of<I>(
        &self,
        table: &str,
        as_of: Option<SchemaVersion>,
        records: I,
    ) -> Result<ValidationResult>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let schema = self.registry.get(table, as_of)?;
        let rules: Vec<&dyn RecordRule> = self
            .rules
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| r.applies_to(&schema))
            .collect();

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for record in records {
            match check_record(&schema, &rules, &record) {
                Ok(silver) => {
                    self.record_outcome(table, true, &[]);
                    accepted.push(silver);
                }
                Err(reasons) => {
                    self.record_outcome(table, false, &reasons);
                    rejected.push(RejectedRecord { record, reasons });
                }
            }
        }

        info!(
            version = %schema.version,
            accepted = accepted.len(),
            rejected = rejected.len(),
            "batch validated"
        );

        Ok(ValidationResult {
            table: table.to_string(),
            schema_version: schema.version,
            accepted,
            rejected,
        })
    }

    fn record_outcome(&self, table: &str, accepted: bool, reasons: &[ViolationReason]) {
        if let Some(metrics) = &self.metrics {
            metrics.record_validation(table, accepted);
            for reason in reasons {
                metrics.record_violation(table, reason.code());
            }
        }
    }
}

/// Judge one record; pure function of schema, rules and record
fn check_record(
    schema: &TableSchema,
    rules: &[&dyn RecordRule],
    record: &RawRecord,
) -> std::result::Result<SilverRecord, Vec<ViolationReason>> {
    let mut typed = BTreeMap::new();
    for (name, json) in &record.fields {
        match schema.field(name) {
            Some(def) => {
                if let Some(value) = Value::coerce(json, def.field_type) {
                    typed.insert(name.clone(), value);
                }
            }
            None => debug!(table = %schema.name, field = %name, "dropping undeclared field"),
        }
    }

    let ctx = RecordContext {
        schema,
        raw: record,
        typed: &typed,
    };
    let reasons: Vec<ViolationReason> = rules.iter().flat_map(|r| r.evaluate(&ctx)).collect();

    if reasons.is_empty() {
        Ok(SilverRecord::new(
            schema.name.clone(),
            record.ingested_at,
            typed,
        ))
    } else {
        Err(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnpl_core::tables;
    use serde_json::json;

    fn validator() -> RecordValidator {
        RecordValidator::new(Arc::new(SchemaRegistry::with_bnpl_catalog().unwrap()))
    }

    fn order(id: &str, status: &str, amount: f64) -> RawRecord {
        RawRecord::from_json(
            tables::ORDERS,
            json!({
                "order_id": id,
                "user_id": "u1",
                "merchant_id": "m1",
                "created_at": "2024-01-01T10:00:00Z",
                "status": status,
                "amount": amount,
                "currency": "MAD",
                "installments_count": 4,
            }),
        )
    }

    #[test]
    fn test_valid_records_accepted_unchanged() {
        let input = order("o1", "approved", 250.0);
        let result = validator().validate(tables::ORDERS, vec![input.clone()]).unwrap();

        assert!(result.is_clean());
        let silver = &result.accepted[0];
        assert_eq!(silver.to_json()["amount"], json!(250.0));
        assert_eq!(silver.get_str("order_id"), Some("o1"));
        assert_eq!(silver.ingested_at, input.ingested_at);
    }

    #[test]
    fn test_missing_field_isolated_to_its_record() {
        let mut broken = order("o2", "approved", 10.0);
        broken.fields.remove("currency");
        let batch = vec![order("o1", "approved", 10.0), broken, order("o3", "rejected", 5.0)];

        let result = validator().validate(tables::ORDERS, batch).unwrap();
        assert_eq!(result.accepted.len(), 2);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(
            result.rejected[0].reasons,
            vec![ViolationReason::MissingField {
                field: "currency".to_string()
            }]
        );
    }

    #[test]
    fn test_all_violations_collected() {
        let mut bad = order("o1", "pending", -3.0);
        bad.fields.insert("installments_count".to_string(), json!("four"));
        let result = validator().validate(tables::ORDERS, vec![bad]).unwrap();

        let codes: Vec<&str> = result.rejected[0].reasons.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec!["TYPE_MISMATCH", "INVALID_ENUM_VALUE", "NEGATIVE_AMOUNT"]);
    }

    #[test]
    fn test_undeclared_fields_dropped() {
        let mut rec = order("o1", "approved", 1.0);
        rec.fields.insert("utm_source".to_string(), json!("ads"));
        let result = validator().validate(tables::ORDERS, vec![rec]).unwrap();
        assert!(result.accepted[0].get("utm_source").is_none());
    }

    #[test]
    fn test_unknown_table_fails_call() {
        let err = validator().validate("payments", Vec::new()).unwrap_err();
        assert!(err.is_unknown_table());
    }

    #[test]
    fn test_metrics_counted() {
        let metrics = Arc::new(PlatformMetrics::new().unwrap());
        let v = validator().with_metrics(Arc::clone(&metrics));
        let mut bad = order("o1", "approved", 1.0);
        bad.fields.remove("user_id");
        v.validate(tables::ORDERS, vec![bad, order("o2", "approved", 1.0)])
            .unwrap();

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("MISSING_FIELD"));
        assert!(text.contains("outcome=\"accepted\""));
    }
}
