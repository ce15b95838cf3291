//! Referential integrity tracking
//!
//! Foreign keys are not resolved at validation time: installments may
//! arrive before their order. The tracker accumulates primary keys and
//! references from accepted records and reports what never resolved.

use bnpl_core::{SilverRecord, TableSchema, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One reference that points at a key never seen
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DanglingReference {
    pub table: String,
    pub field: String,
    pub references: String,
    pub key: String,
}

/// Summary of reference resolution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceReport {
    /// Distinct references checked
    pub checked: usize,
    pub dangling: Vec<DanglingReference>,
}

impl ReferenceReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Accumulates keys and references across batches
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    keys: BTreeMap<String, BTreeSet<String>>,
    references: BTreeSet<DanglingReference>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the keys and references of accepted records
    pub fn observe(&mut self, schema: &TableSchema, records: &[SilverRecord]) {
        for record in records {
            if let Some(key) = schema
                .primary_key
                .as_deref()
                .and_then(|pk| record.get(pk))
                .map(key_text)
            {
                self.keys.entry(schema.name.clone()).or_default().insert(key);
            }

            for fk in &schema.foreign_keys {
                if let Some(value) = record.get(&fk.field) {
                    self.references.insert(DanglingReference {
                        table: schema.name.clone(),
                        field: fk.field.clone(),
                        references: fk.references.clone(),
                        key: key_text(value),
                    });
                }
            }
        }
    }

    /// Number of distinct keys seen for a table
    pub fn key_count(&self, table: &str) -> usize {
        self.keys.get(table).map_or(0, BTreeSet::len)
    }

    /// References whose target key has not been observed
    pub fn report(&self) -> ReferenceReport {
        let dangling = self
            .references
            .iter()
            .filter(|r| {
                !self
                    .keys
                    .get(&r.references)
                    .map_or(false, |keys| keys.contains(&r.key))
            })
            .cloned()
            .collect();

        ReferenceReport {
            checked: self.references.len(),
            dangling,
        }
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnpl_core::catalog::silver_schemas;
    use bnpl_core::tables;
    use chrono::Utc;

    fn schema(name: &str) -> TableSchema {
        silver_schemas().into_iter().find(|s| s.name == name).unwrap()
    }

    fn record(table: &str, pairs: &[(&str, &str)]) -> SilverRecord {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect();
        SilverRecord::new(table, Utc::now(), fields)
    }

    #[test]
    fn test_late_arriving_parent_resolves() {
        let mut tracker = ReferenceTracker::new();
        let installments = schema(tables::INSTALLMENTS);
        tracker.observe(
            &installments,
            &[record(tables::INSTALLMENTS, &[("installment_id", "i1"), ("order_id", "o1")])],
        );
        assert_eq!(tracker.report().dangling.len(), 1);

        tracker.observe(
            &schema(tables::ORDERS),
            &[record(tables::ORDERS, &[("order_id", "o1")])],
        );
        let report = tracker.report();
        assert!(report.is_clean());
        assert_eq!(report.checked, 1);
        assert_eq!(tracker.key_count(tables::ORDERS), 1);
    }

    #[test]
    fn test_dangling_reported_once() {
        let mut tracker = ReferenceTracker::new();
        let orders = schema(tables::ORDERS);
        let rec = record(tables::ORDERS, &[("order_id", "o1"), ("user_id", "ghost")]);
        tracker.observe(&orders, &[rec.clone(), rec]);

        let report = tracker.report();
        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].references, tables::USERS);
        assert_eq!(report.dangling[0].key, "ghost");
    }
}
