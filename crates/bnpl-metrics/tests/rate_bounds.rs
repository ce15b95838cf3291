//! Ratio KPIs stay in [0, 1] or carry the NoData flag

use bnpl_core::{tables, DateRange, SilverRecord, Value};
use bnpl_metrics::{InMemoryGoldStore, MetricCatalog, MetricEngine, SilverSnapshot};
use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn record(table: &str, fields: Vec<(&str, Value)>) -> SilverRecord {
    let fields: BTreeMap<String, Value> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    SilverRecord::new(table, Utc::now(), fields)
}

fn snapshot(orders: &[(bool, f64)], installments: &[&'static str]) -> SilverSnapshot {
    let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let orders = orders.iter().enumerate().map(|(i, (approved, amount))| {
        record(
            tables::ORDERS,
            vec![
                ("order_id", Value::from(format!("o{}", i))),
                ("user_id", Value::from("u1")),
                ("merchant_id", Value::from("m1")),
                ("created_at", Value::Timestamp(created_at)),
                ("status", Value::from(if *approved { "approved" } else { "rejected" })),
                ("amount", Value::from(*amount)),
                ("currency", Value::from("MAD")),
                ("installments_count", Value::Int(3)),
            ],
        )
    });
    let installments = installments.iter().enumerate().map(|(i, status)| {
        record(
            tables::INSTALLMENTS,
            vec![
                ("installment_id", Value::from(format!("i{}", i))),
                ("user_id", Value::from("u1")),
                ("order_date", Value::Date(date())),
                ("due_date", Value::Date(date())),
                ("status", Value::from(*status)),
            ],
        )
    });

    let mut snapshot = SilverSnapshot::new();
    snapshot.insert(tables::ORDERS, orders);
    snapshot.insert(tables::INSTALLMENTS, installments);
    snapshot.mark_loaded(tables::ORDERS, DateRange::single(date()));
    snapshot.mark_loaded(tables::INSTALLMENTS, DateRange::single(date()));
    snapshot
}

proptest! {
    #[test]
    fn approval_and_late_rates_are_bounded(
        orders in prop::collection::vec((any::<bool>(), 0.0f64..10_000.0), 0..40),
        installments in prop::collection::vec(prop::sample::select(vec!["due", "paid", "late"]), 0..40),
    ) {
        let engine = MetricEngine::new(MetricCatalog::builtin(), Arc::new(InMemoryGoldStore::new()));
        let snapshot = snapshot(&orders, &installments);

        for metric in ["approval_rate", "late_rate"] {
            let rows = engine.compute(metric, date(), &snapshot).unwrap();
            prop_assert_eq!(rows.len(), 1);
            let row = &rows[0];
            let value = row.get_f64("value").unwrap();
            if row.is_no_data() {
                prop_assert_eq!(value, 0.0);
                prop_assert_eq!(row.get_f64("denominator"), Some(0.0));
            } else {
                prop_assert!((0.0..=1.0).contains(&value), "{} = {}", metric, value);
            }
        }

        let gmv = engine.compute("gmv", date(), &snapshot).unwrap();
        prop_assert!(gmv[0].get_f64("value").unwrap() >= 0.0);
    }
}
