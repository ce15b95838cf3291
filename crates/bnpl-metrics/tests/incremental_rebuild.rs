//! Incremental feature windows agree with a from-scratch rebuild

use bnpl_core::{tables, DateRange, SilverRecord, Value};
use bnpl_metrics::features::window_is_well_formed;
use bnpl_metrics::{InMemoryGoldStore, MetricCatalog, MetricEngine, PublishOutcome, SilverSnapshot};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

fn record(table: &str, fields: Vec<(&str, Value)>) -> SilverRecord {
    let fields: BTreeMap<String, Value> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    SilverRecord::new(table, Utc::now(), fields)
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn range() -> DateRange {
    DateRange::new(start(), start() + Duration::days(44)).unwrap()
}

/// 45 days of orders, installments and disputes with fractional amounts
fn snapshot() -> SilverSnapshot {
    let mut orders = Vec::new();
    let mut installments = Vec::new();
    let mut disputes = Vec::new();
    let mut users = Vec::new();

    for u in 0..5 {
        users.push(record(
            tables::USERS,
            vec![
                ("user_id", Value::from(format!("u{}", u))),
                ("signup_date", Value::Date(NaiveDate::from_ymd_opt(2023, 11 + u % 2, 10).unwrap())),
            ],
        ));
    }

    for (i, date) in range().days().enumerate() {
        for k in 0..(i % 4 + 1) {
            let order_id = format!("o{}_{}", i, k);
            let user = format!("u{}", (i + k) % 5);
            let merchant = format!("m{}", (i * k) % 3);
            let approved = (i + k) % 3 != 0;
            let amount = 10.5 * (k as f64 + 1.0) + i as f64 * 0.1;
            let created_at = Utc
                .from_utc_datetime(&date.and_hms_opt(9 + k as u32, 30, 0).unwrap());

            orders.push(record(
                tables::ORDERS,
                vec![
                    ("order_id", Value::from(order_id.as_str())),
                    ("user_id", Value::from(user.as_str())),
                    ("merchant_id", Value::from(merchant.as_str())),
                    ("created_at", Value::Timestamp(created_at)),
                    ("status", Value::from(if approved { "approved" } else { "rejected" })),
                    ("amount", Value::from(amount)),
                    ("currency", Value::from("MAD")),
                    ("installments_count", Value::Int(3)),
                    ("device_fingerprint", Value::from(format!("dev{}", (i + k) % 4))),
                ],
            ));

            if approved {
                installments.push(record(
                    tables::INSTALLMENTS,
                    vec![
                        ("installment_id", Value::from(format!("{}_1", order_id))),
                        ("order_id", Value::from(order_id.as_str())),
                        ("user_id", Value::from(user.as_str())),
                        ("merchant_id", Value::from(merchant.as_str())),
                        ("order_date", Value::Date(date)),
                        ("due_date", Value::Date(date)),
                        ("amount", Value::from(amount / 3.0)),
                        ("status", Value::from(if k % 2 == 0 { "late" } else { "paid" })),
                    ],
                ));
            }

            if (i + k) % 7 == 0 {
                disputes.push(record(
                    tables::DISPUTES_RETURNS,
                    vec![
                        ("dispute_id", Value::from(format!("d{}", order_id))),
                        ("order_id", Value::from(order_id.as_str())),
                        ("user_id", Value::from(user.as_str())),
                        ("merchant_id", Value::from(merchant.as_str())),
                        ("created_at", Value::Timestamp(created_at)),
                        ("reason", Value::from("refund")),
                        ("amount", Value::from(amount)),
                    ],
                ));
            }
        }
    }

    let mut snapshot = SilverSnapshot::new();
    snapshot.insert(tables::ORDERS, orders);
    snapshot.insert(tables::INSTALLMENTS, installments);
    snapshot.insert(tables::DISPUTES_RETURNS, disputes);
    snapshot.load_table(tables::USERS, users);
    for table in [tables::ORDERS, tables::INSTALLMENTS, tables::DISPUTES_RETURNS] {
        snapshot.mark_loaded(table, range());
    }
    snapshot
}

fn engine() -> MetricEngine {
    MetricEngine::new(MetricCatalog::builtin(), Arc::new(InMemoryGoldStore::new()))
}

#[tokio::test]
async fn incremental_matches_rebuild() {
    let snapshot = snapshot();
    let incremental = engine();
    let rebuilt = engine();

    for metric in [tables::USER_FEATURES_DAILY, tables::MERCHANT_FEATURES_DAILY] {
        for date in range().days() {
            incremental.run(metric, date, &snapshot).await.unwrap();
        }
        rebuilt.rebuild(metric, range(), &snapshot).await.unwrap();

        let a = incremental.rows(metric, range());
        let b = rebuilt.rows(metric, range());
        assert!(!a.is_empty());
        assert_eq!(a, b, "{} diverged", metric);
        assert!(a.iter().all(window_is_well_formed));
    }

    let last = range().to;
    let busy = incremental
        .rows(tables::MERCHANT_FEATURES_DAILY, DateRange::single(last))
        .into_iter()
        .find(|r| r.get_f64("orders_30d").unwrap_or(0.0) > 0.0)
        .unwrap();
    let rate = busy.get_f64("approval_rate_30d").unwrap();
    assert!((0.0..=1.0).contains(&rate));
    assert!(busy.get_f64("device_fingerprint_days_30d").unwrap() > 0.0);
}

#[tokio::test]
async fn rebuild_twice_is_unchanged() {
    let snapshot = snapshot();
    let engine = engine();

    let first = engine
        .rebuild(tables::USER_FEATURES_DAILY, range(), &snapshot)
        .await
        .unwrap();
    let before = engine.rows(tables::USER_FEATURES_DAILY, range());

    let second = engine
        .rebuild(tables::USER_FEATURES_DAILY, range(), &snapshot)
        .await
        .unwrap();
    let after = engine.rows(tables::USER_FEATURES_DAILY, range());

    assert!(first
        .iter()
        .all(|(_, o)| matches!(o, PublishOutcome::Published { version: 1 })));
    assert!(second
        .iter()
        .all(|(_, o)| matches!(o, PublishOutcome::Unchanged { version: 1 })));
    assert_eq!(before, after);
}

#[tokio::test]
async fn cohort_retention_reads_user_features() {
    let snapshot = snapshot();
    let engine = engine();
    let last = range().to;

    engine
        .run(tables::USER_FEATURES_DAILY, last, &snapshot)
        .await
        .unwrap();
    engine
        .run(tables::COHORT_RETENTION_DAILY, last, &snapshot)
        .await
        .unwrap();

    let rows = engine.rows(tables::COHORT_RETENTION_DAILY, DateRange::single(last));
    let cohorts: Vec<&str> = rows.iter().map(|r| r.grain_key.as_str()).collect();
    assert_eq!(cohorts, vec!["2023-11", "2023-12"]);

    let size: f64 = rows.iter().filter_map(|r| r.get_f64("cohort_size")).sum();
    assert_eq!(size, 5.0);
    for row in &rows {
        let rate = row.get_f64("retention_rate").unwrap();
        assert!((0.0..=1.0).contains(&rate));
    }
}
