//! Silver record builders for unit tests

use bnpl_core::{tables, SilverRecord, Value};
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::snapshot::SilverSnapshot;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn record(table: &str, fields: Vec<(&str, Value)>) -> SilverRecord {
    let fields: BTreeMap<String, Value> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    SilverRecord::new(table, Utc::now(), fields)
}

pub fn order(id: &str, user: &str, merchant: &str, d: u32, status: &str, amount: f64) -> SilverRecord {
    record(
        tables::ORDERS,
        vec![
            ("order_id", Value::from(id)),
            ("user_id", Value::from(user)),
            ("merchant_id", Value::from(merchant)),
            (
                "created_at",
                Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).unwrap()),
            ),
            ("status", Value::from(status)),
            ("amount", Value::from(amount)),
            ("currency", Value::from("MAD")),
            ("installments_count", Value::Int(3)),
        ],
    )
}

pub fn user(id: &str, signup: NaiveDate) -> SilverRecord {
    record(
        tables::USERS,
        vec![("user_id", Value::from(id)), ("signup_date", Value::Date(signup))],
    )
}

/// Orders plus three users who signed up in December 2023
pub fn snapshot_with_orders(orders: Vec<SilverRecord>) -> SilverSnapshot {
    let signup = NaiveDate::from_ymd_opt(2023, 12, 15).unwrap();
    let mut snapshot = SilverSnapshot::new();
    snapshot.load_table(tables::ORDERS, orders);
    snapshot.load_table(
        tables::USERS,
        vec![user("u1", signup), user("u2", signup), user("u3", signup)],
    );
    snapshot
}
