//! Built-in BNPL table catalog
//!
//! Silver tables hold cleaned operational data; Gold tables hold the
//! aggregates consumers are allowed to read. All built-in tables start at
//! version 1.0.

use crate::schema::{FieldDef, Layer, TableSchema};
use crate::value::FieldType;

/// Table names
pub mod tables {
    pub const USERS: &str = "users";
    pub const MERCHANTS: &str = "merchants";
    pub const ORDERS: &str = "orders";
    pub const INSTALLMENTS: &str = "installments";
    pub const DISPUTES_RETURNS: &str = "disputes_returns";
    pub const CHECKOUT_EVENTS: &str = "checkout_events";

    pub const KPI_DAILY: &str = "kpi_daily";
    pub const USER_FEATURES_DAILY: &str = "user_features_daily";
    pub const MERCHANT_FEATURES_DAILY: &str = "merchant_features_daily";
    pub const COHORT_RETENTION_DAILY: &str = "cohort_retention_daily";

    pub const SILVER: [&str; 6] = [
        USERS,
        MERCHANTS,
        ORDERS,
        INSTALLMENTS,
        DISPUTES_RETURNS,
        CHECKOUT_EVENTS,
    ];

    pub const GOLD: [&str; 4] = [
        KPI_DAILY,
        USER_FEATURES_DAILY,
        MERCHANT_FEATURES_DAILY,
        COHORT_RETENTION_DAILY,
    ];
}

fn string(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::String)
}

fn int(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Int)
}

fn float(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Float)
}

fn date(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Date)
}

fn timestamp(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Timestamp)
}

/// Silver table schemas
pub fn silver_schemas() -> Vec<TableSchema> {
    vec![
        TableSchema::new(tables::USERS, Layer::Silver)
            .with_field(string("user_id"))
            .with_field(date("signup_date"))
            .with_field(string("city").nullable())
            .with_field(FieldDef::enumeration("kyc_level", ["basic", "full"]).nullable())
            .with_field(string("device_fingerprint").nullable().pii())
            .with_primary_key("user_id")
            .with_bucket_field("signup_date"),
        TableSchema::new(tables::MERCHANTS, Layer::Silver)
            .with_field(string("merchant_id"))
            .with_field(FieldDef::enumeration(
                "category",
                ["electronics", "fashion", "travel", "home"],
            ))
            .with_primary_key("merchant_id"),
        TableSchema::new(tables::ORDERS, Layer::Silver)
            .with_field(string("order_id"))
            .with_field(string("user_id"))
            .with_field(string("merchant_id"))
            .with_field(timestamp("created_at"))
            .with_field(FieldDef::enumeration("status", ["approved", "rejected"]))
            .with_field(float("amount").non_negative())
            .with_field(string("currency"))
            .with_field(int("installments_count").non_negative())
            .with_field(string("device_fingerprint").nullable().pii())
            .with_primary_key("order_id")
            .with_foreign_key("user_id", tables::USERS)
            .with_foreign_key("merchant_id", tables::MERCHANTS)
            .with_bucket_field("created_at"),
        TableSchema::new(tables::INSTALLMENTS, Layer::Silver)
            .with_field(string("installment_id"))
            .with_field(string("order_id"))
            .with_field(string("user_id"))
            .with_field(string("merchant_id"))
            .with_field(date("order_date"))
            .with_field(date("due_date"))
            .with_field(float("amount").non_negative())
            .with_field(FieldDef::enumeration("status", ["due", "paid", "late"]))
            .with_field(date("paid_date").nullable())
            .with_field(int("late_days").nullable().non_negative())
            .with_primary_key("installment_id")
            .with_foreign_key("order_id", tables::ORDERS)
            .with_foreign_key("user_id", tables::USERS)
            .with_foreign_key("merchant_id", tables::MERCHANTS)
            .with_date_ordering("order_date", "due_date")
            .with_date_ordering("order_date", "paid_date")
            .with_bucket_field("due_date"),
        TableSchema::new(tables::DISPUTES_RETURNS, Layer::Silver)
            .with_field(string("dispute_id"))
            .with_field(string("order_id"))
            .with_field(string("user_id"))
            .with_field(string("merchant_id"))
            .with_field(timestamp("created_at"))
            .with_field(string("reason"))
            .with_field(float("amount").non_negative())
            .with_primary_key("dispute_id")
            .with_foreign_key("order_id", tables::ORDERS)
            .with_foreign_key("user_id", tables::USERS)
            .with_foreign_key("merchant_id", tables::MERCHANTS)
            .with_bucket_field("created_at"),
        TableSchema::new(tables::CHECKOUT_EVENTS, Layer::Silver)
            .with_field(string("checkout_event_id"))
            .with_field(string("order_id").nullable())
            .with_field(string("user_id"))
            .with_field(FieldDef::enumeration(
                "event_type",
                ["checkout_start", "checkout_abandon", "checkout_success"],
            ))
            .with_field(timestamp("event_date"))
            .with_primary_key("checkout_event_id")
            .with_foreign_key("user_id", tables::USERS)
            .with_bucket_field("event_date"),
    ]
}

/// Gold table schemas
///
/// Every Gold table carries its daily bucket as `date`.
pub fn gold_schemas() -> Vec<TableSchema> {
    vec![
        TableSchema::new(tables::KPI_DAILY, Layer::Gold)
            .with_field(date("date"))
            .with_field(string("metric"))
            .with_field(float("value"))
            .with_field(float("numerator").nullable())
            .with_field(float("denominator").nullable())
            .with_field(string("currency").nullable())
            .with_field(FieldDef::new("no_data", FieldType::Bool))
            .with_primary_key("metric")
            .with_bucket_field("date"),
        TableSchema::new(tables::USER_FEATURES_DAILY, Layer::Gold)
            .with_field(date("date"))
            .with_field(string("user_id"))
            .with_field(int("orders_7d").non_negative())
            .with_field(int("orders_30d").non_negative())
            .with_field(float("approved_amount_30d").non_negative())
            .with_field(int("late_installments_30d").non_negative())
            .with_primary_key("user_id")
            .with_bucket_field("date"),
        TableSchema::new(tables::MERCHANT_FEATURES_DAILY, Layer::Gold)
            .with_field(date("date"))
            .with_field(string("merchant_id"))
            .with_field(int("orders_7d").non_negative())
            .with_field(int("orders_30d").non_negative())
            .with_field(float("gmv_30d").non_negative())
            .with_field(int("disputes_30d").non_negative())
            .with_field(float("approval_rate_30d"))
            .with_field(int("device_fingerprint_days_30d").non_negative().pii())
            .with_field(FieldDef::new("no_data", FieldType::Bool))
            .with_primary_key("merchant_id")
            .with_bucket_field("date"),
        TableSchema::new(tables::COHORT_RETENTION_DAILY, Layer::Gold)
            .with_field(date("date"))
            .with_field(string("cohort"))
            .with_field(int("cohort_size").non_negative())
            .with_field(int("active_users_30d").non_negative())
            .with_field(float("retention_rate"))
            .with_field(FieldDef::new("no_data", FieldType::Bool))
            .with_primary_key("cohort")
            .with_bucket_field("date"),
    ]
}

/// Every built-in table, Silver first
pub fn bnpl_catalog() -> Vec<TableSchema> {
    let mut all = silver_schemas();
    all.extend(gold_schemas());
    all
}
