//! Bronze to Silver table builder
//!
//! Derives the Silver tables from the Bronze event stream:
//!
//! | Event        | Silver effect                                        |
//! |--------------|------------------------------------------------------|
//! | `SIGNUP`     | new `users` row (signup date, city, device)          |
//! | `KYC_OK`     | sets `users.kyc_level`                               |
//! | `ORDER_OK`   | `orders` row with status `approved`, `merchants` row |
//! | `ORDER_REJ`  | `orders` row with status `rejected`, `merchants` row |
//! | `INST_DUE`   | `installments` row with status `due`                 |
//! | `INST_PAID`  | installment becomes `paid`                           |
//! | `INST_LATE`  | installment becomes `late` with `late_days`          |
//! | `DISPUTE`    | `disputes_returns` row                               |
//!
//! Events are applied entity by entity (users, then orders, then
//! installment schedules, then settlements and disputes) and in
//! `(ts, event_id)` order within each stage, so the output does not depend
//! on file order and an installment paid ahead of its due timestamp still
//! finds its schedule. The first event for an entity key wins; later
//! duplicates are counted and ignored. The output is untyped: it still has
//! to pass the record validator.

use bnpl_core::{tables, PlatformMetrics, RawRecord};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::event::{BronzeEvent, EventType};

/// Counters from one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub events: usize,
    pub duplicate_events: usize,
    pub unknown_types: BTreeMap<String, usize>,
    /// Events ignored because a key or parent entity was missing
    pub orphaned: usize,
    pub duplicate_orders: usize,
    pub rows: BTreeMap<String, usize>,
}

/// Silver rows per table, ready for validation
#[derive(Debug, Clone, Default)]
pub struct SilverBatch {
    pub tables: BTreeMap<String, Vec<RawRecord>>,
    pub stats: BuildStats,
}

impl SilverBatch {
    pub fn records(&self, table: &str) -> &[RawRecord] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, Map<String, Json>>,
    merchants: BTreeMap<String, Map<String, Json>>,
    orders: BTreeMap<String, Map<String, Json>>,
    installments: BTreeMap<String, Map<String, Json>>,
    disputes: BTreeMap<String, Map<String, Json>>,
}

/// Builds Silver tables from Bronze events
#[derive(Default)]
pub struct SilverBuilder {
    metrics: Option<Arc<PlatformMetrics>>,
}

impl SilverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<PlatformMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Derive Silver rows from a set of Bronze events
    pub fn build(&self, events: Vec<BronzeEvent>) -> SilverBatch {
        let mut stats = BuildStats::default();
        let mut seen = BTreeSet::new();
        let mut ordered: Vec<BronzeEvent> = Vec::with_capacity(events.len());
        for event in events {
            stats.events += 1;
            if seen.insert(event.event_id.clone()) {
                ordered.push(event);
            } else {
                stats.duplicate_events += 1;
            }
        }
        ordered.sort_by(|a, b| {
            stage(a)
                .cmp(&stage(b))
                .then_with(|| a.ts.cmp(&b.ts))
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        let mut t = Tables::default();
        for event in &ordered {
            let Some(kind) = event.kind() else {
                *stats
                    .unknown_types
                    .entry(event.event_type.clone())
                    .or_insert(0) += 1;
                self.count(&event.event_type, "skipped");
                continue;
            };
            let applied = match kind {
                EventType::Signup => apply_signup(&mut t, event),
                EventType::KycOk => apply_kyc(&mut t, event),
                EventType::OrderOk | EventType::OrderRej => {
                    apply_order(&mut t, event, kind, &mut stats)
                }
                EventType::InstDue => apply_installment_due(&mut t, event),
                EventType::InstPaid | EventType::InstLate => {
                    apply_installment_settled(&mut t, event, kind)
                }
                EventType::Dispute => apply_dispute(&mut t, event),
            };
            if applied {
                self.count(kind.as_str(), "converted");
            } else {
                stats.orphaned += 1;
                debug!(event_id = %event.event_id, event_type = %kind, "event had no target");
                self.count(kind.as_str(), "orphaned");
            }
        }

        let mut out = BTreeMap::new();
        let ingested_at = chrono::Utc::now();
        for (table, rows) in [
            (tables::USERS, t.users),
            (tables::MERCHANTS, t.merchants),
            (tables::ORDERS, t.orders),
            (tables::INSTALLMENTS, t.installments),
            (tables::DISPUTES_RETURNS, t.disputes),
        ] {
            let records: Vec<RawRecord> = rows
                .into_values()
                .map(|fields| RawRecord::new(table, fields).with_ingested_at(ingested_at))
                .collect();
            stats.rows.insert(table.to_string(), records.len());
            out.insert(table.to_string(), records);
        }

        info!(
            events = stats.events,
            orphaned = stats.orphaned,
            unknown = stats.unknown_types.values().sum::<usize>(),
            "bronze events converted"
        );
        SilverBatch { tables: out, stats }
    }

    fn count(&self, event_type: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_bronze_event(event_type, outcome);
        }
    }
}

fn stage(event: &BronzeEvent) -> u8 {
    match event.kind() {
        Some(EventType::Signup) => 0,
        Some(EventType::KycOk) => 1,
        Some(EventType::OrderOk | EventType::OrderRej) => 2,
        Some(EventType::InstDue) => 3,
        Some(EventType::InstPaid | EventType::InstLate | EventType::Dispute) => 4,
        None => 5,
    }
}

fn date_string(date: NaiveDate) -> Json {
    Json::String(date.format("%Y-%m-%d").to_string())
}

fn opt(value: Option<&str>) -> Json {
    value.map_or(Json::Null, |s| Json::String(s.to_string()))
}

fn apply_signup(t: &mut Tables, event: &BronzeEvent) -> bool {
    let Some(user_id) = event.user_id.as_deref() else {
        return false;
    };
    if t.users.contains_key(user_id) {
        return false;
    }
    let mut row = Map::new();
    row.insert("user_id".into(), json!(user_id));
    row.insert("signup_date".into(), date_string(event.date()));
    row.insert("city".into(), opt(event.city.as_deref()));
    row.insert("kyc_level".into(), Json::Null);
    row.insert("device_fingerprint".into(), opt(event.device_id.as_deref()));
    t.users.insert(user_id.to_string(), row);
    true
}

fn apply_kyc(t: &mut Tables, event: &BronzeEvent) -> bool {
    let Some(row) = event.user_id.as_deref().and_then(|id| t.users.get_mut(id)) else {
        return false;
    };
    match event.payload("kyc_level") {
        Some(level) => {
            row.insert("kyc_level".into(), level.clone());
            true
        }
        None => false,
    }
}

fn apply_order(t: &mut Tables, event: &BronzeEvent, kind: EventType, stats: &mut BuildStats) -> bool {
    let Some(order_id) = event.order_id.as_deref() else {
        return false;
    };
    if t.orders.contains_key(order_id) {
        stats.duplicate_orders += 1;
        return true;
    }

    let status = if kind == EventType::OrderOk {
        "approved"
    } else {
        "rejected"
    };
    let mut row = Map::new();
    row.insert("order_id".into(), json!(order_id));
    row.insert("user_id".into(), opt(event.user_id.as_deref()));
    row.insert("merchant_id".into(), opt(event.merchant_id.as_deref()));
    row.insert("created_at".into(), json!(event.ts.to_rfc3339()));
    row.insert("status".into(), json!(status));
    for key in ["amount", "currency", "installments_count"] {
        row.insert(key.into(), event.payload(key).cloned().unwrap_or(Json::Null));
    }
    row.insert("device_fingerprint".into(), opt(event.device_id.as_deref()));
    t.orders.insert(order_id.to_string(), row);

    if let (Some(merchant_id), Some(category)) = (
        event.merchant_id.as_deref(),
        event.payload_str("merchant_category"),
    ) {
        t.merchants.entry(merchant_id.to_string()).or_insert_with(|| {
            let mut m = Map::new();
            m.insert("merchant_id".into(), json!(merchant_id));
            m.insert("category".into(), json!(category));
            m
        });
    }
    true
}

fn apply_installment_due(t: &mut Tables, event: &BronzeEvent) -> bool {
    let Some(installment_id) = event.payload_str("installment_id") else {
        return false;
    };
    if t.installments.contains_key(installment_id) {
        return false;
    }

    let order_date = event
        .order_id
        .as_deref()
        .and_then(|id| t.orders.get(id))
        .and_then(|o| o.get("created_at"))
        .and_then(Json::as_str)
        .and_then(|ts| ts.get(..10))
        .map_or(Json::Null, |d| json!(d));
    let due_date = event
        .payload("due_date")
        .cloned()
        .unwrap_or_else(|| date_string(event.date()));

    let mut row = Map::new();
    row.insert("installment_id".into(), json!(installment_id));
    row.insert("order_id".into(), opt(event.order_id.as_deref()));
    row.insert("user_id".into(), opt(event.user_id.as_deref()));
    row.insert("merchant_id".into(), opt(event.merchant_id.as_deref()));
    row.insert("order_date".into(), order_date);
    row.insert("due_date".into(), due_date);
    row.insert(
        "amount".into(),
        event.payload("installment_amount").cloned().unwrap_or(Json::Null),
    );
    row.insert("status".into(), json!("due"));
    row.insert("paid_date".into(), Json::Null);
    row.insert("late_days".into(), Json::Null);
    t.installments.insert(installment_id.to_string(), row);
    true
}

fn apply_installment_settled(t: &mut Tables, event: &BronzeEvent, kind: EventType) -> bool {
    let Some(row) = event
        .payload_str("installment_id")
        .and_then(|id| t.installments.get_mut(id))
    else {
        return false;
    };
    if row.get("status").and_then(Json::as_str) != Some("due") {
        return false;
    }

    let paid_date = event
        .payload("paid_date")
        .cloned()
        .unwrap_or_else(|| date_string(event.date()));
    row.insert("paid_date".into(), paid_date);
    if kind == EventType::InstLate {
        row.insert("status".into(), json!("late"));
        row.insert(
            "late_days".into(),
            event.payload("late_days").cloned().unwrap_or(Json::Null),
        );
    } else {
        row.insert("status".into(), json!("paid"));
    }
    true
}

fn apply_dispute(t: &mut Tables, event: &BronzeEvent) -> bool {
    if t.disputes.contains_key(&event.event_id) {
        return false;
    }
    let mut row = Map::new();
    row.insert("dispute_id".into(), json!(event.event_id));
    row.insert("order_id".into(), opt(event.order_id.as_deref()));
    row.insert("user_id".into(), opt(event.user_id.as_deref()));
    row.insert("merchant_id".into(), opt(event.merchant_id.as_deref()));
    row.insert("created_at".into(), json!(event.ts.to_rfc3339()));
    row.insert("reason".into(), opt(event.payload_str("dispute_reason")));
    row.insert(
        "amount".into(),
        event.payload("dispute_amount").cloned().unwrap_or(Json::Null),
    );
    t.disputes.insert(event.event_id.clone(), row);
    true
}
