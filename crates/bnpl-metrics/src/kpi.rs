//! Daily KPIs published to `kpi_daily`
//!
//! Each KPI produces exactly one row per day, keyed by the metric name.
//! Ratios follow the zero-denominator policy: value 0 with the `NoData`
//! flag.

use bnpl_core::{tables, GoldRow, RowFlag, SilverRecord, Value};
use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::aggregate::{ratio, sorted_by};
use crate::definition::{MetricDefinition, MetricKind};
use crate::error::{MetricError, Result};
use crate::snapshot::SilverSnapshot;

/// Figures behind one KPI row
#[derive(Debug, Clone, PartialEq, Default)]
struct KpiFigures {
    value: f64,
    numerator: Option<f64>,
    denominator: Option<f64>,
    currency: Option<String>,
    no_data: bool,
}

impl KpiFigures {
    fn rate(numerator: f64, denominator: f64) -> Self {
        let (value, no_data) = ratio(numerator, denominator);
        Self {
            value,
            numerator: Some(numerator),
            denominator: Some(denominator),
            currency: None,
            no_data,
        }
    }

    fn into_row(self, def: &MetricDefinition, date: NaiveDate) -> GoldRow {
        let optional = |v: Option<f64>| v.map(Value::Float).unwrap_or(Value::Null);
        let mut row = GoldRow::new(&def.output_table, &def.name, &def.name, date)
            .with_value("metric", def.name.as_str())
            .with_value("value", self.value)
            .with_value("numerator", optional(self.numerator))
            .with_value("denominator", optional(self.denominator))
            .with_value("currency", self.currency.map(Value::String).unwrap_or(Value::Null))
            .with_value("no_data", self.no_data);
        if self.no_data {
            row = row.with_flag(RowFlag::NoData);
        }
        row.seal()
    }
}

/// Compute the KPI row for `date`; sources must already be checked as loaded
pub fn compute(def: &MetricDefinition, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<GoldRow> {
    let orders = snapshot.bucket(tables::ORDERS, date);
    let figures = match def.kind {
        MetricKind::Gmv => gmv(def, date, orders)?,
        MetricKind::ApprovalRate => {
            let approved = orders.iter().filter(|o| is_approved(o)).count();
            KpiFigures::rate(approved as f64, orders.len() as f64)
        }
        MetricKind::LateRate => {
            let installments = snapshot.bucket(tables::INSTALLMENTS, date);
            let late = installments
                .iter()
                .filter(|i| i.get_str("status") == Some("late"))
                .count();
            KpiFigures::rate(late as f64, installments.len() as f64)
        }
        MetricKind::DisputeRate => {
            let disputes = snapshot.bucket(tables::DISPUTES_RETURNS, date);
            KpiFigures::rate(disputes.len() as f64, orders.len() as f64)
        }
        MetricKind::CheckoutConversion => {
            let events = snapshot.bucket(tables::CHECKOUT_EVENTS, date);
            let count = |kind: &str| {
                events
                    .iter()
                    .filter(|e| e.get_str("event_type") == Some(kind))
                    .count() as f64
            };
            KpiFigures::rate(count("checkout_success"), count("checkout_start"))
        }
        MetricKind::ActiveUsers => {
            let users: BTreeSet<&str> = orders.iter().filter_map(|o| o.get_str("user_id")).collect();
            KpiFigures {
                value: users.len() as f64,
                ..KpiFigures::default()
            }
        }
        other => {
            return Err(MetricError::invalid_input(format!(
                "metric '{}' of kind {:?} is not a daily KPI",
                def.name, other
            )))
        }
    };
    Ok(figures.into_row(def, date))
}

pub(crate) fn is_approved(order: &SilverRecord) -> bool {
    order.get_str("status") == Some("approved")
}

fn gmv(def: &MetricDefinition, date: NaiveDate, orders: &[SilverRecord]) -> Result<KpiFigures> {
    let approved: Vec<&SilverRecord> = sorted_by(orders, "order_id")
        .into_iter()
        .filter(|o| is_approved(o))
        .collect();

    let currencies: BTreeSet<&str> = approved.iter().filter_map(|o| o.get_str("currency")).collect();
    if currencies.len() > 1 {
        return Err(MetricError::MixedCurrency {
            metric: def.name.clone(),
            date,
            currencies: currencies.into_iter().map(String::from).collect(),
        });
    }

    let value = approved
        .iter()
        .filter_map(|o| o.get_f64("amount"))
        .fold(0.0, |acc, amount| acc + amount);
    Ok(KpiFigures {
        value,
        currency: currencies.into_iter().next().map(String::from),
        ..KpiFigures::default()
    })
}
