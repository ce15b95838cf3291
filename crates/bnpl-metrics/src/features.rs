//! Rolling 7/30-day user and merchant features
//!
//! Every feature row keeps a 30-point ring per series (`window`), oldest
//! day first. The incremental path shifts the previous day's ring by one
//! and writes today's delta into the last slot; the scan path fills every
//! slot from Silver. Both paths store the same per-day deltas and sum them
//! in the same order, so their rows are bit-identical.

use bnpl_core::{tables, GoldRow, RowFlag};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

use crate::aggregate::{ratio, sorted_by, sum_last};
use crate::definition::{MetricDefinition, MetricKind};
use crate::error::{MetricError, Result};
use crate::kpi::is_approved;
use crate::snapshot::SilverSnapshot;
use crate::store::Partition;

/// Days held in a feature ring
pub const WINDOW_DAYS: usize = 30;

const SHORT_WINDOW: usize = 7;

/// Per-grain values of each series for one day
type Deltas = BTreeMap<String, BTreeMap<&'static str, f64>>;

/// Per-grain rings of each series
type Windows = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

trait FeatureSet {
    const SERIES: &'static [&'static str];

    fn deltas(&self, def: &MetricDefinition, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<Deltas>;

    fn row(&self, def: &MetricDefinition, grain: &str, date: NaiveDate, window: &BTreeMap<String, Vec<f64>>) -> GoldRow;
}

struct UserFeatures;

impl FeatureSet for UserFeatures {
    const SERIES: &'static [&'static str] = &["orders", "approved_amount", "late_installments"];

    fn deltas(&self, _def: &MetricDefinition, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<Deltas> {
        let mut deltas = Deltas::new();
        for order in sorted_by(snapshot.bucket(tables::ORDERS, date), "order_id") {
            let Some(user) = order.get_str("user_id") else {
                continue;
            };
            let entry = deltas.entry(user.to_string()).or_default();
            *entry.entry("orders").or_default() += 1.0;
            if is_approved(order) {
                *entry.entry("approved_amount").or_default() += order.get_f64("amount").unwrap_or(0.0);
            }
        }
        for installment in snapshot.bucket(tables::INSTALLMENTS, date) {
            if installment.get_str("status") != Some("late") {
                continue;
            }
            if let Some(user) = installment.get_str("user_id") {
                *deltas
                    .entry(user.to_string())
                    .or_default()
                    .entry("late_installments")
                    .or_default() += 1.0;
            }
        }
        Ok(deltas)
    }

    fn row(&self, def: &MetricDefinition, grain: &str, date: NaiveDate, window: &BTreeMap<String, Vec<f64>>) -> GoldRow {
        let sum = |series: &str, days: usize| window.get(series).map(|p| sum_last(p, days)).unwrap_or(0.0);
        GoldRow::new(&def.output_table, &def.name, grain, date)
            .with_value("user_id", grain)
            .with_value("orders_7d", sum("orders", SHORT_WINDOW) as i64)
            .with_value("orders_30d", sum("orders", WINDOW_DAYS) as i64)
            .with_value("approved_amount_30d", sum("approved_amount", WINDOW_DAYS))
            .with_value("late_installments_30d", sum("late_installments", WINDOW_DAYS) as i64)
            .with_window(window.clone())
            .seal()
    }
}

struct MerchantFeatures;

impl FeatureSet for MerchantFeatures {
    const SERIES: &'static [&'static str] =
        &["orders", "approved_orders", "gmv", "disputes", "device_fingerprints"];

    fn deltas(&self, def: &MetricDefinition, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<Deltas> {
        let mut deltas = Deltas::new();
        let mut currencies: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut devices: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for order in sorted_by(snapshot.bucket(tables::ORDERS, date), "order_id") {
            let Some(merchant) = order.get_str("merchant_id") else {
                continue;
            };
            let entry = deltas.entry(merchant.to_string()).or_default();
            *entry.entry("orders").or_default() += 1.0;
            if is_approved(order) {
                *entry.entry("approved_orders").or_default() += 1.0;
                *entry.entry("gmv").or_default() += order.get_f64("amount").unwrap_or(0.0);
                if let Some(currency) = order.get_str("currency") {
                    currencies.entry(merchant).or_default().insert(currency);
                }
            }
            if let Some(device) = order.get_str("device_fingerprint") {
                devices.entry(merchant).or_default().insert(device);
            }
        }

        if let Some((_, mixed)) = currencies.iter().find(|(_, set)| set.len() > 1) {
            return Err(MetricError::MixedCurrency {
                metric: def.name.clone(),
                date,
                currencies: mixed.iter().map(|c| c.to_string()).collect(),
            });
        }
        for (merchant, set) in devices {
            deltas
                .entry(merchant.to_string())
                .or_default()
                .insert("device_fingerprints", set.len() as f64);
        }

        for dispute in snapshot.bucket(tables::DISPUTES_RETURNS, date) {
            if let Some(merchant) = dispute.get_str("merchant_id") {
                *deltas
                    .entry(merchant.to_string())
                    .or_default()
                    .entry("disputes")
                    .or_default() += 1.0;
            }
        }
        Ok(deltas)
    }

    fn row(&self, def: &MetricDefinition, grain: &str, date: NaiveDate, window: &BTreeMap<String, Vec<f64>>) -> GoldRow {
        let sum = |series: &str, days: usize| window.get(series).map(|p| sum_last(p, days)).unwrap_or(0.0);
        let orders_30d = sum("orders", WINDOW_DAYS);
        let (approval_rate, no_data) = ratio(sum("approved_orders", WINDOW_DAYS), orders_30d);

        let mut row = GoldRow::new(&def.output_table, &def.name, grain, date)
            .with_value("merchant_id", grain)
            .with_value("orders_7d", sum("orders", SHORT_WINDOW) as i64)
            .with_value("orders_30d", orders_30d as i64)
            .with_value("gmv_30d", sum("gmv", WINDOW_DAYS))
            .with_value("disputes_30d", sum("disputes", WINDOW_DAYS) as i64)
            .with_value("approval_rate_30d", approval_rate)
            .with_value(
                "device_fingerprint_days_30d",
                sum("device_fingerprints", WINDOW_DAYS) as i64,
            )
            .with_value("no_data", no_data)
            .with_window(window.clone());
        if no_data {
            row = row.with_flag(RowFlag::NoData);
        }
        row.seal()
    }
}

/// Compute feature rows for `date`
///
/// With a `prior` partition (the previous day's published rows) the rings
/// are carried forward; without one every slot is rebuilt from Silver.
pub fn compute(
    def: &MetricDefinition,
    date: NaiveDate,
    snapshot: &SilverSnapshot,
    prior: Option<&Partition>,
) -> Result<Vec<GoldRow>> {
    match def.kind {
        MetricKind::UserFeatures => compute_set(&UserFeatures, def, date, snapshot, prior),
        MetricKind::MerchantFeatures => compute_set(&MerchantFeatures, def, date, snapshot, prior),
        other => Err(MetricError::invalid_input(format!(
            "metric '{}' of kind {:?} has no feature window",
            def.name, other
        ))),
    }
}

fn compute_set<F: FeatureSet>(
    set: &F,
    def: &MetricDefinition,
    date: NaiveDate,
    snapshot: &SilverSnapshot,
    prior: Option<&Partition>,
) -> Result<Vec<GoldRow>> {
    let windows = match prior {
        Some(prior) => carry_forward::<F>(prior, set.deltas(def, date, snapshot)?),
        None => scan::<F>(set, def, date, snapshot)?,
    };

    Ok(windows
        .iter()
        .filter(|(_, window)| window.values().any(|points| points.iter().any(|p| *p != 0.0)))
        .map(|(grain, window)| set.row(def, grain, date, window))
        .collect())
}

fn empty_window<F: FeatureSet>() -> BTreeMap<String, Vec<f64>> {
    F::SERIES
        .iter()
        .map(|s| (s.to_string(), vec![0.0; WINDOW_DAYS]))
        .collect()
}

fn carry_forward<F: FeatureSet>(prior: &Partition, today: Deltas) -> Windows {
    let mut windows = Windows::new();
    for (grain, row) in &prior.rows {
        let mut window = empty_window::<F>();
        for (series, points) in window.iter_mut() {
            if let Some(previous) = row.window.get(series) {
                // slot i takes yesterday's slot i + 1; the last slot stays 0
                for (slot, value) in points.iter_mut().zip(previous.iter().skip(1)) {
                    *slot = *value;
                }
            }
        }
        windows.insert(grain.clone(), window);
    }
    apply::<F>(&mut windows, WINDOW_DAYS - 1, today);
    windows
}

fn scan<F: FeatureSet>(
    set: &F,
    def: &MetricDefinition,
    date: NaiveDate,
    snapshot: &SilverSnapshot,
) -> Result<Windows> {
    let mut windows = Windows::new();
    for slot in 0..WINDOW_DAYS {
        let day = date - Duration::days((WINDOW_DAYS - 1 - slot) as i64);
        apply::<F>(&mut windows, slot, set.deltas(def, day, snapshot)?);
    }
    Ok(windows)
}

fn apply<F: FeatureSet>(windows: &mut Windows, slot: usize, deltas: Deltas) {
    for (grain, series) in deltas {
        let window = windows.entry(grain).or_insert_with(empty_window::<F>);
        for (name, value) in series {
            let points = window
                .entry(name.to_string())
                .or_insert_with(|| vec![0.0; WINDOW_DAYS]);
            points[slot] = value;
        }
    }
}

/// Check that every ring of a row holds [`WINDOW_DAYS`] points
pub fn window_is_well_formed(row: &GoldRow) -> bool {
    row.window.values().all(|points| points.len() == WINDOW_DAYS)
}
