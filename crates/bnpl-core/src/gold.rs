//! Gold-layer rows
//!
//! A `GoldRow` is the result of one metric at one grain key for one daily
//! bucket. Rows are keyed by `(table, grain_key, date)` and carry a content
//! checksum so that recomputation can be proven identical.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::value::Value;

/// Quality flags attached to a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFlag {
    /// A ratio had a zero denominator; the value is reported as 0
    NoData,
}

/// One published aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldRow {
    /// Gold table name
    pub table: String,
    /// Metric that produced the row
    pub metric: String,
    /// Entity or metric key inside the table
    pub grain_key: String,
    /// Daily bucket
    pub date: NaiveDate,
    /// Field values, matching the Gold table schema
    pub values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<RowFlag>,
    /// Rolling-window state for incremental computation, oldest day first
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub window: BTreeMap<String, Vec<f64>>,
    /// Partition version stamp assigned at publication (0 = unpublished)
    #[serde(default)]
    pub version: u64,
    /// SHA-256 over the row content, excluding `version`
    #[serde(default)]
    pub checksum: String,
}

impl GoldRow {
    /// Create an unpublished row
    pub fn new(
        table: impl Into<String>,
        metric: impl Into<String>,
        grain_key: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            table: table.into(),
            metric: metric.into(),
            grain_key: grain_key.into(),
            date,
            values: BTreeMap::new(),
            flags: BTreeSet::new(),
            window: BTreeMap::new(),
            version: 0,
            checksum: String::new(),
        }
    }

    /// Set a value
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Add a flag
    pub fn with_flag(mut self, flag: RowFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Attach rolling-window state
    pub fn with_window(mut self, window: BTreeMap<String, Vec<f64>>) -> Self {
        self.window = window;
        self
    }

    /// Check if the row carries the `NoData` flag
    pub fn is_no_data(&self) -> bool {
        self.flags.contains(&RowFlag::NoData)
    }

    /// Value lookup
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Numeric value lookup
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(Value::as_f64)
    }

    /// Compute the content checksum
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.table.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.metric.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.grain_key.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.date.format("%Y-%m-%d").to_string().as_bytes());
        for (field, value) in &self.values {
            hasher.update(field.as_bytes());
            hasher.update(value_fingerprint(value).as_bytes());
        }
        for flag in &self.flags {
            hasher.update(format!("{:?}", flag).as_bytes());
        }
        for (series, points) in &self.window {
            hasher.update(series.as_bytes());
            for point in points {
                hasher.update(point.to_bits().to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Fill in the checksum; called once the row content is final
    pub fn seal(mut self) -> Self {
        self.checksum = self.compute_checksum();
        self
    }

    /// Check that the stored checksum matches the content
    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

/// Bit-exact rendering so that `0.1 + 0.2` and `0.3` hash differently
fn value_fingerprint(value: &Value) -> String {
    match value {
        Value::Float(f) => format!("f:{:016x}", f.to_bits()),
        other => format!("{:?}", other),
    }
}

/// Inclusive range of daily buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Create a range; `from` must not be after `to`
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(CoreError::invalid_value(format!(
                "date range start {} is after end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Single-day range
    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    /// Check if a date falls inside the range
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Number of days covered
    pub fn len_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// Iterate over every date in the range
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let from = self.from;
        (0..self.len_days()).map(move |offset| from + Duration::days(offset))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_checksum_is_stable_and_sensitive() {
        let a = GoldRow::new("kpi_daily", "gmv", "gmv", day(1))
            .with_value("value", 1000.0)
            .seal();
        let b = GoldRow::new("kpi_daily", "gmv", "gmv", day(1))
            .with_value("value", 1000.0)
            .seal();
        let c = GoldRow::new("kpi_daily", "gmv", "gmv", day(1))
            .with_value("value", 1000.5)
            .seal();

        assert_eq!(a.checksum, b.checksum);
        assert_ne!(a.checksum, c.checksum);
        assert!(a.verify());
    }

    #[test]
    fn test_version_not_part_of_checksum() {
        let mut row = GoldRow::new("kpi_daily", "gmv", "gmv", day(1)).seal();
        let before = row.checksum.clone();
        row.version = 7;
        assert_eq!(row.compute_checksum(), before);
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::new(day(1), day(3)).unwrap();
        assert_eq!(range.len_days(), 3);
        assert_eq!(range.days().collect::<Vec<_>>(), vec![day(1), day(2), day(3)]);
        assert!(range.contains(day(2)));
        assert!(!range.contains(day(4)));
        assert!(DateRange::new(day(3), day(1)).is_err());
    }

    #[test]
    fn test_no_data_flag() {
        let row = GoldRow::new("kpi_daily", "approval_rate", "approval_rate", day(1))
            .with_flag(RowFlag::NoData);
        assert!(row.is_no_data());
    }
}
