//! Gold storage
//!
//! Gold rows live in partitions keyed by `(table, date, metric)`. A
//! partition is immutable once published; a new publication replaces the
//! `Arc` under the write lock after checking the expected version, so a
//! reader holds either the old partition or the new one.

use bnpl_core::{DateRange, GoldRow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::error::{MetricError, Result};

/// Address of one Gold partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartitionKey {
    pub table: String,
    pub date: NaiveDate,
    pub metric: String,
}

impl PartitionKey {
    pub fn new(table: impl Into<String>, date: NaiveDate, metric: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            date,
            metric: metric.into(),
        }
    }
}

/// Published rows of one metric for one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partition {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    /// Combined checksum of the rows in grain-key order
    pub checksum: String,
    pub rows: BTreeMap<String, GoldRow>,
}

impl Partition {
    pub fn row(&self, grain_key: &str) -> Option<&GoldRow> {
        self.rows.get(grain_key)
    }
}

/// Result of a publication attempt that did not conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// A new version was stored
    Published { version: u64 },
    /// Content was identical to the current version; nothing changed
    Unchanged { version: u64 },
}

impl PublishOutcome {
    pub fn version(&self) -> u64 {
        match self {
            PublishOutcome::Published { version } | PublishOutcome::Unchanged { version } => {
                *version
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Published { .. } => "published",
            PublishOutcome::Unchanged { .. } => "unchanged",
        }
    }
}

/// Storage interface for Gold partitions
pub trait GoldStore: Send + Sync {
    /// Current partition, if published
    fn partition(&self, key: &PartitionKey) -> Option<Arc<Partition>>;

    /// Current version of a partition; 0 when never published
    fn version(&self, key: &PartitionKey) -> u64 {
        self.partition(key).map(|p| p.version).unwrap_or(0)
    }

    /// Replace a partition if its version still equals `expected_version`
    fn publish(
        &self,
        key: &PartitionKey,
        rows: Vec<GoldRow>,
        expected_version: u64,
    ) -> Result<PublishOutcome>;

    /// Every published partition of `table` with a date inside `range`
    fn scan(&self, table: &str, range: DateRange) -> Vec<(PartitionKey, Arc<Partition>)>;
}

/// Process-local [`GoldStore`]
#[derive(Debug, Default)]
pub struct InMemoryGoldStore {
    partitions: RwLock<BTreeMap<PartitionKey, Arc<Partition>>>,
}

impl InMemoryGoldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published partitions
    pub fn len(&self) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GoldStore for InMemoryGoldStore {
    fn partition(&self, key: &PartitionKey) -> Option<Arc<Partition>> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn publish(
        &self,
        key: &PartitionKey,
        rows: Vec<GoldRow>,
        expected_version: u64,
    ) -> Result<PublishOutcome> {
        let rows: BTreeMap<String, GoldRow> = rows
            .into_iter()
            .map(|row| (row.grain_key.clone(), row))
            .collect();
        let checksum = combined_checksum(rows.values());

        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let current = partitions.get(key);
        let found = current.map(|p| p.version).unwrap_or(0);
        if found != expected_version {
            return Err(MetricError::PublishConflict {
                table: key.table.clone(),
                metric: key.metric.clone(),
                date: key.date,
                expected: expected_version,
                found,
            });
        }
        if let Some(current) = current {
            if current.checksum == checksum {
                debug!(table = %key.table, metric = %key.metric, date = %key.date, "partition unchanged");
                return Ok(PublishOutcome::Unchanged { version: found });
            }
        }

        let version = found + 1;
        let rows = rows
            .into_iter()
            .map(|(grain, mut row)| {
                row.version = version;
                (grain, row)
            })
            .collect();
        partitions.insert(
            key.clone(),
            Arc::new(Partition {
                version,
                published_at: Utc::now(),
                checksum,
                rows,
            }),
        );
        debug!(table = %key.table, metric = %key.metric, date = %key.date, version, "partition published");
        Ok(PublishOutcome::Published { version })
    }

    fn scan(&self, table: &str, range: DateRange) -> Vec<(PartitionKey, Arc<Partition>)> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| key.table == table && range.contains(key.date))
            .map(|(key, partition)| (key.clone(), Arc::clone(partition)))
            .collect()
    }
}

/// Row checksums joined in grain-key order
fn combined_checksum<'a>(rows: impl Iterator<Item = &'a GoldRow>) -> String {
    rows.map(|r| r.checksum.as_str()).collect::<Vec<_>>().join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(metric: &str) -> PartitionKey {
        PartitionKey::new("kpi_daily", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), metric)
    }

    fn row(value: f64) -> GoldRow {
        GoldRow::new("kpi_daily", "gmv", "gmv", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_value("value", value)
            .seal()
    }

    #[test]
    fn test_publish_bumps_version() {
        let store = InMemoryGoldStore::new();
        let k = key("gmv");
        assert_eq!(store.version(&k), 0);

        let first = store.publish(&k, vec![row(1.0)], 0).unwrap();
        assert_eq!(first, PublishOutcome::Published { version: 1 });

        let second = store.publish(&k, vec![row(2.0)], 1).unwrap();
        assert_eq!(second, PublishOutcome::Published { version: 2 });

        let partition = store.partition(&k).unwrap();
        assert_eq!(partition.row("gmv").unwrap().get_f64("value"), Some(2.0));
        assert_eq!(partition.row("gmv").unwrap().version, 2);
    }

    #[test]
    fn test_identical_content_is_unchanged() {
        let store = InMemoryGoldStore::new();
        let k = key("gmv");
        store.publish(&k, vec![row(1.0)], 0).unwrap();
        let again = store.publish(&k, vec![row(1.0)], 1).unwrap();
        assert_eq!(again, PublishOutcome::Unchanged { version: 1 });
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = InMemoryGoldStore::new();
        let k = key("gmv");
        store.publish(&k, vec![row(1.0)], 0).unwrap();

        let err = store.publish(&k, vec![row(3.0)], 0).unwrap_err();
        assert!(matches!(
            err,
            MetricError::PublishConflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(store.partition(&k).unwrap().row("gmv").unwrap().get_f64("value"), Some(1.0));
    }

    #[test]
    fn test_scan_filters_table_and_range() {
        let store = InMemoryGoldStore::new();
        store.publish(&key("gmv"), vec![row(1.0)], 0).unwrap();
        store.publish(&key("approval_rate"), vec![], 0).unwrap();
        let jan_1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        assert_eq!(store.scan("kpi_daily", DateRange::single(jan_1)).len(), 2);
        assert!(store.scan("user_features_daily", DateRange::single(jan_1)).is_empty());
        assert!(store
            .scan("kpi_daily", DateRange::single(jan_1.succ_opt().unwrap()))
            .is_empty());
    }
}
