//! Read-only view of validated Silver data
//!
//! Records are indexed by their table's bucket field. Load coverage is
//! tracked per table and date so the engine can tell "nothing happened that
//! day" (an empty but loaded bucket) from "that day was never loaded".

use bnpl_core::{silver_schemas, DateRange, SilverRecord};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
struct TableData {
    by_date: BTreeMap<NaiveDate, Vec<SilverRecord>>,
    /// Records of tables without a bucket field, or missing their bucket value
    unbucketed: Vec<SilverRecord>,
    loaded: BTreeSet<NaiveDate>,
}

/// Silver records plus the dates each table is loaded for
#[derive(Debug, Clone)]
pub struct SilverSnapshot {
    bucket_fields: BTreeMap<String, String>,
    tables: BTreeMap<String, TableData>,
}

impl Default for SilverSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SilverSnapshot {
    /// Empty snapshot using the built-in Silver bucket fields
    pub fn new() -> Self {
        let bucket_fields = silver_schemas()
            .into_iter()
            .filter_map(|s| s.bucket_field.map(|field| (s.name, field)))
            .collect();
        Self {
            bucket_fields,
            tables: BTreeMap::new(),
        }
    }

    /// Add records to a table; does not change load coverage
    pub fn insert(&mut self, table: &str, records: impl IntoIterator<Item = SilverRecord>) {
        let bucket_field = self.bucket_fields.get(table).cloned();
        let data = self.tables.entry(table.to_string()).or_default();
        for record in records {
            match bucket_field.as_deref().and_then(|f| record.get_date(f)) {
                Some(date) => data.by_date.entry(date).or_default().push(record),
                None => data.unbucketed.push(record),
            }
        }
    }

    /// Mark a table as loaded for every day in `range`
    pub fn mark_loaded(&mut self, table: &str, range: DateRange) {
        let data = self.tables.entry(table.to_string()).or_default();
        data.loaded.extend(range.days());
    }

    /// Add records and mark the span between their first and last bucket as
    /// loaded
    pub fn load_table(&mut self, table: &str, records: Vec<SilverRecord>) {
        self.insert(table, records);
        if let Some(span) = self.span(table) {
            self.mark_loaded(table, span);
        } else {
            self.tables.entry(table.to_string()).or_default();
        }
    }

    /// First and last bucket holding records
    pub fn span(&self, table: &str) -> Option<DateRange> {
        let data = self.tables.get(table)?;
        let from = *data.by_date.keys().next()?;
        let to = *data.by_date.keys().next_back()?;
        Some(DateRange { from, to })
    }

    /// Check if the table was loaded at all
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Check if the table is loaded for the date
    pub fn is_loaded(&self, table: &str, date: NaiveDate) -> bool {
        self.tables
            .get(table)
            .map(|d| d.loaded.contains(&date))
            .unwrap_or(false)
    }

    /// Records whose bucket is `date`
    pub fn bucket(&self, table: &str, date: NaiveDate) -> &[SilverRecord] {
        self.tables
            .get(table)
            .and_then(|d| d.by_date.get(&date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Records with a bucket on or before `date`, oldest bucket first
    pub fn up_to(&self, table: &str, date: NaiveDate) -> impl Iterator<Item = &SilverRecord> {
        self.tables
            .get(table)
            .into_iter()
            .flat_map(move |d| d.by_date.range(..=date).flat_map(|(_, rows)| rows.iter()))
    }

    /// Every record of a table, bucketed ones first
    pub fn all(&self, table: &str) -> impl Iterator<Item = &SilverRecord> {
        self.tables.get(table).into_iter().flat_map(|d| {
            d.by_date
                .values()
                .flat_map(|rows| rows.iter())
                .chain(d.unbucketed.iter())
        })
    }

    /// Union of load spans over the given tables
    pub fn coverage(&self, tables: &[&str]) -> Option<DateRange> {
        let mut range: Option<DateRange> = None;
        for table in tables {
            let Some(data) = self.tables.get(*table) else {
                continue;
            };
            let (Some(first), Some(last)) = (data.loaded.first(), data.loaded.last()) else {
                continue;
            };
            range = Some(match range {
                None => DateRange {
                    from: *first,
                    to: *last,
                },
                Some(r) => DateRange {
                    from: r.from.min(*first),
                    to: r.to.max(*last),
                },
            });
        }
        range
    }

    /// Total record count across tables
    pub fn len(&self) -> usize {
        self.tables
            .values()
            .map(|d| d.by_date.values().map(Vec::len).sum::<usize>() + d.unbucketed.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
