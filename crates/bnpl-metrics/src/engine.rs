//! Metric engine: compute, publish, rebuild
//!
//! `run` recomputes one metric for one day and publishes it. Recomputation
//! of the same `(metric, date)` is serialised by an async mutex; the store
//! additionally rejects a publish whose expected version is stale.

use bnpl_core::{tables, DateRange, GoldRow, PlatformMetrics};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

use crate::cohort;
use crate::definition::{MetricCatalog, MetricDefinition, MetricKind};
use crate::error::{MetricError, Result};
use crate::features;
use crate::kpi;
use crate::snapshot::SilverSnapshot;
use crate::store::{GoldStore, PartitionKey, PublishOutcome};

/// How rolling-window metrics obtain their history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Carry the previous day's rings forward when they are published
    Incremental,
    /// Recompute every ring from Silver
    Rebuild,
}

/// Computes metrics and publishes them to a [`GoldStore`]
pub struct MetricEngine {
    catalog: MetricCatalog,
    store: Arc<dyn GoldStore>,
    metrics: Option<Arc<PlatformMetrics>>,
    locks: Mutex<HashMap<PartitionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl MetricEngine {
    pub fn new(catalog: MetricCatalog, store: Arc<dyn GoldStore>) -> Self {
        Self {
            catalog,
            store,
            metrics: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PlatformMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn store(&self) -> Arc<dyn GoldStore> {
        Arc::clone(&self.store)
    }

    /// Partition a metric publishes to for `date`
    pub fn partition_key(def: &MetricDefinition, date: NaiveDate) -> PartitionKey {
        PartitionKey::new(&def.output_table, date, &def.name)
    }

    /// Compute rows for one metric and day without publishing
    pub fn compute(&self, name: &str, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<Vec<GoldRow>> {
        let def = self.catalog.get(name)?;
        self.compute_def(def, date, snapshot, ComputeMode::Incremental)
    }

    fn compute_def(
        &self,
        def: &MetricDefinition,
        date: NaiveDate,
        snapshot: &SilverSnapshot,
        mode: ComputeMode,
    ) -> Result<Vec<GoldRow>> {
        self.check_sources(def, date, snapshot)?;

        match def.kind {
            MetricKind::UserFeatures | MetricKind::MerchantFeatures => {
                let prior = match mode {
                    ComputeMode::Incremental => self
                        .store
                        .partition(&Self::partition_key(def, date - Duration::days(1))),
                    ComputeMode::Rebuild => None,
                };
                debug!(metric = %def.name, %date, incremental = prior.is_some(), "computing feature window");
                features::compute(def, date, snapshot, prior.as_deref())
            }
            MetricKind::CohortRetention => {
                let dep = def
                    .dependencies
                    .first()
                    .map(String::as_str)
                    .unwrap_or(tables::USER_FEATURES_DAILY);
                let dep_def = self.catalog.get(dep)?;
                let upstream = self
                    .store
                    .partition(&Self::partition_key(dep_def, date))
                    .ok_or_else(|| MetricError::UpstreamNotReady {
                        metric: def.name.clone(),
                        dependency: dep.to_string(),
                        date,
                    })?;
                Ok(cohort::compute(def, date, snapshot, &upstream))
            }
            _ => Ok(vec![kpi::compute(def, date, snapshot)?]),
        }
    }

    /// Every source must be loaded for the bucket; `users` is a reference
    /// table and only has to be present
    fn check_sources(&self, def: &MetricDefinition, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<()> {
        for table in &def.sources {
            let loaded = if table == tables::USERS {
                snapshot.has_table(table)
            } else {
                snapshot.is_loaded(table, date)
            };
            if !loaded {
                return Err(MetricError::InsufficientData {
                    metric: def.name.clone(),
                    table: table.clone(),
                    date,
                });
            }
        }
        for dep in &def.dependencies {
            let dep_def = self.catalog.get(dep)?;
            if self.store.partition(&Self::partition_key(dep_def, date)).is_none() {
                return Err(MetricError::UpstreamNotReady {
                    metric: def.name.clone(),
                    dependency: dep.clone(),
                    date,
                });
            }
        }
        Ok(())
    }

    fn bucket_lock(&self, key: &PartitionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Give back a bucket lock; the entry goes once no task holds or waits on it
    fn release_lock(&self, key: &PartitionKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Buckets with a live lock entry
    pub fn locked_buckets(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Compute and publish one metric for one day
    #[instrument(skip(self, snapshot))]
    pub async fn run(&self, name: &str, date: NaiveDate, snapshot: &SilverSnapshot) -> Result<PublishOutcome> {
        let def = self.catalog.get(name)?;
        self.compute_and_publish(def, date, snapshot, ComputeMode::Incremental)
            .await
    }

    /// Recompute a metric from Silver for every day in `range`, oldest first
    #[instrument(skip(self, snapshot))]
    pub async fn rebuild(
        &self,
        name: &str,
        range: DateRange,
        snapshot: &SilverSnapshot,
    ) -> Result<Vec<(NaiveDate, PublishOutcome)>> {
        let def = self.catalog.get(name)?;
        let mut outcomes = Vec::with_capacity(range.len_days().max(0) as usize);
        for date in range.days() {
            let outcome = self
                .compute_and_publish(def, date, snapshot, ComputeMode::Rebuild)
                .await?;
            outcomes.push((date, outcome));
        }
        info!(metric = %name, %range, days = outcomes.len(), "rebuild complete");
        Ok(outcomes)
    }

    async fn compute_and_publish(
        &self,
        def: &MetricDefinition,
        date: NaiveDate,
        snapshot: &SilverSnapshot,
        mode: ComputeMode,
    ) -> Result<PublishOutcome> {
        let key = Self::partition_key(def, date);
        let lock = self.bucket_lock(&key);
        let guard = lock.lock().await;

        let expected = self.store.version(&key);
        let timer = self.metrics.as_ref().map(|m| m.start_compute_timer(&def.name));
        let computed = self.compute_def(def, date, snapshot, mode);
        drop(timer);

        let result = computed.and_then(|rows| self.store.publish(&key, rows, expected));
        drop(guard);
        self.release_lock(&key, lock);
        match &result {
            Ok(outcome) => {
                info!(
                    metric = %def.name,
                    table = %def.output_table,
                    %date,
                    version = outcome.version(),
                    outcome = outcome.as_str(),
                    "metric published"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_computation(&def.name, "ok");
                    metrics.record_publication(&def.output_table, outcome.as_str());
                }
            }
            Err(e) => {
                warn!(metric = %def.name, %date, code = e.code(), error = %e, "metric not published");
                if let Some(metrics) = &self.metrics {
                    metrics.record_computation(&def.name, e.code());
                }
            }
        }
        result
    }

    /// Published rows of a Gold table, ordered by date then grain key
    pub fn rows(&self, table: &str, range: DateRange) -> Vec<GoldRow> {
        let mut rows: Vec<GoldRow> = self
            .store
            .scan(table, range)
            .into_iter()
            .flat_map(|(_, partition)| partition.rows.values().cloned().collect::<Vec<_>>())
            .collect();
        rows.sort_by(|a, b| (a.date, &a.grain_key).cmp(&(b.date, &b.grain_key)));
        rows
    }

    /// Published row of one metric at one grain key
    pub fn row(&self, metric: &str, grain_key: &str, date: NaiveDate) -> Result<Option<GoldRow>> {
        let def = self.catalog.get(metric)?;
        Ok(self
            .store
            .partition(&Self::partition_key(def, date))
            .and_then(|p| p.row(grain_key).cloned()))
    }
}
