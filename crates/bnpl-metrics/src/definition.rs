//! Metric definitions and the dependency graph between them
//!
//! A definition names its Silver sources, its Gold output table and the
//! Gold metrics it reads. [`MetricCatalog::levels`] orders the graph into
//! levels whose members are independent of each other.

use bnpl_core::tables;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{MetricError, Result};

/// Computation performed by a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Gmv,
    ApprovalRate,
    LateRate,
    DisputeRate,
    CheckoutConversion,
    ActiveUsers,
    UserFeatures,
    MerchantFeatures,
    CohortRetention,
}

/// Grain at which a metric publishes rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    /// One row per day, keyed by metric name
    Global,
    User,
    Merchant,
    Cohort,
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grain::Global => "global",
            Grain::User => "user",
            Grain::Merchant => "merchant",
            Grain::Cohort => "cohort",
        };
        write!(f, "{}", s)
    }
}

/// Declarative description of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub kind: MetricKind,
    /// Silver tables read for the current bucket
    pub sources: Vec<String>,
    pub grain: Grain,
    /// Gold table the rows are published to
    pub output_table: String,
    /// Metrics whose Gold rows must be published first
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl MetricDefinition {
    pub fn new(
        name: impl Into<String>,
        kind: MetricKind,
        grain: Grain,
        output_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            sources: Vec::new(),
            grain,
            output_table: output_table.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_source(mut self, table: impl Into<String>) -> Self {
        self.sources.push(table.into());
        self
    }

    pub fn with_dependency(mut self, metric: impl Into<String>) -> Self {
        self.dependencies.push(metric.into());
        self
    }

    /// Rolling-window metrics can be carried forward from the previous day
    pub fn is_incremental(&self) -> bool {
        matches!(self.kind, MetricKind::UserFeatures | MetricKind::MerchantFeatures)
    }
}

/// Built-in BNPL metrics
pub fn builtin_definitions() -> Vec<MetricDefinition> {
    use MetricKind::*;

    let kpi = |name: &str, kind: MetricKind| {
        MetricDefinition::new(name, kind, Grain::Global, tables::KPI_DAILY)
    };

    vec![
        kpi("gmv", Gmv).with_source(tables::ORDERS),
        kpi("approval_rate", ApprovalRate).with_source(tables::ORDERS),
        kpi("late_rate", LateRate).with_source(tables::INSTALLMENTS),
        kpi("dispute_rate", DisputeRate)
            .with_source(tables::DISPUTES_RETURNS)
            .with_source(tables::ORDERS),
        kpi("checkout_conversion", CheckoutConversion).with_source(tables::CHECKOUT_EVENTS),
        kpi("active_users", ActiveUsers).with_source(tables::ORDERS),
        MetricDefinition::new(
            tables::USER_FEATURES_DAILY,
            UserFeatures,
            Grain::User,
            tables::USER_FEATURES_DAILY,
        )
        .with_source(tables::ORDERS)
        .with_source(tables::INSTALLMENTS),
        MetricDefinition::new(
            tables::MERCHANT_FEATURES_DAILY,
            MerchantFeatures,
            Grain::Merchant,
            tables::MERCHANT_FEATURES_DAILY,
        )
        .with_source(tables::ORDERS)
        .with_source(tables::DISPUTES_RETURNS),
        MetricDefinition::new(
            tables::COHORT_RETENTION_DAILY,
            CohortRetention,
            Grain::Cohort,
            tables::COHORT_RETENTION_DAILY,
        )
        .with_source(tables::USERS)
        .with_dependency(tables::USER_FEATURES_DAILY),
    ]
}

/// Named set of metric definitions
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    definitions: BTreeMap<String, MetricDefinition>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding [`builtin_definitions`]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for def in builtin_definitions() {
            catalog.insert(def);
        }
        catalog
    }

    /// Add or replace a definition
    pub fn insert(&mut self, def: MetricDefinition) {
        self.definitions.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Result<&MetricDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| MetricError::UnknownMetric(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Metric publishing to a Gold table at a grain key, if any
    pub fn find_for_table(&self, table: &str) -> impl Iterator<Item = &MetricDefinition> {
        let table = table.to_string();
        self.definitions
            .values()
            .filter(move |d| d.output_table == table)
    }

    /// Group metrics into dependency levels
    ///
    /// Level 0 has no dependencies; every metric appears after all of its
    /// dependencies. Names inside a level are sorted.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        for def in self.definitions.values() {
            for dep in &def.dependencies {
                if !self.definitions.contains_key(dep) {
                    return Err(MetricError::UnknownMetric(dep.clone()));
                }
            }
        }

        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut levels = Vec::new();
        while placed.len() < self.definitions.len() {
            let level: Vec<String> = self
                .definitions
                .values()
                .filter(|d| !placed.contains(d.name.as_str()))
                .filter(|d| d.dependencies.iter().all(|dep| placed.contains(dep.as_str())))
                .map(|d| d.name.clone())
                .collect();

            if level.is_empty() {
                return Err(MetricError::DependencyCycle(self.find_cycle(&placed)));
            }
            for name in &level {
                if let Some((key, _)) = self.definitions.get_key_value(name) {
                    placed.insert(key.as_str());
                }
            }
            levels.push(level);
        }
        Ok(levels)
    }

    /// Walk dependencies of unplaced metrics until a name repeats
    fn find_cycle(&self, placed: &BTreeSet<&str>) -> Vec<String> {
        let start = self
            .definitions
            .keys()
            .find(|name| !placed.contains(name.as_str()));
        let Some(start) = start else {
            return Vec::new();
        };

        let mut path: Vec<String> = vec![start.clone()];
        let mut current = start.clone();
        loop {
            let next = self.definitions.get(&current).and_then(|def| {
                def.dependencies
                    .iter()
                    .find(|dep| !placed.contains(dep.as_str()))
                    .cloned()
            });
            let Some(next) = next else {
                return path;
            };
            if let Some(pos) = path.iter().position(|p| p == &next) {
                let mut cycle = path.split_off(pos);
                cycle.push(next);
                return cycle;
            }
            path.push(next.clone());
            current = next;
        }
    }
}
