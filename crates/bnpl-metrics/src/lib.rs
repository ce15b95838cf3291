//! Gold metric engine for the BNPL contract layer
//!
//! Computes daily KPIs, rolling user/merchant features and cohort retention
//! from a [`SilverSnapshot`], and publishes them atomically to a
//! [`GoldStore`]. The [`Scheduler`] runs the catalog level by level and
//! escalates persistent failures to an [`AlertSink`].

pub mod aggregate;
pub mod cohort;
pub mod definition;
pub mod engine;
pub mod error;
pub mod features;
pub mod kpi;
pub mod scheduler;
pub mod snapshot;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use definition::{builtin_definitions, Grain, MetricCatalog, MetricDefinition, MetricKind};
pub use engine::{ComputeMode, MetricEngine};
pub use error::{MetricError, Result};
pub use features::WINDOW_DAYS;
pub use scheduler::{
    Alert, AlertSink, LogAlertSink, MemoryAlertSink, Scheduler, TaskReport, TaskStatus, TickReport,
};
pub use snapshot::SilverSnapshot;
pub use store::{GoldStore, InMemoryGoldStore, Partition, PartitionKey, PublishOutcome};
