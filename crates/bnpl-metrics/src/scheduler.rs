//! Tick-based metric scheduling
//!
//! A tick runs every metric for one day, level by level. Metrics inside a
//! level are independent and run concurrently on a `JoinSet`. Retryable
//! failures are retried within the tick with exponential backoff, then
//! deferred to later ticks; after `max_deferred_ticks` they are escalated to
//! the [`AlertSink`]. Non-retryable failures are escalated immediately.

use bnpl_core::{DateRange, PlatformMetrics, RetryPolicy};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::engine::MetricEngine;
use crate::error::{MetricError, Result};
use crate::snapshot::SilverSnapshot;
use crate::store::PublishOutcome;

/// Escalated metric failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub metric: String,
    pub date: NaiveDate,
    pub code: String,
    pub message: String,
    /// Ticks the failure was carried over before escalation
    pub ticks: u32,
}

/// Destination for escalated failures
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: &Alert);
}

/// Logs alerts at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, alert: &Alert) {
        error!(
            metric = %alert.metric,
            date = %alert.date,
            code = %alert.code,
            ticks = alert.ticks,
            "metric escalated: {}",
            alert.message
        );
    }
}

/// Keeps alerts in memory
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AlertSink for MemoryAlertSink {
    fn alert(&self, alert: &Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
    }
}

/// Final state of one metric/day in a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Published { version: u64 },
    Unchanged { version: u64 },
    /// Carried over to the next tick
    Deferred { code: String, ticks: u32 },
    /// Handed to the alert sink
    Escalated { code: String, message: String },
}

impl TaskStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Published { .. } | TaskStatus::Unchanged { .. })
    }
}

/// Outcome of one metric/day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub metric: String,
    pub date: NaiveDate,
    /// Attempts made within the tick
    pub attempts: u32,
    #[serde(flatten)]
    pub status: TaskStatus,
}

/// Outcome of a tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tasks: Vec<TaskReport>,
}

impl TickReport {
    /// Check if every task published
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_done())
    }

    pub fn task(&self, metric: &str, date: NaiveDate) -> Option<&TaskReport> {
        self.tasks
            .iter()
            .find(|t| t.metric == metric && t.date == date)
    }

    fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.tasks.iter().filter(|t| pred(&t.status)).count()
    }

    pub fn published(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Published { .. }))
    }

    pub fn deferred(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Deferred { .. }))
    }

    pub fn escalated(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Escalated { .. }))
    }
}

/// Runs the metric catalog tick by tick
pub struct Scheduler {
    engine: Arc<MetricEngine>,
    policy: RetryPolicy,
    alerts: Arc<dyn AlertSink>,
    metrics: Option<Arc<PlatformMetrics>>,
    /// Ticks already failed per (metric, date)
    deferred: Mutex<BTreeMap<(String, NaiveDate), u32>>,
}

impl Scheduler {
    pub fn new(engine: Arc<MetricEngine>, policy: RetryPolicy, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            engine,
            policy,
            alerts,
            metrics: None,
            deferred: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PlatformMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&self) -> &Arc<MetricEngine> {
        &self.engine
    }

    /// Work carried over from earlier ticks
    pub fn pending(&self) -> Vec<(String, NaiveDate, u32)> {
        self.deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|((metric, date), ticks)| (metric.clone(), *date, *ticks))
            .collect()
    }

    /// Run every metric for `date`, plus deferred work from earlier ticks
    pub async fn tick(&self, date: NaiveDate, snapshot: Arc<SilverSnapshot>) -> Result<TickReport> {
        let levels = self.engine.catalog().levels()?;
        let carried = self.pending();
        let mut report = TickReport::default();

        for level in levels {
            let mut tasks = JoinSet::new();
            for metric in level {
                let mut dates: BTreeSet<NaiveDate> = carried
                    .iter()
                    .filter(|(m, _, _)| *m == metric)
                    .map(|(_, d, _)| *d)
                    .collect();
                dates.insert(date);

                for run_date in dates {
                    let engine = Arc::clone(&self.engine);
                    let snapshot = Arc::clone(&snapshot);
                    let policy = self.policy.clone();
                    let metric = metric.clone();
                    tasks.spawn(async move {
                        let (attempts, result) =
                            run_with_retry(&engine, &policy, &metric, run_date, &snapshot).await;
                        (metric, run_date, attempts, result)
                    });
                }
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((metric, run_date, attempts, result)) => {
                        let status = self.settle(&metric, run_date, result);
                        report.tasks.push(TaskReport {
                            metric,
                            date: run_date,
                            attempts,
                            status,
                        });
                    }
                    Err(e) => error!(error = %e, "metric task aborted"),
                }
            }
        }

        report.tasks.sort_by(|a, b| (a.date, &a.metric).cmp(&(b.date, &b.metric)));
        info!(
            %date,
            published = report.published(),
            deferred = report.deferred(),
            escalated = report.escalated(),
            "tick finished"
        );
        Ok(report)
    }

    /// One tick per day of `range`, oldest first
    pub async fn run_range(&self, range: DateRange, snapshot: Arc<SilverSnapshot>) -> Result<Vec<TickReport>> {
        let mut reports = Vec::new();
        for date in range.days() {
            reports.push(self.tick(date, Arc::clone(&snapshot)).await?);
        }
        Ok(reports)
    }

    fn settle(&self, metric: &str, date: NaiveDate, result: Result<PublishOutcome>) -> TaskStatus {
        let key = (metric.to_string(), date);
        let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);

        let err = match result {
            Ok(outcome) => {
                deferred.remove(&key);
                return match outcome {
                    PublishOutcome::Published { version } => TaskStatus::Published { version },
                    PublishOutcome::Unchanged { version } => TaskStatus::Unchanged { version },
                };
            }
            Err(e) => e,
        };

        let ticks = deferred.get(&key).copied().unwrap_or(0) + 1;
        if err.is_retryable() && ticks <= self.policy.max_deferred_ticks {
            deferred.insert(key, ticks);
            warn!(metric = %metric, %date, code = err.code(), ticks, "metric deferred to next tick");
            return TaskStatus::Deferred {
                code: err.code().to_string(),
                ticks,
            };
        }

        deferred.remove(&key);
        drop(deferred);
        let alert = Alert {
            metric: metric.to_string(),
            date,
            code: err.code().to_string(),
            message: err.to_string(),
            ticks,
        };
        self.alerts.alert(&alert);
        if let Some(metrics) = &self.metrics {
            metrics.record_alert(metric);
        }
        TaskStatus::Escalated {
            code: alert.code,
            message: alert.message,
        }
    }
}

/// Retry `UpstreamNotReady` and publish conflicts inside a tick
async fn run_with_retry(
    engine: &MetricEngine,
    policy: &RetryPolicy,
    metric: &str,
    date: NaiveDate,
    snapshot: &SilverSnapshot,
) -> (u32, Result<PublishOutcome>) {
    let mut attempt = 0;
    loop {
        let result = engine.run(metric, date, snapshot).await;
        attempt += 1;
        let transient = matches!(
            result,
            Err(MetricError::UpstreamNotReady { .. }) | Err(MetricError::PublishConflict { .. })
        );
        if !transient || attempt > policy.max_retries {
            return (attempt, result);
        }
        tokio::time::sleep(policy.backoff_for(attempt - 1)).await;
    }
}
