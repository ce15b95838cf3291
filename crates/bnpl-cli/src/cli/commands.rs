//! CLI command definitions and their execution

use bnpl_api::create_router;
use bnpl_core::{tables, ConsumerClass, DateRange, QueryFilter};
use bnpl_ingest::{read_events_file, write_silver_dir, SilverBuilder};
use bnpl_metrics::MetricCatalog;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::output::{
    ComputeOutput, DecisionOutput, IngestOutput, OutputFormat, RowOutput, TableValidation,
    TaskOutput, ValidateOutput,
};
use super::ExitCode;
use crate::error::{CliError, Result};
use crate::loader::load_silver;
use crate::platform::Platform;

/// BNPL Gold CLI
///
/// Build Silver tables from Bronze events, validate them, compute Gold
/// metrics and check consumption contracts.
#[derive(Parser, Debug)]
#[command(name = "bnpl-gold")]
#[command(about = "BNPL Gold - schema contracts and metric layer", long_about = None)]
#[command(version)]
pub struct GoldCli {
    /// Platform configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "BNPL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format for command results
    #[arg(long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: GoldCommands,
}

/// Consumer class argument
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum ClassArg {
    Dashboard,
    Agent,
}

impl From<ClassArg> for ConsumerClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::Dashboard => ConsumerClass::Dashboard,
            ClassArg::Agent => ConsumerClass::Agent,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum GoldCommands {
    /// Derive Silver tables from a Bronze JSON Lines file
    Ingest {
        /// Bronze events file
        #[arg(short, long)]
        bronze: PathBuf,

        /// Directory receiving one `<table>.jsonl` per Silver table
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Validate every Silver table file in a directory
    Validate {
        #[arg(short, long)]
        silver: PathBuf,
    },

    /// Run the metric catalog for one day
    Compute {
        #[arg(short, long)]
        silver: PathBuf,

        /// Bucket date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Only report this metric
        #[arg(long)]
        metric: Option<String>,
    },

    /// Recompute metrics from scratch over a date range
    Rebuild {
        #[arg(short, long)]
        silver: PathBuf,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// Rebuild only this metric and what it depends on
        #[arg(long)]
        metric: Option<String>,
    },

    /// Evaluate a query against the configured contracts
    ///
    /// The decision is written to the configured query log.
    Authorize {
        #[arg(long = "consumer")]
        consumer_id: String,

        #[arg(long, value_enum)]
        class: ClassArg,

        #[arg(long)]
        table: String,

        /// Requested field; repeat for several
        #[arg(long = "field")]
        fields: Vec<String>,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,

        /// Restrict to one grain key
        #[arg(long)]
        grain: Option<String>,
    },

    /// Start the HTTP query server
    Serve {
        /// Silver directory to compute Gold tables from before serving
        #[arg(short, long)]
        silver: Option<PathBuf>,

        /// Bind address; overrides the configuration
        #[arg(long)]
        bind: Option<String>,
    },
}

/// `ingest`
pub fn execute_ingest(platform: &Platform, bronze: &Path, out: &Path) -> Result<(IngestOutput, ExitCode)> {
    let read = read_events_file(bronze)?;
    let batch = SilverBuilder::new()
        .with_metrics(Arc::clone(&platform.metrics))
        .build(read.events);
    let written = write_silver_dir(out, &batch)?;

    let output = IngestOutput {
        malformed_lines: read.malformed.len(),
        stats: batch.stats,
        written,
    };
    let code = if output.malformed_lines > 0 {
        ExitCode::Warnings
    } else {
        ExitCode::Success
    };
    Ok((output, code))
}

/// `validate`
pub fn execute_validate(platform: &Platform, silver: &Path) -> Result<(ValidateOutput, ExitCode)> {
    let loaded = load_silver(silver, &platform.registry, &platform.validator())?;
    let output = ValidateOutput {
        tables: loaded.results.iter().map(TableValidation::from).collect(),
        references: loaded.references,
    };
    let code = if output.rejected() > 0 {
        ExitCode::Failed
    } else if !output.references.is_clean() {
        ExitCode::Warnings
    } else {
        ExitCode::Success
    };
    Ok((output, code))
}

/// `compute`: one scheduler tick for `date`
pub async fn execute_compute(
    platform: &Platform,
    silver: &Path,
    date: NaiveDate,
    metric: Option<&str>,
) -> Result<(ComputeOutput, ExitCode)> {
    if let Some(name) = metric {
        platform.engine.catalog().get(name)?;
    }
    let loaded = load_silver(silver, &platform.registry, &platform.validator())?;
    let report = platform
        .scheduler()
        .tick(date, Arc::new(loaded.snapshot))
        .await?;

    let keep = |name: &str| metric.map_or(true, |m| m == name);
    let mut output = ComputeOutput {
        tasks: report
            .tasks
            .iter()
            .filter(|t| keep(&t.metric))
            .map(TaskOutput::from)
            .collect(),
        rows: Vec::new(),
    };
    for table in tables::GOLD {
        output.rows.extend(
            platform
                .engine
                .rows(table, DateRange::single(date))
                .iter()
                .filter(|row| keep(&row.metric))
                .map(RowOutput::from),
        );
    }
    let code = compute_exit_code(&output);
    Ok((output, code))
}

/// `rebuild`: every metric (or one metric's dependency closure) in
/// dependency order
pub async fn execute_rebuild(
    platform: &Platform,
    silver: &Path,
    range: DateRange,
    metric: Option<&str>,
) -> Result<(ComputeOutput, ExitCode)> {
    let catalog = platform.engine.catalog();
    let wanted = match metric {
        Some(name) => Some(dependency_closure(catalog, name)?),
        None => None,
    };
    let loaded = load_silver(silver, &platform.registry, &platform.validator())?;

    let mut output = ComputeOutput::default();
    for level in catalog.levels()? {
        for name in level {
            if wanted.as_ref().is_some_and(|w| !w.contains(&name)) {
                continue;
            }
            match platform.engine.rebuild(&name, range, &loaded.snapshot).await {
                Ok(outcomes) => output.tasks.extend(
                    outcomes
                        .into_iter()
                        .map(|(date, outcome)| TaskOutput::published(&name, date, outcome)),
                ),
                Err(e) => output
                    .tasks
                    .push(TaskOutput::failed(&name, range.from, e.code(), e.to_string())),
            }
        }
    }
    info!(%range, tasks = output.tasks.len(), failures = output.failures(), "rebuild finished");
    let code = compute_exit_code(&output);
    Ok((output, code))
}

fn compute_exit_code(output: &ComputeOutput) -> ExitCode {
    if output.failures() > 0 {
        ExitCode::Failed
    } else if output.deferred() > 0 {
        ExitCode::Warnings
    } else {
        ExitCode::Success
    }
}

/// A metric plus everything it transitively depends on
pub fn dependency_closure(catalog: &MetricCatalog, name: &str) -> Result<BTreeSet<String>> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![name.to_string()];
    while let Some(current) = stack.pop() {
        if seen.insert(current.clone()) {
            stack.extend(catalog.get(&current)?.dependencies.iter().cloned());
        }
    }
    Ok(seen)
}

/// Filters for `authorize` from its flags
pub fn authorize_filters(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    grain: Option<String>,
) -> Result<Vec<QueryFilter>> {
    let mut filters = Vec::new();
    match (from, to) {
        (Some(from), Some(to)) => filters.push(QueryFilter::TimeRange { from, to }),
        (None, None) => {}
        _ => {
            return Err(CliError::invalid_input(
                "--from and --to must be given together",
            ))
        }
    }
    if let Some(key) = grain {
        filters.push(QueryFilter::GrainKey { key });
    }
    Ok(filters)
}

/// `authorize`
pub fn execute_authorize(
    platform: &Platform,
    consumer_id: &str,
    class: ConsumerClass,
    table: &str,
    fields: &[String],
    filters: &[QueryFilter],
) -> Result<(DecisionOutput, ExitCode)> {
    let enforcer = platform.enforcer()?;
    let auth = enforcer.authorize(consumer_id, class, table, fields, filters)?;
    let code = if auth.decision.is_allowed() {
        ExitCode::Success
    } else {
        ExitCode::Failed
    };
    Ok((DecisionOutput::from(&auth), code))
}

/// `serve`: optionally compute Gold from Silver, then serve until Ctrl-C
pub async fn execute_serve(platform: &Platform, silver: Option<&Path>, bind: Option<String>) -> Result<ExitCode> {
    let state = platform.app_state()?;

    if let Some(dir) = silver {
        let loaded = load_silver(dir, &platform.registry, &platform.validator())?;
        if let Some(range) = loaded.snapshot.coverage(&[tables::ORDERS]) {
            let reports = platform
                .scheduler()
                .run_range(range, Arc::new(loaded.snapshot))
                .await?;
            let published: usize = reports.iter().map(|r| r.published()).sum();
            info!(%range, published, "gold tables computed");
        }
    }

    let addr = bind.unwrap_or_else(|| platform.config.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CliError::Server(format!("{}: {}", addr, e)))?;
    info!(%addr, version = bnpl_core::VERSION, "serving BNPL Gold queries");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| CliError::Server(e.to_string()))?;
    Ok(ExitCode::Success)
}
