//! Loads a Silver directory into a validated snapshot
//!
//! Every file goes through the record validator; only accepted records
//! reach the snapshot. Rejected records are kept in the per-table results
//! for reporting.

use bnpl_ingest::load_silver_dir;
use bnpl_metrics::SilverSnapshot;
use bnpl_schema::{RecordValidator, ReferenceReport, ReferenceTracker, SchemaRegistry, ValidationResult};
use std::path::Path;
use tracing::info;

use crate::error::{CliError, Result};

/// Validated Silver data plus what was rejected on the way in
#[derive(Debug, Default)]
pub struct LoadedSilver {
    pub snapshot: SilverSnapshot,
    pub results: Vec<ValidationResult>,
    pub references: ReferenceReport,
}

impl LoadedSilver {
    pub fn accepted(&self) -> usize {
        self.results.iter().map(|r| r.accepted.len()).sum()
    }

    pub fn rejected(&self) -> usize {
        self.results.iter().map(|r| r.rejected.len()).sum()
    }
}

/// Validate every table file in `dir` and build the snapshot
pub fn load_silver(
    dir: &Path,
    registry: &SchemaRegistry,
    validator: &RecordValidator,
) -> Result<LoadedSilver> {
    let raw = load_silver_dir(dir)?;
    if raw.is_empty() {
        return Err(CliError::invalid_input(format!(
            "no Silver table files found in {}",
            dir.display()
        )));
    }

    let mut loaded = LoadedSilver::default();
    let mut tracker = ReferenceTracker::new();
    for (table, records) in raw {
        let result = validator.validate(&table, records)?;
        tracker.observe(&*registry.latest(&table)?, &result.accepted);
        info!(
            table = %table,
            accepted = result.accepted.len(),
            rejected = result.rejected.len(),
            "silver table loaded"
        );
        loaded.snapshot.load_table(&table, result.accepted.clone());
        loaded.results.push(result);
    }
    loaded.references = tracker.report();
    Ok(loaded)
}
