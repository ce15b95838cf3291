//! Silver directory layout: one `<table>.jsonl` file per Silver table

use bnpl_core::{tables, RawRecord};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::builder::SilverBatch;
use crate::error::{IngestError, Result};
use crate::jsonl::{read_records_file, write_lines};

/// Path of a table file inside a Silver directory
pub fn table_path(dir: impl AsRef<Path>, table: &str) -> PathBuf {
    dir.as_ref().join(format!("{}.jsonl", table))
}

/// Write every table of a batch; returns rows written per table
pub fn write_silver_dir(dir: impl AsRef<Path>, batch: &SilverBatch) -> Result<BTreeMap<String, usize>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| IngestError::io(dir, e))?;

    let mut written = BTreeMap::new();
    for (table, records) in &batch.tables {
        let path = table_path(dir, table);
        let count = write_lines(&path, records.iter().map(|r| &r.fields))?;
        debug!(table = %table, rows = count, path = %path.display(), "silver table written");
        written.insert(table.clone(), count);
    }
    info!(dir = %dir.display(), tables = written.len(), "silver directory written");
    Ok(written)
}

/// Load every Silver table file present in `dir`; absent files are skipped
pub fn load_silver_dir(dir: impl AsRef<Path>) -> Result<BTreeMap<String, Vec<RawRecord>>> {
    let dir = dir.as_ref();
    let mut loaded = BTreeMap::new();
    for table in tables::SILVER {
        let path = table_path(dir, table);
        if !path.exists() {
            debug!(table = %table, "no silver file");
            continue;
        }
        let records = read_records_file(&path, table)?;
        loaded.insert(table.to_string(), records);
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roundtrip_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = SilverBatch::default();
        batch.tables.insert(
            tables::MERCHANTS.to_string(),
            vec![RawRecord::from_json(
                tables::MERCHANTS,
                json!({"merchant_id": "m1", "category": "fashion"}),
            )],
        );

        let written = write_silver_dir(dir.path(), &batch).unwrap();
        assert_eq!(written.get(tables::MERCHANTS), Some(&1));

        let loaded = load_silver_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[tables::MERCHANTS][0].get("merchant_id"), Some(&json!("m1")));
    }
}
