//! JSON Lines readers and writers
//!
//! Bronze files tolerate bad lines (they are reported, not fatal). Silver
//! files are written by this crate and are expected to be well formed.

use bnpl_core::RawRecord;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::warn;

use crate::error::{IngestError, Result};
use crate::event::BronzeEvent;

/// A Bronze line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLine {
    pub line: usize,
    pub message: String,
}

/// Parsed Bronze events plus the lines that were skipped
#[derive(Debug, Clone, Default)]
pub struct BronzeRead {
    pub events: Vec<BronzeEvent>,
    pub malformed: Vec<MalformedLine>,
}

/// Parse Bronze events from a reader; blank lines are ignored
pub fn read_events<R: BufRead>(reader: R) -> Result<BronzeRead> {
    let mut out = BronzeRead::default();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| IngestError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BronzeEvent>(&line) {
            Ok(event) => out.events.push(event),
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed bronze line");
                out.malformed.push(MalformedLine {
                    line: line_no,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Parse Bronze events from a file
pub fn read_events_file(path: impl AsRef<Path>) -> Result<BronzeRead> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    read_events(BufReader::new(file))
}

/// Read Silver records for `table`; each line must be a JSON object
pub fn read_records<R: BufRead>(reader: R, table: &str) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| IngestError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let json: serde_json::Value =
            serde_json::from_str(&line).map_err(|e| IngestError::Parse {
                line: line_no,
                message: e.to_string(),
            })?;
        if !json.is_object() {
            return Err(IngestError::Parse {
                line: line_no,
                message: "expected a JSON object".to_string(),
            });
        }
        records.push(RawRecord::from_json(table, json));
    }
    Ok(records)
}

/// Read Silver records from a file
pub fn read_records_file(path: impl AsRef<Path>, table: &str) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    read_records(BufReader::new(file), table)
}

/// Write one JSON value per line
pub fn write_lines<T, I>(path: impl AsRef<Path>, items: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| IngestError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for item in items {
        serde_json::to_writer(&mut writer, &item)?;
        writer
            .write_all(b"\n")
            .map_err(|e| IngestError::io(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| IngestError::io(path, e))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_malformed_lines_are_reported() {
        let input = r#"{"event_id":"e1","event_type":"SIGNUP","ts":"2024-01-01T00:00:00Z","user_id":"u1"}

not json
{"event_id":"e2","event_type":"KYC_OK","ts":"2024-01-02T00:00:00Z","user_id":"u1","payload_json":{"kyc_level":"full"}}
"#;
        let read = read_events(Cursor::new(input)).unwrap();
        assert_eq!(read.events.len(), 2);
        assert_eq!(read.malformed.len(), 1);
        assert_eq!(read.malformed[0].line, 3);
    }

    #[test]
    fn test_silver_lines_must_be_objects() {
        let err = read_records(Cursor::new("[1,2]\n"), "orders").unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_write_then_read_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merchants.jsonl");
        let rows = vec![
            serde_json::json!({"merchant_id": "m1", "category": "home"}),
            serde_json::json!({"merchant_id": "m2", "category": "travel"}),
        ];
        assert_eq!(write_lines(&path, &rows).unwrap(), 2);

        let records = read_records_file(&path, "merchants").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("category"), Some(&serde_json::json!("travel")));
    }
}
