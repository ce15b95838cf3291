//! Append-only query log
//!
//! One [`QueryLogEntry`] is written per authorization, whatever the outcome.
//! Sinks must make the entry durable before returning: the enforcer does
//! not hand a decision back until `append` succeeds.

use bnpl_core::{ConsumerClass, QueryFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::decision::{Decision, DecisionKind};
use crate::error::{ContractError, Result};

/// Immutable record of one authorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub consumer_id: String,
    pub consumer_class: ConsumerClass,
    pub table: String,
    pub fields: Vec<String>,
    pub filters: Vec<QueryFilter>,
    pub decision: DecisionKind,
    /// Deny reason code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_fields: Vec<String>,
    /// Contract set version the decision was taken against
    pub contract_version: u64,
    /// SHA-256 of the request, for correlating retries
    pub request_hash: String,
}

impl QueryLogEntry {
    pub fn new(
        consumer_id: &str,
        consumer_class: ConsumerClass,
        table: &str,
        fields: &[String],
        filters: &[QueryFilter],
        decision: &Decision,
        contract_version: u64,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            consumer_id: consumer_id.to_string(),
            consumer_class,
            table: table.to_string(),
            fields: fields.to_vec(),
            filters: filters.to_vec(),
            decision: decision.kind(),
            reason: decision.deny_reason().map(|r| r.code().to_string()),
            masked_fields: decision.masked_fields(),
            contract_version,
            request_hash: request_hash(consumer_id, consumer_class, table, fields, filters),
        }
    }
}

fn request_hash(
    consumer_id: &str,
    consumer_class: ConsumerClass,
    table: &str,
    fields: &[String],
    filters: &[QueryFilter],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(consumer_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(consumer_class.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(table.as_bytes());
    for field in fields {
        hasher.update([0u8]);
        hasher.update(field.as_bytes());
    }
    if let Ok(filters) = serde_json::to_vec(filters) {
        hasher.update(filters);
    }
    hex::encode(hasher.finalize())
}

/// Destination for query log entries
pub trait AuditSink: Send + Sync {
    /// Durably record an entry
    fn append(&self, entry: &QueryLogEntry) -> Result<()>;
}

/// JSON Lines file; every append is flushed and fsynced
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the log in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ContractError::audit(format!("{}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ContractError::audit(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &QueryLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry).map_err(|e| ContractError::audit(e.to_string()))?;
        line.push(b'\n');

        let io_err = |e: std::io::Error| ContractError::audit(format!("{}: {}", self.path.display(), e));
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        file.sync_data().map_err(io_err)
    }
}

/// Read every entry of a JSON Lines query log
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<QueryLogEntry>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ContractError::audit(format!("{}: {}", path.display(), e)))?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| ContractError::audit(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line).map_err(|e| ContractError::audit(e.to_string()))?);
    }
    Ok(entries)
}

/// In-process sink, with a switch to simulate an outage
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<QueryLogEntry>>,
    unavailable: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<QueryLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make subsequent appends fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &QueryLogEntry) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ContractError::audit("memory sink marked unavailable"));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DenyReason;

    fn entry() -> QueryLogEntry {
        QueryLogEntry::new(
            "agent-1",
            ConsumerClass::Agent,
            "kpi_daily",
            &["value".to_string()],
            &[],
            &Decision::Deny {
                reason: DenyReason::MissingTimeFilter,
            },
            3,
        )
    }

    #[test]
    fn test_entry_records_reason() {
        let entry = entry();
        assert_eq!(entry.decision, DecisionKind::Denied);
        assert_eq!(entry.reason.as_deref(), Some("MISSING_TIME_FILTER"));
        assert_eq!(entry.contract_version, 3);
        assert_eq!(entry.request_hash.len(), 64);
    }

    #[test]
    fn test_jsonl_sink_appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("query-log.jsonl");

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(&entry()).unwrap();
        drop(sink);

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(&entry()).unwrap();

        let entries = read_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].entry_id, entries[1].entry_id);
        assert_eq!(entries[0].request_hash, entries[1].request_hash);
    }

    #[test]
    fn test_memory_sink_outage() {
        let sink = MemoryAuditSink::new();
        sink.append(&entry()).unwrap();
        sink.set_unavailable(true);
        let err = sink.append(&entry()).unwrap_err();
        assert!(err.is_fail_closed());
        assert_eq!(sink.len(), 1);
    }
}
