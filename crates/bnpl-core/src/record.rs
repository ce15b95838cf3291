//! Silver-layer records
//!
//! `RawRecord` is what the ingestion boundary hands over; `SilverRecord` is
//! what survives validation, with every declared field typed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::Value;

/// An untyped record as received from ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source table name
    pub table: String,
    /// When the record entered the platform
    pub ingested_at: DateTime<Utc>,
    /// Field values as JSON
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    /// Create a record ingested now
    pub fn new(table: impl Into<String>, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            table: table.into(),
            ingested_at: Utc::now(),
            fields,
        }
    }

    /// Create a record from a JSON object; non-objects yield an empty record
    pub fn from_json(table: impl Into<String>, json: serde_json::Value) -> Self {
        let fields = match json {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self::new(table, fields)
    }

    /// Set the ingestion timestamp
    pub fn with_ingested_at(mut self, ingested_at: DateTime<Utc>) -> Self {
        self.ingested_at = ingested_at;
        self
    }

    /// Raw field lookup
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }
}

/// A validated record with typed values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverRecord {
    pub table: String,
    pub ingested_at: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

impl SilverRecord {
    /// Create a record from typed fields
    pub fn new(table: impl Into<String>, ingested_at: DateTime<Utc>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            table: table.into(),
            ingested_at,
            fields,
        }
    }

    /// Field lookup; absent and null are both `None`
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(Value::as_date)
    }

    /// Plain JSON rendering of the fields
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
