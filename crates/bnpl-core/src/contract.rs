//! Consumption contract data types
//!
//! These types describe *what* each consumer class may read. Enforcement
//! lives in `bnpl-contracts`; the types live here so configuration can be
//! loaded without pulling in the enforcer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Kind of consumer issuing a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerClass {
    /// BI dashboards; receive raw allowed rows
    Dashboard,
    /// AI agents; receive composed four-part responses
    Agent,
}

impl ConsumerClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerClass::Dashboard => "dashboard",
            ConsumerClass::Agent => "agent",
        }
    }
}

impl fmt::Display for ConsumerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumerClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dashboard" | "bi" => Ok(ConsumerClass::Dashboard),
            "agent" | "ai" => Ok(ConsumerClass::Agent),
            _ => Err(CoreError::invalid_value(format!("Unknown consumer class: {}", s))),
        }
    }
}

/// Kind of filter a contract can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    TimeRange,
    GrainKey,
}

/// A filter attached to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFilter {
    /// Inclusive date range over the row bucket
    TimeRange { from: NaiveDate, to: NaiveDate },
    /// Restrict to one grain key (entity or metric)
    GrainKey { key: String },
    /// Equality on a field value
    Equals { field: String, value: serde_json::Value },
}

impl QueryFilter {
    pub fn kind(&self) -> Option<FilterKind> {
        match self {
            QueryFilter::TimeRange { .. } => Some(FilterKind::TimeRange),
            QueryFilter::GrainKey { .. } => Some(FilterKind::GrainKey),
            QueryFilter::Equals { .. } => None,
        }
    }

    /// Find the first time range among a set of filters
    pub fn time_range(filters: &[QueryFilter]) -> Option<(NaiveDate, NaiveDate)> {
        Self::time_ranges(filters).next()
    }

    /// Every time range among a set of filters, in order
    pub fn time_ranges(filters: &[QueryFilter]) -> impl Iterator<Item = (NaiveDate, NaiveDate)> + '_ {
        filters.iter().filter_map(|f| match f {
            QueryFilter::TimeRange { from, to } => Some((*from, *to)),
            _ => None,
        })
    }
}

/// How a masked field is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskPolicy {
    /// Replace with a fixed placeholder
    #[default]
    Redact,
    /// Replace with a truncated SHA-256 digest (joinable, not reversible)
    Hash,
    /// Replace with null
    Null,
}

/// Masking rule for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRule {
    #[serde(default)]
    pub policy: MaskPolicy,
    /// Roles allowed to see the clear value
    #[serde(default)]
    pub authorized_roles: BTreeSet<String>,
}

impl MaskRule {
    pub fn new(policy: MaskPolicy) -> Self {
        Self {
            policy,
            authorized_roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.authorized_roles.insert(role.into());
        self
    }
}

/// What one consumer class may query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionContract {
    pub consumer_class: ConsumerClass,
    #[serde(default)]
    pub allowed_tables: BTreeSet<String>,
    /// table -> field -> rule
    #[serde(default)]
    pub field_masking_rules: BTreeMap<String, BTreeMap<String, MaskRule>>,
    #[serde(default)]
    pub required_filters: BTreeSet<FilterKind>,
}

impl ConsumptionContract {
    pub fn new(consumer_class: ConsumerClass) -> Self {
        Self {
            consumer_class,
            allowed_tables: BTreeSet::new(),
            field_masking_rules: BTreeMap::new(),
            required_filters: BTreeSet::new(),
        }
    }

    pub fn allow_table(mut self, table: impl Into<String>) -> Self {
        self.allowed_tables.insert(table.into());
        self
    }

    pub fn mask_field(mut self, table: impl Into<String>, field: impl Into<String>, rule: MaskRule) -> Self {
        self.field_masking_rules
            .entry(table.into())
            .or_default()
            .insert(field.into(), rule);
        self
    }

    pub fn require_filter(mut self, kind: FilterKind) -> Self {
        self.required_filters.insert(kind);
        self
    }

    /// Masking rule for a table field, if any
    pub fn mask_rule(&self, table: &str, field: &str) -> Option<&MaskRule> {
        self.field_masking_rules.get(table).and_then(|rules| rules.get(field))
    }
}

/// Roles held by one consumer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerProfile {
    pub consumer_id: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl ConsumerProfile {
    pub fn new(consumer_id: impl Into<String>) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

/// Complete, versioned contract configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractSet {
    /// Monotonic version; assigned by the contract store on reload
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub contracts: Vec<ConsumptionContract>,
    #[serde(default)]
    pub consumers: Vec<ConsumerProfile>,
}

impl ContractSet {
    /// Contract for a consumer class
    pub fn contract_for(&self, class: ConsumerClass) -> Option<&ConsumptionContract> {
        self.contracts.iter().find(|c| c.consumer_class == class)
    }

    /// Profile for a consumer id
    pub fn profile(&self, consumer_id: &str) -> Option<&ConsumerProfile> {
        self.consumers.iter().find(|p| p.consumer_id == consumer_id)
    }

    /// Reject configurations with duplicate classes or consumers
    pub fn check(&self) -> crate::Result<()> {
        let mut classes = BTreeSet::new();
        for contract in &self.contracts {
            if !classes.insert(contract.consumer_class) {
                return Err(CoreError::invalid_config(format!(
                    "duplicate contract for consumer class '{}'",
                    contract.consumer_class
                )));
            }
        }
        let mut ids = BTreeSet::new();
        for profile in &self.consumers {
            if !ids.insert(profile.consumer_id.as_str()) {
                return Err(CoreError::invalid_config(format!(
                    "duplicate consumer profile '{}'",
                    profile.consumer_id
                )));
            }
        }
        Ok(())
    }
}
