//! Table schema definitions
//!
//! A `TableSchema` is immutable once registered under a version. Evolution
//! happens by registering a new version, never by editing an existing one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::value::FieldType;

/// Data layer a table belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Raw events as ingested
    Bronze,
    /// Cleaned operational tables
    Silver,
    /// Aggregates served to consumers
    Gold,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Bronze => write!(f, "bronze"),
            Layer::Silver => write!(f, "silver"),
            Layer::Gold => write!(f, "gold"),
        }
    }
}

/// Schema version as `major.minor`
///
/// Minor versions must stay backward compatible with earlier minors of the
/// same major. A new major may break compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Initial version of every built-in table
    pub const fn initial() -> Self {
        Self::new(1, 0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| CoreError::invalid_value(format!("schema version '{}' is not major.minor", s)))?;
        let major = major
            .trim()
            .parse()
            .map_err(|_| CoreError::invalid_value(format!("bad major in schema version '{}'", s)))?;
        let minor = minor
            .trim()
            .parse()
            .map_err(|_| CoreError::invalid_value(format!("bad minor in schema version '{}'", s)))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(v: SchemaVersion) -> Self {
        v.to_string()
    }
}

/// Definition of a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
    /// Allowed values for `enum` fields
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub enum_values: BTreeSet<String>,
    /// Amount-like fields that must never be negative
    #[serde(default)]
    pub non_negative: bool,
    /// Personally identifying (or derived from such data)
    #[serde(default)]
    pub pii: bool,
}

impl FieldDef {
    /// Create a required field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            enum_values: BTreeSet::new(),
            non_negative: false,
            pii: false,
        }
    }

    /// Create a required enum field with its domain
    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, FieldType::Enum).with_enum_values(values)
    }

    /// Mark the field nullable
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark the field as an amount that must be non-negative
    pub fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    /// Mark the field as PII
    pub fn pii(mut self) -> Self {
        self.pii = true;
        self
    }

    /// Extend the enum domain
    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values.extend(values.into_iter().map(Into::into));
        self
    }

    /// Check if this field must be present and non-null
    pub fn is_required(&self) -> bool {
        !self.nullable
    }
}

/// Reference from a field to the primary key of another table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub field: String,
    pub references: String,
}

/// Ordering constraint between two date-like fields: `earlier <= later`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOrdering {
    pub earlier: String,
    pub later: String,
}

/// Versioned schema of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub layer: Layer,
    pub version: SchemaVersion,
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_orderings: Vec<DateOrdering>,
    /// Field that assigns a row to its daily bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_field: Option<String>,
}

impl TableSchema {
    /// Create an empty schema at version 1.0
    pub fn new(name: impl Into<String>, layer: Layer) -> Self {
        Self {
            name: name.into(),
            layer,
            version: SchemaVersion::initial(),
            fields: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            date_orderings: Vec::new(),
            bucket_field: None,
        }
    }

    /// Set the version
    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Append a field
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the primary key field
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Declare a foreign key
    pub fn with_foreign_key(mut self, field: impl Into<String>, references: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKey {
            field: field.into(),
            references: references.into(),
        });
        self
    }

    /// Declare that `earlier` must not come after `later`
    pub fn with_date_ordering(mut self, earlier: impl Into<String>, later: impl Into<String>) -> Self {
        self.date_orderings.push(DateOrdering {
            earlier: earlier.into(),
            later: later.into(),
        });
        self
    }

    /// Set the daily bucket field
    pub fn with_bucket_field(mut self, field: impl Into<String>) -> Self {
        self.bucket_field = Some(field.into());
        self
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check if the schema declares a field
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Names of all fields in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Names of fields flagged PII
    pub fn pii_fields(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter(|f| f.pii)
            .map(|f| f.name.as_str())
            .collect()
    }
}
