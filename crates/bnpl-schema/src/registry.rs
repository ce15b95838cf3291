//! Versioned schema registry
//!
//! Schemas are stored per table as a version-ordered map of immutable
//! `Arc<TableSchema>` snapshots. Registration never mutates an existing
//! version; evolution registers a new one.

use bnpl_core::{bnpl_catalog, Layer, SchemaVersion, TableSchema};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::compatibility::compatible;
use crate::error::{Result, SchemaError};

/// Outcome of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new version was stored
    Registered,
    /// The identical definition was already registered
    Unchanged,
}

type VersionMap = BTreeMap<SchemaVersion, Arc<TableSchema>>;

/// Registry of table schemas keyed by name and version
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<BTreeMap<String, VersionMap>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the built-in BNPL tables
    pub fn with_bnpl_catalog() -> Result<Self> {
        let registry = Self::new();
        for schema in bnpl_catalog() {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Register a schema version
    ///
    /// - identical re-registration is a no-op
    /// - same version with a different definition fails with `SchemaConflict`
    /// - a new minor version must be compatible with its neighbours in the
    ///   same major line, else `BreakingSchemaChange`
    /// - the first version of a major line is accepted as is
    pub fn register(&self, schema: TableSchema) -> Result<RegisterOutcome> {
        check_well_formed(&schema)?;

        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        let versions = schemas.entry(schema.name.clone()).or_default();

        if let Some(existing) = versions.get(&schema.version) {
            if **existing == schema {
                debug!(table = %schema.name, version = %schema.version, "schema already registered");
                return Ok(RegisterOutcome::Unchanged);
            }
            return Err(SchemaError::SchemaConflict {
                table: schema.name,
                version: schema.version,
            });
        }

        let major = schema.version.major;
        let predecessor = versions
            .range(..schema.version)
            .rev()
            .map(|(_, s)| s)
            .find(|s| s.version.major == major);
        if let Some(prev) = predecessor {
            compatible(prev, &schema)?;
        }
        let successor = versions
            .range(schema.version..)
            .map(|(_, s)| s)
            .find(|s| s.version.major == major);
        if let Some(next) = successor {
            compatible(&schema, next)?;
        }

        info!(
            table = %schema.name,
            version = %schema.version,
            layer = %schema.layer,
            fields = schema.fields.len(),
            "schema registered"
        );
        versions.insert(schema.version, Arc::new(schema));
        Ok(RegisterOutcome::Registered)
    }

    /// Schema in effect for `table`: the latest version `<= as_of`, or the
    /// latest overall when `as_of` is `None`
    pub fn get(&self, table: &str, as_of: Option<SchemaVersion>) -> Result<Arc<TableSchema>> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        let versions = schemas
            .get(table)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;

        let found = match as_of {
            None => versions.values().next_back(),
            Some(limit) => versions.range(..=limit).map(|(_, s)| s).next_back(),
        };

        found.cloned().ok_or_else(|| SchemaError::UnknownVersion {
            table: table.to_string(),
            as_of: as_of.unwrap_or_else(SchemaVersion::initial),
        })
    }

    /// Latest schema of a table
    pub fn latest(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.get(table, None)
    }

    /// Layer classification of a table
    pub fn layer_of(&self, table: &str) -> Result<Layer> {
        Ok(self.latest(table)?.layer)
    }

    /// Registered versions of a table, oldest first
    pub fn versions(&self, table: &str) -> Vec<SchemaVersion> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas
            .get(table)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Names of all registered tables, sorted
    pub fn tables(&self) -> Vec<String> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas.keys().cloned().collect()
    }

    /// Names of registered tables in a layer
    pub fn tables_in(&self, layer: Layer) -> Vec<String> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        schemas
            .iter()
            .filter(|(_, versions)| {
                versions
                    .values()
                    .next_back()
                    .map_or(false, |s| s.layer == layer)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn check_well_formed(schema: &TableSchema) -> Result<()> {
    if schema.name.trim().is_empty() {
        return Err(SchemaError::InvalidSchema("table name is empty".to_string()));
    }

    let mut seen = std::collections::BTreeSet::new();
    for field in &schema.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::InvalidSchema(format!(
                "{}: duplicate field '{}'",
                schema.name, field.name
            )));
        }
        if field.field_type == bnpl_core::FieldType::Enum && field.enum_values.is_empty() {
            return Err(SchemaError::InvalidSchema(format!(
                "{}: enum field '{}' has an empty domain",
                schema.name, field.name
            )));
        }
    }

    let referenced = schema
        .primary_key
        .iter()
        .chain(schema.bucket_field.iter())
        .chain(schema.foreign_keys.iter().map(|fk| &fk.field))
        .chain(
            schema
                .date_orderings
                .iter()
                .flat_map(|o| [&o.earlier, &o.later]),
        );
    for name in referenced {
        if !schema.has_field(name) {
            return Err(SchemaError::InvalidSchema(format!(
                "{}: constraint references undeclared field '{}'",
                schema.name, name
            )));
        }
    }
    Ok(())
}
