//! Core types for the BNPL Gold contract layer
//!
//! This crate holds the vocabulary shared by every other crate in the
//! workspace:
//!
//! - **Values**: `Value`, `FieldType` and JSON coercion rules
//! - **Schemas**: `TableSchema`, `FieldDef`, `SchemaVersion`, `Layer`
//! - **Records**: `RawRecord` (as ingested) and `SilverRecord` (validated)
//! - **Gold rows**: `GoldRow`, `RowFlag`, `DateRange`
//! - **Contracts**: consumer classes, filters, masking rules
//! - **Catalog**: the built-in BNPL Silver and Gold table definitions
//! - **Configuration**: `PlatformConfig` loaded from TOML, YAML or JSON
//! - **Telemetry**: Prometheus counters shared by all components
//!
//! ## Layering
//!
//! ```text
//! Bronze events -> Silver records -> Gold rows -> consumers
//!                  (validated)       (computed)   (contract gated)
//! ```

pub mod catalog;
pub mod config;
pub mod contract;
pub mod error;
pub mod gold;
pub mod record;
pub mod schema;
pub mod telemetry;
pub mod value;

pub use catalog::{bnpl_catalog, gold_schemas, silver_schemas, tables};
pub use config::{
    ActionRule, AuditConfig, Comparator, LogFormat, LoggingConfig, PlatformConfig, RetryPolicy,
    ServerConfig,
};
pub use contract::{
    ConsumerClass, ConsumerProfile, ConsumptionContract, ContractSet, FilterKind, MaskPolicy,
    MaskRule, QueryFilter,
};
pub use error::{CoreError, Result};
pub use gold::{DateRange, GoldRow, RowFlag};
pub use record::{RawRecord, SilverRecord};
pub use schema::{DateOrdering, FieldDef, ForeignKey, Layer, SchemaVersion, TableSchema};
pub use telemetry::PlatformMetrics;
pub use value::{FieldType, Value};

/// Crate version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
