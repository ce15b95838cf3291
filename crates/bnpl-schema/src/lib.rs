//! Schema registry and record validation
//!
//! - [`SchemaRegistry`]: versioned table schemas with evolution checks
//! - [`RecordValidator`]: rule-based validation of Silver records
//! - [`ReferenceTracker`]: deferred foreign-key resolution reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use bnpl_core::{tables, RawRecord};
//! use bnpl_schema::{RecordValidator, SchemaRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SchemaRegistry::with_bnpl_catalog().unwrap());
//! let validator = RecordValidator::new(registry);
//! let record = RawRecord::from_json(tables::MERCHANTS, serde_json::json!({
//!     "merchant_id": "m1", "category": "fashion"
//! }));
//! let result = validator.validate(tables::MERCHANTS, vec![record]).unwrap();
//! assert!(result.is_clean());
//! ```

pub mod compatibility;
pub mod error;
pub mod references;
pub mod registry;
pub mod rules;
pub mod validator;
pub mod violation;

pub use compatibility::{check_compatibility, compatible, CompatibilityReport};
pub use error::{Result, SchemaError};
pub use references::{DanglingReference, ReferenceReport, ReferenceTracker};
pub use registry::{RegisterOutcome, SchemaRegistry};
pub use rules::{RecordContext, RecordRule, RuleCategory};
pub use validator::{RecordValidator, RejectedRecord, ValidationResult};
pub use violation::ViolationReason;
