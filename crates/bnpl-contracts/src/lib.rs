//! Consumption contracts for BNPL Gold tables
//!
//! - [`ContractEnforcer`] decides allow / deny / allow-with-mask per query
//!   and writes one [`QueryLogEntry`] per decision to an [`AuditSink`]
//! - [`ContractStore`] holds the versioned contract set with copy-and-swap
//!   reload
//! - [`ResponseComposer`] turns query results into four-part agent responses

pub mod audit;
pub mod composer;
pub mod decision;
pub mod enforcer;
pub mod error;
pub mod masking;
pub mod store;

pub use audit::{read_log, AuditSink, JsonlAuditSink, MemoryAuditSink, QueryLogEntry};
pub use composer::{AgentResponse, Evidence, ResponseComposer, SUMMARY_MAX_CHARS};
pub use decision::{Decision, DecisionKind, DenyReason};
pub use enforcer::{Authorization, ContractEnforcer};
pub use error::{ContractError, Result};
pub use masking::{mask_value, REDACTED};
pub use store::ContractStore;
