//! Bronze ingestion for the BNPL Gold contract layer
//!
//! Parses Bronze JSON Lines events and derives the Silver tables
//! (`users`, `merchants`, `orders`, `installments`, `disputes_returns`).
//! Derived rows are untyped [`RawRecord`](bnpl_core::RawRecord)s; they go
//! through the record validator like any other Silver input.

pub mod builder;
pub mod error;
pub mod event;
pub mod jsonl;
pub mod silver_dir;

pub use builder::{BuildStats, SilverBatch, SilverBuilder};
pub use error::{IngestError, Result};
pub use event::{BronzeEvent, EventType};
pub use jsonl::{read_events, read_events_file, read_records, read_records_file, BronzeRead, MalformedLine};
pub use silver_dir::{load_silver_dir, table_path, write_silver_dir};
