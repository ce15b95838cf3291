//! Versioned contract configuration
//!
//! Readers clone the current `Arc<ContractSet>` and work on that snapshot;
//! a reload builds a new set and swaps the pointer.

use bnpl_core::ContractSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::error::Result;

/// Holds the active contract set
#[derive(Debug)]
pub struct ContractStore {
    current: RwLock<Arc<ContractSet>>,
}

impl ContractStore {
    /// Start from a checked set; it becomes version 1
    pub fn new(mut set: ContractSet) -> Result<Self> {
        set.check()?;
        set.version = 1;
        Ok(Self {
            current: RwLock::new(Arc::new(set)),
        })
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<ContractSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace the active set; returns the new version
    ///
    /// A rejected set leaves the active one untouched.
    pub fn reload(&self, mut set: ContractSet) -> Result<u64> {
        set.check()?;
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        set.version = current.version + 1;
        let version = set.version;
        *current = Arc::new(set);
        info!(version, contracts = current.contracts.len(), "contracts reloaded");
        Ok(version)
    }
}
