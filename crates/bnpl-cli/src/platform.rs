//! Component wiring shared by every command

use bnpl_api::AppState;
use bnpl_contracts::{ContractEnforcer, ContractStore, JsonlAuditSink, ResponseComposer};
use bnpl_core::{PlatformConfig, PlatformMetrics};
use bnpl_metrics::{InMemoryGoldStore, LogAlertSink, MetricCatalog, MetricEngine, Scheduler};
use bnpl_schema::{RecordValidator, SchemaRegistry};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// Registry, engine and metrics built from one configuration
pub struct Platform {
    pub config: PlatformConfig,
    pub metrics: Arc<PlatformMetrics>,
    pub registry: Arc<SchemaRegistry>,
    pub engine: Arc<MetricEngine>,
}

impl Platform {
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let metrics = Arc::new(PlatformMetrics::new()?);
        let registry = Arc::new(SchemaRegistry::with_bnpl_catalog()?);
        let engine = MetricEngine::new(MetricCatalog::builtin(), Arc::new(InMemoryGoldStore::new()))
            .with_metrics(Arc::clone(&metrics));

        Ok(Self {
            config,
            metrics,
            registry,
            engine: Arc::new(engine),
        })
    }

    pub fn validator(&self) -> RecordValidator {
        RecordValidator::new(Arc::clone(&self.registry)).with_metrics(Arc::clone(&self.metrics))
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.engine),
            self.config.retry.clone(),
            Arc::new(LogAlertSink),
        )
        .with_metrics(Arc::clone(&self.metrics))
    }

    /// Enforcer logging to the configured JSON Lines file
    pub fn enforcer(&self) -> Result<ContractEnforcer> {
        let audit = JsonlAuditSink::open(&self.config.audit.path)?;
        let contracts = ContractStore::new(self.config.contract_set())?;
        info!(
            audit_log = %self.config.audit.path.display(),
            contracts = self.config.contracts.len(),
            "contract enforcer ready"
        );
        Ok(ContractEnforcer::new(Arc::new(contracts), Arc::clone(&self.registry), Arc::new(audit))
            .with_metrics(Arc::clone(&self.metrics)))
    }

    pub fn composer(&self) -> ResponseComposer {
        ResponseComposer::new(self.config.actions.clone())
    }

    /// HTTP handler state over this platform
    pub fn app_state(&self) -> Result<AppState> {
        Ok(AppState::new(
            Arc::clone(&self.registry),
            Arc::new(self.enforcer()?),
            Arc::clone(&self.engine),
            Arc::new(self.composer()),
            Arc::clone(&self.metrics),
        ))
    }
}
