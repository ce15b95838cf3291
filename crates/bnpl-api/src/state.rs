//! Shared handler state

use bnpl_contracts::{ContractEnforcer, ResponseComposer};
use bnpl_core::PlatformMetrics;
use bnpl_metrics::MetricEngine;
use bnpl_schema::SchemaRegistry;
use std::sync::Arc;
use std::time::Instant;

/// State cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SchemaRegistry>,
    pub enforcer: Arc<ContractEnforcer>,
    pub engine: Arc<MetricEngine>,
    pub composer: Arc<ResponseComposer>,
    pub metrics: Arc<PlatformMetrics>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        enforcer: Arc<ContractEnforcer>,
        engine: Arc<MetricEngine>,
        composer: Arc<ResponseComposer>,
        metrics: Arc<PlatformMetrics>,
    ) -> Self {
        Self {
            registry,
            enforcer,
            engine,
            composer,
            metrics,
            start_time: Instant::now(),
        }
    }
}
