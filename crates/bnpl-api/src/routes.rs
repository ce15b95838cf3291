//! Route definitions
//!
//! - GET /health - Component health
//! - GET /metrics - Prometheus exposition
//! - POST /v1/query - Contract-gated Gold query
//! - POST /v1/admin/contracts/reload - Replace the active contract set

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bnpl_contracts::{
    AgentResponse, Authorization, ContractEnforcer, ContractError, Decision, DecisionKind,
    DenyReason,
};
use bnpl_core::{ConsumerClass, ContractSet, DateRange, GoldRow, QueryFilter};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::state::AppState;
use crate::{ApiResponse, ComponentHealth, ErrorInfo, HealthResponse, HealthStatus};

/// Field holding the figure of a KPI row
const KPI_VALUE_FIELD: &str = "value";

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// The enforcer denied the query; the denial is already logged
    Denied { reason: DenyReason, entry_id: Uuid },
    /// Allowed query whose composed answer would expose a field the
    /// consumer cannot read in clear
    Forbidden { code: &'static str, message: String },
    Unprocessable { code: &'static str, message: String },
    ServiceUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Denied { reason, .. } => reason.code(),
            ApiError::Forbidden { code, .. } | ApiError::Unprocessable { code, .. } => *code,
            ApiError::ServiceUnavailable(_) => "AUDIT_UNAVAILABLE",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Denied { .. } | ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ContractError> for ApiError {
    fn from(err: ContractError) -> Self {
        match &err {
            ContractError::AuditUnavailable(_) => ApiError::ServiceUnavailable(err.to_string()),
            ContractError::IncompleteEvidence { .. } => ApiError::Unprocessable {
                code: err.code(),
                message: err.to_string(),
            },
            ContractError::NotAuthorized(_) => ApiError::Forbidden {
                code: err.code(),
                message: err.to_string(),
            },
            ContractError::InvalidContracts(msg) => ApiError::BadRequest(msg.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_info = match &self {
            ApiError::BadRequest(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::InternalError(msg) => ErrorInfo::new(self.error_code(), msg),
            ApiError::Denied { reason, entry_id } => {
                ErrorInfo::new(self.error_code(), reason.to_string())
                    .with_details(json!({ "reason": reason, "entry_id": entry_id }))
            }
            ApiError::Forbidden { message, .. } | ApiError::Unprocessable { message, .. } => {
                ErrorInfo::new(self.error_code(), message)
            }
        };

        let response = ApiResponse::<()>::error(error_info, Uuid::new_v4().to_string());
        (status, Json(response)).into_response()
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .route("/v1/query", post(query))
        .route("/v1/admin/contracts/reload", post(reload_contracts))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Gold table query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub consumer_id: String,
    pub consumer_class: ConsumerClass,
    pub table: String,
    /// Requested fields; empty selects every field of the table
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// Metric to compose an agent response for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

/// Answer to an allowed query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub decision: DecisionKind,
    pub entry_id: Uuid,
    pub contract_version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AgentResponse>,
}

/// POST /v1/query
///
/// Authorizes first; no Gold row is read for a denied query.
#[instrument(skip_all)]
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResult>>, ApiError> {
    let request_id = Uuid::new_v4().to_string();

    let auth = state.enforcer.authorize(
        &request.consumer_id,
        request.consumer_class,
        &request.table,
        &request.fields,
        &request.filters,
    )?;
    if let Decision::Deny { reason } = &auth.decision {
        return Err(ApiError::Denied {
            reason: reason.clone(),
            entry_id: auth.entry_id,
        });
    }

    let range = match QueryFilter::time_range(&request.filters) {
        Some((from, to)) => DateRange::new(from, to).map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => DateRange {
            from: NaiveDate::MIN,
            to: NaiveDate::MAX,
        },
    };
    let rows = state.engine.rows(&request.table, range);

    let mut result = QueryResult {
        decision: auth.decision.kind(),
        entry_id: auth.entry_id,
        contract_version: auth.contract_version,
        masked_fields: auth.decision.masked_fields(),
        rows: None,
        response: None,
    };

    match (&request.metric, request.consumer_class) {
        (Some(metric), ConsumerClass::Agent) => {
            let response = compose(&state, &auth, &rows, metric, &request)?;
            info!(consumer_id = %request.consumer_id, table = %request.table, metric = %metric, "agent response composed");
            result.response = Some(response);
        }
        _ => {
            let shaped = ContractEnforcer::shape(&auth.decision, &rows, &request.filters)?;
            info!(consumer_id = %request.consumer_id, table = %request.table, rows = shaped.len(), "rows returned");
            result.rows = Some(shaped);
        }
    }

    Ok(Json(ApiResponse::success(result, request_id)))
}

/// Compose only from a field the decision lets the consumer read in clear
fn compose(
    state: &AppState,
    auth: &Authorization,
    rows: &[GoldRow],
    metric: &str,
    request: &QueryRequest,
) -> Result<AgentResponse, ApiError> {
    let selected: Vec<GoldRow> = ContractEnforcer::select(rows, &request.filters).cloned().collect();
    let field = if selected.iter().any(|row| row.metric == metric) {
        KPI_VALUE_FIELD
    } else {
        metric
    };

    if !auth.decision.fields().iter().any(|f| f == field) {
        return Err(ApiError::BadRequest(format!(
            "field '{}' for metric '{}' is not among the selected fields",
            field, metric
        )));
    }
    if auth.decision.mask_policy(field).is_some() {
        warn!(metric, field, "refusing to compose from a masked field");
        return Err(ApiError::Forbidden {
            code: "FIELD_MASKED",
            message: format!("field '{}' is masked for this consumer", field),
        });
    }

    let grain_field = state
        .registry
        .latest(&request.table)
        .ok()
        .and_then(|schema| schema.primary_key.clone());
    Ok(state.composer.compose_for(
        &auth.decision,
        grain_field.as_deref(),
        &selected,
        metric,
        &request.table,
    )?)
}

/// Body of a successful reload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResult {
    pub contract_version: u64,
    pub contracts: usize,
}

/// POST /v1/admin/contracts/reload
pub async fn reload_contracts(
    State(state): State<AppState>,
    Json(set): Json<ContractSet>,
) -> Result<Json<ApiResponse<ReloadResult>>, ApiError> {
    let contracts = set.contracts.len();
    let contract_version = state.enforcer.contracts().reload(set)?;
    Ok(Json(ApiResponse::success(
        ReloadResult {
            contract_version,
            contracts,
        },
        Uuid::new_v4().to_string(),
    )))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let components = ComponentHealth {
        schema_registry: !state.registry.tables().is_empty(),
        metric_catalog: !state.engine.catalog().is_empty(),
        contracts: !state.enforcer.contracts().snapshot().contracts.is_empty(),
    };
    let status = if components.schema_registry && components.metric_catalog && components.contracts {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        components,
        contract_version: state.enforcer.contracts().version(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .encode_text()
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
