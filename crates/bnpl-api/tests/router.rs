//! Router tests driven through `tower::ServiceExt::oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use bnpl_api::{create_router, AppState};
use bnpl_contracts::{ContractEnforcer, ContractStore, MemoryAuditSink, ResponseComposer};
use bnpl_core::{
    tables, ActionRule, Comparator, ConsumerClass, ConsumerProfile, ConsumptionContract,
    ContractSet, FilterKind, GoldRow, MaskPolicy, MaskRule, PlatformMetrics,
};
use bnpl_metrics::{GoldStore, InMemoryGoldStore, MetricCatalog, MetricEngine, PartitionKey};
use bnpl_schema::SchemaRegistry;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn jan(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn contracts() -> ContractSet {
    ContractSet {
        version: 0,
        contracts: vec![
            ConsumptionContract::new(ConsumerClass::Dashboard).allow_table(tables::KPI_DAILY),
            ConsumptionContract::new(ConsumerClass::Agent)
                .allow_table(tables::KPI_DAILY)
                .allow_table(tables::MERCHANT_FEATURES_DAILY)
                .require_filter(FilterKind::TimeRange)
                .mask_field(
                    tables::MERCHANT_FEATURES_DAILY,
                    "device_fingerprint_days_30d",
                    MaskRule::new(MaskPolicy::Redact).with_role("fraud_investigator"),
                ),
        ],
        consumers: vec![ConsumerProfile::new("fraud-bot").with_role("fraud_investigator")],
    }
}

fn publish(store: &InMemoryGoldStore, rows: Vec<GoldRow>) {
    let first = &rows[0];
    let key = PartitionKey::new(first.table.clone(), first.date, first.metric.clone());
    store.publish(&key, rows, 0).unwrap();
}

fn late_rate(d: u32, value: f64) -> GoldRow {
    GoldRow::new(tables::KPI_DAILY, "late_rate", "late_rate", jan(d))
        .with_value("metric", "late_rate")
        .with_value("value", value)
        .with_value("numerator", value * 200.0)
        .with_value("denominator", 200.0)
        .with_value("no_data", false)
        .seal()
}

struct Harness {
    router: Router,
    audit: Arc<MemoryAuditSink>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryGoldStore::new());
    publish(&store, vec![late_rate(1, 0.04)]);
    publish(&store, vec![late_rate(2, 0.12)]);
    publish(
        &store,
        vec![GoldRow::new(
            tables::MERCHANT_FEATURES_DAILY,
            tables::MERCHANT_FEATURES_DAILY,
            "m1",
            jan(2),
        )
        .with_value("merchant_id", "m1")
        .with_value("gmv_30d", 4200.0)
        .with_value("device_fingerprint_days_30d", 11i64)
        .seal()],
    );

    let metrics = Arc::new(PlatformMetrics::new().unwrap());
    let registry = Arc::new(SchemaRegistry::with_bnpl_catalog().unwrap());
    let audit = Arc::new(MemoryAuditSink::new());
    let enforcer = ContractEnforcer::new(
        Arc::new(ContractStore::new(contracts()).unwrap()),
        Arc::clone(&registry),
        audit.clone(),
    )
    .with_metrics(Arc::clone(&metrics));
    let engine = MetricEngine::new(MetricCatalog::builtin(), store);
    let composer = ResponseComposer::new(vec![ActionRule {
        metric: "late_rate".to_string(),
        comparator: Comparator::Gt,
        threshold: 0.1,
        action: "tighten approval for repeat late payers".to_string(),
    }]);

    let state = AppState::new(
        registry,
        Arc::new(enforcer),
        Arc::new(engine),
        Arc::new(composer),
        metrics,
    );
    Harness {
        router: create_router(state),
        audit,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn january() -> Value {
    json!([{ "kind": "time_range", "from": "2024-01-01", "to": "2024-01-31" }])
}

#[tokio::test]
async fn health_reports_contract_version() {
    let h = harness();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["contract_version"], 1);
}

#[tokio::test]
async fn agent_without_time_filter_gets_403_with_reason() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "insights-bot",
                "consumer_class": "agent",
                "table": "kpi_daily",
                "metric": "late_rate"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "MISSING_TIME_FILTER");
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn dashboard_receives_shaped_rows() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "finance-dash",
                "consumer_class": "dashboard",
                "table": "kpi_daily",
                "fields": ["date", "metric", "value"],
                "filters": [{ "kind": "time_range", "from": "2024-01-02", "to": "2024-01-02" }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["decision"], "allowed");
    let rows = body["data"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], "2024-01-02");
    assert_eq!(rows[0]["value"], 0.12);
    assert!(rows[0].get("numerator").is_none());
}

#[tokio::test]
async fn agent_receives_composed_response() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "insights-bot",
                "consumer_class": "agent",
                "table": "kpi_daily",
                "filters": january(),
                "metric": "late_rate"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response = &body["data"]["response"];
    assert_eq!(response["evidence"]["date"], "2024-01-02");
    assert_eq!(response["evidence"]["value"], 0.12);
    assert_eq!(
        response["suggested_action"],
        "tighten approval for repeat late payers"
    );
    assert_eq!(response["data_source"], "kpi_daily");
    assert!(body["data"].get("rows").is_none());
}

#[tokio::test]
async fn composing_from_masked_field_is_refused() {
    let h = harness();
    let query = |consumer: &str| {
        post(
            "/v1/query",
            json!({
                "consumer_id": consumer,
                "consumer_class": "agent",
                "table": "merchant_features_daily",
                "filters": january(),
                "metric": "device_fingerprint_days_30d"
            }),
        )
    };

    let (status, body) = send(&h.router, query("insights-bot")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FIELD_MASKED");

    let (status, body) = send(&h.router, query("fraud-bot")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["response"]["evidence"]["value"], 11.0);
    assert_eq!(h.audit.len(), 2);
}

#[tokio::test]
async fn masked_field_is_redacted_in_rows() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "insights-bot",
                "consumer_class": "agent",
                "table": "merchant_features_daily",
                "fields": ["merchant_id", "device_fingerprint_days_30d"],
                "filters": january()
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["decision"], "masked");
    assert_eq!(
        body["data"]["masked_fields"],
        json!(["device_fingerprint_days_30d"])
    );
    assert_eq!(body["data"]["rows"][0]["device_fingerprint_days_30d"], "[masked]");
}

#[tokio::test]
async fn composed_response_hides_masked_grain_key() {
    let h = harness();
    let (status, _) = send(
        &h.router,
        post(
            "/v1/admin/contracts/reload",
            json!({ "contracts": [{
                "consumer_class": "agent",
                "allowed_tables": ["merchant_features_daily"],
                "field_masking_rules": {
                    "merchant_features_daily": { "merchant_id": { "policy": "redact" } }
                }
            }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "insights-bot",
                "consumer_class": "agent",
                "table": "merchant_features_daily",
                "filters": january(),
                "metric": "gmv_30d"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["decision"], "masked");
    let response = &body["data"]["response"];
    assert_eq!(response["evidence"]["value"], 4200.0);
    assert_eq!(response["evidence"]["grain_key"], "[masked]");
    let summary = response["summary"].as_str().unwrap();
    assert!(summary.starts_with("gmv_30d was 4200 on 2024-01-02"));
    assert!(!summary.contains("m1"));
}

#[tokio::test]
async fn audit_outage_returns_503() {
    let h = harness();
    h.audit.set_unavailable(true);
    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "finance-dash",
                "consumer_class": "dashboard",
                "table": "kpi_daily"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "AUDIT_UNAVAILABLE");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn reload_changes_next_decision() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        post(
            "/v1/admin/contracts/reload",
            json!({ "contracts": [{ "consumer_class": "dashboard" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contract_version"], 2);

    let (status, body) = send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "finance-dash",
                "consumer_class": "dashboard",
                "table": "kpi_daily"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "TABLE_NOT_ALLOWED");
}

#[tokio::test]
async fn metrics_endpoint_exports_decisions() {
    let h = harness();
    send(
        &h.router,
        post(
            "/v1/query",
            json!({
                "consumer_id": "finance-dash",
                "consumer_class": "dashboard",
                "table": "kpi_daily"
            }),
        ),
    )
    .await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("bnpl_gold_contract_decisions_total"));
}
