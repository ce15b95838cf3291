//! Command flow over a temporary workspace: ingest, validate, compute,
//! rebuild and authorize

use bnpl_cli::cli::commands::{
    execute_authorize, execute_compute, execute_ingest, execute_rebuild, execute_validate,
};
use bnpl_cli::{ExitCode, Platform};
use bnpl_contracts::read_log;
use bnpl_core::{tables, ConsumerClass, ConsumptionContract, DateRange, PlatformConfig, QueryFilter};
use chrono::NaiveDate;
use std::path::Path;

const BRONZE: &str = r#"{"event_id":"evt_01","event_type":"SIGNUP","ts":"2024-01-01T08:00:00+00:00","user_id":"user_a","merchant_id":null,"order_id":null,"device_id":"dev_a","city":"Casablanca","payload_json":{"signup_channel":"mobile"}}
{"event_id":"evt_02","event_type":"ORDER_OK","ts":"2024-01-05T12:00:00+00:00","user_id":"user_a","merchant_id":"merchant_x","order_id":"order_1","device_id":null,"city":null,"payload_json":{"amount":600,"currency":"MAD","installments_count":3,"merchant_category":"electronics"}}
{"event_id":"evt_03","event_type":"ORDER_REJ","ts":"2024-01-06T12:00:00+00:00","user_id":"user_a","merchant_id":"merchant_x","order_id":"order_2","device_id":null,"city":null,"payload_json":{"amount":3000,"currency":"MAD","installments_count":3,"merchant_category":"electronics"}}
"#;

fn jan(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn platform(audit_dir: &Path) -> Platform {
    let mut config = PlatformConfig::default();
    config.audit.path = audit_dir.join("query-log.jsonl");
    config
        .contracts
        .push(ConsumptionContract::new(ConsumerClass::Agent).allow_table(tables::KPI_DAILY));
    Platform::new(config).unwrap()
}

fn ingest(dir: &Path) -> std::path::PathBuf {
    let bronze = dir.join("bronze.jsonl");
    std::fs::write(&bronze, BRONZE).unwrap();
    let silver = dir.join("silver");
    let (output, code) = execute_ingest(&platform(dir), &bronze, &silver).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(output.malformed_lines, 0);
    assert_eq!(output.written[tables::ORDERS], 2);
    silver
}

#[test]
fn ingest_reports_malformed_lines_as_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let bronze = dir.path().join("bronze.jsonl");
    std::fs::write(&bronze, format!("{}not json\n", BRONZE)).unwrap();

    let platform = platform(dir.path());
    let (output, code) = execute_ingest(&platform, &bronze, &dir.path().join("silver")).unwrap();
    assert_eq!(code, ExitCode::Warnings);
    assert_eq!(output.malformed_lines, 1);
}

#[test]
fn validate_accepts_ingested_silver() {
    let dir = tempfile::tempdir().unwrap();
    let silver = ingest(dir.path());
    let platform = platform(dir.path());

    let (output, code) = execute_validate(&platform, &silver).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(output.rejected(), 0);
    assert!(output.tables.iter().any(|t| t.table == tables::ORDERS && t.accepted == 2));
}

#[test]
fn validate_missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let platform = platform(dir.path());
    let err = execute_validate(&platform, &dir.path().join("absent")).unwrap_err();
    assert_ne!(err.exit_code(), ExitCode::Success);
}

#[tokio::test]
async fn compute_publishes_one_metric() {
    let dir = tempfile::tempdir().unwrap();
    let silver = ingest(dir.path());
    let platform = platform(dir.path());

    let (output, code) = execute_compute(&platform, &silver, jan(5), Some("gmv"))
        .await
        .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(output.tasks.len(), 1);
    assert_eq!(output.tasks[0].status, "published");
    assert!(output.rows.iter().all(|r| r.table == tables::KPI_DAILY));
    assert!(!output.rows.is_empty());
}

#[tokio::test]
async fn compute_rejects_unknown_metric() {
    let dir = tempfile::tempdir().unwrap();
    let silver = ingest(dir.path());
    let platform = platform(dir.path());

    let err = execute_compute(&platform, &silver, jan(5), Some("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::InvalidInput);
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let silver = ingest(dir.path());
    let platform = platform(dir.path());
    let range = DateRange::new(jan(5), jan(6)).unwrap();

    let (first, code) = execute_rebuild(&platform, &silver, range, Some("gmv"))
        .await
        .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(first.tasks.len(), 2);
    assert!(first.tasks.iter().all(|t| t.status == "published"));

    let (second, _) = execute_rebuild(&platform, &silver, range, Some("gmv"))
        .await
        .unwrap();
    assert!(second.tasks.iter().all(|t| t.status == "unchanged"));
}

#[test]
fn authorize_logs_every_decision() {
    let dir = tempfile::tempdir().unwrap();
    let platform = platform(dir.path());
    let filters = vec![QueryFilter::TimeRange {
        from: jan(1),
        to: jan(31),
    }];

    let (allowed, code) = execute_authorize(
        &platform,
        "insights-bot",
        ConsumerClass::Agent,
        tables::KPI_DAILY,
        &["value".to_string()],
        &filters,
    )
    .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(allowed.decision, "allowed");

    let (denied, code) = execute_authorize(
        &platform,
        "insights-bot",
        ConsumerClass::Agent,
        tables::ORDERS,
        &["amount".to_string()],
        &filters,
    )
    .unwrap();
    assert_eq!(code, ExitCode::Failed);
    assert_eq!(denied.decision, "denied");
    assert!(denied.reason.is_some());

    let entries = read_log(&platform.config.audit.path).unwrap();
    assert_eq!(entries.len(), 2);
}
