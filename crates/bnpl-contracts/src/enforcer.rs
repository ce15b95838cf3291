//! Contract enforcement for Gold table queries
//!
//! [`ContractEnforcer::authorize`] evaluates a query against the active
//! contract set and writes exactly one query log entry before returning.
//! [`ContractEnforcer::shape`] applies an allow decision to Gold rows.

use bnpl_core::{
    ConsumerClass, ConsumptionContract, ContractSet, FilterKind, GoldRow, Layer, MaskPolicy,
    MaskRule, PlatformMetrics, QueryFilter, TableSchema,
};
use bnpl_schema::SchemaRegistry;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::audit::{AuditSink, QueryLogEntry};
use crate::decision::{Decision, DenyReason};
use crate::error::{ContractError, Result};
use crate::masking::mask_value;
use crate::store::ContractStore;

/// Field carrying the row bucket in shaped output
pub const DATE_FIELD: &str = "date";

/// Decision plus the log entry that recorded it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authorization {
    pub decision: Decision,
    pub entry_id: Uuid,
    pub contract_version: u64,
}

/// Evaluates queries against consumption contracts
pub struct ContractEnforcer {
    contracts: Arc<ContractStore>,
    registry: Arc<SchemaRegistry>,
    audit: Arc<dyn AuditSink>,
    metrics: Option<Arc<PlatformMetrics>>,
}

impl ContractEnforcer {
    pub fn new(
        contracts: Arc<ContractStore>,
        registry: Arc<SchemaRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            contracts,
            registry,
            audit,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PlatformMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn contracts(&self) -> &Arc<ContractStore> {
        &self.contracts
    }

    /// Decide whether a query may run and log the decision
    ///
    /// Empty `fields` means every field of the table. Fails with
    /// `AuditUnavailable` when the decision cannot be logged; no decision is
    /// returned in that case.
    #[instrument(skip(self, fields, filters))]
    pub fn authorize(
        &self,
        consumer_id: &str,
        consumer_class: ConsumerClass,
        table: &str,
        fields: &[String],
        filters: &[QueryFilter],
    ) -> Result<Authorization> {
        let set = self.contracts.snapshot();
        let decision = self.decide(&set, consumer_id, consumer_class, table, fields, filters);

        let entry = QueryLogEntry::new(
            consumer_id,
            consumer_class,
            table,
            fields,
            filters,
            &decision,
            set.version,
        );
        if let Err(e) = self.audit.append(&entry) {
            error!(consumer_id, table, error = %e, "query log write failed; failing closed");
            if let Some(metrics) = &self.metrics {
                metrics.record_audit_failure();
            }
            return Err(e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(consumer_class.as_str(), decision.kind().as_str());
        }
        info!(
            consumer_id,
            table,
            decision = decision.kind().as_str(),
            reason = decision.deny_reason().map(|r| r.code()).unwrap_or(""),
            contract_version = set.version,
            "query authorized"
        );

        Ok(Authorization {
            decision,
            entry_id: entry.entry_id,
            contract_version: set.version,
        })
    }

    fn decide(
        &self,
        set: &ContractSet,
        consumer_id: &str,
        consumer_class: ConsumerClass,
        table: &str,
        fields: &[String],
        filters: &[QueryFilter],
    ) -> Decision {
        let deny = |reason| Decision::Deny { reason };

        let Some((contract, schema)) = self.allowed_table(set, consumer_class, table) else {
            return deny(DenyReason::TableNotAllowed {
                table: table.to_string(),
            });
        };

        if consumer_class == ConsumerClass::Agent && QueryFilter::time_range(filters).is_none() {
            return deny(DenyReason::MissingTimeFilter);
        }
        for required in &contract.required_filters {
            let present = filters.iter().any(|f| f.kind() == Some(*required));
            if !present {
                return deny(match required {
                    FilterKind::TimeRange => DenyReason::MissingTimeFilter,
                    other => DenyReason::MissingRequiredFilter { filter: *other },
                });
            }
        }
        if let Some((from, to)) = QueryFilter::time_ranges(filters).find(|(from, to)| from > to) {
            return deny(DenyReason::InvalidTimeRange { from, to });
        }

        let effective: Vec<String> = if fields.is_empty() {
            schema.field_names().into_iter().map(String::from).collect()
        } else {
            fields.to_vec()
        };
        let filter_fields = filters.iter().filter_map(|f| match f {
            QueryFilter::Equals { field, .. } => Some(field),
            _ => None,
        });
        if let Some(unknown) = effective
            .iter()
            .chain(filter_fields)
            .find(|f| !schema.has_field(f))
        {
            return deny(DenyReason::UnknownField {
                table: table.to_string(),
                field: unknown.clone(),
            });
        }

        let roles = set
            .profile(consumer_id)
            .map(|p| p.roles.clone())
            .unwrap_or_default();
        let policy_for = |field: &str| {
            let rule = mask_rule(contract, &schema, field)?;
            let authorized = rule.authorized_roles.iter().any(|r| roles.contains(r));
            (!authorized).then_some(rule.policy)
        };

        // masked fields cannot be filtered on
        for filter in filters {
            let field = match filter {
                QueryFilter::Equals { field, .. } => Some(field.as_str()),
                QueryFilter::GrainKey { .. } => schema.primary_key.as_deref(),
                QueryFilter::TimeRange { .. } => None,
            };
            if let Some(field) = field.filter(|f| policy_for(*f).is_some()) {
                return deny(DenyReason::MaskedFilterField {
                    field: field.to_string(),
                });
            }
        }

        let masked: BTreeMap<String, MaskPolicy> = effective
            .iter()
            .filter_map(|field| policy_for(field.as_str()).map(|policy| (field.clone(), policy)))
            .collect();

        if masked.is_empty() {
            Decision::Allow { fields: effective }
        } else {
            Decision::AllowWithMask {
                fields: effective,
                masked,
            }
        }
    }

    /// Contract and schema for a table the class may read
    fn allowed_table<'a>(
        &self,
        set: &'a ContractSet,
        consumer_class: ConsumerClass,
        table: &str,
    ) -> Option<(&'a ConsumptionContract, Arc<TableSchema>)> {
        let contract = set.contract_for(consumer_class)?;
        if !contract.allowed_tables.contains(table) {
            return None;
        }
        let schema = self.registry.latest(table).ok()?;
        (schema.layer == Layer::Gold).then_some((contract, schema))
    }

    /// Project rows for an allow decision
    ///
    /// Keeps rows matching every filter, projects them to the decision's
    /// fields and renders masked fields with their policy.
    pub fn shape(decision: &Decision, rows: &[GoldRow], filters: &[QueryFilter]) -> Result<Vec<Map<String, Json>>> {
        if let Decision::Deny { reason } = decision {
            return Err(ContractError::NotAuthorized(reason.code().to_string()));
        }

        Ok(Self::select(rows, filters)
            .map(|row| {
                decision
                    .fields()
                    .iter()
                    .map(|field| {
                        let value = field_value(row, field);
                        let value = match decision.mask_policy(field) {
                            Some(policy) => mask_value(policy, &value),
                            None => value,
                        };
                        (field.clone(), value)
                    })
                    .collect()
            })
            .collect())
    }

    /// Rows matching every filter, in input order
    pub fn select<'a>(rows: &'a [GoldRow], filters: &'a [QueryFilter]) -> impl Iterator<Item = &'a GoldRow> {
        rows.iter().filter(move |row| filters.iter().all(|f| row_matches(row, f)))
    }
}

/// Configured rule, or the default redaction for schema PII fields
fn mask_rule(contract: &ConsumptionContract, schema: &TableSchema, field: &str) -> Option<MaskRule> {
    if let Some(rule) = contract.mask_rule(&schema.name, field) {
        return Some(rule.clone());
    }
    schema
        .field(field)
        .filter(|def| def.pii)
        .map(|_| MaskRule::new(MaskPolicy::Redact))
}

fn field_value(row: &GoldRow, field: &str) -> Json {
    if field == DATE_FIELD {
        return Json::String(row.date.format("%Y-%m-%d").to_string());
    }
    row.get(field).map(|v| v.to_json()).unwrap_or(Json::Null)
}

fn row_matches(row: &GoldRow, filter: &QueryFilter) -> bool {
    match filter {
        QueryFilter::TimeRange { from, to } => *from <= row.date && row.date <= *to,
        QueryFilter::GrainKey { key } => &row.grain_key == key,
        QueryFilter::Equals { field, value } => &field_value(row, field) == value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use bnpl_core::{tables, ConsumerProfile};
    use chrono::NaiveDate;

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn enforcer() -> (ContractEnforcer, Arc<MemoryAuditSink>) {
        let set = ContractSet {
            version: 0,
            contracts: vec![
                ConsumptionContract::new(ConsumerClass::Dashboard).allow_table(tables::KPI_DAILY),
                ConsumptionContract::new(ConsumerClass::Agent)
                    .allow_table(tables::KPI_DAILY)
                    .allow_table(tables::MERCHANT_FEATURES_DAILY)
                    .allow_table(tables::ORDERS)
                    .mask_field(
                        tables::MERCHANT_FEATURES_DAILY,
                        "device_fingerprint_days_30d",
                        MaskRule::new(MaskPolicy::Hash).with_role("risk_analyst"),
                    ),
            ],
            consumers: vec![ConsumerProfile::new("risk-bot").with_role("risk_analyst")],
        };
        let audit = Arc::new(MemoryAuditSink::new());
        let enforcer = ContractEnforcer::new(
            Arc::new(ContractStore::new(set).unwrap()),
            Arc::new(SchemaRegistry::with_bnpl_catalog().unwrap()),
            audit.clone(),
        );
        (enforcer, audit)
    }

    fn range(from: u32, to: u32) -> Vec<QueryFilter> {
        vec![QueryFilter::TimeRange {
            from: jan(from),
            to: jan(to),
        }]
    }

    #[test]
    fn test_silver_table_is_never_allowed() {
        let (enforcer, _) = enforcer();
        // listed in the agent contract, but not a Gold table
        let auth = enforcer
            .authorize("bot", ConsumerClass::Agent, tables::ORDERS, &[], &range(1, 2))
            .unwrap();
        assert_eq!(auth.decision.deny_reason().unwrap().code(), "TABLE_NOT_ALLOWED");
    }

    #[test]
    fn test_inverted_range() {
        let (enforcer, _) = enforcer();
        let auth = enforcer
            .authorize("bot", ConsumerClass::Agent, tables::KPI_DAILY, &[], &range(5, 1))
            .unwrap();
        assert_eq!(
            auth.decision.deny_reason(),
            Some(&DenyReason::InvalidTimeRange {
                from: jan(5),
                to: jan(1)
            })
        );
    }

    #[test]
    fn test_any_inverted_range_is_denied() {
        let (enforcer, _) = enforcer();
        let filters = vec![
            QueryFilter::TimeRange {
                from: jan(1),
                to: jan(5),
            },
            QueryFilter::TimeRange {
                from: jan(9),
                to: jan(1),
            },
        ];
        let auth = enforcer
            .authorize("bot", ConsumerClass::Agent, tables::KPI_DAILY, &[], &filters)
            .unwrap();
        assert_eq!(
            auth.decision.deny_reason(),
            Some(&DenyReason::InvalidTimeRange {
                from: jan(9),
                to: jan(1)
            })
        );
    }

    #[test]
    fn test_equals_on_masked_field_is_denied() {
        let (enforcer, audit) = enforcer();
        let fields = vec!["device_fingerprint_days_30d".to_string()];
        let mut filters = range(1, 31);
        filters.push(QueryFilter::Equals {
            field: "device_fingerprint_days_30d".to_string(),
            value: serde_json::json!(11),
        });

        let auth = enforcer
            .authorize("bot", ConsumerClass::Agent, tables::MERCHANT_FEATURES_DAILY, &fields, &filters)
            .unwrap();
        assert_eq!(
            auth.decision.deny_reason(),
            Some(&DenyReason::MaskedFilterField {
                field: "device_fingerprint_days_30d".to_string()
            })
        );

        // the same filter is fine for a role that sees the clear value
        let auth = enforcer
            .authorize("risk-bot", ConsumerClass::Agent, tables::MERCHANT_FEATURES_DAILY, &fields, &filters)
            .unwrap();
        assert_eq!(auth.decision, Decision::Allow { fields });
        assert_eq!(audit.len(), 2);
    }

    #[test]
    fn test_equals_on_unselected_masked_field_is_denied() {
        let (enforcer, _) = enforcer();
        let mut filters = range(1, 31);
        filters.push(QueryFilter::Equals {
            field: "device_fingerprint_days_30d".to_string(),
            value: serde_json::json!(11),
        });
        let auth = enforcer
            .authorize(
                "bot",
                ConsumerClass::Agent,
                tables::MERCHANT_FEATURES_DAILY,
                &["gmv_30d".to_string()],
                &filters,
            )
            .unwrap();
        assert_eq!(auth.decision.deny_reason().unwrap().code(), "MASKED_FILTER_FIELD");
    }

    #[test]
    fn test_grain_key_filter_on_masked_key_is_denied() {
        let set = ContractSet {
            version: 0,
            contracts: vec![ConsumptionContract::new(ConsumerClass::Agent)
                .allow_table(tables::MERCHANT_FEATURES_DAILY)
                .mask_field(
                    tables::MERCHANT_FEATURES_DAILY,
                    "merchant_id",
                    MaskRule::new(MaskPolicy::Redact),
                )],
            consumers: vec![],
        };
        let enforcer = ContractEnforcer::new(
            Arc::new(ContractStore::new(set).unwrap()),
            Arc::new(SchemaRegistry::with_bnpl_catalog().unwrap()),
            Arc::new(MemoryAuditSink::new()),
        );
        let mut filters = range(1, 31);
        filters.push(QueryFilter::GrainKey { key: "m1".to_string() });

        let auth = enforcer
            .authorize(
                "bot",
                ConsumerClass::Agent,
                tables::MERCHANT_FEATURES_DAILY,
                &["gmv_30d".to_string()],
                &filters,
            )
            .unwrap();
        assert_eq!(
            auth.decision.deny_reason(),
            Some(&DenyReason::MaskedFilterField {
                field: "merchant_id".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_field() {
        let (enforcer, _) = enforcer();
        let auth = enforcer
            .authorize(
                "dash",
                ConsumerClass::Dashboard,
                tables::KPI_DAILY,
                &["value".to_string(), "secret".to_string()],
                &[],
            )
            .unwrap();
        assert_eq!(auth.decision.deny_reason().unwrap().code(), "UNKNOWN_FIELD");
    }

    #[test]
    fn test_authorized_role_sees_clear_value() {
        let (enforcer, _) = enforcer();
        let fields = vec!["merchant_id".to_string(), "device_fingerprint_days_30d".to_string()];
        let auth = enforcer
            .authorize(
                "risk-bot",
                ConsumerClass::Agent,
                tables::MERCHANT_FEATURES_DAILY,
                &fields,
                &range(1, 31),
            )
            .unwrap();
        assert_eq!(auth.decision, Decision::Allow { fields });
    }

    #[test]
    fn test_empty_fields_expand_to_schema() {
        let (enforcer, _) = enforcer();
        let auth = enforcer
            .authorize("dash", ConsumerClass::Dashboard, tables::KPI_DAILY, &[], &[])
            .unwrap();
        let fields = auth.decision.fields();
        assert!(fields.contains(&"date".to_string()));
        assert!(fields.contains(&"value".to_string()));
    }

    #[test]
    fn test_shape_filters_projects_and_masks() {
        let mut masked = BTreeMap::new();
        masked.insert("device_fingerprint_days_30d".to_string(), MaskPolicy::Redact);
        let decision = Decision::AllowWithMask {
            fields: vec![
                "date".to_string(),
                "merchant_id".to_string(),
                "device_fingerprint_days_30d".to_string(),
            ],
            masked,
        };
        let rows: Vec<GoldRow> = [1, 2, 3]
            .iter()
            .map(|d| {
                GoldRow::new(tables::MERCHANT_FEATURES_DAILY, "mf", "m1", jan(*d))
                    .with_value("merchant_id", "m1")
                    .with_value("device_fingerprint_days_30d", 4i64)
                    .with_value("gmv_30d", 10.0)
            })
            .collect();

        let shaped = ContractEnforcer::shape(&decision, &rows, &range(2, 3)).unwrap();
        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped[0]["date"], "2024-01-02");
        assert_eq!(shaped[0]["merchant_id"], "m1");
        assert_eq!(shaped[0]["device_fingerprint_days_30d"], "[masked]");
        assert!(!shaped[0].contains_key("gmv_30d"));
    }

    #[test]
    fn test_shape_rejects_deny() {
        let decision = Decision::Deny {
            reason: DenyReason::MissingTimeFilter,
        };
        let err = ContractEnforcer::shape(&decision, &[], &[]).unwrap_err();
        assert_eq!(err.code(), "NOT_AUTHORIZED");
    }
}
