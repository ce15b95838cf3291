//! Four-part responses for agent consumers
//!
//! A composed response is summary, evidence, suggested action and data
//! source, in that order. Suggested actions come only from configured
//! threshold rules; a metric without a matching rule gets no action.

use bnpl_core::{ActionRule, GoldRow, MaskPolicy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::decision::Decision;
use crate::error::{ContractError, Result};
use crate::masking::mask_value;

/// Upper bound on summary length, in characters
pub const SUMMARY_MAX_CHARS: usize = 280;

/// The figure a response is based on
///
/// Fields the consumer only sees masked carry their masked rendering, or
/// are left out when the rendering is not a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub metric: String,
    pub value: f64,
    pub table: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerator: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominator: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Structured agent response; field order is the response order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub summary: String,
    pub evidence: Evidence,
    pub suggested_action: Option<String>,
    pub data_source: String,
}

/// Builds agent responses from query results
#[derive(Debug, Clone, Default)]
pub struct ResponseComposer {
    rules: Vec<ActionRule>,
}

impl ResponseComposer {
    pub fn new(rules: Vec<ActionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ActionRule] {
        &self.rules
    }

    /// Compose a response for `metric_name` from rows of `source_table`
    ///
    /// The latest row for the metric is the evidence. KPI rows carry the
    /// figure in `value`; for other tables `metric_name` names the field.
    /// Fails with `IncompleteEvidence` when that row is flagged `NoData` or
    /// no row carries the metric.
    pub fn compose(&self, query_result: &[GoldRow], metric_name: &str, source_table: &str) -> Result<AgentResponse> {
        let unmasked = Decision::Allow { fields: Vec::new() };
        self.compose_for(&unmasked, None, query_result, metric_name, source_table)
    }

    /// Like [`compose`](Self::compose), applying the masks of `decision`
    ///
    /// `grain_field` is the table field holding the row grain key
    /// (`merchant_id`, `user_id`, ...). When it is masked the grain key is
    /// rendered with its policy and left out of the summary. Masked
    /// numerator and denominator are dropped; a masked currency is
    /// rendered with its policy and not used to format the value.
    pub fn compose_for(
        &self,
        decision: &Decision,
        grain_field: Option<&str>,
        query_result: &[GoldRow],
        metric_name: &str,
        source_table: &str,
    ) -> Result<AgentResponse> {
        let incomplete = |date: Option<NaiveDate>, detail: &str| ContractError::IncompleteEvidence {
            metric: metric_name.to_string(),
            table: source_table.to_string(),
            date,
            detail: detail.to_string(),
        };

        let (row, value) = query_result
            .iter()
            .filter(|row| row.table == source_table)
            .filter_map(|row| metric_value(row, metric_name).map(|v| (row, v)))
            .max_by(|(a, _), (b, _)| (a.date, &b.grain_key).cmp(&(b.date, &a.grain_key)))
            .ok_or_else(|| incomplete(None, "no row carries this metric"))?;

        if row.is_no_data() {
            return Err(incomplete(Some(row.date), "the metric had no data for its bucket"));
        }

        let grain_policy = grain_field.and_then(|f| decision.mask_policy(f));
        let grain_key = match grain_policy {
            Some(policy) => masked_text(policy, &row.grain_key),
            None => Some(row.grain_key.clone()),
        };
        let number = |field: &str| match decision.mask_policy(field) {
            Some(_) => None,
            None => row.get_f64(field),
        };
        let currency_policy = decision.mask_policy("currency");
        let currency = row.get("currency").and_then(|v| v.as_str()).and_then(|c| match currency_policy {
            Some(policy) => masked_text(policy, c),
            None => Some(c.to_string()),
        });

        let evidence = Evidence {
            metric: metric_name.to_string(),
            value,
            table: row.table.clone(),
            date: row.date,
            grain_key,
            numerator: number("numerator"),
            denominator: number("denominator"),
            currency,
        };
        let suggested_action = self
            .rules
            .iter()
            .find(|rule| rule.matches(metric_name, value))
            .map(|rule| rule.action.clone());

        let shown = SummaryView {
            grain_key: grain_policy.is_none().then_some(row.grain_key.as_str()),
            currency: currency_policy.is_none().then_some(evidence.currency.as_deref()).flatten(),
        };
        Ok(AgentResponse {
            summary: summarize(&evidence, &shown, suggested_action.is_some()),
            evidence,
            suggested_action,
            data_source: source_table.to_string(),
        })
    }
}

/// Clear values the summary may mention
struct SummaryView<'a> {
    grain_key: Option<&'a str>,
    currency: Option<&'a str>,
}

fn masked_text(policy: MaskPolicy, clear: &str) -> Option<String> {
    mask_value(policy, &Json::String(clear.to_string()))
        .as_str()
        .map(String::from)
}

fn metric_value(row: &GoldRow, metric_name: &str) -> Option<f64> {
    if row.metric == metric_name {
        if let Some(value) = row.get_f64("value") {
            return Some(value);
        }
    }
    row.get_f64(metric_name)
}

fn format_value(evidence: &Evidence, currency: Option<&str>) -> String {
    match (currency, evidence.denominator) {
        (Some(currency), _) => format!("{:.2} {}", evidence.value, currency),
        (None, Some(_)) => format!("{:.1}%", evidence.value * 100.0),
        (None, None) => format!("{}", (evidence.value * 100.0).round() / 100.0),
    }
}

fn summarize(evidence: &Evidence, shown: &SummaryView<'_>, has_action: bool) -> String {
    let mut summary = format!(
        "{} was {} on {}",
        evidence.metric,
        format_value(evidence, shown.currency),
        evidence.date
    );
    if let Some(key) = shown.grain_key.filter(|key| *key != evidence.metric) {
        summary.push_str(&format!(" for {}", key));
    }
    if let (Some(num), Some(den)) = (evidence.numerator, evidence.denominator) {
        summary.push_str(&format!(" ({} of {})", num, den));
    }
    summary.push('.');
    if has_action {
        summary.push_str(" A threshold rule was breached.");
    }
    truncate(summary, SUMMARY_MAX_CHARS)
}

/// Cut to at most `max` characters, ending with "..." when cut
pub fn truncate(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
