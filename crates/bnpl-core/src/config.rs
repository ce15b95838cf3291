//! Platform configuration
//!
//! One file (TOML, YAML or JSON, chosen by extension) carries the
//! consumption contracts, consumer roles, action rules, retry policy, audit
//! log location and server settings. A handful of `BNPL_*` environment
//! variables override deployment-specific values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::contract::{ConsumerProfile, ConsumptionContract, ContractSet};
use crate::error::{CoreError, Result};

/// Environment variable overriding the audit log path
pub const ENV_AUDIT_LOG: &str = "BNPL_AUDIT_LOG";
/// Environment variable overriding the HTTP bind address
pub const ENV_BIND_ADDR: &str = "BNPL_BIND_ADDR";
/// Environment variable overriding the log format (`text` or `json`)
pub const ENV_LOG_FORMAT: &str = "BNPL_LOG_FORMAT";
/// Environment variable overriding the default log level
pub const ENV_LOG_LEVEL: &str = "BNPL_LOG_LEVEL";

/// Complete platform configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub contracts: Vec<ConsumptionContract>,
    #[serde(default)]
    pub consumers: Vec<ConsumerProfile>,
    /// Threshold rules for suggested actions; no built-in defaults
    #[serde(default)]
    pub actions: Vec<ActionRule>,
}

impl PlatformConfig {
    /// Load from a file, auto-detecting the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::FileError(format!("{}: {}", path.display(), e)))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config: PlatformConfig = match extension.as_str() {
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => {
                return Err(CoreError::invalid_config(format!(
                    "Unsupported file format: {}. Supported formats: json, yaml, yml, toml",
                    extension
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `BNPL_*` overrides using the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_AUDIT_LOG) {
            self.audit.path = PathBuf::from(path);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.server.bind_addr = addr;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format.parse()?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Semantic checks that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.contract_set().check()?;
        self.retry.validate()?;
        for rule in &self.actions {
            if !rule.threshold.is_finite() {
                return Err(CoreError::invalid_config(format!(
                    "action rule for '{}' has a non-finite threshold",
                    rule.metric
                )));
            }
            if rule.action.trim().is_empty() {
                return Err(CoreError::invalid_config(format!(
                    "action rule for '{}' has empty action text",
                    rule.metric
                )));
            }
        }
        Ok(())
    }

    /// Contracts and consumer roles as one snapshot (version 0)
    pub fn contract_set(&self) -> ContractSet {
        ContractSet {
            version: 0,
            contracts: self.contracts.clone(),
            consumers: self.consumers.clone(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(CoreError::invalid_value(format!("Unknown log format: {}", s))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Query log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("bnpl-query-log.jsonl")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
        }
    }
}

/// Bounded retry policy for metrics blocked on upstream data
///
/// Within one tick a metric is retried `max_retries` times with exponential
/// backoff. If it is still blocked it is deferred to the next tick, at most
/// `max_deferred_ticks` times, then escalated to the alert sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_deferred_ticks")]
    pub max_deferred_ticks: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_deferred_ticks() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_deferred_ticks: default_max_deferred_ticks(),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting, for tests and one-shot CLI runs
    pub fn immediate(max_retries: u32, max_deferred_ticks: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            max_deferred_ticks,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(CoreError::invalid_config(
                "retry.backoff_multiplier must be a finite number >= 1.0",
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(CoreError::invalid_config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// Comparison used by an action rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
}

impl Comparator {
    /// Check if `value` breaches `threshold`
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Gte => value >= threshold,
            Comparator::Lt => value < threshold,
            Comparator::Lte => value <= threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        };
        f.write_str(s)
    }
}

/// Maps a metric threshold breach to suggested action text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub action: String,
}

impl ActionRule {
    /// Check if the rule fires for a metric value
    pub fn matches(&self, metric: &str, value: f64) -> bool {
        self.metric == metric && self.comparator.holds(value, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE_TOML: &str = r#"
[server]
bind_addr = "0.0.0.0:9000"

[retry]
max_retries = 2

[[contracts]]
consumer_class = "agent"
allowed_tables = ["kpi_daily", "merchant_features_daily"]
required_filters = ["time_range"]

[contracts.field_masking_rules.merchant_features_daily.device_fingerprint_days_30d]
policy = "hash"
authorized_roles = ["risk_analyst"]

[[consumers]]
consumer_id = "risk-bot"
roles = ["risk_analyst"]

[[actions]]
metric = "late_rate"
comparator = ">"
threshold = 0.1
action = "review collections workflow"
"#;

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE_TOML.as_bytes()).unwrap();

        let config = PlatformConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.initial_backoff_ms, 100);
        assert_eq!(config.contracts.len(), 1);
        assert_eq!(config.actions[0].comparator, Comparator::Gt);
        assert!(config.actions[0].matches("late_rate", 0.2));
        assert!(!config.actions[0].matches("late_rate", 0.05));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = PlatformConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PlatformConfig::default();
        let env: HashMap<&str, &str> = [
            (ENV_AUDIT_LOG, "/var/log/bnpl/audit.jsonl"),
            (ENV_BIND_ADDR, "0.0.0.0:1234"),
            (ENV_LOG_FORMAT, "json"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.audit.path, PathBuf::from("/var/log/bnpl/audit.jsonl"));
        assert_eq!(config.server.bind_addr, "0.0.0.0:1234");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_invalid_retry_policy() {
        let policy = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
