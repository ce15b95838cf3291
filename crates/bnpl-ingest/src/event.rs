//! Bronze events
//!
//! One line per business event, as appended by the ingestion pipeline:
//!
//! ```json
//! {"event_id": "evt_1", "event_type": "ORDER_OK", "ts": "2024-01-01T10:00:00+00:00",
//!  "user_id": "user_1", "merchant_id": "merchant_1", "order_id": "order_1",
//!  "device_id": null, "city": null,
//!  "payload_json": {"amount": 600, "currency": "MAD", "installments_count": 3}}
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known Bronze event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Signup,
    KycOk,
    OrderOk,
    OrderRej,
    InstDue,
    InstPaid,
    InstLate,
    Dispute,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Signup => "SIGNUP",
            EventType::KycOk => "KYC_OK",
            EventType::OrderOk => "ORDER_OK",
            EventType::OrderRej => "ORDER_REJ",
            EventType::InstDue => "INST_DUE",
            EventType::InstPaid => "INST_PAID",
            EventType::InstLate => "INST_LATE",
            EventType::Dispute => "DISPUTE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIGNUP" => Ok(EventType::Signup),
            "KYC_OK" => Ok(EventType::KycOk),
            "ORDER_OK" => Ok(EventType::OrderOk),
            "ORDER_REJ" => Ok(EventType::OrderRej),
            "INST_DUE" => Ok(EventType::InstDue),
            "INST_PAID" => Ok(EventType::InstPaid),
            "INST_LATE" => Ok(EventType::InstLate),
            "DISPUTE" => Ok(EventType::Dispute),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// One raw Bronze event
///
/// `event_type` stays a string so unknown types survive parsing and can be
/// counted rather than failing the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BronzeEvent {
    pub event_id: String,
    pub event_type: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub payload_json: serde_json::Value,
}

impl BronzeEvent {
    /// Parsed event type, if known
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// UTC calendar date of the event
    pub fn date(&self) -> NaiveDate {
        self.ts.date_naive()
    }

    /// Payload field lookup
    pub fn payload(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload_json.get(key).filter(|v| !v.is_null())
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_python_isoformat() {
        let event: BronzeEvent = serde_json::from_value(json!({
            "event_id": "evt_001",
            "event_type": "SIGNUP",
            "ts": "2024-01-01T09:15:00.123456+00:00",
            "user_id": "user_123",
            "merchant_id": null,
            "order_id": null,
            "device_id": "device_x",
            "city": "Casablanca",
            "payload_json": {"signup_channel": "mobile"}
        }))
        .unwrap();

        assert_eq!(event.kind(), Some(EventType::Signup));
        assert_eq!(event.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(event.payload_str("signup_channel"), Some("mobile"));
        assert!(event.merchant_id.is_none());
    }

    #[test]
    fn test_unknown_type_kept_as_string() {
        let event: BronzeEvent = serde_json::from_value(json!({
            "event_id": "e", "event_type": "REFERRAL", "ts": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.kind(), None);
        assert!(event.payload("anything").is_none());
    }

    #[test]
    fn test_event_type_roundtrip_names() {
        for t in [EventType::KycOk, EventType::InstLate, EventType::OrderRej] {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }
}
