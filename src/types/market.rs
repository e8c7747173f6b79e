use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;

/// OHLCV payload of a single tick
///
/// The feed sends plain JSON numbers; prices are read into [`Decimal`]
/// so downstream arithmetic stays exact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TickData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub open: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub high: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub low: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub close: Option<Decimal>,
    /// Accepts integral floats such as `1000.0`
    #[serde(default, deserialize_with = "lenient_volume")]
    pub volume: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVolume {
    Int(u64),
    Float(f64),
}

fn lenient_volume<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawVolume>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawVolume::Int(v)) => Ok(Some(v)),
        Some(RawVolume::Float(v)) if v.is_finite() && v >= 0.0 => Ok(Some(v.round() as u64)),
        Some(RawVolume::Float(v)) => Err(D::Error::custom(format!("invalid volume {}", v))),
    }
}

/// Tick as it appears on the wire, either standalone or inside a batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickPayload {
    pub symbol: String,
    pub data: TickData,
    #[serde(default)]
    pub timestamp: String,
}

/// Market data update delivered to [`EventHandler::on_ticks`](crate::EventHandler::on_ticks)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub symbol: String,
    pub data: TickData,
    /// Server-side timestamp, empty when the server omitted it
    pub timestamp: String,
    /// Local receive time
    pub received_at: DateTime<Utc>,
}

impl Tick {
    pub fn from_payload(payload: TickPayload, received_at: DateTime<Utc>) -> Self {
        Self {
            symbol: payload.symbol,
            data: payload.data,
            timestamp: payload.timestamp,
            received_at,
        }
    }
}

/// Server acknowledgment of a subscribe/unsubscribe request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionAck {
    pub status: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl SubscriptionAck {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Inbound text frame classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Object carrying a `status` key
    Ack(SubscriptionAck),
    /// Object carrying `symbol` and `data`
    Tick(TickPayload),
    /// Object carrying a `ticks` array; elements are decoded one by one
    Batch(Vec<Value>),
    /// Valid JSON of any other shape
    Other(Value),
}

impl InboundFrame {
    /// Parse a text frame.
    ///
    /// Fails only when the text is not JSON or when an ack/tick shaped object
    /// carries fields of the wrong type.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        let (is_ack, is_tick, is_batch) = match value.as_object() {
            Some(obj) => (
                obj.contains_key("status"),
                obj.contains_key("symbol") && obj.contains_key("data"),
                matches!(obj.get("ticks"), Some(Value::Array(_))),
            ),
            None => return Ok(InboundFrame::Other(value)),
        };

        if is_ack {
            return Ok(InboundFrame::Ack(serde_json::from_value(value)?));
        }
        if is_tick {
            return Ok(InboundFrame::Tick(serde_json::from_value(value)?));
        }
        if is_batch {
            if let Value::Object(mut obj) = value {
                if let Some(Value::Array(ticks)) = obj.remove("ticks") {
                    return Ok(InboundFrame::Batch(ticks));
                }
                return Ok(InboundFrame::Other(Value::Object(obj)));
            }
        }

        Ok(InboundFrame::Other(value))
    }
}
