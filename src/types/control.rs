use serde::{Deserialize, Serialize};

/// Action carried by an outbound control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Subscribe,
    Unsubscribe,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Subscribe => "subscribe",
            ControlAction::Unsubscribe => "unsubscribe",
        }
    }
}

/// Outbound control frame: `{"action": "...", "symbol": "..."}`
///
/// Symbols are uppercased on construction, the server only knows
/// uppercase tickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub action: ControlAction,
    pub symbol: String,
}

impl ControlMessage {
    pub fn subscribe(symbol: impl AsRef<str>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            symbol: symbol.as_ref().to_uppercase(),
        }
    }

    pub fn unsubscribe(symbol: impl AsRef<str>) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            symbol: symbol.as_ref().to_uppercase(),
        }
    }
}
