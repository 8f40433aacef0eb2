//! Control messages exchanged over the data channel.
//!
//! Each message is a JSON object tagged by `type`:
//!
//! ```json
//! {"type": "ptt-start"}
//! {"type": "ptt-stop"}
//! {"type": "disconnect"}
//! {"type": "location", "location": {"lat": 37.7749, "lng": -122.4194}}
//! ```
//!
//! There is no version field. Receivers ignore types they do not know.

use crate::location::LocationFix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    PttStart,
    PttStop,
    Location { location: LocationFix },
    Disconnect,
}

const KNOWN_TYPES: [&str; 4] = ["ptt-start", "ptt-stop", "location", "disconnect"];

impl ControlMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a payload.
    ///
    /// Returns `Ok(None)` for well-formed objects whose `type` is not one we
    /// understand, and an error for anything else that does not parse.
    pub fn decode(payload: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(payload)?;
        let known = value
            .get("type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| KNOWN_TYPES.contains(&t));
        if !known {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PttStart => "ptt-start",
            Self::PttStop => "ptt-stop",
            Self::Location { .. } => "location",
            Self::Disconnect => "disconnect",
        }
    }
}
