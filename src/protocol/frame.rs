//! Wire frames exchanged over the chat socket
//!
//! Every inbound frame is validated here and converted into one of the closed
//! [`ServerFrame`] variants. Anything that does not match is rejected with a
//! [`ProtocolError`] and never reaches the state machine.

use super::types::{null_as_default, Flight, RiskWarning, TripPlan};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tags understood by the decoder
pub const KNOWN_TAGS: [&str; 6] = [
    "chunk",
    "flight_results",
    "risk_warnings",
    "trip_plan",
    "done",
    "error",
];

/// Frame sent by the client for each user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundFrame {
    pub message: String,
    pub trip_plan_id: Option<String>,
}

impl OutboundFrame {
    pub fn new(message: impl Into<String>, trip_plan_id: Option<String>) -> Self {
        Self {
            message: message.into(),
            trip_plan_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames pushed by the planner
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Incremental assistant text
    Chunk { content: String },

    /// Ranked flight options
    FlightResults {
        #[serde(default, deserialize_with = "null_as_default")]
        data: Vec<Flight>,
    },

    RiskWarnings {
        #[serde(default, deserialize_with = "null_as_default")]
        data: Vec<RiskWarning>,
    },

    /// Hotels, itinerary and food for the planned trip
    TripPlan { data: TripPlan },

    /// Terminates the current cycle successfully
    Done {
        #[serde(default)]
        full_response: Option<String>,
        #[serde(default, deserialize_with = "plan_id")]
        trip_plan_id: Option<String>,
        #[serde(default)]
        response_type: Option<String>,
    },

    /// Terminates the current cycle with a server-side failure
    Error {
        #[serde(default, alias = "message")]
        content: Option<String>,
    },
}

impl ServerFrame {
    pub fn tag(&self) -> &'static str {
        match self {
            ServerFrame::Chunk { .. } => "chunk",
            ServerFrame::FlightResults { .. } => "flight_results",
            ServerFrame::RiskWarnings { .. } => "risk_warnings",
            ServerFrame::TripPlan { .. } => "trip_plan",
            ServerFrame::Done { .. } => "done",
            ServerFrame::Error { .. } => "error",
        }
    }

    /// Whether this frame closes a request cycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerFrame::Done { .. } | ServerFrame::Error { .. })
    }
}

/// Trip plan ids are database integers on the server; the client treats them as opaque strings
fn plan_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "trip_plan_id must be a string or integer, got {other}"
        ))),
    }
}

/// Reasons a frame is dropped at the decoder boundary
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no string `type` tag")]
    MissingTag,
    #[error("unknown frame tag `{0}`")]
    UnknownTag(String),
    #[error("malformed `{tag}` frame: {source}")]
    Malformed {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one text frame into a [`ServerFrame`]
pub fn decode_frame(text: &str) -> Result<ServerFrame, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingTag)?
        .to_string();

    if !KNOWN_TAGS.contains(&tag.as_str()) {
        return Err(ProtocolError::UnknownTag(tag));
    }

    serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { tag, source })
}
