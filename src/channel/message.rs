//! Wire Message Protocol
//!
//! JSON shapes exchanged with the remote session:
//!
//! ```text
//! outbound: { "id": "name", "value": "Ada", "rateLimited": true }
//! inbound:  { "id": "name", "value": "Ada" }
//! ```
//!
//! An inbound frame may also carry a JSON array of inbound objects, which
//! is applied in order.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::core::{BindError, InputId, Value};
use crate::limiter::Dispatch;

/// A value sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: InputId,
    pub value: Value,
    /// Whether the change that produced this value went through the limiter
    pub rate_limited: bool,
}

impl OutboundMessage {
    pub fn new(id: impl Into<InputId>, value: Value, rate_limited: bool) -> Self {
        Self {
            id: id.into(),
            value,
            rate_limited,
        }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Dispatch> for OutboundMessage {
    fn from(d: Dispatch) -> Self {
        Self {
            id: d.id,
            value: d.value,
            rate_limited: d.rate_limited,
        }
    }
}

/// A value pushed by the remote session.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: InputId,
    pub value: Value,
}

impl InboundMessage {
    pub fn new(id: impl Into<InputId>, value: Value) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    /// Parse a single `{id, value}` object.
    pub fn from_json(text: &str) -> Result<Self, BindError> {
        let json: Value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        Self::from_value(json)
    }

    /// Validate an already-parsed JSON value.
    ///
    /// `value` may be any JSON, including `null`, but must be present.
    pub fn from_value(json: Value) -> Result<Self, BindError> {
        let Value::Object(mut map) = json else {
            return Err(malformed("expected an object"));
        };
        let id = take_id(&mut map)?;
        let value = map
            .remove("value")
            .ok_or_else(|| malformed(format!("missing `value` for `{id}`")))?;
        Ok(Self {
            id: InputId::from(id),
            value,
        })
    }
}

fn take_id(map: &mut Map<String, Value>) -> Result<String, BindError> {
    match map.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        Some(Value::String(_)) => Err(malformed("`id` is empty")),
        Some(other) => Err(malformed(format!("`id` must be a string, got {other}"))),
        None => Err(malformed("missing `id`")),
    }
}

fn malformed(reason: impl Into<String>) -> BindError {
    BindError::MalformedMessage {
        reason: reason.into(),
    }
}

/// Parse an inbound frame: one object, or an array of objects.
///
/// Each element is validated on its own so one bad entry does not drop
/// the rest of the batch. Invalid JSON yields a single error.
pub fn parse_batch(text: &str) -> Vec<Result<InboundMessage, BindError>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items.into_iter().map(InboundMessage::from_value).collect(),
        Ok(other) => vec![InboundMessage::from_value(other)],
        Err(e) => vec![Err(malformed(e.to_string()))],
    }
}
