//! SendGrid event payloads and the allow-list projection applied before queueing.
//!
//! SendGrid posts an array of loosely-shaped JSON objects. Nothing beyond the `event` tag and the
//! `sg_event_id` identifier is guaranteed, so events are kept as raw JSON maps and only the
//! fields in [`RECORD_FIELDS`] survive into the queued record.

use serde::Serialize;
use serde_json::{Map, Value};

/// Fields copied from an inbound event into the queued record.
pub const RECORD_FIELDS: [&str; 10] = [
    "event",
    "timestamp",
    "reason",
    "status",
    "ip",
    "url",
    "response",
    "sendId",
    "sg_event_id",
    "attempt",
];

const EVENT_ID_FIELD: &str = "sg_event_id";
const EVENT_TYPE_FIELD: &str = "event";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Event types reported by the SendGrid event webhook.
///
/// `Queued` and `Transmitted` are emitted by our own mail service rather than SendGrid, but they
/// travel through the same queue.
pub enum EventType {
    Queued,
    Transmitted,
    Processed,
    Dropped,
    Delivered,
    Deferred,
    Bounce,
    Open,
    Click,
    SpamReport,
    Unsubscribe,
    GroupUnsubscribe,
    GroupResubscribe,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Internal,
    Delivery,
    Engagement,
    Unknown,
}

impl EventType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "queued" => Self::Queued,
            "transmitted" => Self::Transmitted,
            "processed" => Self::Processed,
            "dropped" => Self::Dropped,
            "delivered" => Self::Delivered,
            "deferred" => Self::Deferred,
            "bounce" => Self::Bounce,
            "open" => Self::Open,
            "click" => Self::Click,
            "spamreport" => Self::SpamReport,
            "unsubscribe" => Self::Unsubscribe,
            "group_unsubscribe" => Self::GroupUnsubscribe,
            "group_resubscribe" => Self::GroupResubscribe,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Transmitted => "transmitted",
            Self::Processed => "processed",
            Self::Dropped => "dropped",
            Self::Delivered => "delivered",
            Self::Deferred => "deferred",
            Self::Bounce => "bounce",
            Self::Open => "open",
            Self::Click => "click",
            Self::SpamReport => "spamreport",
            Self::Unsubscribe => "unsubscribe",
            Self::GroupUnsubscribe => "group_unsubscribe",
            Self::GroupResubscribe => "group_resubscribe",
            Self::Unknown(tag) => tag,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::Queued | Self::Transmitted => EventCategory::Internal,
            Self::Processed | Self::Dropped | Self::Delivered | Self::Deferred | Self::Bounce => {
                EventCategory::Delivery
            }
            Self::Open
            | Self::Click
            | Self::SpamReport
            | Self::Unsubscribe
            | Self::GroupUnsubscribe
            | Self::GroupResubscribe => EventCategory::Engagement,
            Self::Unknown(_) => EventCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// One raw event as delivered by SendGrid.
pub struct InboundEvent(Map<String, Value>);

impl InboundEvent {
    /// Wraps one element of the webhook array. Elements that are not JSON objects carry no
    /// usable fields and become an empty event.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The `sg_event_id` of this event, or `""` when it is missing or not a string.
    pub fn event_id(&self) -> &str {
        self.0
            .get(EVENT_ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.0
            .get(EVENT_TYPE_FIELD)
            .and_then(Value::as_str)
            .map(EventType::parse)
    }
}

#[cfg(test)]
impl From<NormalizedRecord> for InboundEvent {
    fn from(record: NormalizedRecord) -> Self {
        Self(record.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
/// An inbound event reduced to the truthy subset of [`RECORD_FIELDS`].
pub struct NormalizedRecord(Map<String, Value>);

impl NormalizedRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
impl NormalizedRecord {
    fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Project an inbound event onto the allow-listed fields.
///
/// Falsy values (`null`, `false`, `0`, `""`) are dropped along with unknown keys, so an event
/// reporting `"attempt": 0` produces a record without `attempt`. Values are not type-checked.
pub fn normalize(event: &InboundEvent) -> NormalizedRecord {
    let mut out = Map::new();
    for field in RECORD_FIELDS {
        if let Some(value) = event.get(field) {
            if is_truthy(value) {
                out.insert(field.to_string(), value.clone());
            }
        }
    }
    NormalizedRecord(out)
}

/// JavaScript-style truthiness: empty strings, zero, `false` and `null` are falsy; arrays and
/// objects are always truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
