//! JSON envelope carried in the body of STOMP `SEND`/`MESSAGE` frames.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::common::{ChatMessage, MessageKind, SenderRole};
use crate::error::MalformedEnvelope;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    kind: Option<MessageKind>,
    // The Spring server only knows this one and echoes `kind` away.
    #[serde(default, rename = "type")]
    legacy_kind: Option<MessageKind>,
    sender: String,
    sender_role: SenderRole,
    content: String,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// Serialise a message to envelope JSON. The kind is written under both
/// `kind` and `type`. Absent `id`/`timestamp` are omitted.
pub fn encode(message: &ChatMessage) -> String {
    let mut body = Map::new();
    if let Some(id) = message.id() {
        body.insert("id".into(), Value::from(id));
    }
    body.insert("kind".into(), Value::from(message.kind().as_str()));
    body.insert("type".into(), Value::from(message.kind().as_str()));
    body.insert("sender".into(), Value::from(message.sender()));
    body.insert("senderRole".into(), Value::from(message.sender_role().as_str()));
    body.insert("content".into(), Value::from(message.content()));
    if let Some(timestamp) = message.timestamp() {
        body.insert(
            "timestamp".into(),
            Value::from(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    Value::Object(body).to_string()
}

/// Decode an envelope, stamping it with the local clock when the sender
/// supplied no timestamp.
pub fn decode(payload: &[u8]) -> Result<ChatMessage, MalformedEnvelope> {
    let raw: RawEnvelope =
        serde_json::from_slice(payload).map_err(|err| MalformedEnvelope::new(err.to_string()))?;

    let kind = raw
        .kind
        .or(raw.legacy_kind)
        .ok_or_else(|| MalformedEnvelope::new("missing field `kind`"))?;

    let timestamp = match raw.timestamp {
        None | Some(Value::Null) => Utc::now(),
        Some(value) => parse_timestamp(&value)?,
    };

    Ok(ChatMessage::new(
        raw.id,
        kind,
        raw.sender,
        raw.sender_role,
        raw.content,
        Some(timestamp),
    ))
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, MalformedEnvelope> {
    match value {
        Value::String(text) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(parsed.with_timezone(&Utc));
            }
            // Java `LocalDateTime` has no offset; read it as UTC.
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
                .map_err(|_| MalformedEnvelope::new(format!("unparseable timestamp '{text}'")))
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| MalformedEnvelope::new(format!("timestamp {number} out of range"))),
        other => Err(MalformedEnvelope::new(format!(
            "timestamp must be a string or number, got {other}"
        ))),
    }
}
