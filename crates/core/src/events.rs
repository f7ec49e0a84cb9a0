use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Errors that reject a webhook body as a whole.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to parse webhook payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a single entry of the `events` array is skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Delivery metadata shared by every event kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventMeta {
    pub timestamp: Option<DateTime<Utc>>,
    pub mode: EventMode,
    pub webhook_event_id: Option<String>,
    pub is_redelivery: bool,
    pub source: Option<EventSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    #[default]
    Active,
    Standby,
    #[serde(other)]
    Unknown,
}

/// Conversation the event originated from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventSource {
    User {
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    Room {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
}

impl EventSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Group { .. } => "group",
            Self::Room { .. } => "room",
        }
    }
}

/// A user-sent text message, the only event the relay answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub reply_token: String,
    pub message_id: String,
    pub text: String,
    pub meta: EventMeta,
}

/// Typed view over one entry of the webhook `events` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    TextMessage(TextMessageEvent),
    /// Non-text message (image, sticker, location, ...).
    Message {
        reply_token: Option<String>,
        message_type: String,
        meta: EventMeta,
    },
    Follow {
        reply_token: Option<String>,
        meta: EventMeta,
    },
    Unfollow {
        meta: EventMeta,
    },
    Join {
        reply_token: Option<String>,
        meta: EventMeta,
    },
    Leave {
        meta: EventMeta,
    },
    Postback {
        reply_token: Option<String>,
        data: String,
        meta: EventMeta,
    },
    Other {
        kind: String,
        meta: EventMeta,
    },
}

impl WebhookEvent {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &str {
        match self {
            Self::TextMessage(_) => "message.text",
            Self::Message { .. } => "message",
            Self::Follow { .. } => "follow",
            Self::Unfollow { .. } => "unfollow",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Postback { .. } => "postback",
            Self::Other { kind, .. } => kind.as_str(),
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::TextMessage(event) => &event.meta,
            Self::Message { meta, .. }
            | Self::Follow { meta, .. }
            | Self::Unfollow { meta }
            | Self::Join { meta, .. }
            | Self::Leave { meta }
            | Self::Postback { meta, .. }
            | Self::Other { meta, .. } => meta,
        }
    }
}

/// Entry of the `events` array that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEvent {
    pub index: usize,
    pub error: EventDecodeError,
}

/// Decoded webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventBatch {
    pub destination: Option<String>,
    pub events: Vec<WebhookEvent>,
    pub skipped: Vec<SkippedEvent>,
}

/// Parses a webhook body into typed events.
///
/// Only a body that is not a JSON object with an `events` array fails as a
/// whole. Individual entries that cannot be decoded are reported in
/// [`EventBatch::skipped`] and leave the order of the remaining events intact.
pub fn parse_events(body: &[u8]) -> Result<EventBatch, PayloadError> {
    let envelope: Envelope = serde_json::from_slice(body)?;

    let mut batch = EventBatch {
        destination: envelope.destination,
        ..EventBatch::default()
    };

    for (index, raw) in envelope.events.into_iter().enumerate() {
        match decode_event(raw) {
            Ok(event) => batch.events.push(event),
            Err(error) => batch.skipped.push(SkippedEvent { index, error }),
        }
    }

    Ok(batch)
}

fn decode_event(raw: Value) -> Result<WebhookEvent, EventDecodeError> {
    let raw: RawEvent =
        serde_json::from_value(raw).map_err(|err| EventDecodeError::Malformed(err.to_string()))?;

    let meta = EventMeta {
        timestamp: raw
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        mode: raw.mode.unwrap_or_default(),
        webhook_event_id: raw.webhook_event_id,
        is_redelivery: raw
            .delivery_context
            .map(|ctx| ctx.is_redelivery)
            .unwrap_or(false),
        source: raw.source,
    };

    match raw.kind.as_str() {
        "message" => {
            let message = raw.message.ok_or(EventDecodeError::MissingField("message"))?;
            if message.kind == "text" {
                Ok(WebhookEvent::TextMessage(TextMessageEvent {
                    reply_token: raw
                        .reply_token
                        .ok_or(EventDecodeError::MissingField("replyToken"))?,
                    message_id: message.id,
                    text: message.text.ok_or(EventDecodeError::MissingField("text"))?,
                    meta,
                }))
            } else {
                Ok(WebhookEvent::Message {
                    reply_token: raw.reply_token,
                    message_type: message.kind,
                    meta,
                })
            }
        }
        "follow" => Ok(WebhookEvent::Follow {
            reply_token: raw.reply_token,
            meta,
        }),
        "unfollow" => Ok(WebhookEvent::Unfollow { meta }),
        "join" => Ok(WebhookEvent::Join {
            reply_token: raw.reply_token,
            meta,
        }),
        "leave" => Ok(WebhookEvent::Leave { meta }),
        "postback" => Ok(WebhookEvent::Postback {
            reply_token: raw.reply_token,
            data: raw
                .postback
                .ok_or(EventDecodeError::MissingField("postback"))?
                .data,
            meta,
        }),
        other => Ok(WebhookEvent::Other {
            kind: other.to_string(),
            meta,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    destination: Option<String>,
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    mode: Option<EventMode>,
    #[serde(default, deserialize_with = "lenient")]
    webhook_event_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    delivery_context: Option<DeliveryContext>,
    #[serde(default, deserialize_with = "lenient")]
    source: Option<EventSource>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    postback: Option<RawPostback>,
}

/// Decodes envelope metadata, turning a value of an unexpected shape into `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryContext {
    #[serde(default)]
    is_redelivery: bool,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostback {
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_event(token: &str, text: &str) -> Value {
        json!({
            "type": "message",
            "mode": "active",
            "timestamp": 1_700_000_000_000_i64,
            "source": { "type": "user", "userId": "U-1" },
            "webhookEventId": format!("evt-{token}"),
            "deliveryContext": { "isRedelivery": false },
            "replyToken": token,
            "message": { "id": format!("msg-{token}"), "type": "text", "text": text }
        })
    }

    fn body(events: Vec<Value>) -> Vec<u8> {
        json!({ "destination": "U-bot", "events": events })
            .to_string()
            .into_bytes()
    }

    fn texts(batch: &EventBatch) -> Vec<&str> {
        batch
            .events
            .iter()
            .filter_map(|event| match event {
                WebhookEvent::TextMessage(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn text_events_keep_array_order() {
        let batch = parse_events(&body(vec![
            text_event("t-1", "one"),
            text_event("t-2", "two"),
            text_event("t-3", "three"),
        ]))
        .expect("parse");

        assert_eq!(batch.destination.as_deref(), Some("U-bot"));
        assert_eq!(texts(&batch), vec!["one", "two", "three"]);
        assert!(batch.skipped.is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped_without_reordering() {
        let batch = parse_events(&body(vec![
            text_event("t-1", "one"),
            json!("not an object"),
            json!({ "type": "message", "replyToken": "t-x", "message": { "id": "m", "type": "text" } }),
            text_event("t-2", "two"),
            json!({ "replyToken": "no-type" }),
            text_event("t-3", "three"),
        ]))
        .expect("parse");

        assert_eq!(texts(&batch), vec!["one", "two", "three"]);
        let skipped: Vec<usize> = batch.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![1, 2, 4]);
        assert_eq!(
            batch.skipped[1].error,
            EventDecodeError::MissingField("text")
        );
    }

    #[test]
    fn text_message_fields_are_decoded() {
        let batch = parse_events(&body(vec![text_event("t-1", "Hello")])).expect("parse");
        match &batch.events[0] {
            WebhookEvent::TextMessage(event) => {
                assert_eq!(event.reply_token, "t-1");
                assert_eq!(event.message_id, "msg-t-1");
                assert_eq!(event.text, "Hello");
                assert_eq!(event.meta.mode, EventMode::Active);
                assert_eq!(event.meta.webhook_event_id.as_deref(), Some("evt-t-1"));
                assert_eq!(
                    event.meta.timestamp.map(|ts| ts.timestamp_millis()),
                    Some(1_700_000_000_000)
                );
                assert_eq!(
                    event.meta.source,
                    Some(EventSource::User {
                        user_id: Some("U-1".to_string())
                    })
                );
            }
            other => panic!("expected text message, got {other:?}"),
        }
    }

    #[test]
    fn other_event_kinds_are_typed() {
        let batch = parse_events(&body(vec![
            json!({ "type": "follow", "replyToken": "t-f", "deliveryContext": { "isRedelivery": true } }),
            json!({ "type": "unfollow", "source": { "type": "group", "groupId": "G-1" } }),
            json!({ "type": "message", "replyToken": "t-s", "message": { "id": "m-2", "type": "sticker" } }),
            json!({ "type": "postback", "replyToken": "t-p", "postback": { "data": "action=buy" } }),
            json!({ "type": "beacon", "replyToken": "t-b", "mode": "standby" }),
        ]))
        .expect("parse");

        let kinds: Vec<&str> = batch.events.iter().map(WebhookEvent::kind).collect();
        assert_eq!(
            kinds,
            vec!["follow", "unfollow", "message", "postback", "beacon"]
        );
        assert!(batch.events[0].meta().is_redelivery);
        assert_eq!(
            batch.events[1].meta().source.as_ref().map(EventSource::kind),
            Some("group")
        );
        assert!(matches!(
            &batch.events[2],
            WebhookEvent::Message { message_type, .. } if message_type == "sticker"
        ));
        assert!(matches!(
            &batch.events[3],
            WebhookEvent::Postback { data, .. } if data == "action=buy"
        ));
        assert_eq!(batch.events[4].meta().mode, EventMode::Standby);
    }

    #[test]
    fn unexpected_metadata_does_not_drop_events() {
        let mut channel_text = text_event("t-1", "hi");
        channel_text["source"] = json!({ "type": "channel", "channelId": "C-1" });
        let mut odd_meta = text_event("t-2", "there");
        odd_meta["timestamp"] = json!("yesterday");
        odd_meta["deliveryContext"] = json!(null);

        let batch = parse_events(&body(vec![
            channel_text,
            json!({ "type": "follow", "mode": "standby", "source": { "type": "user", "userId": "U-1" } }),
            json!({ "type": "join", "mode": "standby" }),
            json!({ "type": "postback", "mode": "standby", "postback": { "data": "a=1" } }),
            odd_meta,
        ]))
        .expect("parse");

        assert!(batch.skipped.is_empty(), "skipped: {:?}", batch.skipped);
        assert_eq!(texts(&batch), vec!["hi", "there"]);
        assert_eq!(batch.events[0].meta().source, None);
        assert!(matches!(
            &batch.events[1],
            WebhookEvent::Follow { reply_token: None, meta } if meta.mode == EventMode::Standby
        ));
        assert!(matches!(
            &batch.events[2],
            WebhookEvent::Join { reply_token: None, .. }
        ));
        assert!(matches!(
            &batch.events[3],
            WebhookEvent::Postback { reply_token: None, data, .. } if data == "a=1"
        ));
        assert_eq!(batch.events[4].meta().timestamp, None);
        assert!(!batch.events[4].meta().is_redelivery);
    }

    #[test]
    fn empty_event_list_is_valid() {
        let batch = parse_events(br#"{"destination":"U-bot","events":[]}"#).expect("parse");
        assert!(batch.events.is_empty());
        assert!(batch.skipped.is_empty());
    }

    #[test]
    fn body_without_events_is_rejected() {
        let err = parse_events(br#"{"destination":"U-bot"}"#).expect_err("missing events");
        assert!(matches!(err, PayloadError::Json(_)));
    }

    #[test]
    fn non_json_body_is_rejected() {
        assert!(parse_events(b"hello").is_err());
        assert!(parse_events(&[0xff, 0xfe, 0x00]).is_err());
    }
}
