//! Wire message types for the realtime protocol.
//!
//! Every frame is a UTF-8 JSON object with a required `type` field; all
//! other fields are message-type-specific. Inbound frames decode into the
//! closed [`ServerEvent`] union, with unknown tags falling through to
//! [`ServerEvent::Unrecognized`] rather than being dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{RealtimeError, RtResult};

// ============================================================================
// OUTBOUND (Client → Server)
// ============================================================================

/// Reserved type tag for heartbeat pings.
pub const TYPE_PING: &str = "ping";
/// Reserved type tag for heartbeat pong replies.
pub const TYPE_PONG: &str = "pong";
/// Reserved type tag for the best-effort shutdown notice.
pub const TYPE_CLIENT_DISCONNECT: &str = "client_disconnect";

/// An outbound message envelope.
///
/// `timestamp` and `client_message_id` are stamped at send time if the
/// caller did not supply them; the id gives queued messages a stable
/// identity across a reconnect drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<Uuid>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl OutboundMessage {
    /// Create a message with the given type tag and an empty payload.
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            timestamp: None,
            client_message_id: None,
            payload: Map::new(),
        }
    }

    /// Add a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Heartbeat ping.
    pub fn ping() -> Self {
        Self::new(TYPE_PING)
    }

    /// Best-effort notice sent on deliberate shutdown.
    pub fn client_disconnect() -> Self {
        Self::new(TYPE_CLIENT_DISCONNECT)
    }

    /// Stamp send-time metadata if absent.
    pub(crate) fn stamp(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        if self.client_message_id.is_none() {
            self.client_message_id = Some(Uuid::new_v4());
        }
    }
}

// ============================================================================
// INBOUND (Server → Client)
// ============================================================================

/// Raw frame wrapper for initial parsing
#[derive(Debug, Clone, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    type_: String,
    #[serde(flatten)]
    data: Value,
}

/// Known inbound message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Pong,
    UserJoined,
    UserLeft,
    ContentLocked,
    ContentUnlocked,
    ContentUpdated,
    GenerationProgress,
    GenerationCompleted,
    GenerationFailed,
    Notification,
    Unknown,
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            TYPE_PONG => Self::Pong,
            "user_joined" => Self::UserJoined,
            "user_left" => Self::UserLeft,
            "content_locked" => Self::ContentLocked,
            "content_unlocked" => Self::ContentUnlocked,
            "content_updated" => Self::ContentUpdated,
            "generation_progress" => Self::GenerationProgress,
            "generation_completed" => Self::GenerationCompleted,
            "generation_failed" => Self::GenerationFailed,
            "notification" => Self::Notification,
            _ => Self::Unknown,
        }
    }
}

/// Project presence event payload (`user_joined` / `user_left`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresenceData {
    pub project_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Content lock event payload (`content_locked` / `content_unlocked`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentLockData {
    pub content_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub locked_by: Option<String>,
}

/// Content revision event payload (`content_updated`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentUpdateData {
    pub content_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub revision: Option<u64>,
}

/// Generation task progress payload (`generation_progress`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskProgressData {
    pub task_id: String,
    /// Completion fraction in `[0.0, 1.0]`
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub stage: Option<String>,
}

/// Generation task completion payload (`generation_completed`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskCompletedData {
    pub task_id: String,
    #[serde(default)]
    pub content_id: Option<String>,
}

/// Generation task failure payload (`generation_failed`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskFailedData {
    pub task_id: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Broadcast notification payload (`notification`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

/// A decoded inbound message.
///
/// Unknown tags land in `Unrecognized` so future server message types flow
/// through type-level and wildcard subscriptions without a client upgrade.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Heartbeat reply; handled internally, never dispatched to subscribers
    Pong,
    UserJoined(PresenceData),
    UserLeft(PresenceData),
    ContentLocked(ContentLockData),
    ContentUnlocked(ContentLockData),
    ContentUpdated(ContentUpdateData),
    GenerationProgress(TaskProgressData),
    GenerationCompleted(TaskCompletedData),
    GenerationFailed(TaskFailedData),
    Notification(NotificationData),
    /// A frame whose type tag this client does not know
    Unrecognized { message_type: String, data: Value },
}

impl ServerEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> RtResult<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let event = match MessageType::from(raw.type_.as_str()) {
            MessageType::Pong => Self::Pong,
            MessageType::UserJoined => Self::UserJoined(parse(raw.data)?),
            MessageType::UserLeft => Self::UserLeft(parse(raw.data)?),
            MessageType::ContentLocked => Self::ContentLocked(parse(raw.data)?),
            MessageType::ContentUnlocked => Self::ContentUnlocked(parse(raw.data)?),
            MessageType::ContentUpdated => Self::ContentUpdated(parse(raw.data)?),
            MessageType::GenerationProgress => Self::GenerationProgress(parse(raw.data)?),
            MessageType::GenerationCompleted => Self::GenerationCompleted(parse(raw.data)?),
            MessageType::GenerationFailed => Self::GenerationFailed(parse(raw.data)?),
            MessageType::Notification => Self::Notification(parse(raw.data)?),
            MessageType::Unknown => Self::Unrecognized {
                message_type: raw.type_,
                data: raw.data,
            },
        };
        Ok(event)
    }

    /// The wire type tag this event was decoded from.
    pub fn message_type(&self) -> &str {
        match self {
            Self::Pong => TYPE_PONG,
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::ContentLocked(_) => "content_locked",
            Self::ContentUnlocked(_) => "content_unlocked",
            Self::ContentUpdated(_) => "content_updated",
            Self::GenerationProgress(_) => "generation_progress",
            Self::GenerationCompleted(_) => "generation_completed",
            Self::GenerationFailed(_) => "generation_failed",
            Self::Notification(_) => "notification",
            Self::Unrecognized { message_type, .. } => message_type,
        }
    }

    /// Correlation ids carried by this event (task, project, content ids),
    /// consulted by scoped dispatch. Message types without a correlation
    /// field return an empty list.
    pub fn correlation_ids(&self) -> Vec<&str> {
        match self {
            Self::UserJoined(d) | Self::UserLeft(d) => vec![d.project_id.as_str()],
            Self::ContentLocked(d) | Self::ContentUnlocked(d) => {
                let mut ids = vec![d.content_id.as_str()];
                if let Some(project_id) = &d.project_id {
                    ids.push(project_id.as_str());
                }
                ids
            }
            Self::ContentUpdated(d) => {
                let mut ids = vec![d.content_id.as_str()];
                if let Some(project_id) = &d.project_id {
                    ids.push(project_id.as_str());
                }
                ids
            }
            Self::GenerationProgress(d) => vec![d.task_id.as_str()],
            Self::GenerationCompleted(d) => vec![d.task_id.as_str()],
            Self::GenerationFailed(d) => vec![d.task_id.as_str()],
            _ => Vec::new(),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(data: Value) -> RtResult<T> {
    serde_json::from_value(data).map_err(RealtimeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_stamp_fills_missing_fields() {
        let mut msg = OutboundMessage::new("join_project").with_field("project_id", "p1");
        assert!(msg.timestamp.is_none());
        assert!(msg.client_message_id.is_none());
        msg.stamp();
        assert!(msg.timestamp.is_some());
        assert!(msg.client_message_id.is_some());
    }

    #[test]
    fn test_outbound_stamp_preserves_existing_id() {
        let id = Uuid::new_v4();
        let mut msg = OutboundMessage::new("x");
        msg.client_message_id = Some(id);
        msg.stamp();
        assert_eq!(msg.client_message_id, Some(id));
    }

    #[test]
    fn test_outbound_serializes_flattened() {
        let mut msg = OutboundMessage::new("lock_content").with_field("content_id", "c9");
        msg.stamp();
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "lock_content");
        assert_eq!(json["content_id"], "c9");
        assert!(json["client_message_id"].is_string());
    }

    #[test]
    fn test_decode_known_type() {
        let event = ServerEvent::decode(
            r#"{"type":"generation_progress","task_id":"t1","progress":0.4,"stage":"draft"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::GenerationProgress(d) => {
                assert_eq!(d.task_id, "t1");
                assert_eq!(d.progress, 0.4);
                assert_eq!(d.stage.as_deref(), Some("draft"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_type_falls_through() {
        let event =
            ServerEvent::decode(r#"{"type":"campaign_archived","campaign_id":"c1"}"#).unwrap();
        match &event {
            ServerEvent::Unrecognized { message_type, data } => {
                assert_eq!(message_type, "campaign_archived");
                assert_eq!(data["campaign_id"], "c1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(event.message_type(), "campaign_archived");
    }

    #[test]
    fn test_decode_malformed_json_is_err() {
        assert!(ServerEvent::decode("{not json").is_err());
        assert!(ServerEvent::decode(r#"{"no_type_field":1}"#).is_err());
    }

    #[test]
    fn test_correlation_ids() {
        let locked = ServerEvent::decode(
            r#"{"type":"content_locked","content_id":"c1","project_id":"p1","locked_by":"u1"}"#,
        )
        .unwrap();
        assert_eq!(locked.correlation_ids(), vec!["c1", "p1"]);

        let joined =
            ServerEvent::decode(r#"{"type":"user_joined","project_id":"p1","user_id":"u2"}"#)
                .unwrap();
        assert_eq!(joined.correlation_ids(), vec!["p1"]);

        let note = ServerEvent::decode(r#"{"type":"notification","title":"hi"}"#).unwrap();
        assert!(note.correlation_ids().is_empty());
    }
}
