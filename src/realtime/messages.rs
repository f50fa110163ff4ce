//! WebSocket frame types for board activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::payload::{BoardPayload, ContentType};
use crate::Result;

/// Event type of board activity.
pub const BOARD_ACTIVITY: &str = "board.activity";

/// Router event name under which board activity is delivered.
pub const BOARD_ACTIVITY_EVENT: &str = "event:board.activity";

/// Routing envelope of a published activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Channel the activity belongs to.
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_url: Option<String>,
}

impl Envelope {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            room_id: None,
            encryption_key_url: None,
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }
}

/// Activity data carried by publish requests and received events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    pub event_type: String,
    pub content_type: ContentType,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
}

impl ActivityData {
    /// Decode `payload` according to `content_type`.
    pub fn board_payload(&self) -> Result<BoardPayload> {
        BoardPayload::decode(self.content_type, &self.payload)
    }
}

/// Delivery target of a publish request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub alert_type: String,
    pub headers: Map<String, Value>,
    pub route: String,
}

impl Recipient {
    /// Silent delivery to everyone bound to `route`.
    pub fn route(route: impl Into<String>) -> Self {
        Self {
            alert_type: "none".to_string(),
            headers: Map::new(),
            route: route.into(),
        }
    }
}

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Publish activity to the recipients' routes.
    PublishRequest {
        id: String,
        recipients: Vec<Recipient>,
        data: ActivityData,
    },
    /// Acknowledge a received frame.
    Ack {
        #[serde(rename = "messageId")]
        message_id: String,
    },
}

/// Frames received from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ServerFrame {
    /// Turn the frame into an event if it carries activity data.
    pub fn into_event(self) -> Option<RealtimeEvent> {
        let data: ActivityData = serde_json::from_value(self.data?).ok()?;
        Some(RealtimeEvent {
            id: self.id,
            data,
            received_at: Utc::now(),
        })
    }
}

/// A received realtime activity.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    /// Server-assigned frame id, if any.
    pub id: Option<String>,
    pub data: ActivityData,
    pub received_at: DateTime<Utc>,
}

impl RealtimeEvent {
    /// Router name for this event: `event:<eventType>`.
    pub fn event_name(&self) -> String {
        format!("event:{}", self.data.event_type)
    }
}
