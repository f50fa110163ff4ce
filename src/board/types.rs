//! Board data model.
//!
//! Wire names follow the board service's camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{BoardError, Result};

/// Content type of a text item.
pub const STRING_CONTENT_TYPE: &str = "STRING";

/// Content type of an item backed by an encrypted file.
pub const FILE_CONTENT_TYPE: &str = "FILE";

/// A conversation that owns boards.
///
/// Channels are created against the conversation's id, which doubles as the
/// ACL link on the service side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// Key used for realtime envelopes sent in this conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_encryption_key_url: Option<String>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_encryption_key_url: None,
        }
    }

    pub fn with_encryption_key_url(mut self, key_url: impl Into<String>) -> Self {
        self.default_encryption_key_url = Some(key_url.into());
        self
    }
}

/// A board channel as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub channel_id: String,
    #[serde(default)]
    pub acl_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    /// Key applied to content added without an explicit key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_encryption_key_url: Option<String>,
}

/// Filter for listing the channels of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelQuery {
    pub conversation_id: String,
    /// Page size; the configured default applies when unset.
    pub limit: Option<usize>,
}

impl ChannelQuery {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Reference to an encrypted file held by the file service.
///
/// Only `loc` is interpreted here; key material and other fields travel
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedFileRef {
    pub loc: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EncryptedFileRef {
    pub fn new(loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            extra: Map::new(),
        }
    }
}

/// A stored content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub content_id: String,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Opaque payload, usually serialized JSON.
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub encryption_key_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scr: Option<EncryptedFileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ContentItem {
    /// Decode the payload as JSON.
    pub fn payload_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Content to be added to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDraft {
    pub content_type: String,
    pub payload: String,
    pub scr: Option<EncryptedFileRef>,
    pub display_name: Option<String>,
}

impl ContentDraft {
    pub fn new(content_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            payload: payload.into(),
            scr: None,
            display_name: None,
        }
    }

    /// Build a draft whose payload is `value` serialized as JSON.
    pub fn from_json<T: Serialize>(content_type: impl Into<String>, value: &T) -> Result<Self> {
        let payload = serde_json::to_string(value)
            .map_err(|e| BoardError::Validation(format!("payload is not serializable: {e}")))?;
        Ok(Self::new(content_type, payload))
    }

    /// Attach an uploaded file to the draft.
    pub fn with_file(mut self, scr: EncryptedFileRef, display_name: impl Into<String>) -> Self {
        self.scr = Some(scr);
        self.display_name = Some(display_name.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.content_type.trim().is_empty() {
            return Err(BoardError::Validation(
                "content type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Items created by one add request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddResult {
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

impl AddResult {
    pub fn content_ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.content_id.as_str()).collect()
    }
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub service_name: String,
}
