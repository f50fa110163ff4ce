//! Realtime activity payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::EncryptedFileRef;
use crate::{BoardError, Result};

/// Content type carried alongside a realtime payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    /// Text payload: `{"msg": ...}`.
    String,
    /// File payload: `{"scr": ..., "displayName": ...}`.
    File,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::String => "STRING",
            ContentType::File => "FILE",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed board activity payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardPayload {
    String {
        msg: String,
    },
    File {
        scr: EncryptedFileRef,
        display_name: String,
    },
}

#[derive(Serialize, Deserialize)]
struct StringBody {
    msg: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileBody {
    scr: EncryptedFileRef,
    display_name: String,
}

impl BoardPayload {
    pub fn string(msg: impl Into<String>) -> Self {
        BoardPayload::String { msg: msg.into() }
    }

    pub fn file(scr: EncryptedFileRef, display_name: impl Into<String>) -> Self {
        BoardPayload::File {
            scr,
            display_name: display_name.into(),
        }
    }

    /// Content type implied by the variant.
    pub fn content_type(&self) -> ContentType {
        match self {
            BoardPayload::String { .. } => ContentType::String,
            BoardPayload::File { .. } => ContentType::File,
        }
    }

    /// JSON form sent on the wire.
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            BoardPayload::String { msg } => serde_json::to_value(StringBody { msg: msg.clone() })?,
            BoardPayload::File { scr, display_name } => serde_json::to_value(FileBody {
                scr: scr.clone(),
                display_name: display_name.clone(),
            })?,
        };
        Ok(value)
    }

    /// Decode a received payload according to its declared content type.
    pub fn decode(content_type: ContentType, value: &Value) -> Result<Self> {
        let shape_error =
            |e: serde_json::Error| BoardError::Validation(format!("{content_type} payload: {e}"));
        match content_type {
            ContentType::String => {
                let body: StringBody =
                    serde_json::from_value(value.clone()).map_err(shape_error)?;
                Ok(BoardPayload::String { msg: body.msg })
            }
            ContentType::File => {
                let body: FileBody = serde_json::from_value(value.clone()).map_err(shape_error)?;
                Ok(BoardPayload::File {
                    scr: body.scr,
                    display_name: body.display_name,
                })
            }
        }
    }

    /// Classify an untyped payload by shape.
    ///
    /// `msg` means STRING, `scr` with `displayName` means FILE; anything else
    /// is rejected.
    pub fn infer(value: &Value) -> Result<Self> {
        if value.get("msg").is_some() {
            return Self::decode(ContentType::String, value);
        }
        if value.get("scr").is_some() && value.get("displayName").is_some() {
            return Self::decode(ContentType::File, value);
        }
        Err(BoardError::Validation(
            "payload has neither msg nor scr with displayName".to_string(),
        ))
    }
}
