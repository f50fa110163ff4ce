//! Board module for corkboard.
//!
//! This module provides the HTTP side of board channels:
//! - Channel creation, lookup, and paged listing per conversation
//! - Content add (chunked), paged listing, and deletion
//! - Image content backed by encrypted file storage

mod content;
mod files;
mod service;
mod types;

pub use content::ContentStore;
pub use files::{EncryptedFiles, ImageFile};
pub use service::BoardService;
pub use types::{
    AddResult, Channel, ChannelQuery, ContentDraft, ContentItem, Conversation, EncryptedFileRef,
    PingResponse, FILE_CONTENT_TYPE, STRING_CONTENT_TYPE,
};
