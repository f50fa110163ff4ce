//! corkboard - client library for collaborative board channels.
//!
//! Channels hold ordered content items that are added in chunks and read
//! back through cursor pages. Participants exchange live board activity
//! over a realtime socket bound to each channel's route.

pub mod binding;
pub mod board;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod pagination;
pub mod realtime;

pub use binding::{realtime_binding, to_binding};
pub use board::{
    AddResult, BoardService, Channel, ChannelQuery, ContentDraft, ContentItem, ContentStore,
    Conversation, EncryptedFileRef, EncryptedFiles, ImageFile, PingResponse, FILE_CONTENT_TYPE,
};
pub use client::BoardClient;
pub use config::Config;
pub use error::{BoardError, Result};
pub use http::ServiceClient;
pub use pagination::{Page, PageLinks};
pub use realtime::{
    BoardPayload, ConnectionState, ContentType, Envelope, PublishData, RealtimeChannel,
    RealtimeEvent,
};
