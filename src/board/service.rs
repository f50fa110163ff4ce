//! Channel operations against the board service.

use tracing::{debug, info};

use crate::config::ChannelsConfig;
use crate::http::ServiceClient;
use crate::pagination::Page;
use crate::{BoardError, Result};

use super::types::{Channel, ChannelQuery, PingResponse};

/// Check that an id is usable as a path segment.
pub(super) fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(BoardError::Validation(format!("{kind} id must not be empty")));
    }
    Ok(())
}

/// Service path of a channel, with the id percent-encoded.
pub(super) fn channel_path(channel_id: &str) -> String {
    format!("channels/{}", urlencoding::encode(channel_id))
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelRequest<'a> {
    acl_url_link: &'a str,
}

/// Service for channel lifecycle and listing.
#[derive(Debug, Clone)]
pub struct BoardService {
    client: ServiceClient,
    config: ChannelsConfig,
}

impl BoardService {
    /// Create a new BoardService over the given client.
    pub fn new(client: ServiceClient, config: ChannelsConfig) -> Self {
        Self { client, config }
    }

    /// Probe the service.
    pub async fn ping(&self) -> Result<PingResponse> {
        self.client.get_json("ping").await
    }

    /// Create a channel bound to an ACL link (usually a conversation id).
    pub async fn create_channel(&self, acl_url: &str) -> Result<Channel> {
        if acl_url.trim().is_empty() {
            return Err(BoardError::Validation(
                "ACL URL must not be empty".to_string(),
            ));
        }

        let channel: Channel = self
            .client
            .post_json(
                "channels",
                &CreateChannelRequest {
                    acl_url_link: acl_url,
                },
            )
            .await?;
        info!("Created channel {}", channel.channel_id);
        Ok(channel)
    }

    /// Fetch a single channel.
    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel> {
        validate_id("channel", channel_id)?;
        self.client
            .get_json(&channel_path(channel_id))
            .await
            .map_err(|e| match e {
                BoardError::NotFound(_) => BoardError::NotFound(format!("channel {channel_id}")),
                other => other,
            })
    }

    /// First page of the channels of a conversation.
    pub async fn get_channels(&self, query: &ChannelQuery) -> Result<Page<Channel>> {
        validate_id("conversation", &query.conversation_id)?;
        let limit = query.limit.unwrap_or(self.config.page_limit);
        if limit == 0 {
            return Err(BoardError::Validation(
                "channels limit must be at least 1".to_string(),
            ));
        }

        debug!(
            "Listing channels of {} (limit {})",
            query.conversation_id, limit
        );
        self.client
            .fetch_page(
                "channels",
                &[
                    ("aclUrlLink", query.conversation_id.clone()),
                    ("channelsLimit", limit.to_string()),
                ],
            )
            .await
    }
}
