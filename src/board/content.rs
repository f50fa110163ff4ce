//! Content storage on board channels.
//!
//! Adds are split into chunks of at most `add_chunk_size` drafts, sent in
//! order; listing goes through the cursor pages of [`Page`].

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ContentConfig;
use crate::http::ServiceClient;
use crate::pagination::Page;
use crate::{BoardError, Result};

use super::files::{EncryptedFiles, ImageFile};
use super::service::{channel_path, validate_id};
use super::types::{
    AddResult, Channel, ContentDraft, ContentItem, Conversation, EncryptedFileRef,
    FILE_CONTENT_TYPE,
};

/// Wire form of a draft, with the channel key filled in.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewContent<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    payload: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption_key_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scr: Option<&'a EncryptedFileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

impl<'a> NewContent<'a> {
    fn new(draft: &'a ContentDraft, channel: &'a Channel) -> Self {
        Self {
            content_type: &draft.content_type,
            payload: &draft.payload,
            encryption_key_url: channel.default_encryption_key_url.as_deref(),
            scr: draft.scr.as_ref(),
            display_name: draft.display_name.as_deref(),
        }
    }
}

/// Service for adding, listing, and deleting channel content.
#[derive(Debug, Clone)]
pub struct ContentStore {
    client: ServiceClient,
    config: ContentConfig,
}

impl ContentStore {
    /// Create a new ContentStore over the given client.
    pub fn new(client: ServiceClient, config: ContentConfig) -> Self {
        Self { client, config }
    }

    fn contents_path(channel: &Channel) -> String {
        format!("{}/contents", channel_path(&channel.channel_id))
    }

    /// Add drafts to a channel, one request per chunk.
    ///
    /// Returns one result per chunk, in submission order. An empty draft
    /// list sends nothing.
    pub async fn add_content(
        &self,
        channel: &Channel,
        drafts: &[ContentDraft],
    ) -> Result<Vec<AddResult>> {
        validate_id("channel", &channel.channel_id)?;
        for draft in drafts {
            draft.validate()?;
        }
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self.config.add_chunk_size.max(1);
        let path = Self::contents_path(channel);
        let mut results = Vec::with_capacity(drafts.len().div_ceil(chunk_size));

        for chunk in drafts.chunks(chunk_size) {
            let body: Vec<NewContent<'_>> = chunk
                .iter()
                .map(|draft| NewContent::new(draft, channel))
                .collect();
            let result: AddResult = self.client.post_json(&path, &body).await?;
            debug!(
                "Added {} items to channel {}",
                result.items.len(),
                channel.channel_id
            );
            results.push(result);
        }

        info!(
            "Added {} drafts to channel {} in {} requests",
            drafts.len(),
            channel.channel_id,
            results.len()
        );
        Ok(results)
    }

    /// First page of a channel's contents, oldest first.
    pub async fn get_contents(
        &self,
        channel: &Channel,
        limit: Option<usize>,
    ) -> Result<Page<ContentItem>> {
        validate_id("channel", &channel.channel_id)?;
        let limit = limit.unwrap_or(self.config.page_limit);
        if limit == 0 {
            return Err(BoardError::Validation(
                "contents limit must be at least 1".to_string(),
            ));
        }

        self.client
            .fetch_page(
                &Self::contents_path(channel),
                &[("contentsLimit", limit.to_string())],
            )
            .await
    }

    /// Every content item of a channel, following all pages.
    pub async fn get_all_content(&self, channel: &Channel) -> Result<Vec<ContentItem>> {
        self.get_contents(channel, None).await?.collect_all().await
    }

    /// Delete one content item.
    ///
    /// Deleting an item that no longer exists is `BoardError::NotFound`.
    pub async fn delete_content(&self, channel: &Channel, item: &ContentItem) -> Result<()> {
        validate_id("channel", &channel.channel_id)?;
        validate_id("content", &item.content_id)?;

        let path = format!(
            "{}/{}",
            Self::contents_path(channel),
            urlencoding::encode(&item.content_id)
        );
        self.client.delete(&path).await.map_err(|e| match e {
            BoardError::NotFound(_) => {
                BoardError::NotFound(format!("content {}", item.content_id))
            }
            other => other,
        })?;

        debug!(
            "Deleted content {} from channel {}",
            item.content_id, channel.channel_id
        );
        Ok(())
    }

    /// Delete every content item of a channel. Idempotent.
    pub async fn delete_all_content(&self, channel: &Channel) -> Result<()> {
        validate_id("channel", &channel.channel_id)?;
        self.client.delete(&Self::contents_path(channel)).await?;
        info!("Cleared channel {}", channel.channel_id);
        Ok(())
    }

    /// Upload an image to encrypted file storage.
    pub async fn upload_image(
        &self,
        files: &dyn EncryptedFiles,
        conversation: &Conversation,
        image: &ImageFile,
    ) -> Result<EncryptedFileRef> {
        image.validate()?;
        let scr = files.upload(conversation, &image.bytes).await.map_err(|e| {
            warn!("Upload of {} failed: {}", image.name, e);
            e
        })?;
        debug!("Uploaded {} ({} bytes) to {}", image.name, image.bytes.len(), scr.loc);
        Ok(scr)
    }

    /// Upload an image and add it to the channel as a `FILE` item.
    pub async fn add_image(
        &self,
        files: &dyn EncryptedFiles,
        conversation: &Conversation,
        channel: &Channel,
        image: &ImageFile,
    ) -> Result<Vec<AddResult>> {
        validate_id("channel", &channel.channel_id)?;
        let scr = self.upload_image(files, conversation, image).await?;

        let draft = ContentDraft::from_json(
            FILE_CONTENT_TYPE,
            &json!({
                "type": FILE_CONTENT_TYPE,
                "displayName": image.name,
                "mimeType": image.mime_type(),
                "size": image.bytes.len(),
            }),
        )?
        .with_file(scr, image.name.clone());

        self.add_content(channel, std::slice::from_ref(&draft)).await
    }
}
