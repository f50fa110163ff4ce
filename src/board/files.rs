//! Encrypted file storage seam used for image content.

use std::path::Path;

use async_trait::async_trait;

use crate::{BoardError, Result};

use super::types::{Conversation, EncryptedFileRef};

/// Upload and download of encrypted files.
///
/// The board service only stores the returned reference; encryption and
/// transport are up to the implementation.
#[async_trait]
pub trait EncryptedFiles: Send + Sync {
    /// Encrypt and upload `bytes` for use inside `conversation`.
    async fn upload(&self, conversation: &Conversation, bytes: &[u8]) -> Result<EncryptedFileRef>;

    /// Fetch and decrypt a previously uploaded file.
    async fn download(&self, scr: &EncryptedFileRef) -> Result<Vec<u8>>;
}

/// An image to be placed on a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// File name, shown as the item's display name.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read an image from disk, naming it after the file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BoardError::Validation(format!("no file name in {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { name, bytes })
    }

    /// MIME type guessed from the file extension.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BoardError::Validation(
                "image name must not be empty".to_string(),
            ));
        }
        if self.bytes.is_empty() {
            return Err(BoardError::Validation(format!("image {} is empty", self.name)));
        }
        Ok(())
    }
}
