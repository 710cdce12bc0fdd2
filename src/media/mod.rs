//! Object storage for chat media
//!
//! Stores, fetches and deletes images and videos in an S3-compatible store
//! (MinIO), and hands out two kinds of expiring links: backend presigned
//! URLs and HMAC-signed CDN URLs.

pub mod backend;
pub mod bucket;
pub mod cdn;
pub mod client;
pub mod mock;
pub mod presign;

pub use backend::S3Backend;
pub use bucket::{bucket_for, object_path};
pub use cdn::CdnSigner;
pub use client::MediaClient;
pub use mock::MockMedia;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Byte stream handed to `upload` and returned from `download`.
///
/// Dropping a download stream releases the underlying connection.
pub type MediaStream = Box<dyn AsyncRead + Send + Unpin>;

/// Category of a stored file. Selects the bucket, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    #[serde(other)]
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Other => "other",
        }
    }
}

impl From<&str> for FileType {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "image" => FileType::Image,
            "video" => FileType::Video,
            _ => FileType::Other,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    /// User metadata stored alongside the object.
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn content_type(&self) -> Option<String> {
        self.content_type.clone().filter(|ct| !ct.is_empty())
    }

    pub(crate) fn user_metadata(&self) -> Option<HashMap<String, String>> {
        if self.metadata.is_empty() {
            None
        } else {
            Some(self.metadata.clone())
        }
    }
}

#[async_trait]
pub trait Media: Send + Sync {
    /// Store `data` and return the object path `<bucket>/<filename>`.
    async fn upload(
        &self,
        file_type: FileType,
        filename: &str,
        data: MediaStream,
        options: Option<UploadOptions>,
    ) -> Result<String>;

    async fn download(&self, file_type: FileType, filename: &str) -> Result<MediaStream>;

    /// Backend presigned GET URL. Does not check that the object exists.
    async fn get_url(&self, file_type: FileType, filename: &str, ttl: Duration)
        -> Result<String>;

    /// CDN URL carrying `expires` and `signature` query parameters.
    async fn get_cdn_url(
        &self,
        file_type: FileType,
        filename: &str,
        ttl: Duration,
    ) -> Result<String>;

    /// Removing an object that does not exist succeeds; a missing bucket fails.
    async fn delete(&self, file_type: FileType, filename: &str) -> Result<()>;
}

/// Bound `operation` by `deadline`. Elapsing drops the future, which aborts
/// any request in flight, and yields [`Error::Cancelled`].
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(Error::Cancelled(format!(
            "deadline of {:?} exceeded",
            deadline
        ))),
    }
}
