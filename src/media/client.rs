use super::{bucket_for, CdnSigner, FileType, Media, MediaStream, S3Backend, UploadOptions};
use crate::config::MediaConfig;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Production [`Media`] implementation backed by an S3-compatible store.
///
/// Construct once and share (it is `Clone` and `Send + Sync`); there is no
/// process-wide instance.
#[derive(Debug, Clone)]
pub struct MediaClient {
    backend: S3Backend,
    cdn: CdnSigner,
}

impl MediaClient {
    pub async fn connect(config: &MediaConfig) -> Result<Self> {
        let backend = S3Backend::connect(config).await?;
        info!("Media client ready for {}", config.endpoint_url());

        Ok(Self::with_backend(
            backend,
            CdnSigner::new(config.cdn_domain.clone(), config.cdn_sign_key.clone()),
        ))
    }

    pub fn with_backend(backend: S3Backend, cdn: CdnSigner) -> Self {
        Self { backend, cdn }
    }
}

#[async_trait]
impl Media for MediaClient {
    async fn upload(
        &self,
        file_type: FileType,
        filename: &str,
        data: MediaStream,
        options: Option<UploadOptions>,
    ) -> Result<String> {
        self.backend
            .put(bucket_for(file_type), filename, data, options)
            .await
    }

    async fn download(&self, file_type: FileType, filename: &str) -> Result<MediaStream> {
        self.backend.get(bucket_for(file_type), filename).await
    }

    async fn get_url(
        &self,
        file_type: FileType,
        filename: &str,
        ttl: Duration,
    ) -> Result<String> {
        self.backend
            .presign_get(bucket_for(file_type), filename, ttl)
            .await
    }

    async fn get_cdn_url(
        &self,
        file_type: FileType,
        filename: &str,
        ttl: Duration,
    ) -> Result<String> {
        self.cdn.signed_url(bucket_for(file_type), filename, ttl)
    }

    async fn delete(&self, file_type: FileType, filename: &str) -> Result<()> {
        self.backend.remove(bucket_for(file_type), filename).await
    }
}
