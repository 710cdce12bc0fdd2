use super::{object_path, presign, with_deadline, MediaStream, UploadOptions};
use crate::config::MediaConfig;
use crate::{Error, Result};
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::{config::Region, Client as S3Client};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

/// Bodies up to this size go up in a single request; larger ones are split
/// into multipart parts of this size.
pub const PART_SIZE: usize = 16 * 1024 * 1024;

/// Connection to the S3-compatible object store.
///
/// Cheap to clone and safe to share: the SDK client is internally
/// reference counted and no per-call state lives here.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: S3Client,
    max_upload_size: u64,
    operation_timeout: Option<Duration>,
}

impl S3Backend {
    pub async fn connect(config: &MediaConfig) -> Result<Self> {
        config.validate()?;

        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "wesio-media",
        );

        // Failures surface to the caller as-is; the SDK must not retry.
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        // MinIO addresses buckets by path, not by subdomain.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            max_upload_size: config.max_upload_size,
            operation_timeout: config.operation_timeout,
        })
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.operation_timeout {
            Some(deadline) => with_deadline(deadline, operation).await,
            None => operation.await,
        }
    }

    /// Fails unless `bucket` already exists. Buckets are provisioned out of
    /// band and are never created here.
    pub async fn ensure_bucket(&self, bucket: &str, key: &str) -> Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let not_found = e.as_service_error().is_some_and(|se| se.is_not_found())
                    || e.raw_response().is_some_and(|r| r.status().as_u16() == 404);
                if not_found {
                    warn!(bucket, key, "Bucket does not exist");
                    Err(Error::missing_bucket(bucket, key))
                } else {
                    Err(Error::backend(
                        bucket,
                        key,
                        format!(
                            "failed to check bucket existence: {}",
                            DisplayErrorContext(&e)
                        ),
                    ))
                }
            }
        }
    }

    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: MediaStream,
        options: Option<UploadOptions>,
    ) -> Result<String> {
        self.bounded(self.put_inner(bucket, key, data, options.unwrap_or_default()))
            .await
    }

    async fn put_inner(
        &self,
        bucket: &str,
        key: &str,
        mut data: MediaStream,
        options: UploadOptions,
    ) -> Result<String> {
        self.ensure_bucket(bucket, key).await?;

        let first = read_part(&mut data, PART_SIZE).await?;
        self.check_size(first.len() as u64)?;

        if first.len() < PART_SIZE {
            debug!(bucket, key, size = first.len(), "Uploading object");
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(first))
                .set_content_type(options.content_type())
                .set_metadata(options.user_metadata())
                .send()
                .await
                .map_err(|e| {
                    error!(bucket, key, "Upload failed: {}", DisplayErrorContext(&e));
                    Error::backend(
                        bucket,
                        key,
                        format!("failed to upload file: {}", DisplayErrorContext(&e)),
                    )
                })?;
        } else {
            self.put_multipart(bucket, key, first, &mut data, &options)
                .await?;
        }

        info!(bucket, key, "Uploaded object");
        Ok(object_path(bucket, key))
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        first: Vec<u8>,
        data: &mut MediaStream,
        options: &UploadOptions,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(options.content_type())
            .set_metadata(options.user_metadata())
            .send()
            .await
            .map_err(|e| {
                Error::backend(
                    bucket,
                    key,
                    format!("failed to start multipart upload: {}", DisplayErrorContext(&e)),
                )
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::backend(bucket, key, "multipart upload returned no upload id"))?
            .to_string();

        debug!(bucket, key, upload_id = %upload_id, "Started multipart upload");

        let pending = PendingUpload::new(self.client.clone(), bucket, key, upload_id);
        let uploaded = self
            .upload_parts(bucket, key, &pending.upload_id, first, data)
            .await;
        match uploaded {
            Ok(()) => {
                pending.finish();
                Ok(())
            }
            Err(e) => {
                pending.abort().await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        data: &mut MediaStream,
    ) -> Result<()> {
        let mut parts = Vec::new();
        let mut total = first.len() as u64;
        let mut chunk = first;
        let mut part_number: i32 = 1;

        loop {
            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| {
                    Error::backend(
                        bucket,
                        key,
                        format!(
                            "failed to upload part {}: {}",
                            part_number,
                            DisplayErrorContext(&e)
                        ),
                    )
                })?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            let next = read_part(data, PART_SIZE).await?;
            if next.is_empty() {
                break;
            }
            total += next.len() as u64;
            self.check_size(total)?;

            chunk = next;
            part_number += 1;
        }

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                Error::backend(
                    bucket,
                    key,
                    format!(
                        "failed to complete multipart upload: {}",
                        DisplayErrorContext(&e)
                    ),
                )
            })?;

        debug!(bucket, key, parts = part_number, total, "Completed multipart upload");
        Ok(())
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_upload_size {
            return Err(Error::PayloadTooLarge {
                limit: self.max_upload_size,
            });
        }
        Ok(())
    }

    /// The deadline covers the request up to the response headers; reading
    /// the returned stream is not bounded.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<MediaStream> {
        self.bounded(self.get_inner(bucket, key)).await
    }

    async fn get_inner(&self, bucket: &str, key: &str) -> Result<MediaStream> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                Error::backend(
                    bucket,
                    key,
                    format!("failed to get object: {}", DisplayErrorContext(&e)),
                )
            })?;

        debug!(bucket, key, "Opened object stream");
        Ok(Box::new(Box::pin(output.body.into_async_read())))
    }

    pub async fn remove(&self, bucket: &str, key: &str) -> Result<()> {
        self.bounded(self.remove_inner(bucket, key)).await
    }

    async fn remove_inner(&self, bucket: &str, key: &str) -> Result<()> {
        self.ensure_bucket(bucket, key).await?;

        // S3 answers 204 for keys that were never there.
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                Error::backend(
                    bucket,
                    key,
                    format!("failed to delete object: {}", DisplayErrorContext(&e)),
                )
            })?;

        info!(bucket, key, "Deleted object");
        Ok(())
    }

    pub async fn presign_get(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        presign::presign_get(&self.client, bucket, key, ttl).await
    }
}

/// An open multipart upload that has not been completed yet.
///
/// Dropping it unfinished, e.g. when the operation deadline fires or the
/// caller drops the upload future, sends the abort from a spawned task so
/// the stored parts are released either way.
struct PendingUpload {
    client: S3Client,
    bucket: String,
    key: String,
    upload_id: String,
    open: bool,
}

impl PendingUpload {
    fn new(client: S3Client, bucket: &str, key: &str, upload_id: String) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            open: true,
        }
    }

    fn finish(mut self) {
        self.open = false;
    }

    async fn abort(mut self) {
        self.open = false;
        abort_upload(&self.client, &self.bucket, &self.key, &self.upload_id).await;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id = %self.upload_id,
                "No runtime to abort dropped multipart upload"
            );
            return;
        };

        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        runtime.spawn(async move {
            abort_upload(&client, &bucket, &key, &upload_id).await;
        });
    }
}

async fn abort_upload(client: &S3Client, bucket: &str, key: &str, upload_id: &str) {
    // An aborted multipart upload never becomes a visible object.
    match client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        Ok(_) => debug!(bucket, key, upload_id, "Aborted multipart upload"),
        Err(e) => warn!(
            bucket,
            key,
            upload_id,
            "Failed to abort multipart upload: {}",
            DisplayErrorContext(&e)
        ),
    }
}

/// Read up to `size` bytes, stopping early only at end of stream.
async fn read_part<R>(reader: &mut R, size: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    (&mut *reader).take(size as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_part_splits_stream() {
        let mut reader: MediaStream = Box::new(&b"abcdefgh"[..]);

        assert_eq!(read_part(&mut reader, 3).await.unwrap(), b"abc");
        assert_eq!(read_part(&mut reader, 3).await.unwrap(), b"def");
        assert_eq!(read_part(&mut reader, 3).await.unwrap(), b"gh");
        assert!(read_part(&mut reader, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejects_missing_credentials() {
        let config = MediaConfig::new("localhost:9000", "", "");
        let err = S3Backend::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_check_size_enforces_limit() {
        let config = MediaConfig::new("localhost:9000", "minio", "minio123").with_max_upload_size(10);
        let backend = S3Backend::connect(&config).await.unwrap();

        assert!(backend.check_size(10).is_ok());
        assert!(matches!(
            backend.check_size(11),
            Err(Error::PayloadTooLarge { limit: 10 })
        ));
    }
}
