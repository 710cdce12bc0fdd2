//! Backend-native presigned download URLs (SigV4 query signing).
//!
//! The object store validates these itself at access time, so generation
//! never checks whether the object exists.

use crate::{Error, Result};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;

pub async fn presign_get(
    client: &S3Client,
    bucket: &str,
    key: &str,
    ttl: Duration,
) -> Result<String> {
    let config = PresigningConfig::expires_in(ttl)
        .map_err(|e| Error::Signing(format!("invalid presigned URL lifetime: {}", e)))?;

    let request = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .presigned(config)
        .await
        .map_err(|e| {
            Error::Signing(format!(
                "failed to generate presigned URL for {}/{}: {}",
                bucket,
                key,
                DisplayErrorContext(&e)
            ))
        })?;

    tracing::debug!(bucket, key, ttl_secs = ttl.as_secs(), "Generated presigned URL");
    Ok(request.uri().to_string())
}
