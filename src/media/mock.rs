use super::{bucket_for, object_path, CdnSigner, FileType, Media, MediaStream, UploadOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// In-memory [`Media`] with the same bucket policy as the real store: all
/// three buckets exist by default and writes to a missing one fail.
#[derive(Clone)]
pub struct MockMedia {
    buckets: Arc<Mutex<HashSet<String>>>,
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    base_url: String,
    cdn: CdnSigner,
    upload_count: Arc<Mutex<usize>>,
    download_count: Arc<Mutex<usize>>,
}

impl MockMedia {
    pub fn new() -> Self {
        let buckets = [FileType::Image, FileType::Video, FileType::Other]
            .into_iter()
            .map(|ft| bucket_for(ft).to_string())
            .collect();

        Self {
            buckets: Arc::new(Mutex::new(buckets)),
            objects: Arc::new(Mutex::new(HashMap::new())),
            base_url: "http://mock-storage.example.com".to_string(),
            cdn: CdnSigner::new("https://mock-cdn.example.com", "mock-sign-key"),
            upload_count: Arc::new(Mutex::new(0)),
            download_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn without_bucket(self, bucket: &str) -> Self {
        self.buckets.lock().unwrap().remove(bucket);
        self
    }

    pub fn with_cdn(mut self, cdn: CdnSigner) -> Self {
        self.cdn = cdn;
        self
    }

    pub fn with_object(self, file_type: FileType, filename: &str, data: Vec<u8>) -> Self {
        self.objects.lock().unwrap().insert(
            object_path(bucket_for(file_type), filename),
            StoredObject {
                data,
                content_type: None,
                metadata: HashMap::new(),
            },
        );
        self
    }

    pub fn get_object(&self, file_type: FileType, filename: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&object_path(bucket_for(file_type), filename))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn get_upload_count(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    pub fn get_download_count(&self) -> usize {
        *self.download_count.lock().unwrap()
    }

    fn check_bucket(&self, bucket: &str, filename: &str) -> Result<()> {
        if self.buckets.lock().unwrap().contains(bucket) {
            Ok(())
        } else {
            Err(Error::missing_bucket(bucket, filename))
        }
    }
}

impl Default for MockMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Media for MockMedia {
    async fn upload(
        &self,
        file_type: FileType,
        filename: &str,
        mut data: MediaStream,
        options: Option<UploadOptions>,
    ) -> Result<String> {
        let bucket = bucket_for(file_type);
        self.check_bucket(bucket, filename)?;

        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes).await?;

        let options = options.unwrap_or_default();
        let path = object_path(bucket, filename);
        self.objects.lock().unwrap().insert(
            path.clone(),
            StoredObject {
                data: bytes,
                content_type: options.content_type(),
                metadata: options.metadata,
            },
        );
        *self.upload_count.lock().unwrap() += 1;

        Ok(path)
    }

    async fn download(&self, file_type: FileType, filename: &str) -> Result<MediaStream> {
        let bucket = bucket_for(file_type);
        self.check_bucket(bucket, filename)?;
        *self.download_count.lock().unwrap() += 1;

        let objects = self.objects.lock().unwrap();
        match objects.get(&object_path(bucket, filename)) {
            Some(object) => Ok(Box::new(Cursor::new(object.data.clone()))),
            None => Err(Error::backend(bucket, filename, "object does not exist")),
        }
    }

    async fn get_url(
        &self,
        file_type: FileType,
        filename: &str,
        ttl: Duration,
    ) -> Result<String> {
        Ok(format!(
            "{}/{}/{}?X-Amz-Expires={}",
            self.base_url,
            bucket_for(file_type),
            filename,
            ttl.as_secs()
        ))
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
        let bucket = bucket_for(file_type);
        self.check_bucket(bucket, filename)?;

        self.objects
            .lock()
            .unwrap()
            .remove(&object_path(bucket, filename));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(bytes: &'static [u8]) -> MediaStream {
        Box::new(bytes)
    }

    async fn read_all(mut stream: MediaStream) -> Vec<u8> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_mock_upload_and_download() {
        let media = MockMedia::new();

        let path = media
            .upload(FileType::Image, "cat.png", body(b"meow"), None)
            .await
            .unwrap();
        assert_eq!(path, "images/cat.png");
        assert_eq!(media.get_upload_count(), 1);

        let stream = media.download(FileType::Image, "cat.png").await.unwrap();
        assert_eq!(read_all(stream).await, b"meow");
        assert_eq!(media.get_download_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_records_options() {
        let media = MockMedia::new();
        let options = UploadOptions::new()
            .with_content_type("video/mp4")
            .with_metadata("room", "42");

        media
            .upload(FileType::Video, "clip.mp4", body(b"frames"), Some(options))
            .await
            .unwrap();

        let stored = media.get_object(FileType::Video, "clip.mp4").unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(stored.metadata.get("room").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_mock_missing_bucket() {
        let media = MockMedia::new().without_bucket("images");

        let result = media
            .upload(FileType::Image, "cat.png", body(b"meow"), None)
            .await;

        assert!(matches!(result, Err(Error::Backend { .. })));
        assert_eq!(media.object_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_delete_is_noop_for_missing_object() {
        let media = MockMedia::new().with_object(FileType::Other, "a.txt", b"x".to_vec());

        media.delete(FileType::Other, "a.txt").await.unwrap();
        media.delete(FileType::Other, "a.txt").await.unwrap();
        assert!(media.get_object(FileType::Other, "a.txt").is_none());
    }

    #[tokio::test]
    async fn test_mock_download_missing_object() {
        let media = MockMedia::new();
        let result = media.download(FileType::Video, "nope.mp4").await;

        match result {
            Err(e) => assert!(e.to_string().contains("object does not exist")),
            Ok(_) => panic!("expected missing object error"),
        }
    }
}
