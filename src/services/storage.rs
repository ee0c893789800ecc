use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Key-addressed blob storage with a public read URL per object.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under a fresh `{uuid}{ext}` key, return the public URL.
    async fn put_file(&self, path: &std::path::Path, ext: &str) -> StorageResult<String>;

    /// Upload bytes under a caller-chosen key (overwrites), return the public URL.
    async fn put_object(&self, key: &str, data: Vec<u8>) -> StorageResult<String>;

    /// Download the bytes stored under `key`.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;
}

/// Cloudflare R2 via the S3-compatible API. Objects are served back through a
/// separate public base URL (`pub-….r2.dev`), not the S3 endpoint.
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> StorageResult<Self> {
        let store = AmazonS3Builder::new()
            .with_region("auto")
            .with_endpoint(endpoint)
            .with_bucket_name(bucket)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            store,
            bucket: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fresh object key for an image upload, e.g. `3f2a….jpg`.
    fn object_key(ext: &str) -> String {
        format!("{}{}", Uuid::new_v4(), ext)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<String> {
        let size = data.len();
        let location = ObjectPath::from(key.to_string());

        self.store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| {
                log::error!("❌ Upload to {}/{} failed: {}", self.bucket, key, e);
                StorageError::Upload(e.to_string())
            })?;

        log::info!("📦 Uploaded {} bytes to {}/{}", size, self.bucket, key);
        Ok(self.public_url(key))
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    async fn put_file(&self, path: &std::path::Path, ext: &str) -> StorageResult<String> {
        let data = tokio::fs::read(path).await?;
        let key = Self::object_key(ext);
        self.put(&key, data).await
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> StorageResult<String> {
        self.put(key, data).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let location = ObjectPath::from(key.to_string());

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                log::error!("❌ Download of {}/{} failed: {}", self.bucket, key, other);
                StorageError::Download(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;

        log::debug!("📥 Downloaded {} bytes from {}/{}", bytes.len(), self.bucket, key);
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_unique_and_keeps_extension() {
        let a = S3Storage::object_key(".jpg");
        let b = S3Storage::object_key(".jpg");

        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        // 36-char uuid + extension
        assert_eq!(a.len(), 36 + 4);
    }

    #[test]
    fn test_public_url_strips_trailing_slash() {
        let storage = S3Storage::new(
            "https://example.r2.cloudflarestorage.com",
            "pantry",
            "key",
            "secret",
            "https://pub-test.r2.dev/",
        )
        .unwrap();

        assert_eq!(
            storage.public_url("abc.jpg"),
            "https://pub-test.r2.dev/abc.jpg"
        );
    }
}
