use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

/// Durable image storage yielding publicly dereferenceable URLs.
///
/// Both image URLs handed to the synthesis provider must be fetchable by the
/// provider's servers, so every upload lands in a public bucket and returns
/// the full public URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload image bytes under a fresh unique key and return the public URL.
    async fn upload(&self, data: &[u8], content_type: &str) -> Result<String, StorageError>;

    /// List public URLs of stored objects under a key prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// S3-compatible object store client (Supabase storage, R2, MinIO, ...).
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, data: &[u8], content_type: &str) -> Result<String, StorageError> {
        let key = object_key(content_type);
        self.bucket
            .put_object_with_content_type(&key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(self.public_url(&key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(StorageError::S3)?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| self.public_url(&object.key))
            .collect())
    }
}

/// Time-derived unique object key, e.g. `images/1754400000000-9f2c….png`.
/// The uuid suffix rules out collisions between uploads in the same
/// millisecond (one flow uploads a model and a garment back to back).
fn object_key(content_type: &str) -> String {
    let ext = match content_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    };
    format!(
        "images/{}-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4(),
        ext
    )
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_are_unique_and_prefixed() {
        let a = object_key("image/png");
        let b = object_key("image/png");
        assert_ne!(a, b);
        assert!(a.starts_with("images/"));
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn extension_follows_content_type() {
        assert!(object_key("image/jpeg").ends_with(".jpg"));
        assert!(object_key("image/webp").ends_with(".webp"));
        assert!(object_key("application/octet-stream").ends_with(".png"));
    }
}
