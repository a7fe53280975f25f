use async_trait::async_trait;
use std::path::PathBuf;

/// Device media collaborator: photo-library save and the share sheet.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Persist image bytes to the user's library; returns where they landed.
    async fn save_image(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf, MediaError>;

    /// Hand a result URL to the platform share facility.
    async fn share(&self, url: &str) -> Result<(), MediaError>;
}

/// Saves into a local directory — the photo-library analog for a headless
/// client. Sharing degrades to logging the URL.
pub struct DiskMediaSink {
    dir: PathBuf,
}

impl DiskMediaSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MediaSink for DiskMediaSink {
    async fn save_image(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf, MediaError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn share(&self, url: &str) -> Result<(), MediaError> {
        tracing::info!(url, "share requested");
        Ok(())
    }
}

/// Fetch a result image so it can be saved or re-encoded locally.
pub async fn download_image(url: &str) -> Result<Vec<u8>, MediaError> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// File name for a saved result, derived from the result URL when possible.
pub fn result_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && name.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| format!("tryon-{}.png", chrono::Utc::now().timestamp_millis()))
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no result image to operate on")]
    NoResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_taken_from_url() {
        assert_eq!(result_file_name("https://x/out/r1.png"), "r1.png");
    }

    #[test]
    fn file_name_falls_back_when_url_has_no_name() {
        let name = result_file_name("https://x/out/");
        assert!(name.starts_with("tryon-") && name.ends_with(".png"));
    }

    #[tokio::test]
    async fn disk_sink_writes_under_dir() {
        let dir = std::env::temp_dir().join(format!("elo-media-{}", uuid::Uuid::new_v4()));
        let sink = DiskMediaSink::new(&dir);

        let path = sink.save_image(b"png-bytes", "r1.png").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png-bytes");
        assert!(path.starts_with(&dir));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
