use async_trait::async_trait;
use base64::Engine;
use image::ImageFormat;
use std::path::PathBuf;

use crate::services::removal::{RemovalError, RemoveBgClient};

/// A complete, decode-checked image ready for upload.
///
/// Constructors verify the bytes actually decode, so anything downstream of
/// ingestion can assume a well-formed image. No partial or truncated capture
/// ever reaches the object store.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl ImagePayload {
    /// Validate raw bytes as a decodable image and sniff the content type.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IngestError> {
        let format = image::guess_format(&bytes).map_err(IngestError::Decode)?;
        image::load_from_memory(&bytes).map_err(IngestError::Decode)?;

        Ok(Self {
            bytes,
            content_type: content_type_for(format),
        })
    }

    /// Decode a `data:image/...;base64,` URI, as produced by a camera capture.
    pub fn from_data_uri(uri: &str) -> Result<Self, IngestError> {
        let encoded = uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(_, data)| data)
            .ok_or(IngestError::MalformedDataUri)?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| IngestError::MalformedDataUri)?;

        Self::from_bytes(bytes)
    }
}

fn content_type_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        _ => "image/png",
    }
}

/// A device image source: camera capture or photo-library pick.
///
/// `Ok(None)` means the user cancelled, which is not an error — the flow
/// quietly stays on the capture screen. Anything else that prevents a usable
/// frame is an [`IngestError`].
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn acquire(&self) -> Result<Option<ImagePayload>, IngestError>;
}

/// Reads an image from a local path — the gallery-pick analog for a headless
/// client and the demo binary.
pub struct FileImageSource {
    path: PathBuf,
}

impl FileImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn acquire(&self) -> Result<Option<ImagePayload>, IngestError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(IngestError::Io)?;
        ImagePayload::from_bytes(bytes).map(Some)
    }
}

/// Where the garment image comes from.
#[derive(Debug, Clone)]
pub enum GarmentSource {
    /// A store item: its public URL is already durable, no upload needed.
    CatalogUrl(String),
    /// A device image that still has to be cleaned up and uploaded.
    Device(ImagePayload),
}

/// Run an uploaded garment image through background removal when a client is
/// configured, re-validating the returned bytes.
pub async fn prepare_device_garment(
    payload: ImagePayload,
    removal: Option<&RemoveBgClient>,
) -> Result<ImagePayload, IngestError> {
    match removal {
        Some(client) => {
            let cleaned = client.remove_background(&payload.bytes).await?;
            ImagePayload::from_bytes(cleaned)
        }
        None => Ok(payload),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("bytes are not a decodable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("malformed base64 image data URI")]
    MalformedDataUri,

    #[error("background removal failed: {0}")]
    Removal(#[from] RemovalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1x1 PNG, the smallest valid capture we can fake.
    pub(crate) fn tiny_png() -> Vec<u8> {
        let mut out = Vec::new();
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([12, 34, 56, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn valid_png_is_accepted() {
        let payload = ImagePayload::from_bytes(tiny_png()).unwrap();
        assert_eq!(payload.content_type, "image/png");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let result = ImagePayload::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(result, Err(IngestError::Decode(_))));
    }

    #[test]
    fn truncated_image_is_rejected() {
        let mut bytes = tiny_png();
        bytes.truncate(bytes.len() / 2);
        assert!(ImagePayload::from_bytes(bytes).is_err());
    }

    #[test]
    fn data_uri_roundtrip() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tiny_png());
        let uri = format!("data:image/png;base64,{encoded}");
        let payload = ImagePayload::from_data_uri(&uri).unwrap();
        assert_eq!(payload.content_type, "image/png");
    }

    #[test]
    fn bare_base64_without_header_is_rejected() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tiny_png());
        assert!(matches!(
            ImagePayload::from_data_uri(&encoded),
            Err(IngestError::MalformedDataUri)
        ));
    }

    #[tokio::test]
    async fn file_source_reads_and_validates() {
        let path = std::env::temp_dir().join(format!("elo-ingest-{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, tiny_png()).await.unwrap();

        let source = FileImageSource::new(&path);
        let payload = source.acquire().await.unwrap().unwrap();
        assert_eq!(payload.content_type, "image/png");

        tokio::fs::remove_file(&path).await.ok();
    }
}
