use reqwest::multipart;
use reqwest::Client;

/// Client for the remove.bg background removal API.
///
/// Garments photographed against a busy background confuse the synthesis
/// provider; catalog images are pre-cut, device uploads go through here first.
pub struct RemoveBgClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RemoveBgClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: "https://api.remove.bg".to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Point the client at a different endpoint (mock servers in tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Strip the background from an image, returning PNG bytes with alpha.
    pub async fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>, RemovalError> {
        let url = format!("{}/v1.0/removebg", self.base_url);

        let form = multipart::Form::new()
            .text("size", "auto")
            .part(
                "image_file",
                multipart::Part::bytes(image_bytes.to_vec())
                    .file_name("garment.jpg")
                    .mime_str("image/jpeg")
                    .map_err(RemovalError::Http)?,
            );

        let response = self
            .http
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(RemovalError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemovalError::Api {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(RemovalError::Http)?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remove.bg returned status {status}")]
    Api { status: u16 },
}
