use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::job::GarmentCategory;

/// External synthesis provider: submit a (model, garment) pair, then resolve
/// the returned job id to its terminal status.
///
/// Implementations must not retry `submit` internally: provider-side
/// idempotency is not guaranteed, and a duplicated submit is a duplicated
/// paid generation.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    async fn submit(
        &self,
        model_image_url: &str,
        garment_image_url: &str,
        category: GarmentCategory,
    ) -> Result<String, ProviderError>;

    async fn status(&self, job_id: &str) -> Result<JobState, ProviderError>;
}

/// Provider-reported state of a generation job.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Succeeded {
        #[serde(default)]
        output: Vec<String>,
    },
    Failed {
        #[serde(default)]
        error: Option<String>,
    },
}

/// Client for the fashn.ai try-on API.
pub struct FashnClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    model_image: &'a str,
    garment_image: &'a str,
    category: String,
}

#[derive(Deserialize)]
struct RunResponse {
    id: String,
}

impl FashnClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Point the client at a different endpoint (mock servers in tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn check_status(status: StatusCode) -> Result<(), ProviderError> {
        if status.is_client_error() {
            Err(ProviderError::Rejected { status })
        } else if status.is_server_error() {
            Err(ProviderError::Server { status })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SynthesisProvider for FashnClient {
    async fn submit(
        &self,
        model_image_url: &str,
        garment_image_url: &str,
        category: GarmentCategory,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/run", self.base_url);

        let body = RunRequest {
            model_image: model_image_url,
            garment_image: garment_image_url,
            category: category.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        Self::check_status(response.status())?;

        let run: RunResponse = response.json().await.map_err(ProviderError::Http)?;
        Ok(run.id)
    }

    async fn status(&self, job_id: &str) -> Result<JobState, ProviderError> {
        let url = format!("{}/v1/status/{}", self.base_url, job_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        Self::check_status(response.status())?;

        response.json().await.map_err(ProviderError::Http)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 4xx — bad request, auth or quota. The code is kept for diagnostics.
    #[error("provider rejected the request: {status}")]
    Rejected { status: StatusCode },

    /// 5xx on the provider side.
    #[error("provider server error: {status}")]
    Server { status: StatusCode },
}
