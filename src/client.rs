//! Client for the studio proxy.

use crate::api::{ActionRequest, EditResponse, ErrorBody, GenerateResponse, WireImage};
use crate::error::{Result, StudioError};
use crate::image::{AspectRatio, EditResult, SourceImage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// The two operations the studio can ask a backend for.
///
/// Implementations must stop work and return [`StudioError::Cancelled`]
/// once `cancel` is triggered.
#[async_trait]
pub trait StudioBackend: Send + Sync + 'static {
    /// Generates an image and returns it as a data URL.
    async fn generate(&self, prompt: &str, cancel: &CancellationToken) -> Result<String>;

    /// Edits `images` and returns the resulting image and caption.
    async fn edit(
        &self,
        prompt: &str,
        images: &[SourceImage],
        aspect_ratio: Option<AspectRatio>,
        cancel: &CancellationToken,
    ) -> Result<EditResult>;
}

/// Builder for StudioClient.
#[derive(Debug, Clone, Default)]
pub struct StudioClientBuilder {
    endpoint: Option<String>,
    client: Option<reqwest::Client>,
}

impl StudioClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full URL of the proxy endpoint, e.g. `http://127.0.0.1:8787/api/studio`.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Reuses an existing HTTP client.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<StudioClient> {
        let endpoint = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| StudioError::Config("proxy endpoint not set".into()))?;
        reqwest::Url::parse(&endpoint)
            .map_err(|e| StudioError::Config(format!("invalid proxy endpoint {}: {}", endpoint, e)))?;

        Ok(StudioClient {
            http: self.client.unwrap_or_default(),
            endpoint,
        })
    }
}

/// Posts generate/edit actions to the proxy.
#[derive(Debug, Clone)]
pub struct StudioClient {
    http: reqwest::Client,
    endpoint: String,
}

impl StudioClient {
    /// Creates a new `StudioClientBuilder`.
    pub fn builder() -> StudioClientBuilder {
        StudioClientBuilder::new()
    }

    /// The proxy endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: DeserializeOwned>(
        &self,
        body: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let call = async {
            let response = self.http.post(&self.endpoint).json(body).send().await?;
            let status = response.status();

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&text)
                    .ok()
                    .map(|b| b.error)
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
                return Err(StudioError::Request(message));
            }

            let text = response.text().await?;
            serde_json::from_str(&text).map_err(|e| {
                StudioError::UnexpectedResponse(format!("invalid response from proxy: {}", e))
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StudioError::Cancelled),
            result = call => result,
        }
    }
}

#[async_trait]
impl StudioBackend for StudioClient {
    async fn generate(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let body = ActionRequest::Generate {
            prompt: prompt.to_string(),
        };
        let response: GenerateResponse = self.post(&body, cancel).await?;
        response.image_url.ok_or_else(|| {
            StudioError::UnexpectedResponse("the proxy response did not include an image".into())
        })
    }

    async fn edit(
        &self,
        prompt: &str,
        images: &[SourceImage],
        aspect_ratio: Option<AspectRatio>,
        cancel: &CancellationToken,
    ) -> Result<EditResult> {
        let body = ActionRequest::Edit {
            prompt: prompt.to_string(),
            images: images.iter().map(WireImage::from).collect(),
            aspect_ratio,
        };
        let response: EditResponse = self.post(&body, cancel).await?;
        let image_url = response.image_url.ok_or_else(|| {
            StudioError::UnexpectedResponse("the proxy response did not include an image".into())
        })?;
        Ok(EditResult {
            image_url,
            text: response.text,
        })
    }
}
