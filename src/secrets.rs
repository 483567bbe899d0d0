//! Secret stores the proxy can fetch its credential from.

use crate::error::{Result, StudioError};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Public endpoint of Google Secret Manager.
pub const SECRET_MANAGER_BASE_URL: &str = "https://secretmanager.googleapis.com";

/// A named-secret lookup.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the current value of the named secret.
    async fn fetch(&self, name: &str) -> Result<String>;

    /// Short description for startup logs.
    fn describe(&self) -> String;
}

/// Rejects names that could escape the store (path separators, `..`).
fn validate_secret_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StudioError::Config("secret name is empty".into()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StudioError::Config(format!(
            "invalid secret name: {:?}",
            name
        ))),
    }
}

/// Directory with one file per secret, e.g. `/run/secrets`.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self, name: &str) -> Result<String> {
        validate_secret_name(name)?;
        let path = self.dir.join(name);
        let value = tokio::fs::read_to_string(&path).await.map_err(|e| {
            StudioError::Config(format!("cannot read secret {:?}: {}", name, e))
        })?;
        Ok(value.trim().to_string())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

/// Google Secret Manager, reading the `latest` version of a secret.
#[derive(Debug, Clone)]
pub struct GcpSecretManager {
    client: reqwest::Client,
    project: String,
    base_url: String,
    access_token: Option<String>,
}

impl GcpSecretManager {
    /// Creates a client for secrets in `project`.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            project: project.into(),
            base_url: SECRET_MANAGER_BASE_URL.to_string(),
            access_token: None,
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Uses a fixed OAuth access token instead of asking `gcloud`.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    async fn token(&self) -> Result<String> {
        if let Some(ref token) = self.access_token {
            return Ok(token.clone());
        }
        gcloud_access_token().await
    }
}

/// Get a bearer token by running `gcloud auth print-access-token`.
async fn gcloud_access_token() -> Result<String> {
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| StudioError::Config(format!("failed to run gcloud CLI: {}", e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StudioError::Config(format!(
            "gcloud auth failed: {}",
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    data: String,
}

#[async_trait]
impl SecretStore for GcpSecretManager {
    async fn fetch(&self, name: &str) -> Result<String> {
        validate_secret_name(name)?;
        let url = format!(
            "{}/v1/projects/{}/secrets/{}/versions/latest:access",
            self.base_url, self.project, name
        );
        let token = self.token().await?;

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StudioError::Config(format!("secret manager unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StudioError::Config(format!(
                "secret manager returned {} for secret {:?}",
                status.as_u16(),
                name
            )));
        }

        let body: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| StudioError::Config(format!("bad secret manager response: {}", e)))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.payload.data.trim())
            .map_err(|e| StudioError::Config(format!("secret payload is not base64: {}", e)))?;
        let value = String::from_utf8(bytes)
            .map_err(|_| StudioError::Config(format!("secret {:?} is not UTF-8", name)))?;
        Ok(value.trim().to_string())
    }

    fn describe(&self) -> String {
        format!("Google Secret Manager (project {})", self.project)
    }
}
