//! Proxy configuration, built once at startup.

use crate::error::{Result, StudioError};
use crate::image::{GeminiModel, DEFAULT_BASE_URL, DEFAULT_EDIT_MODEL, DEFAULT_GENERATE_MODEL};
use crate::secrets::{FileSecretStore, GcpSecretManager, SecretStore};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen address of the proxy.
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Path the proxy serves its single endpoint on.
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/studio";

/// Where the model credential comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// The key itself.
    Direct(String),
    /// Name of a secret to fetch from the configured store.
    Secret(String),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct([REDACTED])"),
            Self::Secret(name) => f.debug_tuple("Secret").field(name).finish(),
        }
    }
}

/// Which secret store backs [`CredentialSource::Secret`].
#[derive(Clone, PartialEq, Eq)]
pub enum SecretStoreConfig {
    /// One file per secret in this directory.
    Directory(PathBuf),
    /// Google Secret Manager in this project.
    GoogleSecretManager {
        /// GCP project id.
        project: String,
        /// Fixed OAuth token; `None` asks the `gcloud` CLI.
        access_token: Option<String>,
    },
}

impl std::fmt::Debug for SecretStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            Self::GoogleSecretManager {
                project,
                access_token,
            } => f
                .debug_struct("GoogleSecretManager")
                .field("project", project)
                .field("access_token", &access_token.as_ref().map(|_| "[REDACTED]"))
                .finish(),
        }
    }
}

impl SecretStoreConfig {
    fn open(&self) -> Box<dyn SecretStore> {
        match self {
            Self::Directory(dir) => Box::new(FileSecretStore::new(dir.clone())),
            Self::GoogleSecretManager {
                project,
                access_token,
            } => {
                let store = GcpSecretManager::new(project.clone());
                match access_token {
                    Some(token) => Box::new(store.with_access_token(token.clone())),
                    None => Box::new(store),
                }
            }
        }
    }
}

/// A resolved model credential. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the outbound request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Everything the proxy needs to start.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Where the model credential comes from.
    pub credential: Option<CredentialSource>,
    /// Store used for [`CredentialSource::Secret`].
    pub secret_store: Option<SecretStoreConfig>,
    /// Listen address.
    pub bind: SocketAddr,
    /// Path of the single POST endpoint.
    pub endpoint_path: String,
    /// Model service base URL.
    pub base_url: String,
    /// Model id for generation.
    pub generate_model: String,
    /// Model id for editing.
    pub edit_model: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            credential: None,
            secret_store: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Creates a configuration with defaults and no credential.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credential = match (get("GEMINI_API_KEY"), get("GEMINI_API_KEY_SECRET")) {
            (Some(key), _) => Some(CredentialSource::Direct(key)),
            (None, Some(name)) => Some(CredentialSource::Secret(name)),
            (None, None) => None,
        };

        let secret_store = match (get("GENSTUDIO_SECRETS_DIR"), get("GOOGLE_CLOUD_PROJECT")) {
            (Some(dir), _) => Some(SecretStoreConfig::Directory(PathBuf::from(dir))),
            (None, Some(project)) => Some(SecretStoreConfig::GoogleSecretManager {
                project,
                access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
            }),
            (None, None) => None,
        };

        let bind = get("GENSTUDIO_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind
            .parse()
            .map_err(|_| StudioError::Config(format!("invalid bind address: {}", bind)))?;

        let defaults = Self::default();
        Ok(ProxyConfig {
            credential,
            secret_store,
            bind,
            endpoint_path: defaults.endpoint_path,
            base_url: get("GENSTUDIO_GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            generate_model: get("GENSTUDIO_GENERATE_MODEL").unwrap_or(defaults.generate_model),
            edit_model: get("GENSTUDIO_EDIT_MODEL").unwrap_or(defaults.edit_model),
        })
    }

    /// Uses a direct credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.credential = Some(CredentialSource::Direct(key.into()));
        self
    }

    /// Fetches the credential from a named secret.
    pub fn with_secret(mut self, name: impl Into<String>, store: SecretStoreConfig) -> Self {
        self.credential = Some(CredentialSource::Secret(name.into()));
        self.secret_store = Some(store);
        self
    }

    /// Sets the listen address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Overrides the model service base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the generation and edit model ids.
    pub fn with_models(
        mut self,
        generate_model: impl Into<String>,
        edit_model: impl Into<String>,
    ) -> Self {
        self.generate_model = generate_model.into();
        self.edit_model = edit_model.into();
        self
    }

    /// Resolves the model credential. Failure here is fatal for the proxy.
    pub async fn resolve_credential(&self) -> Result<ApiKey> {
        match &self.credential {
            Some(CredentialSource::Direct(key)) if !key.trim().is_empty() => {
                Ok(ApiKey::new(key.trim()))
            }
            Some(CredentialSource::Direct(_)) => {
                Err(StudioError::Config("GEMINI_API_KEY is empty".into()))
            }
            Some(CredentialSource::Secret(name)) => {
                let store = self.secret_store.as_ref().ok_or_else(|| {
                    StudioError::Config(format!(
                        "secret {:?} requested but no secret store is configured \
                         (set GENSTUDIO_SECRETS_DIR or GOOGLE_CLOUD_PROJECT)",
                        name
                    ))
                })?;
                let store = store.open();
                tracing::info!(secret = %name, store = %store.describe(), "fetching credential");
                let value = store.fetch(name).await?;
                if value.is_empty() {
                    return Err(StudioError::Config(format!("secret {:?} is empty", name)));
                }
                Ok(ApiKey::new(value))
            }
            None => Err(StudioError::Config(
                "no credential configured: set GEMINI_API_KEY or GEMINI_API_KEY_SECRET".into(),
            )),
        }
    }

    /// Builds the model client for a resolved credential.
    pub fn build_model(&self, key: &ApiKey) -> Result<GeminiModel> {
        GeminiModel::builder()
            .api_key(key.expose())
            .base_url(&self.base_url)
            .generate_model(&self.generate_model)
            .edit_model(&self.edit_model)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.credential.is_none());
        assert!(config.secret_store.is_none());
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.endpoint_path, DEFAULT_ENDPOINT_PATH);
        assert_eq!(config.generate_model, DEFAULT_GENERATE_MODEL);
    }

    #[test]
    fn test_direct_key_wins_over_secret() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "direct"),
            ("GEMINI_API_KEY_SECRET", "named"),
        ]))
        .unwrap();
        assert_eq!(
            config.credential,
            Some(CredentialSource::Direct("direct".into()))
        );
    }

    #[test]
    fn test_secret_store_selection() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY_SECRET", "gemini"),
            ("GOOGLE_CLOUD_PROJECT", "demo"),
        ]))
        .unwrap();
        assert_eq!(
            config.secret_store,
            Some(SecretStoreConfig::GoogleSecretManager {
                project: "demo".into(),
                access_token: None,
            })
        );

        let config = ProxyConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY_SECRET", "gemini"),
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("GOOGLE_OAUTH_ACCESS_TOKEN", "token-123"),
        ]))
        .unwrap();
        assert_eq!(
            config.secret_store,
            Some(SecretStoreConfig::GoogleSecretManager {
                project: "demo".into(),
                access_token: Some("token-123".into()),
            })
        );

        let config = ProxyConfig::from_lookup(lookup(&[
            ("GENSTUDIO_SECRETS_DIR", "/run/secrets"),
            ("GOOGLE_CLOUD_PROJECT", "demo"),
        ]))
        .unwrap();
        assert_eq!(
            config.secret_store,
            Some(SecretStoreConfig::Directory(PathBuf::from("/run/secrets")))
        );
    }

    #[test]
    fn test_invalid_bind() {
        let err = ProxyConfig::from_lookup(lookup(&[("GENSTUDIO_BIND", "not-an-address")]))
            .unwrap_err();
        assert!(matches!(err, StudioError::Config(_)));
    }

    #[test]
    fn test_debug_never_prints_key() {
        let config = ProxyConfig::new().with_api_key("AIzaSuperSecret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("AIzaSuperSecret"));
        assert!(!format!("{:?}", ApiKey::new("AIzaSuperSecret")).contains("AIza"));

        let store = SecretStoreConfig::GoogleSecretManager {
            project: "demo".into(),
            access_token: Some("ya29.secret-token".into()),
        };
        assert!(!format!("{:?}", store).contains("ya29"));
    }

    #[tokio::test]
    async fn test_resolve_direct() {
        let key = ProxyConfig::new()
            .with_api_key(" key-1 ")
            .resolve_credential()
            .await
            .unwrap();
        assert_eq!(key.expose(), "key-1");
    }

    #[tokio::test]
    async fn test_resolve_missing_is_fatal_config_error() {
        let err = ProxyConfig::new().resolve_credential().await.unwrap_err();
        assert!(matches!(err, StudioError::Config(_)));
    }

    #[tokio::test]
    async fn test_resolve_secret_without_store() {
        let mut config = ProxyConfig::new();
        config.credential = Some(CredentialSource::Secret("gemini".into()));
        let err = config.resolve_credential().await.unwrap_err();
        assert!(err.to_string().contains("no secret store"));
    }

    #[tokio::test]
    async fn test_resolve_from_secret_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gemini"), "from-file\n").unwrap();

        let config = ProxyConfig::new()
            .with_secret("gemini", SecretStoreConfig::Directory(dir.path().to_path_buf()));
        let key = config.resolve_credential().await.unwrap();
        assert_eq!(key.expose(), "from-file");
    }
}
