//! HTTP proxy that holds the model credential.
//!
//! Accepts `POST` requests carrying an `action` of `generate` or `edit`,
//! validates them, forwards them to the [`ImageModel`] and normalizes the
//! answer into `{ imageUrl }`, `{ imageUrl, text }` or `{ error }`.

use crate::api::{ActionRequest, EditResponse, ErrorBody, GenerateResponse};
use crate::config::{ApiKey, ProxyConfig};
use crate::error::{Result, StudioError};
use crate::image::{AspectRatio, ImageModel, ReferenceImage};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Largest request body accepted (eight full-size images plus JSON overhead).
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// A validated proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyAction {
    /// Generate one image from `prompt`.
    Generate {
        /// Non-empty prompt.
        prompt: String,
    },
    /// Edit `images` according to `prompt`.
    Edit {
        /// Non-empty instruction.
        prompt: String,
        /// At least one image.
        images: Vec<ReferenceImage>,
        /// Requested output proportions, if any.
        aspect_ratio: Option<AspectRatio>,
    },
}

impl ProxyAction {
    /// Parses and validates a JSON request body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let request: ActionRequest =
            serde_json::from_slice(body).map_err(|e| explain_malformed(body, e))?;
        Self::validate(request)
    }

    /// Checks a decoded request for the fields its action requires.
    pub fn validate(request: ActionRequest) -> Result<Self> {
        match request {
            ActionRequest::Generate { prompt } => Ok(Self::Generate {
                prompt: required_prompt(prompt)?,
            }),
            ActionRequest::Edit {
                prompt,
                images,
                aspect_ratio,
            } => {
                let prompt = required_prompt(prompt)?;
                if images.is_empty() {
                    return Err(StudioError::Validation(NO_IMAGES_MESSAGE.into()));
                }
                let images = images
                    .into_iter()
                    .enumerate()
                    .map(|(i, image)| {
                        if image.base64_data.is_empty() || image.mime_type.is_empty() {
                            return Err(incomplete_image(i));
                        }
                        Ok(ReferenceImage {
                            mime_type: image.mime_type,
                            data: image.base64_data,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Edit {
                    prompt,
                    images,
                    aspect_ratio,
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Generate { .. } => "generate",
            Self::Edit { .. } => "edit",
        }
    }
}

const NO_IMAGES_MESSAGE: &str = "At least one image is required for editing.";

fn required_prompt(prompt: String) -> Result<String> {
    if prompt.trim().is_empty() {
        return Err(StudioError::Validation(
            "A non-empty prompt is required.".into(),
        ));
    }
    Ok(prompt)
}

fn incomplete_image(index: usize) -> StudioError {
    StudioError::Validation(format!(
        "Image {} must include both base64Data and mimeType.",
        index + 1
    ))
}

/// Names the part of a body that failed to decode as an [`ActionRequest`].
fn explain_malformed(body: &[u8], err: serde_json::Error) -> StudioError {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return StudioError::Validation("Request body must be valid JSON.".into());
    };

    let action = match value.get("action") {
        None | Some(Value::Null) => {
            return StudioError::Validation(
                "Missing action. Expected \"generate\" or \"edit\".".into(),
            )
        }
        Some(Value::String(a)) if a == "generate" || a == "edit" => a.as_str(),
        Some(other) => {
            let shown = other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string());
            return StudioError::Validation(format!(
                "Invalid action: {}. Expected \"generate\" or \"edit\".",
                shown
            ));
        }
    };

    if !matches!(value.get("prompt"), None | Some(Value::String(_))) {
        return StudioError::Validation("A non-empty prompt is required.".into());
    }
    if action == "edit" {
        if let Some(ratio) = value.get("aspectRatio").filter(|v| !v.is_null()) {
            if serde_json::from_value::<AspectRatio>(ratio.clone()).is_err() {
                return StudioError::Validation(format!(
                    "Unsupported aspect ratio: {}. Use 1:1, 16:9 or 9:16.",
                    ratio
                ));
            }
        }
        match value.get("images") {
            None | Some(Value::Array(_)) => {}
            Some(_) => return StudioError::Validation(NO_IMAGES_MESSAGE.into()),
        }
    }

    StudioError::Validation(format!("Malformed {} request: {}", action, err))
}

/// Validates requests and dispatches them to the model.
pub struct ProxyHandler {
    model: Arc<dyn ImageModel>,
    secret: Option<ApiKey>,
}

impl ProxyHandler {
    /// Creates a handler for `model`.
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self {
            model,
            secret: None,
        }
    }

    /// Scrubs this credential from every outgoing error message.
    pub fn redacting(mut self, secret: ApiKey) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Runs a validated action against the model and returns the JSON body.
    pub async fn dispatch(&self, action: ProxyAction) -> Result<Value> {
        match action {
            ProxyAction::Generate { prompt } => {
                let image = self.model.generate(&prompt).await?;
                Ok(serde_json::to_value(GenerateResponse {
                    image_url: Some(image.to_data_url()),
                })?)
            }
            ProxyAction::Edit {
                prompt,
                images,
                aspect_ratio,
            } => {
                let prompt = match aspect_ratio {
                    Some(ratio) => ratio.apply_to(&prompt),
                    None => prompt,
                };
                let output = self.model.edit(&prompt, &images).await?;
                Ok(serde_json::to_value(EditResponse {
                    image_url: Some(output.image.to_data_url()),
                    text: output.text,
                })?)
            }
        }
    }

    /// Full request path: method check, parsing, dispatch, error shaping.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> Response {
        if *method != Method::POST {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "POST")],
                Json(ErrorBody {
                    error: "Method not allowed. Use POST.".into(),
                }),
            )
                .into_response();
        }

        let start = Instant::now();
        let action = match ProxyAction::parse(body) {
            Ok(action) => action,
            Err(e) => return self.error_response(None, e),
        };
        let name = action.name();

        match self.dispatch(action).await {
            Ok(body) => {
                tracing::info!(
                    action = name,
                    model = self.model.name(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "request completed"
                );
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(e) => self.error_response(Some(name), e),
        }
    }

    fn error_response(&self, action: Option<&str>, err: StudioError) -> Response {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut message = err.public_message();
        if let Some(ref secret) = self.secret {
            if !secret.expose().is_empty() {
                message = message.replace(secret.expose(), "[REDACTED]");
            }
        }

        if status.is_client_error() {
            tracing::debug!(action = action.unwrap_or("-"), %message, "rejected request");
        } else {
            tracing::error!(action = action.unwrap_or("-"), %message, "request failed");
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn handle_request(
    State(handler): State<Arc<ProxyHandler>>,
    method: Method,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => handler.handle(&method, &body).await,
        Err(_) if method != Method::POST => handler.handle(&method, &[]).await,
        Err(rejection) => {
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                StudioError::TooLarge("Request body is too large.".into())
            } else {
                StudioError::Validation("Request body could not be read.".into())
            };
            handler.error_response(None, err)
        }
    }
}

/// Builds the router serving `handler` at `path`.
pub fn router(handler: Arc<ProxyHandler>, path: &str) -> Router {
    router_with_body_limit(handler, path, MAX_BODY_BYTES)
}

/// Like [`router`], with a custom request body limit in bytes.
pub fn router_with_body_limit(handler: Arc<ProxyHandler>, path: &str, limit: usize) -> Router {
    Router::new()
        .route(path, any(handle_request))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(handler)
}

/// Resolves the credential, binds the listener and serves until `shutdown` resolves.
///
/// A missing credential is returned as [`StudioError::Config`] before
/// anything is bound.
pub async fn serve<F>(config: ProxyConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let key = config.resolve_credential().await?;
    let model = config.build_model(&key)?;

    tracing::info!(
        bind = %config.bind,
        path = %config.endpoint_path,
        generate_model = %model.generate_model(),
        edit_model = %model.edit_model(),
        "starting proxy"
    );

    let handler = Arc::new(ProxyHandler::new(Arc::new(model)).redacting(key));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, router(handler, &config.endpoint_path))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("proxy stopped");
    Ok(())
}
