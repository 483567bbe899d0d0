//! Error types for the studio, its client and its proxy.

/// Maximum number of characters of an upstream error body that is kept.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating or editing images.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// Request rejected before reaching the model (bad input, missing fields).
    #[error("{0}")]
    Validation(String),

    /// Request body over the proxy's size limit.
    #[error("{0}")]
    TooLarge(String),

    /// Fatal startup misconfiguration (e.g. no credential resolvable).
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential missing or rejected by the model service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Model service returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status of the upstream response.
        status: u16,
        /// Upstream error message, already sanitized.
        message: String,
    },

    /// Content was blocked by the model's safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The model answered but produced no image.
    #[error("{0}")]
    NoImage(String),

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Error message reported by the proxy, surfaced verbatim.
    #[error("{0}")]
    Request(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (reading uploads, saving results).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode base64 or a data URL.
    #[error("failed to decode: {0}")]
    Decode(String),
}

impl StudioError {
    /// Returns true if the caller deliberately stopped the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status the proxy answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::TooLarge(_) => 413,
            _ => 500,
        }
    }

    /// Human readable message that is safe to send to a browser.
    ///
    /// Transport, parsing and configuration failures may carry internal
    /// detail, so they collapse to generic wording.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::TooLarge(msg)
            | Self::NoImage(msg)
            | Self::Request(msg)
            | Self::UnexpectedResponse(msg) => sanitize_error_message(msg),
            Self::ContentBlocked(msg) => {
                format!("The request was blocked: {}", sanitize_error_message(msg))
            }
            Self::Api { status, message } => format!(
                "Image model error ({}): {}",
                status,
                sanitize_error_message(message)
            ),
            Self::Auth(_) => "The image model rejected the server credential.".to_string(),
            Self::Cancelled => "Request cancelled.".to_string(),
            Self::Network(_) => "Failed to reach the image model service.".to_string(),
            Self::Json(_) | Self::Decode(_) => {
                "Unexpected response from the image model service.".to_string()
            }
            Self::Config(_) | Self::Io(_) => "Internal server error.".to_string(),
        }
    }
}

/// Redacts API-key-shaped tokens and truncates long upstream messages.
pub fn sanitize_error_message(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_ERROR_MESSAGE_LEN));
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("key=") {
            out.push_str("key=[REDACTED]");
            rest = skip_token(after);
        } else if rest.starts_with("AIza") {
            out.push_str("[REDACTED]");
            rest = skip_token(rest);
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
    }

    let trimmed = out.trim();
    if trimmed.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}

fn skip_token(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(s.len());
    &s[end..]
}

/// Result type alias for studio operations.
pub type Result<T> = std::result::Result<T, StudioError>;
