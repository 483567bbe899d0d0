//! Google generative-image models: Imagen for generation, Gemini for editing.

use crate::error::{sanitize_error_message, Result, StudioError};
use crate::image::model::{EditOutput, ImageModel, ReferenceImage};
use crate::image::types::InlineImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Public endpoint of the Gemini Developer API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Text-to-image model used for `generate`.
pub const DEFAULT_GENERATE_MODEL: &str = "imagen-4.0-generate-001";

/// Multimodal model used for `edit`.
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";

/// MIME type assumed when the model does not declare one.
const FALLBACK_MIME_TYPE: &str = "image/png";

/// Builder for GeminiModel.
#[derive(Debug, Clone, Default)]
pub struct GeminiModelBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    generate_model: Option<String>,
    edit_model: Option<String>,
    client: Option<reqwest::Client>,
}

impl GeminiModelBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Required.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL (regional endpoints, test servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model used for text-to-image generation.
    pub fn generate_model(mut self, model: impl Into<String>) -> Self {
        self.generate_model = Some(model.into());
        self
    }

    /// Sets the model used for image editing.
    pub fn edit_model(mut self, model: impl Into<String>) -> Self {
        self.edit_model = Some(model.into());
        self
    }

    /// Reuses an existing HTTP client.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the model client.
    pub fn build(self) -> Result<GeminiModel> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StudioError::Auth("no API key provided".into()))?;

        Ok(GeminiModel {
            client: self.client.unwrap_or_default(),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            generate_model: self
                .generate_model
                .unwrap_or_else(|| DEFAULT_GENERATE_MODEL.to_string()),
            edit_model: self
                .edit_model
                .unwrap_or_else(|| DEFAULT_EDIT_MODEL.to_string()),
        })
    }
}

/// Client for Google's hosted image models.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    generate_model: String,
    edit_model: String,
}

impl GeminiModel {
    /// Creates a new `GeminiModelBuilder`.
    pub fn builder() -> GeminiModelBuilder {
        GeminiModelBuilder::new()
    }

    /// Model id used for generation.
    pub fn generate_model(&self) -> &str {
        &self.generate_model
    }

    /// Model id used for editing.
    pub fn edit_model(&self) -> &str {
        &self.edit_model
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text));
        }

        Ok(response.json().await?)
    }

    async fn generate_impl(&self, prompt: &str) -> Result<InlineImage> {
        let start = Instant::now();
        let url = self.model_url(&self.generate_model, "predict");
        let body = PredictRequest::single(prompt);

        let response: PredictResponse = self.post(&url, &body).await?;
        let image = response.into_image()?;

        tracing::debug!(
            model = %self.generate_model,
            mime_type = %image.mime_type,
            duration_ms = start.elapsed().as_millis() as u64,
            "image generated"
        );
        Ok(image)
    }

    async fn edit_impl(&self, prompt: &str, images: &[ReferenceImage]) -> Result<EditOutput> {
        let start = Instant::now();
        let url = self.model_url(&self.edit_model, "generateContent");
        let body = GeminiRequest::edit(prompt, images);

        let response: GeminiResponse = self.post(&url, &body).await?;
        let output = response.into_edit_output()?;

        tracing::debug!(
            model = %self.edit_model,
            images = images.len(),
            has_text = output.text.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "image edited"
        );
        Ok(output)
    }
}

#[async_trait]
impl ImageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<InlineImage> {
        self.generate_impl(prompt).await
    }

    async fn edit(&self, prompt: &str, images: &[ReferenceImage]) -> Result<EditOutput> {
        self.edit_impl(prompt, images).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }
}

/// Maps a non-2xx response from the model service to an error.
fn parse_error(status: u16, text: &str) -> StudioError {
    let message = serde_json::from_str::<GoogleErrorBody>(text)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| text.to_string());
    let message = sanitize_error_message(&message);

    if status == 401 || status == 403 {
        return StudioError::Auth(message);
    }
    let lower = message.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return StudioError::ContentBlocked(message);
    }
    StudioError::Api { status, message }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
}

// Imagen predict types
#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
}

impl PredictRequest {
    fn single(prompt: &str) -> Self {
        Self {
            instances: vec![PredictInstance {
                prompt: prompt.to_string(),
            }],
            parameters: PredictParameters { sample_count: 1 },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

impl PredictResponse {
    fn into_image(self) -> Result<InlineImage> {
        let prediction = self
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::NoImage("The model did not generate an image.".into()))?;

        match prediction.bytes_base64_encoded.filter(|b| !b.is_empty()) {
            Some(data) => Ok(InlineImage {
                mime_type: prediction
                    .mime_type
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
                data,
            }),
            None => match prediction.rai_filtered_reason {
                Some(reason) => Err(StudioError::ContentBlocked(reason)),
                None => Err(StudioError::NoImage(
                    "The model returned an empty image.".into(),
                )),
            },
        }
    }
}

// Gemini generateContent types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn edit(prompt: &str, images: &[ReferenceImage]) -> Self {
        // Images first, then the instruction.
        let mut parts: Vec<GeminiRequestPart> = images
            .iter()
            .map(|image| GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            })
            .collect();

        parts.push(GeminiRequestPart::Text {
            text: prompt.to_string(),
        });

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

impl GeminiResponse {
    fn into_edit_output(self) -> Result<EditOutput> {
        // Blocks on the prompt come back as HTTP 200.
        if let Some(feedback) = self.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
                return Err(StudioError::ContentBlocked(msg));
            }
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            StudioError::NoImage("The model did not return an image.".into())
        })?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    return Err(StudioError::ContentBlocked(format!(
                        "Content blocked by the model's safety filter: {}",
                        finish_reason
                    )));
                }
                _ => {} // STOP, MAX_TOKENS, NO_IMAGE fall through to the part scan
            }
        }

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        let mut texts = Vec::new();
        let mut image = None;
        for part in parts {
            if let Some(text) = part.text {
                texts.push(text);
            }
            if image.is_none() {
                if let Some(inline) = part.inline_data.filter(|d| !d.data.is_empty()) {
                    image = Some(InlineImage {
                        mime_type: inline
                            .mime_type
                            .filter(|m| !m.is_empty())
                            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
                        data: inline.data,
                    });
                }
            }
        }

        let text = if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        };

        match image {
            Some(image) => Ok(EditOutput { image, text }),
            None => {
                if let Some(ref text) = text {
                    tracing::debug!(text = %text, "edit response carried text but no image");
                }
                Err(StudioError::NoImage(
                    "The model did not return an image.".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn reference(mime: &str, data: &str) -> ReferenceImage {
        ReferenceImage {
            mime_type: mime.into(),
            data: data.into(),
        }
    }

    #[test]
    fn test_builder_requires_key() {
        assert!(matches!(
            GeminiModelBuilder::new().build(),
            Err(StudioError::Auth(_))
        ));
        assert!(GeminiModelBuilder::new().api_key("  ").build().is_err());

        let model = GeminiModelBuilder::new().api_key("test-key").build().unwrap();
        assert_eq!(model.generate_model(), DEFAULT_GENERATE_MODEL);
        assert_eq!(model.edit_model(), DEFAULT_EDIT_MODEL);
    }

    #[test]
    fn test_model_url_trims_slash() {
        let model = GeminiModel::builder()
            .api_key("k")
            .base_url("http://localhost:9000/")
            .build()
            .unwrap();
        assert_eq!(
            model.model_url("imagen", "predict"),
            "http://localhost:9000/v1beta/models/imagen:predict"
        );
    }

    #[test]
    fn test_predict_request_asks_for_one_image() {
        let json = serde_json::to_value(PredictRequest::single("A fox")).unwrap();
        assert_eq!(json["instances"][0]["prompt"], "A fox");
        assert_eq!(json["parameters"]["sampleCount"], 1);
    }

    #[test]
    fn test_predict_response_default_mime() {
        let resp: PredictResponse =
            serde_json::from_value(json!({"predictions": [{"bytesBase64Encoded": "AAAA"}]}))
                .unwrap();
        let image = resp.into_image().unwrap();
        assert_eq!(image.to_data_url(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_predict_response_empty() {
        let resp: PredictResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(resp.into_image(), Err(StudioError::NoImage(_))));

        let resp: PredictResponse =
            serde_json::from_value(json!({"predictions": [{"bytesBase64Encoded": ""}]})).unwrap();
        assert!(matches!(resp.into_image(), Err(StudioError::NoImage(_))));

        let resp: PredictResponse = serde_json::from_value(
            json!({"predictions": [{"raiFilteredReason": "Filtered by safety"}]}),
        )
        .unwrap();
        assert!(matches!(
            resp.into_image(),
            Err(StudioError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_edit_request_construction() {
        let images = vec![reference("image/png", "AAAA"), reference("image/jpeg", "BBBB")];
        let req = GeminiRequest::edit("Add a hat", &images);
        let json = serde_json::to_value(&req).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "BBBB");
        assert_eq!(parts[2]["text"], "Add a hat");
        assert_eq!(
            json["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn test_edit_response_joins_text_and_takes_first_image() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "note1"},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "FIRST"}},
                    {"text": "note2"},
                    {"inlineData": {"mimeType": "image/png", "data": "SECOND"}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let output = resp.into_edit_output().unwrap();
        assert_eq!(output.image.to_data_url(), "data:image/jpeg;base64,FIRST");
        assert_eq!(output.text.as_deref(), Some("note1\nnote2"));
    }

    #[test]
    fn test_edit_response_without_image() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "I can't help with that."}]}}]
        }))
        .unwrap();
        let err = resp.into_edit_output().unwrap_err();
        assert!(matches!(err, StudioError::NoImage(_)));
        assert_eq!(err.to_string(), "The model did not return an image.");
    }

    #[test]
    fn test_edit_response_blocked() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = resp.into_edit_output().unwrap_err();
        assert_eq!(err.to_string(), "content blocked: Prompt blocked: SAFETY");

        let resp: GeminiResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "IMAGE_SAFETY"}]}))
                .unwrap();
        assert!(matches!(
            resp.into_edit_output(),
            Err(StudioError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_parse_error_uses_google_message() {
        let body = r#"{"error": {"code": 400, "message": "Invalid prompt", "status": "INVALID_ARGUMENT"}}"#;
        match parse_error(400, body) {
            StudioError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid prompt");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(parse_error(403, "denied"), StudioError::Auth(_)));
        assert!(matches!(
            parse_error(400, "request blocked by safety settings"),
            StudioError::ContentBlocked(_)
        ));
    }

    #[tokio::test]
    async fn test_generate_against_mock_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/imagen-test:predict")
                    .header("x-goog-api-key", "test-key")
                    .json_body(json!({
                        "instances": [{"prompt": "A lighthouse"}],
                        "parameters": {"sampleCount": 1}
                    }));
                then.status(200).json_body(json!({
                    "predictions": [{"bytesBase64Encoded": "iVBORw0KGgo=", "mimeType": "image/png"}]
                }));
            })
            .await;

        let model = GeminiModel::builder()
            .api_key("test-key")
            .base_url(server.base_url())
            .generate_model("imagen-test")
            .build()
            .unwrap();

        let image = model.generate("A lighthouse").await.unwrap();
        mock.assert_async().await;
        assert_eq!(image.to_data_url(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[tokio::test]
    async fn test_edit_maps_upstream_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-test:generateContent");
                then.status(503)
                    .json_body(json!({"error": {"code": 503, "message": "The model is overloaded."}}));
            })
            .await;

        let model = GeminiModel::builder()
            .api_key("test-key")
            .base_url(server.base_url())
            .edit_model("gemini-test")
            .build()
            .unwrap();

        let err = model
            .edit("Add a hat", &[reference("image/png", "AAAA")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API error: 503 - The model is overloaded.");
    }
}
