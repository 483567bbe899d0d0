//! JSON contract between the studio client and the proxy.
//!
//! Requests are `{ "action": "generate" | "edit", ... }` objects posted to a
//! single endpoint; responses are either a success body or `{ "error": ... }`.

use crate::image::{AspectRatio, SourceImage};
use serde::{Deserialize, Serialize};

/// A request the client sends to the proxy.
///
/// Missing `prompt`, `images` and image fields decode as empty so the proxy
/// can report which one is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionRequest {
    /// Text-to-image generation.
    Generate {
        /// Prompt describing the image.
        #[serde(default)]
        prompt: String,
    },
    /// Edit of one or more source images.
    Edit {
        /// Edit instruction.
        #[serde(default)]
        prompt: String,
        /// Images to edit.
        #[serde(default)]
        images: Vec<WireImage>,
        /// Requested output proportions.
        #[serde(rename = "aspectRatio", skip_serializing_if = "Option::is_none")]
        aspect_ratio: Option<AspectRatio>,
    },
}

/// An image entry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireImage {
    /// Base64-encoded bytes, without a data URL prefix.
    #[serde(default)]
    pub base64_data: String,
    /// Declared MIME type.
    #[serde(default)]
    pub mime_type: String,
}

impl From<&SourceImage> for WireImage {
    fn from(image: &SourceImage) -> Self {
        Self {
            base64_data: image.base64_data().to_string(),
            mime_type: image.mime_type().to_string(),
        }
    }
}

/// Successful answer to a generate action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// The generated image as a data URL.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Successful answer to an edit action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    /// The edited image as a data URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Caption text from the model, or null.
    #[serde(default)]
    pub text: Option<String>,
}

/// Body of every failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_request_shape() {
        let req = ActionRequest::Generate {
            prompt: "A fox".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"action": "generate", "prompt": "A fox"})
        );
    }

    #[test]
    fn test_edit_request_shape() {
        let req = ActionRequest::Edit {
            prompt: "Add a hat".into(),
            images: vec![WireImage {
                base64_data: "AAAA".into(),
                mime_type: "image/png".into(),
            }],
            aspect_ratio: Some(AspectRatio::Portrait),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "action": "edit",
                "prompt": "Add a hat",
                "images": [{"base64Data": "AAAA", "mimeType": "image/png"}],
                "aspectRatio": "9:16"
            })
        );

        let req = ActionRequest::Edit {
            prompt: "Add a hat".into(),
            images: vec![],
            aspect_ratio: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("aspectRatio").is_none());
    }

    #[test]
    fn test_edit_request_decodes_with_missing_fields() {
        let req: ActionRequest = serde_json::from_value(json!({
            "action": "edit",
            "images": [{"mimeType": "image/png"}]
        }))
        .unwrap();
        assert_eq!(
            req,
            ActionRequest::Edit {
                prompt: String::new(),
                images: vec![WireImage {
                    base64_data: String::new(),
                    mime_type: "image/png".into(),
                }],
                aspect_ratio: None,
            }
        );
    }

    #[test]
    fn test_edit_response_null_text() {
        let resp: EditResponse =
            serde_json::from_str(r#"{"imageUrl": "data:image/png;base64,AAAA", "text": null}"#)
                .unwrap();
        assert_eq!(resp.image_url.as_deref(), Some("data:image/png;base64,AAAA"));
        assert!(resp.text.is_none());
    }
}
