//! Remote model service trait.

use crate::error::Result;
use crate::image::types::InlineImage;
use async_trait::async_trait;

/// An image the proxy forwards to the model for editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Declared MIME type.
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// What the model produced for an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutput {
    /// First image part in the response.
    pub image: InlineImage,
    /// Text parts joined with newlines, in response order.
    pub text: Option<String>,
}

/// A hosted generative-image model.
///
/// The proxy talks to the model only through this trait, so tests can
/// substitute a fake.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Generates exactly one image from a text prompt.
    async fn generate(&self, prompt: &str) -> Result<InlineImage>;

    /// Edits the reference images according to the instruction, asking for
    /// both image and text output.
    async fn edit(&self, prompt: &str, images: &[ReferenceImage]) -> Result<EditOutput>;

    /// Returns the name of this model for logs.
    fn name(&self) -> &str;
}
