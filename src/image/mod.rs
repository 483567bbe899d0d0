//! Image generation and editing: data model and the remote model client.

mod gemini;
mod model;
mod types;

pub use gemini::{GeminiModel, GeminiModelBuilder, DEFAULT_BASE_URL, DEFAULT_EDIT_MODEL, DEFAULT_GENERATE_MODEL};
pub use model::{EditOutput, ImageModel, ReferenceImage};
pub use types::{
    decode_data_url, effective_prompt, parse_data_url, to_data_url, AspectRatio, EditResult,
    ImageFormat, InlineImage, Mode, SourceImage, DEFAULT_EDIT_PROMPT, DEFAULT_GENERATE_PROMPT,
    MAX_SOURCE_IMAGES,
};
