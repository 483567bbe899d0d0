//! Core types for image generation and editing.

use crate::error::{StudioError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum number of source images an edit may carry.
pub const MAX_SOURCE_IMAGES: usize = 8;

/// Prompt used when a generate request arrives blank.
pub const DEFAULT_GENERATE_PROMPT: &str =
    "A breathtaking landscape at golden hour, highly detailed digital art";

/// Instruction used when an edit request arrives blank.
pub const DEFAULT_EDIT_PROMPT: &str =
    "Enhance this image: improve the lighting, sharpen the details and make the colors more vibrant";

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG format (lossless).
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
    /// GIF format.
    Gif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Attempts to detect format from a MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
            return Some(Self::WebP);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        None
    }
}

/// Which of the two studio operations a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Text-to-image generation.
    Generate,
    /// Instruction-driven editing of source images.
    Edit,
}

impl Mode {
    /// The prompt substituted when the user leaves the prompt blank.
    pub fn default_prompt(&self) -> &'static str {
        match self {
            Self::Generate => DEFAULT_GENERATE_PROMPT,
            Self::Edit => DEFAULT_EDIT_PROMPT,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Edit => write!(f, "edit"),
        }
    }
}

/// Returns the prompt to send: the user's text, or the mode default if blank.
pub fn effective_prompt(mode: Mode, prompt: &str) -> String {
    if prompt.trim().is_empty() {
        mode.default_prompt().to_string()
    } else {
        prompt.to_string()
    }
}

/// Output aspect ratios an edit may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square aspect ratio.
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 16:9 landscape (widescreen) aspect ratio.
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16 portrait (tall) aspect ratio.
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }

    /// Instruction appended to an edit prompt. Square adds nothing.
    pub fn instruction_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Square => None,
            Self::Landscape => {
                Some(" Compose the output as a wide landscape image with a 16:9 aspect ratio.")
            }
            Self::Portrait => {
                Some(" Compose the output as a tall portrait image with a 9:16 aspect ratio.")
            }
        }
    }

    /// Appends the aspect ratio instruction to a prompt when needed.
    pub fn apply_to(&self, prompt: &str) -> String {
        match self.instruction_suffix() {
            Some(suffix) => format!("{}{}", prompt, suffix),
            None => prompt.to_string(),
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1:1" | "square" => Ok(Self::Square),
            "16:9" | "landscape" => Ok(Self::Landscape),
            "9:16" | "portrait" => Ok(Self::Portrait),
            other => Err(StudioError::Validation(format!(
                "Unsupported aspect ratio: {}",
                other
            ))),
        }
    }
}

/// An image returned by the model: base64 payload plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// MIME type declared by the model.
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl InlineImage {
    /// Wraps the payload into a self-describing data URL.
    pub fn to_data_url(&self) -> String {
        to_data_url(&self.mime_type, &self.data)
    }
}

/// Builds a `data:<mime>;base64,<payload>` string.
pub fn to_data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Splits a base64 data URL into its MIME type and payload.
pub fn parse_data_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| StudioError::Decode("not a data URL".into()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| StudioError::Decode("data URL is not base64 encoded".into()))?;
    Ok((mime, payload))
}

/// Decodes a base64 data URL into its MIME type and raw bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let (mime, payload) = parse_data_url(url)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| StudioError::Decode(e.to_string()))?;
    Ok((mime.to_string(), bytes))
}

/// A user-supplied image held client-side until an edit is submitted.
///
/// Only constructible from image bytes, so `data_url` is always a valid
/// base64 data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    name: String,
    data_url: String,
    mime_type: String,
}

impl SourceImage {
    /// Builds a source image from raw bytes, rejecting anything that is not an image.
    ///
    /// The MIME type is declared from the file name's extension and falls
    /// back to the content's magic bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let format = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .or_else(|| ImageFormat::from_magic_bytes(bytes))
            .ok_or_else(|| {
                StudioError::Validation(format!("\"{}\" is not a supported image file.", name))
            })?;

        let mime_type = format.mime_type().to_string();
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(Self {
            data_url: to_data_url(&mime_type, &data),
            name,
            mime_type,
        })
    }

    /// Reads and encodes an image file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, &bytes)
    }

    /// File name the image was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The image as a data URL.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Declared MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload without the data URL prefix.
    pub fn base64_data(&self) -> &str {
        parse_data_url(&self.data_url)
            .map(|(_, payload)| payload)
            .unwrap_or_default()
    }
}

/// Outcome of an edit: the resulting image and any caption the model wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditResult {
    /// Resulting image as a data URL.
    pub image_url: String,
    /// Newline-joined text parts, if the model returned any.
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"hello world!"), None);
    }

    #[test]
    fn test_format_from_extension_and_mime() {
        assert_eq!(ImageFormat::from_extension("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("txt"), None);
        assert_eq!(
            ImageFormat::from_mime_type("image/webp"),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_mime_type("text/plain"), None);
    }

    #[test]
    fn test_blank_prompts_use_mode_default() {
        for blank in ["", "   ", "\n\t "] {
            assert_eq!(effective_prompt(Mode::Generate, blank), DEFAULT_GENERATE_PROMPT);
            assert_eq!(effective_prompt(Mode::Edit, blank), DEFAULT_EDIT_PROMPT);
        }
        assert_eq!(effective_prompt(Mode::Edit, " make it blue "), " make it blue ");
    }

    #[test]
    fn test_aspect_ratio_serde_and_suffix() {
        assert_eq!(
            serde_json::to_string(&AspectRatio::Landscape).unwrap(),
            "\"16:9\""
        );
        let parsed: AspectRatio = serde_json::from_str("\"9:16\"").unwrap();
        assert_eq!(parsed, AspectRatio::Portrait);

        assert_eq!(AspectRatio::Square.apply_to("Add a hat"), "Add a hat");
        let wide = AspectRatio::Landscape.apply_to("Add a hat");
        assert!(wide.starts_with("Add a hat "));
        assert!(wide.contains("16:9"));
    }

    #[test]
    fn test_aspect_ratio_from_str() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert_eq!("portrait".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert!("4:3".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_data_url_helpers() {
        let url = to_data_url("image/png", "AAAA");
        assert_eq!(url, "data:image/png;base64,AAAA");
        assert_eq!(parse_data_url(&url).unwrap(), ("image/png", "AAAA"));

        let (mime, bytes) = decode_data_url("data:image/jpeg;base64,/9j/").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);

        assert!(parse_data_url("https://example.com/a.png").is_err());
    }

    #[test]
    fn test_source_image_from_bytes() {
        let image = SourceImage::from_bytes("cat.png", &PNG_MAGIC).unwrap();
        assert_eq!(image.name(), "cat.png");
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.data_url(), "data:image/png;base64,iVBORw0KGgoAAAAA");
        assert_eq!(image.base64_data(), "iVBORw0KGgoAAAAA");

        let sniffed = SourceImage::from_bytes("upload", &JPEG_MAGIC).unwrap();
        assert_eq!(sniffed.mime_type(), "image/jpeg");
        assert_eq!(sniffed.base64_data(), "/9j/4AAAAAAAAAAA");
    }

    #[test]
    fn test_format_extension_matches_detection() {
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP, ImageFormat::Gif] {
            assert_eq!(ImageFormat::from_extension(format.extension()), Some(format));
            assert_eq!(ImageFormat::from_mime_type(format.mime_type()), Some(format));
        }
    }

    #[test]
    fn test_source_image_rejects_non_images() {
        let err = SourceImage::from_bytes("notes.txt", b"just some text").unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
        assert!(err.to_string().contains("notes.txt"));
    }
}
