//! Observable studio state.

use crate::image::{AspectRatio, EditResult, Mode, SourceImage, MAX_SOURCE_IMAGES};

/// Status shown after the user stops a request.
pub const CANCELLED_MESSAGE: &str = "Request cancelled.";

/// Error shown when an edit is started with no source images.
pub const NO_IMAGES_MESSAGE: &str = "Please upload at least one image to edit.";

/// Error shown when an upload would exceed [`MAX_SOURCE_IMAGES`].
pub fn too_many_images_message() -> String {
    format!("You can upload at most {} images.", MAX_SOURCE_IMAGES)
}

/// Everything a presentation layer needs to render the studio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudioState {
    /// A request is in flight.
    pub is_loading: bool,
    /// Message of the last failure, shown until the next attempt.
    pub error: Option<String>,
    /// Informational progress or outcome line.
    pub status_text: String,
    /// Operation of the tracked (or last tracked) request.
    pub mode: Option<Mode>,
    /// Result of the last generate, as a data URL.
    pub generated_image: Option<String>,
    /// Result of the last edit.
    pub edit_result: Option<EditResult>,
    /// Images queued for the next edit.
    pub source_images: Vec<SourceImage>,
    /// Output proportions requested for edits; `None` sends nothing.
    pub aspect_ratio: Option<AspectRatio>,
}

impl StudioState {
    pub(crate) fn begin(&mut self, mode: Mode) {
        self.is_loading = true;
        self.error = None;
        self.mode = Some(mode);
        match mode {
            Mode::Generate => {
                self.generated_image = None;
                self.status_text = "Generating image...".to_string();
            }
            Mode::Edit => {
                self.edit_result = None;
                self.source_images.clear();
                self.status_text = "Editing image...".to_string();
            }
        }
    }

    pub(crate) fn cancelled(&mut self) {
        self.is_loading = false;
        self.status_text = CANCELLED_MESSAGE.to_string();
    }

    pub(crate) fn failed(&mut self, message: String) {
        self.is_loading = false;
        self.error = Some(message);
        self.status_text.clear();
    }
}
