//! Request orchestration for the studio UI.
//!
//! A [`Studio`] owns the observable [`StudioState`] and at most one tracked
//! request. Starting a request cancels and supersedes the tracked one;
//! [`Studio::stop`] cancels it and clears the loading state immediately.
//! A completion is applied only while its request is still the tracked
//! one, so a late or superseded result never touches the state.

mod state;

pub use state::{too_many_images_message, StudioState, CANCELLED_MESSAGE, NO_IMAGES_MESSAGE};

use crate::client::StudioBackend;
use crate::error::{Result, StudioError};
use crate::image::{effective_prompt, AspectRatio, EditResult, Mode, SourceImage, MAX_SOURCE_IMAGES};
use futures::future::try_join_all;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum Outcome {
    Generated(String),
    Edited(EditResult),
}

struct ActiveRequest {
    id: u64,
    mode: Mode,
    cancel: CancellationToken,
}

struct Inner<B> {
    backend: B,
    state: watch::Sender<StudioState>,
    active: Mutex<Option<ActiveRequest>>,
    next_id: AtomicU64,
}

impl<B: StudioBackend> Inner<B> {
    fn active(&self) -> MutexGuard<'_, Option<ActiveRequest>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new tracked request, cancelling the previous one.
    fn begin(&self, mode: Mode) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();

        let mut active = self.active();
        if let Some(previous) = active.take() {
            tracing::debug!(id = previous.id, mode = %previous.mode, "superseding request");
            previous.cancel.cancel();
        }
        *active = Some(ActiveRequest {
            id,
            mode,
            cancel: cancel.clone(),
        });
        self.state.send_modify(|s| s.begin(mode));
        drop(active);

        tracing::info!(id, %mode, "request started");
        (id, cancel)
    }

    fn finish(&self, id: u64, result: Result<Outcome>) {
        let mut active = self.active();
        if !matches!(active.as_ref(), Some(a) if a.id == id) {
            tracing::debug!(id, "ignoring completion of a request that is no longer tracked");
            return;
        }
        *active = None;

        match result {
            Ok(outcome) => {
                tracing::info!(id, "request completed");
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    match outcome {
                        Outcome::Generated(url) => {
                            s.generated_image = Some(url);
                            s.status_text = "Image generated.".to_string();
                        }
                        Outcome::Edited(result) => {
                            s.edit_result = Some(result);
                            s.status_text = "Image edited.".to_string();
                        }
                    }
                });
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!(id, "request cancelled");
                self.state.send_modify(|s| s.cancelled());
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "request failed");
                self.state.send_modify(|s| s.failed(e.to_string()));
            }
        }
    }

    fn set_error(&self, message: String) {
        self.state.send_modify(|s| s.error = Some(message));
    }
}

/// Handle to a started request.
#[derive(Debug)]
pub struct RequestHandle {
    id: u64,
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Sequence number of the request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits until the request has completed and its outcome was applied
    /// (or discarded, if it was superseded).
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(id = self.id, error = %e, "request task ended abnormally");
        }
    }
}

/// The studio orchestrator. Cheap to clone; clones share state.
pub struct Studio<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Studio<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StudioBackend> Studio<B> {
    /// Creates a studio talking to `backend`.
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(StudioState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                state,
                active: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Receives every state change.
    pub fn subscribe(&self) -> watch::Receiver<StudioState> {
        self.inner.state.subscribe()
    }

    /// A copy of the current state.
    pub fn state(&self) -> StudioState {
        self.inner.state.borrow().clone()
    }

    /// Whether a request is in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// Starts generating an image. A blank prompt uses the default prompt.
    pub fn start_generate(&self, prompt: &str) -> RequestHandle {
        let prompt = effective_prompt(Mode::Generate, prompt);
        let (id, cancel) = self.inner.begin(Mode::Generate);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.backend.generate(&prompt, &cancel).await;
            inner.finish(id, result.map(Outcome::Generated));
        });
        RequestHandle { id, task }
    }

    /// Starts editing the queued source images.
    ///
    /// The queue is handed to the request and cleared. With no images
    /// queued this fails with a validation error and sends nothing.
    pub fn start_edit(&self, prompt: &str) -> Result<RequestHandle> {
        let (images, aspect_ratio) = {
            let state = self.inner.state.borrow();
            (state.source_images.clone(), state.aspect_ratio)
        };
        if images.is_empty() {
            self.inner.set_error(NO_IMAGES_MESSAGE.to_string());
            return Err(StudioError::Validation(NO_IMAGES_MESSAGE.into()));
        }

        let prompt = effective_prompt(Mode::Edit, prompt);
        let (id, cancel) = self.inner.begin(Mode::Edit);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner
                .backend
                .edit(&prompt, &images, aspect_ratio, &cancel)
                .await;
            inner.finish(id, result.map(Outcome::Edited));
        });
        Ok(RequestHandle { id, task })
    }

    /// Cancels the tracked request. Returns false when nothing was in flight.
    pub fn stop(&self) -> bool {
        let mut active = self.inner.active();
        let Some(request) = active.take() else {
            return false;
        };
        request.cancel.cancel();
        self.inner.state.send_modify(|s| s.cancelled());
        tracing::info!(id = request.id, mode = %request.mode, "request stopped");
        true
    }

    /// Loads image files and queues them for the next edit.
    ///
    /// The batch is all-or-nothing: if any file is not an image, or the
    /// queue would exceed [`MAX_SOURCE_IMAGES`], nothing is added.
    pub async fn add_source_images<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize> {
        let queued = self.inner.state.borrow().source_images.len();
        if queued + paths.len() > MAX_SOURCE_IMAGES {
            let message = too_many_images_message();
            self.inner.set_error(message.clone());
            return Err(StudioError::Validation(message));
        }

        let images = match try_join_all(paths.iter().map(SourceImage::from_path)).await {
            Ok(images) => images,
            Err(e) => {
                self.inner.set_error(e.to_string());
                return Err(e);
            }
        };
        self.add_loaded_images(images)
    }

    /// Queues already loaded images with the same all-or-nothing rule.
    pub fn add_loaded_images(&self, images: Vec<SourceImage>) -> Result<usize> {
        let count = images.len();
        let mut accepted = false;
        self.inner.state.send_modify(|s| {
            if s.source_images.len() + count <= MAX_SOURCE_IMAGES {
                s.source_images.extend(images);
                s.error = None;
                accepted = true;
            } else {
                s.error = Some(too_many_images_message());
            }
        });

        if accepted {
            tracing::debug!(count, "queued source images");
            Ok(count)
        } else {
            Err(StudioError::Validation(too_many_images_message()))
        }
    }

    /// Removes the queued image at `index`.
    pub fn remove_source_image(&self, index: usize) -> Option<SourceImage> {
        let mut removed = None;
        self.inner.state.send_if_modified(|s| {
            if index < s.source_images.len() {
                removed = Some(s.source_images.remove(index));
                true
            } else {
                false
            }
        });
        removed
    }

    /// Empties the source image queue.
    pub fn clear_source_images(&self) {
        self.inner.state.send_modify(|s| s.source_images.clear());
    }

    /// Sets the output proportions for edits.
    pub fn set_aspect_ratio(&self, aspect_ratio: Option<AspectRatio>) {
        self.inner.state.send_modify(|s| s.aspect_ratio = aspect_ratio);
    }

    /// Clears the displayed error.
    pub fn dismiss_error(&self) {
        self.inner.state.send_if_modified(|s| s.error.take().is_some());
    }
}
