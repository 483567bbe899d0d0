#![warn(missing_docs)]
//! GenStudio - prompt-driven image generation and editing.
//!
//! The crate has three layers:
//!
//! - [`proxy`]: an HTTP endpoint that holds the model credential and
//!   forwards `generate` / `edit` actions to the remote image models.
//! - [`client`]: a typed client for that endpoint, with cooperative
//!   cancellation.
//! - [`studio`]: the request orchestrator a UI drives. It tracks one
//!   request at a time, supports stopping it, and exposes observable state.
//!
//! # Quick Start - Proxy
//!
//! ```no_run
//! use genstudio::ProxyConfig;
//!
//! #[tokio::main]
//! async fn main() -> genstudio::Result<()> {
//!     let config = ProxyConfig::from_env()?;
//!     genstudio::proxy::serve(config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! # Quick Start - Studio
//!
//! ```no_run
//! use genstudio::{Studio, StudioClient};
//!
//! #[tokio::main]
//! async fn main() -> genstudio::Result<()> {
//!     let client = StudioClient::builder()
//!         .endpoint("http://127.0.0.1:8787/api/studio")
//!         .build()?;
//!     let studio = Studio::new(client);
//!     studio.start_generate("A golden retriever puppy").finished().await;
//!     println!("{:?}", studio.state().generated_image.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `server` (default): the axum proxy.
//! - `cli` (default): the `genstudio` command-line tool.

mod error;

pub mod api;
pub mod client;
pub mod config;
pub mod image;
pub mod secrets;
pub mod studio;

#[cfg(feature = "server")]
pub mod proxy;

// Re-export error types at crate root
pub use error::{sanitize_error_message, Result, StudioError};

pub use client::{StudioBackend, StudioClient, StudioClientBuilder};
pub use config::{ApiKey, CredentialSource, ProxyConfig, SecretStoreConfig};
pub use image::{
    AspectRatio, EditResult, GeminiModel, GeminiModelBuilder, ImageFormat, ImageModel, Mode,
    SourceImage, MAX_SOURCE_IMAGES,
};
pub use studio::{RequestHandle, Studio, StudioState};

#[cfg(feature = "server")]
pub use proxy::{ProxyAction, ProxyHandler};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{StudioBackend, StudioClient};
    pub use crate::error::{Result, StudioError};
    pub use crate::image::{AspectRatio, EditResult, Mode, SourceImage};
    pub use crate::studio::{RequestHandle, Studio, StudioState};
}
