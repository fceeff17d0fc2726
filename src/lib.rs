//! # comfyui-client
//!
//! Async Rust client for the [ComfyUI](https://github.com/comfyanonymous/ComfyUI)
//! HTTP and WebSocket API.
//!
//! Every endpoint is a typed method that issues exactly one HTTP request.
//! A single WebSocket per client carries completion events, which
//! [`ComfyClient::get_images`] correlates with a freshly queued prompt before
//! downloading the images it produced.
//!
//! ## Quick Start
//!
//! ```no_run
//! use comfyui_client::{ComfyClient, ConnectionState};
//! use serde_json::json;
//!
//! # async fn example() -> comfyui_client::Result<()> {
//! let client = ComfyClient::new("127.0.0.1:8188", "my-app");
//!
//! if client.connect().await? != ConnectionState::Open {
//!     eprintln!("ComfyUI is not reachable");
//!     return Ok(());
//! }
//!
//! let workflow = json!({
//!     "9": {"class_type": "SaveImage", "inputs": {"images": ["8", 0]}}
//! });
//! let outputs = client.get_images(&workflow).await?;
//! let written = client.save_images(&outputs, "./out").await?;
//! println!("saved {} image(s)", written.len());
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
mod endpoint;
pub mod error;
pub mod events;
mod jobs;
pub mod logging;
mod subscription;
pub mod types;

pub use client::ComfyClient;
pub use config::{ClientConfig, ClientConfigBuilder, Credentials};
pub use connection::ConnectionState;
pub use error::{ComfyError, Result};
pub use events::ServerEvent;
pub use logging::{Level, Logger, NoopLogger, TracingLogger};
pub use types::{
    CollectedImage, History, HistoryEdit, HistoryEntry, ImageRef, ImageUpload, JobOutputs,
    MaskUpload, ProgressUpdate, QueueState, QueueStatus, QueuedPrompt, UploadResult,
};
