use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by ComfyUI client operations.
///
/// Request operations report a non-200 status or an `error` body as
/// `Ok(None)` rather than through this type; the variants here cover
/// everything that prevents an answer from being produced at all.
#[derive(Error, Debug)]
pub enum ComfyError {
    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// WebSocket handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A text frame received over the WebSocket was not a valid event.
    #[error("Malformed WebSocket frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// The operation needs an open WebSocket connection.
    #[error("Not connected: call connect() before waiting on jobs")]
    NotConnected,

    /// The WebSocket closed while a job was still being watched.
    #[error("WebSocket connection closed before the job finished")]
    ConnectionClosed,

    /// A request needed by a composite operation returned no result.
    #[error("ComfyUI rejected the {operation} request")]
    Rejected { operation: &'static str },

    /// The queued workflow had node-level errors.
    #[error("Workflow node errors: {0}")]
    NodeErrors(String),

    /// ComfyUI reported an execution error during generation.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The response from ComfyUI was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// The client configuration cannot be turned into a request.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing an artifact to disk failed.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ComfyError>;
