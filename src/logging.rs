use std::fmt;

pub use tracing::Level;

/// Logging capability handed to a [`ComfyClient`](crate::ComfyClient).
///
/// The client never touches a global logger directly; every diagnostic goes
/// through the instance it was constructed with.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Record one message at the given level.
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

/// Forwards messages to `tracing` under the `comfyui_client` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "comfyui_client", "{message}"),
            Level::WARN => tracing::warn!(target: "comfyui_client", "{message}"),
            Level::INFO => tracing::info!(target: "comfyui_client", "{message}"),
            Level::DEBUG => tracing::debug!(target: "comfyui_client", "{message}"),
            _ => tracing::trace!(target: "comfyui_client", "{message}"),
        }
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _message: &str) {}
}
