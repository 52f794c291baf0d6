// src/capture/mod.rs - Screen capture boundary

pub mod command;

use async_trait::async_trait;
use thiserror::Error;

pub use command::CommandCapture;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture unavailable: {0}")]
    Unavailable(String),

    #[error("capture command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("capture IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Takes a screenshot on demand.
///
/// Called only from the capture loop, off any UI thread. An empty result
/// means nothing changed since the last capture and nothing is uploaded.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError>;
}
