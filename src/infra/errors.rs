// src/infra/errors.rs - Error types for the session tracker

use thiserror::Error;

use crate::capture::CaptureError;
use crate::gateway::GatewayError;
use crate::tracking::state::SessionStatus;

#[derive(Error, Debug)]
pub enum TrackerError {
    // Caller errors (recoverable)
    #[error("A session is already in progress (engine is {status})")]
    AlreadyActive { status: SessionStatus },

    // Gateway errors surfaced by start/stop
    #[error("Gateway unavailable during {operation}: {source}")]
    GatewayUnavailable {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },

    // Loop-internal errors (logged, never fatal)
    #[error("Screen capture failed: {0}")]
    CaptureFailed(#[from] CaptureError),

    #[error("Artifact upload failed: {0}")]
    UploadFailed(#[source] GatewayError),

    // Construction
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrackerError {
    pub fn gateway(operation: &'static str, source: GatewayError) -> Self {
        TrackerError::GatewayUnavailable { operation, source }
    }

    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            TrackerError::GatewayUnavailable { source, .. } => source.is_transient(),
            TrackerError::UploadFailed(source) => source.is_transient(),
            TrackerError::CaptureFailed(_) => true,
            _ => false,
        }
    }
}
