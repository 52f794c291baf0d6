// src/capture/command.rs - Capture by running an external screenshot tool
//
// The tool writes a PNG to stdout (grim, screencapture, maim, ...).

use async_trait::async_trait;
use tokio::process::Command;

use super::{CaptureError, CaptureProvider};
use crate::infra::config::CaptureConfig;

pub struct CommandCapture {
    program: String,
    args: Vec<String>,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl CaptureProvider for CommandCapture {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CaptureError::Unavailable(format!("'{}' not found on PATH", self.program))
                }
                _ => CaptureError::Io(e),
            })?;

        if !output.status.success() {
            return Err(CaptureError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
