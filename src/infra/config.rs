// src/infra/config.rs - Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::infra::errors::TrackerError;
use crate::infra::paths;
use crate::tracking::schedule::CaptureWindow;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub state: StateConfig,
}

/// Cadences for the session engine. All values are validated by
/// [`TrackingConfig::validate`] before an engine is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub accrual_interval_secs: u64,
    pub capture_interval_min_secs: u64,
    pub capture_interval_max_secs: u64,
    /// Longest a publish may wait on one slow observer before dropping the snapshot for it.
    #[serde(default = "default_dispatch_budget_ms")]
    pub dispatch_budget_ms: u64,
    /// Per-observer queue depth.
    #[serde(default = "default_observer_queue")]
    pub observer_queue: usize,
}

fn default_dispatch_budget_ms() -> u64 {
    250
}

fn default_observer_queue() -> usize {
    64
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            accrual_interval_secs: 1,
            capture_interval_min_secs: 60,
            capture_interval_max_secs: 600,
            dispatch_budget_ms: default_dispatch_budget_ms(),
            observer_queue: default_observer_queue(),
        }
    }
}

impl TrackingConfig {
    pub fn accrual_interval(&self) -> Duration {
        Duration::from_secs(self.accrual_interval_secs)
    }

    pub fn dispatch_budget(&self) -> Duration {
        Duration::from_millis(self.dispatch_budget_ms)
    }

    pub fn capture_window(&self) -> Result<CaptureWindow, TrackerError> {
        CaptureWindow::new(
            Duration::from_secs(self.capture_interval_min_secs),
            Duration::from_secs(self.capture_interval_max_secs),
        )
    }

    /// Fail fast on values the engine cannot run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.accrual_interval_secs == 0 {
            return Err(TrackerError::ConfigurationInvalid(
                "accrual_interval_secs must be positive".into(),
            ));
        }
        if self.dispatch_budget_ms == 0 {
            return Err(TrackerError::ConfigurationInvalid(
                "dispatch_budget_ms must be positive".into(),
            ));
        }
        if self.observer_queue == 0 {
            return Err(TrackerError::ConfigurationInvalid(
                "observer_queue must be positive".into(),
            ));
        }
        self.capture_window().map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "FLSURF_TOKEN".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.flsurf.ru".into(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        url::Url::parse(&self.base_url).map_err(|e| {
            TrackerError::ConfigurationInvalid(format!(
                "gateway.base_url '{}' is not a URL: {}",
                self.base_url, e
            ))
        })?;
        if self.timeout_secs == 0 {
            return Err(TrackerError::ConfigurationInvalid(
                "gateway.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

/// External screenshot command. Its stdout is taken as the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                command: "screencapture".into(),
                args: vec!["-x".into(), "-t".into(), "png".into(), "/dev/stdout".into()],
            }
        } else {
            Self {
                command: "grim".into(),
                args: vec!["-t".into(), "png".into(), "-".into()],
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Write current-session.json / session-history.jsonl for external monitoring.
    pub enabled: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
