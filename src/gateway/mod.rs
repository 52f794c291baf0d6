// src/gateway/mod.rs - Remote sync gateway (REST boundary)

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport failure, timeout or server-side (5xx) error.
    #[error("gateway unreachable: {0}")]
    Unavailable(String),

    /// The server answered with a non-success status.
    #[error("gateway rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Worth trying again on the next scheduled attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }

    /// On a session-scoped call, the server no longer knows the session.
    pub fn is_session_gone(&self) -> bool {
        matches!(
            self,
            GatewayError::Rejected {
                status: 404 | 409 | 410,
                ..
            }
        )
    }
}

/// Server acknowledgement of a started session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAck {
    pub session_id: String,
    /// Server-side start time, when the server reports one.
    pub started_at: Option<DateTime<Utc>>,
}

/// Operations the session engine needs from the platform.
///
/// All calls are fallible, latency-bearing network calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncGateway: Send + Sync {
    async fn fetch_contract_rate(&self, contract_id: &str) -> Result<f64, GatewayError>;

    async fn begin_session(&self, contract_id: &str) -> Result<SessionAck, GatewayError>;

    async fn end_session(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Upload a PNG and attach it to the session. Returns the artifact id.
    async fn upload_artifact(&self, session_id: &str, image: Vec<u8>)
        -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub remaining_budget: f64,
    pub cost_per_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkSessionStatus {
    InProgress,
    Pending,
    Approved,
    Rejected,
    Paid,
    #[serde(other)]
    Unknown,
}

/// A session as recorded by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: WorkSessionStatus,
}

impl WorkSession {
    /// Open sessions are measured up to `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        let end = self.end_date.unwrap_or(now);
        (end - self.start_date).max(chrono::Duration::zero())
    }

    /// `"{h}h {mm}m"`
    pub fn duration_label(&self, now: DateTime<Utc>) -> String {
        let minutes = self.duration(now).num_minutes();
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }

    pub fn is_pending(&self) -> bool {
        self.status == WorkSessionStatus::Pending
    }
}

/// An artifact attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    pub id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// A session together with the artifacts attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSessionDetail {
    #[serde(flatten)]
    pub session: WorkSession,
    #[serde(default)]
    pub files: Vec<SessionFile>,
}
