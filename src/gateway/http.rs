// src/gateway/http.rs - REST implementation of the sync gateway

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    ContractDetail, GatewayError, SessionAck, SyncGateway, WorkSession, WorkSessionDetail,
};
use crate::infra::config::GatewayConfig;
use crate::infra::errors::TrackerError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedSession {
    id: String,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        let token = config.token();
        if token.is_none() {
            tracing::warn!(
                "No API token in ${}; requests will be unauthenticated",
                config.token_env
            );
        }
        Self::new(
            config.base_url.clone(),
            token,
            Duration::from_secs(config.timeout_secs),
        )
        .map_err(|e| TrackerError::gateway("connect", e))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("no body").to_string()
        } else {
            body
        };

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(GatewayError::Unavailable(format!("HTTP {}: {}", status, message)))
        } else {
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    pub async fn fetch_contract(&self, contract_id: &str) -> Result<ContractDetail, GatewayError> {
        self.send_json(self.request(
            reqwest::Method::GET,
            &format!("/api/contract/{}", contract_id),
        ))
        .await
    }

    pub async fn list_sessions(&self, contract_id: &str) -> Result<Vec<WorkSession>, GatewayError> {
        self.send_json(
            self.request(reqwest::Method::GET, "/api/work-session/list")
                .query(&[("contractId", contract_id)]),
        )
        .await
    }

    /// One session with the artifacts attached to it.
    pub async fn get_session(&self, session_id: &str) -> Result<WorkSessionDetail, GatewayError> {
        self.send_json(self.request(
            reqwest::Method::GET,
            &format!("/api/work-session/{}", session_id),
        ))
        .await
    }

    pub async fn submit_session(&self, session_id: &str) -> Result<(), GatewayError> {
        self.send(
            self.request(reqwest::Method::POST, "/api/work-session/submit")
                .json(&serde_json::json!({ "sessionId": session_id })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SyncGateway for HttpGateway {
    async fn fetch_contract_rate(&self, contract_id: &str) -> Result<f64, GatewayError> {
        let contract = self.fetch_contract(contract_id).await?;
        if !contract.cost_per_hour.is_finite() || contract.cost_per_hour < 0.0 {
            return Err(GatewayError::Decode(format!(
                "contract {} has invalid hourly rate {}",
                contract_id, contract.cost_per_hour
            )));
        }
        Ok(contract.cost_per_hour)
    }

    async fn begin_session(&self, contract_id: &str) -> Result<SessionAck, GatewayError> {
        let started: StartedSession = self
            .send_json(
                self.request(reqwest::Method::POST, "/api/work-session/start")
                    .json(&serde_json::json!({ "contractId": contract_id })),
            )
            .await?;
        Ok(SessionAck {
            session_id: started.id,
            started_at: started.start_date,
        })
    }

    async fn end_session(&self, session_id: &str) -> Result<(), GatewayError> {
        self.send(
            self.request(reqwest::Method::POST, "/api/work-session/end")
                .json(&serde_json::json!({ "sessionId": session_id })),
        )
        .await?;
        Ok(())
    }

    async fn upload_artifact(
        &self,
        session_id: &str,
        image: Vec<u8>,
    ) -> Result<String, GatewayError> {
        let file_name = format!("{}.png", uuid::Uuid::new_v4());
        let file: CreatedFile = self
            .send_json(
                self.request(reqwest::Method::POST, "/api/file/upload")
                    .query(&[("fileName", file_name.as_str())])
                    .header(reqwest::header::CONTENT_TYPE, "image/png")
                    .body(image),
            )
            .await?;

        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/api/work-session/{}/files", session_id),
            )
            .json(&serde_json::json!({ "fileId": file.id })),
        )
        .await?;

        tracing::debug!("Uploaded {} as file {} for session {}", file_name, file.id, session_id);
        Ok(file.id)
    }
}
