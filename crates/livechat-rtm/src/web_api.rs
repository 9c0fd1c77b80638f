//! Minimal client for the agent Web API (HTTP `action` endpoints).

use crate::{error::RtmError, token::TokenProvider};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default base URL of the agent Web API.
pub const DEFAULT_BASE_URL: &str = "https://api.livechatinc.com/v3.0";

/// Payload of the `get_archives` action. Both fields are passed through verbatim.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ArchivesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
}

#[derive(Serialize)]
struct ActionRequest<'a, P> {
    action: &'a str,
    payload: P,
}

pub struct WebApiClient {
    http: reqwest::Client,
    base_url: String,
    token_provider: Arc<dyn TokenProvider>,
}

impl WebApiClient {
    pub fn new(base_url: impl Into<String>, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_provider,
        }
    }

    /// Lists archived chats visible to the authenticated agent.
    #[instrument(skip_all)]
    pub async fn get_archives(&self, query: &ArchivesQuery) -> Result<Value, RtmError> {
        self.call("get_archives", query).await
    }

    async fn call<P: Serialize>(&self, action: &str, payload: P) -> Result<Value, RtmError> {
        let token = self.token_provider.access_token().await?;
        let url = format!("{}/agent/action/{}", self.base_url, action);
        debug!(%url, "Calling Web API");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&ActionRequest { action, payload })
            .send()
            .await
            .map_err(|e| RtmError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RtmError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| {
                    body.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(RtmError::ProtocolFailure {
                action: action.to_string(),
                request_id: None,
                message,
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| RtmError::Transport(format!("invalid response body: {e}")))
    }
}
