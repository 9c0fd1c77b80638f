//! Axum handlers that let an operator drive the bot session.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use livechat_rtm::{RtmError, web_api::ArchivesQuery};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::error;

use crate::{
    state::AppState,
    supervisor::{SupervisorError, SupervisorStatus},
};

pub enum ApiError {
    Unauthorized(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::BadGateway(message) => {
                error!("Upstream API error: {}", message);
                (StatusCode::BAD_GATEWAY, message)
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::NotAuthenticated => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<RtmError> for ApiError {
    fn from(err: RtmError) -> Self {
        match err {
            RtmError::Token(_) => ApiError::Unauthorized(err.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

/// Starts the bot session on demand.
pub async fn start_bot(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let started = state.supervisor.start().await?;
    let status = if started {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "started": started }))))
}

pub async fn bot_status(State(state): State<Arc<AppState>>) -> Json<SupervisorStatus> {
    Json(state.supervisor.status().await)
}

pub async fn stop_bot(State(state): State<Arc<AppState>>) -> StatusCode {
    state.supervisor.stop().await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize, Debug, Default)]
pub struct ArchivesParams {
    /// Page cursor from a previous response.
    pub page_id: Option<String>,
    pub limit: Option<u32>,
}

impl ArchivesParams {
    /// Builds the upstream `pagination` object from the fields actually given.
    fn pagination(&self) -> Option<Value> {
        let mut pagination = Map::new();
        if let Some(page_id) = &self.page_id {
            pagination.insert("page_id".to_string(), json!(page_id));
        }
        if let Some(limit) = self.limit {
            pagination.insert("limit".to_string(), json!(limit));
        }
        (!pagination.is_empty()).then_some(Value::Object(pagination))
    }
}

/// Lists archived chats through the Web API.
pub async fn list_archives(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArchivesParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = ArchivesQuery {
        filters: None,
        pagination: params.pagination(),
    };
    Ok(Json(state.web_api.get_archives(&query).await?))
}
