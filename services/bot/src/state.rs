//! Shared Application State

use crate::supervisor::Supervisor;
use livechat_rtm::WebApiClient;
use std::sync::Arc;

/// Created once at startup and handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub web_api: Arc<WebApiClient>,
}
