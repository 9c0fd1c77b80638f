//! Axum Router Configuration

use crate::{handlers, state::AppState};
use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the HTTP surface that triggers and inspects the bot session.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/bot",
            get(handlers::bot_status)
                .post(handlers::start_bot)
                .delete(handlers::stop_bot),
        )
        .route("/archives", get(handlers::list_archives))
        .with_state(app_state)
}
