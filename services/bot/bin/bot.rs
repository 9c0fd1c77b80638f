//! Main Entrypoint for the LiveChat Bot Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the token provider, Web API client and session supervisor.
//! 3. Starting the bot session and the HTTP trigger surface.
//! 4. Shutting both down on Ctrl+C.

use anyhow::Context;
use livechat_bot::{
    config::Config,
    router::create_router,
    state::AppState,
    supervisor::{BotSettings, Supervisor, WsConnector},
};
use livechat_core::{BotIdentity, TriggerRule};
use livechat_rtm::{StaticTokenProvider, TokenProvider, WebApiClient};
use std::sync::Arc;
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing bot...");

    // --- 3. Initialize Shared Services ---
    let tokens: Arc<dyn TokenProvider> =
        Arc::new(StaticTokenProvider::new(config.access_token.clone()));

    let mut settings = BotSettings::new(
        BotIdentity::new(config.bot_agent_id.clone()),
        TriggerRule::new(config.trigger_word.clone(), config.trigger_reply.clone()),
    );
    settings.session.ping_interval = config.ping_interval;
    settings.session.request_timeout = config.request_timeout;
    settings.reconnect_max_attempts = config.reconnect_max_attempts;

    let connector = Arc::new(WsConnector {
        url: config.rtm_url.clone(),
    });
    let supervisor = Arc::new(Supervisor::new(settings, tokens.clone(), connector));
    let web_api = Arc::new(WebApiClient::new(config.web_api_url.clone(), tokens));

    // --- 4. Start the Bot ---
    if let Err(e) = supervisor.start().await {
        warn!(error = %e, "Bot not started; trigger it later with POST /bot");
    }

    // --- 5. Start Server ---
    let app = create_router(Arc::new(AppState {
        supervisor: supervisor.clone(),
        web_api,
    }));
    info!(
        bind_address = %config.bind_address,
        trigger = %config.trigger_word,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.stop().await;
    info!("Server has shut down.");
    Ok(())
}
