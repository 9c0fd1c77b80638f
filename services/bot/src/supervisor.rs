//! Owns the single bot session: starts it on demand, reconnects with
//! exponential backoff after transport failures, and stops it on request.

use async_trait::async_trait;
use livechat_core::{BotIdentity, TriggerRule};
use livechat_rtm::{
    BotHandler, EventHandler, RtmClient, RtmError, Session, SessionConfig, SessionState,
    TokenProvider, WsTransport,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Dials the RTM endpoint and runs a session over the new connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_and_run(&self, session: Session) -> Result<(), RtmError>;
}

/// Connects over a real websocket.
pub struct WsConnector {
    pub url: String,
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect_and_run(&self, session: Session) -> Result<(), RtmError> {
        let transport = WsTransport::connect(&self.url).await?;
        info!(url = %self.url, "Connected to RTM API");
        session.start(transport).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("No access token available; complete the OAuth login first")]
    NotAuthenticated,
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial,
            initial,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Everything needed to build a fresh session for each connection attempt.
#[derive(Clone)]
pub struct BotSettings {
    pub session: SessionConfig,
    pub rule: TriggerRule,
    pub reconnect_max_attempts: u32,
}

impl BotSettings {
    pub fn new(bot: BotIdentity, rule: TriggerRule) -> Self {
        Self {
            session: SessionConfig::new(bot),
            rule,
            reconnect_max_attempts: 5,
        }
    }
}

/// Snapshot reported to the HTTP layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub running: bool,
    pub state: String,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Slot {
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

struct Shared {
    current: Mutex<Option<RtmClient>>,
    last_error: Mutex<Option<String>>,
}

pub struct Supervisor {
    settings: BotSettings,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn Connector>,
    slot: Mutex<Slot>,
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(
        settings: BotSettings,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            settings,
            tokens,
            connector,
            slot: Mutex::new(Slot::default()),
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Starts the bot unless it is already running. Returns whether a new run began.
    pub async fn start(&self) -> Result<bool, SupervisorError> {
        let mut slot = self.slot.lock().await;
        if slot.task.as_ref().is_some_and(|t| !t.is_finished()) {
            info!("Bot session already running");
            return Ok(false);
        }
        if !self.tokens.is_authenticated() {
            return Err(SupervisorError::NotAuthenticated);
        }

        *self.shared.last_error.lock().await = None;
        let cancel = CancellationToken::new();
        let run = run(
            self.settings.clone(),
            self.tokens.clone(),
            self.connector.clone(),
            self.shared.clone(),
            cancel.clone(),
        );
        slot.task = Some(tokio::spawn(run.instrument(info_span!("bot_supervisor"))));
        slot.cancel = Some(cancel);
        info!("Bot session starting");
        Ok(true)
    }

    /// Stops the running session, if any, and waits for it to wind down.
    pub async fn stop(&self) {
        let (task, cancel) = {
            let mut slot = self.slot.lock().await;
            (slot.task.take(), slot.cancel.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(client) = self.shared.current.lock().await.as_ref() {
            client.shutdown();
        }
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Waits until the current run ends on its own.
    pub async fn wait(&self) {
        let task = self.slot.lock().await.task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub async fn status(&self) -> SupervisorStatus {
        let running = self
            .slot
            .lock()
            .await
            .task
            .as_ref()
            .is_some_and(|t| !t.is_finished());
        let state = match self.shared.current.lock().await.as_ref() {
            Some(client) => client.state(),
            None => SessionState::Disconnected,
        };
        SupervisorStatus {
            running,
            state: state.to_string(),
            last_error: self.shared.last_error.lock().await.clone(),
        }
    }
}

async fn run(
    settings: BotSettings,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let handler: Arc<dyn EventHandler> = Arc::new(BotHandler::new(
        settings.rule.clone(),
        settings.session.bot.clone(),
    ));
    let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);
    let mut failures: u32 = 0;

    loop {
        let session = Session::new(settings.session.clone(), tokens.clone(), handler.clone());
        let client = session.client();
        *shared.current.lock().await = Some(client.clone());
        if cancel.is_cancelled() {
            return;
        }

        let mut states = client.subscribe_state();
        let authenticated = tokio::spawn(async move {
            states
                .wait_for(|s| *s == SessionState::Authenticated)
                .await
                .is_ok()
        });
        let result = connector.connect_and_run(session).await;
        authenticated.abort();
        if matches!(authenticated.await, Ok(true)) {
            failures = 0;
            backoff.reset();
        }

        let err = match result {
            Ok(()) => return,
            Err(_) if cancel.is_cancelled() => return,
            Err(e) => e,
        };
        *shared.last_error.lock().await = Some(err.to_string());

        if !err.is_retryable() {
            error!(error = %err, "Bot session failed; not retrying");
            return;
        }
        failures += 1;
        if failures > settings.reconnect_max_attempts {
            error!(error = %err, attempts = failures, "Giving up reconnecting");
            return;
        }

        let delay = backoff.next_delay();
        warn!(error = %err, attempt = failures, ?delay, "Bot session dropped; reconnecting");
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}
