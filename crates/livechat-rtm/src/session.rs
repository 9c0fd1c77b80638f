//! The RTM session client.
//!
//! A [`Session`] owns one connection for its whole lifetime. Starting it
//! spawns a single writer task (every outbound frame, pings included, goes
//! through its queue) and a keepalive task, logs in, and then blocks in the
//! receive loop until shutdown or a fatal error.
//!
//! [`RtmClient`] is the cloneable handle used to talk to a running session:
//! fire-and-forget requests, correlated requests with a timeout, state
//! observation and shutdown.

use crate::{
    error::RtmError,
    keepalive::{self, run_keepalive},
    router::EventHandler,
    token::TokenProvider,
    transport::{Frame, FrameSink, FrameSource, Transport},
};
use livechat_core::{
    BotIdentity,
    protocol::{self, LoginPayload, Request, Response, action},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Default time to wait for a correlated response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const WRITER_QUEUE_CAPACITY: usize = 64;

/// Connection lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    AwaitingLoginAck,
    Authenticated,
    /// Terminal. The session has been torn down after a fatal error.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::AwaitingLoginAck => "awaiting_login_ack",
            SessionState::Authenticated => "authenticated",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tunables of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identity used for requests sent "as the bot".
    pub bot: BotIdentity,
    pub ping_interval: Duration,
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(bot: BotIdentity) -> Self {
        Self {
            bot,
            ping_interval: keepalive::PING_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// A frame queued for the writer task, with an optional write acknowledgement.
pub(crate) struct Outbound {
    pub(crate) frame: Frame,
    ack: Option<oneshot::Sender<Result<(), RtmError>>>,
}

impl Outbound {
    pub(crate) fn frame(frame: Frame) -> Self {
        Self { frame, ack: None }
    }
}

struct Pending {
    action: String,
    tx: oneshot::Sender<Result<Response, RtmError>>,
}

struct ClientInner {
    writer: mpsc::Sender<Outbound>,
    pending: Mutex<HashMap<String, Pending>>,
    bot: BotIdentity,
    request_timeout: Duration,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

/// Handle to a session.
#[derive(Clone)]
pub struct RtmClient {
    inner: Arc<ClientInner>,
}

impl RtmClient {
    /// Sends a request without waiting for its response.
    ///
    /// Returns the generated request identifier once the frame has been
    /// written. Any later response carrying a failure is only logged.
    pub async fn send_request<P: Serialize>(
        &self,
        action: &str,
        as_bot: bool,
        payload: P,
    ) -> Result<String, RtmError> {
        let request = self.build_request(action, as_bot, payload);
        let raw = protocol::encode_request(&request)?;
        self.write_text(raw).await?;
        info!(action, request_id = %request.request_id, "API request sent");
        Ok(request.request_id)
    }

    /// Sends a request and waits for the response with the matching `request_id`.
    ///
    /// A `success: false` reply fails only this call with
    /// [`RtmError::ProtocolFailure`]; the session keeps running.
    pub async fn request<P: Serialize>(
        &self,
        action: &str,
        as_bot: bool,
        payload: P,
    ) -> Result<Response, RtmError> {
        let mut request = self.build_request(action, as_bot, payload);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            while pending.contains_key(&request.request_id) {
                request.request_id = protocol::generate_request_id();
            }
            pending.insert(
                request.request_id.clone(),
                Pending {
                    action: action.to_string(),
                    tx,
                },
            );
        }
        let request_id = request.request_id.clone();

        let sent = match protocol::encode_request(&request) {
            Ok(raw) => self.write_text(raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            self.inner.pending.lock().await.remove(&request_id);
            return Err(e);
        }
        debug!(action, %request_id, "Awaiting correlated response");

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RtmError::SessionClosed),
            Err(_) => {
                self.inner.pending.lock().await.remove(&request_id);
                warn!(action, %request_id, "Request timed out");
                Err(RtmError::Timeout(request_id))
            }
        }
    }

    /// Requests a deterministic shutdown of the session.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn bot_identity(&self) -> &BotIdentity {
        &self.inner.bot
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn build_request<P>(&self, action: &str, as_bot: bool, payload: P) -> Request<P> {
        let request = Request::new(action, payload);
        if as_bot {
            request.as_author(self.inner.bot.as_str())
        } else {
            request
        }
    }

    async fn write_text(&self, raw: String) -> Result<(), RtmError> {
        if self.is_closed() {
            return Err(RtmError::SessionClosed);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        let outbound = Outbound {
            frame: Frame::Text(raw),
            ack: Some(ack_tx),
        };
        self.inner
            .writer
            .send(outbound)
            .await
            .map_err(|_| RtmError::SessionClosed)?;
        ack_rx.await.map_err(|_| RtmError::SessionClosed)?
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.inner.state.send_replace(next);
        if prev != next {
            info!(from = %prev, to = %next, "Session state changed");
        }
    }

    /// Routes a response to its waiting caller. Returns `false` if nobody waits for it.
    async fn complete(&self, response: &Response) -> bool {
        let Some(request_id) = response.request_id.as_deref() else {
            return false;
        };
        let Some(pending) = self.inner.pending.lock().await.remove(request_id) else {
            return false;
        };
        let result = if response.is_failure() {
            Err(failure(response, Some(pending.action)))
        } else {
            Ok(response.clone())
        };
        let _ = pending.tx.send(result);
        true
    }

    async fn fail_pending(&self) {
        let drained: Vec<_> = self.inner.pending.lock().await.drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Failing requests still in flight");
        }
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(RtmError::SessionClosed));
        }
    }

    #[cfg(test)]
    async fn pending_len(&self) -> usize {
        self.inner.pending.lock().await.len()
    }
}

fn failure(response: &Response, action: Option<String>) -> RtmError {
    let message = response
        .error()
        .map(|e| {
            if e.kind.is_empty() {
                e.message
            } else {
                format!("{}: {}", e.kind, e.message)
            }
        })
        .unwrap_or_else(|| "server reported failure".to_string());
    RtmError::ProtocolFailure {
        action: action.unwrap_or_else(|| response.action.clone()),
        request_id: response.request_id.clone(),
        message,
    }
}

/// One live connection to the RTM API.
pub struct Session {
    client: RtmClient,
    writer_rx: mpsc::Receiver<Outbound>,
    ping_interval: Duration,
    token_provider: Arc<dyn TokenProvider>,
    handler: Arc<dyn EventHandler>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        token_provider: Arc<dyn TokenProvider>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (writer, writer_rx) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        let (state, _) = watch::channel(SessionState::Disconnected);
        let client = RtmClient {
            inner: Arc::new(ClientInner {
                writer,
                pending: Mutex::new(HashMap::new()),
                bot: config.bot,
                request_timeout: config.request_timeout,
                cancel: CancellationToken::new(),
                state,
            }),
        };
        Self {
            client,
            writer_rx,
            ping_interval: config.ping_interval,
            token_provider,
            handler,
        }
    }

    /// Returns a handle to this session, usable before and while it runs.
    pub fn client(&self) -> RtmClient {
        self.client.clone()
    }

    /// Runs the session over an already-dialed transport.
    ///
    /// Blocks until [`RtmClient::shutdown`] is called (returns `Ok`) or a fatal
    /// error occurs (returns it, state becomes [`SessionState::Failed`]).
    pub async fn start<T: Transport>(self, transport: T) -> Result<(), RtmError> {
        let Session {
            client,
            writer_rx,
            ping_interval,
            token_provider,
            handler,
        } = self;

        let (sink, mut source) = transport.split();
        let cancel = client.inner.cancel.clone();
        client.set_state(SessionState::Connected);

        let mut writer = tokio::spawn(
            run_writer(sink, writer_rx, cancel.clone()).instrument(info_span!("rtm_writer")),
        );
        let keepalive = tokio::spawn(
            run_keepalive(client.inner.writer.clone(), ping_interval, cancel.clone())
                .instrument(info_span!("rtm_keepalive")),
        );

        let mut writer_done = false;
        let result = match login(&client, token_provider.as_ref()).await {
            Ok(()) => {
                receive_loop(&client, handler.as_ref(), &mut source, &mut writer, &mut writer_done)
                    .await
            }
            Err(e) => Err(e),
        };
        // Only `RtmClient::shutdown` cancels before teardown.
        let result = match result {
            Err(e) if cancel.is_cancelled() => {
                debug!(error = %e, "Session stopped while starting up");
                Ok(())
            }
            other => other,
        };

        match &result {
            Ok(()) => {
                info!("Session shut down");
                client.set_state(SessionState::Disconnected);
            }
            Err(e) => {
                error!(error = %e, "Session terminated");
                client.set_state(SessionState::Failed);
            }
        }

        cancel.cancel();
        client.fail_pending().await;
        if !writer_done {
            join_quietly(writer).await;
        }
        join_quietly(keepalive).await;
        result
    }
}

async fn login(client: &RtmClient, token_provider: &dyn TokenProvider) -> Result<(), RtmError> {
    let token = token_provider.access_token().await?;
    let payload = LoginPayload::bearer(token.expose_secret());
    client.send_request(action::LOGIN, false, payload).await?;
    client.set_state(SessionState::AwaitingLoginAck);
    Ok(())
}

async fn receive_loop<S: FrameSource>(
    client: &RtmClient,
    handler: &dyn EventHandler,
    source: &mut S,
    writer: &mut JoinHandle<Result<(), RtmError>>,
    writer_done: &mut bool,
) -> Result<(), RtmError> {
    let cancel = client.inner.cancel.clone();
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            joined = &mut *writer, if !*writer_done => {
                *writer_done = true;
                return match joined {
                    Ok(Ok(())) if cancel.is_cancelled() => Ok(()),
                    Ok(Ok(())) => Err(RtmError::SessionClosed),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(RtmError::Transport(format!("writer task failed: {e}"))),
                };
            }
            frame = source.recv() => frame,
        };

        match frame {
            None | Some(Ok(Frame::Close)) => return Err(RtmError::ConnectionClosed),
            Some(Err(e)) => return Err(e),
            Some(Ok(Frame::Text(raw))) => dispatch(client, handler, &raw).await?,
            Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => debug!("Control frame received"),
        }
    }
}

/// Handles one inbound text frame. Only errors that end the session are returned.
async fn dispatch(client: &RtmClient, handler: &dyn EventHandler, raw: &str) -> Result<(), RtmError> {
    debug!(raw, "API message received");

    let response = match protocol::decode_response(raw) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Dropping malformed frame");
            return Ok(());
        }
    };

    if response.action == action::LOGIN {
        return match response.success {
            Some(true) => {
                client.set_state(SessionState::Authenticated);
                Ok(())
            }
            Some(false) => Err(failure(&response, None)),
            None => {
                debug!("Login response without a success flag");
                Ok(())
            }
        };
    }

    if client.complete(&response).await {
        return Ok(());
    }

    if response.is_failure() {
        warn!(error = %failure(&response, None), "Uncorrelated request failed");
        return Ok(());
    }

    match response.action.as_str() {
        action::INCOMING_EVENT => {
            let event = match protocol::decode_incoming_event(&response) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable incoming_event");
                    return Ok(());
                }
            };
            match handler.on_incoming_event(client, event).await {
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    warn!(error = %e, "Event handler failed");
                    Ok(())
                }
                Ok(()) => Ok(()),
            }
        }
        other => {
            debug!(action = other, "Ignoring unhandled action");
            Ok(())
        }
    }
}

/// The only task allowed to write to the transport.
async fn run_writer<S: FrameSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) -> Result<(), RtmError> {
    let result = loop {
        let outbound = tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(()),
            outbound = rx.recv() => outbound,
        };
        let Some(Outbound { frame, ack }) = outbound else {
            break Ok(());
        };
        match sink.send(frame).await {
            Ok(()) => {
                if let Some(ack) = ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(e) => {
                if let Some(ack) = ack {
                    let reason = match &e {
                        RtmError::Transport(reason) => reason.clone(),
                        other => other.to_string(),
                    };
                    let _ = ack.send(Err(RtmError::Transport(reason)));
                }
                // Left to the receive loop, which turns this into a session failure.
                break Err(e);
            }
        }
    };

    rx.close();
    if result.is_ok() {
        let _ = sink.send(Frame::Close).await;
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Error while closing transport");
    }
    result
}

async fn join_quietly<T>(handle: JoinHandle<T>) {
    if let Err(e) = handle.await {
        warn!(error = %e, "Session task did not finish cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{token::MockTokenProvider, transport::{ChannelPeer, ChannelTransport}};
    use async_trait::async_trait;
    use livechat_core::protocol::IncomingEvent;
    use secrecy::SecretString;
    use serde_json::{Value, json};

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Recorder {
        events: std::sync::Mutex<Vec<IncomingEvent>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn on_incoming_event(
            &self,
            _client: &RtmClient,
            event: IncomingEvent,
        ) -> Result<(), RtmError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn token_provider() -> Arc<dyn TokenProvider> {
        let mut provider = MockTokenProvider::new();
        provider
            .expect_access_token()
            .returning(|| Ok(SecretString::from("dal:test".to_string())));
        Arc::new(provider)
    }

    fn session_with(handler: Arc<dyn EventHandler>, timeout: Duration) -> Session {
        let mut config = SessionConfig::new(BotIdentity::new("BOT1"));
        config.request_timeout = timeout;
        Session::new(config, token_provider(), handler)
    }

    /// Splits a peer so its outbound side can be dropped while the inbound side stays open.
    fn stop_reading(peer: ChannelPeer) -> mpsc::UnboundedSender<Result<Frame, RtmError>> {
        let ChannelPeer { outbound, inbound } = peer;
        drop(outbound);
        inbound
    }

    async fn next_text(peer: &mut ChannelPeer) -> Value {
        loop {
            let frame = tokio::time::timeout(WAIT, peer.outbound.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("session closed its sink");
            if let Frame::Text(raw) = frame {
                return serde_json::from_str(&raw).unwrap();
            }
        }
    }

    async fn wait_for_state(client: &RtmClient, wanted: SessionState) {
        let mut rx = client.subscribe_state();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    /// Starts a session and completes the login handshake.
    async fn authenticated(
        handler: Arc<dyn EventHandler>,
        timeout: Duration,
    ) -> (RtmClient, ChannelPeer, JoinHandle<Result<(), RtmError>>) {
        authenticated_session(session_with(handler, timeout)).await
    }

    async fn authenticated_session(
        session: Session,
    ) -> (RtmClient, ChannelPeer, JoinHandle<Result<(), RtmError>>) {
        let client = session.client();
        let (transport, mut peer) = ChannelTransport::pair();
        let handle = tokio::spawn(session.start(transport));

        let login = next_text(&mut peer).await;
        assert_eq!(login["action"], "login");
        assert_eq!(login["payload"]["token"], "Bearer dal:test");
        assert!(login.get("author_id").is_none());

        peer.push_text(
            json!({"request_id": login["request_id"], "action": "login", "type": "response", "success": true, "payload": {}})
                .to_string(),
        );
        wait_for_state(&client, SessionState::Authenticated).await;
        (client, peer, handle)
    }

    #[tokio::test]
    async fn login_ack_authenticates_and_shutdown_disconnects() {
        let (client, mut peer, handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;

        client.shutdown();
        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(client.state(), SessionState::Disconnected);

        // The writer says goodbye before closing the sink.
        let mut saw_close = false;
        while let Some(frame) = peer.outbound.recv().await {
            saw_close |= frame == Frame::Close;
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn rejected_login_fails_the_session() {
        let session = session_with(Arc::new(Recorder::default()), WAIT);
        let client = session.client();
        let (transport, mut peer) = ChannelTransport::pair();
        let handle = tokio::spawn(session.start(transport));

        let login = next_text(&mut peer).await;
        wait_for_state(&client, SessionState::AwaitingLoginAck).await;
        peer.push_text(
            json!({
                "request_id": login["request_id"],
                "action": "login",
                "type": "response",
                "success": false,
                "payload": {"error": {"type": "authentication", "message": "Invalid access token"}}
            })
            .to_string(),
        );

        let err = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap_err();
        match err {
            RtmError::ProtocolFailure { action, message, .. } => {
                assert_eq!(action, "login");
                assert!(message.contains("Invalid access token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let (client, peer, handle) = authenticated(recorder.clone(), WAIT).await;

        peer.push_text("{definitely not json");
        peer.push_text(r#"{"action":"incoming_event","payload":{"event":{"type":"message"}}}"#);
        peer.push_text(
            json!({"action": "incoming_event", "payload": {"chat_id": "C1", "event": {"type": "message", "text": "hi", "author_id": "U1"}}})
                .to_string(),
        );

        tokio::time::timeout(WAIT, async {
            while recorder.events.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(recorder.events.lock().unwrap()[0].chat_id, "C1");
        assert_eq!(client.state(), SessionState::Authenticated);
        assert!(!handle.is_finished());
        client.shutdown();
    }

    #[tokio::test]
    async fn responses_are_correlated_by_request_id() {
        let (client, mut peer, _handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;

        let caller = client.clone();
        let call = tokio::spawn(async move {
            caller.request("list_chats", false, json!({"limit": 10})).await
        });
        let sent = next_text(&mut peer).await;
        assert_eq!(sent["action"], "list_chats");
        assert_eq!(sent["payload"]["limit"], 10);

        // An unrelated failure must not disturb the session or the pending call.
        peer.push_text(r#"{"request_id":"unrelated","action":"send_event","success":false}"#);
        peer.push_text(
            json!({"request_id": sent["request_id"], "action": "list_chats", "type": "response", "success": true, "payload": {"chats_summary": []}})
                .to_string(),
        );

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.action, "list_chats");
        assert_eq!(response.payload["chats_summary"], json!([]));
        assert_eq!(client.pending_len().await, 0);
        assert_eq!(client.state(), SessionState::Authenticated);
        client.shutdown();
    }

    #[tokio::test]
    async fn failed_response_fails_only_its_request() {
        let (client, mut peer, handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request("get_chat", false, json!({})).await });
        let sent = next_text(&mut peer).await;
        peer.push_text(
            json!({"request_id": sent["request_id"], "action": "get_chat", "success": false, "payload": {"error": {"type": "not_found", "message": "Chat not found"}}})
                .to_string(),
        );

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, RtmError::ProtocolFailure { ref action, .. } if action == "get_chat"));
        assert_eq!(client.state(), SessionState::Authenticated);
        assert!(!handle.is_finished());
        client.shutdown();
    }

    #[tokio::test]
    async fn unanswered_request_times_out_and_is_forgotten() {
        let (client, mut peer, _handle) =
            authenticated(Arc::new(Recorder::default()), Duration::from_millis(50)).await;

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.request("get_chat", false, json!({})).await });
        let _ = next_text(&mut peer).await;

        assert!(matches!(call.await.unwrap(), Err(RtmError::Timeout(_))));
        assert_eq!(client.pending_len().await, 0);
        client.shutdown();
    }

    #[tokio::test]
    async fn send_as_bot_sets_author() {
        let (client, mut peer, _handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;

        let id = client
            .send_request("send_event", true, json!({"chat_id": "C1"}))
            .await
            .unwrap();
        let sent = next_text(&mut peer).await;
        assert_eq!(sent["request_id"], id.as_str());
        assert_eq!(sent["author_id"], "BOT1");
        client.shutdown();
    }

    #[tokio::test]
    async fn read_error_is_fatal() {
        let (client, peer, handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;

        peer.inbound
            .send(Err(RtmError::Transport("connection reset".to_string())))
            .unwrap();
        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(RtmError::Transport(_))));
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn server_close_ends_the_session() {
        let (client, peer, handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;

        peer.inbound.send(Ok(Frame::Close)).unwrap();
        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(RtmError::ConnectionClosed)));
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn requests_after_shutdown_are_rejected() {
        let (client, _peer, handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;
        client.shutdown();
        handle.await.unwrap().unwrap();

        let err = client.send_request("send_event", true, json!({})).await.unwrap_err();
        assert!(matches!(err, RtmError::SessionClosed));
    }

    #[tokio::test]
    async fn token_failure_fails_before_login() {
        let mut provider = MockTokenProvider::new();
        provider
            .expect_access_token()
            .returning(|| Err(RtmError::Token("expired".to_string())));
        let session = Session::new(
            SessionConfig::new(BotIdentity::new("BOT1")),
            Arc::new(provider),
            Arc::new(Recorder::default()),
        );
        let client = session.client();
        let (transport, _peer) = ChannelTransport::pair();

        let err = session.start(transport).await.unwrap_err();
        assert!(matches!(err, RtmError::Token(_)));
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn request_write_error_fails_the_session() {
        let (client, peer, handle) = authenticated(Arc::new(Recorder::default()), WAIT).await;
        let _inbound = stop_reading(peer);

        let err = client
            .send_request("send_event", true, json!({"chat_id": "C1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RtmError::Transport(_)));

        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(RtmError::Transport(_))));
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn ping_write_error_fails_the_session() {
        let mut config = SessionConfig::new(BotIdentity::new("BOT1"));
        config.ping_interval = Duration::from_millis(20);
        let session = Session::new(config, token_provider(), Arc::new(Recorder::default()));
        let (client, peer, handle) = authenticated_session(session).await;
        let _inbound = stop_reading(peer);

        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(RtmError::Transport(_))));
        assert_eq!(client.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn shutdown_before_start_is_a_clean_stop() {
        let session = session_with(Arc::new(Recorder::default()), WAIT);
        let client = session.client();
        client.shutdown();

        let (transport, _peer) = ChannelTransport::pair();
        session.start(transport).await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
    }
}
