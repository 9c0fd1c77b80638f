//! Message-framed duplex transports for the RTM session.
//!
//! The session never talks to a socket directly. It splits a [`Transport`]
//! into a [`FrameSink`] owned by the single writer task and a [`FrameSource`]
//! owned by the receive loop.

use crate::error::RtmError;
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::Message as WsMessage,
};
use tracing::debug;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// The write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), RtmError>;
    async fn close(&mut self) -> Result<(), RtmError>;
}

/// The read half of a transport. `None` means the peer went away.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Option<Result<Frame, RtmError>>;
}

/// A connected, long-lived duplex channel.
pub trait Transport: Send {
    type Sink: FrameSink + 'static;
    type Source: FrameSource + 'static;

    fn split(self) -> (Self::Sink, Self::Source);
}

// --- Websocket transport ---

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A websocket connection dialed with `tokio-tungstenite`.
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    /// Dials the RTM endpoint.
    pub async fn connect(url: &str) -> Result<Self, RtmError> {
        let (stream, response) = connect_async(url).await?;
        debug!(status = %response.status(), "Websocket handshake complete");
        Ok(Self { stream })
    }
}

impl Transport for WsTransport {
    type Sink = WsSink;
    type Source = WsSource;

    fn split(self) -> (WsSink, WsSource) {
        let (tx, rx) = self.stream.split();
        (WsSink(tx), WsSource(rx))
    }
}

pub struct WsSink(SplitSink<WsStream, WsMessage>);

pub struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), RtmError> {
        let msg = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Ping(data) => WsMessage::Ping(data.into()),
            Frame::Pong(data) => WsMessage::Pong(data.into()),
            Frame::Close => WsMessage::Close(None),
        };
        self.0.send(msg).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RtmError> {
        self.0.close().await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<Result<Frame, RtmError>> {
        loop {
            let msg = match self.0.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            let frame = match msg {
                WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
                WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Frame::Text(text),
                    Err(_) => {
                        debug!(len = data.len(), "Skipping non-UTF-8 binary frame");
                        continue;
                    }
                },
                WsMessage::Ping(data) => Frame::Ping(data.to_vec()),
                WsMessage::Pong(data) => Frame::Pong(data.to_vec()),
                WsMessage::Close(_) => Frame::Close,
                WsMessage::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}

// --- In-memory transport ---

/// An in-memory transport backed by tokio channels.
///
/// [`ChannelTransport::pair`] returns the transport together with the
/// [`ChannelPeer`] that plays the server side.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<Result<Frame, RtmError>>,
}

/// The remote end of a [`ChannelTransport`].
pub struct ChannelPeer {
    /// Frames written by the session.
    pub outbound: mpsc::UnboundedReceiver<Frame>,
    /// Frames (or read errors) to deliver to the session.
    pub inbound: mpsc::UnboundedSender<Result<Frame, RtmError>>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            ChannelTransport {
                outbound: out_tx,
                inbound: in_rx,
            },
            ChannelPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }
}

impl ChannelPeer {
    /// Delivers a text frame to the session.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Ok(Frame::Text(text.into()))).is_ok()
    }
}

impl Transport for ChannelTransport {
    type Sink = ChannelSink;
    type Source = ChannelSource;

    fn split(self) -> (ChannelSink, ChannelSource) {
        (ChannelSink(Some(self.outbound)), ChannelSource(self.inbound))
    }
}

pub struct ChannelSink(Option<mpsc::UnboundedSender<Frame>>);

pub struct ChannelSource(mpsc::UnboundedReceiver<Result<Frame, RtmError>>);

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> Result<(), RtmError> {
        let tx = self.0.as_ref().ok_or(RtmError::SessionClosed)?;
        tx.send(frame)
            .map_err(|_| RtmError::Transport("peer dropped".to_string()))
    }

    async fn close(&mut self) -> Result<(), RtmError> {
        self.0.take();
        Ok(())
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Option<Result<Frame, RtmError>> {
        self.0.recv().await
    }
}
