//! LiveChat agent RTM client.
//!
//! - `session`: the long-lived connection, its state machine and request correlation.
//! - `transport`: frame-level duplex channels (websocket and in-memory).
//! - `keepalive`: the periodic pinger.
//! - `router`: dispatch of incoming chat events, including the trigger-word bot.
//! - `token`: access-token supply.
//! - `web_api`: the HTTP side of the agent API.

pub mod error;
pub mod keepalive;
pub mod router;
pub mod session;
pub mod token;
pub mod transport;
pub mod web_api;

pub use error::RtmError;
pub use router::{BotHandler, EventHandler};
pub use session::{RtmClient, Session, SessionConfig, SessionState};
pub use token::{StaticTokenProvider, TokenProvider};
pub use transport::{ChannelTransport, Frame, Transport, WsTransport};
pub use web_api::WebApiClient;
