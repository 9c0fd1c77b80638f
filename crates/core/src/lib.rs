//! Pure building blocks of the LiveChat bot: the RTM wire protocol and the
//! trigger-word rule. Nothing in this crate touches the network.

pub mod bot;
pub mod protocol;

pub use bot::{BotIdentity, TriggerRule};
pub use protocol::ProtocolError;
