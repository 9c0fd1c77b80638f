//! LiveChat Bot Service Library Crate
//!
//! Configuration, the session supervisor and the small HTTP surface used to
//! start the bot on demand. The `bot` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod supervisor;
