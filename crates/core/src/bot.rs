//! Trigger-word bot rule.
//!
//! The bot is deliberately stateless: every incoming chat message is checked
//! against a single [`TriggerRule`] and produces at most one reply.

use crate::protocol::{ChatMessage, SendEventPayload};

/// The agent identity the bot posts as.
///
/// Messages authored by this identity are never answered, otherwise the
/// bot's own reply would trigger it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity(String);

impl BotIdentity {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self(agent_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the given author is the bot itself.
    pub fn authored(&self, author_id: &str) -> bool {
        self.0 == author_id
    }
}

/// A case-sensitive trigger phrase and the canned reply it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRule {
    pub trigger: String,
    pub reply: String,
}

impl TriggerRule {
    pub fn new(trigger: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            reply: reply.into(),
        }
    }

    /// Whether `text` contains the trigger phrase. An empty trigger matches nothing.
    pub fn matches(&self, text: &str) -> bool {
        !self.trigger.is_empty() && text.contains(&self.trigger)
    }

    /// Decides whether to answer `message`, returning the `send_event` payload if so.
    pub fn reply_to(&self, message: &ChatMessage<'_>, bot: &BotIdentity) -> Option<SendEventPayload> {
        if bot.authored(message.author_id) || !self.matches(message.text) {
            return None;
        }
        Some(SendEventPayload::message(
            message.chat_id,
            &self.reply,
            bot.as_str(),
        ))
    }
}
