//! Routing of unsolicited `incoming_event` pushes.

use crate::{error::RtmError, session::RtmClient};
use async_trait::async_trait;
use livechat_core::{
    BotIdentity, TriggerRule,
    protocol::{ChatMessage, IncomingEvent, action},
};
use tracing::{debug, info};

/// Receives every decoded `incoming_event` from the session's receive loop.
///
/// Handlers run inline in the receive loop, so they must not wait on
/// [`RtmClient::request`]: the response could only be read after they return.
/// Fire-and-forget [`RtmClient::send_request`] is fine.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_incoming_event(&self, client: &RtmClient, event: IncomingEvent)
    -> Result<(), RtmError>;
}

/// The trigger-word bot.
#[derive(Debug, Clone)]
pub struct BotHandler {
    rule: TriggerRule,
    bot: BotIdentity,
}

impl BotHandler {
    pub fn new(rule: TriggerRule, bot: BotIdentity) -> Self {
        Self { rule, bot }
    }

    /// Replies to a single chat message when the rule says so.
    pub async fn on_incoming_message(
        &self,
        client: &RtmClient,
        message: ChatMessage<'_>,
    ) -> Result<(), RtmError> {
        let Some(reply) = self.rule.reply_to(&message, &self.bot) else {
            debug!(chat_id = message.chat_id, author_id = message.author_id, "No reply needed");
            return Ok(());
        };
        info!(chat_id = message.chat_id, trigger = %self.rule.trigger, "Trigger matched, replying");
        client.send_request(action::SEND_EVENT, true, reply).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn on_incoming_event(
        &self,
        client: &RtmClient,
        event: IncomingEvent,
    ) -> Result<(), RtmError> {
        match event.as_message() {
            Some(message) => self.on_incoming_message(client, message).await,
            None => {
                debug!(kind = %event.event.kind, "Ignoring non-message event");
                Ok(())
            }
        }
    }
}
