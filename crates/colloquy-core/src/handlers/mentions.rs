use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use colloquy_types::events::ClusterEvent;
use colloquy_types::models::IncomingEvent;

use super::MessageHandler;
use crate::bus::ClusterBus;
use crate::error::HandlerError;
use crate::store::{ConversationStore, can_read};

/// Publishes one `chat:users:mention` event per mentioned user who can read
/// the conversation. The payload is the normalized message, never the raw
/// client event.
pub struct MentionsNotifier {
    bus: Arc<dyn ClusterBus>,
    conversations: Arc<dyn ConversationStore>,
}

impl MentionsNotifier {
    pub fn new(bus: Arc<dyn ClusterBus>, conversations: Arc<dyn ConversationStore>) -> Self {
        Self { bus, conversations }
    }
}

#[async_trait]
impl MessageHandler for MentionsNotifier {
    fn name(&self) -> &'static str {
        "mentions"
    }

    async fn handle(&self, event: &IncomingEvent) -> Result<(), HandlerError> {
        let message = &event.message;
        if message.user_mentions.is_empty() {
            return Ok(());
        }

        let Some(conversation) = self.conversations.get_by_id(message.channel).await? else {
            debug!("Mentions in vanished conversation {} dropped", message.channel);
            return Ok(());
        };

        let mut notified = Vec::with_capacity(message.user_mentions.len());
        for &mentioned in &message.user_mentions {
            if notified.contains(&mentioned) {
                continue;
            }
            if !can_read(mentioned, &conversation) {
                debug!(
                    "{} mentioned outsider {} in {}",
                    message.creator, mentioned, message.channel
                );
                continue;
            }
            notified.push(mentioned);

            debug!(
                "{} mentioned {} in {}",
                message.creator, mentioned, message.channel
            );
            self.bus
                .publish(ClusterEvent::UserMention {
                    room: event.room.clone(),
                    message: message.normalized(),
                    for_user: mentioned,
                })
                .await?;
        }
        Ok(())
    }
}
