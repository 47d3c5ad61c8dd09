use std::sync::Arc;

use async_trait::async_trait;

use colloquy_types::models::{IncomingEvent, LastMessage};

use super::MessageHandler;
use crate::error::HandlerError;
use crate::store::ConversationStore;

/// Bumps the unseen mention count of every mentioned member.
pub struct MentionCounter {
    conversations: Arc<dyn ConversationStore>,
}

impl MentionCounter {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }
}

#[async_trait]
impl MessageHandler for MentionCounter {
    fn name(&self) -> &'static str {
        "mention-counter"
    }

    async fn handle(&self, event: &IncomingEvent) -> Result<(), HandlerError> {
        let channel = event.message.channel;
        for &mentioned in &event.message.user_mentions {
            if mentioned == event.message.creator {
                continue;
            }
            self.conversations
                .increment_unseen_mentions(channel, mentioned)
                .await?;
        }
        Ok(())
    }
}

/// Keeps the conversation's last-message summary current.
pub struct LastMessageTracker {
    conversations: Arc<dyn ConversationStore>,
}

impl LastMessageTracker {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }
}

#[async_trait]
impl MessageHandler for LastMessageTracker {
    fn name(&self) -> &'static str {
        "last-message"
    }

    async fn handle(&self, event: &IncomingEvent) -> Result<(), HandlerError> {
        let message = &event.message;
        self.conversations
            .set_last_message(
                message.channel,
                LastMessage {
                    text: message.text.clone(),
                    creator: message.creator,
                    date: message.date,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::testing::{FakeConversations, incoming_event};
    use colloquy_types::models::{ConversationType, Member};

    #[tokio::test]
    async fn counts_mentions_of_others_only() {
        let (author, other) = (Uuid::new_v4(), Uuid::new_v4());
        let conversations = Arc::new(FakeConversations::new());
        let conversation = conversations.insert(
            ConversationType::Confidential,
            vec![Member::new(author), Member::new(other)],
        );

        let mut event = incoming_event();
        event.message.channel = conversation.id;
        event.message.creator = author;
        event.message.user_mentions = vec![author, other];

        MentionCounter::new(conversations.clone())
            .handle(&event)
            .await
            .unwrap();

        let stored = conversations.snapshot(conversation.id).unwrap();
        assert_eq!(stored.member(author).unwrap().unseen_mentions, 0);
        assert_eq!(stored.member(other).unwrap().unseen_mentions, 1);
    }

    #[tokio::test]
    async fn records_last_message() {
        let conversations = Arc::new(FakeConversations::new());
        let conversation = conversations.insert(ConversationType::Open, vec![]);

        let mut event = incoming_event();
        event.message.channel = conversation.id;
        event.message.text = "latest".into();

        LastMessageTracker::new(conversations.clone())
            .handle(&event)
            .await
            .unwrap();

        let last = conversations
            .snapshot(conversation.id)
            .unwrap()
            .last_message
            .unwrap();
        assert_eq!(last.text, "latest");
        assert_eq!(last.creator, event.message.creator);
    }
}
