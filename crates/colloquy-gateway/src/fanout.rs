//! Cluster bus → live sockets.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use colloquy_core::bus::ClusterBus;
use colloquy_core::store::ConversationStore;
use colloquy_types::events::{ClusterEvent, GatewayEvent};
use colloquy_types::models::Conversation;
use colloquy_types::topics::GATEWAY_TOPICS;

use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct FanOut {
    dispatcher: Dispatcher,
    conversations: Arc<dyn ConversationStore>,
}

impl FanOut {
    pub fn new(dispatcher: Dispatcher, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            dispatcher,
            conversations,
        }
    }

    /// Subscribes to every gateway topic, one relay task per topic.
    ///
    /// Subscriptions are in place when this returns.
    pub fn spawn(self, bus: &dyn ClusterBus) -> Vec<JoinHandle<()>> {
        GATEWAY_TOPICS
            .iter()
            .map(|&topic| {
                let mut rx = bus.subscribe(topic);
                let fanout = self.clone();
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(event) => fanout.deliver(event).await,
                            Err(RecvError::Lagged(n)) => {
                                warn!("Fan-out on {} lagged by {} events", topic, n);
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    debug!("Fan-out on {} stopped", topic);
                })
            })
            .collect()
    }

    /// Routes one cluster event to the sockets that should see it.
    pub async fn deliver(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::Submitted(_) => {
                trace!("Ignoring submitted message, waiting for the stored one");
            }
            ClusterEvent::MessageReceived { room, message } => {
                let channel = message.channel;
                self.deliver_to_conversation(channel, GatewayEvent::Message { room, message })
                    .await;
            }
            ClusterEvent::UserTyping(event) => {
                let channel = event.message.channel;
                self.deliver_to_conversation(
                    channel,
                    GatewayEvent::UserTyping {
                        room: event.room,
                        message: event.message,
                    },
                )
                .await;
            }
            ClusterEvent::UserMention {
                room,
                message,
                for_user,
            } => {
                self.dispatcher
                    .send_to_user(for_user, GatewayEvent::UserMention { room, message })
                    .await;
            }
            ClusterEvent::UserState { user_id, state } => {
                self.dispatcher
                    .broadcast(GatewayEvent::UserState { user_id, state })
                    .await;
            }
            ClusterEvent::ChannelCreated(conversation) => {
                let scoped = conversation.clone();
                self.deliver_to(&scoped, GatewayEvent::ChannelCreation(conversation))
                    .await;
            }
            ClusterEvent::TopicUpdated(update) => {
                self.dispatcher
                    .broadcast(GatewayEvent::TopicUpdated(update))
                    .await;
            }
        }
    }

    /// Members only for confidential groups and direct messages, the whole
    /// namespace for open channels. Creation announcements follow the same
    /// rule.
    async fn deliver_to_conversation(&self, channel: Uuid, event: GatewayEvent) {
        let conversation = match self.conversations.get_by_id(channel).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!("Dropping event for unknown conversation {}", channel);
                return;
            }
            Err(e) => {
                warn!("Dropping event for conversation {}: {}", channel, e);
                return;
            }
        };

        self.deliver_to(&conversation, event).await;
    }

    async fn deliver_to(&self, conversation: &Conversation, event: GatewayEvent) {
        if conversation.kind.is_membership_scoped() {
            let mut sent = 0;
            for member in conversation.member_ids() {
                sent += self.dispatcher.send_to_user(member, event.clone()).await;
            }
            trace!(
                "Delivered to {} member connections of {}",
                sent, conversation.id
            );
        } else {
            let sent = self.dispatcher.broadcast(event).await;
            trace!("Delivered to {} connections for {}", sent, conversation.id);
        }
    }
}
