//! Message ingestion: authorize, persist, announce, then run side effects.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use colloquy_types::events::ClusterEvent;
use colloquy_types::models::{Conversation, ConversationType, IncomingEvent, StoredMessage};

use crate::bus::{ClusterBus, LocalReceiver};
use crate::error::PipelineError;
use crate::handlers::HandlerRegistry;
use crate::store::{ConversationStore, MessageStore, SubscriptionStore, UserLookup};
use crate::subscriptions::PrivateConversationIndex;

/// External collaborators of the pipeline.
pub struct Collaborators {
    pub users: Arc<dyn UserLookup>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub bus: Arc<dyn ClusterBus>,
}

/// How an incoming message was disposed of.
#[derive(Debug)]
pub enum Ingested {
    /// Taken over by a forward handler; nothing was stored.
    Forwarded,
    Stored(StoredMessage),
}

pub struct MessagePipeline {
    users: Arc<dyn UserLookup>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    subscriptions: PrivateConversationIndex,
    bus: Arc<dyn ClusterBus>,
    handlers: HandlerRegistry,
}

impl MessagePipeline {
    pub fn new(collaborators: Collaborators, handlers: HandlerRegistry) -> Self {
        Self {
            users: collaborators.users,
            conversations: collaborators.conversations,
            messages: collaborators.messages,
            subscriptions: PrivateConversationIndex::new(collaborators.subscriptions),
            bus: collaborators.bus,
            handlers,
        }
    }

    /// Runs one message through the pipeline.
    ///
    /// Forwardable types go to their handler and nothing else happens. Any
    /// other message is stored at most once; it is announced on the cluster bus
    /// only after it was stored, and generic handler failures never surface
    /// here.
    pub async fn handle_incoming(&self, event: IncomingEvent) -> Result<Ingested, PipelineError> {
        if let Some(forward) = self.handlers.forward_handler(&event.message.kind) {
            let kind = event.message.kind.clone();
            if let Err(e) = forward.forward(event).await {
                warn!("Forward handler for '{}' failed: {}", kind, e);
            }
            return Ok(Ingested::Forwarded);
        }

        let message = &event.message;

        let user = self
            .users
            .get(message.creator)
            .await?
            .ok_or(PipelineError::NoSuchUser(message.creator))?;

        let conversation = self
            .conversations
            .get_by_id(message.channel)
            .await?
            .ok_or(PipelineError::NoSuchConversation(message.channel))?;

        if !self
            .conversations
            .user_can_write(&user, &conversation)
            .await?
        {
            return Err(PipelineError::WriteNotPermitted {
                user: user.id,
                conversation: conversation.id,
            });
        }

        let stored = self.messages.create(message.normalized()).await?;
        debug!("Stored message {} in {}", stored.id, stored.channel);

        if conversation.kind == ConversationType::DirectMessage {
            self.subscribe_members(&conversation).await;
        }

        self.bus
            .publish(ClusterEvent::MessageReceived {
                room: event.room.clone(),
                message: stored.clone(),
            })
            .await?;

        self.handlers.dispatch(&event).await;

        Ok(Ingested::Stored(stored))
    }

    /// Consumes the local queue, one task per message. Messages are not
    /// serialized against each other, not even within a conversation.
    pub fn spawn(self: Arc<Self>, mut rx: LocalReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Message pipeline started");
            while let Some(event) = rx.recv().await {
                let pipeline = self.clone();
                tokio::spawn(async move {
                    let channel = event.message.channel;
                    let creator = event.message.creator;
                    if let Err(e) = pipeline.handle_incoming(event).await {
                        warn!("Dropped message from {} in {}: {}", creator, channel, e);
                    }
                });
            }
            info!("Message pipeline stopped, local queue closed");
        })
    }

    /// Makes sure every member of a direct message follows it. Failures are
    /// logged; the next message in the conversation retries.
    async fn subscribe_members(&self, conversation: &Conversation) {
        for member in conversation.member_ids() {
            if let Err(e) = self
                .subscriptions
                .ensure_subscribed(member, conversation.id)
                .await
            {
                warn!(
                    "Failed to subscribe {} to private conversation {}: {}",
                    member, conversation.id, e
                );
            }
        }
    }
}
