//! Conversation lifecycle operations that also announce themselves on the bus.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use colloquy_types::events::{ClusterEvent, TopicUpdate};
use colloquy_types::models::{
    Conversation, ConversationType, MemberStatus, NewConversation, Topic,
};
use colloquy_types::topics::DEFAULT_CHANNEL;

use crate::bus::ClusterBus;
use crate::error::{ConversationError, StoreError};
use crate::store::ConversationStore;

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    bus: Arc<dyn ClusterBus>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, bus: Arc<dyn ClusterBus>) -> Self {
        Self { store, bus }
    }

    pub async fn get(&self, id: Uuid) -> Result<Conversation, ConversationError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ConversationError::NotFound(id))
    }

    /// Stores the conversation and announces it on `chat:channel:creation`.
    pub async fn create(&self, new: NewConversation) -> Result<Conversation, ConversationError> {
        let conversation = self.store.create(new).await?;
        info!(
            "Created {} conversation {}",
            conversation.kind.as_str(),
            conversation.id
        );

        if let Err(e) = self
            .bus
            .publish(ClusterEvent::ChannelCreated(conversation.clone()))
            .await
        {
            warn!("Failed to announce conversation {}: {}", conversation.id, e);
        }
        Ok(conversation)
    }

    /// Open channels. The default channel is created when there are none.
    pub async fn list_channels(&self) -> Result<Vec<Conversation>, ConversationError> {
        let channels = self.store.list(ConversationType::Open).await?;
        if !channels.is_empty() {
            return Ok(channels);
        }

        let general = self
            .create(NewConversation {
                kind: ConversationType::Open,
                name: Some(DEFAULT_CHANNEL.to_string()),
                members: vec![],
            })
            .await?;
        Ok(vec![general])
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>, ConversationError> {
        Ok(self.store.list_for_member(user_id).await?)
    }

    pub async fn find_group_by_members(
        &self,
        members: &[Uuid],
        exact: bool,
    ) -> Result<Vec<Conversation>, ConversationError> {
        Ok(self.store.find_groups_by_members(members, exact).await?)
    }

    /// Anyone may join an open channel. A confidential group only admits
    /// users it already lists: an invited row is promoted to a member.
    pub async fn join(&self, id: Uuid, user_id: Uuid) -> Result<(), ConversationError> {
        let conversation = self.get(id).await?;
        match conversation.kind {
            ConversationType::DirectMessage => {
                return Err(StoreError::DirectMessageImmutable.into());
            }
            ConversationType::Confidential => match conversation.member(user_id) {
                Some(m) if m.status == MemberStatus::Member => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(ConversationError::Forbidden {
                        user: user_id,
                        conversation: id,
                    });
                }
            },
            ConversationType::Open => {}
        }

        self.store.add_member(id, user_id).await?;
        info!("{} joined conversation {}", user_id, id);
        Ok(())
    }

    pub async fn leave(&self, id: Uuid, user_id: Uuid) -> Result<(), ConversationError> {
        self.ensure_mutable_membership(id).await?;
        self.store.remove_member(id, user_id).await?;
        info!("{} left conversation {}", user_id, id);
        Ok(())
    }

    /// Stores the topic and publishes a `channel:topic` system message.
    pub async fn update_topic(
        &self,
        id: Uuid,
        value: String,
        creator: Uuid,
    ) -> Result<Conversation, ConversationError> {
        let topic = Topic {
            value,
            creator,
            last_set: Utc::now(),
        };
        let conversation = self
            .store
            .set_topic(id, topic.clone())
            .await?
            .ok_or(ConversationError::NotFound(id))?;

        if let Err(e) = self
            .bus
            .publish(ClusterEvent::TopicUpdated(TopicUpdate::new(id, topic)))
            .await
        {
            warn!("Failed to announce topic of {}: {}", id, e);
        }
        Ok(conversation)
    }

    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<(), ConversationError> {
        Ok(self.store.reset_unseen_mentions(id, user_id).await?)
    }

    async fn ensure_mutable_membership(&self, id: Uuid) -> Result<(), ConversationError> {
        let conversation = self.get(id).await?;
        if conversation.kind == ConversationType::DirectMessage {
            return Err(StoreError::DirectMessageImmutable.into());
        }
        Ok(())
    }
}
