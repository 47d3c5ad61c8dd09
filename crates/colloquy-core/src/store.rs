//! Storage collaborators consumed by the pipeline and the gateway.
//!
//! Implementations live outside this crate (see `colloquy-db`); everything
//! here talks to them through `Arc<dyn Trait>`.

use async_trait::async_trait;
use uuid::Uuid;

use colloquy_types::models::{
    Conversation, ConversationType, LastMessage, NewConversation, NewMessage, StoredMessage,
    SubscriptionRecord, Topic, User,
};

use crate::error::StoreError;

#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Creates a conversation. Duplicate members collapse; a direct message
    /// must end up with exactly two members.
    async fn create(&self, conversation: NewConversation) -> Result<Conversation, StoreError>;

    async fn list(&self, kind: ConversationType) -> Result<Vec<Conversation>, StoreError>;

    /// Conversations the user is a member of, most recently active first.
    async fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Conversation>, StoreError>;

    /// Confidential groups containing all of `members`, or exactly them when
    /// `exact` is set.
    async fn find_groups_by_members(
        &self,
        members: &[Uuid],
        exact: bool,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Adding an existing member is a no-op.
    async fn add_member(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    /// Returns the updated conversation, or `None` when it does not exist.
    async fn set_topic(&self, id: Uuid, topic: Topic) -> Result<Option<Conversation>, StoreError>;

    /// Non-members are ignored.
    async fn increment_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    async fn reset_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    async fn set_last_message(&self, id: Uuid, last: LastMessage) -> Result<(), StoreError>;

    async fn user_can_write(
        &self,
        user: &User,
        conversation: &Conversation,
    ) -> Result<bool, StoreError> {
        Ok(can_write(user.id, conversation))
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Newest first.
    async fn list(
        &self,
        channel: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>, StoreError>;

    /// Appends `conversation_id` to the user's set unless it is already there.
    /// Must be atomic: concurrent adds for the same user all land. Returns
    /// whether the set changed.
    async fn add(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, StoreError>;
}

/// Default write policy: open channels accept anyone, other conversations
/// accept full members only.
pub fn can_write(user_id: Uuid, conversation: &Conversation) -> bool {
    match conversation.kind {
        ConversationType::Open => true,
        ConversationType::Confidential | ConversationType::DirectMessage => {
            conversation.is_member(user_id)
        }
    }
}

/// Open channels are readable by anyone; other conversations by anyone listed,
/// invited members included.
pub fn can_read(user_id: Uuid, conversation: &Conversation) -> bool {
    conversation.kind == ConversationType::Open || conversation.member(user_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use colloquy_types::models::{Member, MemberStatus};

    fn conversation(kind: ConversationType, members: Vec<Member>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            kind,
            name: None,
            members,
            topic: None,
            last_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn anyone_writes_to_open_channels() {
        let c = conversation(ConversationType::Open, vec![]);
        assert!(can_write(Uuid::new_v4(), &c));
    }

    #[test]
    fn only_members_write_to_groups() {
        let member = Uuid::new_v4();
        let c = conversation(ConversationType::Confidential, vec![Member::new(member)]);
        assert!(can_write(member, &c));
        assert!(!can_write(Uuid::new_v4(), &c));
    }

    #[test]
    fn invited_members_cannot_write_yet() {
        let invited = Uuid::new_v4();
        let c = conversation(
            ConversationType::Confidential,
            vec![Member {
                user_id: invited,
                unseen_mentions: 0,
                status: MemberStatus::Invited,
            }],
        );
        assert!(!can_write(invited, &c));
        assert!(can_read(invited, &c));
        assert!(!can_read(Uuid::new_v4(), &c));
    }
}
