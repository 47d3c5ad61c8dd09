//! `colloquy-core` storage traits backed by the SQLite database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use colloquy_core::StoreError;
use colloquy_core::store::{ConversationStore, MessageStore, SubscriptionStore, UserLookup};
use colloquy_types::models::{
    Conversation, ConversationType, LastMessage, NewConversation, NewMessage, StoredMessage,
    SubscriptionRecord, Topic, User,
};

use crate::Database;
use crate::queries::MembershipOutcome;

#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Runs a blocking database call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("database task failed: {}", e)))?
            .map_err(StoreError::Backend)
    }
}

fn membership(outcome: MembershipOutcome, id: Uuid) -> Result<(), StoreError> {
    match outcome {
        MembershipOutcome::Applied => Ok(()),
        MembershipOutcome::NotFound => Err(StoreError::ConversationNotFound(id)),
        MembershipOutcome::Immutable => Err(StoreError::DirectMessageImmutable),
    }
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[async_trait]
impl UserLookup for SqliteStore {
    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.blocking(move |db| {
            db.get_user_by_id(&id.to_string())?
                .map(|row| row.into_user())
                .transpose()
        })
        .await
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        self.blocking(move |db| db.get_conversation(id)).await
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        let members = dedup(new.members);
        if new.kind == ConversationType::DirectMessage && members.len() != 2 {
            return Err(StoreError::InvalidDirectMessage(members.len()));
        }

        let id = Uuid::new_v4();
        let kind = new.kind;
        let name = new.name;
        let created = self
            .blocking(move |db| {
                db.insert_conversation(id, kind, name.as_deref(), &members, Utc::now())?;
                db.get_conversation(id)
            })
            .await?;

        created.ok_or(StoreError::ConversationNotFound(id))
    }

    async fn list(&self, kind: ConversationType) -> Result<Vec<Conversation>, StoreError> {
        self.blocking(move |db| db.list_conversations(kind)).await
    }

    async fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Conversation>, StoreError> {
        self.blocking(move |db| db.list_conversations_for_member(user_id))
            .await
    }

    async fn find_groups_by_members(
        &self,
        members: &[Uuid],
        exact: bool,
    ) -> Result<Vec<Conversation>, StoreError> {
        let members = dedup(members.to_vec());
        let wanted = members.len();
        let groups = self
            .blocking(move |db| db.find_groups_containing(&members))
            .await?;

        Ok(groups
            .into_iter()
            .filter(|c| !exact || c.members.len() == wanted)
            .collect())
    }

    async fn add_member(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let outcome = self.blocking(move |db| db.add_member(id, user_id)).await?;
        membership(outcome, id)
    }

    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let outcome = self
            .blocking(move |db| db.remove_member(id, user_id))
            .await?;
        membership(outcome, id)
    }

    async fn set_topic(&self, id: Uuid, topic: Topic) -> Result<Option<Conversation>, StoreError> {
        self.blocking(move |db| db.set_topic(id, &topic)).await
    }

    async fn increment_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        self.blocking(move |db| db.increment_unseen_mentions(id, user_id))
            .await
    }

    async fn reset_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        self.blocking(move |db| db.reset_unseen_mentions(id, user_id))
            .await
    }

    async fn set_last_message(&self, id: Uuid, last: LastMessage) -> Result<(), StoreError> {
        self.blocking(move |db| db.set_last_message(id, &last)).await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        self.blocking(move |db| db.insert_message(Uuid::new_v4(), &message))
            .await
    }

    async fn list(
        &self,
        channel: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.blocking(move |db| db.get_messages(channel, limit, offset))
            .await
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>, StoreError> {
        let conversations = self
            .blocking(move |db| db.get_private_subscriptions(user_id))
            .await?;
        Ok(conversations.map(|conversations| SubscriptionRecord {
            user_id,
            conversations,
        }))
    }

    async fn add(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, StoreError> {
        self.blocking(move |db| db.add_private_subscription(user_id, conversation_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::bus::MemoryBus;
    use colloquy_core::handlers::HandlerRegistry;
    use colloquy_core::pipeline::{Collaborators, Ingested, MessagePipeline};
    use colloquy_core::subscriptions::PrivateConversationIndex;
    use colloquy_types::models::{IncomingEvent, IncomingMessage};

    fn store() -> SqliteStore {
        SqliteStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn new_conversation(kind: ConversationType, members: Vec<Uuid>) -> NewConversation {
        NewConversation {
            kind,
            name: None,
            members,
        }
    }

    #[tokio::test]
    async fn direct_message_requires_two_distinct_members() {
        let store = store();
        let user = Uuid::new_v4();

        let result = ConversationStore::create(
            &store,
            new_conversation(ConversationType::DirectMessage, vec![user, user]),
        )
        .await;
        assert!(matches!(result, Err(StoreError::InvalidDirectMessage(1))));

        let dm = ConversationStore::create(
            &store,
            new_conversation(
                ConversationType::DirectMessage,
                vec![user, Uuid::new_v4()],
            ),
        )
        .await
        .unwrap();
        assert_eq!(dm.members.len(), 2);
        assert!(matches!(
            store.add_member(dm.id, Uuid::new_v4()).await,
            Err(StoreError::DirectMessageImmutable)
        ));
    }

    #[tokio::test]
    async fn exact_group_search_ignores_supersets() {
        let store = store();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let pair = ConversationStore::create(
            &store,
            new_conversation(ConversationType::Confidential, vec![a, b]),
        )
        .await
        .unwrap();
        ConversationStore::create(
            &store,
            new_conversation(ConversationType::Confidential, vec![a, b, c]),
        )
        .await
        .unwrap();

        assert_eq!(store.find_groups_by_members(&[a, b], false).await.unwrap().len(), 2);
        let exact = store.find_groups_by_members(&[b, a], true).await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id, pair.id);
    }

    #[tokio::test]
    async fn membership_change_on_missing_conversation_fails() {
        let store = store();
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.add_member(missing, Uuid::new_v4()).await,
            Err(StoreError::ConversationNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn private_index_persists_through_sqlite() {
        let store = Arc::new(store());
        let index = PrivateConversationIndex::new(store.clone());
        let (user, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        index.store(user, &[a]).await.unwrap();
        index.store(user, &[b, a]).await.unwrap();

        let record = SubscriptionStore::get(store.as_ref(), user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.conversations, vec![a, b]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_direct_messages_subscribe_the_shared_member_to_all() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(SqliteStore::new(db.clone()));
        let shared = Uuid::new_v4();
        db.create_user(&shared.to_string(), "shared", "hash").unwrap();

        let pipeline = Arc::new(MessagePipeline::new(
            Collaborators {
                users: store.clone(),
                conversations: store.clone(),
                messages: store.clone(),
                subscriptions: store.clone(),
                bus: Arc::new(MemoryBus::new()),
            },
            HandlerRegistry::new(),
        ));

        let mut dms = Vec::new();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let partner = Uuid::new_v4();
            db.create_user(&partner.to_string(), &format!("partner-{}", i), "hash")
                .unwrap();
            let dm = ConversationStore::create(
                store.as_ref(),
                new_conversation(ConversationType::DirectMessage, vec![shared, partner]),
            )
            .await
            .unwrap();
            dms.push(dm.id);

            let event = IncomingEvent {
                room: None,
                message: IncomingMessage {
                    kind: "text".into(),
                    subtype: None,
                    channel: dm.id,
                    creator: partner,
                    text: "hi".into(),
                    date: Utc::now(),
                    attachments: Vec::new(),
                    user_mentions: Vec::new(),
                    extra: Default::default(),
                },
            };
            let pipeline = pipeline.clone();
            tasks.push(tokio::spawn(async move { pipeline.handle_incoming(event).await }));
        }
        for task in tasks {
            assert!(matches!(task.await.unwrap(), Ok(Ingested::Stored(_))));
        }

        let record = SubscriptionStore::get(store.as_ref(), shared)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.conversations.len(), 16);
        for dm in dms {
            assert!(record.contains(dm));
        }
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let store = store();
        assert!(UserLookup::get(&store, Uuid::new_v4()).await.unwrap().is_none());
    }
}
