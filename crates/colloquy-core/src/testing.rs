//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use colloquy_types::models::{
    Conversation, ConversationType, IncomingEvent, IncomingMessage, LastMessage, Member,
    MemberStatus, NewConversation, NewMessage, StoredMessage, SubscriptionRecord, Topic, User,
};

use crate::error::StoreError;
use crate::store::{ConversationStore, MessageStore, SubscriptionStore, UserLookup};

pub fn incoming_event() -> IncomingEvent {
    IncomingEvent {
        room: Some("general".into()),
        message: IncomingMessage {
            kind: "text".into(),
            subtype: None,
            channel: Uuid::new_v4(),
            creator: Uuid::new_v4(),
            text: "hi".into(),
            date: Utc::now(),
            attachments: vec![],
            user_mentions: vec![],
            extra: Default::default(),
        },
    }
}

fn backend_failure(what: &str) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("{} failed", what))
}

#[derive(Default)]
pub struct FakeUsers {
    users: Mutex<HashMap<Uuid, User>>,
    failing: AtomicBool,
}

impl FakeUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid) -> User {
        let user = User {
            id,
            username: format!("user-{}", &id.to_string()[..8]),
            created_at: Utc::now(),
        };
        self.users.lock().unwrap().insert(id, user.clone());
        user
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserLookup for FakeUsers {
    async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(backend_failure("user.get"));
        }
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct FakeConversations {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
    failing: AtomicBool,
    pub lookups: AtomicUsize,
}

impl FakeConversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: ConversationType, members: Vec<Member>) -> Conversation {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind,
            name: None,
            members,
            topic: None,
            last_message: None,
            created_at: Utc::now(),
        };
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        conversation
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(&id).cloned()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(backend_failure("conversation store"))
        } else {
            Ok(())
        }
    }

    fn update<F>(&self, id: Uuid, f: F) -> Result<Option<Conversation>, StoreError>
    where
        F: FnOnce(&mut Conversation),
    {
        self.check()?;
        let mut conversations = self.conversations.lock().unwrap();
        Ok(conversations.get_mut(&id).map(|c| {
            f(c);
            c.clone()
        }))
    }
}

#[async_trait]
impl ConversationStore for FakeConversations {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.snapshot(id))
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        self.check()?;
        let mut members: Vec<Uuid> = Vec::new();
        for id in new.members {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        if new.kind == ConversationType::DirectMessage && members.len() != 2 {
            return Err(StoreError::InvalidDirectMessage(members.len()));
        }
        let mut conversation = self.insert(new.kind, members.into_iter().map(Member::new).collect());
        conversation.name = new.name;
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn list(&self, kind: ConversationType) -> Result<Vec<Conversation>, StoreError> {
        self.check()?;
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Conversation>, StoreError> {
        self.check()?;
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_member(user_id))
            .cloned()
            .collect())
    }

    async fn find_groups_by_members(
        &self,
        members: &[Uuid],
        exact: bool,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.check()?;
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.kind == ConversationType::Confidential)
            .filter(|c| members.iter().all(|m| c.member(*m).is_some()))
            .filter(|c| !exact || c.members.len() == members.len())
            .cloned()
            .collect())
    }

    async fn add_member(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        self.update(id, |c| {
            match c.members.iter_mut().find(|m| m.user_id == user_id) {
                Some(member) => member.status = MemberStatus::Member,
                None => c.members.push(Member::new(user_id)),
            }
        })?
        .map(|_| ())
        .ok_or(StoreError::ConversationNotFound(id))
    }

    async fn remove_member(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        self.update(id, |c| c.members.retain(|m| m.user_id != user_id))?
            .map(|_| ())
            .ok_or(StoreError::ConversationNotFound(id))
    }

    async fn set_topic(&self, id: Uuid, topic: Topic) -> Result<Option<Conversation>, StoreError> {
        self.update(id, |c| c.topic = Some(topic))
    }

    async fn increment_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        self.update(id, |c| {
            if let Some(m) = c.members.iter_mut().find(|m| m.user_id == user_id) {
                m.unseen_mentions += 1;
            }
        })?;
        Ok(())
    }

    async fn reset_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        self.update(id, |c| {
            if let Some(m) = c.members.iter_mut().find(|m| m.user_id == user_id) {
                m.unseen_mentions = 0;
            }
        })?;
        Ok(())
    }

    async fn set_last_message(&self, id: Uuid, last: LastMessage) -> Result<(), StoreError> {
        self.update(id, |c| c.last_message = Some(last))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMessages {
    pub created: Mutex<Vec<NewMessage>>,
    failing: AtomicBool,
}

impl FakeMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<NewMessage> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for FakeMessages {
    async fn create(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(backend_failure("message.create"));
        }
        self.created.lock().unwrap().push(message.clone());
        Ok(StoredMessage {
            id: Uuid::new_v4(),
            kind: message.kind,
            subtype: message.subtype,
            channel: message.channel,
            creator: message.creator,
            text: message.text,
            date: message.date,
            attachments: message.attachments,
            created_at: Utc::now(),
        })
    }

    async fn list(
        &self,
        _channel: Uuid,
        _limit: u32,
        _offset: u32,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(vec![])
    }
}

#[derive(Default)]
pub struct FakeSubscriptions {
    records: Mutex<HashMap<Uuid, SubscriptionRecord>>,
    added: Mutex<Vec<(Uuid, Uuid)>>,
    /// Every `get` and `add`, successful or not.
    pub calls: AtomicUsize,
}

impl FakeSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, user_id: Uuid, conversations: Vec<Uuid>) {
        self.records.lock().unwrap().insert(
            user_id,
            SubscriptionRecord {
                user_id,
                conversations,
            },
        );
    }

    /// `(user_id, conversation_id)` pairs that changed a record.
    pub fn added(&self) -> Vec<(Uuid, Uuid)> {
        self.added.lock().unwrap().clone()
    }

    pub fn record(&self, user_id: Uuid) -> Option<SubscriptionRecord> {
        self.records.lock().unwrap().get(&user_id).cloned()
    }
}

#[async_trait]
impl SubscriptionStore for FakeSubscriptions {
    async fn get(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.record(user_id))
    }

    async fn add(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(user_id)
            .or_insert_with(|| SubscriptionRecord::empty(user_id));
        if record.contains(conversation_id) {
            return Ok(false);
        }
        record.conversations.push(conversation_id);
        self.added.lock().unwrap().push((user_id, conversation_id));
        Ok(true)
    }
}
