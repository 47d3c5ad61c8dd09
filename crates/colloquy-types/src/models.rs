use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// -- Conversations --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    /// Public channel, anyone in the namespace can read and write.
    Open,
    /// Closed group.
    Confidential,
    /// Exactly two members, fixed at creation.
    DirectMessage,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Confidential => "confidential",
            Self::DirectMessage => "directmessage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "confidential" => Some(Self::Confidential),
            "directmessage" => Some(Self::DirectMessage),
            _ => None,
        }
    }

    /// Membership-scoped conversations are delivered to their members only.
    pub fn is_membership_scoped(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Member,
    Invited,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Invited => "invited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "invited" => Some(Self::Invited),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: Uuid,
    #[serde(default)]
    pub unseen_mentions: u32,
    pub status: MemberStatus,
}

impl Member {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            unseen_mentions: 0,
            status: MemberStatus::Member,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub value: String,
    pub creator: Uuid,
    pub last_set: DateTime<Utc>,
}

/// Summary of the most recent message, used to order conversation listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub creator: Uuid,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    pub name: Option<String>,
    pub members: Vec<Member>,
    pub topic: Option<Topic>,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn member(&self, user_id: Uuid) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.member(user_id)
            .is_some_and(|m| m.status == MemberStatus::Member)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.members.iter().map(|m| m.user_id)
    }
}

/// Fields accepted when creating a conversation. Duplicate member ids collapse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    #[serde(rename = "type")]
    pub kind: ConversationType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<Uuid>,
}

// -- Messages --

/// A message as asserted by a client, before authorization and persistence.
/// Unrecognized fields are kept in `extra` and never reach the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub channel: Uuid,
    pub creator: Uuid,
    #[serde(default)]
    pub text: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub user_mentions: Vec<Uuid>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IncomingMessage {
    /// The subset of fields the message store is allowed to see.
    pub fn normalized(&self) -> NewMessage {
        NewMessage {
            kind: self.kind.clone(),
            subtype: self.subtype.clone(),
            text: self.text.clone(),
            date: self.date,
            creator: self.creator,
            channel: self.channel,
            attachments: self.attachments.clone(),
        }
    }
}

/// A message body sent over the socket. The gateway fills in `creator` from the
/// authenticated connection and `date` from its own clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub channel: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub user_mentions: Vec<Uuid>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientMessage {
    pub fn stamp(self, creator: Uuid, date: DateTime<Utc>) -> IncomingMessage {
        IncomingMessage {
            kind: self.kind,
            subtype: self.subtype,
            channel: self.channel,
            creator,
            text: self.text,
            date,
            attachments: self.attachments,
            user_mentions: self.user_mentions,
            extra: self.extra,
        }
    }
}

/// Normalized message handed to the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub text: String,
    pub date: DateTime<Utc>,
    pub creator: Uuid,
    pub channel: Uuid,
    pub attachments: Vec<String>,
}

/// Canonical persisted message, with server-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel: Uuid,
    pub creator: Uuid,
    pub text: String,
    pub date: DateTime<Utc>,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// What the gateway and the REST layer hand to the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub room: Option<String>,
    pub message: IncomingMessage,
}

// -- Private conversation subscriptions --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub conversations: Vec<Uuid>,
}

impl SubscriptionRecord {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            conversations: Vec::new(),
        }
    }

    pub fn contains(&self, conversation_id: Uuid) -> bool {
        self.conversations.contains(&conversation_id)
    }
}
