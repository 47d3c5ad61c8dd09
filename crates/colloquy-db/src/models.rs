/// Database row types, mapping directly to SQLite rows, and their conversion
/// into the shared models.
use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use colloquy_types::models::{
    Conversation, ConversationType, LastMessage, Member, MemberStatus, StoredMessage, Topic, User,
};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub kind: String,
    pub name: Option<String>,
    pub topic_value: Option<String>,
    pub topic_creator: Option<String>,
    pub topic_last_set: Option<String>,
    pub last_text: Option<String>,
    pub last_creator: Option<String>,
    pub last_date: Option<String>,
    pub created_at: String,
}

pub struct MemberRow {
    pub user_id: String,
    pub status: String,
    pub unseen_mentions: u32,
}

pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub creator_id: String,
    pub kind: String,
    pub subtype: Option<String>,
    pub text: String,
    pub attachments: String,
    pub date: String,
    pub created_at: String,
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().map_err(|e| anyhow!("Corrupt id '{}': {}", raw, e))
}

pub(crate) fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand through sqlite3 use datetime('now') format.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow!("Corrupt timestamp '{}': {}", raw, e))
}

pub(crate) fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

impl MemberRow {
    pub fn into_member(self) -> Result<Member> {
        Ok(Member {
            user_id: parse_id(&self.user_id)?,
            unseen_mentions: self.unseen_mentions,
            status: MemberStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("Corrupt member status '{}'", self.status))?,
        })
    }
}

impl ConversationRow {
    pub fn into_conversation(self, members: Vec<MemberRow>) -> Result<Conversation> {
        let topic = match (self.topic_value, self.topic_creator, self.topic_last_set) {
            (Some(value), Some(creator), Some(last_set)) => Some(Topic {
                value,
                creator: parse_id(&creator)?,
                last_set: parse_time(&last_set)?,
            }),
            _ => None,
        };

        let last_message = match (self.last_text, self.last_creator, self.last_date) {
            (Some(text), Some(creator), Some(date)) => Some(LastMessage {
                text,
                creator: parse_id(&creator)?,
                date: parse_time(&date)?,
            }),
            _ => None,
        };

        Ok(Conversation {
            id: parse_id(&self.id)?,
            kind: ConversationType::parse(&self.kind)
                .ok_or_else(|| anyhow!("Corrupt conversation kind '{}'", self.kind))?,
            name: self.name,
            members: members
                .into_iter()
                .map(MemberRow::into_member)
                .collect::<Result<Vec<_>>>()?,
            topic,
            last_message,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<StoredMessage> {
        Ok(StoredMessage {
            id: parse_id(&self.id)?,
            kind: self.kind,
            subtype: self.subtype,
            channel: parse_id(&self.channel_id)?,
            creator: parse_id(&self.creator_id)?,
            text: self.text,
            date: parse_time(&self.date)?,
            attachments: serde_json::from_str(&self.attachments)
                .map_err(|e| anyhow!("Corrupt attachments on message '{}': {}", self.id, e))?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}
