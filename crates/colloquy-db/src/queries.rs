use crate::Database;
use crate::models::{ConversationRow, MemberRow, MessageRow, UserRow, format_time, parse_id};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use colloquy_types::models::{
    Conversation, ConversationType, LastMessage, MemberStatus, NewMessage, StoredMessage, Topic,
};

/// Result of a membership mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOutcome {
    Applied,
    NotFound,
    /// Direct message membership never changes after creation.
    Immutable,
}

const CONVERSATION_COLUMNS: &str = "id, kind, name, topic_value, topic_creator, topic_last_set, \
     last_text, last_creator, last_date, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, format_time(&Utc::now())),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Conversations --

    /// Inserts a conversation and its members in one transaction. Members are
    /// expected to be de-duplicated already.
    pub fn insert_conversation(
        &self,
        id: Uuid,
        kind: ConversationType,
        name: Option<&str>,
        members: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, kind, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), kind.as_str(), name, format_time(&created_at)],
            )?;
            for (position, user_id) in members.iter().enumerate() {
                tx.execute(
                    "INSERT INTO conversation_members (conversation_id, user_id, status, position)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        id.to_string(),
                        user_id.to_string(),
                        MemberStatus::Member.as_str(),
                        position as i64
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| load_conversation(conn, &id.to_string()))
    }

    pub fn list_conversations(&self, kind: ConversationType) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let ids = query_ids(
                conn,
                "SELECT id FROM conversations WHERE kind = ?1 ORDER BY created_at",
                [kind.as_str()],
            )?;
            load_many(conn, &ids)
        })
    }

    /// Most recently active first; conversations without messages last.
    pub fn list_conversations_for_member(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let ids = query_ids(
                conn,
                "SELECT c.id FROM conversations c
                 JOIN conversation_members m ON m.conversation_id = c.id
                 WHERE m.user_id = ?1 AND m.status = 'member'
                 ORDER BY COALESCE(c.last_date, c.created_at) DESC",
                [user_id.to_string()],
            )?;
            load_many(conn, &ids)
        })
    }

    /// Confidential groups that contain every one of `members`.
    pub fn find_groups_containing(&self, members: &[Uuid]) -> Result<Vec<Conversation>> {
        if members.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=members.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT m.conversation_id FROM conversation_members m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.kind = 'confidential' AND m.user_id IN ({})
                 GROUP BY m.conversation_id
                 HAVING COUNT(DISTINCT m.user_id) = ?1",
                placeholders.join(", ")
            );

            let ids: Vec<String> = members.iter().map(Uuid::to_string).collect();
            let count = members.len() as i64;
            let mut bound: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(ids.len() + 1);
            bound.push(&count);
            bound.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let found = query_ids(conn, &sql, bound.as_slice())?;
            load_many(conn, &found)
        })
    }

    pub fn add_member(&self, id: Uuid, user_id: Uuid) -> Result<MembershipOutcome> {
        self.with_conn(|conn| {
            match conversation_kind(conn, id)? {
                None => return Ok(MembershipOutcome::NotFound),
                Some(ConversationType::DirectMessage) => return Ok(MembershipOutcome::Immutable),
                Some(_) => {}
            }
            // An invited row is promoted in place and keeps its position.
            conn.execute(
                "INSERT INTO conversation_members (conversation_id, user_id, status, position)
                 VALUES (?1, ?2, 'member',
                    (SELECT COALESCE(MAX(position) + 1, 0) FROM conversation_members WHERE conversation_id = ?1))
                 ON CONFLICT (conversation_id, user_id) DO UPDATE SET status = 'member'",
                params![id.to_string(), user_id.to_string()],
            )?;
            Ok(MembershipOutcome::Applied)
        })
    }

    pub fn remove_member(&self, id: Uuid, user_id: Uuid) -> Result<MembershipOutcome> {
        self.with_conn(|conn| {
            match conversation_kind(conn, id)? {
                None => return Ok(MembershipOutcome::NotFound),
                Some(ConversationType::DirectMessage) => return Ok(MembershipOutcome::Immutable),
                Some(_) => {}
            }
            conn.execute(
                "DELETE FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )?;
            Ok(MembershipOutcome::Applied)
        })
    }

    /// Returns the updated conversation, `None` if it does not exist.
    pub fn set_topic(&self, id: Uuid, topic: &Topic) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET topic_value = ?2, topic_creator = ?3, topic_last_set = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    topic.value,
                    topic.creator.to_string(),
                    format_time(&topic.last_set)
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            load_conversation(conn, &id.to_string())
        })
    }

    pub fn set_last_message(&self, id: Uuid, last: &LastMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET last_text = ?2, last_creator = ?3, last_date = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    last.text,
                    last.creator.to_string(),
                    format_time(&last.date)
                ],
            )?;
            Ok(())
        })
    }

    pub fn increment_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversation_members SET unseen_mentions = unseen_mentions + 1
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn reset_unseen_mentions(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversation_members SET unseen_mentions = 0
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(&self, id: Uuid, message: &NewMessage) -> Result<StoredMessage> {
        let created_at = Utc::now();
        let attachments = serde_json::to_string(&message.attachments)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, creator_id, kind, subtype, text, attachments, date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    message.channel.to_string(),
                    message.creator.to_string(),
                    message.kind,
                    message.subtype,
                    message.text,
                    attachments,
                    format_time(&message.date),
                    format_time(&created_at)
                ],
            )?;
            Ok(())
        })?;

        Ok(StoredMessage {
            id,
            kind: message.kind.clone(),
            subtype: message.subtype.clone(),
            channel: message.channel,
            creator: message.creator,
            text: message.text.clone(),
            date: message.date,
            attachments: message.attachments.clone(),
            created_at,
        })
    }

    /// Newest first.
    pub fn get_messages(&self, channel_id: Uuid, limit: u32, offset: u32) -> Result<Vec<StoredMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, creator_id, kind, subtype, text, attachments, date, created_at
                 FROM messages
                 WHERE channel_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let rows = stmt
                .query_map(params![channel_id.to_string(), limit, offset], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        channel_id: row.get(1)?,
                        creator_id: row.get(2)?,
                        kind: row.get(3)?,
                        subtype: row.get(4)?,
                        text: row.get(5)?,
                        attachments: row.get(6)?,
                        date: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    // -- Private conversation subscriptions --

    /// `None` when the user has never been subscribed to anything.
    pub fn get_private_subscriptions(&self, user_id: Uuid) -> Result<Option<Vec<Uuid>>> {
        self.with_conn(|conn| {
            let ids = query_ids(
                conn,
                "SELECT conversation_id FROM private_subscriptions WHERE user_id = ?1 ORDER BY position",
                [user_id.to_string()],
            )?;
            if ids.is_empty() {
                return Ok(None);
            }
            ids.iter().map(|id| parse_id(id)).collect::<Result<Vec<_>>>().map(Some)
        })
    }

    /// Appends one conversation to the user's set in a single statement.
    /// Returns false when it was already there.
    pub fn add_private_subscription(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO private_subscriptions (user_id, conversation_id, position)
                 VALUES (?1, ?2,
                    (SELECT COALESCE(MAX(position) + 1, 0) FROM private_subscriptions WHERE user_id = ?1))",
                params![user_id.to_string(), conversation_id.to_string()],
            )?;
            Ok(inserted > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_ids<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn conversation_kind(conn: &Connection, id: Uuid) -> Result<Option<ConversationType>> {
    let kind: Option<String> = conn
        .query_row(
            "SELECT kind FROM conversations WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(kind.and_then(|k| ConversationType::parse(&k)))
}

fn load_conversation(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM conversations WHERE id = ?1",
        CONVERSATION_COLUMNS
    ))?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                name: row.get(2)?,
                topic_value: row.get(3)?,
                topic_creator: row.get(4)?,
                topic_last_set: row.get(5)?,
                last_text: row.get(6)?,
                last_creator: row.get(7)?,
                last_date: row.get(8)?,
                created_at: row.get(9)?,
            })
        })
        .optional()?;

    match row {
        Some(row) => {
            let members = load_members(conn, id)?;
            Ok(Some(row.into_conversation(members)?))
        }
        None => Ok(None),
    }
}

fn load_members(conn: &Connection, conversation_id: &str) -> Result<Vec<MemberRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, status, unseen_mentions FROM conversation_members
         WHERE conversation_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(MemberRow {
                user_id: row.get(0)?,
                status: row.get(1)?,
                unseen_mentions: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn load_many(conn: &Connection, ids: &[String]) -> Result<Vec<Conversation>> {
    let mut conversations = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(c) = load_conversation(conn, id)? {
            conversations.push(c);
        }
    }
    Ok(conversations)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
