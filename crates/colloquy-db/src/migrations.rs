use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            kind            TEXT NOT NULL CHECK (kind IN ('open', 'confidential', 'directmessage')),
            name            TEXT,
            topic_value     TEXT,
            topic_creator   TEXT,
            topic_last_set  TEXT,
            last_text       TEXT,
            last_creator    TEXT,
            last_date       TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_kind
            ON conversations(kind);

        CREATE TABLE IF NOT EXISTS conversation_members (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'member',
            unseen_mentions INTEGER NOT NULL DEFAULT 0,
            position        INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON conversation_members(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            channel_id      TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            creator_id      TEXT NOT NULL,
            kind            TEXT NOT NULL,
            subtype         TEXT,
            text            TEXT NOT NULL,
            attachments     TEXT NOT NULL DEFAULT '[]',
            date            TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE TABLE IF NOT EXISTS private_subscriptions (
            user_id         TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            position        INTEGER NOT NULL,
            PRIMARY KEY (user_id, conversation_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
