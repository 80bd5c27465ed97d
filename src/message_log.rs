//! Append-only persisted message log, the single source of truth.
//!
//! Ids are assigned by SQLite's rowid, so within a workspace they are totally
//! ordered and match creation order. Rows are never updated or deleted here.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use hubcast::types::{Message, MessageKind, Sender};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

#[derive(Clone)]
pub struct MessageLog {
    pool: SqlitePool,
}

impl MessageLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message and return the stored record with its assigned id and
    /// timestamp. Fails only on storage unavailability, which the caller must
    /// surface — a silently dropped chat message defeats the log's purpose.
    pub async fn persist(
        &self,
        workspace_id: &str,
        sender: &Sender,
        content: &str,
        kind: MessageKind,
        metadata: serde_json::Value,
    ) -> Result<Message> {
        let created_at = Utc::now();
        let (sender_kind, sender_id) = sender.column_parts();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (workspace_id, sender_kind, sender_id, content, kind, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(workspace_id)
        .bind(sender_kind)
        .bind(sender_id)
        .bind(content)
        .bind(kind.as_str())
        .bind(metadata.to_string())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: result.last_insert_rowid(),
            workspace_id: workspace_id.to_string(),
            sender: sender.clone(),
            content: content.to_string(),
            message_kind: kind,
            metadata,
            created_at,
        })
    }

    /// All messages strictly after `after_id`, ascending. Pure read: calling
    /// twice with the same cursor returns the same result.
    pub async fn list_since(
        &self,
        workspace_id: &str,
        after_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Message>> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query(
                    r#"
                    SELECT id, workspace_id, sender_kind, sender_id, content, kind, metadata, created_at
                    FROM messages
                    WHERE workspace_id = ? AND id > ?
                    ORDER BY id ASC
                    LIMIT ?
                    "#,
                )
                .bind(workspace_id)
                .bind(after_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, workspace_id, sender_kind, sender_id, content, kind, metadata, created_at
                    FROM messages
                    WHERE workspace_id = ? AND id > ?
                    ORDER BY id ASC
                    "#,
                )
                .bind(workspace_id)
                .bind(after_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(row_to_message).collect()
    }

    /// Messages with no seen-mark for `consumer_key`, excluding messages the
    /// consumer authored itself (an agent never waits on its own message).
    pub async fn list_unseen_for(
        &self,
        workspace_id: &str,
        consumer_key: &str,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.workspace_id, m.sender_kind, m.sender_id, m.content, m.kind, m.metadata, m.created_at
            FROM messages m
            LEFT JOIN seen_marks s
                ON s.message_id = m.id AND s.consumer_key = ?1
            WHERE m.workspace_id = ?2
                AND s.message_id IS NULL
                AND (m.sender_kind || ':' || m.sender_id) != ?1
            ORDER BY m.id ASC
            "#,
        )
        .bind(consumer_key)
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_message).collect()
    }
}

fn row_to_message(row: SqliteRow) -> Result<Message> {
    let sender_kind: String = row.get("sender_kind");
    let sender_id: String = row.get("sender_id");
    let sender = Sender::from_parts(&sender_kind, &sender_id)
        .ok_or_else(|| anyhow!("unknown sender kind in storage: {sender_kind}"))?;

    let kind: String = row.get("kind");
    let message_kind = MessageKind::parse(&kind)
        .ok_or_else(|| anyhow!("unknown message kind in storage: {kind}"))?;

    let metadata: String = row.get("metadata");
    let metadata = serde_json::from_str(&metadata)?;

    Ok(Message {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        sender,
        content: row.get("content"),
        message_kind,
        metadata,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}
