//! Per-consumer acknowledgment marks.
//!
//! The upsert is a single conflict-aware INSERT, never select-then-insert:
//! two near-simultaneous acknowledgments of the same (message, consumer) pair
//! must not both believe they are the first.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct SeenTracker {
    pool: SqlitePool,
}

impl SeenTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mark messages as seen by `consumer_key`. Already-seen pairs are a
    /// successful no-op; ids outside the workspace are ignored. Returns how
    /// many marks were newly created.
    pub async fn mark_seen(
        &self,
        workspace_id: &str,
        message_ids: &[i64],
        consumer_key: &str,
    ) -> Result<u64> {
        let seen_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut acknowledged = 0u64;

        for message_id in message_ids {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO seen_marks (message_id, consumer_key, seen_at)
                SELECT id, ?, ? FROM messages WHERE id = ? AND workspace_id = ?
                "#,
            )
            .bind(consumer_key)
            .bind(seen_at)
            .bind(message_id)
            .bind(workspace_id)
            .execute(&mut *tx)
            .await?;
            acknowledged += result.rows_affected();
        }

        tx.commit().await?;
        Ok(acknowledged)
    }
}
