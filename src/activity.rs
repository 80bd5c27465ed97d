//! Per-workspace agent activity record.
//!
//! Touched on every poll-surface call; powers the agent presence indicator.
//! The write is a single atomic upsert — concurrent polls for the same
//! workspace must not race a read-modify-write cycle.

use anyhow::Result;
use chrono::{DateTime, Utc};
use hubcast::types::AgentActivityInfo;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

#[derive(Clone)]
pub struct AgentActivity {
    pool: SqlitePool,
}

impl AgentActivity {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `consumer_key` hit the poll surface just now.
    pub async fn touch(&self, workspace_id: &str, consumer_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_activity (workspace_id, consumer_key, last_activity_at)
            VALUES (?, ?, ?)
            ON CONFLICT(workspace_id) DO UPDATE SET
                consumer_key = excluded.consumer_key,
                last_activity_at = excluded.last_activity_at
            "#,
        )
        .bind(workspace_id)
        .bind(consumer_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last recorded activity for the workspace, if any.
    pub async fn last_activity(&self, workspace_id: &str) -> Result<Option<AgentActivityInfo>> {
        let row = sqlx::query(
            "SELECT consumer_key, last_activity_at FROM agent_activity WHERE workspace_id = ?",
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AgentActivityInfo {
            consumer: row.get("consumer_key"),
            last_activity_at: row.get::<DateTime<Utc>, _>("last_activity_at"),
        }))
    }
}
