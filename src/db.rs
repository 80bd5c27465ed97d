use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening hub database");

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .with_context(|| format!("invalid database path: {}", path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to database: {}", path.display()))?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Isolated in-memory database, one connection so every caller sees the
    /// same store. Used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to create in-memory SQLite pool")?;

        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        run_migrations(&pool).await?;

        Ok(Self { pool })
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workspace_id TEXT NOT NULL,
            sender_kind TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'chat',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_workspace_id ON messages(workspace_id, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seen_marks (
            message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            consumer_key TEXT NOT NULL,
            seen_at TEXT NOT NULL,
            PRIMARY KEY (message_id, consumer_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_activity (
            workspace_id TEXT PRIMARY KEY,
            consumer_key TEXT NOT NULL,
            last_activity_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Database;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::open_in_memory().await.expect("open");
        super::run_migrations(&db.pool).await.expect("second run");
    }

    #[tokio::test]
    async fn open_creates_file_database() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hub.db");

        let db = Database::open(&path).await.expect("open");
        sqlx::query("SELECT COUNT(*) FROM messages")
            .fetch_one(&db.pool)
            .await
            .expect("messages table exists");
        assert!(path.exists());
    }
}
