use anyhow::{Context, Error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

pub const CHAT_TABLE: &str = "chat_history";

/// One completed exchange. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub user_message: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Up to `n` of the most recent turns, oldest first.
    async fn fetch_last_n(&self, n: usize) -> Result<Vec<ChatTurn>, Error>;

    async fn store(&self, user_message: &str, ai_response: &str) -> Result<(), Error>;
}

pub struct PgConversationStore {
    db: PgPool,
    table: String,
}

impl PgConversationStore {
    pub fn new(db: PgPool) -> Self {
        Self::with_table(db, CHAT_TABLE)
    }

    pub fn with_table(db: PgPool, table: impl Into<String>) -> Self {
        PgConversationStore {
            db,
            table: table.into(),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                user_message TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table
        );
        sqlx::query(&ddl)
            .execute(&self.db)
            .await
            .with_context(|| format!("creating {} table", self.table))?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    /// Takes the newest `n` rows by `id`, then flips them back to insertion
    /// order. Covered by an ignored test that needs a live database.
    async fn fetch_last_n(&self, n: usize) -> Result<Vec<ChatTurn>, Error> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let query = format!(
            "SELECT user_message, ai_response, created_at FROM (
                SELECT id, user_message, ai_response, created_at FROM {}
                ORDER BY id DESC LIMIT $1
            ) AS recent ORDER BY id ASC",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.db)
            .await
            .context("fetching recent chat turns")?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            turns.push(ChatTurn {
                user_message: row.try_get("user_message")?,
                ai_response: row.try_get("ai_response")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(turns)
    }

    async fn store(&self, user_message: &str, ai_response: &str) -> Result<(), Error> {
        let query = format!(
            "INSERT INTO {} (user_message, ai_response) VALUES ($1, $2)",
            self.table
        );

        sqlx::query(&query)
            .bind(user_message)
            .bind(ai_response)
            .execute(&self.db)
            .await
            .context("inserting chat turn")?;

        Ok(())
    }
}
