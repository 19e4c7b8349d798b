use chrono::Utc;
use sqlx::Row;

use querent_core::domain::message::Message;
use querent_core::domain::tenant::ThreadId;

use super::{RepositoryError, ThreadRepository};
use crate::DbPool;

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT message FROM conversation_message WHERE thread_id = ? ORDER BY position",
        )
        .bind(&thread_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String =
                    row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                serde_json::from_str::<Message>(&raw)
                    .map_err(|e| RepositoryError::Decode(format!("thread {thread_id}: {e}")))
            })
            .collect()
    }

    async fn overwrite(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), RepositoryError> {
        let encoded = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM conversation_message WHERE thread_id = ?")
            .bind(&thread_id.0)
            .execute(&mut *tx)
            .await?;
        for (position, message) in encoded.iter().enumerate() {
            sqlx::query(
                "INSERT INTO conversation_message (thread_id, position, message, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&thread_id.0)
            .bind(position as i64)
            .bind(message)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
