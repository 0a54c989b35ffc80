use sha2::{Digest, Sha256};
use sqlx::Row;

use replyq_core::SourceType;

use super::{decode_err, LedgerRepository, ProcessedMessage, RepositoryError};
use crate::DbPool;

/// Hex digest of a message body, stored so a re-fetched message can be
/// recognized even if the remote re-issues ids.
pub fn content_hash(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct SqlLedgerRepository {
    pool: DbPool,
}

impl SqlLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LedgerRepository for SqlLedgerRepository {
    async fn is_processed(
        &self,
        source_type: SourceType,
        source_id: i64,
        message_id: i64,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM processed_messages
             WHERE source_type = ? AND source_id = ? AND message_id = ?",
        )
        .bind(source_type.as_str())
        .bind(source_id)
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count").map_err(decode_err)?;
        Ok(count > 0)
    }

    async fn record(&self, entry: &ProcessedMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO processed_messages
                 (source_type, source_id, message_id, content_hash, action, draft_id,
                  error_message, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.source_type.as_str())
        .bind(entry.source_id)
        .bind(entry.message_id)
        .bind(&entry.content_hash)
        .bind(entry.action.as_str())
        .bind(entry.draft_id.as_ref().map(|id| id.0.clone()))
        .bind(entry.error_message.as_deref())
        .bind(entry.processed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
