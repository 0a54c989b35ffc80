use chrono::Utc;
use sqlx::Row;

use super::{decode_err, RepositoryError, SettingsRepository};
use crate::DbPool;

/// Small key/value store for operator-tunable knobs (last-poll watermark,
/// feature toggles). Values are JSON.
pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let raw: String = r.try_get("value").map_err(decode_err)?;
            serde_json::from_str(&raw).map_err(decode_err)
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(value).map_err(decode_err)?;

        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SqlSettingsRepository;
    use crate::migrations::run_pending;
    use crate::repositories::SettingsRepository;
    use crate::{connect_with_settings, DbPool};

    async fn test_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn set_then_get_round_trips_json() {
        let pool = test_pool().await;
        let repo = SqlSettingsRepository::new(pool);

        assert!(repo.get("poll.enabled").await.expect("get").is_none());

        repo.set("poll.enabled", &json!(true)).await.expect("set");
        assert_eq!(repo.get("poll.enabled").await.expect("get"), Some(json!(true)));

        repo.set("poll.enabled", &json!(false)).await.expect("overwrite");
        assert_eq!(repo.get("poll.enabled").await.expect("get"), Some(json!(false)));
    }
}
