use chrono::{DateTime, Utc};
use sqlx::Row;

use replyq_core::{PollerRun, RunCounters, RunError, RunStatus};

use super::{decode_err, RepositoryError, RunRepository};
use crate::DbPool;

pub struct SqlRunRepository {
    pool: DbPool,
}

impl SqlRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<PollerRun, RepositoryError> {
    let status_str: String = row.try_get("status").map_err(decode_err)?;
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown run status {status_str}")))?;

    let counters_json: String = row.try_get("counters").map_err(decode_err)?;
    let error_log_json: String = row.try_get("error_log").map_err(decode_err)?;
    let started_at_str: String = row.try_get("started_at").map_err(decode_err)?;
    let completed_at_str: Option<String> = row.try_get("completed_at").map_err(decode_err)?;

    Ok(PollerRun {
        id: row.try_get("id").map_err(decode_err)?,
        status,
        counters: serde_json::from_str(&counters_json).map_err(decode_err)?,
        error_log: serde_json::from_str(&error_log_json).map_err(decode_err)?,
        started_at: DateTime::parse_from_rfc3339(&started_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(decode_err)?,
        completed_at: completed_at_str
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(decode_err)
            })
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl RunRepository for SqlRunRepository {
    async fn start(&self, run: &PollerRun) -> Result<(), RepositoryError> {
        let counters_json = serde_json::to_string(&run.counters).map_err(decode_err)?;
        let error_log_json = serde_json::to_string(&run.error_log).map_err(decode_err)?;

        sqlx::query(
            "INSERT INTO poller_runs (id, status, counters, error_log, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(run.status.as_str())
        .bind(counters_json)
        .bind(error_log_json)
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete(&self, id: &str, counters: &RunCounters) -> Result<(), RepositoryError> {
        let counters_json = serde_json::to_string(counters).map_err(decode_err)?;

        sqlx::query(
            "UPDATE poller_runs SET status = 'completed', counters = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(counters_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        counters: &RunCounters,
        error_log: &[RunError],
    ) -> Result<(), RepositoryError> {
        let counters_json = serde_json::to_string(counters).map_err(decode_err)?;
        let error_log_json = serde_json::to_string(error_log).map_err(decode_err)?;

        sqlx::query(
            "UPDATE poller_runs
             SET status = 'failed', counters = ?, error_log = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(counters_json)
        .bind(error_log_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_errors(
        &self,
        id: &str,
        error_log: &[RunError],
    ) -> Result<(), RepositoryError> {
        let error_log_json = serde_json::to_string(error_log).map_err(decode_err)?;

        sqlx::query("UPDATE poller_runs SET error_log = ? WHERE id = ?")
            .bind(error_log_json)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PollerRun>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status, counters, error_log, started_at, completed_at
             FROM poller_runs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_run(r)?)),
            None => Ok(None),
        }
    }
}
