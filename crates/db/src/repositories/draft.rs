use chrono::{DateTime, Utc};
use sqlx::Row;

use replyq_core::{Confidence, Draft, DraftId, DraftStatus, SourceType};

use super::{decode_err, DraftRepository, DraftStats, RepositoryError};
use crate::DbPool;

pub struct SqlDraftRepository {
    pool: DbPool,
}

impl SqlDraftRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DRAFT_COLUMNS: &str = "id, source_type, source_id, client_name, client_email, service_name,
     subject, client_message, client_message_id, conversation_history, draft_response,
     edited_response, manager_user_id, confidence, ai_notes, status, reviewed_by, reviewed_at,
     review_notes, sent_at, remote_receipt, send_error, created_at";

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(decode_err)
}

fn parse_optional_datetime(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|s| parse_datetime(&s)).transpose()
}

fn row_to_draft(row: &sqlx::sqlite::SqliteRow) -> Result<Draft, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let source_type_str: String = row.try_get("source_type").map_err(decode_err)?;
    let source_type = SourceType::parse(&source_type_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown source_type {source_type_str}")))?;
    let status_str: String = row.try_get("status").map_err(decode_err)?;
    let status = DraftStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status {status_str}")))?;
    let confidence_str: String = row.try_get("confidence").map_err(decode_err)?;
    let confidence = Confidence::parse(&confidence_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown confidence {confidence_str}")))?;

    let history_json: String = row.try_get("conversation_history").map_err(decode_err)?;
    let conversation_history = serde_json::from_str(&history_json).map_err(decode_err)?;

    let receipt_json: Option<String> = row.try_get("remote_receipt").map_err(decode_err)?;
    let remote_receipt = receipt_json
        .map(|s| serde_json::from_str(&s).map_err(decode_err))
        .transpose()?;

    let created_at_str: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Draft {
        id: DraftId(id),
        source_type,
        source_id: row.try_get("source_id").map_err(decode_err)?,
        client_name: row.try_get("client_name").map_err(decode_err)?,
        client_email: row.try_get("client_email").map_err(decode_err)?,
        service_name: row.try_get("service_name").map_err(decode_err)?,
        subject: row.try_get("subject").map_err(decode_err)?,
        client_message: row.try_get("client_message").map_err(decode_err)?,
        client_message_id: row.try_get("client_message_id").map_err(decode_err)?,
        conversation_history,
        draft_response: row.try_get("draft_response").map_err(decode_err)?,
        edited_response: row.try_get("edited_response").map_err(decode_err)?,
        manager_user_id: row.try_get("manager_user_id").map_err(decode_err)?,
        confidence,
        ai_notes: row.try_get("ai_notes").map_err(decode_err)?,
        status,
        reviewed_by: row.try_get("reviewed_by").map_err(decode_err)?,
        reviewed_at: parse_optional_datetime(
            row.try_get("reviewed_at").map_err(decode_err)?,
        )?,
        review_notes: row.try_get("review_notes").map_err(decode_err)?,
        sent_at: parse_optional_datetime(row.try_get("sent_at").map_err(decode_err)?)?,
        remote_receipt,
        send_error: row.try_get("send_error").map_err(decode_err)?,
        created_at: parse_datetime(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl DraftRepository for SqlDraftRepository {
    async fn create(&self, draft: &Draft) -> Result<(), RepositoryError> {
        let history_json =
            serde_json::to_string(&draft.conversation_history).map_err(decode_err)?;
        let receipt_json = draft
            .remote_receipt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(decode_err)?;

        sqlx::query(
            "INSERT INTO draft_responses
                 (id, source_type, source_id, client_name, client_email, service_name, subject,
                  client_message, client_message_id, conversation_history, draft_response,
                  edited_response, manager_user_id, confidence, ai_notes, status, reviewed_by,
                  reviewed_at, review_notes, sent_at, remote_receipt, send_error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.id.0)
        .bind(draft.source_type.as_str())
        .bind(draft.source_id)
        .bind(&draft.client_name)
        .bind(&draft.client_email)
        .bind(&draft.service_name)
        .bind(&draft.subject)
        .bind(&draft.client_message)
        .bind(draft.client_message_id)
        .bind(history_json)
        .bind(&draft.draft_response)
        .bind(&draft.edited_response)
        .bind(draft.manager_user_id)
        .bind(draft.confidence.as_str())
        .bind(&draft.ai_notes)
        .bind(draft.status.as_str())
        .bind(&draft.reviewed_by)
        .bind(draft.reviewed_at.map(|dt| dt.to_rfc3339()))
        .bind(&draft.review_notes)
        .bind(draft.sent_at.map(|dt| dt.to_rfc3339()))
        .bind(receipt_json)
        .bind(&draft.send_error)
        .bind(draft.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &DraftId) -> Result<Option<Draft>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DRAFT_COLUMNS} FROM draft_responses WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_draft(r)?)),
            None => Ok(None),
        }
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<Draft>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DRAFT_COLUMNS} FROM draft_responses
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_draft).collect()
    }

    async fn list_approved(&self) -> Result<Vec<Draft>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DRAFT_COLUMNS} FROM draft_responses
             WHERE status = 'approved'
             ORDER BY reviewed_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_draft).collect()
    }

    async fn approve(
        &self,
        id: &DraftId,
        reviewed_by: &str,
        edited_response: Option<&str>,
        review_notes: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE draft_responses
             SET status = 'approved', reviewed_by = ?, reviewed_at = ?,
                 edited_response = ?, review_notes = ?
             WHERE id = ?",
        )
        .bind(reviewed_by)
        .bind(Utc::now().to_rfc3339())
        .bind(edited_response)
        .bind(review_notes)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reject(
        &self,
        id: &DraftId,
        reviewed_by: &str,
        review_notes: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE draft_responses
             SET status = 'rejected', reviewed_by = ?, reviewed_at = ?, review_notes = ?
             WHERE id = ?",
        )
        .bind(reviewed_by)
        .bind(Utc::now().to_rfc3339())
        .bind(review_notes)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_sent(
        &self,
        id: &DraftId,
        receipt: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let receipt_json = serde_json::to_string(receipt).map_err(decode_err)?;

        sqlx::query(
            "UPDATE draft_responses
             SET status = 'sent', sent_at = ?, remote_receipt = ?, send_error = NULL
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(receipt_json)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_send_error(&self, id: &DraftId, error: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE draft_responses SET status = 'error', send_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stats(&self) -> Result<DraftStats, RepositoryError> {
        let rows =
            sqlx::query("SELECT status, COUNT(*) AS count FROM draft_responses GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = DraftStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(decode_err)?;
            let count: i64 = row.try_get("count").map_err(decode_err)?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "approved" => stats.approved = count,
                "rejected" => stats.rejected = count,
                "sent" => stats.sent = count,
                "error" => stats.error = count,
                other => {
                    return Err(RepositoryError::Decode(format!("unknown status {other}")));
                }
            }
            stats.total += count;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use replyq_core::{
        Confidence, ConversationEntry, Draft, DraftId, DraftStatus, SourceType,
    };

    use super::SqlDraftRepository;
    use crate::migrations::run_pending;
    use crate::repositories::{DraftRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn test_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        pool
    }

    fn sample_draft(id: &str) -> Draft {
        Draft {
            id: DraftId(id.to_string()),
            source_type: SourceType::Order,
            source_id: 311,
            client_name: "Grace Hopper".to_string(),
            client_email: "g@example.com".to_string(),
            service_name: "Optimization Service".to_string(),
            subject: "Optimization Service".to_string(),
            client_message: "any update?".to_string(),
            client_message_id: Some(9001),
            conversation_history: vec![ConversationEntry {
                sender: "client".to_string(),
                message: "any update?".to_string(),
                created_at: Some(Utc::now()),
            }],
            draft_response: "Hi Grace, audit lands Friday.".to_string(),
            edited_response: None,
            manager_user_id: Some(7),
            confidence: Confidence::High,
            ai_notes: "Routine status question.".to_string(),
            status: DraftStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            sent_at: None,
            remote_receipt: None,
            send_error: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips_all_fields() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);
        let draft = sample_draft("d-1");

        repo.create(&draft).await.expect("create");
        let loaded = repo.find_by_id(&draft.id).await.expect("find").expect("exists");

        assert_eq!(loaded.client_name, draft.client_name);
        assert_eq!(loaded.conversation_history, draft.conversation_history);
        assert_eq!(loaded.status, DraftStatus::Pending);
        assert_eq!(loaded.confidence, Confidence::High);
        assert_eq!(loaded.client_message_id, Some(9001));
        assert_eq!(loaded.created_at.to_rfc3339(), draft.created_at.to_rfc3339());
    }

    #[tokio::test]
    async fn find_missing_draft_returns_none() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);
        let found = repo.find_by_id(&DraftId("nope".to_string())).await.expect("query");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_a_database_error() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);
        let draft = sample_draft("d-1");

        repo.create(&draft).await.expect("first create");
        let error = repo.create(&draft).await.expect_err("duplicate must fail");
        assert!(matches!(error, RepositoryError::Database(_)));
    }

    #[tokio::test]
    async fn pending_list_is_oldest_first_and_capped() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);

        let mut oldest = sample_draft("d-old");
        oldest.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut middle = sample_draft("d-mid");
        middle.created_at = Utc::now() - chrono::Duration::hours(1);
        let newest = sample_draft("d-new");

        repo.create(&newest).await.expect("create");
        repo.create(&oldest).await.expect("create");
        repo.create(&middle).await.expect("create");

        let pending = repo.list_pending(2).await.expect("list");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id.0, "d-old");
        assert_eq!(pending[1].id.0, "d-mid");
    }

    #[tokio::test]
    async fn approve_records_reviewer_and_edit() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);
        let draft = sample_draft("d-1");
        repo.create(&draft).await.expect("create");

        repo.approve(&draft.id, "manager", Some("Hi Grace, done!"), Some("tightened"))
            .await
            .expect("approve");

        let loaded = repo.find_by_id(&draft.id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, DraftStatus::Approved);
        assert_eq!(loaded.reviewed_by.as_deref(), Some("manager"));
        assert_eq!(loaded.edited_response.as_deref(), Some("Hi Grace, done!"));
        assert_eq!(loaded.review_notes.as_deref(), Some("tightened"));
        assert!(loaded.reviewed_at.is_some());
        assert_eq!(loaded.outgoing_text(), "Hi Grace, done!");
    }

    #[tokio::test]
    async fn reject_records_reviewer_without_touching_draft_text() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);
        let draft = sample_draft("d-1");
        repo.create(&draft).await.expect("create");

        repo.reject(&draft.id, "manager", None).await.expect("reject");

        let loaded = repo.find_by_id(&draft.id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, DraftStatus::Rejected);
        assert_eq!(loaded.draft_response, draft.draft_response);
        assert!(loaded.edited_response.is_none());
    }

    #[tokio::test]
    async fn mark_sent_stores_receipt_and_clears_send_error() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);
        let draft = sample_draft("d-1");
        repo.create(&draft).await.expect("create");
        repo.approve(&draft.id, "manager", None, None).await.expect("approve");
        repo.mark_send_error(&draft.id, "remote 502").await.expect("error");

        let receipt = serde_json::json!({"id": 777});
        repo.mark_sent(&draft.id, &receipt).await.expect("sent");

        let loaded = repo.find_by_id(&draft.id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, DraftStatus::Sent);
        assert_eq!(loaded.remote_receipt, Some(receipt));
        assert!(loaded.send_error.is_none());
        assert!(loaded.sent_at.is_some());
    }

    #[tokio::test]
    async fn approved_list_orders_by_review_time() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);

        for id in ["d-1", "d-2"] {
            repo.create(&sample_draft(id)).await.expect("create");
        }
        repo.approve(&DraftId("d-2".to_string()), "m", None, None).await.expect("approve");
        repo.approve(&DraftId("d-1".to_string()), "m", None, None).await.expect("approve");

        let approved = repo.list_approved().await.expect("list");
        assert_eq!(approved.len(), 2);
        assert_eq!(approved[0].id.0, "d-2");
    }

    #[tokio::test]
    async fn stats_counts_per_status() {
        let pool = test_pool().await;
        let repo = SqlDraftRepository::new(pool);

        for id in ["d-1", "d-2", "d-3"] {
            repo.create(&sample_draft(id)).await.expect("create");
        }
        repo.approve(&DraftId("d-2".to_string()), "m", None, None).await.expect("approve");
        repo.reject(&DraftId("d-3".to_string()), "m", None).await.expect("reject");

        let stats = repo.stats().await.expect("stats");
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.total, 3);
    }
}
