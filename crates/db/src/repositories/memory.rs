//! In-memory repository doubles for exercising orchestration without a pool.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use replyq_core::{
    Draft, DraftId, DraftStatus, PollerRun, RunCounters, RunError, RunStatus, SourceType,
};

use super::{
    DraftRepository, DraftStats, LedgerRepository, ProcessedMessage, RepositoryError,
    RunRepository,
};

#[derive(Default)]
pub struct InMemoryDraftRepository {
    drafts: Mutex<HashMap<String, Draft>>,
}

impl InMemoryDraftRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Draft> {
        self.drafts.lock().map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    fn update<F: FnOnce(&mut Draft)>(&self, id: &DraftId, apply: F) -> Result<(), RepositoryError> {
        let mut drafts = self.drafts.lock().map_err(|_| poisoned())?;
        if let Some(draft) = drafts.get_mut(&id.0) {
            apply(draft);
        }
        Ok(())
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Decode("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl DraftRepository for InMemoryDraftRepository {
    async fn create(&self, draft: &Draft) -> Result<(), RepositoryError> {
        let mut drafts = self.drafts.lock().map_err(|_| poisoned())?;
        if drafts.contains_key(&draft.id.0) {
            return Err(RepositoryError::Decode(format!("duplicate draft id {}", draft.id)));
        }
        drafts.insert(draft.id.0.clone(), draft.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &DraftId) -> Result<Option<Draft>, RepositoryError> {
        let drafts = self.drafts.lock().map_err(|_| poisoned())?;
        Ok(drafts.get(&id.0).cloned())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<Draft>, RepositoryError> {
        let drafts = self.drafts.lock().map_err(|_| poisoned())?;
        let mut pending: Vec<Draft> =
            drafts.values().filter(|d| d.status == DraftStatus::Pending).cloned().collect();
        pending.sort_by_key(|d| d.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn list_approved(&self) -> Result<Vec<Draft>, RepositoryError> {
        let drafts = self.drafts.lock().map_err(|_| poisoned())?;
        let mut approved: Vec<Draft> =
            drafts.values().filter(|d| d.status == DraftStatus::Approved).cloned().collect();
        approved.sort_by_key(|d| d.reviewed_at);
        Ok(approved)
    }

    async fn approve(
        &self,
        id: &DraftId,
        reviewed_by: &str,
        edited_response: Option<&str>,
        review_notes: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.update(id, |draft| {
            draft.status = DraftStatus::Approved;
            draft.reviewed_by = Some(reviewed_by.to_string());
            draft.reviewed_at = Some(Utc::now());
            draft.edited_response = edited_response.map(str::to_string);
            draft.review_notes = review_notes.map(str::to_string);
        })
    }

    async fn reject(
        &self,
        id: &DraftId,
        reviewed_by: &str,
        review_notes: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.update(id, |draft| {
            draft.status = DraftStatus::Rejected;
            draft.reviewed_by = Some(reviewed_by.to_string());
            draft.reviewed_at = Some(Utc::now());
            draft.review_notes = review_notes.map(str::to_string);
        })
    }

    async fn mark_sent(
        &self,
        id: &DraftId,
        receipt: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let receipt = receipt.clone();
        self.update(id, move |draft| {
            draft.status = DraftStatus::Sent;
            draft.sent_at = Some(Utc::now());
            draft.remote_receipt = Some(receipt);
            draft.send_error = None;
        })
    }

    async fn mark_send_error(&self, id: &DraftId, error: &str) -> Result<(), RepositoryError> {
        self.update(id, |draft| {
            draft.status = DraftStatus::Error;
            draft.send_error = Some(error.to_string());
        })
    }

    async fn stats(&self) -> Result<DraftStats, RepositoryError> {
        let drafts = self.drafts.lock().map_err(|_| poisoned())?;
        let mut stats = DraftStats::default();
        for draft in drafts.values() {
            match draft.status {
                DraftStatus::Pending => stats.pending += 1,
                DraftStatus::Approved => stats.approved += 1,
                DraftStatus::Rejected => stats.rejected += 1,
                DraftStatus::Sent => stats.sent += 1,
                DraftStatus::Error => stats.error += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }
}

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    entries: Mutex<HashMap<(String, i64, i64), ProcessedMessage>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ProcessedMessage> {
        self.entries.lock().map(|m| m.values().cloned().collect()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn is_processed(
        &self,
        source_type: SourceType,
        source_id: i64,
        message_id: i64,
    ) -> Result<bool, RepositoryError> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.contains_key(&(source_type.as_str().to_string(), source_id, message_id)))
    }

    async fn record(&self, entry: &ProcessedMessage) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        let key = (entry.source_type.as_str().to_string(), entry.source_id, entry.message_id);
        if entries.contains_key(&key) {
            return Err(RepositoryError::Decode("duplicate ledger entry".to_string()));
        }
        entries.insert(key, entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<HashMap<String, PollerRun>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn start(&self, run: &PollerRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().map_err(|_| poisoned())?;
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn complete(&self, id: &str, counters: &RunCounters) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().map_err(|_| poisoned())?;
        if let Some(run) = runs.get_mut(id) {
            run.status = RunStatus::Completed;
            run.counters = *counters;
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        counters: &RunCounters,
        error_log: &[RunError],
    ) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().map_err(|_| poisoned())?;
        if let Some(run) = runs.get_mut(id) {
            run.status = RunStatus::Failed;
            run.counters = *counters;
            run.error_log = error_log.to_vec();
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn append_errors(
        &self,
        id: &str,
        error_log: &[RunError],
    ) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().map_err(|_| poisoned())?;
        if let Some(run) = runs.get_mut(id) {
            run.error_log = error_log.to_vec();
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PollerRun>, RepositoryError> {
        let runs = self.runs.lock().map_err(|_| poisoned())?;
        Ok(runs.get(id).cloned())
    }
}
