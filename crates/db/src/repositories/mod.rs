use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replyq_core::{Draft, DraftId, PollerRun, RunCounters, RunError, SourceType};

pub mod draft;
pub mod ledger;
pub mod memory;
pub mod run;
pub mod settings;

pub use draft::SqlDraftRepository;
pub use ledger::{content_hash, SqlLedgerRepository};
pub use memory::{InMemoryDraftRepository, InMemoryLedgerRepository, InMemoryRunRepository};
pub use run::SqlRunRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Per-status draft counts for the review dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStats {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub sent: i64,
    pub error: i64,
    pub total: i64,
}

/// What the poller did with a message it has now seen. Messages skipped
/// because of an existing ledger row are never re-recorded, so the only
/// written actions are a created draft or a generation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    DraftCreated,
    Error,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DraftCreated => "draft_created",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft_created" => Some(Self::DraftCreated),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One row of the dedupe ledger. Insert-only; the composite key
/// (source_type, source_id, message_id) is unique. Error entries carry the
/// failure text so an operator can see why no draft exists for a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub source_type: SourceType,
    pub source_id: i64,
    pub message_id: i64,
    pub content_hash: String,
    pub action: LedgerAction,
    pub draft_id: Option<DraftId>,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn create(&self, draft: &Draft) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &DraftId) -> Result<Option<Draft>, RepositoryError>;

    /// Pending drafts oldest first, so the longest-waiting client surfaces
    /// at the top of the review queue.
    async fn list_pending(&self, limit: u32) -> Result<Vec<Draft>, RepositoryError>;

    /// Approved-but-unsent drafts in review order.
    async fn list_approved(&self) -> Result<Vec<Draft>, RepositoryError>;

    async fn approve(
        &self,
        id: &DraftId,
        reviewed_by: &str,
        edited_response: Option<&str>,
        review_notes: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn reject(
        &self,
        id: &DraftId,
        reviewed_by: &str,
        review_notes: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn mark_sent(
        &self,
        id: &DraftId,
        receipt: &serde_json::Value,
    ) -> Result<(), RepositoryError>;

    async fn mark_send_error(&self, id: &DraftId, error: &str) -> Result<(), RepositoryError>;

    async fn stats(&self) -> Result<DraftStats, RepositoryError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn is_processed(
        &self,
        source_type: SourceType,
        source_id: i64,
        message_id: i64,
    ) -> Result<bool, RepositoryError>;

    async fn record(&self, entry: &ProcessedMessage) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn start(&self, run: &PollerRun) -> Result<(), RepositoryError>;

    async fn complete(&self, id: &str, counters: &RunCounters) -> Result<(), RepositoryError>;

    async fn fail(
        &self,
        id: &str,
        counters: &RunCounters,
        error_log: &[RunError],
    ) -> Result<(), RepositoryError>;

    async fn append_errors(&self, id: &str, error_log: &[RunError])
        -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<PollerRun>, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, RepositoryError>;

    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), RepositoryError>;
}

pub(crate) fn decode_err(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(e.to_string())
}
