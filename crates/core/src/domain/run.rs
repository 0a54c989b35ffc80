use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Per-run counters. `skipped` counts ledger hits, `errors` counts items whose
/// generation or persistence failed without aborting the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub orders_checked: u32,
    pub tickets_checked: u32,
    pub items_needing_reply: u32,
    pub drafts_created: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// One structured entry in a run's error log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub source_type: Option<String>,
    pub source_id: Option<i64>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl RunError {
    pub fn for_item(source_type: &str, source_id: i64, error: impl Into<String>) -> Self {
        Self {
            source_type: Some(source_type.to_string()),
            source_id: Some(source_id),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self { source_type: None, source_id: None, error: error.into(), timestamp: Utc::now() }
    }
}

/// Append-only audit record, one per poller invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollerRun {
    pub id: String,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub error_log: Vec<RunError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
