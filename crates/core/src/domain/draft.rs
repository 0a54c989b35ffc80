use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::SourceType;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl DraftId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a generated draft. The machine is linear: a draft is reviewed
/// once (`pending -> approved | rejected`) and an approved draft is sent once
/// (`approved -> sent | error`). Terminal states have no outgoing edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Approved,
    Rejected,
    Sent,
    Error,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Sent => "sent",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "sent" => Some(Self::Sent),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: DraftStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Sent)
                | (Self::Approved, Self::Error)
        )
    }

    /// Gate used by callers before any status write; the persistence layer
    /// itself is last-write-wins.
    pub fn ensure_can_transition(self, next: DraftStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        Err(DomainError::InvalidDraftTransition { from: self, to: next })
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer-attention heuristic attached to every draft. Computed from the
/// model's notes and the draft length, never reported by the model itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// One entry of the serialized thread stored alongside a draft. Unlike the
/// prompt context, stored history is neither truncated nor capped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub sender: String,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A generated candidate reply awaiting human review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    pub source_type: SourceType,
    pub source_id: i64,
    pub client_name: String,
    pub client_email: String,
    pub service_name: String,
    pub subject: String,
    pub client_message: String,
    pub client_message_id: Option<i64>,
    pub conversation_history: Vec<ConversationEntry>,
    pub draft_response: String,
    pub edited_response: Option<String>,
    pub manager_user_id: Option<i64>,
    pub confidence: Confidence,
    pub ai_notes: String,
    pub status: DraftStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub remote_receipt: Option<serde_json::Value>,
    pub send_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    /// Text that actually goes out: the reviewer's edit when one exists.
    pub fn outgoing_text(&self) -> &str {
        self.edited_response.as_deref().unwrap_or(&self.draft_response)
    }
}
