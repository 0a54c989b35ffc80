use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which remote entity a conversation belongs to. Orders map to paid services,
/// tickets to support cases; both carry the same message-thread shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Order,
    Ticket,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Ticket => "ticket",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "order" => Some(Self::Order),
            "ticket" => Some(Self::Ticket),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable client snapshot as returned by the remote API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A single message in an order or ticket thread. The remote API returns
/// threads newest-first; callers must not reorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub body: String,
    pub staff_only: bool,
    pub files: Vec<String>,
}

/// An order or ticket, flattened to the fields the pipeline cares about.
/// Fetched fresh on every poll; never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    pub id: i64,
    pub source_type: SourceType,
    pub status: String,
    /// Service name for orders, subject line for tickets.
    pub label: String,
    pub user_id: i64,
    pub client: Client,
    /// Assigned employee ids; the first one is the candidate reply sender.
    pub employee_ids: Vec<i64>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub note: String,
    pub form_data: serde_json::Value,
    pub tags: Vec<String>,
    /// Tickets may be linked back to the order they were raised against.
    pub order_id: Option<i64>,
}

impl ConversationItem {
    /// Service name shown to the reviewer; tickets fall back to "Support".
    pub fn service_name(&self) -> String {
        match self.source_type {
            SourceType::Order => self.label.clone(),
            SourceType::Ticket => "Support".to_string(),
        }
    }

    pub fn subject(&self) -> String {
        self.label.clone()
    }

    pub fn manager_user_id(&self) -> Option<i64> {
        self.employee_ids.first().copied()
    }
}

/// An item whose most recent visible message is an unanswered client message,
/// together with the context needed to draft a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyCandidate {
    pub source_type: SourceType,
    pub item: ConversationItem,
    /// Full thread, newest first, exactly as fetched.
    pub messages: Vec<Message>,
    /// The specific client message to answer.
    pub client_message: Message,
    pub manager_user_id: Option<i64>,
}
