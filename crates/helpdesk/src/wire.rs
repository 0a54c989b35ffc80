//! Wire DTOs for the remote API. Parsing is deliberately lenient: missing
//! client fields default to empty and malformed timestamps degrade to `None`
//! rather than failing the whole call.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use replyq_core::domain::conversation::{Client, ConversationItem, Message, SourceType};

#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientDto {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name_f: String,
    #[serde(default)]
    pub name_l: String,
    #[serde(default)]
    pub email: String,
}

impl From<ClientDto> for Client {
    fn from(dto: ClientDto) -> Self {
        Client { id: dto.id, first_name: dto.name_f, last_name: dto.name_l, email: dto.email }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmployeeDto {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct MessageDto {
    pub id: i64,
    pub user_id: i64,
    pub created_at: Option<String>,
    pub message: String,
    #[serde(default)]
    pub staff_only: bool,
    #[serde(default)]
    pub files: Vec<serde_json::Value>,
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        Message {
            id: dto.id,
            user_id: dto.user_id,
            created_at: dto.created_at.as_deref().and_then(parse_timestamp),
            body: dto.message,
            staff_only: dto.staff_only,
            files: dto.files.iter().filter_map(file_name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderDto {
    pub id: i64,
    pub status: String,
    pub service: String,
    pub user_id: i64,
    #[serde(default)]
    pub client: ClientDto,
    #[serde(default)]
    pub employees: Vec<EmployeeDto>,
    pub last_message_at: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub form_data: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<OrderDto> for ConversationItem {
    fn from(dto: OrderDto) -> Self {
        ConversationItem {
            id: dto.id,
            source_type: SourceType::Order,
            status: dto.status,
            label: dto.service,
            user_id: dto.user_id,
            client: dto.client.into(),
            employee_ids: dto.employees.into_iter().map(|e| e.id).collect(),
            last_message_at: dto.last_message_at.as_deref().and_then(parse_timestamp),
            created_at: dto.created_at.as_deref().and_then(parse_timestamp),
            note: dto.note,
            form_data: dto.form_data,
            tags: dto.tags,
            order_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TicketDto {
    pub id: i64,
    pub status: String,
    pub subject: String,
    pub user_id: i64,
    #[serde(default)]
    pub client: ClientDto,
    #[serde(default)]
    pub employees: Vec<EmployeeDto>,
    pub last_message_at: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub form_data: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    pub order_id: Option<i64>,
}

impl From<TicketDto> for ConversationItem {
    fn from(dto: TicketDto) -> Self {
        ConversationItem {
            id: dto.id,
            source_type: SourceType::Ticket,
            status: dto.status,
            label: dto.subject,
            user_id: dto.user_id,
            client: dto.client.into(),
            employee_ids: dto.employees.into_iter().map(|e| e.id).collect(),
            last_message_at: dto.last_message_at.as_deref().and_then(parse_timestamp),
            created_at: dto.created_at.as_deref().and_then(parse_timestamp),
            note: dto.note,
            form_data: dto.form_data,
            tags: dto.tags,
            order_id: dto.order_id,
        }
    }
}

/// Accepts RFC 3339 with either `Z` or an explicit offset. Anything else is
/// treated as absent.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

fn file_name(value: &serde_json::Value) -> Option<String> {
    value
        .get("name")
        .or_else(|| value.get("filename"))
        .and_then(|n| n.as_str())
        .map(String::from)
        .or_else(|| value.as_str().map(String::from))
}
