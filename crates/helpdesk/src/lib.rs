//! Typed facade over the remote helpdesk/order-management REST API.
//!
//! Exposes list/get/send operations for orders and tickets plus the derived
//! "items needing reply" query the poller is built on. All calls are
//! bearer-token authenticated and pinned to a fixed API version header.

pub mod client;
pub mod needs_reply;
mod wire;

use async_trait::async_trait;
use thiserror::Error;

use replyq_core::domain::conversation::{ReplyCandidate, SourceType};

pub use client::HelpdeskClient;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("invalid helpdesk configuration: {0}")]
    Config(String),
    #[error("helpdesk transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("helpdesk API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// The facade operations the poller and approval API depend on. Kept narrow so
/// tests can stub the remote side without HTTP.
#[async_trait]
pub trait HelpdeskApi: Send + Sync {
    async fn find_items_needing_reply(
        &self,
        check_orders: bool,
        check_tickets: bool,
        lookback_hours: u32,
    ) -> Result<Vec<ReplyCandidate>, HelpdeskError>;

    /// Send a reply into an order or ticket thread. Returns the raw remote
    /// receipt so callers can persist it verbatim.
    async fn send_message(
        &self,
        source_type: SourceType,
        source_id: i64,
        text: &str,
        user_id: Option<i64>,
        staff_only: bool,
    ) -> Result<serde_json::Value, HelpdeskError>;
}
