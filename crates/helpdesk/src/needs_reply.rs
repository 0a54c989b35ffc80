//! Reply-detection policy, kept as pure functions so the poller's selection
//! behavior is testable without HTTP.

use chrono::{DateTime, Utc};

use replyq_core::domain::conversation::{ConversationItem, Message, SourceType};

/// Ticket statuses that never need a reply.
const CLOSED_TICKET_STATUSES: [&str; 2] = ["closed", "resolved"];

pub fn is_closed_ticket_status(status: &str) -> bool {
    CLOSED_TICKET_STATUSES.contains(&status.to_lowercase().as_str())
}

/// Items with no recorded activity timestamp are kept; the remote API omits
/// `last_message_at` for threads it has not indexed yet.
pub fn within_lookback(last_message_at: Option<DateTime<Utc>>, cutoff: DateTime<Utc>) -> bool {
    match last_message_at {
        Some(at) => at >= cutoff,
        None => true,
    }
}

/// Walk the thread newest-first, skip staff-only messages, and inspect only
/// the single most recent visible message. It is an unanswered client message
/// iff its sender is the item's owning user. If the most recent visible
/// message is staff-authored the item is skipped, even when an older client
/// message was never answered; only the most recent visible message governs.
pub fn select_client_message<'a>(
    owner_user_id: i64,
    messages: &'a [Message],
) -> Option<&'a Message> {
    let first_visible = messages.iter().find(|msg| !msg.staff_only)?;
    (first_visible.user_id == owner_user_id).then_some(first_visible)
}

/// Whether a listed item is even worth fetching messages for.
pub fn item_qualifies(item: &ConversationItem, cutoff: DateTime<Utc>) -> bool {
    if item.source_type == SourceType::Ticket && is_closed_ticket_status(&item.status) {
        return false;
    }
    within_lookback(item.last_message_at, cutoff)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use replyq_core::domain::conversation::{
        Client, ConversationItem, Message, SourceType,
    };

    use super::{is_closed_ticket_status, item_qualifies, select_client_message, within_lookback};

    fn message(id: i64, user_id: i64, staff_only: bool) -> Message {
        Message {
            id,
            user_id,
            created_at: Some(Utc::now()),
            body: format!("message {id}"),
            staff_only,
            files: Vec::new(),
        }
    }

    fn ticket(status: &str) -> ConversationItem {
        ConversationItem {
            id: 1,
            source_type: SourceType::Ticket,
            status: status.to_string(),
            label: "subject".to_string(),
            user_id: 42,
            client: Client::default(),
            employee_ids: vec![7],
            last_message_at: Some(Utc::now()),
            created_at: Some(Utc::now()),
            note: String::new(),
            form_data: serde_json::Value::Null,
            tags: Vec::new(),
            order_id: None,
        }
    }

    #[test]
    fn latest_visible_client_message_is_selected() {
        // Newest first: client wrote last.
        let messages = vec![message(3, 42, false), message(2, 7, false), message(1, 42, false)];
        let selected = select_client_message(42, &messages).expect("should select");
        assert_eq!(selected.id, 3);
    }

    #[test]
    fn staff_only_messages_are_invisible_to_detection() {
        // An internal staff note on top must not mask the client's message.
        let messages = vec![message(4, 7, true), message(3, 42, false), message(2, 7, false)];
        let selected = select_client_message(42, &messages).expect("should select");
        assert_eq!(selected.id, 3);
    }

    #[test]
    fn staff_reply_on_top_excludes_the_item() {
        // Client asked, staff answered: nothing to do.
        let messages = vec![message(3, 7, false), message(2, 42, false)];
        assert!(select_client_message(42, &messages).is_none());
    }

    #[test]
    fn older_unanswered_client_message_does_not_requalify() {
        // Staff replied most recently, but an earlier client message was never
        // addressed. Existing policy: only the most recent visible message
        // governs, so the item stays excluded.
        let messages =
            vec![message(4, 7, false), message(3, 42, false), message(2, 42, false)];
        assert!(select_client_message(42, &messages).is_none());
    }

    #[test]
    fn empty_thread_selects_nothing() {
        assert!(select_client_message(42, &[]).is_none());
    }

    #[test]
    fn closed_and_resolved_tickets_are_filtered_case_insensitively() {
        assert!(is_closed_ticket_status("Closed"));
        assert!(is_closed_ticket_status("RESOLVED"));
        assert!(!is_closed_ticket_status("open"));

        let cutoff = Utc::now() - Duration::hours(24);
        assert!(!item_qualifies(&ticket("Closed"), cutoff));
        assert!(item_qualifies(&ticket("Open"), cutoff));
    }

    #[test]
    fn lookback_window_filters_stale_items_but_keeps_unknown() {
        let cutoff = Utc::now() - Duration::hours(24);
        assert!(within_lookback(Some(Utc::now()), cutoff));
        assert!(!within_lookback(Some(Utc::now() - Duration::hours(48)), cutoff));
        assert!(within_lookback(None, cutoff), "absent timestamp keeps the item");
    }
}
