use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use replyq_core::domain::conversation::{Message, ReplyCandidate};
use replyq_core::{Confidence, ConversationEntry, Draft, DraftId, DraftStatus};

use crate::llm::LlmClient;
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};

const DRAFT_MARKER: &str = "DRAFT:";
const NOTES_MARKER: &str = "NOTES:";
const MISSING_NOTES: &str = "No notes provided";

/// Drafts that read longer than this get knocked down to medium confidence.
const LONG_DRAFT_THRESHOLD: usize = 400;

/// Phrases in the model's reviewer notes that signal it wants a human to look
/// closely. Matched case-insensitively.
const HEDGE_PHRASES: &[&str] = &[
    "not sure",
    "unclear",
    "need more",
    "check with",
    "might",
    "possibly",
    "complex",
    "escalate",
];

/// Turns one reply candidate into one pending draft via a single model
/// completion. Holds no state between calls.
pub struct DraftComposer {
    llm: Arc<dyn LlmClient>,
}

impl DraftComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate_draft(&self, candidate: &ReplyCandidate) -> Result<Draft> {
        let item = &candidate.item;
        let prompt = build_user_prompt(
            candidate.source_type,
            item,
            &candidate.messages,
            &candidate.client_message,
        );

        let output = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        let (draft_response, ai_notes) = parse_output(&output);
        let confidence = determine_confidence(&draft_response, &ai_notes);

        if ai_notes == MISSING_NOTES {
            warn!(
                source_type = %candidate.source_type,
                source_id = item.id,
                "model output missing DRAFT/NOTES markers, using raw output"
            );
        }

        let draft = Draft {
            id: DraftId::generate(),
            source_type: candidate.source_type,
            source_id: item.id,
            client_name: item.client.full_name(),
            client_email: item.client.email.clone(),
            service_name: item.service_name(),
            subject: item.subject(),
            client_message: candidate.client_message.body.clone(),
            client_message_id: Some(candidate.client_message.id),
            conversation_history: stored_history(&candidate.messages, item.user_id),
            draft_response,
            edited_response: None,
            manager_user_id: candidate.manager_user_id,
            confidence,
            ai_notes,
            status: DraftStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            sent_at: None,
            remote_receipt: None,
            send_error: None,
            created_at: Utc::now(),
        };

        info!(
            draft_id = %draft.id,
            source_type = %draft.source_type,
            source_id = draft.source_id,
            confidence = draft.confidence.as_str(),
            "draft generated"
        );

        Ok(draft)
    }
}

/// Full thread exactly as fetched (newest first), with nothing truncated.
/// Chronological ordering and the body cap apply to the prompt only.
fn stored_history(messages: &[Message], client_user_id: i64) -> Vec<ConversationEntry> {
    messages
        .iter()
        .map(|msg| ConversationEntry {
            sender: if msg.staff_only {
                "staff_internal".to_string()
            } else if msg.user_id == client_user_id {
                "client".to_string()
            } else {
                "staff".to_string()
            },
            message: msg.body.clone(),
            created_at: msg.created_at,
        })
        .collect()
}

/// Split the model output on the literal `DRAFT:` / `NOTES:` markers. When
/// either marker is missing, the whole output becomes the draft.
pub fn parse_output(output: &str) -> (String, String) {
    let trimmed = output.trim();

    if trimmed.contains(DRAFT_MARKER) && trimmed.contains(NOTES_MARKER) {
        if let Some((draft_part, notes_part)) = trimmed.split_once(NOTES_MARKER) {
            let draft = draft_part
                .split_once(DRAFT_MARKER)
                .map(|(_, rest)| rest)
                .unwrap_or(draft_part)
                .trim()
                .to_string();
            return (draft, notes_part.trim().to_string());
        }
    }

    (trimmed.to_string(), MISSING_NOTES.to_string())
}

/// Heuristic attention score for the reviewer. Hedging in the notes always
/// wins; otherwise long drafts are medium and everything else high.
pub fn determine_confidence(draft: &str, notes: &str) -> Confidence {
    let notes_lower = notes.to_lowercase();
    if HEDGE_PHRASES.iter().any(|phrase| notes_lower.contains(phrase)) {
        return Confidence::Low;
    }
    if draft.chars().count() > LONG_DRAFT_THRESHOLD {
        return Confidence::Medium;
    }
    Confidence::High
}
