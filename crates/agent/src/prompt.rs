//! Prompt construction: the fixed brand-voice instruction set plus a
//! deterministic per-call context block.

use replyq_core::domain::conversation::{ConversationItem, Message, SourceType};

/// Prompt context keeps at most this many messages of history.
pub const HISTORY_MESSAGE_CAP: usize = 10;
/// Each history entry's body is capped at this many characters.
pub const HISTORY_BODY_CAP: usize = 500;
const TRUNCATION_SUFFIX: &str = "... [truncated]";

/// Brand-voice and formatting rules, based on the account manager handbook.
/// Drafts are reviewed by a human before sending.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant helping draft customer responses for LocalLift, a Google Business Profile management service. Your drafts will be reviewed by account managers before sending.

## LocalLift Brand Voice
- Nerdy and nice, fun and friendly
- Professional but approachable
- You are an expert guide helping customers navigate the local-search landscape
- Never use \"Cheers\" as a closing

## Message Format Rules
1. Always start with a greeting: \"Hi {name}\" or \"Howdy {name}\" or \"Good morning/afternoon {name}\"
2. Keep messages to 5 sentences or less when possible
3. Be direct and concise - most customers read on mobile
4. Use bullet points only when listing 3+ distinct items
5. End with a friendly closing: \"Thanks!\" or \"All my best,\" or \"Let me know if you have questions!\"

## Services & Timelines (use when relevant)
- **Setup Service** ($350): 2-4 weeks to verify and set up listing
- **Optimization Service** ($350): 2-4 weeks, results in 30-90 days
- **Management Service** ($350/month): Initial optimization in first 30 days, then ongoing monthly management
- **Support Service** ($350/incident): For issues like suspensions, duplicates, recovery

## Service Stages (first 30 days of Management)
- Days 1-7 [Onboarding]: Intake form, location group ID, setup tools
- Days 8-15 [Audit]: 100-point audit, create scorecard
- Days 16-23 [Enhancement]: Create & implement optimization guide
- Days 24-30 [Management]: Posts, Q&A, review responses, service descriptions

## Common Response Scenarios

### Timeline Questions
\"We're currently in the [stage] phase. You can expect [next milestone] within [timeframe]. Results from optimization typically show within 30-90 days.\"

### Status Updates
\"Great news - we've completed [what was done]. Next up, we'll be [next step]. I'll send that over for your review by [date].\"

### Edit Requests
\"Got it! I'll make those changes to [item]. You should see the updates within [timeframe].\"

### Asking for Information
\"To move forward, I'll need [specific items]. Once I have those, I can [next action].\"

### Results Questions
\"Profile optimization results typically appear within 30-90 days as Google indexes the changes. We're monitoring your rankings via our grid reports.\"

## Handling Difficult Situations
- If client is frustrated: Acknowledge, apologize if warranted, provide clear next steps
- If you don't know something: Say \"Let me check with the team and get back to you\"
- If outside scope: Explain what is/isn't included, offer alternatives

## Do NOT:
- Make promises about specific ranking improvements
- Guarantee timelines that haven't been discussed
- Provide technical Google support advice (that's a separate service)
- Use excessive emojis
- Write long paragraphs

## Draft Guidelines
Generate a natural, helpful response that:
1. Addresses the customer's specific question/concern
2. Provides clear, actionable information
3. Sets appropriate expectations
4. Maintains the friendly LocalLift tone
5. Is concise enough to be read on mobile";

/// Format the thread for prompt context: chronological order, at most the 10
/// most recent entries, each body capped at 500 characters. Stored history is
/// untouched by this cap; it applies to the prompt only.
pub fn format_conversation_history(messages: &[Message], client_user_id: i64) -> String {
    let chronological: Vec<&Message> = messages.iter().rev().collect();
    let start = chronological.len().saturating_sub(HISTORY_MESSAGE_CAP);

    chronological[start..]
        .iter()
        .map(|msg| {
            let sender = if msg.staff_only {
                "STAFF (internal)"
            } else if msg.user_id == client_user_id {
                "CLIENT"
            } else {
                "STAFF"
            };
            format!("[{sender}]: {}", truncate_body(&msg.body))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() > HISTORY_BODY_CAP {
        let capped: String = body.chars().take(HISTORY_BODY_CAP).collect();
        format!("{capped}{TRUNCATION_SUFFIX}")
    } else {
        body.to_string()
    }
}

/// Derive a service-stage hint from an order's free-text status. Tickets have
/// no stage ladder.
pub fn service_stage(source_type: SourceType, status: &str) -> Option<&'static str> {
    if source_type != SourceType::Order {
        return None;
    }
    let status = status.to_lowercase();
    if status.contains("pending") || status.contains("submitted") {
        Some("Customer is in ONBOARDING phase (Days 1-7).")
    } else if status.contains("working") || status.contains("setup") {
        Some("Customer is in SETUP/AUDIT phase (Days 8-15).")
    } else if status.contains("audit") {
        Some("Customer is in AUDIT phase - audit should be sent soon.")
    } else if status.contains("enhancement") {
        Some("Customer is in ENHANCEMENT phase (Days 16-23).")
    } else if status.contains("management") || status.contains("completed") {
        Some("Customer is in ongoing MANAGEMENT phase.")
    } else {
        None
    }
}

/// Assemble the per-call user prompt. Every input is echoed deterministically;
/// the model is asked for two labeled sections the composer splits on.
pub fn build_user_prompt(
    source_type: SourceType,
    item: &ConversationItem,
    messages: &[Message],
    client_message: &Message,
) -> String {
    let client_name = non_empty(item.client.full_name())
        .or_else(|| non_empty(item.client.first_name.clone()))
        .unwrap_or_else(|| "there".to_string());
    let service_name = item.service_name();
    let subject = item.subject();
    let history = format_conversation_history(messages, item.user_id);

    let mut prompt = format!(
        "Generate a draft response for this customer message.\n\n\
         ## Context\n\
         - **Source**: {} #{}\n\
         - **Service**: {service_name}\n\
         - **Subject**: {subject}\n\
         - **Client Name**: {client_name}\n\
         - **Status**: {}\n",
        source_type.as_str().to_uppercase(),
        item.id,
        item.status,
    );

    if let Some(stage) = service_stage(source_type, &item.status) {
        prompt.push_str(&format!("- **Stage**: {stage}\n"));
    }
    if !item.note.is_empty() {
        prompt.push_str(&format!("- **Internal Note**: {}\n", item.note));
    }

    prompt.push_str(&format!(
        "\n## Conversation History\n{history}\n\n\
         ## Message to Reply To\n{}\n\n\
         ---\n\n\
         Please provide:\n\
         1. A draft response following LocalLift's voice and format guidelines\n\
         2. Brief notes for the reviewer (confidence level, anything to verify, suggested edits)\n\n\
         Format your response as:\n\
         DRAFT:\n\
         [your draft message here]\n\n\
         NOTES:\n\
         [your notes for the reviewer]",
        client_message.body,
    ));

    prompt
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}
