//! Poll orchestration: fetch items needing a reply, dedupe against the
//! ledger, generate drafts, and record an audit run. Every collaborator is
//! passed in explicitly so the whole flow runs against test doubles.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use replyq_agent::DraftComposer;
use replyq_core::{PollerRun, RunCounters, RunError, RunStatus, SourceType};
use replyq_db::repositories::{
    content_hash, DraftRepository, LedgerAction, LedgerRepository, ProcessedMessage,
    RunRepository,
};
use replyq_helpdesk::HelpdeskApi;

pub struct PollerDeps {
    pub helpdesk: Arc<dyn HelpdeskApi>,
    pub composer: DraftComposer,
    pub drafts: Arc<dyn DraftRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub runs: Arc<dyn RunRepository>,
}

#[derive(Debug, Serialize)]
pub struct PollOutcome {
    /// Absent on dry runs, which leave no audit trail.
    pub run_id: Option<String>,
    pub counters: RunCounters,
}

#[derive(Debug, Serialize)]
pub struct SendFailure {
    pub draft_id: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SendReport {
    pub sent: u32,
    pub errors: Vec<SendFailure>,
}

/// One poll pass. A failure to reach the remote listing aborts the run;
/// per-item failures are logged and counted without stopping the pass.
pub async fn run_poller(deps: &PollerDeps, lookback_hours: u32, dry_run: bool) -> Result<PollOutcome> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut counters = RunCounters::default();
    let mut error_log: Vec<RunError> = Vec::new();

    if !dry_run {
        let run = PollerRun {
            id: run_id.clone(),
            status: RunStatus::Running,
            counters,
            error_log: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        };
        deps.runs.start(&run).await.context("recording run start")?;
    }

    let candidates = match deps.helpdesk.find_items_needing_reply(true, true, lookback_hours).await
    {
        Ok(candidates) => candidates,
        Err(err) => {
            error!(error = %err, "polling the remote helpdesk failed");
            if !dry_run {
                let fatal = vec![RunError::fatal(err.to_string())];
                deps.runs.fail(&run_id, &counters, &fatal).await.context("recording run failure")?;
            }
            return Err(err).context("fetching items needing reply");
        }
    };

    info!(candidates = candidates.len(), lookback_hours, dry_run, "poll pass started");

    for candidate in &candidates {
        match candidate.source_type {
            SourceType::Order => counters.orders_checked += 1,
            SourceType::Ticket => counters.tickets_checked += 1,
        }
        counters.items_needing_reply += 1;

        let source_id = candidate.item.id;
        let message_id = candidate.client_message.id;

        let already =
            match deps.ledger.is_processed(candidate.source_type, source_id, message_id).await {
                Ok(already) => already,
                Err(err) => {
                    warn!(source_id, error = %err, "ledger check failed");
                    counters.errors += 1;
                    error_log.push(RunError::for_item(
                        candidate.source_type.as_str(),
                        source_id,
                        err.to_string(),
                    ));
                    continue;
                }
            };
        if already {
            counters.skipped += 1;
            continue;
        }

        match deps.composer.generate_draft(candidate).await {
            Ok(draft) => {
                if dry_run {
                    info!(
                        source_type = %candidate.source_type,
                        source_id,
                        confidence = draft.confidence.as_str(),
                        "dry run: draft generated but not persisted"
                    );
                    counters.drafts_created += 1;
                    continue;
                }

                let draft_id = draft.id.clone();
                if let Err(err) = deps.drafts.create(&draft).await {
                    warn!(source_id, error = %err, "persisting draft failed");
                    counters.errors += 1;
                    error_log.push(RunError::for_item(
                        candidate.source_type.as_str(),
                        source_id,
                        err.to_string(),
                    ));
                    continue;
                }

                let entry = ProcessedMessage {
                    source_type: candidate.source_type,
                    source_id,
                    message_id,
                    content_hash: content_hash(&candidate.client_message.body),
                    action: LedgerAction::DraftCreated,
                    draft_id: Some(draft_id),
                    error_message: None,
                    processed_at: Utc::now(),
                };
                if let Err(err) = deps.ledger.record(&entry).await {
                    // The draft exists; the message just is not deduplicated.
                    warn!(source_id, error = %err, "recording ledger entry failed");
                    counters.errors += 1;
                    error_log.push(RunError::for_item(
                        candidate.source_type.as_str(),
                        source_id,
                        err.to_string(),
                    ));
                }
                counters.drafts_created += 1;
            }
            Err(err) => {
                warn!(
                    source_type = %candidate.source_type,
                    source_id,
                    error = %err,
                    "draft generation failed"
                );
                let failure = err.to_string();
                counters.errors += 1;
                error_log.push(RunError::for_item(
                    candidate.source_type.as_str(),
                    source_id,
                    failure.clone(),
                ));

                if !dry_run {
                    // Record the failure so the next pass retries only after a
                    // new message arrives, not forever on the same one.
                    let entry = ProcessedMessage {
                        source_type: candidate.source_type,
                        source_id,
                        message_id,
                        content_hash: content_hash(&candidate.client_message.body),
                        action: LedgerAction::Error,
                        draft_id: None,
                        error_message: Some(failure),
                        processed_at: Utc::now(),
                    };
                    if let Err(err) = deps.ledger.record(&entry).await {
                        warn!(source_id, error = %err, "recording ledger error entry failed");
                        error_log.push(RunError::for_item(
                            candidate.source_type.as_str(),
                            source_id,
                            err.to_string(),
                        ));
                    }
                }
            }
        }
    }

    if !dry_run {
        if !error_log.is_empty() {
            deps.runs
                .append_errors(&run_id, &error_log)
                .await
                .context("recording run errors")?;
        }
        deps.runs.complete(&run_id, &counters).await.context("recording run completion")?;
    }

    info!(
        drafts_created = counters.drafts_created,
        skipped = counters.skipped,
        errors = counters.errors,
        "poll pass finished"
    );

    Ok(PollOutcome { run_id: (!dry_run).then_some(run_id), counters })
}

/// Send every approved draft as a visible reply from the item's manager.
/// Failures are isolated per draft.
pub async fn send_approved(deps: &PollerDeps) -> Result<SendReport> {
    let approved = deps.drafts.list_approved().await.context("listing approved drafts")?;
    let mut report = SendReport::default();

    for draft in approved {
        let result = deps
            .helpdesk
            .send_message(
                draft.source_type,
                draft.source_id,
                draft.outgoing_text(),
                draft.manager_user_id,
                false,
            )
            .await;

        match result {
            Ok(receipt) => {
                deps.drafts.mark_sent(&draft.id, &receipt).await.context("marking draft sent")?;
                info!(draft_id = %draft.id, source_id = draft.source_id, "draft sent");
                report.sent += 1;
            }
            Err(err) => {
                warn!(draft_id = %draft.id, error = %err, "sending draft failed");
                deps.drafts
                    .mark_send_error(&draft.id, &err.to_string())
                    .await
                    .context("marking draft send error")?;
                report
                    .errors
                    .push(SendFailure { draft_id: draft.id.0.clone(), error: err.to_string() });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;

    use replyq_agent::{DraftComposer, LlmClient};
    use replyq_core::{
        Client, ConversationItem, DraftStatus, Message, ReplyCandidate, RunStatus, SourceType,
    };
    use replyq_db::repositories::{
        DraftRepository, InMemoryDraftRepository, InMemoryLedgerRepository, InMemoryRunRepository,
        LedgerAction, LedgerRepository, ProcessedMessage, RepositoryError, RunRepository,
    };
    use replyq_helpdesk::{HelpdeskApi, HelpdeskError};

    use super::{run_poller, send_approved, PollerDeps};

    struct StubHelpdesk {
        candidates: Vec<ReplyCandidate>,
        fail_listing: bool,
        fail_send: bool,
        sends: AtomicU32,
    }

    impl StubHelpdesk {
        fn with_candidates(candidates: Vec<ReplyCandidate>) -> Self {
            Self { candidates, fail_listing: false, fail_send: false, sends: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl HelpdeskApi for StubHelpdesk {
        async fn find_items_needing_reply(
            &self,
            _check_orders: bool,
            _check_tickets: bool,
            _lookback_hours: u32,
        ) -> Result<Vec<ReplyCandidate>, HelpdeskError> {
            if self.fail_listing {
                return Err(HelpdeskError::Status { status: 503, body: "down".to_string() });
            }
            Ok(self.candidates.clone())
        }

        async fn send_message(
            &self,
            _source_type: SourceType,
            source_id: i64,
            _text: &str,
            _user_id: Option<i64>,
            _staff_only: bool,
        ) -> Result<serde_json::Value, HelpdeskError> {
            if self.fail_send {
                return Err(HelpdeskError::Status { status: 500, body: "boom".to_string() });
            }
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"id": source_id}))
        }
    }

    struct FailingLedger {
        fail_check: bool,
    }

    #[async_trait]
    impl LedgerRepository for FailingLedger {
        async fn is_processed(
            &self,
            _source_type: SourceType,
            _source_id: i64,
            _message_id: i64,
        ) -> Result<bool, RepositoryError> {
            if self.fail_check {
                return Err(RepositoryError::Decode("ledger read refused".to_string()));
            }
            Ok(false)
        }

        async fn record(&self, _entry: &ProcessedMessage) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("ledger write refused".to_string()))
        }
    }

    struct StubLlm {
        fail: bool,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            Ok("DRAFT:\nHi there, on it.\n\nNOTES:\nRoutine.".to_string())
        }
    }

    fn candidate(source_id: i64, message_id: i64) -> ReplyCandidate {
        let client_message = Message {
            id: message_id,
            user_id: 42,
            created_at: Some(Utc::now()),
            body: "any update?".to_string(),
            staff_only: false,
            files: Vec::new(),
        };
        ReplyCandidate {
            source_type: SourceType::Order,
            item: ConversationItem {
                id: source_id,
                source_type: SourceType::Order,
                status: "Working".to_string(),
                label: "Optimization Service".to_string(),
                user_id: 42,
                client: Client {
                    id: 42,
                    first_name: "Grace".to_string(),
                    last_name: "Hopper".to_string(),
                    email: "g@example.com".to_string(),
                },
                employee_ids: vec![7],
                last_message_at: Some(Utc::now()),
                created_at: Some(Utc::now()),
                note: String::new(),
                form_data: serde_json::Value::Null,
                tags: Vec::new(),
                order_id: None,
            },
            messages: vec![client_message.clone()],
            client_message,
            manager_user_id: Some(7),
        }
    }

    fn deps(helpdesk: StubHelpdesk, llm: StubLlm) -> PollerDeps {
        PollerDeps {
            helpdesk: Arc::new(helpdesk),
            composer: DraftComposer::new(Arc::new(llm)),
            drafts: Arc::new(InMemoryDraftRepository::new()),
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            runs: Arc::new(InMemoryRunRepository::new()),
        }
    }

    #[tokio::test]
    async fn poll_creates_drafts_and_completes_run() {
        let deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001), candidate(312, 9002)]),
            StubLlm { fail: false },
        );

        let outcome = run_poller(&deps, 24, false).await.expect("poll");

        assert_eq!(outcome.counters.drafts_created, 2);
        assert_eq!(outcome.counters.orders_checked, 2);
        assert_eq!(outcome.counters.errors, 0);

        let run_id = outcome.run_id.expect("run recorded");
        let run = deps.runs.find_by_id(&run_id).await.expect("find").expect("exists");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counters.drafts_created, 2);
        assert_eq!(deps.drafts.stats().await.expect("stats").pending, 2);
    }

    #[tokio::test]
    async fn second_pass_skips_already_processed_messages() {
        let deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001)]),
            StubLlm { fail: false },
        );

        let first = run_poller(&deps, 24, false).await.expect("first pass");
        assert_eq!(first.counters.drafts_created, 1);

        let second = run_poller(&deps, 24, false).await.expect("second pass");
        assert_eq!(second.counters.drafts_created, 0);
        assert_eq!(second.counters.skipped, 1);
        assert_eq!(deps.drafts.stats().await.expect("stats").total, 1);
    }

    #[tokio::test]
    async fn listing_failure_fails_the_run() {
        let mut helpdesk = StubHelpdesk::with_candidates(Vec::new());
        helpdesk.fail_listing = true;
        let deps = deps(helpdesk, StubLlm { fail: false });

        run_poller(&deps, 24, false).await.expect_err("poll must fail");
    }

    #[tokio::test]
    async fn generation_failure_is_logged_and_does_not_abort() {
        let deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001)]),
            StubLlm { fail: true },
        );

        let outcome = run_poller(&deps, 24, false).await.expect("poll completes");

        assert_eq!(outcome.counters.drafts_created, 0);
        assert_eq!(outcome.counters.errors, 1);

        let run_id = outcome.run_id.expect("run recorded");
        let run = deps.runs.find_by_id(&run_id).await.expect("find").expect("exists");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.error_log.len(), 1);
        assert_eq!(run.error_log[0].source_id, Some(311));

        // The failed message is ledgered so the next pass does not retry it.
        let second = run_poller(&deps, 24, false).await.expect("second pass");
        assert_eq!(second.counters.skipped, 1);
    }

    #[tokio::test]
    async fn ledger_write_failure_is_logged_and_does_not_abort() {
        let mut deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001), candidate(312, 9002)]),
            StubLlm { fail: false },
        );
        deps.ledger = Arc::new(FailingLedger { fail_check: false });

        let outcome = run_poller(&deps, 24, false).await.expect("poll completes");

        // Both drafts exist even though neither could be ledgered.
        assert_eq!(outcome.counters.drafts_created, 2);
        assert_eq!(outcome.counters.errors, 2);
        assert_eq!(deps.drafts.stats().await.expect("stats").pending, 2);

        let run_id = outcome.run_id.expect("run recorded");
        let run = deps.runs.find_by_id(&run_id).await.expect("find").expect("exists");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.error_log.len(), 2);
    }

    #[tokio::test]
    async fn ledger_check_failure_skips_the_item_and_continues() {
        let mut deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001)]),
            StubLlm { fail: false },
        );
        deps.ledger = Arc::new(FailingLedger { fail_check: true });

        let outcome = run_poller(&deps, 24, false).await.expect("poll completes");

        assert_eq!(outcome.counters.drafts_created, 0);
        assert_eq!(outcome.counters.errors, 1);

        let run_id = outcome.run_id.expect("run recorded");
        let run = deps.runs.find_by_id(&run_id).await.expect("find").expect("exists");
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn generation_failure_is_ledgered_with_its_message() {
        let ledger = Arc::new(InMemoryLedgerRepository::new());
        let deps = PollerDeps {
            helpdesk: Arc::new(StubHelpdesk::with_candidates(vec![candidate(311, 9001)])),
            composer: DraftComposer::new(Arc::new(StubLlm { fail: true })),
            drafts: Arc::new(InMemoryDraftRepository::new()),
            ledger: ledger.clone(),
            runs: Arc::new(InMemoryRunRepository::new()),
        };

        run_poller(&deps, 24, false).await.expect("poll completes");

        let entries = ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, LedgerAction::Error);
        assert_eq!(entries[0].error_message.as_deref(), Some("model unavailable"));
        assert!(entries[0].draft_id.is_none());
    }

    #[tokio::test]
    async fn dry_run_leaves_no_trace() {
        let deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001)]),
            StubLlm { fail: false },
        );

        let outcome = run_poller(&deps, 24, true).await.expect("dry run");

        assert_eq!(outcome.counters.drafts_created, 1);
        assert!(outcome.run_id.is_none());
        assert_eq!(deps.drafts.stats().await.expect("stats").total, 0);

        // A later real pass still processes the message.
        let real = run_poller(&deps, 24, false).await.expect("real pass");
        assert_eq!(real.counters.drafts_created, 1);
    }

    #[tokio::test]
    async fn send_approved_sends_edited_text_and_marks_sent() {
        let deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001)]),
            StubLlm { fail: false },
        );
        run_poller(&deps, 24, false).await.expect("poll");

        let pending = deps.drafts.list_pending(10).await.expect("pending");
        deps.drafts
            .approve(&pending[0].id, "manager", Some("Hi Grace, fixed."), None)
            .await
            .expect("approve");

        let report = send_approved(&deps).await.expect("send");

        assert_eq!(report.sent, 1);
        assert!(report.errors.is_empty());
        let sent = deps.drafts.find_by_id(&pending[0].id).await.expect("find").expect("exists");
        assert_eq!(sent.status, DraftStatus::Sent);
        assert_eq!(sent.remote_receipt, Some(serde_json::json!({"id": 311})));
    }

    #[tokio::test]
    async fn send_failure_marks_draft_errored_without_stopping() {
        let mut helpdesk = StubHelpdesk::with_candidates(vec![candidate(311, 9001)]);
        helpdesk.fail_send = true;
        let deps = deps(helpdesk, StubLlm { fail: false });
        run_poller(&deps, 24, false).await.expect("poll");

        let pending = deps.drafts.list_pending(10).await.expect("pending");
        deps.drafts.approve(&pending[0].id, "manager", None, None).await.expect("approve");

        let report = send_approved(&deps).await.expect("send runs");

        assert_eq!(report.sent, 0);
        assert_eq!(report.errors.len(), 1);
        let errored = deps.drafts.find_by_id(&pending[0].id).await.expect("find").expect("exists");
        assert_eq!(errored.status, DraftStatus::Error);
        assert!(errored.send_error.is_some());
    }

    #[tokio::test]
    async fn ledger_marks_the_exact_message_processed() {
        let deps = deps(
            StubHelpdesk::with_candidates(vec![candidate(311, 9001)]),
            StubLlm { fail: false },
        );
        run_poller(&deps, 24, false).await.expect("poll");

        assert!(deps
            .ledger
            .is_processed(SourceType::Order, 311, 9001)
            .await
            .expect("ledger check"));
        assert!(!deps
            .ledger
            .is_processed(SourceType::Order, 311, 9002)
            .await
            .expect("ledger check"));
    }
}
