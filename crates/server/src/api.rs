//! Review API consumed by the queue UI and by operators with curl.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use replyq_core::{Draft, DraftId, DraftStatus, DomainError};
use replyq_db::repositories::{DraftRepository, RepositoryError};
use replyq_helpdesk::HelpdeskApi;

const QUEUE_PAGE_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub drafts: Arc<dyn DraftRepository>,
    pub helpdesk: Arc<dyn HelpdeskApi>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/drafts", get(list_drafts))
        .route("/api/drafts/{id}", get(get_draft))
        .route("/api/drafts/{id}/approve", post(approve_draft))
        .route("/api/drafts/{id}/approve-and-send", post(approve_and_send_draft))
        .route("/api/drafts/{id}/reject", post(reject_draft))
        .route("/api/stats", get(stats))
        .route("/api/send-approved", post(send_approved))
        .with_state(state)
}

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(message) => {
                error!(correlation_id, error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message, "correlation_id": correlation_id })))
            .into_response()
    }
}

/// Review fields a manager attaches when acting on a draft. `reviewed_by`
/// is mandatory so every reviewed draft names who signed off on it.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub reviewed_by: Option<String>,
    pub edited_response: Option<String>,
    pub review_notes: Option<String>,
}

impl ReviewRequest {
    fn reviewer(&self) -> Result<&str, ApiError> {
        match self.reviewed_by.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ApiError::BadRequest("reviewed_by is required".to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueueResponse {
    drafts: Vec<Draft>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct SendFailure {
    id: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct SendReport {
    sent: u32,
    errors: Vec<SendFailure>,
}

async fn list_drafts(State(state): State<AppState>) -> Result<Json<QueueResponse>, ApiError> {
    let drafts = state.drafts.list_pending(QUEUE_PAGE_LIMIT).await?;
    let count = drafts.len();
    Ok(Json(QueueResponse { drafts, count }))
}

async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Draft>, ApiError> {
    let draft = fetch_draft(&state, &id).await?;
    Ok(Json(draft))
}

async fn approve_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<Draft>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let reviewer = request.reviewer()?;
    let draft = fetch_draft(&state, &id).await?;
    require_transition(&draft, DraftStatus::Approved)?;

    state
        .drafts
        .approve(
            &draft.id,
            reviewer,
            request.edited_response.as_deref(),
            request.review_notes.as_deref(),
        )
        .await?;

    info!(draft_id = %draft.id, reviewer, "draft approved");
    let updated = fetch_draft(&state, &id).await?;
    Ok(Json(updated))
}

async fn reject_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<Draft>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let reviewer = request.reviewer()?;
    let draft = fetch_draft(&state, &id).await?;
    require_transition(&draft, DraftStatus::Rejected)?;

    state
        .drafts
        .reject(&draft.id, reviewer, request.review_notes.as_deref())
        .await?;

    info!(draft_id = %draft.id, reviewer, "draft rejected");
    let updated = fetch_draft(&state, &id).await?;
    Ok(Json(updated))
}

async fn approve_and_send_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<Draft>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let reviewer = request.reviewer()?;
    let draft = fetch_draft(&state, &id).await?;
    require_transition(&draft, DraftStatus::Approved)?;

    state
        .drafts
        .approve(
            &draft.id,
            reviewer,
            request.edited_response.as_deref(),
            request.review_notes.as_deref(),
        )
        .await?;

    let approved = fetch_draft(&state, &id).await?;
    send_one(&state, &approved).await?;
    let updated = fetch_draft(&state, &id).await?;
    Ok(Json(updated))
}

async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state.drafts.stats().await?;
    Ok(Json(serde_json::to_value(stats).map_err(|e| ApiError::Internal(e.to_string()))?))
}

async fn send_approved(State(state): State<AppState>) -> Result<Json<SendReport>, ApiError> {
    let approved = state.drafts.list_approved().await?;
    let mut report = SendReport { sent: 0, errors: Vec::new() };

    for draft in approved {
        match send_one(&state, &draft).await {
            Ok(()) => report.sent += 1,
            Err(
                ApiError::Internal(message)
                | ApiError::BadRequest(message)
                | ApiError::NotFound(message),
            ) => {
                report.errors.push(SendFailure { id: draft.id.0.clone(), error: message });
            }
        }
    }

    Ok(Json(report))
}

async fn fetch_draft(state: &AppState, id: &str) -> Result<Draft, ApiError> {
    state
        .drafts
        .find_by_id(&DraftId(id.to_string()))
        .await?
        .ok_or_else(|| ApiError::NotFound("Draft not found".to_string()))
}

fn require_transition(draft: &Draft, next: DraftStatus) -> Result<(), ApiError> {
    if let Err(DomainError::InvalidDraftTransition { from, .. }) =
        draft.status.ensure_can_transition(next)
    {
        return Err(ApiError::BadRequest(format!("Draft is already {from}")));
    }
    Ok(())
}

/// Deliver one approved draft as a visible client reply and record the
/// outcome on the draft row.
async fn send_one(state: &AppState, draft: &Draft) -> Result<(), ApiError> {
    let result = state
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
            state.drafts.mark_sent(&draft.id, &receipt).await?;
            info!(draft_id = %draft.id, source_id = draft.source_id, "draft sent");
            Ok(())
        }
        Err(err) => {
            warn!(draft_id = %draft.id, error = %err, "sending draft failed");
            state.drafts.mark_send_error(&draft.id, &err.to_string()).await?;
            Err(ApiError::Internal(format!("failed to send draft: {err}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::util::ServiceExt;

    use replyq_core::{Confidence, Draft, DraftId, DraftStatus, ReplyCandidate, SourceType};
    use replyq_db::repositories::{DraftRepository, InMemoryDraftRepository};
    use replyq_helpdesk::{HelpdeskApi, HelpdeskError};

    use super::{router, AppState};

    struct StubHelpdesk {
        fail_send: bool,
    }

    #[async_trait]
    impl HelpdeskApi for StubHelpdesk {
        async fn find_items_needing_reply(
            &self,
            _check_orders: bool,
            _check_tickets: bool,
            _lookback_hours: u32,
        ) -> Result<Vec<ReplyCandidate>, HelpdeskError> {
            Ok(Vec::new())
        }

        async fn send_message(
            &self,
            _source_type: SourceType,
            source_id: i64,
            text: &str,
            _user_id: Option<i64>,
            _staff_only: bool,
        ) -> Result<serde_json::Value, HelpdeskError> {
            if self.fail_send {
                return Err(HelpdeskError::Status { status: 502, body: "bad gateway".to_string() });
            }
            Ok(serde_json::json!({"id": source_id, "message": text}))
        }
    }

    fn draft(id: &str) -> Draft {
        Draft {
            id: DraftId(id.to_string()),
            source_type: SourceType::Order,
            source_id: 311,
            client_name: "Grace Hopper".to_string(),
            client_email: "g@example.com".to_string(),
            service_name: "Optimization Service".to_string(),
            subject: "Optimization Service".to_string(),
            client_message: "any update?".to_string(),
            client_message_id: Some(9001),
            conversation_history: Vec::new(),
            draft_response: "Hi Grace, the audit lands Friday.".to_string(),
            edited_response: None,
            manager_user_id: Some(7),
            confidence: Confidence::High,
            ai_notes: "Routine.".to_string(),
            status: DraftStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            sent_at: None,
            remote_receipt: None,
            send_error: None,
            created_at: Utc::now(),
        }
    }

    async fn state_with_drafts(
        drafts: Vec<Draft>,
        fail_send: bool,
    ) -> (AppState, Arc<InMemoryDraftRepository>) {
        let repo = Arc::new(InMemoryDraftRepository::new());
        for d in drafts {
            repo.create(&d).await.expect("seed draft");
        }
        let state = AppState {
            drafts: repo.clone(),
            helpdesk: Arc::new(StubHelpdesk { fail_send }),
        };
        (state, repo)
    }

    async fn call(
        state: AppState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => {
                Request::builder().method(method).uri(uri).body(Body::empty()).expect("request")
            }
        };

        let response = router(state).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn queue_lists_pending_drafts_with_count() {
        let (state, _repo) = state_with_drafts(vec![draft("d-1"), draft("d-2")], false).await;

        let (status, body) = call(state, "GET", "/api/drafts", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["drafts"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn missing_draft_is_404() {
        let (state, _repo) = state_with_drafts(Vec::new(), false).await;

        let (status, body) = call(state, "GET", "/api/drafts/nope", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Draft not found");
    }

    #[tokio::test]
    async fn approve_records_review_and_returns_updated_draft() {
        let (state, repo) = state_with_drafts(vec![draft("d-1")], false).await;

        let (status, body) = call(
            state,
            "POST",
            "/api/drafts/d-1/approve",
            Some(serde_json::json!({
                "reviewed_by": "sam",
                "edited_response": "Hi Grace, done!",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert_eq!(body["reviewed_by"], "sam");
        assert_eq!(body["edited_response"], "Hi Grace, done!");

        let stored =
            repo.find_by_id(&DraftId("d-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(stored.status, DraftStatus::Approved);
    }

    #[tokio::test]
    async fn acting_on_a_reviewed_draft_is_400() {
        let (state, _repo) = state_with_drafts(vec![draft("d-1")], false).await;

        let (status, _) = call(
            state.clone(),
            "POST",
            "/api/drafts/d-1/reject",
            Some(serde_json::json!({"reviewed_by": "sam"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            state,
            "POST",
            "/api/drafts/d-1/approve",
            Some(serde_json::json!({"reviewed_by": "sam"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Draft is already rejected");
    }

    #[tokio::test]
    async fn review_without_reviewer_is_400() {
        let (state, repo) = state_with_drafts(vec![draft("d-1")], false).await;

        let (status, body) = call(state.clone(), "POST", "/api/drafts/d-1/approve", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "reviewed_by is required");

        // A blank name is no audit trail either.
        let (status, _) = call(
            state,
            "POST",
            "/api/drafts/d-1/reject",
            Some(serde_json::json!({"reviewed_by": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let stored =
            repo.find_by_id(&DraftId("d-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(stored.status, DraftStatus::Pending);
    }

    #[tokio::test]
    async fn approve_and_send_marks_draft_sent_with_receipt() {
        let (state, repo) = state_with_drafts(vec![draft("d-1")], false).await;

        let (status, body) = call(
            state,
            "POST",
            "/api/drafts/d-1/approve-and-send",
            Some(serde_json::json!({"reviewed_by": "sam", "edited_response": "Hi Grace, shipped."})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "sent");

        let stored =
            repo.find_by_id(&DraftId("d-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(stored.status, DraftStatus::Sent);
        let receipt = stored.remote_receipt.expect("receipt");
        // The edited text is what went out.
        assert_eq!(receipt["message"], "Hi Grace, shipped.");
    }

    #[tokio::test]
    async fn approve_and_send_surfaces_remote_failure_as_500() {
        let (state, repo) = state_with_drafts(vec![draft("d-1")], true).await;

        let (status, body) = call(
            state,
            "POST",
            "/api/drafts/d-1/approve-and-send",
            Some(serde_json::json!({"reviewed_by": "sam"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().expect("error").contains("failed to send draft"));

        let stored =
            repo.find_by_id(&DraftId("d-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(stored.status, DraftStatus::Error);
        assert!(stored.send_error.is_some());
    }

    #[tokio::test]
    async fn send_approved_processes_each_draft_independently() {
        let (state, repo) = state_with_drafts(vec![draft("d-1"), draft("d-2")], false).await;
        repo.approve(&DraftId("d-1".to_string()), "m", None, None).await.expect("approve");
        repo.approve(&DraftId("d-2".to_string()), "m", None, None).await.expect("approve");

        let (status, body) = call(state, "POST", "/api/send-approved", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sent"], 2);
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn stats_reports_per_status_counts() {
        let (state, repo) = state_with_drafts(vec![draft("d-1"), draft("d-2")], false).await;
        repo.approve(&DraftId("d-2".to_string()), "m", None, None).await.expect("approve");

        let (status, body) = call(state, "GET", "/api/stats", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending"], 1);
        assert_eq!(body["approved"], 1);
        assert_eq!(body["total"], 2);
    }
}
