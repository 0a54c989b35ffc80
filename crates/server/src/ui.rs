//! Server-rendered shell for the review queue. The page itself talks to the
//! JSON API from the browser.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{extract::State, Router};
use tera::{Context, Tera};
use tracing::warn;

#[derive(Clone)]
pub struct UiState {
    templates: Arc<Tera>,
}

fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/review/**/*") {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to load review templates from filesystem, using embedded fallback");
            Tera::default()
        }
    };

    tera.add_raw_template("queue.html", include_str!("../../../templates/review/queue.html"))
        .ok();

    Arc::new(tera)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(queue_page))
        .with_state(UiState { templates: init_templates() })
}

async fn queue_page(State(state): State<UiState>) -> impl IntoResponse {
    let mut context = Context::new();
    context.insert("title", "Replyq Review Queue");

    match state.templates.render("queue.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(error) => {
            warn!(error = %error, "rendering review queue failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "template rendering failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use super::router;

    #[tokio::test]
    async fn queue_page_renders_with_title() {
        let response = router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes =
            axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let html = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(html.contains("Replyq Review Queue"));
        assert!(html.contains("/api/drafts"));
    }
}
