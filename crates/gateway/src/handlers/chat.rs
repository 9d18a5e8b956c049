//! Chat handler

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::Method,
    Json,
};

use crate::AppState;
use folio_common::{
    chat::ChatResponse,
    errors::{AppError, Result},
    metrics::{self, RequestMetrics},
};

/// Answer a visitor question.
///
/// Routed for every method so that the method check, and its JSON 405,
/// happen inside the answer service. Body rejections (over the size limit)
/// are turned into `AppError` so they share the JSON error body.
pub async fn chat(
    State(state): State<AppState>,
    method: Method,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<ChatResponse>> {
    let request_metrics = RequestMetrics::start(method.as_str(), "/api/chat");

    let result = match body {
        Ok(body) => state.chat.handle(&method, &body).await,
        Err(rejection) => Err(AppError::from(rejection)),
    };

    match result {
        Ok(outcome) => {
            tracing::info!(
                attempts = outcome.attempts,
                context_chars = outcome.context_chars,
                answer_chars = outcome.answer.len(),
                latency_ms = request_metrics.elapsed_ms(),
                model = %state.chat.model_name(),
                "Chat answered"
            );
            metrics::record_chat("success", Some(outcome.attempts));
            request_metrics.finish(200);

            Ok(Json(ChatResponse {
                response: outcome.answer,
            }))
        }
        Err(e) => {
            let outcome = if e.is_client_error() { "rejected" } else { "failed" };
            tracing::info!(
                outcome,
                latency_ms = request_metrics.elapsed_ms(),
                "Chat not answered"
            );
            metrics::record_chat(outcome, None);
            request_metrics.finish(e.status_code().as_u16());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::router;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use folio_common::errors::APOLOGY_MESSAGE;
    use folio_common::llm::{Scripted, ScriptedModel};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn send(app: Router, method: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_post_returns_answer() {
        let model = Arc::new(ScriptedModel::replying("Sam built Project Alpha."));
        let app = router(model.clone(), None);

        let (status, body) = send(app, "POST", json!({ "message": "What projects has he done?" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "response": "Sam built Project Alpha." }));

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("--- Project Alpha ---"));
        assert!(!prompt.contains("Beta Industries"));
    }

    #[tokio::test]
    async fn test_get_is_method_not_allowed() {
        let model = Arc::new(ScriptedModel::replying("unused"));
        let app = router(model.clone(), None);

        let request = Request::builder()
            .method("GET")
            .uri("/api/chat")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "message": "Method Not Allowed" }));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let model = Arc::new(ScriptedModel::replying("unused"));
        let app = router(model.clone(), None);

        let (status, body) = send(app, "POST", json!({ "message": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": "Message is required." }));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_hides_detail() {
        let model = Arc::new(ScriptedModel::new([Scripted::Fail(401)]));
        let app = router(model.clone(), None);

        let (status, body) = send(app, "POST", json!({ "message": "hello" })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "message": APOLOGY_MESSAGE }));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_overload_is_retried_transparently() {
        let model = Arc::new(ScriptedModel::new([
            Scripted::Overloaded,
            Scripted::Overloaded,
            Scripted::Reply("Recovered.".into()),
        ]));
        let app = router(model.clone(), None);

        let (status, body) = send(app, "POST", json!({ "message": "hello" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Recovered.");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_oversized_body_is_json_413() {
        let model = Arc::new(ScriptedModel::replying("unused"));
        let app = router(model.clone(), None);

        let message = "a".repeat(20 * 1024);
        let (status, body) = send(app, "POST", json!({ "message": message })).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body, json!({ "message": "Request body is too large." }));
        assert_eq!(model.calls(), 0);
    }
}
