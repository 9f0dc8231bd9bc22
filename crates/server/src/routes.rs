//! HTTP/SSE endpoints (§6)
//!
//! `POST /api/chat`, `POST /api/chat/stream`, `GET /health`, and the
//! `POST /api/documents/{kind}` stub. Every handler does nothing but
//! translate to/from `sme_rag_router::Router` — no pipeline logic lives
//! here.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use sme_rag_core::{
    ActionSuggestion, EvaluationResult, SourceCitation, StreamEvent, Turn, TurnRole, UserContext,
};

use crate::state::AppState;
use crate::ServerError;

pub fn create_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/documents/:kind", post(document_stub))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TurnWire {
    role: String,
    content: String,
}

impl From<TurnWire> for Turn {
    fn from(wire: TurnWire) -> Self {
        let role = if wire.role.eq_ignore_ascii_case("assistant") { TurnRole::Assistant } else { TurnRole::User };
        Turn { role, content: wire.content }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<TurnWire>,
    #[serde(default)]
    user_context: Option<UserContext>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    content: String,
    domain: Option<String>,
    domains: Vec<String>,
    sources: Vec<SourceCitation>,
    actions: Vec<ActionSuggestion>,
    evaluation: Option<EvaluationResult>,
    session_id: Option<String>,
    retry_count: u32,
    ragas_metrics: Option<serde_json::Value>,
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Json<ChatResponse>, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message must not be empty".to_string()));
    }

    let history: Vec<Turn> = request.history.into_iter().map(Turn::from).collect();
    let result = state.router.process(request.message, history, request.user_context).await;

    let domains: Vec<String> = result.classification.as_ref().map(|c| c.domains.iter().map(|d| d.as_str().to_string()).collect()).unwrap_or_default();
    let generation = result.generation.unwrap_or_default();

    Ok(Json(ChatResponse {
        content: generation.content,
        domain: domains.first().cloned(),
        domains,
        sources: generation.sources,
        actions: generation.actions,
        evaluation: result.evaluation,
        // Session persistence is an external collaborator (see Non-goals).
        session_id: None,
        retry_count: result.retry_count,
        // The offline RAGAS evaluator is a separate async collaborator (see Non-goals).
        ragas_metrics: None,
    }))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message must not be empty".to_string()));
    }

    let history: Vec<Turn> = request.history.into_iter().map(Turn::from).collect();
    // `Router::stream` borrows `&self`; the generator below owns the `Arc`
    // clone so the borrow stays valid for the stream's own lifetime instead
    // of the request-local `AppState`.
    let router = state.router;
    let events = async_stream::stream! {
        let message = request.message;
        let user_context = request.user_context;
        let inner = router.stream(message, history, user_context);
        futures::pin_mut!(inner);
        while let Some(event) = inner.next().await {
            yield Ok::<Event, Infallible>(to_sse_event(event));
        }
    };

    let sse = Sse::new(events).keep_alive(KeepAlive::default());

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("cache-control"), HeaderValue::from_static("no-cache"));
    headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
    headers.insert(HeaderName::from_static("connection"), HeaderValue::from_static("keep-alive"));

    Ok((headers, sse))
}

fn to_sse_event(event: StreamEvent) -> Event {
    match &event {
        StreamEvent::Source(_) => Event::default().event("source").json_data(&event).unwrap_or_default(),
        StreamEvent::Token { .. } => Event::default().event("token").json_data(&event).unwrap_or_default(),
        StreamEvent::Action(_) => Event::default().event("action").json_data(&event).unwrap_or_default(),
        StreamEvent::Done(_) => Event::default().event("done").json_data(&event).unwrap_or_default(),
        StreamEvent::Error { .. } => Event::default().event("error").json_data(&event).unwrap_or_default(),
    }
}

/// Document generation is an external collaborator (see Non-goals); this
/// route only surfaces the `action` hint a caller would follow up on.
async fn document_stub(Path(kind): Path<String>) -> Result<Json<serde_json::Value>, ServerError> {
    match kind.as_str() {
        "contract" | "business_plan" => Ok(Json(serde_json::json!({
            "action": {
                "type": format!("generate_{kind}"),
                "label": "문서 생성 요청이 접수되었습니다",
                "description": "문서 생성은 별도 서비스에서 처리됩니다.",
            }
        }))),
        other => Err(ServerError::InvalidRequest(format!("unknown document kind: {other}"))),
    }
}

/// Liveness only — never calls the LLM (§6).
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_wire_defaults_unknown_role_to_user() {
        let turn: Turn = TurnWire { role: "system".to_string(), content: "hi".to_string() }.into();
        assert!(!turn.is_assistant());
    }
}
