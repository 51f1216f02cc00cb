//! `/ai` routes: chat, structured output, and session administration.
//!
//! - `GET    /ai/chat/sync?message=&session_id=` : one JSON reply
//! - `GET    /ai/chat?message=&session_id=`      : SSE stream of chat events
//! - `POST   /ai/report`                         : `{ topic }` → Report
//! - `POST   /ai/code-review`                    : `{ code, language? }` → CodeReview
//! - `POST   /ai/structured`                     : `{ schema, input, language? }`
//! - `GET    /ai/sessions`                       : known session ids
//! - `GET    /ai/sessions/{id}`                  : a session's history
//! - `DELETE /ai/sessions/{id}`                  : forget a session
//!
//! A missing `session_id` starts a fresh session; its id is returned.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::SharedState;
use llmcraft_agent::{ChatReply, CodeReview, Report, SchemaTag, StructuredOutput};
use llmcraft_core::error::Error;
use llmcraft_core::message::{Message, SessionId};

pub fn ai_router() -> Router<SharedState> {
    Router::new()
        .route("/chat/sync", get(chat_sync_handler))
        .route("/chat", get(chat_stream_handler))
        .route("/report", post(report_handler))
        .route("/code-review", post(code_review_handler))
        .route("/structured", post(structured_handler))
        .route("/sessions", get(list_sessions_handler))
        .route(
            "/sessions/{id}",
            get(session_history_handler).delete(clear_session_handler),
        )
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Pipeline errors mapped onto HTTP status codes.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, failures) = match &self.0 {
            Error::Validation { failures } => (StatusCode::BAD_REQUEST, failures.clone()),
            Error::Extraction(_) => (StatusCode::UNPROCESSABLE_ENTITY, Vec::new()),
            Error::Provider(_) | Error::Memory(_) => (StatusCode::BAD_GATEWAY, Vec::new()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            failures,
        };
        (status, Json(body)).into_response()
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatQuery {
    message: String,
    session_id: Option<String>,
}

impl ChatQuery {
    fn session(&self) -> SessionId {
        match self.session_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => SessionId::from(id),
            _ => SessionId::new(),
        }
    }
}

async fn chat_sync_handler(
    State(state): State<SharedState>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<ChatReply>, ApiError> {
    let session_id = query.session();
    info!(session_id = %session_id, message_len = query.message.len(), "ai/chat/sync request");
    let reply = state.orchestrator.chat(&query.message, &session_id).await?;
    Ok(Json(reply))
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Query(query): Query<ChatQuery>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let session_id = query.session();
    info!(session_id = %session_id, message_len = query.message.len(), "ai/chat SSE request");

    let rx = state
        .orchestrator
        .chat_stream(&query.message, &session_id)
        .await?;

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Structured output ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReportRequest {
    topic: String,
}

async fn report_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ReportRequest>,
) -> Result<Json<Report>, ApiError> {
    info!(topic = %payload.topic, "ai/report request");
    Ok(Json(state.orchestrator.generate_report(&payload.topic).await?))
}

#[derive(Deserialize)]
struct CodeReviewRequest {
    code: String,
    #[serde(default)]
    language: Option<String>,
}

async fn code_review_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CodeReviewRequest>,
) -> Result<Json<CodeReview>, ApiError> {
    info!(code_len = payload.code.len(), "ai/code-review request");
    let review = state
        .orchestrator
        .review_code(&payload.code, payload.language.as_deref())
        .await?;
    Ok(Json(review))
}

#[derive(Deserialize)]
struct StructuredRequest {
    schema: SchemaTag,
    input: String,
    #[serde(default)]
    language: Option<String>,
}

async fn structured_handler(
    State(state): State<SharedState>,
    Json(payload): Json<StructuredRequest>,
) -> Result<Json<StructuredOutput>, ApiError> {
    info!(schema = ?payload.schema, "ai/structured request");
    let output = state
        .orchestrator
        .structured(payload.schema, &payload.input, payload.language.as_deref())
        .await?;
    Ok(Json(output))
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionId>,
    count: usize,
}

async fn list_sessions_handler(State(state): State<SharedState>) -> Json<SessionListResponse> {
    let sessions = state.orchestrator.sessions().await;
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

#[derive(Serialize)]
struct SessionHistoryResponse {
    session_id: SessionId,
    messages: Vec<Message>,
}

async fn session_history_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<SessionHistoryResponse> {
    let session_id = SessionId::from(id);
    let messages = state.orchestrator.history(&session_id).await;
    Json(SessionHistoryResponse {
        session_id,
        messages,
    })
}

async fn clear_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> StatusCode {
    state.orchestrator.clear(&SessionId::from(id)).await;
    StatusCode::NO_CONTENT
}
