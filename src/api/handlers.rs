//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::turn_sse;
use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, ModelsResponse, SessionResponse, ThreadListResponse,
    ThreadMessagesResponse,
};
use super::AppState;
use crate::chat::ChatError;
use crate::session::Session;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the chat page
        .route("/", get(serve_index))
        .route("/assets/*path", get(serve_static))
        // Sessions and their visible threads
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/:sid", get(get_session))
        .route("/api/sessions/:sid/threads", post(create_thread))
        .route(
            "/api/sessions/:sid/threads/:tid/activate",
            post(activate_thread),
        )
        .route("/api/sessions/:sid/threads/:tid/delete", post(delete_thread))
        .route("/api/sessions/:sid/clear", post(clear_threads))
        // Stored threads and their history
        .route("/api/threads", get(list_threads))
        .route("/api/threads/:tid/messages", get(get_messages))
        // Turns against the active thread
        .route("/api/sessions/:sid/chat", post(send_chat))
        .route("/api/sessions/:sid/chat/stream", post(stream_chat))
        // Model info
        .route("/api/models", get(list_models))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

async fn serve_index() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Sessions
// ============================================================

async fn open_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, AppError> {
    let session = state.threads.open_session().await?;
    let view = session_view(&state, &session).await?;
    state.sessions.insert(session).await;
    let live = state.sessions.len().await;
    tracing::debug!(live_sessions = live, "Session registered");
    Ok(Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = lookup_session(&state, &sid).await?;
    let session = handle.lock().await;
    Ok(Json(session_view(&state, &session).await?))
}

async fn create_thread(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = lookup_session(&state, &sid).await?;
    let mut session = handle.lock().await;
    state.threads.create_thread(&mut session).await?;
    Ok(Json(session_view(&state, &session).await?))
}

async fn activate_thread(
    State(state): State<AppState>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = lookup_session(&state, &sid).await?;
    let mut session = handle.lock().await;
    state.threads.switch_active(&mut session, &tid).await?;
    Ok(Json(session_view(&state, &session).await?))
}

async fn delete_thread(
    State(state): State<AppState>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = lookup_session(&state, &sid).await?;
    let mut session = handle.lock().await;
    state.threads.delete_thread(&mut session, &tid).await?;
    Ok(Json(session_view(&state, &session).await?))
}

async fn clear_threads(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = lookup_session(&state, &sid).await?;
    let mut session = handle.lock().await;
    state.threads.clear_all(&mut session).await?;
    Ok(Json(session_view(&state, &session).await?))
}

async fn lookup_session(state: &AppState, sid: &str) -> Result<Arc<Mutex<Session>>, AppError> {
    state
        .sessions
        .get(sid)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown session: {sid}")))
}

async fn session_view(state: &AppState, session: &Session) -> Result<SessionResponse, AppError> {
    Ok(SessionResponse {
        session_id: session.id().to_string(),
        active_thread: session.active_thread().to_string(),
        threads: state.threads.thread_summaries(session).await?,
        messages: state.chat.history(session.active_thread()).await?,
    })
}

// ============================================================
// Thread History
// ============================================================

async fn list_threads(State(state): State<AppState>) -> Result<Json<ThreadListResponse>, AppError> {
    let threads = state.chat.list_threads().await?;
    Ok(Json(ThreadListResponse { threads }))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(tid): Path<String>,
) -> Result<Json<ThreadMessagesResponse>, AppError> {
    let messages = state.chat.history(&tid).await?;
    Ok(Json(ThreadMessagesResponse {
        thread_id: tid,
        messages,
    }))
}

// ============================================================
// Chat
// ============================================================

/// The session lock is released before the model is called
async fn active_thread_of(state: &AppState, sid: &str) -> Result<String, AppError> {
    let handle = lookup_session(state, sid).await?;
    let session = handle.lock().await;
    Ok(session.active_thread().to_string())
}

async fn send_chat(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let thread_id = active_thread_of(&state, &sid).await?;
    tracing::debug!(
        session_id = %sid,
        thread_id = %thread_id,
        model = state.chat.model_id(),
        "Chat turn requested"
    );
    let turn = state.chat.send_message(&thread_id, &req.text).await?;
    Ok(Json(ChatResponse { thread_id, turn }))
}

async fn stream_chat(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let thread_id = active_thread_of(&state, &sid).await?;
    let events = state
        .chat
        .clone()
        .send_message_streaming(thread_id.clone(), req.text)
        .await?;
    Ok(turn_sse(thread_id, events))
}

// ============================================================
// Model Info
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.available_model_info(),
        default: state.llm_registry.default_model_id().to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("threadline ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Unavailable(String),
}

impl From<ChatError> for AppError {
    fn from(error: ChatError) -> Self {
        let message = error.to_string();
        match error {
            ChatError::EmptyMessage => AppError::BadRequest(message),
            ChatError::UnknownThread(_) => AppError::NotFound(message),
            ChatError::ModelUnavailable(_) => AppError::BadGateway(message),
            ChatError::StorageUnavailable(e) => {
                tracing::error!(error = %e, "Storage failure");
                AppError::Unavailable(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
