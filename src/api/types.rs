//! API request and response types

use crate::chat::TurnOutcome;
use crate::db::{Message, ThreadRecord};
use crate::llm::ModelInfo;
use crate::session::ThreadSummary;
use serde::{Deserialize, Serialize};

/// Request to send a chat message to the active thread
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Session state as the sidebar renders it
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub active_thread: String,
    /// Most recently added first
    pub threads: Vec<ThreadSummary>,
    /// History of the active thread
    pub messages: Vec<Message>,
}

/// Every stored thread, including ones hidden from all sessions
#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadRecord>,
}

/// Response with a thread's full message log
#[derive(Debug, Serialize)]
pub struct ThreadMessagesResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
}

/// Response for a completed turn
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub thread_id: String,
    #[serde(flatten)]
    pub turn: TurnOutcome,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
