//! Trait abstractions for turn I/O
//!
//! These traits let the turn processor and thread manager run against
//! mock implementations in tests.

use crate::db::{Database, DbResult, Message, NewMessage, ThreadRecord};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, ModelRegistry, TextStream};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Durable per-thread message logs
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Register a thread with no messages (idempotent)
    async fn create_thread(&self, thread_id: &str) -> DbResult<()>;

    /// Append one message, creating the thread if absent
    async fn append(&self, thread_id: &str, message: &NewMessage) -> DbResult<Message>;

    /// Append several messages atomically
    async fn append_turn(&self, thread_id: &str, messages: &[NewMessage])
        -> DbResult<Vec<Message>>;

    /// Full history in append order; empty for unknown threads
    async fn get_history(&self, thread_id: &str) -> DbResult<Vec<Message>>;

    /// Every thread ever created
    async fn list_thread_ids(&self) -> DbResult<BTreeSet<String>>;

    async fn thread_exists(&self, thread_id: &str) -> DbResult<bool>;

    /// Thread metadata, most recently updated first
    async fn list_threads(&self) -> DbResult<Vec<ThreadRecord>>;

    /// First user-authored message of a thread
    async fn first_user_message(&self, thread_id: &str) -> DbResult<Option<Message>>;
}

/// Client for the external model
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError>;

    fn model_id(&self) -> &str;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn create_thread(&self, thread_id: &str) -> DbResult<()> {
        (**self).create_thread(thread_id).await
    }

    async fn append(&self, thread_id: &str, message: &NewMessage) -> DbResult<Message> {
        (**self).append(thread_id, message).await
    }

    async fn append_turn(
        &self,
        thread_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        (**self).append_turn(thread_id, messages).await
    }

    async fn get_history(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        (**self).get_history(thread_id).await
    }

    async fn list_thread_ids(&self) -> DbResult<BTreeSet<String>> {
        (**self).list_thread_ids().await
    }

    async fn thread_exists(&self, thread_id: &str) -> DbResult<bool> {
        (**self).thread_exists(thread_id).await
    }

    async fn list_threads(&self) -> DbResult<Vec<ThreadRecord>> {
        (**self).list_threads().await
    }

    async fn first_user_message(&self, thread_id: &str) -> DbResult<Option<Message>> {
        (**self).first_user_message(thread_id).await
    }
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        (**self).stream(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production implementations
// ============================================================================

#[async_trait]
impl ConversationStore for Database {
    async fn create_thread(&self, thread_id: &str) -> DbResult<()> {
        Database::create_thread(self, thread_id)
    }

    async fn append(&self, thread_id: &str, message: &NewMessage) -> DbResult<Message> {
        Database::append(self, thread_id, message)
    }

    async fn append_turn(
        &self,
        thread_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        Database::append_turn(self, thread_id, messages)
    }

    async fn get_history(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        Database::get_history(self, thread_id)
    }

    async fn list_thread_ids(&self) -> DbResult<BTreeSet<String>> {
        Database::list_thread_ids(self)
    }

    async fn thread_exists(&self, thread_id: &str) -> DbResult<bool> {
        Database::thread_exists(self, thread_id)
    }

    async fn list_threads(&self) -> DbResult<Vec<ThreadRecord>> {
        Database::list_threads(self)
    }

    async fn first_user_message(&self, thread_id: &str) -> DbResult<Option<Message>> {
        Database::first_user_message(self, thread_id)
    }
}

/// Adapter that resolves a model from the registry on every call
#[derive(Clone)]
pub struct RegistryChatModel {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryChatModel {
    pub fn new(registry: Arc<ModelRegistry>, model_id: String) -> Self {
        Self { registry, model_id }
    }

    /// Adapter bound to the registry's default model
    pub fn default_model(registry: Arc<ModelRegistry>) -> Self {
        let model_id = registry.default_model_id().to_string();
        Self::new(registry, model_id)
    }

    fn service(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        self.registry.get(&self.model_id).ok_or_else(|| {
            LlmError::invalid_request(format!("Model not available: {}", self.model_id))
        })
    }
}

#[async_trait]
impl ChatModel for RegistryChatModel {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service()?.complete(request).await
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        self.service()?.stream(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
