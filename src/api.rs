//! HTTP API for threadline

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::chat::{ChatModel, ChatService, ConversationStore, TurnConfig};
use crate::llm::ModelRegistry;
use crate::session::{SessionRegistry, ThreadManager};
use std::sync::Arc;
use std::time::Duration;

pub type SharedStore = Arc<dyn ConversationStore>;
pub type SharedModel = Arc<dyn ChatModel>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService<SharedStore, SharedModel>>,
    pub threads: Arc<ThreadManager<SharedStore>>,
    pub sessions: Arc<SessionRegistry>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        model: SharedModel,
        llm_registry: Arc<ModelRegistry>,
        turn_config: TurnConfig,
        session_idle_timeout: Duration,
    ) -> Self {
        Self {
            chat: Arc::new(ChatService::new(store.clone(), model, turn_config)),
            threads: Arc::new(ThreadManager::new(store)),
            sessions: Arc::new(SessionRegistry::new(session_idle_timeout)),
            llm_registry,
        }
    }
}
