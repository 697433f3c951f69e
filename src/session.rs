//! Per-user view over the conversation store
//!
//! A session holds the threads a user can see in the sidebar and exactly one
//! active thread. Deleting or clearing only changes that view; stored
//! messages are never removed.

use crate::chat::{ChatError, ConversationStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Longest summary taken from a thread's first user message
pub const SUMMARY_MAX_CHARS: usize = 50;
const FALLBACK_ID_CHARS: usize = 8;

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    /// Visible threads in the order they joined the session
    threads: Vec<String>,
    active: String,
}

impl Session {
    fn new(threads: Vec<String>, active: String) -> Self {
        let mut session = Self {
            id: Uuid::new_v4().to_string(),
            threads,
            active: String::new(),
        };
        session.activate(active);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn threads(&self) -> &[String] {
        &self.threads
    }

    pub fn active_thread(&self) -> &str {
        &self.active
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.threads.iter().any(|t| t == thread_id)
    }

    /// Make `thread_id` active, adding it to the visible set if needed
    fn activate(&mut self, thread_id: String) {
        if !self.contains(&thread_id) {
            self.threads.push(thread_id.clone());
        }
        self.active = thread_id;
    }
}

/// Sidebar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub summary: String,
    pub active: bool,
}

/// Label for a thread: its opening user message, or a short id fallback
pub fn summarize_text(first_user_message: Option<&str>, thread_id: &str) -> String {
    match first_user_message {
        Some(text) if text.chars().count() > SUMMARY_MAX_CHARS => {
            let head: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
            format!("{head}...")
        }
        Some(text) => text.to_string(),
        None => {
            let prefix: String = thread_id.chars().take(FALLBACK_ID_CHARS).collect();
            format!("Chat {prefix}")
        }
    }
}

/// Thread lifecycle operations for sessions
pub struct ThreadManager<S> {
    store: S,
}

impl<S: ConversationStore> ThreadManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// New session showing every stored conversation, with a fresh active thread.
    ///
    /// Threads that never got a message are left out, so unused "new chat"
    /// threads from earlier sessions do not pile up in the sidebar.
    pub async fn open_session(&self) -> Result<Session, ChatError> {
        // Least recently updated first, so the sidebar shows the latest on top
        let existing: Vec<String> = self
            .store
            .list_threads()
            .await?
            .into_iter()
            .rev()
            .filter(|t| t.message_count > 0)
            .map(|t| t.id)
            .collect();
        let fresh = self.register_new_thread().await?;
        let session = Session::new(existing, fresh);
        tracing::info!(
            session_id = %session.id,
            threads = session.threads().len(),
            active = %session.active,
            "Session opened"
        );
        Ok(session)
    }

    /// Start an empty thread and make it active
    pub async fn create_thread(&self, session: &mut Session) -> Result<String, ChatError> {
        let thread_id = self.register_new_thread().await?;
        session.activate(thread_id.clone());
        tracing::info!(session_id = %session.id, thread_id = %thread_id, "Thread created");
        Ok(thread_id)
    }

    /// Switch to a thread that exists in the store.
    ///
    /// Unknown ids leave the session unchanged.
    pub async fn switch_active(
        &self,
        session: &mut Session,
        thread_id: &str,
    ) -> Result<(), ChatError> {
        if !self.store.thread_exists(thread_id).await? {
            return Err(ChatError::UnknownThread(thread_id.to_string()));
        }
        session.activate(thread_id.to_string());
        Ok(())
    }

    /// Hide a thread from the session.
    ///
    /// Removing the active thread starts a replacement. The stored history
    /// stays and reappears in the next session.
    pub async fn delete_thread(
        &self,
        session: &mut Session,
        thread_id: &str,
    ) -> Result<(), ChatError> {
        if thread_id == session.active {
            let replacement = self.register_new_thread().await?;
            session.threads.retain(|t| t != thread_id);
            session.activate(replacement);
        } else {
            session.threads.retain(|t| t != thread_id);
        }
        tracing::info!(session_id = %session.id, thread_id = %thread_id, "Thread hidden");
        Ok(())
    }

    /// Hide every thread and start over with one fresh thread
    pub async fn clear_all(&self, session: &mut Session) -> Result<String, ChatError> {
        let fresh = self.register_new_thread().await?;
        session.threads.clear();
        session.activate(fresh.clone());
        tracing::info!(session_id = %session.id, thread_id = %fresh, "Session cleared");
        Ok(fresh)
    }

    pub async fn summarize(&self, thread_id: &str) -> Result<String, ChatError> {
        let first = self.store.first_user_message(thread_id).await?;
        Ok(summarize_text(
            first.as_ref().map(|m| m.content.as_str()),
            thread_id,
        ))
    }

    /// Sidebar listing, most recently added first
    pub async fn thread_summaries(
        &self,
        session: &Session,
    ) -> Result<Vec<ThreadSummary>, ChatError> {
        let mut summaries = Vec::with_capacity(session.threads.len());
        for thread_id in session.threads.iter().rev() {
            summaries.push(ThreadSummary {
                thread_id: thread_id.clone(),
                summary: self.summarize(thread_id).await?,
                active: *thread_id == session.active,
            });
        }
        Ok(summaries)
    }

    async fn register_new_thread(&self) -> Result<String, ChatError> {
        let thread_id = Uuid::new_v4().to_string();
        self.store.create_thread(&thread_id).await?;
        Ok(thread_id)
    }
}

struct Entry {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// Live sessions keyed by id.
///
/// Sessions untouched for longer than the idle timeout are dropped by
/// [`SessionRegistry::evict_idle`]; their threads stay in the store.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Entry>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn insert(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        let entry = Entry {
            session: handle.clone(),
            last_seen: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        handle
    }

    /// Look up a session and mark it as seen
    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session_id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle past the timeout, returning how many went
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < self.idle_timeout);
        before - sessions.len()
    }

    /// Run [`Self::evict_idle`] every `period` for the life of the process
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle().await;
                if evicted > 0 {
                    let live = self.len().await;
                    tracing::info!(evicted, live_sessions = live, "Idle sessions evicted");
                }
            }
        })
    }
}
