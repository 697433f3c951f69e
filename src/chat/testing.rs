//! Mock implementations for testing
//!
//! These mocks let turn and session logic run without a real model or disk.

use super::traits::*;
use crate::db::{DbError, DbResult, Message, NewMessage, Role, ThreadRecord};
use crate::llm::{LlmError, LlmRequest, LlmResponse, TextStream, Usage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock chat model
// ============================================================================

/// Scripted outcome of one model call
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Whole reply at once
    Text(String),
    /// Reply delivered piecewise; `complete` joins the pieces
    Fragments(Vec<Result<String, LlmError>>),
    Error(LlmError),
    /// Never answers
    Hang,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn fragments(parts: &[&str]) -> Self {
        Self::Fragments(parts.iter().map(|p| Ok((*p).to_string())).collect())
    }
}

/// Model that replays queued replies and records every request
pub struct MockChatModel {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: &LlmRequest) -> MockReply {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Error(LlmError::network("No mock reply queued")))
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match self.next_reply(request) {
            MockReply::Text(text) => Ok(LlmResponse {
                text,
                usage: Usage::default(),
            }),
            MockReply::Fragments(parts) => {
                let text = parts.into_iter().collect::<Result<String, _>>()?;
                Ok(LlmResponse {
                    text,
                    usage: Usage::default(),
                })
            }
            MockReply::Error(e) => Err(e),
            MockReply::Hang => futures::future::pending().await,
        }
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, LlmError> {
        match self.next_reply(request) {
            MockReply::Text(text) => Ok(Box::pin(futures::stream::iter(vec![Ok(text)]))),
            MockReply::Fragments(parts) => Ok(Box::pin(futures::stream::iter(parts))),
            MockReply::Error(e) => Err(e),
            MockReply::Hang => Ok(Box::pin(futures::stream::pending())),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// In-memory conversation store
// ============================================================================

#[derive(Debug, Clone)]
struct ThreadLog {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl ThreadLog {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }
}

/// Store backed by a map, with switchable write and read failures
pub struct InMemoryStore {
    threads: Mutex<BTreeMap<String, ThreadLog>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(BTreeMap::new()),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> DbResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(DbError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
                Some("disk I/O error".to_string()),
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_thread(&self, thread_id: &str) -> DbResult<()> {
        Self::check(&self.fail_writes)?;
        self.threads
            .lock()
            .unwrap()
            .entry(thread_id.to_string())
            .or_insert_with(ThreadLog::new);
        Ok(())
    }

    async fn append(&self, thread_id: &str, message: &NewMessage) -> DbResult<Message> {
        let mut stored = self.append_turn(thread_id, std::slice::from_ref(message)).await?;
        Ok(stored.remove(0))
    }

    async fn append_turn(
        &self,
        thread_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        Self::check(&self.fail_writes)?;
        let mut threads = self.threads.lock().unwrap();
        let log = threads
            .entry(thread_id.to_string())
            .or_insert_with(ThreadLog::new);
        let mut next = log.messages.last().map_or(1, |m| m.sequence_id + 1);

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            let record = Message {
                message_id: uuid::Uuid::new_v4().to_string(),
                thread_id: thread_id.to_string(),
                sequence_id: next,
                role: message.role,
                content: message.content.clone(),
                created_at: Utc::now(),
            };
            next += 1;
            log.messages.push(record.clone());
            stored.push(record);
        }
        log.updated_at = Utc::now();
        Ok(stored)
    }

    async fn get_history(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        Self::check(&self.fail_reads)?;
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(thread_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default())
    }

    async fn list_thread_ids(&self) -> DbResult<BTreeSet<String>> {
        Self::check(&self.fail_reads)?;
        Ok(self.threads.lock().unwrap().keys().cloned().collect())
    }

    async fn thread_exists(&self, thread_id: &str) -> DbResult<bool> {
        Self::check(&self.fail_reads)?;
        Ok(self.threads.lock().unwrap().contains_key(thread_id))
    }

    async fn list_threads(&self) -> DbResult<Vec<ThreadRecord>> {
        Self::check(&self.fail_reads)?;
        let mut records: Vec<ThreadRecord> = self
            .threads
            .lock()
            .unwrap()
            .iter()
            .map(|(id, log)| ThreadRecord {
                id: id.clone(),
                created_at: log.created_at,
                updated_at: log.updated_at,
                message_count: i64::try_from(log.messages.len()).unwrap(),
            })
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn first_user_message(&self, thread_id: &str) -> DbResult<Option<Message>> {
        Self::check(&self.fail_reads)?;
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(thread_id)
            .and_then(|log| log.messages.iter().find(|m| m.role == Role::User).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_model_replays_in_order() {
        let model = MockChatModel::new();
        model.queue(MockReply::text("a"));
        model.queue(MockReply::fragments(&["b", "c"]));

        let request = LlmRequest::default();
        assert_eq!(model.complete(&request).await.unwrap().text, "a");
        let parts: Vec<_> = model.stream(&request).await.unwrap().collect().await;
        assert_eq!(parts.len(), 2);
        assert!(model.complete(&request).await.is_err());
        assert_eq!(model.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_in_memory_store_sequences() {
        let store = InMemoryStore::new();
        store.create_thread("empty").await.unwrap();
        store.append("t", &NewMessage::assistant("x")).await.unwrap();
        let turn = store
            .append_turn("t", &[NewMessage::user("q"), NewMessage::assistant("a")])
            .await
            .unwrap();

        assert_eq!(turn[0].sequence_id, 2);
        assert_eq!(turn[1].sequence_id, 3);
        assert_eq!(
            store.first_user_message("t").await.unwrap().unwrap().content,
            "q"
        );
        assert_eq!(store.list_thread_ids().await.unwrap().len(), 2);
        assert!(store.thread_exists("empty").await.unwrap());
        assert!(!store.thread_exists("missing").await.unwrap());
        let counts: Vec<_> = store
            .list_threads()
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.id, t.message_count))
            .collect();
        assert!(counts.contains(&("t".to_string(), 3)));
        assert!(counts.contains(&("empty".to_string(), 0)));
    }
}
