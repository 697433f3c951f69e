//! Chat turns bound to durable storage

use super::{ChatError, ChatModel, ConversationStore, TurnConfig, TurnProcessor};
use crate::db::{Message, NewMessage, ThreadRecord};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;

/// Both messages of a completed turn, as stored
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub user: Message,
    pub assistant: Message,
}

/// Progress of a streamed turn
#[derive(Debug)]
pub enum TurnEvent {
    /// Next piece of reply text
    Delta(String),
    /// Reply finished and the turn was stored
    Completed(TurnOutcome),
    /// Turn aborted; nothing was stored
    Failed(ChatError),
}

pub type TurnStream = Pin<Box<dyn Stream<Item = TurnEvent> + Send>>;

pub struct ChatService<S, M> {
    store: S,
    processor: TurnProcessor<M>,
}

impl<S, M> ChatService<S, M>
where
    S: ConversationStore + 'static,
    M: ChatModel + 'static,
{
    pub fn new(store: S, model: M, config: TurnConfig) -> Self {
        Self {
            store,
            processor: TurnProcessor::new(model, config),
        }
    }

    pub fn model_id(&self) -> &str {
        self.processor.model().model_id()
    }

    /// Ordered message log of a thread
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Message>, ChatError> {
        Ok(self.store.get_history(thread_id).await?)
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadRecord>, ChatError> {
        Ok(self.store.list_threads().await?)
    }

    /// Run one turn to completion.
    ///
    /// The user message and the reply are stored together only after the
    /// model succeeds; on any failure the thread is left untouched.
    pub async fn send_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<TurnOutcome, ChatError> {
        ensure_not_empty(text)?;
        let history = self.store.get_history(thread_id).await?;
        let reply = self.processor.process_turn(&history, text).await?;
        self.persist_turn(thread_id, text, reply).await
    }

    /// Run one turn, yielding reply fragments as they arrive.
    ///
    /// Validation, history loading and opening the model stream happen before
    /// this returns, so those failures surface as `Err`. Later failures end the
    /// stream with [`TurnEvent::Failed`].
    pub async fn send_message_streaming(
        self: Arc<Self>,
        thread_id: String,
        text: String,
    ) -> Result<TurnStream, ChatError> {
        ensure_not_empty(&text)?;
        let history = self.store.get_history(&thread_id).await?;
        let mut fragments = self.processor.stream_turn(&history, &text).await?;

        let events = async_stream::stream! {
            let mut reply = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        reply.push_str(&fragment);
                        yield TurnEvent::Delta(fragment);
                    }
                    Err(e) => {
                        tracing::warn!(thread_id = %thread_id, error = %e, "Streamed turn aborted");
                        yield TurnEvent::Failed(ChatError::ModelUnavailable(e));
                        return;
                    }
                }
            }

            if reply.trim().is_empty() {
                let e = crate::llm::LlmError::unknown("Model returned an empty reply");
                yield TurnEvent::Failed(ChatError::ModelUnavailable(e));
                return;
            }

            match self.persist_turn(&thread_id, &text, NewMessage::assistant(reply)).await {
                Ok(outcome) => yield TurnEvent::Completed(outcome),
                Err(e) => yield TurnEvent::Failed(e),
            }
        };

        Ok(Box::pin(events))
    }

    async fn persist_turn(
        &self,
        thread_id: &str,
        text: &str,
        reply: NewMessage,
    ) -> Result<TurnOutcome, ChatError> {
        let mut stored = self
            .store
            .append_turn(thread_id, &[NewMessage::user(text), reply])
            .await?
            .into_iter();

        match (stored.next(), stored.next()) {
            (Some(user), Some(assistant)) => {
                tracing::info!(
                    thread_id = %thread_id,
                    sequence_id = assistant.sequence_id,
                    "Turn stored"
                );
                Ok(TurnOutcome { user, assistant })
            }
            _ => Err(ChatError::StorageUnavailable(crate::db::DbError::Sqlite(
                rusqlite::Error::QueryReturnedNoRows,
            ))),
        }
    }
}

fn ensure_not_empty(text: &str) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        Err(ChatError::EmptyMessage)
    } else {
        Ok(())
    }
}
