//! Turn processing for conversation threads
//!
//! A turn sends a thread's history plus one new user message to the model
//! and, only when the reply arrives intact, stores both messages together.

mod service;
mod traits;
mod turn;

#[cfg(test)]
pub mod testing;

pub use service::{ChatService, TurnEvent, TurnOutcome, TurnStream};
pub use traits::*;
pub use turn::{TurnConfig, TurnProcessor};

use crate::db::DbError;
use crate::llm::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] DbError),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),
    #[error("Unknown thread: {0}")]
    UnknownThread(String),
    #[error("Message is empty")]
    EmptyMessage,
}
