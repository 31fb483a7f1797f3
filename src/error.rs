//! Error types for the chat session

use reqwest::StatusCode;
use thiserror::Error;

/// Failures of a single chat turn.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("a reply is already streaming")]
    Busy,

    #[error("chat request failed with status: {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed record {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ChatError {
    /// Non-success status or a broken connection.
    pub fn is_network(&self) -> bool {
        matches!(self, ChatError::Status(_) | ChatError::Transport(_))
    }
}

/// Failures reading or writing the history slot.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
