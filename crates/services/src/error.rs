//! Shared error types for the services crate.

use thiserror::Error;

use course_core::ProgressError;
use storage::repository::StorageError;

/// Failures reported by a chat transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The user blocked the bot or deleted the chat.
    #[error("user is unreachable")]
    Unreachable,
    /// The media attachment could not be delivered.
    #[error("media rejected: {0}")]
    Media(String),
    #[error("request rejected with status {status}: {description}")]
    Rejected { status: u16, description: String },
    #[error("transport connection failed: {0}")]
    Connection(String),
}

/// Errors produced while handling one inbound event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors emitted by `ReminderService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReminderError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
