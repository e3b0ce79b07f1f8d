//! Common error types for chatline.

use crate::ids::{MessageId, SessionId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors shared by the store and client crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A session with the specified ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A message with the specified ID was not found in its session.
    #[error("message {message_id} not found in session {session_id}")]
    MessageNotFound {
        /// Session that was searched.
        session_id: SessionId,
        /// Message that was requested.
        message_id: MessageId,
    },

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
