//! Errors surfaced to chat participants

use crate::infrastructure::traits::TransportError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("chat session {0} does not exist")]
    SessionNotFound(Uuid),
    #[error("chat session {0} is closed")]
    SessionClosed(Uuid),
    #[error("could not reach the chat channel: {0}")]
    Transport(#[from] TransportError),
}
