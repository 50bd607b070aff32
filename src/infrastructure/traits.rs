//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Stream of full result sets; every item replaces the previous one.
pub type SnapshotStream<T> = Pin<Box<dyn Stream<Item = Vec<T>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The real-time store holding sessions and messages.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn create_session(
        &self,
        session: entities::NewSession,
    ) -> Result<entities::ChatSession, TransportError>;

    async fn get_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<entities::ChatSession>, TransportError>;

    async fn list_sessions(&self) -> Result<Vec<entities::ChatSession>, TransportError>;

    async fn update_session(
        &self,
        session_id: Uuid,
        update: entities::SessionUpdate,
    ) -> Result<(), TransportError>;

    async fn create_message(
        &self,
        message: entities::NewMessage,
    ) -> Result<entities::ChatMessage, TransportError>;

    async fn list_messages(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<entities::ChatMessage>, TransportError>;

    /// Sets `read = true`. Messages that are already read are left alone.
    async fn mark_read(&self, message_id: Uuid) -> Result<(), TransportError>;

    /// Watches every message of a session.
    ///
    /// The first item is the current snapshot; one more follows after each change.
    async fn watch_messages(
        &self,
        session_id: Uuid,
    ) -> Result<SnapshotStream<entities::ChatMessage>, TransportError>;

    /// Watches the whole session collection.
    async fn watch_sessions(&self) -> Result<SnapshotStream<entities::ChatSession>, TransportError>;
}

/// Local key/value slot for the widget position.
pub trait PositionStore: Send + Sync {
    fn load(&self) -> Option<String>;

    fn save(&self, raw: &str) -> std::io::Result<()>;
}
