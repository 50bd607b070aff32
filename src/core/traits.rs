//! DI "Interfaces"

use crate::core::errors::ChatError;
use crate::infrastructure::entities;
use crate::infrastructure::entities::Sender;
use async_trait::async_trait;
use uuid::Uuid;

/// Contact details a visitor gives before the chat starts.
#[derive(Debug, Clone, Default)]
pub struct VisitorInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[async_trait]
pub trait SessionService: Send + Sync {
    /// Starts a new chat session for a visitor and seeds the operator greeting.
    ///
    /// Returns `Err(ChatError::Validation)` if the name or e-mail is blank.
    async fn start_session(&self, visitor: VisitorInfo) -> Result<Uuid, ChatError>;

    /// Appends a message to a session.
    ///
    /// Visitor messages also refresh `last_message` and make the session active. Writing into
    /// a closed session depends on the configured reopen policy for visitors and is always
    /// refused for operators.
    async fn send_message(
        &self,
        session_id: Uuid,
        text: &str,
        sender: Sender,
        sender_name: Option<String>,
    ) -> Result<entities::ChatMessage, ChatError>;

    /// Closes a session. Closing twice is fine.
    async fn close_session(&self, session_id: Uuid) -> Result<(), ChatError>;

    /// Lists all sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<entities::ChatSession>, ChatError>;

    async fn get_session(&self, session_id: Uuid) -> Result<entities::ChatSession, ChatError>;

    async fn send_visitor_message(
        &self,
        session_id: Uuid,
        text: &str,
        visitor_name: Option<String>,
    ) -> Result<entities::ChatMessage, ChatError> {
        self.send_message(session_id, text, Sender::Visitor, visitor_name)
            .await
    }

    async fn send_operator_message(
        &self,
        session_id: Uuid,
        text: &str,
        operator_name: Option<String>,
    ) -> Result<entities::ChatMessage, ChatError> {
        self.send_message(session_id, text, Sender::Operator, operator_name)
            .await
    }
}
