//! Implementations for the service the app needs.
//!

use crate::core::config::{ChatConfig, DEFAULT_GREETING, ReopenPolicy};
use crate::core::errors::ChatError;
use crate::core::sync::order_sessions;
use crate::core::traits::{SessionService, VisitorInfo};
use crate::infrastructure::entities::{
    ChatMessage, ChatSession, NewMessage, NewSession, Sender, SessionStatus, SessionUpdate,
};
use crate::infrastructure::traits::ChatChannel;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{info, warn};
use uuid::Uuid;

#[injectable(SessionService)]
pub struct ChannelSessionService {
    channel: Ref<dyn ChatChannel>,
    config: Ref<ChatConfig>,
}

impl ChannelSessionService {
    pub fn new(channel: Ref<dyn ChatChannel>, config: Ref<ChatConfig>) -> Self {
        Self { channel, config }
    }

    fn greeting_for(&self, name: &str) -> String {
        let env = minijinja::Environment::new();
        env.render_str(&self.config.greeting_template, minijinja::context! { name => name })
            .unwrap_or_else(|e| {
                warn!("greeting template failed to render, using the default: {e}");
                env.render_str(DEFAULT_GREETING, minijinja::context! { name => name })
                    .unwrap_or_else(|_| format!("Hello {name}!"))
            })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[async_trait]
impl SessionService for ChannelSessionService {
    async fn start_session(&self, visitor: VisitorInfo) -> Result<Uuid, ChatError> {
        let name = non_blank(&visitor.name).ok_or(ChatError::Validation("name is required"))?;
        let email =
            non_blank(&visitor.email).ok_or(ChatError::Validation("e-mail is required"))?;

        let session = self
            .channel
            .create_session(NewSession {
                visitor_id: format!("visitor_{}", Uuid::new_v4().simple()),
                visitor_name: name.clone(),
                visitor_email: email,
                visitor_phone: visitor.phone.as_deref().and_then(non_blank),
            })
            .await?;

        self.channel
            .create_message(NewMessage {
                session_id: session.id,
                text: self.greeting_for(&name),
                sender: Sender::Operator,
                sender_name: Some(self.config.operator_name.clone()),
            })
            .await?;

        info!("chat session {} started by {}", session.id, session.visitor_id);
        Ok(session.id)
    }

    async fn send_message(
        &self,
        session_id: Uuid,
        text: &str,
        sender: Sender,
        sender_name: Option<String>,
    ) -> Result<ChatMessage, ChatError> {
        let text = non_blank(text).ok_or(ChatError::Validation("message text is empty"))?;

        let session = self.get_session(session_id).await?;
        if session.status == SessionStatus::Closed {
            match (sender, self.config.reopen_policy) {
                (Sender::Visitor, ReopenPolicy::Reopen) => {
                    info!("visitor message reopens chat session {session_id}");
                }
                _ => return Err(ChatError::SessionClosed(session_id)),
            }
        }

        let message = self
            .channel
            .create_message(NewMessage {
                session_id,
                text: text.clone(),
                sender,
                sender_name,
            })
            .await?;

        if sender == Sender::Visitor {
            self.channel
                .update_session(
                    session_id,
                    SessionUpdate {
                        status: Some(SessionStatus::Active),
                        last_message: Some(text),
                        // a close that landed after the check above still wins
                        keep_closed: self.config.reopen_policy == ReopenPolicy::Reject,
                    },
                )
                .await?;
        }

        Ok(message)
    }

    async fn close_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.channel
            .update_session(
                session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Closed),
                    ..SessionUpdate::default()
                },
            )
            .await?;
        info!("chat session {session_id} closed");
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ChatError> {
        let mut sessions = self.channel.list_sessions().await?;
        order_sessions(&mut sessions);
        Ok(sessions)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<ChatSession, ChatError> {
        self.channel
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound(session_id))
    }
}
