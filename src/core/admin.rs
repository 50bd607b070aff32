//! Operator console: session list, one open conversation, quick replies.

use crate::core::config::ChatConfig;
use crate::core::errors::ChatError;
use crate::core::receipts::{ReadReceiptTracker, ViewerRole};
use crate::core::sync::{
    MessageSynchronizer, Subscription, SyncUpdate, Visibility, lock, subscribe_sessions,
};
use crate::core::traits::SessionService;
use crate::infrastructure::entities::{ChatMessage, ChatSession, SessionStatus};
use crate::infrastructure::traits::ChatChannel;
use log::warn;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(SessionStatus),
}

impl StatusFilter {
    fn matches(&self, status: SessionStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub waiting: usize,
    pub active: usize,
    pub total: usize,
}

impl SessionStats {
    pub fn of(sessions: &[ChatSession]) -> Self {
        SessionStats {
            waiting: sessions
                .iter()
                .filter(|s| s.status == SessionStatus::Waiting)
                .count(),
            active: sessions
                .iter()
                .filter(|s| s.status == SessionStatus::Active)
                .count(),
            total: sessions.len(),
        }
    }
}

/// Case-insensitive match on visitor name or e-mail, combined with a status filter.
pub fn filter_sessions(
    sessions: &[ChatSession],
    search: &str,
    status: StatusFilter,
) -> Vec<ChatSession> {
    let needle = search.trim().to_lowercase();
    sessions
        .iter()
        .filter(|s| {
            needle.is_empty()
                || s.visitor_name.to_lowercase().contains(&needle)
                || s.visitor_email.to_lowercase().contains(&needle)
        })
        .filter(|s| status.matches(s.status))
        .cloned()
        .collect()
}

pub struct AdminConsole {
    sessions: Arc<dyn SessionService>,
    synchronizer: MessageSynchronizer,
    config: Arc<ChatConfig>,
    session_list: Arc<Mutex<Vec<ChatSession>>>,
    conversation: Arc<Mutex<SyncUpdate>>,
    selected: Option<Uuid>,
    draft: String,
    _list_subscription: Subscription,
    conversation_subscription: Option<Subscription>,
}

impl AdminConsole {
    pub async fn mount(
        sessions: Arc<dyn SessionService>,
        channel: Arc<dyn ChatChannel>,
        config: Arc<ChatConfig>,
    ) -> Result<Self, ChatError> {
        let session_list = Arc::new(Mutex::new(Vec::new()));
        let list = session_list.clone();
        let list_subscription =
            subscribe_sessions(channel.as_ref(), move |sessions| *lock(&list) = sessions).await?;

        let receipts = ReadReceiptTracker::spawn(channel.clone());
        Ok(AdminConsole {
            sessions,
            synchronizer: MessageSynchronizer::new(channel, receipts),
            config,
            session_list,
            conversation: Arc::new(Mutex::new(SyncUpdate::default())),
            selected: None,
            draft: String::new(),
            _list_subscription: list_subscription,
            conversation_subscription: None,
        })
    }

    /// Newest first.
    pub fn sessions(&self) -> Vec<ChatSession> {
        lock(&self.session_list).clone()
    }

    pub fn filtered_sessions(&self, search: &str, status: StatusFilter) -> Vec<ChatSession> {
        filter_sessions(&lock(&self.session_list), search, status)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::of(&lock(&self.session_list))
    }

    pub fn selected_session(&self) -> Option<ChatSession> {
        let selected = self.selected?;
        lock(&self.session_list)
            .iter()
            .find(|s| s.id == selected)
            .cloned()
    }

    /// Opens a conversation. Visitor messages shown here are marked read.
    pub async fn select_session(&mut self, session_id: Uuid) -> Result<(), ChatError> {
        self.deselect();

        let conversation = self.conversation.clone();
        let subscription = self
            .synchronizer
            .subscribe(
                session_id,
                ViewerRole::Admin,
                Visibility::visible(),
                move |update| *lock(&conversation) = update,
            )
            .await?;

        self.selected = Some(session_id);
        self.conversation_subscription = Some(subscription);
        Ok(())
    }

    /// Back to the list.
    pub fn deselect(&mut self) {
        self.conversation_subscription = None;
        self.selected = None;
        *lock(&self.conversation) = SyncUpdate::default();
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.conversation).messages.clone()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.conversation).unread_count
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn quick_replies(&self) -> &[String] {
        &self.config.quick_replies
    }

    /// Replaces the draft with a canned reply. Returns `false` for an unknown index.
    pub fn insert_quick_reply(&mut self, index: usize) -> bool {
        match self.config.quick_replies.get(index) {
            Some(reply) => {
                self.draft = reply.clone();
                true
            }
            None => false,
        }
    }

    pub fn can_send(&self) -> bool {
        !self.draft.trim().is_empty()
            && self
                .selected_session()
                .is_some_and(|s| s.status != SessionStatus::Closed)
    }

    pub async fn send(&mut self) -> Result<(), ChatError> {
        let Some(session_id) = self.selected else {
            return Err(ChatError::Validation("no conversation selected"));
        };

        self.sessions
            .send_operator_message(
                session_id,
                &self.draft,
                Some(self.config.operator_name.clone()),
            )
            .await
            .inspect_err(|e| warn!("Error sending message: {e}"))?;
        self.draft.clear();
        Ok(())
    }

    pub async fn close_selected(&mut self) -> Result<(), ChatError> {
        let Some(session_id) = self.selected else {
            return Err(ChatError::Validation("no conversation selected"));
        };

        self.sessions.close_session(session_id).await?;
        // the list snapshot confirms this shortly
        if let Some(session) = lock(&self.session_list)
            .iter_mut()
            .find(|s| s.id == session_id)
        {
            session.status = SessionStatus::Closed;
        }
        Ok(())
    }
}
