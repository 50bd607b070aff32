//! Visitor-side chat widget.

use crate::core::errors::ChatError;
use crate::core::positioning::{
    DragRelease, PanelRect, Pointer, PositioningEngine, Viewport, WidgetPosition,
};
use crate::core::receipts::{ReadReceiptTracker, ViewerRole};
use crate::core::sync::{MessageSynchronizer, Subscription, SyncUpdate, Visibility, lock};
use crate::core::traits::{SessionService, VisitorInfo};
use crate::infrastructure::entities::ChatMessage;
use crate::infrastructure::traits::{ChatChannel, PositionStore};
use log::warn;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Everything the widget needs to draw itself.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetView {
    pub open: bool,
    pub session_id: Option<Uuid>,
    pub messages: Vec<ChatMessage>,
    pub unread_count: usize,
    pub control: WidgetPosition,
    pub panel: PanelRect,
    pub can_start: bool,
    pub can_send: bool,
    pub closed: bool,
}

pub struct WidgetController {
    sessions: Arc<dyn SessionService>,
    synchronizer: MessageSynchronizer,
    positioning: PositioningEngine,
    visibility: Visibility,
    contact: VisitorInfo,
    session_id: Option<Uuid>,
    closed: bool,
    draft: String,
    latest: Arc<Mutex<SyncUpdate>>,
    subscription: Option<Subscription>,
}

impl WidgetController {
    /// Must be called inside a Tokio runtime.
    pub fn mount(
        sessions: Arc<dyn SessionService>,
        channel: Arc<dyn ChatChannel>,
        store: Arc<dyn PositionStore>,
        viewport: Viewport,
    ) -> Self {
        let receipts = ReadReceiptTracker::spawn(channel.clone());
        WidgetController {
            sessions,
            synchronizer: MessageSynchronizer::new(channel, receipts),
            positioning: PositioningEngine::mount(store, viewport),
            visibility: Visibility::hidden(),
            contact: VisitorInfo::default(),
            session_id: None,
            closed: false,
            draft: String::new(),
            latest: Arc::new(Mutex::new(SyncUpdate::default())),
            subscription: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Shows the panel and marks what is already on screen as read.
    pub fn open(&mut self) {
        if self.is_open() {
            return;
        }
        self.visibility.set(true);
        let latest = lock(&self.latest);
        self.synchronizer
            .receipts()
            .reconcile(&latest.messages, ViewerRole::Visitor);
    }

    pub fn close(&mut self) {
        self.visibility.set(false);
    }

    pub fn toggle(&mut self) {
        if self.is_open() {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn set_contact(&mut self, contact: VisitorInfo) {
        self.contact = contact;
    }

    pub fn can_start(&self) -> bool {
        self.session_id.is_none()
            && !self.contact.name.trim().is_empty()
            && !self.contact.email.trim().is_empty()
    }

    /// Starts the chat with the entered contact details and begins following its messages.
    ///
    /// Calling it again after a failed watch keeps the session and only retries the watch.
    pub async fn submit_contact(&mut self) -> Result<Uuid, ChatError> {
        let session_id = match self.session_id {
            Some(session_id) => session_id,
            None => {
                let session_id = self.sessions.start_session(self.contact.clone()).await?;
                self.session_id = Some(session_id);
                session_id
            }
        };
        if self.subscription.is_some() {
            return Ok(session_id);
        }

        let latest = self.latest.clone();
        let subscription = self
            .synchronizer
            .subscribe(
                session_id,
                ViewerRole::Visitor,
                self.visibility.clone(),
                move |update| *lock(&latest) = update,
            )
            .await
            .inspect_err(|e| warn!("Error watching chat session {session_id}: {e}"))?;
        self.subscription = Some(subscription);
        Ok(session_id)
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn can_send(&self) -> bool {
        self.session_id.is_some() && !self.closed && !self.draft.trim().is_empty()
    }

    /// Sends the draft. On failure the draft is kept so the visitor can resubmit.
    pub async fn send(&mut self) -> Result<(), ChatError> {
        let Some(session_id) = self.session_id else {
            return Err(ChatError::Validation("the chat has not been started"));
        };

        let visitor_name = Some(self.contact.name.trim().to_owned()).filter(|n| !n.is_empty());
        match self
            .sessions
            .send_visitor_message(session_id, &self.draft, visitor_name)
            .await
        {
            Ok(_) => {
                self.draft.clear();
                Ok(())
            }
            Err(e) => {
                if let ChatError::SessionClosed(_) = e {
                    self.closed = true;
                }
                warn!("Error sending message: {e}");
                Err(e)
            }
        }
    }

    pub fn pointer_down(&mut self, pointer: Pointer) -> bool {
        self.positioning.pointer_down(pointer)
    }

    pub fn pointer_move(&mut self, pointer: Pointer) {
        self.positioning.pointer_move(pointer);
    }

    /// Ends a drag. A press without movement toggles the panel.
    pub fn pointer_up(&mut self) -> DragRelease {
        let release = self.positioning.pointer_up();
        if release == DragRelease::Click {
            self.toggle();
        }
        release
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.positioning.resize(viewport);
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn view(&self) -> WidgetView {
        let latest = lock(&self.latest).clone();
        WidgetView {
            open: self.is_open(),
            session_id: self.session_id,
            messages: latest.messages,
            unread_count: latest.unread_count,
            control: self.positioning.position(),
            panel: self.positioning.panel(),
            can_start: self.can_start(),
            can_send: self.can_send(),
            closed: self.closed,
        }
    }
}
