//! Keeps a local, ordered view of a session's messages in step with the channel.

use crate::core::errors::ChatError;
use crate::core::receipts::{ReadReceiptTracker, ViewerRole, count_unread};
use crate::infrastructure::entities::{ChatMessage, ChatSession};
use crate::infrastructure::traits::ChatChannel;
use futures_util::StreamExt;
use log::debug;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One delivered snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncUpdate {
    pub messages: Vec<ChatMessage>,
    /// Unread count before any read receipts from this snapshot land.
    pub unread_count: usize,
}

/// Whether the message list is currently on screen. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct Visibility(Arc<AtomicBool>);

impl Visibility {
    pub fn visible() -> Self {
        Visibility(Arc::new(AtomicBool::new(true)))
    }

    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn set(&self, visible: bool) {
        self.0.store(visible, AtomicOrdering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

/// Ascending by timestamp, pending timestamps last. Ties keep snapshot order.
pub fn order_messages(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Newest session first.
pub fn order_sessions(sessions: &mut [ChatSession]) {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Slot<T> = Arc<Mutex<Option<Box<dyn FnMut(T) + Send>>>>;

/// Handle to a running watch. Dropping it unsubscribes.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
    task: JoinHandle<()>,
}

impl Subscription {
    fn new<T: 'static>(slot: Slot<T>, task: JoinHandle<()>) -> Self {
        Subscription {
            release: Some(Box::new(move || {
                // waits for a running callback, then drops it
                lock(&slot).take();
            })),
            task,
        }
    }

    /// Stops the watch. No callback runs once this returns.
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.task.abort();
    }
}

/// Calls the callback in `slot`, returning `false` once it has been released.
fn deliver<T>(slot: &Slot<T>, value: T) -> bool {
    let mut guard = lock(slot);
    match guard.as_mut() {
        Some(callback) => {
            callback(value);
            true
        }
        None => false,
    }
}

pub struct MessageSynchronizer {
    channel: Arc<dyn ChatChannel>,
    receipts: Arc<ReadReceiptTracker>,
}

impl MessageSynchronizer {
    pub fn new(channel: Arc<dyn ChatChannel>, receipts: Arc<ReadReceiptTracker>) -> Self {
        Self { channel, receipts }
    }

    pub fn receipts(&self) -> &Arc<ReadReceiptTracker> {
        &self.receipts
    }

    /// Watches the messages of `session_id` on behalf of `viewer`.
    ///
    /// Every snapshot is re-sorted and handed to `on_update` as a whole. While `visibility`
    /// is set, unread messages from the counterparty are marked read.
    pub async fn subscribe<F>(
        &self,
        session_id: Uuid,
        viewer: ViewerRole,
        visibility: Visibility,
        on_update: F,
    ) -> Result<Subscription, ChatError>
    where
        F: FnMut(SyncUpdate) + Send + 'static,
    {
        let mut snapshots = self.channel.watch_messages(session_id).await?;
        let callback: Box<dyn FnMut(SyncUpdate) + Send> = Box::new(on_update);
        let slot: Slot<SyncUpdate> = Arc::new(Mutex::new(Some(callback)));
        let receipts = self.receipts.clone();

        let task_slot = slot.clone();
        let task = tokio::spawn(async move {
            while let Some(mut messages) = snapshots.next().await {
                order_messages(&mut messages);
                let unread_count = if visibility.is_visible() {
                    receipts.reconcile(&messages, viewer)
                } else {
                    count_unread(&messages, viewer)
                };

                if !deliver(
                    &task_slot,
                    SyncUpdate {
                        messages,
                        unread_count,
                    },
                ) {
                    break;
                }
            }
            debug!("message watch for session {session_id} ended");
        });

        Ok(Subscription::new(slot, task))
    }
}

/// Watches the session list, newest first.
pub async fn subscribe_sessions<F>(
    channel: &dyn ChatChannel,
    on_update: F,
) -> Result<Subscription, ChatError>
where
    F: FnMut(Vec<ChatSession>) + Send + 'static,
{
    let mut snapshots = channel.watch_sessions().await?;
    let callback: Box<dyn FnMut(Vec<ChatSession>) + Send> = Box::new(on_update);
    let slot: Slot<Vec<ChatSession>> = Arc::new(Mutex::new(Some(callback)));

    let task_slot = slot.clone();
    let task = tokio::spawn(async move {
        while let Some(mut sessions) = snapshots.next().await {
            order_sessions(&mut sessions);
            if !deliver(&task_slot, sessions) {
                break;
            }
        }
        debug!("session list watch ended");
    });

    Ok(Subscription::new(slot, task))
}
