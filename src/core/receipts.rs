//! Read receipts.
//!
//! Unread messages shown to a viewer are marked read in the background. Writes are
//! fire-and-forget: a failed write is logged and never retried.

use crate::infrastructure::entities::{ChatMessage, Sender};
use crate::infrastructure::traits::ChatChannel;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Who is looking at a message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerRole {
    Visitor,
    Admin,
}

impl ViewerRole {
    /// The sender whose messages this viewer has to read.
    pub fn counterparty(&self) -> Sender {
        match self {
            ViewerRole::Visitor => Sender::Operator,
            ViewerRole::Admin => Sender::Visitor,
        }
    }

    /// The sender this viewer writes as.
    pub fn as_sender(&self) -> Sender {
        match self {
            ViewerRole::Visitor => Sender::Visitor,
            ViewerRole::Admin => Sender::Operator,
        }
    }
}

pub fn is_unread_for(message: &ChatMessage, viewer: ViewerRole) -> bool {
    message.sender == viewer.counterparty() && !message.read
}

pub fn count_unread(messages: &[ChatMessage], viewer: ViewerRole) -> usize {
    messages.iter().filter(|m| is_unread_for(m, viewer)).count()
}

enum ReceiptJob {
    MarkRead(Uuid),
    Flush(oneshot::Sender<()>),
}

/// One tracker per message view: a widget, a console or an event stream.
pub struct ReadReceiptTracker {
    queue: mpsc::UnboundedSender<ReceiptJob>,
    /// Every message a write was queued for. Only grows; it lives as long as the view that
    /// owns the tracker, so it stays bounded by the messages that view has shown.
    issued: Mutex<HashSet<Uuid>>,
}

impl ReadReceiptTracker {
    /// Creates a tracker and spawns its mark-read worker on the current runtime.
    pub fn spawn(channel: Arc<dyn ChatChannel>) -> Arc<ReadReceiptTracker> {
        let (queue, jobs) = mpsc::unbounded_channel();
        tokio::spawn(background_task(jobs, channel));

        Arc::new(ReadReceiptTracker {
            queue,
            issued: Mutex::new(HashSet::new()),
        })
    }

    /// Counts the messages unread by `viewer` and queues a mark-read write for each of them.
    ///
    /// The returned count is taken before any write lands. A message gets at most one write
    /// over the lifetime of the tracker.
    pub fn reconcile(&self, messages: &[ChatMessage], viewer: ViewerRole) -> usize {
        let unread: Vec<&ChatMessage> = messages
            .iter()
            .filter(|m| is_unread_for(m, viewer))
            .collect();

        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        for message in &unread {
            if !issued.insert(message.id) {
                continue;
            }
            if self.queue.send(ReceiptJob::MarkRead(message.id)).is_err() {
                error!("read receipt worker is gone, message {} stays unread", message.id);
            }
        }

        unread.len()
    }

    /// Resolves once every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(ReceiptJob::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn background_task(
    mut jobs: mpsc::UnboundedReceiver<ReceiptJob>,
    channel: Arc<dyn ChatChannel>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            ReceiptJob::MarkRead(message_id) => {
                if let Err(e) = channel.mark_read(message_id).await {
                    error!("Error marking message {message_id} as read: {e}");
                }
            }
            ReceiptJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("read receipt worker stopped");
}
