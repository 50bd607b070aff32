//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support_chat::core::config::ChatConfig;
use support_chat::core::services::ChannelSessionService;
use support_chat::infrastructure::database::{ChangeFeed, DatabaseConnection};
use support_chat::infrastructure::entities::{
    ChatMessage, ChatSession, NewMessage, NewSession, SessionStatus, SessionUpdate,
};
use support_chat::infrastructure::repositories::DbChatChannel;
use support_chat::infrastructure::traits::{ChatChannel, SnapshotStream, TransportError};
use uuid::Uuid;

/// Counter for unique test database URIs
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Setup test database with migrations. Every call gets its own shared in-memory database,
/// so all pooled connections see the same tables.
pub async fn setup_test_db() -> SqlitePool {
    let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_url = format!("sqlite:file:chatdb{db_num}?mode=memory&cache=shared");

    let pool = SqlitePool::connect(&db_url).await.unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

pub async fn db_channel() -> Arc<DbChatChannel> {
    let pool = setup_test_db().await;
    Arc::new(DbChatChannel::new(
        Arc::new(DatabaseConnection::from_pool(pool)),
        Arc::new(ChangeFeed::create()),
    ))
}

pub fn session_service(channel: Arc<dyn ChatChannel>, config: ChatConfig) -> ChannelSessionService {
    ChannelSessionService::new(channel, Arc::new(config))
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wraps a channel, records mark-read calls and can be told to fail.
pub struct RecordingChannel {
    inner: Arc<dyn ChatChannel>,
    pub mark_read_calls: Mutex<Vec<Uuid>>,
    pub fail_mark_read: AtomicBool,
    pub fail_writes: AtomicBool,
    /// The next `watch_messages` call fails.
    pub fail_next_watch: AtomicBool,
    /// Closes this session right before the next message is written.
    pub close_before_next_message: Mutex<Option<Uuid>>,
}

impl RecordingChannel {
    pub fn new(inner: Arc<dyn ChatChannel>) -> Self {
        RecordingChannel {
            inner,
            mark_read_calls: Mutex::new(Vec::new()),
            fail_mark_read: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_next_watch: AtomicBool::new(false),
            close_before_next_message: Mutex::new(None),
        }
    }

    pub fn mark_read_calls(&self) -> Vec<Uuid> {
        self.mark_read_calls.lock().unwrap().clone()
    }

    fn check_writes(&self) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(TransportError::Database(sqlx::Error::PoolClosed))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    async fn create_session(&self, session: NewSession) -> Result<ChatSession, TransportError> {
        self.check_writes()?;
        self.inner.create_session(session).await
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ChatSession>, TransportError> {
        self.inner.get_session(session_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, TransportError> {
        self.inner.list_sessions().await
    }

    async fn update_session(
        &self,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<(), TransportError> {
        self.check_writes()?;
        self.inner.update_session(session_id, update).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, TransportError> {
        self.check_writes()?;
        let closing = self.close_before_next_message.lock().unwrap().take();
        if let Some(session_id) = closing {
            self.inner
                .update_session(
                    session_id,
                    SessionUpdate {
                        status: Some(SessionStatus::Closed),
                        ..SessionUpdate::default()
                    },
                )
                .await?;
        }
        self.inner.create_message(message).await
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, TransportError> {
        self.inner.list_messages(session_id).await
    }

    async fn mark_read(&self, message_id: Uuid) -> Result<(), TransportError> {
        self.mark_read_calls.lock().unwrap().push(message_id);
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(TransportError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.mark_read(message_id).await
    }

    async fn watch_messages(
        &self,
        session_id: Uuid,
    ) -> Result<SnapshotStream<ChatMessage>, TransportError> {
        if self.fail_next_watch.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.watch_messages(session_id).await
    }

    async fn watch_sessions(&self) -> Result<SnapshotStream<ChatSession>, TransportError> {
        self.inner.watch_sessions().await
    }
}
