//! DB Repository abstractions

use crate::infrastructure::database::{ChangeFeed, DatabaseConnection};
use crate::infrastructure::entities::{
    ChangeEvent, ChatMessage, ChatSession, NewMessage, NewSession, SessionStatus, SessionUpdate,
};
use crate::infrastructure::traits::{ChatChannel, SnapshotStream, TransportError};
use async_stream::stream;
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::{error, warn};
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

const SELECT_SESSIONS: &str = "SELECT id, visitor_id, visitor_name, visitor_email, visitor_phone, status, created_at, last_message, unread_count FROM chat_sessions";
const SELECT_MESSAGES: &str =
    "SELECT id, session_id, text, sender, sender_name, timestamp, read FROM chat_messages";

#[injectable(ChatChannel)]
pub struct DbChatChannel {
    connection: Ref<DatabaseConnection>,
    feed: Ref<ChangeFeed>,
}

impl DbChatChannel {
    pub fn new(connection: Ref<DatabaseConnection>, feed: Ref<ChangeFeed>) -> Self {
        Self { connection, feed }
    }

    fn pool(&self) -> SqlitePool {
        (**self.connection).clone()
    }
}

async fn fetch_messages(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<ChatMessage>, sqlx::Error> {
    sqlx::query_as(&format!("{SELECT_MESSAGES} WHERE session_id = ? ORDER BY rowid ASC"))
        .bind(session_id)
        .fetch_all(pool)
        .await
}

async fn fetch_sessions(pool: &SqlitePool) -> Result<Vec<ChatSession>, sqlx::Error> {
    // rowid follows insertion, so same-second sessions still come newest first
    sqlx::query_as(&format!("{SELECT_SESSIONS} ORDER BY rowid DESC"))
        .fetch_all(pool)
        .await
}

#[async_trait]
impl ChatChannel for DbChatChannel {
    async fn create_session(&self, session: NewSession) -> Result<ChatSession, TransportError> {
        let created: ChatSession = sqlx::query_as(
            "INSERT INTO chat_sessions (id, visitor_id, visitor_name, visitor_email, visitor_phone, status, created_at, unread_count) VALUES (?, ?, ?, ?, ?, ?, ?, 0) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(session.visitor_id)
        .bind(session.visitor_name)
        .bind(session.visitor_email)
        .bind(session.visitor_phone)
        .bind(SessionStatus::Waiting)
        .bind(Utc::now())
        .fetch_one(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))?;

        self.feed.publish(ChangeEvent::Session(created.id));
        Ok(created)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ChatSession>, TransportError> {
        Ok(sqlx::query_as(&format!("{SELECT_SESSIONS} WHERE id = ?"))
            .bind(session_id)
            .fetch_optional(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))?)
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, TransportError> {
        Ok(fetch_sessions(&self.connection)
            .await
            .inspect_err(|e| error!("{e}"))?)
    }

    async fn update_session(
        &self,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<(), TransportError> {
        sqlx::query(
            "UPDATE chat_sessions SET status = CASE WHEN ? AND status = 'closed' THEN status ELSE COALESCE(?, status) END, last_message = COALESCE(?, last_message) WHERE id = ?",
        )
        .bind(update.keep_closed)
        .bind(update.status)
        .bind(update.last_message)
        .bind(session_id)
        .execute(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))?;

        self.feed.publish(ChangeEvent::Session(session_id));
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, TransportError> {
        let created: ChatMessage = sqlx::query_as(
            "INSERT INTO chat_messages (id, session_id, text, sender, sender_name, timestamp, read) VALUES (?, ?, ?, ?, ?, ?, FALSE) RETURNING *",
        )
            .bind(Uuid::new_v4())
            .bind(message.session_id)
            .bind(message.text)
            .bind(message.sender)
            .bind(message.sender_name)
            .bind(Utc::now())
            .fetch_one(&**self.connection)
            .await
            .inspect_err(|e| error!("{e}"))?;

        self.feed.publish(ChangeEvent::Message {
            session_id: created.session_id,
        });
        Ok(created)
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, TransportError> {
        Ok(fetch_messages(&self.connection, session_id)
            .await
            .inspect_err(|e| error!("{e}"))?)
    }

    async fn mark_read(&self, message_id: Uuid) -> Result<(), TransportError> {
        let session_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE chat_messages SET read = TRUE WHERE id = ? AND read = FALSE RETURNING session_id",
        )
        .bind(message_id)
        .fetch_optional(&**self.connection)
        .await
        .inspect_err(|e| error!("{e}"))?;

        if let Some(session_id) = session_id {
            self.feed.publish(ChangeEvent::Message { session_id });
        }
        Ok(())
    }

    async fn watch_messages(
        &self,
        session_id: Uuid,
    ) -> Result<SnapshotStream<ChatMessage>, TransportError> {
        let pool = self.pool();
        // subscribe before the first query so no write slips between the two
        let mut changes = self.feed.subscribe();
        let initial = fetch_messages(&pool, session_id)
            .await
            .inspect_err(|e| error!("{e}"))?;

        Ok(Box::pin(stream! {
            yield initial;

            loop {
                match changes.recv().await {
                    Ok(ChangeEvent::Message { session_id: changed }) if changed == session_id => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("message watch for session {session_id} lagged by {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }

                match fetch_messages(&pool, session_id).await {
                    Ok(messages) => yield messages,
                    Err(e) => error!("failed to refresh messages of session {session_id}: {e}"),
                }
            }
        }))
    }

    async fn watch_sessions(&self) -> Result<SnapshotStream<ChatSession>, TransportError> {
        let pool = self.pool();
        let mut changes = self.feed.subscribe();
        let initial = fetch_sessions(&pool).await.inspect_err(|e| error!("{e}"))?;

        Ok(Box::pin(stream! {
            yield initial;

            loop {
                match changes.recv().await {
                    Ok(ChangeEvent::Session(_)) => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("session watch lagged by {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }

                match fetch_sessions(&pool).await {
                    Ok(sessions) => yield sessions,
                    Err(e) => error!("failed to refresh sessions: {e}"),
                }
            }
        }))
    }
}
