//! Chat session endpoints

use crate::api::ExtractViewer;
use crate::core::admin::{StatusFilter, filter_sessions};
use crate::core::config::ChatConfig;
use crate::core::errors::ChatError;
use crate::core::receipts::{ReadReceiptTracker, ViewerRole};
use crate::core::sync::{MessageSynchronizer, Visibility};
use crate::core::traits::{SessionService, VisitorInfo};
use crate::infrastructure::entities::SessionStatus;
use crate::infrastructure::traits::ChatChannel;
use async_stream::stream;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use futures_util::Stream;
use log::error;
use std::convert::Infallible;
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sessions).post(start_session))
        .route("/:id/messages", post(post_message))
        .route("/:id/close", post(close_session))
        .route("/:id/events", get(session_events))
}

pub enum ApiError {
    Chat(ChatError),
    Forbidden,
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError::Chat(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Chat(e) => e.into_response(),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "admin role required").into_response(),
        }
    }
}

fn require_admin(viewer: ViewerRole) -> Result<(), ApiError> {
    match viewer {
        ViewerRole::Admin => Ok(()),
        ViewerRole::Visitor => Err(ApiError::Forbidden),
    }
}

async fn start_session(
    Inject(session_service): Inject<dyn SessionService>,
    Json(body): Json<schemas::StartSession>,
) -> Result<(StatusCode, Json<schemas::SessionStarted>), ApiError> {
    let session_id = session_service
        .start_session(VisitorInfo {
            name: body.name,
            email: body.email,
            phone: body.phone,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(schemas::SessionStarted { session_id }),
    ))
}

async fn list_sessions(
    Inject(session_service): Inject<dyn SessionService>,
    ExtractViewer(viewer): ExtractViewer,
    Query(query): Query<schemas::SessionQuery>,
) -> Result<Json<schemas::SessionList>, ApiError> {
    require_admin(viewer)?;

    let status = match query.status.as_deref() {
        None | Some("all") => StatusFilter::All,
        Some(raw) => StatusFilter::Only(
            raw.parse::<SessionStatus>()
                .map_err(|_| ChatError::Validation("unknown status filter"))?,
        ),
    };

    let sessions = session_service.list_sessions().await?;
    let sessions = filter_sessions(&sessions, query.search.as_deref().unwrap_or(""), status);

    Ok(Json(schemas::SessionList {
        sessions: sessions.into_iter().map(schemas::Session::from).collect(),
    }))
}

async fn post_message(
    Inject(session_service): Inject<dyn SessionService>,
    Inject(config): Inject<ChatConfig>,
    ExtractViewer(viewer): ExtractViewer,
    Path(session_id): Path<Uuid>,
    Json(body): Json<schemas::CreateMessage>,
) -> Result<(StatusCode, Json<schemas::Message>), ApiError> {
    let sender_name = match viewer {
        ViewerRole::Admin => body
            .sender_name
            .or_else(|| Some(config.operator_name.clone())),
        ViewerRole::Visitor => body.sender_name,
    };

    let message = session_service
        .send_message(session_id, &body.text, viewer.as_sender(), sender_name)
        .await?;

    Ok((StatusCode::CREATED, Json(schemas::Message::from(message))))
}

async fn close_session(
    Inject(session_service): Inject<dyn SessionService>,
    ExtractViewer(viewer): ExtractViewer,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_admin(viewer)?;
    session_service.get_session(session_id).await?;
    session_service.close_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams the ordered message list of a session. An open stream counts as "on screen", so
/// messages from the other party are marked read.
async fn session_events(
    Inject(session_service): Inject<dyn SessionService>,
    Inject(channel): Inject<dyn ChatChannel>,
    ExtractViewer(viewer): ExtractViewer,
    Path(session_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    session_service.get_session(session_id).await?;

    let synchronizer =
        MessageSynchronizer::new(channel.clone(), ReadReceiptTracker::spawn(channel));
    let (updates, mut receiver) = mpsc::unbounded_channel();
    let subscription = synchronizer
        .subscribe(session_id, viewer, Visibility::visible(), move |update| {
            let _ = updates.send(update);
        })
        .await?;

    let stream = stream! {
        // dropping the stream ends the watch
        let _subscription = subscription;
        while let Some(update) = receiver.recv().await {
            match Event::default()
                .event("snapshot")
                .json_data(schemas::Snapshot::from(update))
            {
                Ok(event) => yield Ok(event),
                Err(e) => error!("failed to encode snapshot of session {session_id}: {e}"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub mod schemas {
    use crate::core::sync::SyncUpdate;
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    pub struct StartSession {
        pub name: String,
        pub email: String,
        pub phone: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct SessionStarted {
        pub session_id: Uuid,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct SessionQuery {
        pub status: Option<String>,
        pub search: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct Session {
        pub id: Uuid,
        pub visitor_name: String,
        pub visitor_email: String,
        pub visitor_phone: Option<String>,
        pub status: entities::SessionStatus,
        pub created_at: DateTime<Utc>,
        pub last_message: Option<String>,
    }

    impl From<entities::ChatSession> for Session {
        fn from(session: entities::ChatSession) -> Self {
            Session {
                id: session.id,
                visitor_name: session.visitor_name,
                visitor_email: session.visitor_email,
                visitor_phone: session.visitor_phone,
                status: session.status,
                created_at: session.created_at,
                last_message: session.last_message,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct SessionList {
        pub sessions: Vec<Session>,
    }

    #[derive(Deserialize, Debug)]
    pub struct CreateMessage {
        pub text: String,
        pub sender_name: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct Message {
        pub id: Uuid,
        pub session_id: Uuid,
        pub text: String,
        pub sender: entities::Sender,
        pub sender_name: Option<String>,
        pub timestamp: Option<DateTime<Utc>>,
        pub read: bool,
    }

    impl From<entities::ChatMessage> for Message {
        fn from(message: entities::ChatMessage) -> Self {
            Message {
                id: message.id,
                session_id: message.session_id,
                text: message.text,
                sender: message.sender,
                sender_name: message.sender_name,
                timestamp: message.timestamp,
                read: message.read,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct Snapshot {
        pub messages: Vec<Message>,
        pub unread_count: usize,
    }

    impl From<SyncUpdate> for Snapshot {
        fn from(update: SyncUpdate) -> Self {
            Snapshot {
                messages: update.messages.into_iter().map(Message::from).collect(),
                unread_count: update.unread_count,
            }
        }
    }
}
