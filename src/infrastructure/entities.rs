//! Database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(SessionStatus::Waiting),
            "active" => Ok(SessionStatus::Active),
            "closed" => Ok(SessionStatus::Closed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Visitor,
    Operator,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub visitor_id: String,
    pub visitor_name: String,
    pub visitor_email: String,
    pub visitor_phone: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<String>,
    pub unread_count: i64,
}

/// Session fields supplied by the caller; id and `created_at` come from the channel.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub visitor_id: String,
    pub visitor_name: String,
    pub visitor_email: String,
    pub visitor_phone: Option<String>,
}

/// Partial update of a session. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub last_message: Option<String>,
    /// Leave `status` alone if the session is closed at write time.
    pub keep_closed: bool,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub sender_name: Option<String>,
    /// Server timestamp. `None` while the write is still pending confirmation.
    pub timestamp: Option<DateTime<Utc>>,
    pub read: bool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub sender_name: Option<String>,
}

/// Something changed in one of the collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Session(Uuid),
    Message { session_id: Uuid },
}
