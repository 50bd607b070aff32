//! Runtime configuration, read from the environment

use crate::infrastructure::position_store::FilePositionStore;
use di::{inject, injectable};
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_GREETING: &str = "Hello {{ name }}! Thank you for contacting us. A support agent will be with you shortly, please wait a moment...";
pub const DEFAULT_OPERATOR_NAME: &str = "Support agent";

/// What happens when a visitor writes into a closed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReopenPolicy {
    /// The message is written and the session becomes active again.
    #[default]
    Reopen,
    /// The message is refused.
    Reject,
}

impl FromStr for ReopenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reopen" => Ok(ReopenPolicy::Reopen),
            "reject" => Ok(ReopenPolicy::Reject),
            other => Err(format!("unknown reopen policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// minijinja template, rendered with `name`.
    pub greeting_template: String,
    pub operator_name: String,
    pub reopen_policy: ReopenPolicy,
    pub quick_replies: Vec<String>,
    /// Directory holding the persisted widget position.
    pub position_dir: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            greeting_template: DEFAULT_GREETING.to_owned(),
            operator_name: DEFAULT_OPERATOR_NAME.to_owned(),
            reopen_policy: ReopenPolicy::default(),
            quick_replies: vec![
                "Hello! How can I help you?".to_owned(),
                "Thank you for contacting us".to_owned(),
                "Could you give me some more details?".to_owned(),
                "I will check and get back to you".to_owned(),
            ],
            position_dir: PathBuf::from(".support-chat"),
        }
    }
}

#[injectable]
impl ChatConfig {
    #[inject]
    pub fn create() -> ChatConfig {
        dotenvy::dotenv().ok();
        ChatConfig::from_vars(|key| env::var(key).ok())
    }
}

impl ChatConfig {
    /// Builds the config from a variable lookup, falling back to defaults per key.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ChatConfig {
        let defaults = ChatConfig::default();

        let reopen_policy = match lookup("CHAT_REOPEN_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{e}, using `reopen`");
                ReopenPolicy::Reopen
            }),
            None => defaults.reopen_policy,
        };

        let quick_replies = lookup("CHAT_QUICK_REPLIES")
            .map(|raw| {
                raw.split('|')
                    .map(str::trim)
                    .filter(|reply| !reply.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .filter(|replies| !replies.is_empty())
            .unwrap_or(defaults.quick_replies);

        ChatConfig {
            greeting_template: lookup("CHAT_GREETING").unwrap_or(defaults.greeting_template),
            operator_name: lookup("CHAT_OPERATOR_NAME").unwrap_or(defaults.operator_name),
            reopen_policy,
            quick_replies,
            position_dir: lookup("CHAT_POSITION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.position_dir),
        }
    }

    /// File store for the widget position under `position_dir`.
    pub fn position_store(&self) -> FilePositionStore {
        FilePositionStore::new(&self.position_dir)
    }
}
