use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error returned by the host platform. Carries an HTTP-style status so
/// front ends can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub status_code: u16,
    pub message: String,
}

impl AppError {
    #[must_use]
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub channel_id: String,
    pub user_id: String,
}

/// A message in a channel. `id` is assigned by the host on creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub message: String,
    #[serde(default, rename = "type")]
    pub post_type: String,
    #[serde(default)]
    pub props: Map<String, Value>,
}

/// Invocation of a slash command. `command` holds the full text, trigger
/// included (e.g. `/webex room-reset`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    pub command: String,
    pub user_id: String,
    pub channel_id: String,
}

impl CommandArgs {
    /// Whitespace-separated tokens after the trigger.
    #[must_use]
    pub fn args(&self) -> Vec<&str> {
        self.command.split_whitespace().skip(1).collect()
    }

    #[must_use]
    pub fn trigger(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }
}

/// Services the host platform exposes to plugins.
#[async_trait]
pub trait PluginApi: Send + Sync {
    /// User ID of the bot account posts are made as.
    fn bot_user_id(&self) -> &str;

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;
    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), AppError>;

    async fn get_user(&self, user_id: &str) -> Result<User, AppError>;
    async fn get_user_by_username(&self, username: &str) -> Result<User, AppError>;
    async fn get_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<ChannelMember, AppError>;

    async fn create_post(&self, post: Post) -> Result<Post, AppError>;

    /// Shows `post` to `user_id` only. Delivery failures are the host's
    /// concern; the post is handed back as sent.
    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Post;
}
