//! Wire types shared by the chat relay and its clients.
//!
//! ```text
//! coze-chat --[POST /api/coze/chat, JSON ChatRequest]--> coze-relay --[SSE]--> Coze API
//!           <--[chunked text/plain deltas]-------------
//! ```
//!
//! The relay answers with the raw concatenation of assistant deltas. A body that
//! ends without the terminating chunk means the answer was cut short upstream.

use serde::{Deserialize, Serialize};

/// Path of the streaming chat endpoint.
pub const CHAT_PATH: &str = "/api/coze/chat";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Content type of a streamed chat answer.
pub const STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// Older transcripts spell this `ai`.
    #[serde(alias = "ai")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// One prior turn sent along with a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "text".to_string()
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            content_type: default_content_type(),
        }
    }
}

/// Body of `POST /api/coze/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Agent (bot) the conversation is held with.
    pub bot_id: String,
    /// Caller identity forwarded to the provider.
    pub user_id: String,
    /// Conversation so far, oldest first; the last entry is the new user turn.
    pub additional_messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Check the fields the relay needs before it opens an upstream call.
    pub fn validate(&self) -> Result<(), String> {
        if self.bot_id.trim().is_empty() {
            return Err("bot_id must not be empty".to_string());
        }
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if self.additional_messages.is_empty() {
            return Err("additional_messages must not be empty".to_string());
        }
        Ok(())
    }
}

/// JSON error body returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
