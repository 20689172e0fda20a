//! Session data types.

use coze_protocol::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Name given to a session renamed to nothing.
pub const PLACEHOLDER_NAME: &str = "Untitled chat";

/// Assistant text shown in place of an answer that could not be fetched.
pub const REQUEST_FAILED_TEXT: &str =
    "Request failed. Please check the API key or network connection.";

fn is_false(value: &bool) -> bool {
    !*value
}

/// One entry of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Content is still streaming in.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pending: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            pending: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            pending: false,
        }
    }

    /// Empty assistant placeholder that the stream ingestor fills in.
    pub fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            pending: true,
        }
    }

    pub fn failure_notice() -> Self {
        Self::assistant(REQUEST_FAILED_TEXT)
    }

    pub fn is_failure_notice(&self) -> bool {
        self.role == Role::Assistant && !self.pending && self.content == REQUEST_FAILED_TEXT
    }

    /// Whether this message belongs in the history sent upstream.
    pub fn is_history(&self) -> bool {
        !self.pending && !self.is_failure_notice()
    }

    pub fn to_wire(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Entry of the session index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: String,
    pub name: String,
}

/// State changes reported to the front-end, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    SessionCreated { id: String },
    SessionSwitched { id: String },
    SessionRenamed { id: String, name: String },
    SessionDeleted { id: String },
    MessageAppended { index: usize },
    MessageUpdated { index: usize },
    MessageRemoved { index: usize },
    ScrollToBottom,
    Persisted { id: String },
    PersistFailed { error: String },
}
