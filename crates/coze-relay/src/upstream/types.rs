//! Typed view of the Coze chat event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use coze_protocol::ChatRequest;

use super::error::{UpstreamError, UpstreamResult};

/// SSE event names emitted by the Coze v3 chat API.
pub mod event_names {
    pub const CHAT_CREATED: &str = "conversation.chat.created";
    pub const CHAT_IN_PROGRESS: &str = "conversation.chat.in_progress";
    pub const CHAT_COMPLETED: &str = "conversation.chat.completed";
    pub const CHAT_FAILED: &str = "conversation.chat.failed";
    pub const CHAT_REQUIRES_ACTION: &str = "conversation.chat.requires_action";
    pub const MESSAGE_DELTA: &str = "conversation.message.delta";
    pub const MESSAGE_COMPLETED: &str = "conversation.message.completed";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";
}

/// One event observed on the upstream stream.
///
/// Only [`UpstreamEvent::MessageDelta`] carries text meant for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Chat created or in progress.
    ChatStatus { status: String },
    /// Incremental fragment of the assistant's answer.
    MessageDelta { content: String },
    /// A complete message (answer, follow-up suggestion, verbose info...).
    MessageCompleted,
    /// The chat turn finished.
    ChatCompleted,
    /// The chat turn failed on the provider side.
    ChatFailed { message: String },
    /// Stream-level error reported by the provider.
    Error { message: String },
    /// End-of-stream marker.
    Done,
    /// Anything this relay does not interpret.
    Other { name: String },
}

/// Message payload carried by `conversation.message.*` events.
#[derive(Debug, Clone, Default, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    content: String,
}

/// Chat payload carried by `conversation.chat.*` events.
#[derive(Debug, Clone, Default, Deserialize)]
struct ChatPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_error: Option<ErrorPayload>,
}

/// `{code, msg}` error shape used across the Coze API.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub msg: String,
}

impl ErrorPayload {
    pub(crate) fn code_string(&self) -> String {
        match &self.code {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn describe(&self, fallback: &str) -> String {
        if self.msg.is_empty() {
            fallback.to_string()
        } else {
            format!("{} (code: {})", self.msg, self.code_string())
        }
    }
}

impl UpstreamEvent {
    /// Interpret an SSE frame (`event:` name and `data:` payload).
    pub fn parse(name: &str, data: &str) -> UpstreamResult<Self> {
        use event_names::*;

        let event = match name {
            MESSAGE_DELTA => {
                let payload: MessagePayload =
                    serde_json::from_str(data).map_err(|e| UpstreamError::ParseError {
                        event: name.to_string(),
                        message: e.to_string(),
                    })?;
                UpstreamEvent::MessageDelta {
                    content: payload.content,
                }
            }
            MESSAGE_COMPLETED => UpstreamEvent::MessageCompleted,
            CHAT_CREATED | CHAT_IN_PROGRESS => {
                let payload: ChatPayload = serde_json::from_str(data).unwrap_or_default();
                UpstreamEvent::ChatStatus {
                    status: payload
                        .status
                        .unwrap_or_else(|| name.rsplit('.').next().unwrap_or(name).to_string()),
                }
            }
            CHAT_COMPLETED => UpstreamEvent::ChatCompleted,
            CHAT_FAILED => {
                let payload: ChatPayload = serde_json::from_str(data).unwrap_or_default();
                UpstreamEvent::ChatFailed {
                    message: payload
                        .last_error
                        .unwrap_or_default()
                        .describe("chat failed"),
                }
            }
            CHAT_REQUIRES_ACTION => UpstreamEvent::ChatFailed {
                message: "chat requires a tool action this relay cannot provide".to_string(),
            },
            ERROR => {
                let payload: ErrorPayload = serde_json::from_str(data).unwrap_or_default();
                UpstreamEvent::Error {
                    message: payload.describe(if data.is_empty() { "stream error" } else { data }),
                }
            }
            DONE => UpstreamEvent::Done,
            other => UpstreamEvent::Other {
                name: other.to_string(),
            },
        };
        Ok(event)
    }

    /// Shorthand used by tests and scripted upstreams.
    pub fn delta(content: impl Into<String>) -> Self {
        UpstreamEvent::MessageDelta {
            content: content.into(),
        }
    }

    /// Event name for logging.
    pub fn name(&self) -> &str {
        use event_names::*;

        match self {
            UpstreamEvent::ChatStatus { status } if status == "created" => CHAT_CREATED,
            UpstreamEvent::ChatStatus { .. } => CHAT_IN_PROGRESS,
            UpstreamEvent::MessageDelta { .. } => MESSAGE_DELTA,
            UpstreamEvent::MessageCompleted => MESSAGE_COMPLETED,
            UpstreamEvent::ChatCompleted => CHAT_COMPLETED,
            UpstreamEvent::ChatFailed { .. } => CHAT_FAILED,
            UpstreamEvent::Error { .. } => ERROR,
            UpstreamEvent::Done => DONE,
            UpstreamEvent::Other { name } => name,
        }
    }
}

/// Request body of `POST /v3/chat`.
#[derive(Debug, Serialize)]
pub(crate) struct CozeChatBody<'a> {
    #[serde(flatten)]
    pub request: &'a ChatRequest,
    pub stream: bool,
    pub auto_save_history: bool,
}
