//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;

use coze_protocol::{ChatMessage, ChatRequest};
use coze_relay::api::{self, AppState};
use coze_relay::relay::RelayLimits;
use coze_relay::upstream::{ChatUpstream, UpstreamError, UpstreamEvent, UpstreamResult, UpstreamStream};

/// One step of a scripted upstream answer.
#[derive(Debug, Clone)]
pub enum Script {
    Event(UpstreamEvent),
    Fail(String),
    Pause(Duration),
    /// Never produce another event.
    Hang,
}

pub fn delta(text: &str) -> Script {
    Script::Event(UpstreamEvent::delta(text))
}

/// Upstream that replays a fixed script for every call.
#[derive(Clone, Default)]
pub struct ScriptedUpstream {
    script: Vec<Script>,
    open_error: Option<String>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    dropped: Arc<AtomicBool>,
}

impl ScriptedUpstream {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Upstream whose call fails before any event.
    pub fn failing(message: &str) -> Self {
        Self {
            open_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Set once the last opened stream has been dropped.
    pub fn dropped_flag(&self) -> Arc<AtomicBool> {
        self.dropped.clone()
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatUpstream for ScriptedUpstream {
    async fn open_chat(&self, request: &ChatRequest) -> UpstreamResult<UpstreamStream> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = &self.open_error {
            return Err(UpstreamError::ApiError {
                message: message.clone(),
                code: "4000".to_string(),
            });
        }

        self.dropped.store(false, Ordering::SeqCst);
        let guard = DropFlag(self.dropped.clone());
        let steps = self.script.clone().into_iter();

        let stream = futures::stream::unfold((steps, guard), |(mut steps, guard)| async move {
            loop {
                match steps.next()? {
                    Script::Event(event) => return Some((Ok(event), (steps, guard))),
                    Script::Fail(message) => {
                        return Some((Err(UpstreamError::Protocol(message)), (steps, guard)));
                    }
                    Script::Pause(duration) => tokio::time::sleep(duration).await,
                    Script::Hang => futures::future::pending::<()>().await,
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Create a test application backed by `upstream`.
pub fn test_app(upstream: ScriptedUpstream) -> Router {
    test_app_with_limits(upstream, RelayLimits::default())
}

pub fn test_app_with_limits(upstream: ScriptedUpstream, limits: RelayLimits) -> Router {
    let state = AppState::new(Arc::new(upstream), limits);
    api::create_router(state)
}

pub fn chat_request(text: &str) -> ChatRequest {
    ChatRequest {
        bot_id: "bot-1".to_string(),
        user_id: "user-1".to_string(),
        additional_messages: vec![ChatMessage::user(text)],
    }
}
