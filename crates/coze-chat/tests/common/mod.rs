//! Test utilities: a real relay on an ephemeral port behind a scripted upstream.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpListener;

use coze_chat::clock::ManualClock;
use coze_chat::session::{SessionStore, StoreOptions};
use coze_chat::storage::KvStore;
use coze_chat::transport::RelayClient;
use coze_protocol::ChatRequest;
use coze_relay::api::{self, AppState};
use coze_relay::relay::RelayLimits;
use coze_relay::upstream::{ChatUpstream, UpstreamError, UpstreamEvent, UpstreamResult, UpstreamStream};

/// One scripted upstream item.
#[derive(Debug, Clone)]
pub enum Script {
    Event(UpstreamEvent),
    Fail(String),
}

pub fn delta(text: &str) -> Script {
    Script::Event(UpstreamEvent::delta(text))
}

#[derive(Clone)]
struct ScriptedUpstream {
    script: Vec<Script>,
}

#[async_trait]
impl ChatUpstream for ScriptedUpstream {
    async fn open_chat(&self, _request: &ChatRequest) -> UpstreamResult<UpstreamStream> {
        let items: Vec<UpstreamResult<UpstreamEvent>> = self
            .script
            .iter()
            .cloned()
            .map(|step| match step {
                Script::Event(event) => Ok(event),
                Script::Fail(message) => Err(UpstreamError::Protocol(message)),
            })
            .collect();
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Start a relay answering every request with `script`; returns its base URL.
pub async fn spawn_relay(script: Vec<Script>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(Arc::new(ScriptedUpstream { script }), RelayLimits::default());
    let app = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

pub fn relay_client(base_url: &str) -> RelayClient {
    RelayClient::new(base_url, Duration::from_secs(5)).unwrap()
}

pub fn open_store(storage: Arc<dyn KvStore>) -> SessionStore {
    SessionStore::open(
        storage,
        Arc::new(ManualClock::default()),
        StoreOptions {
            bot_id: "bot-1".to_string(),
            stream_idle_timeout: Duration::from_secs(5),
            ..StoreOptions::default()
        },
    )
}
