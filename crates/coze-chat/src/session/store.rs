//! In-memory session state and its persisted mirror.
//!
//! Storage layout (two keys of a [`KvStore`]):
//! - `chatList`: JSON array of `{id, name}` in display order
//! - `chats`: JSON object mapping session id to its message array
//!
//! Structural changes (create, rename, delete, repair) write the index at once.
//! Message changes go through the save gate and are written after a quiet
//! period; the scroll gate coalesces scroll-into-view nudges the same way.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use tokio::time::Instant;

use coze_protocol::ChatRequest;

use crate::clock::Clock;
use crate::gate::DebounceGate;
use crate::ingest::{self, IngestError, PendingTarget};
use crate::storage::{INDEX_KEY, KvStore, StorageResult, TRANSCRIPTS_KEY};
use crate::transport::ChatTransport;

use super::ids::{SessionIdGenerator, default_name};
use super::models::{Message, PLACEHOLDER_NAME, SessionEntry, StoreEvent};

/// Tunables and identity for a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub bot_id: String,
    pub user_id: String,
    /// Most recent messages sent as context with each request.
    pub history_limit: usize,
    pub save_debounce: Duration,
    pub scroll_debounce: Duration,
    pub stream_idle_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            bot_id: String::new(),
            user_id: "user".to_string(),
            history_limit: 20,
            save_debounce: Duration::from_millis(1000),
            scroll_debounce: Duration::from_millis(50),
            stream_idle_timeout: Duration::from_secs(120),
        }
    }
}

/// How a submission ended.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank input, or a submission already streaming.
    Ignored,
    Answered(String),
    Failed(IngestError),
}

pub struct SessionStore {
    storage: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
    ids: SessionIdGenerator,
    index: Vec<SessionEntry>,
    active_id: Option<String>,
    messages: Vec<Message>,
    editing_id: Option<String>,
    active_menu_id: Option<String>,
    history_visible: bool,
    loading: bool,
    /// Holds the id of the session whose transcript awaits saving.
    save_gate: DebounceGate<String>,
    scroll_gate: DebounceGate<()>,
    events: Vec<StoreEvent>,
}

impl SessionStore {
    /// Open a store over `storage` and load the session index.
    pub fn open(storage: Arc<dyn KvStore>, clock: Arc<dyn Clock>, options: StoreOptions) -> Self {
        let save_gate = DebounceGate::new(options.save_debounce, clock.clone());
        let scroll_gate = DebounceGate::new(options.scroll_debounce, clock.clone());
        let mut store = Self {
            storage,
            clock,
            options,
            ids: SessionIdGenerator::new(),
            index: Vec::new(),
            active_id: None,
            messages: Vec::new(),
            editing_id: None,
            active_menu_id: None,
            history_visible: false,
            loading: false,
            save_gate,
            scroll_gate,
            events: Vec::new(),
        };
        store.load_session_index();
        store
    }

    // ---- accessors ----

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn index(&self) -> &[SessionEntry] {
        &self.index
    }

    pub fn session_name(&self, id: &str) -> Option<&str> {
        self.index
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.as_str())
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    pub fn active_menu_id(&self) -> Option<&str> {
        self.active_menu_id.as_deref()
    }

    pub fn history_visible(&self) -> bool {
        self.history_visible
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Events since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<StoreEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- session index ----

    /// Read the index; rebuild it from stored transcripts when it is missing.
    pub fn load_session_index(&mut self) {
        if let Some(index) = self.read_json::<Vec<SessionEntry>>(INDEX_KEY) {
            debug!("loaded {} session(s) from index", index.len());
            self.index = index;
            return;
        }

        let transcripts = self.read_transcripts();
        self.index = transcripts
            .keys()
            .map(|id| SessionEntry {
                id: id.clone(),
                name: default_name(id),
            })
            .collect();
        if !self.index.is_empty() {
            info!(
                "session index missing, rebuilt {} entr(ies) from transcripts",
                self.index.len()
            );
        }
    }

    /// Start a new, empty session and make it active. Returns its id.
    pub fn create_session(&mut self) -> String {
        self.flush_pending_save();

        let now = self.clock.epoch_millis();
        let index = &self.index;
        let id = self
            .ids
            .next(now, |candidate| index.iter().any(|entry| entry.id == candidate));

        self.active_id = Some(id.clone());
        self.messages.clear();
        self.index.push(SessionEntry {
            id: id.clone(),
            name: default_name(&id),
        });
        self.events.push(StoreEvent::SessionCreated { id: id.clone() });
        info!("created session {}", id);

        self.save_transcript();
        id
    }

    /// Make `id` the active session, loading its transcript.
    ///
    /// An id missing from the index is added to it. Blank ids are ignored.
    pub fn switch_session(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }

        // The transcript is reloaded below, so unsaved changes must land first.
        self.flush_pending_save();

        self.active_id = Some(id.to_string());
        self.messages = self.load_transcript(id);

        if !self.index.iter().any(|entry| entry.id == id) {
            info!("session {} missing from index, adding it", id);
            self.index.push(SessionEntry {
                id: id.to_string(),
                name: default_name(id),
            });
            // Index entries always have a stored transcript, even an empty one.
            self.save_transcript();
        }

        self.events.push(StoreEvent::SessionSwitched { id: id.to_string() });
        self.schedule_scroll();
    }

    /// Enter edit mode for `id`.
    pub fn begin_rename(&mut self, id: &str) {
        self.editing_id = Some(id.to_string());
    }

    /// Rename `id`. A blank name becomes [`PLACEHOLDER_NAME`].
    pub fn rename_session(&mut self, id: &str, proposed_name: &str) {
        let name = if proposed_name.trim().is_empty() {
            PLACEHOLDER_NAME.to_string()
        } else {
            proposed_name.to_string()
        };

        if let Some(entry) = self.index.iter_mut().find(|entry| entry.id == id) {
            entry.name = name.clone();
            self.events.push(StoreEvent::SessionRenamed {
                id: id.to_string(),
                name,
            });
            self.write_index();
        }
        self.editing_id = None;
    }

    /// Remove `id` and its transcript. Unknown ids only close the menu.
    pub fn delete_session(&mut self, id: &str) {
        if let Some(position) = self.index.iter().position(|entry| entry.id == id) {
            let is_active = self.active_id.as_deref() == Some(id);
            if is_active {
                // A late save would write the transcript back.
                self.save_gate.cancel();
            }

            self.index.remove(position);
            self.remove_transcript(id);
            self.write_index();

            if is_active {
                self.active_id = None;
                self.messages.clear();
            }
            if self.editing_id.as_deref() == Some(id) {
                self.editing_id = None;
            }
            self.events.push(StoreEvent::SessionDeleted { id: id.to_string() });
            info!("deleted session {}", id);
        }
        self.active_menu_id = None;
    }

    pub fn open_menu(&mut self, id: &str) {
        self.active_menu_id = Some(id.to_string());
    }

    pub fn close_menu(&mut self) {
        self.active_menu_id = None;
    }

    pub fn toggle_history(&mut self) -> bool {
        self.history_visible = !self.history_visible;
        self.history_visible
    }

    // ---- submission ----

    /// Send `text` and stream the answer into the active transcript.
    pub async fn submit_user_text(
        &mut self,
        text: &str,
        transport: &dyn ChatTransport,
    ) -> SubmitOutcome {
        let Some(request) = self.begin_submission(text) else {
            return SubmitOutcome::Ignored;
        };
        let idle_timeout = self.options.stream_idle_timeout;

        let result = match transport.open_stream(&request).await {
            Ok(stream) => ingest::drive(stream, self, idle_timeout).await,
            Err(e) => {
                self.discard_pending();
                Err(e.into())
            }
        };
        self.complete_submission(result)
    }

    /// Append the user message and a pending placeholder; returns the request
    /// to send, or `None` for blank input.
    ///
    /// Creates a session first when none is active.
    pub fn begin_submission(&mut self, text: &str) -> Option<ChatRequest> {
        if text.trim().is_empty() || self.loading {
            return None;
        }
        if self.active_id.is_none() {
            self.create_session();
        }

        self.push_message(Message::user(text));
        let request = self.build_request();
        self.push_message(Message::placeholder());
        self.loading = true;
        Some(request)
    }

    /// Record the end of a submission started with [`Self::begin_submission`].
    ///
    /// The ingestor has already finalized or discarded the placeholder; a
    /// failure additionally appends the fixed failure notice.
    pub fn complete_submission(&mut self, result: Result<String, IngestError>) -> SubmitOutcome {
        self.loading = false;
        match result {
            Ok(text) => SubmitOutcome::Answered(text),
            Err(e) => {
                warn!("chat request failed: {}", e);
                // Never leave a placeholder behind, whatever the caller did.
                if self.pending_index().is_some() {
                    self.discard_pending();
                }
                self.push_message(Message::failure_notice());
                SubmitOutcome::Failed(e)
            }
        }
    }

    fn build_request(&self) -> ChatRequest {
        let history: Vec<_> = self
            .messages
            .iter()
            .filter(|message| message.is_history())
            .collect();
        let skip = history.len().saturating_sub(self.options.history_limit.max(1));
        ChatRequest {
            bot_id: self.options.bot_id.clone(),
            user_id: self.options.user_id.clone(),
            additional_messages: history[skip..].iter().map(|m| m.to_wire()).collect(),
        }
    }

    fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.events.push(StoreEvent::MessageAppended {
            index: self.messages.len() - 1,
        });
        self.schedule_save();
        self.schedule_scroll();
    }

    fn pending_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|message| message.pending)
    }

    // ---- timers ----

    /// Earliest moment a gate wants to fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.save_gate.deadline(), self.scroll_gate.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run every gate action whose quiet period has passed.
    pub fn fire_due(&mut self) {
        if self.save_gate.take_due().is_some() {
            self.save_transcript();
        }
        if self.scroll_gate.take_due().is_some() {
            self.events.push(StoreEvent::ScrollToBottom);
        }
    }

    /// Run every pending gate action now.
    pub fn flush(&mut self) {
        self.flush_pending_save();
        if self.scroll_gate.flush().is_some() {
            self.events.push(StoreEvent::ScrollToBottom);
        }
    }

    fn schedule_save(&mut self) {
        let Some(id) = self.active_id.clone() else {
            return;
        };
        if self.save_gate.schedule(id).is_some() {
            self.save_transcript();
        }
    }

    fn schedule_scroll(&mut self) {
        if self.scroll_gate.schedule(()).is_some() {
            self.events.push(StoreEvent::ScrollToBottom);
        }
    }

    fn flush_pending_save(&mut self) {
        if self.save_gate.flush().is_some() {
            self.save_transcript();
        }
    }

    // ---- persistence ----

    /// Write the active transcript and the index. No-op without an active
    /// session.
    fn save_transcript(&mut self) {
        let Some(id) = self.active_id.clone() else {
            return;
        };

        let result = serde_json::to_value(&self.messages)
            .map_err(|e| e.to_string())
            .and_then(|messages| {
                let mut transcripts = self.read_transcripts();
                transcripts.insert(id.clone(), messages);
                self.write_json(TRANSCRIPTS_KEY, &transcripts)
                    .and_then(|()| self.write_json(INDEX_KEY, &self.index))
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => {
                debug!("saved {} message(s) for {}", self.messages.len(), id);
                self.events.push(StoreEvent::Persisted { id });
            }
            Err(e) => self.persist_failed(e),
        }
    }

    fn write_index(&mut self) {
        if let Err(e) = self.write_json(INDEX_KEY, &self.index) {
            self.persist_failed(e.to_string());
        }
    }

    fn remove_transcript(&mut self, id: &str) {
        let mut transcripts = self.read_transcripts();
        if transcripts.remove(id).is_none() {
            return;
        }
        if let Err(e) = self.write_json(TRANSCRIPTS_KEY, &transcripts) {
            self.persist_failed(e.to_string());
        }
    }

    fn persist_failed(&mut self, error: String) {
        error!("failed to persist chat state: {}", error);
        self.events.push(StoreEvent::PersistFailed { error });
    }

    /// Transcript of `id`; stale placeholders from an interrupted stream are
    /// dropped.
    fn load_transcript(&self, id: &str) -> Vec<Message> {
        let Some(value) = self.read_transcripts().remove(id) else {
            return Vec::new();
        };
        match serde_json::from_value::<Vec<Message>>(value) {
            Ok(mut messages) => {
                messages.retain(|message| !message.pending);
                messages
            }
            Err(e) => {
                warn!("transcript for {} is unreadable, starting empty: {}", id, e);
                Vec::new()
            }
        }
    }

    /// All stored transcripts, kept as raw JSON so one bad entry does not
    /// cost the others.
    fn read_transcripts(&self) -> Map<String, Value> {
        self.read_json::<Map<String, Value>>(TRANSCRIPTS_KEY)
            .unwrap_or_default()
    }

    /// Parsed value under `key`; missing, unreadable and corrupt all read as
    /// `None`.
    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("reading {} failed, treating as empty: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{} is corrupt, treating as empty: {}", key, e);
                None
            }
        }
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| crate::storage::StorageError::Backend(e.to_string()))?;
        self.storage.set(key, &raw)
    }
}

impl PendingTarget for SessionStore {
    fn update_pending(&mut self, content: &str) {
        let Some(index) = self.pending_index() else {
            return;
        };
        self.messages[index].content = content.to_string();
        self.events.push(StoreEvent::MessageUpdated { index });
        self.schedule_save();
        self.schedule_scroll();
        self.fire_due();
    }

    fn finalize_pending(&mut self, content: &str) {
        let Some(index) = self.pending_index() else {
            return;
        };
        let message = &mut self.messages[index];
        message.content = content.to_string();
        message.pending = false;
        self.events.push(StoreEvent::MessageUpdated { index });
        self.schedule_save();
        self.schedule_scroll();
    }

    fn discard_pending(&mut self) {
        let Some(index) = self.pending_index() else {
            return;
        };
        self.messages.remove(index);
        self.events.push(StoreEvent::MessageRemoved { index });
        self.schedule_save();
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("active_id", &self.active_id)
            .field("sessions", &self.index.len())
            .field("messages", &self.messages.len())
            .field("loading", &self.loading)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::models::REQUEST_FAILED_TEXT;
    use crate::storage::MemoryKv;
    use crate::transport::{ByteStream, TransportError, TransportResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use coze_protocol::Role;
    use futures::StreamExt;
    use std::sync::Mutex;

    fn open_store() -> (SessionStore, MemoryKv, ManualClock) {
        let kv = MemoryKv::new();
        let clock = ManualClock::default();
        let store = reopen(&kv, &clock);
        (store, kv, clock)
    }

    fn reopen(kv: &MemoryKv, clock: &ManualClock) -> SessionStore {
        SessionStore::open(
            Arc::new(kv.clone()),
            Arc::new(clock.clone()),
            StoreOptions {
                bot_id: "bot".to_string(),
                ..StoreOptions::default()
            },
        )
    }

    /// Transport answering every request with fixed chunks, optionally
    /// followed by an error.
    struct FakeTransport {
        chunks: Vec<&'static str>,
        fail_after: bool,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeTransport {
        fn answering(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                fail_after: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_after(chunks: Vec<&'static str>) -> Self {
            Self {
                fail_after: true,
                ..Self::answering(chunks)
            }
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn open_stream(&self, request: &ChatRequest) -> TransportResult<ByteStream> {
            self.requests.lock().unwrap().push(request.clone());
            let mut items: Vec<TransportResult<Bytes>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            if self.fail_after {
                items.push(Err(TransportError::Status {
                    status: 500,
                    message: "boom".to_string(),
                }));
            }
            Ok(futures::stream::iter(items).boxed())
        }
    }

    #[test]
    fn test_create_session_adds_index_entry_and_clears_transcript() {
        let (mut store, kv, _clock) = open_store();
        let before = store.index().len();

        let id = store.create_session();

        assert_eq!(store.index().len(), before + 1);
        assert!(store.messages().is_empty());
        assert_eq!(store.active_id(), Some(id.as_str()));
        assert!(id.starts_with("chat-"));
        assert!(kv.get(INDEX_KEY).unwrap().unwrap().contains(&id));
        assert!(store.drain_events().contains(&StoreEvent::SessionCreated { id }));
    }

    #[test]
    fn test_create_twice_in_same_millisecond_gives_distinct_ids() {
        let (mut store, _kv, _clock) = open_store();
        let a = store.create_session();
        let b = store.create_session();
        assert_ne!(a, b);
        assert_eq!(store.index().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_submission_is_noop() {
        let (mut store, _kv, _clock) = open_store();
        let transport = FakeTransport::answering(vec!["unused"]);

        for text in ["", "   ", "\n\t"] {
            assert!(matches!(
                store.submit_user_text(text, &transport).await,
                SubmitOutcome::Ignored
            ));
        }
        assert!(store.messages().is_empty());
        assert!(store.active_id().is_none());
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submission_streams_into_placeholder() {
        let (mut store, _kv, _clock) = open_store();
        let transport = FakeTransport::answering(vec!["Hel", "lo"]);

        let outcome = store.submit_user_text("hi", &transport).await;

        assert!(matches!(outcome, SubmitOutcome::Answered(ref t) if t == "Hello"));
        assert!(store.active_id().is_some());
        assert_eq!(
            store.messages(),
            &[Message::user("hi"), Message::assistant("Hello")]
        );
        assert!(!store.is_loading());

        let events = store.drain_events();
        let updates = events
            .iter()
            .filter(|e| matches!(e, StoreEvent::MessageUpdated { index: 1 }))
            .count();
        assert_eq!(updates, 3, "one per chunk plus finalization");
    }

    #[tokio::test]
    async fn test_failed_submission_replaces_placeholder_with_notice() {
        let (mut store, _kv, _clock) = open_store();
        let transport = FakeTransport::failing_after(vec!["partial"]);

        let outcome = store.submit_user_text("hi", &transport).await;

        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.messages()[1].content, REQUEST_FAILED_TEXT);
        assert!(store.messages().iter().all(|m| !m.pending));
        assert!(store
            .drain_events()
            .contains(&StoreEvent::MessageRemoved { index: 1 }));
    }

    #[tokio::test]
    async fn test_interrupted_answer_leaves_no_placeholder() {
        let (mut store, kv, _clock) = open_store();
        store.begin_submission("tell me a story").unwrap();
        let stream = futures::stream::iter(vec![Ok(Bytes::from_static(b"Once"))])
            .chain(futures::stream::pending());

        let result = ingest::drive_until(
            stream,
            &mut store,
            Duration::from_secs(120),
            futures::future::ready(()),
        )
        .await;
        let outcome = store.complete_submission(result);
        store.flush();

        assert!(matches!(
            outcome,
            SubmitOutcome::Failed(IngestError::Interrupted)
        ));
        assert!(!store.is_loading());
        assert!(store.messages().iter().all(|m| !m.pending));
        assert_eq!(store.messages()[1].content, REQUEST_FAILED_TEXT);
        assert!(!kv.get(TRANSCRIPTS_KEY).unwrap().unwrap().contains("\"pending\""));
    }

    #[tokio::test]
    async fn test_request_carries_history_without_notices() {
        let (mut store, _kv, _clock) = open_store();
        store
            .submit_user_text("one", &FakeTransport::failing_after(vec![]))
            .await;

        let transport = FakeTransport::answering(vec!["ok"]);
        store.submit_user_text("two", &transport).await;

        let requests = transport.requests.lock().unwrap();
        let sent: Vec<_> = requests[0]
            .additional_messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(sent, vec![(Role::User, "one"), (Role::User, "two")]);
        assert_eq!(requests[0].bot_id, "bot");
    }

    #[test]
    fn test_history_limit_keeps_newest() {
        let kv = MemoryKv::new();
        let mut store = SessionStore::open(
            Arc::new(kv),
            Arc::new(ManualClock::default()),
            StoreOptions {
                history_limit: 2,
                ..StoreOptions::default()
            },
        );
        store.create_session();
        store.messages.push(Message::user("a"));
        store.messages.push(Message::assistant("b"));

        let request = store.begin_submission("c").unwrap();
        let contents: Vec<_> = request
            .additional_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_round_trip_through_restart() {
        let (mut store, kv, clock) = open_store();
        store
            .submit_user_text("hi", &FakeTransport::answering(vec!["Hello"]))
            .await;
        let id = store.active_id().unwrap().to_string();
        let saved = store.messages().to_vec();
        store.flush();

        let mut restarted = reopen(&kv, &clock);
        assert!(restarted.active_id().is_none());
        assert_eq!(restarted.index().len(), 1);

        restarted.switch_session(&id);
        assert_eq!(restarted.messages(), saved.as_slice());
    }

    #[test]
    fn test_message_saves_are_debounced() {
        let (mut store, kv, clock) = open_store();
        store.create_session();
        store.drain_events();

        store.push_message(Message::user("a"));
        clock.advance_millis(500);
        store.push_message(Message::user("b"));
        clock.advance_millis(999);
        store.fire_due();
        assert!(!kv.get(TRANSCRIPTS_KEY).unwrap().unwrap().contains("\"b\""));

        clock.advance_millis(1);
        store.fire_due();
        let stored = kv.get(TRANSCRIPTS_KEY).unwrap().unwrap();
        assert!(stored.contains("\"a\"") && stored.contains("\"b\""));

        let persisted = store
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, StoreEvent::Persisted { .. }))
            .count();
        assert_eq!(persisted, 1);
    }

    #[test]
    fn test_scroll_gate_fires_before_save_gate() {
        let (mut store, _kv, clock) = open_store();
        store.create_session();
        store.push_message(Message::user("a"));
        store.drain_events();

        clock.advance_millis(50);
        store.fire_due();
        assert_eq!(store.drain_events(), vec![StoreEvent::ScrollToBottom]);
        assert!(store.next_deadline().is_some());
    }

    #[test]
    fn test_switch_flushes_outgoing_transcript() {
        let (mut store, kv, _clock) = open_store();
        let first = store.create_session();
        store.push_message(Message::user("unsaved"));
        let second = store.create_session();

        store.switch_session(&first);
        assert_eq!(store.messages(), &[Message::user("unsaved")]);
        assert!(kv.get(TRANSCRIPTS_KEY).unwrap().unwrap().contains("unsaved"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_switch_to_unknown_id_repairs_index() {
        let (mut store, _kv, _clock) = open_store();
        store.switch_session("chat-999");

        assert_eq!(store.active_id(), Some("chat-999"));
        assert!(store.messages().is_empty());
        assert_eq!(store.session_name("chat-999"), Some("Chat 999"));
    }

    #[test]
    fn test_repaired_session_keeps_a_stored_transcript() {
        let (mut store, kv, clock) = open_store();
        store.switch_session("chat-42");
        clock.advance_millis(10);
        store.create_session();
        store.flush();

        let index: Vec<SessionEntry> =
            serde_json::from_str(&kv.get(INDEX_KEY).unwrap().unwrap()).unwrap();
        let chats: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&kv.get(TRANSCRIPTS_KEY).unwrap().unwrap()).unwrap();
        assert!(index.iter().any(|entry| entry.id == "chat-42"));
        assert_eq!(chats.get("chat-42"), Some(&serde_json::json!([])));

        let reopened = reopen(&kv, &clock);
        assert!(reopened.session_name("chat-42").is_some());
    }

    #[test]
    fn test_switch_after_delete_restores_both_entries() {
        let (mut store, kv, _clock) = open_store();
        let id = store.create_session();
        store.delete_session(&id);
        store.switch_session(&id);
        store.create_session();

        let chats = kv.get(TRANSCRIPTS_KEY).unwrap().unwrap();
        assert!(chats.contains(&id));
    }

    #[test]
    fn test_switch_with_blank_id_is_noop() {
        let (mut store, _kv, _clock) = open_store();
        let id = store.create_session();
        store.switch_session("  ");
        assert_eq!(store.active_id(), Some(id.as_str()));
    }

    #[test]
    fn test_rename_blank_uses_placeholder() {
        let (mut store, kv, _clock) = open_store();
        let id = store.create_session();
        store.begin_rename(&id);
        assert_eq!(store.editing_id(), Some(id.as_str()));

        store.rename_session(&id, "   ");
        assert_eq!(store.session_name(&id), Some(PLACEHOLDER_NAME));
        assert!(store.editing_id().is_none());
        assert!(kv.get(INDEX_KEY).unwrap().unwrap().contains(PLACEHOLDER_NAME));

        store.rename_session(&id, "Trip plans");
        assert_eq!(store.session_name(&id), Some("Trip plans"));
    }

    #[test]
    fn test_delete_then_switch_yields_empty_transcript() {
        let (mut store, _kv, _clock) = open_store();
        let id = store.create_session();
        store.push_message(Message::user("hello"));
        store.flush();

        store.delete_session(&id);
        assert!(store.active_id().is_none());
        assert!(store.messages().is_empty());
        assert!(store.index().is_empty());

        store.switch_session(&id);
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_delete_active_cancels_pending_save() {
        let (mut store, kv, clock) = open_store();
        let id = store.create_session();
        store.push_message(Message::user("doomed"));

        store.delete_session(&id);
        clock.advance_millis(5_000);
        store.fire_due();
        store.flush();

        let transcripts = kv.get(TRANSCRIPTS_KEY).unwrap().unwrap_or_default();
        assert!(!transcripts.contains(&id));
        assert!(!kv.get(INDEX_KEY).unwrap().unwrap().contains(&id));
    }

    #[test]
    fn test_delete_unknown_only_closes_menu() {
        let (mut store, _kv, _clock) = open_store();
        let id = store.create_session();
        store.open_menu(&id);
        store.drain_events();

        store.delete_session("chat-missing");
        assert!(store.active_menu_id().is_none());
        assert_eq!(store.index().len(), 1);
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn test_missing_index_is_rebuilt_from_transcripts() {
        let kv = MemoryKv::new();
        kv.set(
            TRANSCRIPTS_KEY,
            r#"{"chat-1":[{"role":"user","content":"a"}],"chat-2":[]}"#,
        )
        .unwrap();

        let store = reopen(&kv, &ManualClock::default());
        let ids: Vec<_> = store.index().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["chat-1", "chat-2"]);
        assert_eq!(store.session_name("chat-1"), Some("Chat 1"));
    }

    #[test]
    fn test_corrupt_blobs_load_as_empty() {
        let kv = MemoryKv::new();
        kv.set(INDEX_KEY, "{not json").unwrap();
        kv.set(TRANSCRIPTS_KEY, "[1,2").unwrap();

        let mut store = reopen(&kv, &ManualClock::default());
        assert!(store.index().is_empty());

        store.switch_session("chat-1");
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_stale_pending_dropped_on_load() {
        let kv = MemoryKv::new();
        kv.set(
            TRANSCRIPTS_KEY,
            r#"{"chat-1":[{"role":"user","content":"q"},{"role":"ai","content":"half","pending":true}]}"#,
        )
        .unwrap();

        let mut store = reopen(&kv, &ManualClock::default());
        store.switch_session("chat-1");
        assert_eq!(store.messages(), &[Message::user("q")]);
    }

    #[test]
    fn test_toggle_history_and_menu() {
        let (mut store, _kv, _clock) = open_store();
        assert!(!store.history_visible());
        assert!(store.toggle_history());
        assert!(!store.toggle_history());

        store.open_menu("chat-1");
        assert_eq!(store.active_menu_id(), Some("chat-1"));
        store.close_menu();
        assert!(store.active_menu_id().is_none());
    }
}
