//! Line-oriented terminal front-end over a [`SessionStore`].

use std::io::{self, Write};

use coze_protocol::Role;
use log::{trace, warn};

use crate::ingest::PendingTarget;
use crate::session::{SessionStore, StoreEvent};

pub const HELP: &str = "\
Commands:
  /new                    start a new session
  /list                   list sessions
  /switch <id>            open a session
  /rename <id> [name]     rename a session (blank resets the name)
  /delete <id>            delete a session
  /history                show or hide the session list after each answer
  /help                   show this help
  /quit                   save and exit
Anything else is sent as a message.";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    New,
    List,
    Switch(String),
    Rename { id: String, name: String },
    Delete(String),
    History,
    Help,
    Quit,
    Say(String),
    Usage(&'static str),
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "new" => Self::New,
            "list" | "ls" => Self::List,
            "switch" | "open" if !rest.is_empty() => Self::Switch(rest.to_string()),
            "switch" | "open" => Self::Usage("/switch <id>"),
            "rename" if !rest.is_empty() => {
                let (id, name) = match rest.split_once(char::is_whitespace) {
                    Some((id, name)) => (id, name.trim()),
                    None => (rest, ""),
                };
                Self::Rename {
                    id: id.to_string(),
                    name: name.to_string(),
                }
            }
            "rename" => Self::Usage("/rename <id> [name]"),
            "delete" | "rm" if !rest.is_empty() => Self::Delete(rest.to_string()),
            "delete" | "rm" => Self::Usage("/delete <id>"),
            "history" => Self::History,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Writes store events as terminal output.
pub struct Renderer<W: Write> {
    out: W,
    /// Index of the message being streamed and how many bytes of it are shown.
    streaming: Option<(usize, usize)>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            streaming: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Drain and print every pending event.
    pub fn render(&mut self, store: &mut SessionStore) -> io::Result<()> {
        for event in store.drain_events() {
            self.render_event(&event, store)?;
        }
        self.out.flush()
    }

    fn render_event(&mut self, event: &StoreEvent, store: &SessionStore) -> io::Result<()> {
        match event {
            StoreEvent::SessionCreated { id } => {
                let name = store.session_name(id).unwrap_or(id);
                writeln!(self.out, "-- {name} ({id})")?;
            }
            StoreEvent::SessionSwitched { id } => {
                let name = store.session_name(id).unwrap_or(id);
                writeln!(self.out, "-- {name} ({id})")?;
                for message in store.messages() {
                    writeln!(self.out, "{}> {}", role_label(message.role), message.content)?;
                }
            }
            StoreEvent::SessionRenamed { id, name } => {
                writeln!(self.out, "-- renamed {id} to {name}")?;
            }
            StoreEvent::SessionDeleted { id } => {
                writeln!(self.out, "-- deleted {id}")?;
            }
            StoreEvent::MessageAppended { index } => {
                let Some(message) = store.messages().get(*index) else {
                    return Ok(());
                };
                if message.pending {
                    write!(self.out, "{}> ", role_label(message.role))?;
                    self.streaming = Some((*index, 0));
                } else if message.role == Role::Assistant {
                    writeln!(self.out, "{}> {}", role_label(message.role), message.content)?;
                }
            }
            StoreEvent::MessageUpdated { index } => {
                let Some((streaming_index, shown)) = self.streaming else {
                    return Ok(());
                };
                if streaming_index != *index {
                    return Ok(());
                }
                let Some(message) = store.messages().get(*index) else {
                    return Ok(());
                };
                if let Some(fresh) = message.content.get(shown..) {
                    write!(self.out, "{fresh}")?;
                }
                if message.pending {
                    self.streaming = Some((*index, message.content.len()));
                } else {
                    writeln!(self.out)?;
                    self.streaming = None;
                }
            }
            StoreEvent::MessageRemoved { index } => {
                if matches!(self.streaming, Some((i, _)) if i == *index) {
                    writeln!(self.out, " [interrupted]")?;
                    self.streaming = None;
                }
            }
            StoreEvent::ScrollToBottom => trace!("scroll to bottom"),
            StoreEvent::Persisted { id } => trace!("persisted {id}"),
            StoreEvent::PersistFailed { error } => {
                writeln!(self.out, "!! could not save chats: {error}")?;
            }
        }
        Ok(())
    }

    pub fn session_list(&mut self, store: &SessionStore) -> io::Result<()> {
        if store.index().is_empty() {
            writeln!(self.out, "(no sessions)")?;
        }
        for entry in store.index() {
            let marker = if store.active_id() == Some(entry.id.as_str()) {
                '*'
            } else {
                ' '
            };
            writeln!(self.out, "{marker} {}  {}", entry.id, entry.name)?;
        }
        self.out.flush()
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn prompt(&mut self) -> io::Result<()> {
        write!(self.out, "you> ")?;
        self.out.flush()
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "bot",
    }
}

/// Pending target that renders after every change, so an answer appears
/// while it streams.
pub struct LiveView<'a, W: Write> {
    pub store: &'a mut SessionStore,
    pub renderer: &'a mut Renderer<W>,
}

impl<W: Write> LiveView<'_, W> {
    fn refresh(&mut self) {
        if let Err(e) = self.renderer.render(self.store) {
            warn!("failed to render output: {}", e);
        }
    }
}

impl<W: Write> PendingTarget for LiveView<'_, W> {
    fn update_pending(&mut self, content: &str) {
        self.store.update_pending(content);
        self.refresh();
    }

    fn finalize_pending(&mut self, content: &str) {
        self.store.finalize_pending(content);
        self.refresh();
    }

    fn discard_pending(&mut self) {
        self.store.discard_pending();
        self.refresh();
    }
}
