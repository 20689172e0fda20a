//! Session id allocation.

use chrono::{DateTime, Utc};

/// Prefix of every generated session id.
pub const ID_PREFIX: &str = "chat-";

/// Issues `chat-<millis>` ids that never repeat within a process.
///
/// When the clock has not moved past the last issued value (same millisecond,
/// clock stepped back) the next value is `last + 1`. Ids already taken are
/// skipped.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    last: i64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now_millis: i64, is_taken: impl Fn(&str) -> bool) -> String {
        let mut candidate = now_millis.max(self.last + 1);
        loop {
            let id = format!("{ID_PREFIX}{candidate}");
            if !is_taken(&id) {
                self.last = candidate;
                return id;
            }
            candidate += 1;
        }
    }
}

/// Name a session gets until the user renames it.
pub fn default_name(id: &str) -> String {
    format!("Chat {}", id.strip_prefix(ID_PREFIX).unwrap_or(id))
}

/// Creation time encoded in a generated id.
pub fn created_at(id: &str) -> Option<DateTime<Utc>> {
    let millis = id.strip_prefix(ID_PREFIX)?.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}
