//! Chat sessions: data model, id allocation and the session store.

mod ids;
mod models;
mod store;

pub use ids::{ID_PREFIX, SessionIdGenerator, created_at, default_name};
pub use models::{Message, PLACEHOLDER_NAME, REQUEST_FAILED_TEXT, SessionEntry, StoreEvent};
pub use store::{SessionStore, StoreOptions, SubmitOutcome};
