//! Chat provider (Coze) client module.
//!
//! Opens one streaming chat call per relay request and exposes it as typed events.

mod client;
mod error;
mod types;

pub use client::{ChatUpstream, CozeClient, UpstreamStream};
pub use error::{UpstreamError, UpstreamResult};
pub use types::{UpstreamEvent, event_names};
