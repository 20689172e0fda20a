//! Terminal chat client with persistent sessions.
//!
//! The [`session::SessionStore`] owns all conversation state. Answers stream in
//! from a relay through a [`transport::ChatTransport`] and are folded into a
//! pending message by the [`ingest`] module; two [`gate::DebounceGate`]s keep
//! storage writes and scroll nudges infrequent.

pub mod clock;
pub mod config;
pub mod gate;
pub mod ingest;
pub mod repl;
pub mod session;
pub mod storage;
pub mod transport;
