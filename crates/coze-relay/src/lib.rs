//! Streaming relay between chat clients and the Coze chat API.
//!
//! A client posts a conversation to [`coze_protocol::CHAT_PATH`]; the relay
//! opens a streaming call upstream and writes back only the text deltas, in
//! order, as a chunked `text/plain` body.

pub mod api;
pub mod config;
pub mod relay;
pub mod upstream;
