//! Key-value storage for persisted chat state.
//!
//! Provides a small synchronous string store with implementations for:
//! - Local filesystem storage (one JSON file per key)
//! - In-memory storage (tests and `--ephemeral` runs)

mod error;
mod local;
mod memory;
mod traits;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use local::FileKv;
pub use memory::MemoryKv;
pub use traits::KvStore;

/// Key holding the JSON-encoded session index.
pub const INDEX_KEY: &str = "chatList";
/// Key holding the JSON-encoded map of session id to transcript.
pub const TRANSCRIPTS_KEY: &str = "chats";

/// Storage configuration.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Files under a data directory.
    Local(PathBuf),
    /// Nothing survives the process.
    Memory,
}

/// Create storage based on configuration.
pub fn create_storage(config: StorageConfig) -> Arc<dyn KvStore> {
    match config {
        StorageConfig::Local(path) => Arc::new(FileKv::new(path)),
        StorageConfig::Memory => Arc::new(MemoryKv::new()),
    }
}
