//! Storage trait definitions.

use super::{StorageError, StorageResult};

/// Synchronous string-keyed, string-valued store.
///
/// Reads of a missing key return `Ok(None)`; deleting a missing key is not an
/// error. Values are opaque to the store.
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key` if present.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Keys name files, so they are limited to a portable character set.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("chatList").is_ok());
        assert!(validate_key("chat-list_2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../chats").is_err());
        assert!(validate_key("a/b").is_err());
    }
}
