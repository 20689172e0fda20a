//! Local filesystem storage implementation.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::traits::validate_key;
use super::{KvStore, StorageResult};

/// Stores each key as `<base>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader sees either the previous value or the new one, never a torn file.
#[derive(Debug, Clone)]
pub struct FileKv {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl FileKv {
    /// Create a new file store rooted at `base_path`. The directory is created
    /// on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(format!("{key}.json")))
    }

    fn ensure_base_dir(&self) -> StorageResult<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path)?;
        }
        Ok(())
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        self.ensure_base_dir()?;

        let tmp_path = self.base_path.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use tempfile::TempDir;

    fn setup() -> (FileKv, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileKv::new(temp_dir.path().join("data"));
        (storage, temp_dir)
    }

    #[test]
    fn test_set_and_get() {
        let (storage, _temp) = setup();

        storage.set("chatList", "[]").unwrap();
        assert_eq!(storage.get("chatList").unwrap().as_deref(), Some("[]"));
        assert!(storage.base_path().join("chatList.json").exists());
    }

    #[test]
    fn test_get_missing_key() {
        let (storage, _temp) = setup();
        assert_eq!(storage.get("chats").unwrap(), None);
    }

    #[test]
    fn test_overwrite_leaves_no_temp_file() {
        let (storage, _temp) = setup();

        storage.set("chats", "{\"a\":1}").unwrap();
        storage.set("chats", "{\"a\":2}").unwrap();
        assert_eq!(storage.get("chats").unwrap().as_deref(), Some("{\"a\":2}"));

        let leftovers: Vec<_> = fs::read_dir(storage.base_path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (storage, _temp) = setup();

        storage.set("chats", "{}").unwrap();
        storage.delete("chats").unwrap();
        assert_eq!(storage.get("chats").unwrap(), None);
        storage.delete("chats").unwrap();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let (storage, _temp) = setup();
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
