//! Persistent key/value preferences.
//!
//! Values are stored JSON-encoded as strings, one namespace per origin, the
//! way a browser's local storage keeps them. Reads never fail: an absent key
//! or an unparsable value yields the caller's default. Write failures are
//! logged and swallowed.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::config_dir;
use crate::error::StorageError;

/// Backing storage for a [`PreferenceStore`].
pub trait PreferenceMedium: Send {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Bytes used by a set of entries, counted as key + value lengths.
fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

fn check_quota(entries: &BTreeMap<String, String>, quota: Option<usize>) -> Result<(), StorageError> {
    match quota {
        Some(limit) => {
            let needed = used_bytes(entries);
            if needed > limit {
                Err(StorageError::QuotaExceeded { limit, needed })
            } else {
                Ok(())
            }
        }
        None => Ok(()),
    }
}

/// One JSON file per origin, read once and written through on every change.
pub struct FileMedium {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl FileMedium {
    /// Open (or lazily create) the file at `path`. A corrupt file is logged
    /// and treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt preference file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Can't read preference file, starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries,
            quota: None,
        }
    }

    /// The preference file for `origin` under the platform config directory.
    pub fn for_origin(origin: &str) -> Self {
        Self::open(origin_path(&config_dir(), origin))
    }

    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota = Some(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to a temp file next to the target, then rename over it.
    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn commit(&mut self, entries: BTreeMap<String, String>) -> Result<(), StorageError> {
        check_quota(&entries, self.quota)?;
        self.persist(&entries)?;
        self.entries = entries;
        Ok(())
    }
}

/// `<dir>/prefs/<origin-slug>.json`, with every non-alphanumeric character
/// of the origin replaced by `_`.
pub fn origin_path(dir: &Path, origin: &str) -> PathBuf {
    let slug: String = origin
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    dir.join("prefs").join(format!("{slug}.json"))
}

impl PreferenceMedium for FileMedium {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.clone();
        entries.insert(key.to_string(), value);
        self.commit(entries)
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut entries = self.entries.clone();
        entries.remove(key);
        self.commit(entries)
    }
}

/// In-memory medium. Clones share the same entries, so a second store can
/// be opened on the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota = Some(limit);
        self
    }

    /// Store a raw string, bypassing JSON encoding.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl PreferenceMedium for MemoryMedium {
    fn get_item(&self, key: &str) -> Option<String> {
        self.raw(key)
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        check_quota(&next, self.quota)?;
        *entries = next;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Typed access to a [`PreferenceMedium`].
pub struct PreferenceStore {
    medium: Box<dyn PreferenceMedium>,
}

impl PreferenceStore {
    pub fn new(medium: impl PreferenceMedium + 'static) -> Self {
        Self {
            medium: Box::new(medium),
        }
    }

    /// The stored value for `key`, or `default` if it is absent or does not
    /// parse as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.medium.get_item(key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "Unparsable preference, using default");
                default
            }
        }
    }

    /// Store `value` under `key`. Failures are logged, never returned.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value) {
            tracing::warn!(key, error = %e, "Failed to save preference");
        }
    }

    pub fn try_set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.medium.set_item(key, raw)
    }

    pub fn remove(&mut self, key: &str) {
        if let Err(e) = self.medium.remove_item(key) {
            tracing::warn!(key, error = %e, "Failed to remove preference");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_default_when_absent() {
        let store = PreferenceStore::new(MemoryMedium::new());
        assert_eq!(store.get("missing", "light".to_string()), "light");
        assert_eq!(store.get("missing", 7u32), 7);
    }

    #[test]
    fn test_values_are_json_encoded() {
        let medium = MemoryMedium::new();
        let mut store = PreferenceStore::new(medium.clone());
        store.set("dapai_chat_nickname", "ann");
        assert_eq!(medium.raw("dapai_chat_nickname").as_deref(), Some("\"ann\""));
        assert_eq!(store.get("dapai_chat_nickname", String::new()), "ann");
    }

    #[test]
    fn test_shared_medium_is_visible_to_fresh_store() {
        let medium = MemoryMedium::new();
        PreferenceStore::new(medium.clone()).set("count", &3);
        let fresh = PreferenceStore::new(medium);
        assert_eq!(fresh.get("count", 0), 3);
    }

    #[test]
    fn test_corrupt_value_yields_default() {
        let medium = MemoryMedium::new();
        medium.insert_raw("dapai_chat_theme", "{not json");
        let store = PreferenceStore::new(medium);
        assert_eq!(store.get("dapai_chat_theme", "light".to_string()), "light");
    }

    #[test]
    fn test_quota_keeps_previous_value() {
        let medium = MemoryMedium::new().with_quota(32);
        let mut store = PreferenceStore::new(medium);
        store.set("k", "short");

        let err = store.try_set("k", &"x".repeat(64)).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 32, .. }));
        // set() swallows the same failure.
        store.set("k", &"x".repeat(64));
        assert_eq!(store.get("k", String::new()), "short");
    }

    #[test]
    fn test_remove() {
        let mut store = PreferenceStore::new(MemoryMedium::new());
        store.set("k", "v");
        store.remove("k");
        store.remove("never-set");
        assert_eq!(store.get("k", "gone".to_string()), "gone");
    }

    #[test]
    fn test_file_medium_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = origin_path(dir.path(), "http://localhost:5000");
        assert!(path.ends_with("prefs/http___localhost_5000.json"));

        let mut store = PreferenceStore::new(FileMedium::open(&path));
        store.set("dapai_chat_server", "http://10.0.0.5:5000");

        let reopened = PreferenceStore::new(FileMedium::open(&path));
        assert_eq!(
            reopened.get("dapai_chat_server", String::new()),
            "http://10.0.0.5:5000"
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_medium_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json at all").unwrap();

        let mut store = PreferenceStore::new(FileMedium::open(&path));
        assert_eq!(store.get("k", 1), 1);

        store.set("k", &2);
        let reopened = PreferenceStore::new(FileMedium::open(&path));
        assert_eq!(reopened.get("k", 1), 2);
    }

    #[test]
    fn test_file_medium_quota() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let mut store = PreferenceStore::new(FileMedium::open(&path).with_quota(16));
        store.set("a", "b");
        assert!(store.try_set("a", &"y".repeat(40)).is_err());

        let reopened = PreferenceStore::new(FileMedium::open(&path));
        assert_eq!(reopened.get("a", String::new()), "b");
    }
}
