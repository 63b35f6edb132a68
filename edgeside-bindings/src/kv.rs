//! In-process key-value namespaces.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A key-value namespace with optional per-entry expiry.
///
/// Values are raw bytes; [`get_text`](KvStore::get_text) and the JSON helpers
/// layer encodings on top. Clones share the same underlying map, which is how
/// one namespace is handed to every request handler at once. Expired entries
/// are dropped lazily the next time the key is touched.
#[derive(Clone, Debug, Default)]
pub struct KvStore {
    entries: Arc<RwLock<HashMap<String, KvEntry>>>,
}

#[derive(Debug)]
struct KvEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Errors decoding a stored value into a requested shape.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("value for `{key}` is not valid utf-8")]
    NotText {
        key: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("json value for `{key}` could not be converted: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl KvStore {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` with no expiry, replacing any previous
    /// entry.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.insert(key.into(), value.into(), None);
    }

    /// Stores `value` under `key`, expiring it `ttl` from now.
    pub fn put_with_ttl(&self, key: impl Into<String>, value: impl Into<Vec<u8>>, ttl: Duration) {
        self.insert(key.into(), value.into(), Some(Instant::now() + ttl));
    }

    /// Serializes `value` as JSON and stores it under `key`.
    pub fn put_json<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), KvError> {
        let key = key.into();
        let encoded = serde_json::to_vec(value).map_err(|source| KvError::Json {
            key: key.clone(),
            source,
        })?;
        self.insert(key, encoded, None);
        Ok(())
    }

    /// Returns the raw bytes stored under `key`, if present and unexpired.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = write_lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Returns the value under `key` decoded as UTF-8 text.
    pub fn get_text(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.get(key) {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|source| KvError::NotText {
                    key: key.to_owned(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Returns the value under `key` deserialized from JSON.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        match self.get(key) {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| KvError::Json {
                    key: key.to_owned(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Removes `key`, reporting whether a live entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = write_lock(&self.entries);
        match entries.remove(key) {
            Some(entry) => !entry.is_expired(Instant::now()),
            None => false,
        }
    }

    /// Lists live keys in sorted order, optionally restricted to a prefix.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        let now = Instant::now();
        let mut entries = write_lock(&self.entries);
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| prefix.is_none_or(|prefix| key.starts_with(prefix)))
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }

    fn insert(&self, key: String, value: Vec<u8>, expires_at: Option<Instant>) {
        write_lock(&self.entries).insert(key, KvEntry { value, expires_at });
    }
}

fn write_lock(
    entries: &RwLock<HashMap<String, KvEntry>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, KvEntry>> {
    entries.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = KvStore::new();
        store.put("bar", "baz");
        assert_eq!(store.get("bar"), Some(b"baz".to_vec()));
        assert_eq!(store.get_text("bar").expect("utf-8"), Some("baz".into()));
    }

    #[test]
    fn missing_key_is_none() {
        let store = KvStore::new();
        assert_eq!(store.get("nope"), None);
        assert!(!store.delete("nope"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let store = KvStore::new();
        store.put_with_ttl("short", "lived", Duration::from_millis(10));
        assert!(store.get("short").is_some());
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(store.get("short"), None);
        assert!(store.list(None).is_empty());
    }

    #[test]
    fn overwrite_replaces_value_and_ttl() {
        let store = KvStore::new();
        store.put_with_ttl("key", "old", Duration::from_millis(10));
        store.put("key", "new");
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(store.get_text("key").expect("utf-8"), Some("new".into()));
    }

    #[test]
    fn list_filters_by_prefix_and_sorts() {
        let store = KvStore::new();
        store.put("user:2", "b");
        store.put("user:1", "a");
        store.put("other", "c");
        assert_eq!(store.list(Some("user:")), vec!["user:1", "user:2"]);
        assert_eq!(store.list(None), vec!["other", "user:1", "user:2"]);
    }

    #[test]
    fn json_helpers_round_trip() {
        let store = KvStore::new();
        store
            .put_json("point", &serde_json::json!({ "x": 1, "y": 2 }))
            .expect("encode");
        let value: serde_json::Value = store.get_json("point").expect("decode").expect("present");
        assert_eq!(value["y"], 2);
    }

    #[test]
    fn non_utf8_value_errors_as_text() {
        let store = KvStore::new();
        store.put("blob", vec![0xff, 0xfe]);
        assert!(matches!(
            store.get_text("blob"),
            Err(KvError::NotText { .. })
        ));
    }
}
