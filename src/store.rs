use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::models::{KeyValue, KeyValueSuccess};
use crate::sessions::Session;

/// A stored value together with its lock state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub value: String,
    pub locked: bool,
    /// Session that last acquired the key. Kept after release so the
    /// releasing session can keep writing until someone else acquires.
    pub owner: Option<String>,
}

impl KeyEntry {
    pub(crate) fn unlocked(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            locked: false,
            owner: None,
        }
    }
}

/// Keys and sessions share one lock so lock state and ownership always move together.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) entries: HashMap<String, KeyEntry>,
    pub(crate) sessions: HashMap<String, Session>,
}

impl State {
    /// True when `session_id` is live, was created for `key` and is still the key's owner.
    pub(crate) fn owns(&self, key: &str, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        let live = self
            .sessions
            .get(session_id)
            .is_some_and(|session| session.owned_key == key);
        live && self
            .entries
            .get(key)
            .is_some_and(|entry| entry.owner.as_deref() == Some(session_id))
    }
}

#[derive(Clone)]
pub struct KvStore {
    pub(crate) state: Arc<RwLock<State>>,
    pub(crate) metrics: Arc<Metrics>,
}

impl KvStore {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            metrics,
        }
    }

    /// Locks `key` for a new session leased for `ttl`.
    ///
    /// An unseen key is created with `value` first; the value of an existing
    /// key is left alone. Returns the new session id, or `None` when the key
    /// is already locked. No session id is allocated on failure.
    pub fn acquire(&self, key: &str, value: &str, ttl: Duration) -> Option<String> {
        let mut state = self.state.write();

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| KeyEntry::unlocked(value));
        if entry.locked {
            debug!("Acquire rejected, key already locked: {}", key);
            return None;
        }

        let session_id = Uuid::new_v4().to_string();
        entry.locked = true;
        entry.owner = Some(session_id.clone());
        self.register_session(&mut state, session_id.clone(), key, ttl);

        self.metrics.record_store_operation("acquire");
        info!("Key acquired: {} by session {} (lease {:?})", key, session_id, ttl);
        Some(session_id)
    }

    /// Unlocks `key` if `session_id` owns it. The session and its lease keep running.
    pub fn release(&self, key: &str, session_id: &str) -> bool {
        let mut state = self.state.write();

        if !state.owns(key, session_id) {
            debug!("Release rejected: {} is not owned by session {:?}", key, session_id);
            return false;
        }
        if let Some(entry) = state.entries.get_mut(key) {
            entry.locked = false;
        }

        self.metrics.record_store_operation("release");
        info!("Key released: {} by session {}", key, session_id);
        true
    }

    /// Writes a single value.
    ///
    /// With a session id the session must own `key`. Without one, only a key
    /// that does not exist yet can be written.
    pub fn set(&self, key: &str, value: &str, session_id: &str) -> bool {
        let mut state = self.state.write();

        if !session_id.is_empty() {
            if !state.owns(key, session_id) {
                return false;
            }
            if let Some(entry) = state.entries.get_mut(key) {
                entry.value = value.to_string();
            }
            return true;
        }

        if state.entries.contains_key(key) {
            return false;
        }
        state.entries.insert(key.to_string(), KeyEntry::unlocked(value));
        true
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.read().entries.get(key).map(|entry| entry.value.clone())
    }

    /// Looks up every key against one snapshot, preserving request order.
    pub fn get_many(&self, keys: &[String]) -> Vec<KeyValueSuccess> {
        let state = self.state.read();
        keys.iter()
            .map(|key| {
                let found = state.entries.get(key);
                KeyValueSuccess {
                    entry: KeyValue {
                        key: key.clone(),
                        value: found.map(|entry| entry.value.clone()).unwrap_or_default(),
                    },
                    success: found.is_some(),
                }
            })
            .collect()
    }

    /// Writes a batch of values, all or nothing.
    ///
    /// The batch is rejected if any existing locked key is not owned by
    /// `session_id`. Lock state of existing keys is preserved; new keys are
    /// created unlocked.
    pub fn set_many(&self, entries: &[KeyValue], session_id: &str) -> bool {
        let mut state = self.state.write();

        let blocked = entries.iter().find(|kv| {
            state
                .entries
                .get(&kv.key)
                .is_some_and(|entry| entry.locked && !state.owns(&kv.key, session_id))
        });
        if let Some(kv) = blocked {
            debug!("Batch write rejected: {} is locked by another session", kv.key);
            return false;
        }

        for kv in entries {
            state
                .entries
                .entry(kv.key.clone())
                .and_modify(|entry| entry.value = kv.value.clone())
                .or_insert_with(|| KeyEntry::unlocked(kv.value.clone()));
        }
        true
    }

    /// Sorted snapshot of the keys starting with `prefix` (all keys when empty).
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        let state = self.state.read();
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    pub(crate) fn entry(&self, key: &str) -> Option<KeyEntry> {
        self.state.read().entries.get(key).cloned()
    }

    pub fn key_count(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(60);

    pub(crate) fn new_store() -> KvStore {
        KvStore::new(Metrics::new())
    }

    /// Every locked key must be owned by a live session created for that key.
    pub(crate) fn assert_invariants(store: &KvStore) {
        let state = store.state.read();
        for (key, entry) in &state.entries {
            if entry.locked {
                let owner = entry.owner.as_deref().expect("locked entry without owner");
                let session = state.sessions.get(owner).expect("owner session missing");
                assert_eq!(&session.owned_key, key);
            }
        }
    }

    #[tokio::test]
    async fn test_acquire_new_key() {
        let store = new_store();

        let session_id = store.acquire("a", "v1", LEASE).unwrap();
        let entry = store.entry("a").unwrap();
        assert_eq!(entry.value, "v1");
        assert!(entry.locked);
        assert_eq!(entry.owner.as_deref(), Some(session_id.as_str()));
        assert_eq!(store.session_count(), 1);
        assert_invariants(&store);
    }

    #[tokio::test]
    async fn test_acquire_locked_key_changes_nothing() {
        let store = new_store();
        let session_id = store.acquire("a", "v1", LEASE).unwrap();
        let before = store.entry("a").unwrap();

        assert!(store.acquire("a", "v2", LEASE).is_none());

        assert_eq!(store.entry("a").unwrap(), before);
        assert_eq!(store.session_count(), 1);
        assert!(store.state.read().sessions.contains_key(&session_id));
    }

    #[tokio::test]
    async fn test_acquire_existing_unlocked_key_keeps_value() {
        let store = new_store();
        assert!(store.set("a", "original", ""));

        let session_id = store.acquire("a", "ignored", LEASE).unwrap();
        let entry = store.entry("a").unwrap();
        assert_eq!(entry.value, "original");
        assert_eq!(entry.owner, Some(session_id));
    }

    #[tokio::test]
    async fn test_release_by_owner_keeps_session() {
        let store = new_store();
        let session_id = store.acquire("a", "v1", LEASE).unwrap();

        assert!(store.release("a", &session_id));
        assert!(!store.entry("a").unwrap().locked);
        assert_eq!(store.session_count(), 1);
        assert_invariants(&store);
    }

    #[tokio::test]
    async fn test_release_by_non_owner_is_rejected() {
        let store = new_store();
        let owner = store.acquire("a", "v1", LEASE).unwrap();
        let other = store.acquire("b", "v1", LEASE).unwrap();

        assert!(!store.release("a", &other));
        assert!(!store.release("a", "no-such-session"));
        assert!(!store.release("a", ""));
        assert!(!store.release("missing", &owner));

        assert!(store.entry("a").unwrap().locked);
    }

    #[tokio::test]
    async fn test_reacquire_after_release_gets_new_session() {
        let store = new_store();
        let first = store.acquire("a", "v1", LEASE).unwrap();
        assert!(store.release("a", &first));

        let second = store.acquire("a", "v2", LEASE).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.entry("a").unwrap().value, "v1");

        // The stale session owns nothing any more.
        assert!(!store.release("a", &first));
        assert!(!store.set("a", "stale", &first));
        assert!(store.entry("a").unwrap().locked);
        assert_invariants(&store);
    }

    #[tokio::test]
    async fn test_set_with_session() {
        let store = new_store();
        let session_id = store.acquire("a", "v1", LEASE).unwrap();

        assert!(store.set("a", "v2", &session_id));
        assert_eq!(store.get("a").as_deref(), Some("v2"));

        assert!(!store.set("a", "v3", "bogus"));
        assert!(!store.set("other", "v3", &session_id));
        assert_eq!(store.get("a").as_deref(), Some("v2"));
        assert!(store.get("other").is_none());
    }

    #[tokio::test]
    async fn test_owner_can_still_write_after_release() {
        let store = new_store();
        let session_id = store.acquire("a", "v1", LEASE).unwrap();
        assert!(store.release("a", &session_id));

        assert!(store.set("a", "v2", &session_id));
        assert_eq!(store.get("a").as_deref(), Some("v2"));
    }

    #[test]
    fn test_set_without_session_is_first_writer_wins() {
        let store = new_store();

        assert!(store.set("a", "first", ""));
        assert!(!store.set("a", "second", ""));
        assert_eq!(store.get("a").as_deref(), Some("first"));
        assert!(!store.entry("a").unwrap().locked);
    }

    #[tokio::test]
    async fn test_get_ignores_lock_state() {
        let store = new_store();
        store.acquire("a", "v1", LEASE).unwrap();

        assert_eq!(store.get("a").as_deref(), Some("v1"));
        assert!(store.get("b").is_none());
    }

    #[test]
    fn test_get_many_preserves_order() {
        let store = new_store();
        store.set("a", "1", "");
        store.set("c", "3", "");

        let keys = vec!["c".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        let results = store.get_many(&keys);

        let summary: Vec<(&str, bool, &str)> = results
            .iter()
            .map(|r| (r.entry.key.as_str(), r.success, r.entry.value.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("c", true, "3"), ("b", false, ""), ("a", true, "1"), ("c", true, "3")]
        );
    }

    #[tokio::test]
    async fn test_set_many_is_atomic() {
        let store = new_store();
        store.set("free", "0", "");
        let _locked_by_other = store.acquire("locked", "0", LEASE).unwrap();
        let mine = store.acquire("mine", "0", LEASE).unwrap();

        let batch = vec![
            KeyValue { key: "free".to_string(), value: "1".to_string() },
            KeyValue { key: "new".to_string(), value: "1".to_string() },
            KeyValue { key: "mine".to_string(), value: "1".to_string() },
            KeyValue { key: "locked".to_string(), value: "1".to_string() },
        ];
        assert!(!store.set_many(&batch, &mine));
        assert!(!store.set_many(&batch, ""));

        assert_eq!(store.get("free").as_deref(), Some("0"));
        assert_eq!(store.get("mine").as_deref(), Some("0"));
        assert_eq!(store.get("locked").as_deref(), Some("0"));
        assert!(store.get("new").is_none());
    }

    #[tokio::test]
    async fn test_set_many_with_owned_locks() {
        let store = new_store();
        store.set("free", "0", "");
        let mine = store.acquire("mine", "0", LEASE).unwrap();

        let batch = vec![
            KeyValue { key: "free".to_string(), value: "1".to_string() },
            KeyValue { key: "new".to_string(), value: "1".to_string() },
            KeyValue { key: "mine".to_string(), value: "1".to_string() },
        ];
        assert!(store.set_many(&batch, &mine));

        assert_eq!(store.get("free").as_deref(), Some("1"));
        assert_eq!(store.get("new").as_deref(), Some("1"));
        let owned = store.entry("mine").unwrap();
        assert_eq!(owned.value, "1");
        assert!(owned.locked, "batch writes must not drop an existing lock");
        assert!(!store.entry("new").unwrap().locked);
        assert_invariants(&store);
    }

    #[test]
    fn test_set_many_unlocked_without_session() {
        let store = new_store();
        store.set("a", "0", "");

        let batch = vec![KeyValue { key: "a".to_string(), value: "9".to_string() }];
        assert!(store.set_many(&batch, ""));
        assert_eq!(store.get("a").as_deref(), Some("9"));
    }

    #[test]
    fn test_keys_prefix_is_length_guarded() {
        let store = new_store();
        for key in ["app/a", "app/b", "a", "apple", "zed"] {
            store.set(key, "x", "");
        }

        assert_eq!(store.keys("app/"), vec!["app/a", "app/b"]);
        assert_eq!(store.keys("app"), vec!["app/a", "app/b", "apple"]);
        // Longer than some stored keys.
        assert_eq!(store.keys("apple-pie"), Vec::<String>::new());
        assert_eq!(store.keys(""), vec!["a", "app/a", "app/b", "apple", "zed"]);
    }
}
