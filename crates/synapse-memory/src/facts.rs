//! Per-session fact store.
//!
//! Last write wins for each `(user, session, key)`. Facts keep the position
//! of their first insertion so iteration order is stable within a process.

use std::collections::HashMap;

use tracing::debug;

use synapse_core::{Fact, SessionKey};

/// Mutable mapping of `(user, session, fact key)` to the latest value.
#[derive(Debug, Default)]
pub struct FactStore {
    sessions: HashMap<SessionKey, Vec<Fact>>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the value for `key`. Empty values (after trimming) are ignored.
    ///
    /// Returns `true` when the store changed.
    pub fn set(&mut self, session: &SessionKey, key: &str, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || key.is_empty() {
            return false;
        }

        let facts = self.sessions.entry(session.clone()).or_default();
        match facts.iter_mut().find(|f| f.key == key) {
            Some(existing) if existing.value == value => false,
            Some(existing) => {
                existing.value = value.to_string();
                debug!(user_id = %session.user_id, session_id = %session.session_id, key, "Fact updated");
                true
            }
            None => {
                facts.push(Fact::new(key, value));
                debug!(user_id = %session.user_id, session_id = %session.session_id, key, "Fact recorded");
                true
            }
        }
    }

    /// Current value for `key`, if any.
    pub fn get(&self, session: &SessionKey, key: &str) -> Option<String> {
        self.sessions
            .get(session)?
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.clone())
    }

    /// Snapshot of every fact for the session, in first-insertion order.
    pub fn all(&self, session: &SessionKey) -> Vec<Fact> {
        self.sessions.get(session).cloned().unwrap_or_default()
    }

    /// Borrowed view used by the query engine while the store lock is held.
    pub(crate) fn iter(&self, session: &SessionKey) -> impl Iterator<Item = &Fact> {
        self.sessions.get(session).into_iter().flatten()
    }

    /// Total number of facts across all sessions.
    pub fn len(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("u1", "s1")
    }

    #[test]
    fn test_set_and_get() {
        let mut store = FactStore::new();
        assert!(store.set(&key(), "favorite_color", " blue "));
        assert_eq!(store.get(&key(), "favorite_color").as_deref(), Some("blue"));
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = FactStore::new();
        store.set(&key(), "favorite_color", "blue");
        store.set(&key(), "favorite_color", "red");
        assert_eq!(store.get(&key(), "favorite_color").as_deref(), Some("red"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_value_is_not_a_change() {
        let mut store = FactStore::new();
        assert!(store.set(&key(), "name", "Ada"));
        assert!(!store.set(&key(), "name", "Ada"));
    }

    #[test]
    fn test_empty_value_is_noop() {
        let mut store = FactStore::new();
        store.set(&key(), "name", "Ada");
        assert!(!store.set(&key(), "name", "   "));
        assert_eq!(store.get(&key(), "name").as_deref(), Some("Ada"));
        assert!(!store.set(&key(), "age", ""));
        assert!(store.get(&key(), "age").is_none());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut store = FactStore::new();
        let other = SessionKey::new("u1", "s2");
        store.set(&key(), "name", "Ada");
        assert!(store.get(&other, "name").is_none());
        assert!(store.get(&SessionKey::new("u2", "s1"), "name").is_none());
    }

    #[test]
    fn test_all_preserves_first_insertion_order() {
        let mut store = FactStore::new();
        store.set(&key(), "name", "Ada");
        store.set(&key(), "age", "36");
        store.set(&key(), "name", "Grace");
        let keys: Vec<String> = store.all(&key()).into_iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["name", "age"]);
    }

    #[test]
    fn test_all_is_a_copy() {
        let mut store = FactStore::new();
        store.set(&key(), "name", "Ada");
        let snapshot = store.all(&key());
        store.set(&key(), "name", "Grace");
        assert_eq!(snapshot[0].value, "Ada");
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let store = FactStore::new();
        assert!(store.all(&key()).is_empty());
        assert!(store.get(&key(), "name").is_none());
        assert!(store.is_empty());
    }
}
