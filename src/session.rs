//! Per-user conversation state.
//!
//! A [`Session`] tracks whether the user has been shown the top-level menu
//! in the current turn sequence (`engaged`) and which command, if any, is
//! waiting for their next message (`pending`). Sessions are created lazily
//! on first contact and live for the process lifetime; there is no expiry.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A command selected by intent classification that consumes the user's
/// next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Address text or shared location -> latitude/longitude reply
    ShowCoordinates,
    /// Address text or shared location -> formatted address reply
    ShowFullAddress,
    /// Shared device location -> reverse-geocoded address reply
    LookupLocation,
}

/// Per-user conversational state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable user identifier, set at creation, never mutated
    pub id: String,
    /// True once the top-level menu has been shown this turn sequence
    pub engaged: bool,
    /// Command awaiting the user's next message, if any
    pub pending: Option<Command>,
}

impl Session {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            engaged: false,
            pending: None,
        }
    }
}

/// Concurrent registry of sessions, keyed by user identifier.
///
/// Lookups and lazy creation go through the map's entry API, so two
/// simultaneous first contacts from the same identifier cannot create
/// duplicate sessions. Entry guards are never held across an await.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of the session for `id`, creating it on first
    /// contact. Idempotent; repeated calls observe the same logical session.
    pub fn find_or_create(&self, id: &str) -> Session {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id))
            .clone()
    }

    /// Mutate the session for `id` under its entry lock.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut Session)) {
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id));
        f(&mut entry);
    }

    /// Snapshot of the session for `id`, if one exists.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_create_is_lazy_and_idempotent() {
        let store = SessionStore::new();
        assert!(store.is_empty());
        assert!(store.get("U1").is_none());

        let first = store.find_or_create("U1");
        assert_eq!(first.id, "U1");
        assert!(!first.engaged);
        assert!(first.pending.is_none());

        let again = store.find_or_create("U1");
        assert_eq!(first, again);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_mutates_in_place() {
        let store = SessionStore::new();
        store.find_or_create("U1");

        store.update("U1", |s| {
            s.engaged = true;
            s.pending = Some(Command::ShowCoordinates);
        });

        let session = store.get("U1").unwrap();
        assert!(session.engaged);
        assert_eq!(session.pending, Some(Command::ShowCoordinates));

        store.update("U1", |s| {
            s.pending = None;
            s.engaged = false;
        });
        let session = store.get("U1").unwrap();
        assert!(!session.engaged);
        assert!(session.pending.is_none());
    }

    #[test]
    fn update_creates_missing_session() {
        let store = SessionStore::new();
        store.update("U9", |s| s.engaged = true);
        assert!(store.get("U9").unwrap().engaged);
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_one_session() {
        use std::sync::Arc;

        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.find_or_create("U1") }));
        }
        for handle in handles {
            let session = handle.await.unwrap();
            assert_eq!(session.id, "U1");
        }
        assert_eq!(store.len(), 1);
    }
}
