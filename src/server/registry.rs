//! # User Registry
//!
//! Process-wide mapping from username to live [`Session`], the single
//! source of truth for "who is online". The uniqueness check and the
//! insert happen under one lock, so two simultaneous logins with the same
//! username can never both succeed.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::session::Session;

/// Registry of logged-in sessions, keyed by username.
#[derive(Default)]
pub struct Registry {
    users: Mutex<HashMap<String, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check username availability and register the session.
    /// On success the username is also bound to the session handle.
    ///
    /// # Returns
    /// - `true`: username was free and is now held by `session`
    /// - `false`: username already registered, nothing mutated
    pub async fn try_add(&self, username: &str, session: &Arc<Session>) -> bool {
        let mut users = self.users.lock().await;
        if users.contains_key(username) {
            return false;
        }
        session.bind_username(username.to_string());
        users.insert(username.to_string(), Arc::clone(session));
        true
    }

    /// Remove a session by username. Idempotent: removing an absent or
    /// already-replaced entry is a no-op. Only the exact session that holds
    /// the name is removed.
    ///
    /// # Returns
    /// `true` when this call actually removed the entry.
    pub async fn remove(&self, username: &str, session: &Arc<Session>) -> bool {
        let mut users = self.users.lock().await;
        match users.get(username) {
            Some(current) if Arc::ptr_eq(current, session) => {
                users.remove(username);
                true
            }
            _ => false,
        }
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.users.lock().await.contains_key(username)
    }

    pub async fn lookup(&self, username: &str) -> Option<Arc<Session>> {
        self.users.lock().await.get(username).cloned()
    }

    /// Snapshot of all registered sessions. Callers broadcast to the
    /// snapshot after the lock is released, so a slow client can never
    /// stall the registry.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.users.lock().await.values().cloned().collect()
    }

    /// Sorted list of online usernames.
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}
