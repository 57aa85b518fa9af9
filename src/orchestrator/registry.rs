//! Channel → session registry.
//!
//! A single mutex-guarded map. Every operation holds the lock only for the
//! map access itself, so long-running launches and stops never block other
//! callers. Scans run over a snapshot taken under the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::session::{Session, SessionState};

/// Registry entry for one channel.
#[derive(Debug, Clone)]
pub enum SessionSlot {
    /// Admitted and reserved; the worker is not tracked yet.
    Starting,
    /// Worker launched.
    Live(Arc<Session>),
}

impl SessionSlot {
    fn live(&self) -> Option<&Arc<Session>> {
        match self {
            Self::Starting => None,
            Self::Live(session) => Some(session),
        }
    }
}

/// Concurrent map of channels to sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `slot` iff the channel has no entry. Atomic per key.
    pub fn try_insert(&self, channel_name: &str, slot: SessionSlot) -> bool {
        let mut slots = self.lock();
        if slots.contains_key(channel_name) {
            return false;
        }
        slots.insert(channel_name.to_owned(), slot);
        true
    }

    /// Replace a `Starting` reservation with its live session.
    ///
    /// Returns `false`, leaving the registry unchanged, if the channel is
    /// not reserved.
    pub fn promote(&self, session: Arc<Session>) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(session.channel_name()) {
            Some(slot) if matches!(slot, SessionSlot::Starting) => {
                *slot = SessionSlot::Live(session);
                true
            }
            _ => false,
        }
    }

    /// Live session for a channel.
    #[must_use]
    pub fn get(&self, channel_name: &str) -> Option<Arc<Session>> {
        self.lock().get(channel_name).and_then(SessionSlot::live).cloned()
    }

    /// Lifecycle state of a channel; `None` when absent.
    #[must_use]
    pub fn state(&self, channel_name: &str) -> Option<SessionState> {
        self.lock().get(channel_name).map(|slot| match slot {
            SessionSlot::Starting => SessionState::Starting,
            SessionSlot::Live(session) => session.state(),
        })
    }

    /// Whether the channel has any entry, starting or live.
    #[must_use]
    pub fn contains(&self, channel_name: &str) -> bool {
        self.lock().contains_key(channel_name)
    }

    /// Remove and return a channel's entry.
    pub fn remove(&self, channel_name: &str) -> Option<SessionSlot> {
        self.lock().remove(channel_name)
    }

    /// Number of entries, starting ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Live sessions at this instant.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.lock().values().filter_map(SessionSlot::live).cloned().collect()
    }

    /// Visit a snapshot of the live sessions. The lock is released before
    /// the first visit, so the visitor may call back into the registry.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Arc<Session>),
    {
        for session in self.snapshot() {
            visitor(&session);
        }
    }

    /// Advance a live session's heartbeat to `max(current, now)`.
    ///
    /// Returns `false` when the channel has no live session.
    pub fn update_heartbeat(&self, channel_name: &str, now: i64) -> bool {
        match self.get(channel_name) {
            Some(session) => {
                session.touch(now);
                true
            }
            None => false,
        }
    }
}
