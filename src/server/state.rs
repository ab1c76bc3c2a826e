// Server dispatch state
// Folds the process-wide singletons (blocking flag, active session, event
// name, changed-marker cubes) into one struct threaded to every handler

use crate::core::{CubeId, DatabaseId, SemaphoreId, SessionId};
use crate::locks::{EventLock, SemaphoreTable};
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Name journaled for operations issued without a user
pub const SYSTEM_USERNAME: &str = "#SYSTEM#";

/// Mutable server-wide dispatch state
///
/// Initialized at server construction and mutated only by the dispatch
/// thread.
#[derive(Debug)]
pub struct ServerState {
    /// Server event lock while held
    pub event_lock: Option<EventLock>,

    /// Semaphore suspended writers wait on while the event lock is held
    pub server_event_semaphore: SemaphoreId,

    /// Pending continuations keyed by semaphore
    pub semaphores: SemaphoreTable,

    /// Cubes with pending marker recomputation
    ///
    /// Behind a lock so reads can drain the set through a shared borrow;
    /// all access stays on the dispatch thread.
    pub changed_marker_cubes: RwLock<BTreeSet<(DatabaseId, CubeId)>>,
}

impl ServerState {
    /// Fresh dispatch state
    pub fn new() -> Self {
        let mut semaphores = SemaphoreTable::new();
        let server_event_semaphore = semaphores.create();
        Self {
            event_lock: None,
            server_event_semaphore,
            semaphores,
            changed_marker_cubes: RwLock::new(BTreeSet::new()),
        }
    }

    /// True while some session holds the event lock
    pub fn blocking(&self) -> bool {
        self.event_lock.is_some()
    }

    /// Session holding the event lock, if any
    pub fn active_session(&self) -> Option<SessionId> {
        self.event_lock.as_ref().map(|lock| lock.session)
    }

    /// User name to journal for an operation
    ///
    /// While the event lock is held, every write is journaled under the
    /// lock holder's name; otherwise the supplied name, or the system
    /// name when there is none.
    pub fn effective_username(&self, user: Option<&str>) -> String {
        if let Some(lock) = &self.event_lock {
            lock.user.clone()
        } else {
            user.unwrap_or(SYSTEM_USERNAME).to_string()
        }
    }

    /// Event name to journal for an operation
    pub fn effective_event(&self) -> String {
        self.event_lock
            .as_ref()
            .map(|lock| lock.event.clone())
            .unwrap_or_default()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_username() {
        let mut state = ServerState::new();
        assert_eq!(state.effective_username(None), SYSTEM_USERNAME);
        assert_eq!(state.effective_username(Some("alice")), "alice");

        state.event_lock = Some(EventLock {
            session: 1,
            user: "bob".to_string(),
            event: "batch".to_string(),
        });
        assert_eq!(state.effective_username(Some("alice")), "bob");
        assert!(state.blocking());
        assert_eq!(state.active_session(), Some(1));
    }
}
