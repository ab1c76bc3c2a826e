// Server event lock and semaphore table
// The single-threaded dispatch suspends requests by parking them in a
// semaphore queue; raising the semaphore hands them back for replay

use crate::core::{CellValue, CubeId, DatabaseId, ElementId, SemaphoreId, SessionId};
use crate::engine::SplashMode;
use std::collections::{HashMap, VecDeque};

/// State of the server-wide event lock while held
#[derive(Debug, Clone, PartialEq)]
pub struct EventLock {
    /// Session holding the lock
    pub session: SessionId,

    /// User name recorded for journaling while the lock is held
    pub user: String,

    /// Event name recorded for journaling while the lock is held
    pub event: String,
}

/// A mutating request parked while the event lock is held
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredRequest {
    /// Suspended cell write
    CellSet {
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        coord: Vec<ElementId>,
        value: CellValue,
        mode: SplashMode,
        add: bool,
    },

    /// Suspended cell clear
    CellClear {
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        coord: Vec<ElementId>,
    },
}

impl DeferredRequest {
    /// Session the request belongs to
    pub fn session(&self) -> SessionId {
        match self {
            DeferredRequest::CellSet { session, .. } => *session,
            DeferredRequest::CellClear { session, .. } => *session,
        }
    }
}

/// Table of pending continuations keyed by semaphore id
#[derive(Debug, Default)]
pub struct SemaphoreTable {
    next: SemaphoreId,
    queues: HashMap<SemaphoreId, VecDeque<DeferredRequest>>,
}

impl SemaphoreTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a semaphore
    pub fn create(&mut self) -> SemaphoreId {
        let id = self.next;
        self.next += 1;
        self.queues.insert(id, VecDeque::new());
        id
    }

    /// Park a request on a semaphore
    pub fn enqueue(&mut self, semaphore: SemaphoreId, request: DeferredRequest) {
        self.queues.entry(semaphore).or_default().push_back(request);
    }

    /// Raise a semaphore, draining its continuations in arrival order
    pub fn raise(&mut self, semaphore: SemaphoreId) -> VecDeque<DeferredRequest> {
        self.queues.remove(&semaphore).unwrap_or_default()
    }

    /// Number of requests parked on a semaphore
    pub fn waiting(&self, semaphore: SemaphoreId) -> usize {
        self.queues.get(&semaphore).map(|q| q.len()).unwrap_or(0)
    }

    /// Remove every parked request of an evicted session
    ///
    /// The removed requests are handed back so the dispatcher can resolve
    /// them with `InvalidSession`.
    pub fn evict_session(&mut self, session: SessionId) -> Vec<DeferredRequest> {
        let mut evicted = Vec::new();
        for queue in self.queues.values_mut() {
            let mut kept = VecDeque::new();
            for request in queue.drain(..) {
                if request.session() == session {
                    evicted.push(request);
                } else {
                    kept.push_back(request);
                }
            }
            *queue = kept;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_request(session: SessionId) -> DeferredRequest {
        DeferredRequest::CellSet {
            session,
            database: 0,
            cube: 0,
            coord: vec![0, 0],
            value: CellValue::Numeric(1.0),
            mode: SplashMode::Default,
            add: false,
        }
    }

    #[test]
    fn test_raise_preserves_order() {
        let mut table = SemaphoreTable::new();
        let sem = table.create();
        table.enqueue(sem, set_request(1));
        table.enqueue(sem, set_request(2));

        let drained = table.raise(sem);
        let sessions: Vec<SessionId> = drained.iter().map(|r| r.session()).collect();
        assert_eq!(sessions, vec![1, 2]);
        assert_eq!(table.waiting(sem), 0);
    }

    #[test]
    fn test_evict_session_removes_requests() {
        let mut table = SemaphoreTable::new();
        let sem = table.create();
        table.enqueue(sem, set_request(1));
        table.enqueue(sem, set_request(2));
        table.enqueue(sem, set_request(1));

        let evicted = table.evict_session(1);
        assert_eq!(evicted.len(), 2);
        assert_eq!(table.waiting(sem), 1);
    }
}
