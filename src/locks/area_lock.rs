// Per-cube area locks with rollback journal
// A lock reserves a rectangular area for one session; every overwrite
// inside the area is journaled so rollback can restore prior values

use crate::core::{CellValue, ElementId, Identifier, OlapError, OlapResult, SessionId};
use crate::cubes::Area;

/// One journaled overwrite: coordinate and the value it replaced
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackEntry {
    pub coord: Vec<ElementId>,
    pub prior: Option<CellValue>,
}

/// Lock over a cube area held by one session
#[derive(Debug, Clone)]
pub struct AreaLock {
    /// Cube-local lock identifier
    pub id: Identifier,

    /// Owning session
    pub session: SessionId,

    /// Owning user name, for lock listings
    pub user: String,

    /// Reserved area
    pub area: Area,

    /// Journal of overwritten cells, in write order
    rollback: Vec<RollbackEntry>,
}

impl AreaLock {
    /// Record an overwrite inside the locked area
    pub fn record(&mut self, coord: Vec<ElementId>, prior: Option<CellValue>) {
        self.rollback.push(RollbackEntry { coord, prior });
    }

    /// Number of journaled writes
    pub fn journal_len(&self) -> usize {
        self.rollback.len()
    }

    /// Descriptive info for listings and bulk-read lock flags
    pub fn info(&self) -> LockInfo {
        LockInfo {
            id: self.id,
            user: self.user.clone(),
            steps: self.rollback.len(),
        }
    }
}

/// Lock description reported to clients
#[derive(Debug, Clone, PartialEq)]
pub struct LockInfo {
    pub id: Identifier,
    pub user: String,
    pub steps: usize,
}

/// All active locks of one cube
#[derive(Debug, Clone, Default)]
pub struct LockSet {
    locks: Vec<AreaLock>,
    next_id: Identifier,
}

impl LockSet {
    /// Create an empty lock set
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an area for a session
    ///
    /// Overlapping an existing lock fails with `LockedArea`, whoever owns
    /// it: rollback journals must not interleave.
    pub fn acquire(
        &mut self,
        session: SessionId,
        user: &str,
        area: Area,
    ) -> OlapResult<Identifier> {
        if self.locks.iter().any(|l| l.area.overlaps(&area)) {
            return Err(OlapError::LockedArea);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.locks.push(AreaLock {
            id,
            session,
            user: user.to_string(),
            area,
            rollback: Vec::new(),
        });

        Ok(id)
    }

    /// Lock covering the coordinate, if any
    pub fn find_covering(&self, coord: &[ElementId]) -> Option<&AreaLock> {
        self.locks.iter().find(|l| l.area.contains(coord))
    }

    /// Mutable access to the lock covering the coordinate
    pub fn find_covering_mut(&mut self, coord: &[ElementId]) -> Option<&mut AreaLock> {
        self.locks.iter_mut().find(|l| l.area.contains(coord))
    }

    /// Lock by id
    pub fn get(&self, id: Identifier) -> Option<&AreaLock> {
        self.locks.iter().find(|l| l.id == id)
    }

    /// Active locks
    pub fn iter(&self) -> impl Iterator<Item = &AreaLock> {
        self.locks.iter()
    }

    /// True if any lock area mentions the element on the given dimension
    pub fn references_element(&self, dim_index: usize, element: ElementId) -> bool {
        self.locks.iter().any(|l| {
            l.area
                .sets()
                .get(dim_index)
                .map(|set| set.contains(&element))
                .unwrap_or(false)
        })
    }

    /// Commit: discard the lock and its journal
    pub fn commit(&mut self, id: Identifier) -> OlapResult<()> {
        let at = self
            .locks
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| OlapError::Internal(format!("unknown lock {}", id)))?;
        self.locks.remove(at);
        Ok(())
    }

    /// Rollback: remove the lock and hand back the journaled writes
    ///
    /// With `steps` given, only that many newest writes are undone and the
    /// lock stays in place.
    pub fn rollback(&mut self, id: Identifier, steps: Option<usize>) -> OlapResult<Vec<RollbackEntry>> {
        let at = self
            .locks
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| OlapError::Internal(format!("unknown lock {}", id)))?;

        match steps {
            Some(steps) => {
                let lock = &mut self.locks[at];
                let keep = lock.rollback.len().saturating_sub(steps);
                let mut undone = lock.rollback.split_off(keep);
                undone.reverse();
                Ok(undone)
            }
            None => {
                let lock = self.locks.remove(at);
                let mut undone = lock.rollback;
                undone.reverse();
                Ok(undone)
            }
        }
    }

    /// Drop every lock of a session, returning their journals reversed
    /// (session eviction rolls the session's locks back)
    pub fn evict_session(&mut self, session: SessionId) -> Vec<RollbackEntry> {
        let mut undone = Vec::new();
        let mut kept = Vec::new();

        for lock in self.locks.drain(..) {
            if lock.session == session {
                let mut journal = lock.rollback;
                journal.reverse();
                undone.extend(journal);
            } else {
                kept.push(lock);
            }
        }

        self.locks = kept;
        undone
    }
}
