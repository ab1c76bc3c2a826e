//! Locking - the server-wide event lock and per-cube area locks
//!
//! The event lock serializes writes across sessions; requests that hit it
//! suspend on a semaphore and are replayed when the lock is released. Area
//! locks reserve a rectangular cube region per session and keep a rollback
//! journal of overwritten cells.

pub mod area_lock;
pub mod event;

pub use area_lock::{AreaLock, LockInfo, LockSet, RollbackEntry};
pub use event::{DeferredRequest, EventLock, SemaphoreTable};
