//! Server module - the object tree root and its registries
//!
//! The server owns the database arena; each database owns its dimension
//! and cube arenas. Every cross-object reference is an id into one of
//! these arenas. `ServerState` carries the event lock, the semaphore
//! table and the changed-marker cube set, all mutated only by the
//! dispatch thread.

pub mod database;
pub mod names;
pub mod server;
pub mod state;
pub mod system;

pub use database::{ClientCacheType, Database, DatabaseStatus, DatabaseSubtype};
pub use server::{Dispatch, Server};
pub use state::ServerState;
