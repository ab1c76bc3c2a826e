//! Path and value engine - cell reads, aggregation, splash writes
//!
//! Reads consult rules first, then the store for base paths, then the
//! weighted base expansion for consolidated paths. Writes validate the
//! path type, honor area locks and splash consolidated targets down to
//! base cells.

pub mod reader;
pub mod writer;

pub use reader::{CellResult, PathType};
pub use writer::SplashMode;
