//! # CUBIST - In-Memory Multidimensional OLAP Server
//!
//! An in-memory MOLAP database server core built in Rust.
//!
//! ## Architecture
//!
//! - `core`: Identifiers, cell values, error taxonomy and configuration
//! - `elements`: Per-dimension element graphs with consolidation hierarchy
//! - `dimensions`: Dimension registry with subtype dispatch
//! - `cubes`: Sparse cell stores, areas and the cube registry
//! - `engine`: Cell reads, aggregation, splash writes
//! - `rules`: Compiled rule expressions and cross-cube markers
//! - `locks`: Server event lock and per-cube area locks
//! - `io`: Text snapshots and append-only journals
//! - `tokens`: Monotone version counters per scope
//! - `auth`: Users, effective rights and sessions
//! - `server`: The object tree root and its registries

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core types - identifiers, values, errors, configuration
pub mod core;

// Element graphs - consolidation hierarchy per dimension
pub mod elements;

// Dimension registry
pub mod dimensions;

// Cube cell stores
pub mod cubes;

// Path and value engine
pub mod engine;

// Rule and marker engine
pub mod rules;

// Locking
pub mod locks;

// Persistence
pub mod io;

// Token bus
pub mod tokens;

// Authentication and authorization
pub mod auth;

// Server root
pub mod server;

// Re-export commonly used types
pub use crate::core::{
    CellValue, CubeId, DatabaseId, DimensionId, ElementId, Identifier, OlapError, OlapResult,
    ServerOptions, SessionId,
};
pub use crate::cubes::{Area, Cube, CubeSubtype};
pub use crate::dimensions::{Dimension, DimensionSubtype};
pub use crate::elements::{Element, ElementGraph, ElementKind};
pub use crate::engine::{CellResult, PathType, SplashMode};
pub use crate::server::{Database, DatabaseStatus, DatabaseSubtype, Server};

/// Re-export version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
