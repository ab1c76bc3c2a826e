//! Core module - identifiers, cell values, error taxonomy and configuration
//!
//! This module provides the foundation for the entire OLAP server: the
//! integer identifier types used by the arenas, the numeric-or-string cell
//! value, the wire-visible error taxonomy and the server options.

pub mod config;
pub mod error;
pub mod ids;
pub mod value;

// Re-export commonly used types
pub use config::ServerOptions;
pub use error::{OlapError, OlapResult};
pub use ids::{
    CubeId, DatabaseId, DimensionId, ElementId, Identifier, RuleId, SemaphoreId, SessionId,
    NO_IDENTIFIER,
};
pub use value::CellValue;
