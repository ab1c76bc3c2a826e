//! Cube types - sparse cell stores, coordinate areas and the cube registry
//!
//! A cube is an ordered list of dimensions plus two sparse stores (numeric
//! and string cells), its rule set, forward markers, area locks and the
//! caches invalidated through the token bus.

pub mod area;
pub mod cube;
pub mod store;

pub use area::{parse_area_ids, parse_path_ids, Area};
pub use cube::{Cube, CubeStatus, CubeSubtype};
pub use store::CellStore;
