//! Dimension registry types - named element collections with subtype policy
//!
//! A dimension wraps an element graph and adds identity, token and the
//! subtype tag that selects which element kinds are accepted and whether
//! the dimension may be renamed, deleted or structurally changed. The
//! attributed-dimension protocol (auto-managed attribute dimensions and
//! cubes) is driven from the database registry in `server::database`.

pub mod dimension;
pub mod subtype;

pub use dimension::Dimension;
pub use subtype::DimensionSubtype;
