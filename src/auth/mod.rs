//! Authentication and authorization
//!
//! Users, groups and roles live as elements of the system database; the
//! cells of its authorization cubes grade every right object on the
//! N < R < W < D < S scale. Sessions are short opaque handles with a TTL.

pub mod right;
pub mod rights;
pub mod sessions;
pub mod user;

pub use right::{Right, RightObject, RIGHT_OBJECT_NAMES};
pub use sessions::{QueuedCellWrite, Session, SessionRegistry};
pub use user::{User, UserRegistry};
