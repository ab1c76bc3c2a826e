// Identifier types for the OLAP object arenas
// Every cross-object reference is an integer id, never a pointer

/// Base identifier type used across the server
pub type Identifier = u32;

/// Identifier of an element within its dimension
pub type ElementId = Identifier;

/// Identifier of a dimension within its database
pub type DimensionId = Identifier;

/// Identifier of a cube within its database
pub type CubeId = Identifier;

/// Identifier of a database within the server
pub type DatabaseId = Identifier;

/// Identifier of a rule within its cube
pub type RuleId = Identifier;

/// Session identifier (24 significant bits, see `auth::sessions`)
pub type SessionId = Identifier;

/// Identifier of a semaphore in the dispatch table
pub type SemaphoreId = Identifier;

/// Sentinel for "no identifier"
pub const NO_IDENTIFIER: Identifier = Identifier::MAX;
