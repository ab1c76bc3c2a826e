//! Token bus - monotone version counters per scope
//!
//! Every mutation bumps the token of its scope and of the parent scopes on
//! an explicit list (element edit: dimension, database, server; cell edit:
//! cube, cube client cache, database, server). Clients echo the tokens they
//! saw; a mismatch aborts the request with the scope's "outdated" error.

use crate::core::{OlapError, OlapResult};
use serde::{Deserialize, Serialize};

/// Request header names carrying tokens on the wire
pub const HEADER_SERVER_TOKEN: &str = "X-PALO-SV";
pub const HEADER_DATABASE_TOKEN: &str = "X-PALO-DB";
pub const HEADER_DIMENSION_TOKEN: &str = "X-PALO-DIM";
pub const HEADER_CUBE_TOKEN: &str = "X-PALO-CB";
pub const HEADER_CLIENT_CACHE_TOKEN: &str = "X-PALO-CC";

/// Monotone version counter of one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token(u32);

impl Token {
    /// Counter starting at one, so zero can mean "never seen"
    pub fn new() -> Self {
        Token(1)
    }

    /// Current counter value
    pub fn value(self) -> u32 {
        self.0
    }

    /// Increment on mutation
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Scope a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    Server,
    Database,
    Dimension,
    Cube,
    ClientCache,
}

impl TokenScope {
    /// Error raised when a check against this scope fails
    pub fn outdated_error(self) -> OlapError {
        match self {
            TokenScope::Server => OlapError::ServerTokenOutdated,
            TokenScope::Database => OlapError::DatabaseTokenOutdated,
            TokenScope::Dimension => OlapError::DimensionTokenOutdated,
            // the client cache token is published under its own header but
            // shares the cube scope error
            TokenScope::Cube | TokenScope::ClientCache => OlapError::CubeTokenOutdated,
        }
    }
}

/// Optional per-scope token preconditions carried by one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenChecks {
    pub server: Option<u32>,
    pub database: Option<u32>,
    pub dimension: Option<u32>,
    pub cube: Option<u32>,
    pub client_cache: Option<u32>,
}

impl TokenChecks {
    /// No preconditions
    pub fn none() -> Self {
        Self::default()
    }

    /// Verify one scope; an absent precondition always passes
    pub fn verify(expected: Option<u32>, actual: Token, scope: TokenScope) -> OlapResult<()> {
        match expected {
            Some(value) if value != actual.value() => Err(scope.outdated_error()),
            _ => Ok(()),
        }
    }

    /// Verify the server scope
    pub fn check_server(&self, actual: Token) -> OlapResult<()> {
        Self::verify(self.server, actual, TokenScope::Server)
    }

    /// Verify the database scope
    pub fn check_database(&self, actual: Token) -> OlapResult<()> {
        Self::verify(self.database, actual, TokenScope::Database)
    }

    /// Verify the dimension scope
    pub fn check_dimension(&self, actual: Token) -> OlapResult<()> {
        Self::verify(self.dimension, actual, TokenScope::Dimension)
    }

    /// Verify the cube scope
    pub fn check_cube(&self, actual: Token) -> OlapResult<()> {
        Self::verify(self.cube, actual, TokenScope::Cube)
    }

    /// Verify the cube client-cache scope
    pub fn check_client_cache(&self, actual: Token) -> OlapResult<()> {
        Self::verify(self.client_cache, actual, TokenScope::ClientCache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_is_monotone() {
        let mut t = Token::new();
        let before = t.value();
        t.bump();
        assert!(t.value() > before);
    }

    #[test]
    fn test_absent_check_passes() {
        let checks = TokenChecks::none();
        assert!(checks.check_cube(Token::new()).is_ok());
    }

    #[test]
    fn test_mismatch_reports_scope() {
        let mut t = Token::new();
        let checks = TokenChecks {
            cube: Some(t.value()),
            ..TokenChecks::none()
        };
        assert!(checks.check_cube(t).is_ok());

        t.bump();
        assert_eq!(checks.check_cube(t), Err(OlapError::CubeTokenOutdated));
    }
}
