// Error taxonomy for the OLAP server
// Every error maps to a stable numeric code on the wire, so the whole
// server shares one enum instead of per-module error types

use thiserror::Error;

/// Result alias used throughout the server core
pub type OlapResult<T> = Result<T, OlapError>;

/// Server-wide error taxonomy
///
/// Variants carry the human-readable context; `code()` yields the stable
/// wire code and `description()` the category text used in the CSV error
/// line `<code>;<description>;<message>`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OlapError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("missing parameter '{0}'")]
    ParameterMissing(String),

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("invalid splash mode: {0}")]
    InvalidSplashMode(String),

    #[error("invalid path type: {0}")]
    InvalidPathType(String),

    #[error("value not allowed here: {0}")]
    InvalidPermission(String),

    #[error("invalid session")]
    InvalidSession,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("already within event")]
    WithinEvent,

    #[error("not within event")]
    NotWithinEvent,

    #[error("worker error: {0}")]
    WorkerMessage(String),

    #[error("corrupt file: {0}")]
    CorruptFile(String),

    #[error("rename failed: {0}")]
    RenameFailed(String),

    #[error("cell is in a locked area")]
    LockedArea,

    #[error("server token outdated")]
    ServerTokenOutdated,

    #[error("database token outdated")]
    DatabaseTokenOutdated,

    #[error("dimension token outdated")]
    DimensionTokenOutdated,

    #[error("cube token outdated")]
    CubeTokenOutdated,

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("database name in use: {0}")]
    DatabaseNameInUse(String),

    #[error("database is not deletable: {0}")]
    DatabaseUndeletable(String),

    #[error("database is not renamable: {0}")]
    DatabaseUnrenamable(String),

    #[error("database not loaded: {0}")]
    DatabaseNotLoaded(String),

    #[error("database not saved: {0}")]
    DatabaseUnsaved(String),

    #[error("invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("dimension not found: {0}")]
    DimensionNotFound(String),

    #[error("dimension name in use: {0}")]
    DimensionNameInUse(String),

    #[error("dimension is not deletable: {0}")]
    DimensionUndeletable(String),

    #[error("dimension is not renamable: {0}")]
    DimensionUnrenamable(String),

    #[error("dimension cannot be changed: {0}")]
    DimensionUnchangable(String),

    #[error("dimension is in use: {0}")]
    DimensionInUse(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("element name in use: {0}")]
    ElementNameInUse(String),

    #[error("element is not deletable: {0}")]
    ElementUndeletable(String),

    #[error("circular consolidation: {0}")]
    CircularReference(String),

    #[error("cube not found: {0}")]
    CubeNotFound(String),

    #[error("cube name in use: {0}")]
    CubeNameInUse(String),

    #[error("cube is not deletable: {0}")]
    CubeUndeletable(String),

    #[error("cube is not renamable: {0}")]
    CubeUnrenamable(String),

    #[error("cube not loaded: {0}")]
    CubeNotLoaded(String),

    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("rule syntax error: {0}")]
    RuleSyntaxError(String),
}

impl OlapError {
    /// Stable numeric wire code for this error
    pub fn code(&self) -> u32 {
        use OlapError::*;

        match self {
            Internal(_) => 1,
            ParameterMissing(_) => 100,
            InvalidCoordinates(_) => 101,
            InvalidSplashMode(_) => 102,
            InvalidPathType(_) => 103,
            InvalidPermission(_) => 104,
            InvalidSession => 105,
            NotAuthorized(_) => 106,
            WithinEvent => 107,
            NotWithinEvent => 108,
            WorkerMessage(_) => 109,
            CorruptFile(_) => 110,
            RenameFailed(_) => 111,
            LockedArea => 112,
            ServerTokenOutdated => 120,
            DatabaseTokenOutdated => 121,
            DimensionTokenOutdated => 122,
            CubeTokenOutdated => 123,
            DatabaseNotFound(_) => 200,
            DatabaseNameInUse(_) => 201,
            DatabaseUndeletable(_) => 202,
            DatabaseUnrenamable(_) => 203,
            DatabaseNotLoaded(_) => 204,
            DatabaseUnsaved(_) => 205,
            InvalidDatabaseName(_) => 206,
            DimensionNotFound(_) => 300,
            DimensionNameInUse(_) => 301,
            DimensionUndeletable(_) => 302,
            DimensionUnrenamable(_) => 303,
            DimensionUnchangable(_) => 304,
            DimensionInUse(_) => 305,
            ElementNotFound(_) => 400,
            ElementNameInUse(_) => 401,
            ElementUndeletable(_) => 402,
            CircularReference(_) => 403,
            CubeNotFound(_) => 500,
            CubeNameInUse(_) => 501,
            CubeUndeletable(_) => 502,
            CubeUnrenamable(_) => 503,
            CubeNotLoaded(_) => 504,
            RuleNotFound(_) => 600,
            RuleSyntaxError(_) => 601,
        }
    }

    /// Short category text for the wire error line
    pub fn description(&self) -> &'static str {
        use OlapError::*;

        match self {
            Internal(_) => "internal error",
            ParameterMissing(_) => "missing parameter",
            InvalidCoordinates(_) => "invalid coordinates",
            InvalidSplashMode(_) => "invalid splash mode",
            InvalidPathType(_) => "invalid path type",
            InvalidPermission(_) => "invalid permission",
            InvalidSession => "invalid session",
            NotAuthorized(_) => "not authorized",
            WithinEvent => "already within event",
            NotWithinEvent => "not within event",
            WorkerMessage(_) => "worker error",
            CorruptFile(_) => "corrupt file",
            RenameFailed(_) => "rename failed",
            LockedArea => "locked area",
            ServerTokenOutdated => "server token outdated",
            DatabaseTokenOutdated => "database token outdated",
            DimensionTokenOutdated => "dimension token outdated",
            CubeTokenOutdated => "cube token outdated",
            DatabaseNotFound(_) => "database not found",
            DatabaseNameInUse(_) => "database name in use",
            DatabaseUndeletable(_) => "database not deletable",
            DatabaseUnrenamable(_) => "database not renamable",
            DatabaseNotLoaded(_) => "database not loaded",
            DatabaseUnsaved(_) => "database not saved",
            InvalidDatabaseName(_) => "invalid database name",
            DimensionNotFound(_) => "dimension not found",
            DimensionNameInUse(_) => "dimension name in use",
            DimensionUndeletable(_) => "dimension not deletable",
            DimensionUnrenamable(_) => "dimension not renamable",
            DimensionUnchangable(_) => "dimension not changable",
            DimensionInUse(_) => "dimension in use",
            ElementNotFound(_) => "element not found",
            ElementNameInUse(_) => "element name in use",
            ElementUndeletable(_) => "element not deletable",
            CircularReference(_) => "circular reference",
            CubeNotFound(_) => "cube not found",
            CubeNameInUse(_) => "cube name in use",
            CubeUndeletable(_) => "cube not deletable",
            CubeUnrenamable(_) => "cube not renamable",
            CubeNotLoaded(_) => "cube not loaded",
            RuleNotFound(_) => "rule not found",
            RuleSyntaxError(_) => "rule syntax error",
        }
    }
}

impl From<std::io::Error> for OlapError {
    fn from(err: std::io::Error) -> Self {
        OlapError::CorruptFile(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(OlapError::Internal("x".into()).code(), 1);
        assert_eq!(OlapError::CubeTokenOutdated.code(), 123);
        assert_eq!(OlapError::DatabaseNotFound("d".into()).code(), 200);
        assert_eq!(OlapError::RuleSyntaxError("r".into()).code(), 601);
    }

    #[test]
    fn test_display_carries_context() {
        let err = OlapError::DimensionNotFound("Products".into());
        assert_eq!(err.to_string(), "dimension not found: Products");
        assert_eq!(err.description(), "dimension not found");
    }
}
