// Server configuration
// Loaded from a JSON file at startup, all fields optional with defaults

use crate::core::{OlapError, OlapResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server start-up options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Directory holding the server snapshot and one subdirectory per database
    pub data_directory: PathBuf,

    /// Default session time-to-live in seconds (0 keeps sessions alive
    /// practically forever)
    pub session_ttl_seconds: i64,

    /// Reject requests without a valid session
    pub require_user: bool,

    /// Flush the journal after this many buffered records
    pub journal_buffer_records: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            session_ttl_seconds: 3600,
            require_user: false,
            journal_buffer_records: 64,
        }
    }
}

impl ServerOptions {
    /// Read options from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> OlapResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text)
            .map_err(|e| OlapError::CorruptFile(format!("options file: {}", e)))
    }
}
