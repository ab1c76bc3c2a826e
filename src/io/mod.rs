//! Persistence - text snapshots and append-only journals
//!
//! Every database is a directory of CSV-style files: one snapshot for the
//! database structure, one file pair per cube, and a journal next to each
//! file. Saves go through a temp-file-then-rename discipline; loads adopt
//! an orphaned temp file, read the snapshot and replay the journal.

pub mod format;
pub mod journal;
pub mod snapshot;

pub use format::{error_line, escape, parse_line, read_records, LineBuilder, Record};
pub use journal::{JournalRecord, JournalWriter};
