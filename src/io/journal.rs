// Append-only journal
// One journal per persisted object; records replay the structural edits
// and cell writes exactly as invoked

use crate::core::{OlapError, OlapResult};
use crate::io::format::{escape, parse_line};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One replayable journal record
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRecord {
    /// Seconds since the epoch at append time
    pub timestamp: i64,

    /// User the operation was journaled under
    pub username: String,

    /// Event name active at append time, if any
    pub event: String,

    /// Command keyword
    pub command: String,

    /// Command operands
    pub operands: Vec<String>,
}

impl JournalRecord {
    /// Build a record stamped now
    pub fn new(username: &str, event: &str, command: &str, operands: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            username: username.to_string(),
            event: event.to_string(),
            command: command.to_string(),
            operands,
        }
    }

    fn to_line(&self) -> String {
        let mut line = String::new();
        line.push_str(&self.timestamp.to_string());
        line.push(';');
        line.push_str(&escape(&self.username));
        line.push(';');
        line.push_str(&escape(&self.event));
        line.push(';');
        line.push_str(&self.command);
        line.push(';');
        for operand in &self.operands {
            line.push_str(&escape(operand));
            line.push(';');
        }
        line.push('\n');
        line
    }

    fn from_values(values: Vec<String>) -> OlapResult<Self> {
        if values.len() < 4 {
            return Err(OlapError::CorruptFile("short journal line".to_string()));
        }
        let timestamp = values[0]
            .parse()
            .map_err(|_| OlapError::CorruptFile(format!("bad timestamp '{}'", values[0])))?;
        Ok(Self {
            timestamp,
            username: values[1].clone(),
            event: values[2].clone(),
            command: values[3].clone(),
            operands: values[4..].to_vec(),
        })
    }
}

/// Appender for one journal file
///
/// The file appears on the first append, so a freshly saved object does
/// not leave an empty journal behind.
#[derive(Debug)]
pub struct JournalWriter {
    path: PathBuf,
    file: Option<File>,
    closed: bool,
    unflushed: usize,
    flush_every: usize,
}

impl JournalWriter {
    /// Bind a journal writer to `path` without touching the file system
    pub fn open<P: AsRef<Path>>(path: P, flush_every: usize) -> OlapResult<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            closed: false,
            unflushed: 0,
            flush_every: flush_every.max(1),
        })
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&mut self, record: &JournalRecord) -> OlapResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.file.is_none() {
            self.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(record.to_line().as_bytes())?;
            self.unflushed += 1;
            if self.unflushed >= self.flush_every {
                file.flush()?;
                self.unflushed = 0;
            }
        }
        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> OlapResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
            self.unflushed = 0;
        }
        Ok(())
    }

    /// Close the file handle; further appends are dropped
    pub fn close(&mut self) -> OlapResult<()> {
        self.flush()?;
        self.file = None;
        self.closed = true;
        Ok(())
    }
}

/// Read every record of a journal file; a missing file reads as empty
pub fn read_journal<P: AsRef<Path>>(path: P) -> OlapResult<Vec<JournalRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        records.push(JournalRecord::from_values(parse_line(line))?);
    }
    Ok(records)
}

/// Move the journal aside as `<name>.archived`, replacing an older archive
pub fn archive_journal<P: AsRef<Path>>(path: P) -> OlapResult<()> {
    let path = path.as_ref();
    if path.exists() {
        let mut archived = path.as_os_str().to_os_string();
        archived.push(".archived");
        std::fs::rename(path, PathBuf::from(archived))?;
    }
    Ok(())
}

/// Delete the journal file if present
pub fn delete_journal<P: AsRef<Path>>(path: P) -> OlapResult<()> {
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.log");

        let mut writer = JournalWriter::open(&path, 1).unwrap();
        writer
            .append(&JournalRecord::new(
                "alice",
                "",
                "setString",
                vec!["0".to_string(), "1,2".to_string(), "x;y".to_string()],
            ))
            .unwrap();
        writer
            .append(&JournalRecord::new("bob", "load", "deleteElement", vec!["7".to_string()]))
            .unwrap();
        writer.close().unwrap();

        let records = read_journal(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].command, "setString");
        assert_eq!(records[0].operands[2], "x;y");
        assert_eq!(records[1].username, "bob");
    }

    #[test]
    fn test_missing_journal_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_journal(dir.path().join("none.log")).unwrap().is_empty());
    }

    #[test]
    fn test_archive_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.log");
        std::fs::write(&path, "x\n").unwrap();

        archive_journal(&path).unwrap();
        assert!(!path.exists());
        assert!(dir.path().join("cube.log.archived").exists());

        delete_journal(&path).unwrap();
    }
}
