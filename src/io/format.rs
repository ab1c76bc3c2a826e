// CSV-style line format
// Values are separated by semicolons; strings are quoted with doubled
// inner quotes; `[NAME]` lines open sections and `#` lines are comments

use crate::core::{ElementId, OlapError, OlapResult};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Quote a string value for a snapshot or journal line
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Split one line into values, honoring quotes
pub fn parse_line(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => quoted = true,
                ';' => {
                    values.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }
    }

    if !current.is_empty() {
        values.push(current);
    }

    values
}

/// CSV error line sent to clients:
/// `<errorCode>;<escapedDescription>;<escapedMessage>`
pub fn error_line(error: &OlapError) -> String {
    format!(
        "{};{};{}\n",
        error.code(),
        escape(error.description()),
        escape(&error.to_string())
    )
}

/// One parsed line of a snapshot or journal file
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// `[NAME]` section header
    Section(String),

    /// Semicolon-separated values
    Values(Vec<String>),
}

/// Parse a whole file into records, skipping comments and blank lines
pub fn read_records<P: AsRef<Path>>(path: P) -> OlapResult<Vec<Record>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            records.push(Record::Section(
                trimmed[1..trimmed.len() - 1].to_string(),
            ));
        } else {
            records.push(Record::Values(parse_line(trimmed)));
        }
    }

    Ok(records)
}

/// Builder for the snapshot text of one file
#[derive(Debug, Default)]
pub struct LineBuilder {
    text: String,
    line: Vec<String>,
}

impl LineBuilder {
    /// Start an empty file
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `#` comment line
    pub fn comment(&mut self, text: &str) {
        self.text.push_str("# ");
        self.text.push_str(text);
        self.text.push('\n');
    }

    /// Append a `[NAME]` section line
    pub fn section(&mut self, name: &str) {
        self.text.push('[');
        self.text.push_str(name);
        self.text.push_str("]\n");
    }

    /// Append an integer value to the pending line
    pub fn integer(&mut self, value: u32) -> &mut Self {
        self.line.push(value.to_string());
        self
    }

    /// Append a double value to the pending line
    pub fn double(&mut self, value: f64) -> &mut Self {
        self.line.push(value.to_string());
        self
    }

    /// Append a bool value (1/0) to the pending line
    pub fn boolean(&mut self, value: bool) -> &mut Self {
        self.line.push(if value { "1" } else { "0" }.to_string());
        self
    }

    /// Append a quoted string value to the pending line
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.line.push(escape(value));
        self
    }

    /// Append a comma-joined identifier list to the pending line
    pub fn identifiers(&mut self, ids: &[ElementId]) -> &mut Self {
        self.line.push(
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        self
    }

    /// Append a comma-joined `id,weight` pair list to the pending line
    pub fn weighted_pairs(&mut self, pairs: &[(ElementId, f64)]) -> &mut Self {
        self.line.push(
            pairs
                .iter()
                .map(|(id, w)| format!("{}:{}", id, w))
                .collect::<Vec<_>>()
                .join(","),
        );
        self
    }

    /// Terminate the pending line
    pub fn end_line(&mut self) {
        for value in self.line.drain(..) {
            self.text.push_str(&value);
            self.text.push(';');
        }
        self.text.push('\n');
    }

    /// Finished file content
    pub fn finish(self) -> String {
        self.text
    }
}

/// Parse a comma-joined identifier list
pub fn parse_identifiers(value: &str) -> OlapResult<Vec<ElementId>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| OlapError::CorruptFile(format!("bad identifier '{}'", part)))
        })
        .collect()
}

/// Parse a comma-joined `id:weight` pair list
pub fn parse_weighted_pairs(value: &str) -> OlapResult<Vec<(ElementId, f64)>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|pair| {
            let (id, weight) = pair
                .split_once(':')
                .ok_or_else(|| OlapError::CorruptFile(format!("bad pair '{}'", pair)))?;
            let id = id
                .trim()
                .parse()
                .map_err(|_| OlapError::CorruptFile(format!("bad identifier '{}'", id)))?;
            let weight = weight
                .trim()
                .parse()
                .map_err(|_| OlapError::CorruptFile(format!("bad weight '{}'", weight)))?;
            Ok((id, weight))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_round_trip() {
        let line = format!("{};{};", escape("plain"), escape("with \"quotes\"; and ;"));
        let values = parse_line(&line);
        assert_eq!(values, vec!["plain", "with \"quotes\"; and ;"]);
    }

    #[test]
    fn test_builder_lines() {
        let mut b = LineBuilder::new();
        b.comment("header");
        b.section("DATA");
        b.integer(3).string("a;b").boolean(true);
        b.end_line();
        let text = b.finish();
        assert_eq!(text, "# header\n[DATA]\n3;\"a;b\";1;\n");
    }

    #[test]
    fn test_weighted_pairs_round_trip() {
        let mut b = LineBuilder::new();
        b.weighted_pairs(&[(1, 1.0), (2, 2.5)]);
        b.end_line();
        let text = b.finish();
        let values = parse_line(text.trim_end());
        assert_eq!(
            parse_weighted_pairs(&values[0]).unwrap(),
            vec![(1, 1.0), (2, 2.5)]
        );
    }

    #[test]
    fn test_error_line() {
        let line = error_line(&OlapError::DatabaseNotFound("Demo".to_string()));
        assert_eq!(line, "200;\"database not found\";\"database not found: Demo\"\n");
    }

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(parse_identifiers("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_identifiers("").unwrap(), Vec::<ElementId>::new());
        assert!(parse_identifiers("1,x").is_err());
    }
}
