// Cell value type
// A cube cell holds either a double or a string, never both

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value stored in (or computed for) a single cube cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Numeric cell value
    Numeric(f64),

    /// String cell value
    Text(String),
}

impl CellValue {
    /// Default value of a numeric path (empty cell reads as 0.0)
    pub fn default_numeric() -> Self {
        CellValue::Numeric(0.0)
    }

    /// Default value of a string path (empty cell reads as "")
    pub fn default_text() -> Self {
        CellValue::Text(String::new())
    }

    /// True for `Numeric`
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Numeric(_))
    }

    /// True for `Text`
    pub fn is_text(&self) -> bool {
        matches!(self, CellValue::Text(_))
    }

    /// Numeric content, if any
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            CellValue::Numeric(v) => Some(*v),
            CellValue::Text(_) => None,
        }
    }

    /// String content, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Numeric(_) => None,
            CellValue::Text(s) => Some(s),
        }
    }

    /// True if the value equals the type default (0.0 or "")
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Numeric(v) => *v == 0.0,
            CellValue::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Numeric(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Numeric(v)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(CellValue::default_numeric(), CellValue::Numeric(0.0));
        assert_eq!(CellValue::default_text(), CellValue::Text(String::new()));
        assert!(CellValue::default_numeric().is_empty());
        assert!(CellValue::default_text().is_empty());
    }

    #[test]
    fn test_accessors() {
        let v = CellValue::Numeric(1.5);
        assert!(v.is_numeric());
        assert_eq!(v.as_numeric(), Some(1.5));
        assert_eq!(v.as_text(), None);

        let s = CellValue::from("hello");
        assert!(s.is_text());
        assert_eq!(s.as_text(), Some("hello"));
        assert!(!s.is_empty());
    }
}
