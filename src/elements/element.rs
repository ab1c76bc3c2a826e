// Element type
// An element is identified inside its dimension by id, name and position

use crate::core::ElementId;
use serde::{Deserialize, Serialize};

/// Kind of a dimension element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Holds numeric cell values
    Numeric,

    /// Holds string cell values
    Text,

    /// Aggregates a weighted list of children
    Consolidated,
}

impl ElementKind {
    /// Wire code of the element kind (1=numeric, 2=string, 4=consolidated)
    pub fn code(self) -> u32 {
        match self {
            ElementKind::Numeric => 1,
            ElementKind::Text => 2,
            ElementKind::Consolidated => 4,
        }
    }

    /// Parse a wire code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ElementKind::Numeric),
            2 => Some(ElementKind::Text),
            4 => Some(ElementKind::Consolidated),
            _ => None,
        }
    }
}

/// Element of a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Dimension-local identifier
    pub id: ElementId,

    /// Display name, unique per dimension (case-insensitive)
    pub name: String,

    /// Dense position used for stable ordering
    pub position: u32,

    /// Element kind
    pub kind: ElementKind,

    /// Ordered weighted children (consolidated elements only)
    pub children: Vec<(ElementId, f64)>,

    /// Back-edges to consolidated parents
    pub parents: Vec<ElementId>,
}

impl Element {
    /// Create a new element without any edges
    pub fn new(id: ElementId, name: String, position: u32, kind: ElementKind) -> Self {
        Self {
            id,
            name,
            position,
            kind,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// True if the element is not consolidated
    pub fn is_base(&self) -> bool {
        self.kind != ElementKind::Consolidated
    }

    /// Weight of a direct child, if present
    pub fn child_weight(&self, child: ElementId) -> Option<f64> {
        self.children
            .iter()
            .find(|(id, _)| *id == child)
            .map(|(_, w)| *w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(ElementKind::Numeric.code(), 1);
        assert_eq!(ElementKind::Text.code(), 2);
        assert_eq!(ElementKind::Consolidated.code(), 4);
        assert_eq!(ElementKind::from_code(4), Some(ElementKind::Consolidated));
        assert_eq!(ElementKind::from_code(3), None);
    }

    #[test]
    fn test_base_flag() {
        let e = Element::new(0, "jan".to_string(), 0, ElementKind::Numeric);
        assert!(e.is_base());
        let c = Element::new(1, "q1".to_string(), 1, ElementKind::Consolidated);
        assert!(!c.is_base());
    }
}
