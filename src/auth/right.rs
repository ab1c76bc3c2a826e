// Rights scale and right objects
// Rights are graded N < R < W < D < S; the splash right S is only
// meaningful for the cell-data right object

use serde::{Deserialize, Serialize};

/// Access right on the five-level scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Right {
    None,
    Read,
    Write,
    Delete,
    Splash,
}

impl Right {
    /// Parse the one-character cell value; anything unknown reads as N
    pub fn from_cell(value: &str) -> Self {
        match value {
            "S" => Right::Splash,
            "D" => Right::Delete,
            "W" => Right::Write,
            "R" => Right::Read,
            _ => Right::None,
        }
    }

    /// One-character wire form
    pub fn as_char(self) -> char {
        match self {
            Right::None => 'N',
            Right::Read => 'R',
            Right::Write => 'W',
            Right::Delete => 'D',
            Right::Splash => 'S',
        }
    }

    /// Clamp S down to D, for right objects other than cell data
    pub fn clamp_to_delete(self) -> Self {
        if self == Right::Splash {
            Right::Delete
        } else {
            self
        }
    }
}

/// Right objects in their fixed wire order
///
/// The order is part of the on-disk and wire contract and must not change.
pub const RIGHT_OBJECT_NAMES: [&str; 14] = [
    "user",
    "password",
    "group",
    "database",
    "cube",
    "dimension",
    "dimension element",
    "cell data",
    "rights",
    "system operations",
    "event processor",
    "sub-set view",
    "user info",
    "rule",
];

/// Named capability graded per role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightObject {
    User = 0,
    Password = 1,
    Group = 2,
    Database = 3,
    Cube = 4,
    Dimension = 5,
    DimensionElement = 6,
    CellData = 7,
    Rights = 8,
    SystemOperations = 9,
    EventProcessor = 10,
    SubsetView = 11,
    UserInfo = 12,
    Rule = 13,
}

impl RightObject {
    /// Element name in the right-object dimension
    pub fn name(self) -> &'static str {
        RIGHT_OBJECT_NAMES[self as usize]
    }

    /// All right objects in wire order
    pub fn all() -> [RightObject; 14] {
        [
            RightObject::User,
            RightObject::Password,
            RightObject::Group,
            RightObject::Database,
            RightObject::Cube,
            RightObject::Dimension,
            RightObject::DimensionElement,
            RightObject::CellData,
            RightObject::Rights,
            RightObject::SystemOperations,
            RightObject::EventProcessor,
            RightObject::SubsetView,
            RightObject::UserInfo,
            RightObject::Rule,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_order() {
        assert!(Right::None < Right::Read);
        assert!(Right::Read < Right::Write);
        assert!(Right::Write < Right::Delete);
        assert!(Right::Delete < Right::Splash);
    }

    #[test]
    fn test_cell_round_trip() {
        for right in [Right::None, Right::Read, Right::Write, Right::Delete, Right::Splash] {
            assert_eq!(Right::from_cell(&right.as_char().to_string()), right);
        }
        assert_eq!(Right::from_cell("?"), Right::None);
    }

    #[test]
    fn test_splash_clamp() {
        assert_eq!(Right::Splash.clamp_to_delete(), Right::Delete);
        assert_eq!(Right::Write.clamp_to_delete(), Right::Write);
    }

    #[test]
    fn test_right_object_names() {
        assert_eq!(RightObject::CellData.name(), "cell data");
        assert_eq!(RightObject::Rule.name(), "rule");
        assert_eq!(RightObject::all().len(), RIGHT_OBJECT_NAMES.len());
    }
}
