// Dimension subtypes and their policies
// The subtype tag replaces the dynamic downcasts of classic OLAP servers:
// every policy difference is a function of the tag

use crate::core::{OlapError, OlapResult};
use crate::elements::ElementKind;
use serde::{Deserialize, Serialize};

/// Subtype of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionSubtype {
    /// Plain user-created dimension
    Normal,

    /// Auto-managed attribute dimension of an attributed dimension
    Attributes,

    /// System dimension holding users, groups, roles or right objects
    Rights,

    /// Mirror of a system-database dimension inside a normal database
    Alias,

    /// Meta dimension listing the cubes of the database
    CubeList,

    /// Meta dimension listing the dimensions of the database
    DimensionList,

    /// Per-database configuration dimension
    Configuration,

    /// Subset or view registry dimension
    SubsetView,

    /// User-defined info dimension
    UserInfo,
}

impl DimensionSubtype {
    /// Persistence code of the subtype
    pub fn code(self) -> u32 {
        match self {
            DimensionSubtype::Normal => 0,
            DimensionSubtype::Attributes => 2,
            DimensionSubtype::Rights => 3,
            DimensionSubtype::Alias => 4,
            DimensionSubtype::CubeList => 5,
            DimensionSubtype::DimensionList => 6,
            DimensionSubtype::Configuration => 7,
            DimensionSubtype::SubsetView => 8,
            DimensionSubtype::UserInfo => 9,
        }
    }

    /// Parse a persistence code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(DimensionSubtype::Normal),
            2 => Some(DimensionSubtype::Attributes),
            3 => Some(DimensionSubtype::Rights),
            4 => Some(DimensionSubtype::Alias),
            5 => Some(DimensionSubtype::CubeList),
            6 => Some(DimensionSubtype::DimensionList),
            7 => Some(DimensionSubtype::Configuration),
            8 => Some(DimensionSubtype::SubsetView),
            9 => Some(DimensionSubtype::UserInfo),
            _ => None,
        }
    }

    /// Wire type reported in dimension listings
    /// (0=normal, 1=system, 2=attribute, 3=user info)
    pub fn wire_type(self) -> u32 {
        match self {
            DimensionSubtype::Normal => 0,
            DimensionSubtype::Attributes => 2,
            DimensionSubtype::UserInfo => 3,
            _ => 1,
        }
    }

    /// True for dimensions that receive an auto-managed attribute
    /// dimension and attribute cube
    pub fn is_attributed(self) -> bool {
        matches!(
            self,
            DimensionSubtype::Normal | DimensionSubtype::UserInfo | DimensionSubtype::SubsetView
        )
    }

    /// Apply the subtype's element kind policy
    ///
    /// Rights, configuration, subset/view and meta dimensions store
    /// strings only; attribute dimensions reject consolidated elements.
    pub fn coerce_kind(self, kind: ElementKind) -> OlapResult<ElementKind> {
        match self {
            DimensionSubtype::Rights
            | DimensionSubtype::Configuration
            | DimensionSubtype::SubsetView
            | DimensionSubtype::CubeList
            | DimensionSubtype::DimensionList => Ok(ElementKind::Text),
            DimensionSubtype::Attributes if kind == ElementKind::Consolidated => Err(
                OlapError::InvalidPermission("attribute elements cannot be consolidated".into()),
            ),
            _ => Ok(kind),
        }
    }

    /// Default deletable flag
    pub fn default_deletable(self) -> bool {
        matches!(self, DimensionSubtype::Normal | DimensionSubtype::UserInfo)
    }

    /// Default renamable flag
    pub fn default_renamable(self) -> bool {
        matches!(self, DimensionSubtype::Normal | DimensionSubtype::UserInfo)
    }

    /// Default changable flag (structural element edits allowed)
    pub fn default_changable(self) -> bool {
        !matches!(
            self,
            DimensionSubtype::Alias | DimensionSubtype::CubeList | DimensionSubtype::DimensionList
        )
    }
}
