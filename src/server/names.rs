// Reserved object names
// The `#_` prefix marks auto-managed dimensions and cubes; these names
// are fixed by the wire protocol and the on-disk format

/// Name of the system database
pub const SYSTEM_DATABASE: &str = "#_SYSTEM_";

// system database dimensions
pub const USER_DIMENSION: &str = "#_USER_";
pub const USER_PROPERTIES_DIMENSION: &str = "#_USER_PROPERTIES_";
pub const GROUP_DIMENSION: &str = "#_GROUP_";
pub const GROUP_PROPERTIES_DIMENSION: &str = "#_GROUP_PROPERTIES_";
pub const ROLE_DIMENSION: &str = "#_ROLE_";
pub const ROLE_PROPERTIES_DIMENSION: &str = "#_ROLE_PROPERTIES_";
pub const RIGHT_OBJECT_DIMENSION: &str = "#_RIGHT_OBJECT_";

// system database cubes
pub const USER_USER_PROPERTIES_CUBE: &str = "#_USER_USER_PROPERTIES";
pub const GROUP_GROUP_PROPERTIES_CUBE: &str = "#_GROUP_GROUP_PROPERTIES";
pub const ROLE_ROLE_PROPERTIES_CUBE: &str = "#_ROLE_ROLE_PROPERTIES";
pub const USER_GROUP_CUBE: &str = "#_USER_GROUP";
pub const ROLE_RIGHT_OBJECT_CUBE: &str = "#_ROLE_RIGHT_OBJECT";
pub const GROUP_ROLE_CUBE: &str = "#_GROUP_ROLE";

// per-database meta dimensions
pub const CUBE_DIMENSION: &str = "#_CUBE_";
pub const DIMENSION_DIMENSION: &str = "#_DIMENSION_";
pub const CONFIGURATION_DIMENSION: &str = "#_CONFIGURATION_";
pub const CONFIGURATION_CUBE: &str = "#_CONFIGURATION";
pub const SUBSET_DIMENSION: &str = "#_SUBSET_";
pub const VIEW_DIMENSION: &str = "#_VIEW_";

// per-database rights and subset/view cubes
pub const GROUP_CUBE_DATA_CUBE: &str = "#_GROUP_CUBE_DATA";
pub const GROUP_DIMENSION_DATA_PREFIX: &str = "#_GROUP_DIMENSION_DATA_";
pub const SUBSET_LOCAL_CUBE: &str = "#_SUBSET_LOCAL";
pub const SUBSET_GLOBAL_CUBE: &str = "#_SUBSET_GLOBAL";
pub const VIEW_LOCAL_CUBE: &str = "#_VIEW_LOCAL";
pub const VIEW_GLOBAL_CUBE: &str = "#_VIEW_GLOBAL";

// attribute companions of an attributed dimension
pub const ATTRIBUTE_DIMENSION_PREFIX: &str = "#_";
pub const ATTRIBUTE_DIMENSION_SUFFIX: &str = "_";
pub const ATTRIBUTE_CUBE_PREFIX: &str = "#_";

// configuration cube elements
pub const CLIENT_CACHE_ELEMENT: &str = "ClientCache";
pub const HIDE_ELEMENTS_ELEMENT: &str = "HideElements";

// well-known principals
pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin";
pub const POWER_USER_NAME: &str = "poweruser";
pub const EDITOR_NAME: &str = "editor";
pub const VIEWER_NAME: &str = "viewer";
pub const PASSWORD_PROPERTY: &str = "password";

/// Name of the attribute dimension of an attributed dimension
pub fn attribute_dimension_name(dimension: &str) -> String {
    format!(
        "{}{}{}",
        ATTRIBUTE_DIMENSION_PREFIX, dimension, ATTRIBUTE_DIMENSION_SUFFIX
    )
}

/// Name of the attribute cube of an attributed dimension
pub fn attribute_cube_name(dimension: &str) -> String {
    format!("{}{}", ATTRIBUTE_CUBE_PREFIX, dimension)
}

/// Name of the per-dimension rights cube of a normal dimension
pub fn group_dimension_data_cube_name(dimension: &str) -> String {
    format!("{}{}", GROUP_DIMENSION_DATA_PREFIX, dimension)
}
