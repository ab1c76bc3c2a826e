// User objects and the user registry
// Role rights and per-database data rights are cached on the user and
// rebuilt when the owning scope's rights token moves on

use crate::auth::Right;
use crate::core::{CubeId, DatabaseId, DimensionId, ElementId, Identifier};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Cached per-database data rights of one user
#[derive(Debug, Clone, Default)]
pub struct DatabaseRights {
    /// Rights token of the database these caches were built against
    pub seen_token: u32,

    /// Cached cube data rights
    pub cube_rights: HashMap<CubeId, Right>,

    /// Cached dimension element rights
    pub element_rights: HashMap<(DimensionId, ElementId), Right>,
}

/// OLAP user
///
/// Internal users are elements of the system user dimension; external
/// users come from an authentication worker and carry their group names.
#[derive(Debug, Clone)]
pub struct User {
    /// Element id in the user dimension, or a synthetic id for externals
    pub id: Identifier,

    /// User name
    pub name: String,

    /// True for worker-authenticated users
    pub external: bool,

    /// Group names of an external user
    pub external_groups: Vec<String>,

    /// Cached role rights in right-object order, when valid
    pub role_rights: Option<[Right; 14]>,

    /// Cached per-database data rights
    pub database_rights: HashMap<DatabaseId, DatabaseRights>,
}

impl User {
    /// Internal user backed by a user-dimension element
    pub fn internal(id: Identifier, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            external: false,
            external_groups: Vec::new(),
            role_rights: None,
            database_rights: HashMap::new(),
        }
    }

    /// External user with worker-supplied groups
    pub fn external(id: Identifier, name: &str, groups: Vec<String>) -> Self {
        Self {
            id,
            name: name.to_string(),
            external: true,
            external_groups: groups,
            role_rights: None,
            database_rights: HashMap::new(),
        }
    }

    /// Drop every cached right
    pub fn refresh(&mut self) {
        self.role_rights = None;
        self.database_rights.clear();
    }
}

/// Registry of user objects and the per-database rights tokens
///
/// Interior mutability lets rights queries fill caches behind shared
/// server borrows; all access stays on the dispatch thread.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<Identifier, User>>,
    rights_tokens: RwLock<HashMap<DatabaseId, u32>>,
    next_external_id: RwLock<Identifier>,
}

/// External user ids start above the element id range
const EXTERNAL_ID_BASE: Identifier = 0x4000_0000;

impl UserRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            rights_tokens: RwLock::new(HashMap::new()),
            next_external_id: RwLock::new(EXTERNAL_ID_BASE),
        }
    }

    /// Register an internal user; an existing entry is kept
    pub fn register_internal(&self, id: Identifier, name: &str) {
        self.users
            .write()
            .entry(id)
            .or_insert_with(|| User::internal(id, name));
    }

    /// Register an external user under a fresh synthetic id
    pub fn register_external(&self, name: &str, groups: Vec<String>) -> Identifier {
        let mut next = self.next_external_id.write();
        let id = *next;
        *next += 1;
        drop(next);

        self.users.write().insert(id, User::external(id, name, groups));
        id
    }

    /// Remove a user object
    pub fn remove(&self, id: Identifier) {
        self.users.write().remove(&id);
    }

    /// Snapshot of a user object
    pub fn get(&self, id: Identifier) -> Option<User> {
        self.users.read().get(&id).cloned()
    }

    /// User name, if registered
    pub fn name_of(&self, id: Identifier) -> Option<String> {
        self.users.read().get(&id).map(|u| u.name.clone())
    }

    /// User id by name
    pub fn find_by_name(&self, name: &str) -> Option<Identifier> {
        self.users
            .read()
            .values()
            .find(|u| u.name.eq_ignore_ascii_case(name))
            .map(|u| u.id)
    }

    /// Replace a user object after recomputing its caches
    pub fn store(&self, user: User) {
        self.users.write().insert(user.id, user);
    }

    /// Drop the cached rights of every user
    ///
    /// Called when the system database's authorization cubes change.
    pub fn refresh_all(&self) {
        for user in self.users.write().values_mut() {
            user.refresh();
        }
    }

    /// Current rights token of a database (starts at 1)
    pub fn rights_token(&self, database: DatabaseId) -> u32 {
        *self.rights_tokens.read().get(&database).unwrap_or(&1)
    }

    /// Bump a database's rights token after a rights-cube write
    pub fn bump_rights_token(&self, database: DatabaseId) {
        let mut tokens = self.rights_tokens.write();
        let entry = tokens.entry(database).or_insert(1);
        *entry = entry.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = UserRegistry::new();
        registry.register_internal(0, "admin");
        assert_eq!(registry.name_of(0), Some("admin".to_string()));
        assert_eq!(registry.find_by_name("ADMIN"), Some(0));
    }

    #[test]
    fn test_external_ids_are_synthetic() {
        let registry = UserRegistry::new();
        let a = registry.register_external("ext-a", vec!["g1".into()]);
        let b = registry.register_external("ext-b", vec![]);
        assert!(a >= EXTERNAL_ID_BASE);
        assert_eq!(b, a + 1);
        assert!(registry.get(a).unwrap().external);
    }

    #[test]
    fn test_refresh_all_drops_caches() {
        let registry = UserRegistry::new();
        registry.register_internal(0, "admin");

        let mut user = registry.get(0).unwrap();
        user.role_rights = Some([Right::Delete; 14]);
        registry.store(user);

        registry.refresh_all();
        assert!(registry.get(0).unwrap().role_rights.is_none());
    }

    #[test]
    fn test_rights_tokens() {
        let registry = UserRegistry::new();
        assert_eq!(registry.rights_token(2), 1);
        registry.bump_rights_token(2);
        assert_eq!(registry.rights_token(2), 2);
        assert_eq!(registry.rights_token(0), 1);
    }
}
