// Server - root of the object tree
// Owns the database arena, the session and user registries and the
// dispatch state; every handler-level operation enters through here

use crate::auth::{SessionRegistry, UserRegistry};
use crate::core::{
    CubeId, DatabaseId, DimensionId, ElementId, Identifier, OlapError, OlapResult, ServerOptions,
    SessionId,
};
use crate::cubes::CubeSubtype;
use crate::dimensions::{Dimension, DimensionSubtype};
use crate::elements::ElementKind;
use crate::locks::{DeferredRequest, EventLock};
use crate::rules::{derive_markers, Rule};
use crate::server::state::SYSTEM_USERNAME;
use crate::server::{names, system, Database, DatabaseSubtype, ServerState};
use crate::tokens::Token;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// Outcome of a dispatched request: completed, or parked on a semaphore
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    Done(T),
    Suspended(crate::core::SemaphoreId),
}

impl<T> Dispatch<T> {
    /// Unwrap a completed dispatch in contexts that cannot suspend
    pub fn expect_done(self) -> OlapResult<T> {
        match self {
            Dispatch::Done(value) => Ok(value),
            Dispatch::Suspended(_) => Err(OlapError::Internal(
                "request suspended unexpectedly".to_string(),
            )),
        }
    }
}

/// OLAP server
pub struct Server {
    /// Version counter over everything the server owns
    pub token: Token,

    /// Start-up options
    pub options: ServerOptions,

    /// Dispatch state (event lock, semaphores, marker set)
    pub state: ServerState,

    /// Session registry
    pub sessions: SessionRegistry,

    /// User registry and rights caches
    pub users: UserRegistry,

    /// The distinguished system database
    pub system_database: Option<DatabaseId>,

    /// Persistence root; `None` keeps the server memory-only
    pub root: Option<PathBuf>,

    databases: Vec<Option<Database>>,
    free_databases: BTreeSet<DatabaseId>,
    database_names: HashMap<String, DatabaseId>,
}

impl Server {
    /// Create a memory-only server with a fresh system database
    pub fn new() -> OlapResult<Self> {
        Self::with_options(ServerOptions::default())
    }

    /// Create a memory-only server with explicit options
    pub fn with_options(options: ServerOptions) -> OlapResult<Self> {
        let mut server = Self::bare(options);
        system::create_system_database(&mut server)?;
        Ok(server)
    }

    /// Server shell without a system database; the loader fills it
    pub(crate) fn bare(options: ServerOptions) -> Self {
        Self {
            token: Token::new(),
            options,
            state: ServerState::new(),
            sessions: SessionRegistry::new(),
            users: UserRegistry::new(),
            system_database: None,
            root: None,
            databases: Vec::new(),
            free_databases: BTreeSet::new(),
            database_names: HashMap::new(),
        }
    }

    // database arena

    /// Reserve the next database identifier
    pub fn fetch_database_id(&mut self) -> DatabaseId {
        match self.free_databases.iter().next().copied() {
            Some(id) => {
                self.free_databases.remove(&id);
                id
            }
            None => {
                self.databases.push(None);
                (self.databases.len() - 1) as DatabaseId
            }
        }
    }

    /// Insert a constructed database into its reserved slot
    pub fn register_database(&mut self, database: Database) -> OlapResult<DatabaseId> {
        let key = database.name.to_lowercase();
        if self.database_names.contains_key(&key) {
            return Err(OlapError::DatabaseNameInUse(database.name));
        }
        let id = database.id;
        while self.databases.len() <= id as usize {
            self.free_databases.insert(self.databases.len() as DatabaseId);
            self.databases.push(None);
        }
        if self.databases[id as usize].is_some() {
            return Err(OlapError::Internal(format!("database slot {} not free", id)));
        }
        self.free_databases.remove(&id);
        self.database_names.insert(key, id);
        self.databases[id as usize] = Some(database);
        self.token.bump();
        Ok(id)
    }

    /// Database by id, if present
    pub fn lookup_database(&self, id: DatabaseId) -> Option<&Database> {
        self.databases.get(id as usize).and_then(|d| d.as_ref())
    }

    /// Database by id
    pub fn database(&self, id: DatabaseId) -> OlapResult<&Database> {
        self.lookup_database(id)
            .ok_or_else(|| OlapError::DatabaseNotFound(format!("database id {}", id)))
    }

    /// Mutable database by id
    pub fn database_mut(&mut self, id: DatabaseId) -> OlapResult<&mut Database> {
        self.databases
            .get_mut(id as usize)
            .and_then(|d| d.as_mut())
            .ok_or_else(|| OlapError::DatabaseNotFound(format!("database id {}", id)))
    }

    /// Database by name, case-insensitive
    pub fn find_database_by_name(&self, name: &str) -> OlapResult<&Database> {
        self.database_names
            .get(&name.to_lowercase())
            .and_then(|id| self.lookup_database(*id))
            .ok_or_else(|| OlapError::DatabaseNotFound(name.to_string()))
    }

    /// Live databases in id order
    pub fn databases(&self) -> impl Iterator<Item = &Database> {
        self.databases.iter().filter_map(|d| d.as_ref())
    }

    /// Number of live databases
    pub fn database_count(&self) -> usize {
        self.databases().count()
    }

    /// The system database
    pub fn system(&self) -> OlapResult<&Database> {
        let id = self
            .system_database
            .ok_or_else(|| OlapError::Internal("system database missing".to_string()))?;
        self.database(id)
    }

    // dimension resolution

    /// Dimension with alias indirection resolved
    ///
    /// An alias dimension reads and writes through its system-database
    /// source dimension.
    pub fn resolve_dimension(
        &self,
        database: DatabaseId,
        dimension: DimensionId,
    ) -> OlapResult<&Dimension> {
        let dim = self.database(database)?.dimension(dimension)?;
        match (dim.subtype, dim.alias_source, self.system_database) {
            (DimensionSubtype::Alias, Some(source), Some(system)) => {
                self.database(system)?.dimension(source)
            }
            _ => Ok(dim),
        }
    }

    /// Location (database, dimension) after alias indirection
    pub fn resolve_dimension_location(
        &self,
        database: DatabaseId,
        dimension: DimensionId,
    ) -> OlapResult<(DatabaseId, DimensionId)> {
        let dim = self.database(database)?.dimension(dimension)?;
        match (dim.subtype, dim.alias_source, self.system_database) {
            (DimensionSubtype::Alias, Some(source), Some(system)) => Ok((system, source)),
            _ => Ok((database, dimension)),
        }
    }

    // token propagation

    /// Bump the database and server tokens
    pub fn touch_database(&mut self, database: DatabaseId) -> OlapResult<()> {
        let db = self.database_mut(database)?;
        db.mark_changed();
        db.token.bump();
        self.token.bump();
        Ok(())
    }

    /// Bump the dimension, database and server tokens
    pub fn touch_dimension(&mut self, database: DatabaseId, dimension: DimensionId) -> OlapResult<()> {
        let db = self.database_mut(database)?;
        db.dimension_mut(dimension)?.token.bump();
        db.mark_changed();
        db.token.bump();
        self.token.bump();
        Ok(())
    }

    /// Bump the cube, cube client-cache, database and server tokens
    pub fn touch_cube(&mut self, database: DatabaseId, cube: CubeId) -> OlapResult<()> {
        let db = self.database_mut(database)?;
        db.cube_mut(cube)?.bump_tokens();
        db.mark_changed();
        db.token.bump();
        self.token.bump();
        Ok(())
    }

    // database lifecycle

    fn check_database_name(name: &str) -> OlapResult<()> {
        if name.is_empty() || name.len() > 255 {
            return Err(OlapError::InvalidDatabaseName(name.to_string()));
        }
        if name.starts_with('#') || name.starts_with(' ') || name.ends_with(' ') {
            return Err(OlapError::InvalidDatabaseName(name.to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ' || c == '.')
        {
            return Err(OlapError::InvalidDatabaseName(name.to_string()));
        }
        Ok(())
    }

    /// Create a normal database with its system companions
    pub fn add_database(&mut self, name: &str, user: Option<Identifier>) -> OlapResult<DatabaseId> {
        self.check_role_right(user, crate::auth::RightObject::Database, crate::auth::Right::Write)?;
        Self::check_database_name(name)?;

        let id = self.fetch_database_id();
        let database = Database::new(id, name, DatabaseSubtype::Normal);
        if let Err(err) = self.register_database(database) {
            self.free_databases.insert(id);
            return Err(err);
        }

        if let Err(err) = system::init_normal_database(self, id) {
            log::error!("system companions of database '{}' failed: {}", name, err);
            self.drop_database_entry(id);
            return Err(err);
        }

        log::info!("created database '{}'", name);
        self.token.bump();
        Ok(id)
    }

    /// Detach a database slot for an in-place reload
    pub(crate) fn forget_database_entry(&mut self, id: DatabaseId, lowercase_name: &str) {
        self.database_names.remove(lowercase_name);
        if let Some(slot) = self.databases.get_mut(id as usize) {
            *slot = None;
        }
    }

    fn drop_database_entry(&mut self, id: DatabaseId) {
        if let Some(database) = self.databases.get_mut(id as usize).and_then(|d| d.take()) {
            self.database_names.remove(&database.name.to_lowercase());
            self.free_databases.insert(id);
        }
    }

    /// Delete a database and its files
    pub fn delete_database(&mut self, id: DatabaseId, user: Option<Identifier>) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Database, crate::auth::Right::Delete)?;

        let (name, deletable) = {
            let database = self.database(id)?;
            (database.name.clone(), database.deletable)
        };
        if !deletable {
            return Err(OlapError::DatabaseUndeletable(name));
        }

        self.drop_database_entry(id);
        self.token.bump();

        if let Some(root) = &self.root {
            let dir = root.join(&name);
            if dir.exists() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    log::error!("cannot remove database directory '{}': {}", dir.display(), err);
                    log::error!("please check the underlying file system for errors");
                    std::process::exit(1);
                }
            }
        }

        log::info!("deleted database '{}'", name);
        Ok(())
    }

    /// Rename a database and its directory
    pub fn rename_database(
        &mut self,
        id: DatabaseId,
        new_name: &str,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Database, crate::auth::Right::Write)?;
        Self::check_database_name(new_name)?;

        let (old_name, renamable) = {
            let database = self.database(id)?;
            (database.name.clone(), database.renamable)
        };
        if !renamable {
            return Err(OlapError::DatabaseUnrenamable(old_name));
        }
        if old_name == new_name {
            return Ok(());
        }
        if old_name.to_lowercase() != new_name.to_lowercase()
            && self.database_names.contains_key(&new_name.to_lowercase())
        {
            return Err(OlapError::DatabaseNameInUse(new_name.to_string()));
        }

        if let Some(root) = &self.root {
            let old_dir = root.join(&old_name);
            if old_dir.exists() {
                if let Err(err) = std::fs::rename(&old_dir, root.join(new_name)) {
                    log::error!("cannot rename database directory: {}", err);
                    return Err(OlapError::RenameFailed(old_name));
                }
            }
        }

        self.database_names.remove(&old_name.to_lowercase());
        self.database_names.insert(new_name.to_lowercase(), id);
        self.database_mut(id)?.name = new_name.to_string();
        self.token.bump();
        Ok(())
    }

    // dimension and cube lifecycle

    /// Create a dimension in a database
    pub fn create_dimension(
        &mut self,
        database: DatabaseId,
        name: &str,
        user: Option<Identifier>,
        user_info: bool,
    ) -> OlapResult<DimensionId> {
        self.check_role_right(user, crate::auth::RightObject::Dimension, crate::auth::Right::Write)?;
        if user.is_some() && name.starts_with('#') {
            return Err(OlapError::DimensionNameInUse(format!(
                "'{}' is reserved",
                name
            )));
        }

        let subtype = if user_info {
            DimensionSubtype::UserInfo
        } else {
            DimensionSubtype::Normal
        };

        let (username, event) = self.journal_identity(user);
        let db = self.database_mut(database)?;
        db.check_loaded()?;
        let id = db.create_dimension(name, subtype)?;
        db.journal_record(
            &username,
            &event,
            "addDimension",
            vec![id.to_string(), name.to_string(), subtype.code().to_string()],
        );
        self.touch_database(database)?;
        Ok(id)
    }

    /// Delete a dimension
    pub fn delete_dimension(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Dimension, crate::auth::Right::Delete)?;

        let (username, event) = self.journal_identity(user);
        let db = self.database_mut(database)?;
        db.check_loaded()?;
        db.delete_dimension(dimension)?;
        db.journal_record(&username, &event, "deleteDimension", vec![dimension.to_string()]);
        self.touch_database(database)
    }

    /// Rename a dimension
    pub fn rename_dimension(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        new_name: &str,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Dimension, crate::auth::Right::Write)?;
        if user.is_some() && new_name.starts_with('#') {
            return Err(OlapError::DimensionNameInUse(format!(
                "'{}' is reserved",
                new_name
            )));
        }

        let (username, event) = self.journal_identity(user);
        let db = self.database_mut(database)?;
        db.check_loaded()?;
        db.rename_dimension(dimension, new_name)?;
        db.journal_record(
            &username,
            &event,
            "renameDimension",
            vec![dimension.to_string(), new_name.to_string()],
        );
        self.touch_database(database)
    }

    /// Create a cube over named dimensions
    pub fn create_cube(
        &mut self,
        database: DatabaseId,
        name: &str,
        dimensions: Vec<DimensionId>,
        user: Option<Identifier>,
        user_info: bool,
    ) -> OlapResult<CubeId> {
        self.check_role_right(user, crate::auth::RightObject::Cube, crate::auth::Right::Write)?;
        if user.is_some() && name.starts_with('#') {
            return Err(OlapError::CubeNameInUse(format!("'{}' is reserved", name)));
        }

        let subtype = if user_info {
            CubeSubtype::UserInfo
        } else {
            CubeSubtype::Normal
        };

        let (username, event) = self.journal_identity(user);
        let db = self.database_mut(database)?;
        db.check_loaded()?;
        let id = db.create_cube(name, dimensions.clone(), subtype)?;
        db.journal_record(
            &username,
            &event,
            "addCube",
            vec![
                id.to_string(),
                name.to_string(),
                dimensions
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ],
        );
        self.touch_database(database)?;
        Ok(id)
    }

    /// Delete a cube
    pub fn delete_cube(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Cube, crate::auth::Right::Delete)?;

        let (username, event) = self.journal_identity(user);
        let db = self.database_mut(database)?;
        db.check_loaded()?;
        db.delete_cube(cube)?;
        db.journal_record(&username, &event, "deleteCube", vec![cube.to_string()]);
        self.touch_database(database)
    }

    /// Rename a cube
    pub fn rename_cube(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        new_name: &str,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Cube, crate::auth::Right::Write)?;
        if user.is_some() && new_name.starts_with('#') {
            return Err(OlapError::CubeNameInUse(format!("'{}' is reserved", new_name)));
        }

        let (username, event) = self.journal_identity(user);
        let db = self.database_mut(database)?;
        db.check_loaded()?;
        db.rename_cube(cube, new_name)?;
        db.journal_record(
            &username,
            &event,
            "renameCube",
            vec![cube.to_string(), new_name.to_string()],
        );
        self.touch_database(database)
    }

    // element operations

    fn journal_identity(&self, user: Option<Identifier>) -> (String, String) {
        let name = user.and_then(|id| self.users.name_of(id));
        (
            self.state.effective_username(name.as_deref()),
            self.state.effective_event(),
        )
    }

    fn check_element_protection(
        &self,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
    ) -> OlapResult<()> {
        if self.system_database != Some(database) {
            return Ok(());
        }
        let db = self.database(database)?;
        let dim = db.dimension(dimension)?;
        let protected_dimension = [
            names::USER_DIMENSION,
            names::GROUP_DIMENSION,
            names::ROLE_DIMENSION,
        ]
        .iter()
        .any(|n| dim.name.eq_ignore_ascii_case(n));

        if protected_dimension {
            let e = dim.find_element(element)?;
            if e.name.eq_ignore_ascii_case(names::ADMIN_NAME) {
                return Err(OlapError::ElementUndeletable(format!(
                    "'{}' in '{}'",
                    e.name, dim.name
                )));
            }
        }
        Ok(())
    }

    fn rights_structure_changed(&mut self, database: DatabaseId) {
        if self.system_database == Some(database) {
            self.users.refresh_all();
        } else {
            self.users.bump_rights_token(database);
        }
    }

    /// Add an element to a dimension
    pub fn add_element(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        name: &str,
        kind: ElementKind,
        user: Option<Identifier>,
    ) -> OlapResult<ElementId> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Write,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        let dim = db.dimension_mut(dimension)?;
        if user.is_some() {
            dim.check_changable()?;
        }
        let id = dim.add_element(name, kind)?;
        db.journal_record(
            &username,
            &event,
            "addElement",
            vec![
                dimension.to_string(),
                id.to_string(),
                name.to_string(),
                kind.code().to_string(),
            ],
        );
        self.touch_dimension(database, dimension)?;
        Ok(id)
    }

    /// Delete an element, cascading to cells and rules
    pub fn delete_element(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Delete,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        self.check_element_protection(database, dimension, element)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        if user.is_some() {
            db.dimension(dimension)?.check_changable()?;
        }
        db.delete_element_cascading(dimension, element)?;
        db.journal_record(
            &username,
            &event,
            "deleteElement",
            vec![dimension.to_string(), element.to_string()],
        );
        self.rights_structure_changed(database);
        self.touch_dimension(database, dimension)?;
        Ok(())
    }

    /// Rename an element
    pub fn rename_element(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
        new_name: &str,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Write,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        self.check_element_protection(database, dimension, element)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        if user.is_some() {
            db.dimension(dimension)?.check_changable()?;
        }
        db.dimension_mut(dimension)?.rename_element(element, new_name)?;
        db.journal_record(
            &username,
            &event,
            "renameElement",
            vec![dimension.to_string(), element.to_string(), new_name.to_string()],
        );
        self.rights_structure_changed(database);
        self.touch_dimension(database, dimension)?;
        Ok(())
    }

    /// Change an element's kind
    pub fn change_element_kind(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
        kind: ElementKind,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Write,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        if user.is_some() {
            db.dimension(dimension)?.check_changable()?;
        }
        db.dimension_mut(dimension)?.change_element_kind(element, kind)?;
        db.journal_record(
            &username,
            &event,
            "changeElementType",
            vec![
                dimension.to_string(),
                element.to_string(),
                kind.code().to_string(),
            ],
        );
        self.invalidate_cube_caches(database, dimension)?;
        self.touch_dimension(database, dimension)?;
        Ok(())
    }

    /// Append weighted children to a consolidated element
    pub fn add_children(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        parent: ElementId,
        children: &[(ElementId, f64)],
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Write,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        if user.is_some() {
            db.dimension(dimension)?.check_changable()?;
        }
        db.dimension_mut(dimension)?.add_children(parent, children)?;
        db.journal_record(
            &username,
            &event,
            "addChildren",
            vec![
                dimension.to_string(),
                parent.to_string(),
                children
                    .iter()
                    .map(|(c, w)| format!("{}:{}", c, w))
                    .collect::<Vec<_>>()
                    .join(","),
            ],
        );
        self.invalidate_cube_caches(database, dimension)?;
        self.touch_dimension(database, dimension)?;
        Ok(())
    }

    /// Remove every child of a consolidated element
    pub fn remove_children(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        parent: ElementId,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Write,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        if user.is_some() {
            db.dimension(dimension)?.check_changable()?;
        }
        db.dimension_mut(dimension)?.remove_children(parent)?;
        db.journal_record(
            &username,
            &event,
            "removeChildren",
            vec![dimension.to_string(), parent.to_string()],
        );
        self.invalidate_cube_caches(database, dimension)?;
        self.touch_dimension(database, dimension)?;
        Ok(())
    }

    /// Move an element to a new position
    pub fn move_element(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
        position: u32,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(
            user,
            crate::auth::RightObject::DimensionElement,
            crate::auth::Right::Write,
        )?;
        let (database, dimension) = self.resolve_dimension_location(database, dimension)?;
        let (username, event) = self.journal_identity(user);

        let db = self.database_mut(database)?;
        db.check_loaded()?;
        if user.is_some() {
            db.dimension(dimension)?.check_changable()?;
        }
        db.dimension_mut(dimension)?.move_element(element, position)?;
        db.journal_record(
            &username,
            &event,
            "moveElement",
            vec![dimension.to_string(), element.to_string(), position.to_string()],
        );
        self.touch_dimension(database, dimension)?;
        Ok(())
    }

    /// Drop the evaluation caches of every cube using the dimension
    fn invalidate_cube_caches(
        &mut self,
        database: DatabaseId,
        dimension: DimensionId,
    ) -> OlapResult<()> {
        let db = self.database_mut(database)?;
        for cube in db.cubes_mut() {
            if cube.uses_dimension(dimension) {
                cube.invalidate_caches();
            }
        }
        Ok(())
    }

    // rules

    /// Create a rule on a cube
    pub fn create_rule(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        text: &str,
        external_id: Option<String>,
        comment: &str,
        user: Option<Identifier>,
    ) -> OlapResult<crate::core::RuleId> {
        self.check_role_right(user, crate::auth::RightObject::Rule, crate::auth::Right::Write)?;
        self.database(database)?.check_loaded()?;

        let id = self.database_mut(database)?.cube_mut(cube)?.fetch_rule_id();
        let rule = Rule::compile(self, database, cube, id, text, external_id, comment)?;
        let markers = derive_markers(&rule, cube);

        let db = self.database_mut(database)?;
        db.cube_mut(cube)?.rules.insert(id, rule);
        db.cube_mut(cube)?.clear_rule_cache();
        for marker in markers {
            let source = marker.source_cube;
            db.cube_mut(source)?.markers.push(marker);
        }

        self.touch_cube(database, cube)?;
        Ok(id)
    }

    /// Activate or deactivate a rule
    pub fn set_rule_active(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        rule: crate::core::RuleId,
        active: bool,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Rule, crate::auth::Right::Write)?;

        let db = self.database_mut(database)?;
        let cube_ref = db.cube_mut(cube)?;
        let entry = cube_ref
            .rules
            .get_mut(&rule)
            .ok_or_else(|| OlapError::RuleNotFound(format!("rule {}", rule)))?;
        if entry.active == active {
            return Ok(());
        }
        entry.active = active;
        cube_ref.clear_rule_cache();

        if active {
            let compiled = cube_ref.rules.get(&rule).cloned();
            if let Some(compiled) = compiled {
                for marker in derive_markers(&compiled, cube) {
                    let source = marker.source_cube;
                    db.cube_mut(source)?.markers.push(marker);
                }
            }
        } else {
            for other in db.cubes_mut() {
                other
                    .markers
                    .retain(|m| !(m.rule_cube == cube && m.rule == rule));
            }
        }

        self.touch_cube(database, cube)
    }

    /// Delete a rule and its markers
    pub fn delete_rule(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        rule: crate::core::RuleId,
        user: Option<Identifier>,
    ) -> OlapResult<()> {
        self.check_role_right(user, crate::auth::RightObject::Rule, crate::auth::Right::Delete)?;

        let db = self.database_mut(database)?;
        let cube_ref = db.cube_mut(cube)?;
        if cube_ref.rules.remove(&rule).is_none() {
            return Err(OlapError::RuleNotFound(format!("rule {}", rule)));
        }
        cube_ref.clear_rule_cache();

        for other in db.cubes_mut() {
            other
                .markers
                .retain(|m| !(m.rule_cube == cube && m.rule == rule));
        }

        self.touch_cube(database, cube)
    }

    /// Verify the token preconditions a request carried
    ///
    /// Only the scopes a request names are checked; an absent token
    /// always passes.
    pub fn check_request_tokens(
        &self,
        checks: &crate::tokens::TokenChecks,
        database: Option<DatabaseId>,
        dimension: Option<(DatabaseId, DimensionId)>,
        cube: Option<(DatabaseId, CubeId)>,
    ) -> OlapResult<()> {
        checks.check_server(self.token)?;
        if let Some(db) = database {
            checks.check_database(self.database(db)?.token)?;
        }
        if let Some((db, dim)) = dimension {
            checks.check_dimension(self.database(db)?.dimension(dim)?.token)?;
        }
        if let Some((db, cube_id)) = cube {
            let cube_ref = self.database(db)?.cube(cube_id)?;
            checks.check_cube(cube_ref.token)?;
            checks.check_client_cache(cube_ref.client_cache_token)?;
        }
        Ok(())
    }

    // marker bus

    /// Record that a cube has pending marker-driven invalidation
    pub fn add_changed_marker_cube(&self, database: DatabaseId, cube: CubeId) {
        self.state
            .changed_marker_cubes
            .write()
            .insert((database, cube));
    }

    /// Drain pending marker changes for a cube before reading from it
    ///
    /// Affected rule caches were evicted per rule at write time; the drain
    /// conservatively clears the remaining memoized values of the cube.
    pub fn resolve_pending_markers(&self, database: DatabaseId, cube: CubeId) {
        let pending = {
            let mut set = self.state.changed_marker_cubes.write();
            set.remove(&(database, cube))
        };
        if pending {
            if let Ok(db) = self.database(database) {
                if let Ok(cube_ref) = db.cube(cube) {
                    cube_ref.clear_rule_cache();
                }
            }
        }
    }

    /// Recompute every pending marker cube
    pub fn trigger_marker_calculation(&self) {
        let pending: Vec<(DatabaseId, CubeId)> = {
            let mut set = self.state.changed_marker_cubes.write();
            let drained = set.iter().copied().collect();
            set.clear();
            drained
        };
        for (database, cube) in pending {
            if let Ok(db) = self.database(database) {
                if let Ok(cube_ref) = db.cube(cube) {
                    cube_ref.clear_rule_cache();
                }
            }
        }
    }

    // event lock

    /// Acquire the server event lock for a session
    pub fn begin_event(&mut self, session: SessionId, event: &str) -> OlapResult<Dispatch<()>> {
        let user = {
            let s = self.sessions.use_session(session)?;
            s.user
        };

        match &self.state.event_lock {
            Some(lock) if lock.session == session => Err(OlapError::WithinEvent),
            Some(_) => Ok(Dispatch::Suspended(self.state.server_event_semaphore)),
            None => {
                let username = user
                    .and_then(|id| self.users.name_of(id))
                    .unwrap_or_else(|| SYSTEM_USERNAME.to_string());
                self.state.event_lock = Some(EventLock {
                    session,
                    user: username,
                    event: event.to_string(),
                });
                Ok(Dispatch::Done(()))
            }
        }
    }

    /// Release the event lock and replay the suspended requests
    pub fn end_event(
        &mut self,
        session: SessionId,
    ) -> OlapResult<Vec<(DeferredRequest, OlapResult<()>)>> {
        self.sessions.use_session(session)?;
        match &self.state.event_lock {
            Some(lock) if lock.session == session => {}
            _ => return Err(OlapError::NotWithinEvent),
        }
        self.state.event_lock = None;

        let requests = self
            .state
            .semaphores
            .raise(self.state.server_event_semaphore);
        self.state.server_event_semaphore = self.state.semaphores.create();

        let mut outcomes = Vec::new();
        for request in requests {
            let outcome = self.replay_deferred(&request);
            outcomes.push((request, outcome));
        }
        Ok(outcomes)
    }

    fn replay_deferred(&mut self, request: &DeferredRequest) -> OlapResult<()> {
        match request.clone() {
            DeferredRequest::CellSet {
                session,
                database,
                cube,
                coord,
                value,
                mode,
                add,
            } => self
                .dispatch_set_cell(session, database, cube, coord, value, mode, add)?
                .expect_done(),
            DeferredRequest::CellClear {
                session,
                database,
                cube,
                coord,
            } => self
                .dispatch_clear_cell(session, database, cube, coord)?
                .expect_done(),
        }
    }

    // session lifecycle

    /// Delete a session, releasing its event lock and rolling back its
    /// cube locks
    pub fn logout(&mut self, session: SessionId) -> OlapResult<()> {
        self.sessions.delete(session)?;
        self.release_session_resources(session);
        Ok(())
    }

    /// Evict every session whose TTL has passed
    pub fn evict_expired_sessions(&mut self) -> Vec<SessionId> {
        let expired = self.sessions.expired_sessions();
        for session in &expired {
            let _ = self.sessions.delete(*session);
            self.release_session_resources(*session);
        }
        expired
    }

    fn release_session_resources(&mut self, session: SessionId) {
        if self.state.active_session() == Some(session) {
            self.state.event_lock = None;
            let requests = self
                .state
                .semaphores
                .raise(self.state.server_event_semaphore);
            self.state.server_event_semaphore = self.state.semaphores.create();
            for request in requests {
                let outcome = self.replay_deferred(&request);
                if let Err(err) = outcome {
                    log::warn!("deferred request after session end failed: {}", err);
                }
            }
        }

        // parked requests of the dead session resolve with InvalidSession
        let dropped = self.state.semaphores.evict_session(session);
        if !dropped.is_empty() {
            log::info!(
                "dropped {} suspended requests of evicted session",
                dropped.len()
            );
        }

        // roll the session's area locks back
        let db_ids: Vec<DatabaseId> = self.databases().map(|d| d.id).collect();
        for db_id in db_ids {
            let cube_ids: Vec<CubeId> = match self.database(db_id) {
                Ok(db) => db.cubes().map(|c| c.id).collect(),
                Err(_) => continue,
            };
            for cube_id in cube_ids {
                let entries = match self.database_mut(db_id).and_then(|db| db.cube_mut(cube_id)) {
                    Ok(cube) => cube.locks.evict_session(session),
                    Err(_) => continue,
                };
                if !entries.is_empty() {
                    let _ = self.apply_rollback(db_id, cube_id, entries);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creates_system_database() {
        let server = Server::new().unwrap();
        let system = server.system().unwrap();
        assert_eq!(system.name, names::SYSTEM_DATABASE);
        assert!(system.find_dimension_by_name(names::USER_DIMENSION).is_ok());
        assert!(system.find_cube_by_name(names::GROUP_ROLE_CUBE).is_ok());
    }

    #[test]
    fn test_add_database_with_companions() {
        let mut server = Server::new().unwrap();
        let db = server.add_database("Demo", None).unwrap();

        let demo = server.database(db).unwrap();
        assert!(demo.find_dimension_by_name(names::CUBE_DIMENSION).is_ok());
        assert!(demo.find_dimension_by_name(names::CONFIGURATION_DIMENSION).is_ok());
        assert!(demo.find_cube_by_name(names::GROUP_CUBE_DATA_CUBE).is_ok());

        // alias dimensions point at the system database
        let user_dim = demo.find_dimension_by_name(names::USER_DIMENSION).unwrap();
        assert_eq!(user_dim.subtype, DimensionSubtype::Alias);
        let resolved = server.resolve_dimension(db, user_dim.id).unwrap();
        assert!(resolved.graph.find_by_name(names::ADMIN_NAME).is_some());
    }

    #[test]
    fn test_database_name_validation() {
        let mut server = Server::new().unwrap();
        assert!(server.add_database("#_NOPE_", None).is_err());
        assert!(server.add_database("", None).is_err());
        assert!(server.add_database("ok-name_1", None).is_ok());
        assert!(matches!(
            server.add_database("OK-NAME_1", None),
            Err(OlapError::DatabaseNameInUse(_))
        ));
    }

    #[test]
    fn test_system_database_is_protected() {
        let mut server = Server::new().unwrap();
        let system = server.system_database.unwrap();
        assert!(matches!(
            server.delete_database(system, None),
            Err(OlapError::DatabaseUndeletable(_))
        ));
        assert!(matches!(
            server.rename_database(system, "other", None),
            Err(OlapError::DatabaseUnrenamable(_))
        ));
    }

    #[test]
    fn test_admin_element_is_protected() {
        let mut server = Server::new().unwrap();
        let system = server.system_database.unwrap();
        let (dim, admin) = {
            let db = server.database(system).unwrap();
            let dim = db.find_dimension_by_name(names::USER_DIMENSION).unwrap();
            let admin = dim.graph.find_by_name(names::ADMIN_NAME).unwrap().id;
            (dim.id, admin)
        };

        assert!(matches!(
            server.delete_element(system, dim, admin, None),
            Err(OlapError::ElementUndeletable(_))
        ));
    }

    #[test]
    fn test_token_propagation_on_element_add() {
        let mut server = Server::new().unwrap();
        let db = server.add_database("Demo", None).unwrap();
        let dim = server.create_dimension(db, "Months", None, false).unwrap();

        let server_token = server.token.value();
        let db_token = server.database(db).unwrap().token.value();
        let dim_token = server.database(db).unwrap().dimension(dim).unwrap().token.value();

        server
            .add_element(db, dim, "Jan", ElementKind::Numeric, None)
            .unwrap();

        assert!(server.token.value() > server_token);
        assert!(server.database(db).unwrap().token.value() > db_token);
        assert!(
            server.database(db).unwrap().dimension(dim).unwrap().token.value() > dim_token
        );
    }

    #[test]
    fn test_event_lock_cycle() {
        let mut server = Server::new().unwrap();
        let a = server.sessions.create(None, false, 3600);
        let b = server.sessions.create(None, false, 3600);

        assert_eq!(server.begin_event(a, "batch").unwrap(), Dispatch::Done(()));
        assert!(matches!(
            server.begin_event(a, "again"),
            Err(OlapError::WithinEvent)
        ));
        assert!(matches!(
            server.begin_event(b, "blocked").unwrap(),
            Dispatch::Suspended(_)
        ));
        assert!(matches!(server.end_event(b), Err(OlapError::NotWithinEvent)));

        let outcomes = server.end_event(a).unwrap();
        assert!(outcomes.is_empty());
        assert!(!server.state.blocking());
    }
}
