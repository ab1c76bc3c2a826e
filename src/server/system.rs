// System database and per-database system companions
// The system database stores users, groups, roles and right objects as
// dimensions and the authorization cubes between them; normal databases
// get alias, meta, configuration and subset/view companions on creation

use crate::core::{DatabaseId, ElementId, OlapError, OlapResult, SessionId};
use crate::cubes::{Cube, CubeSubtype};
use crate::dimensions::{Dimension, DimensionSubtype};
use crate::elements::ElementKind;
use crate::server::{names, Database, DatabaseSubtype, Server};

/// Default right matrices per built-in role, in right-object order
const ADMIN_RIGHTS: [&str; 14] = ["D", "D", "D", "D", "D", "D", "D", "S", "D", "D", "D", "D", "D", "D"];
const POWER_USER_RIGHTS: [&str; 14] =
    ["R", "N", "R", "R", "D", "D", "D", "S", "R", "W", "N", "D", "D", "D"];
const EDITOR_RIGHTS: [&str; 14] = ["N", "N", "N", "R", "R", "R", "R", "W", "N", "N", "N", "W", "W", "W"];
const VIEWER_RIGHTS: [&str; 14] = ["N", "N", "N", "R", "R", "R", "R", "R", "N", "N", "N", "R", "R", "R"];

/// Built-in principals created alongside `admin`
const BUILTIN_PRINCIPALS: [&str; 3] = [
    names::POWER_USER_NAME,
    names::EDITOR_NAME,
    names::VIEWER_NAME,
];

fn rights_dimension(db: &mut Database, name: &str, changable: bool) -> OlapResult<ElementId> {
    let id = db.fetch_dimension_id();
    let mut dimension = Dimension::new(id, name, DimensionSubtype::Rights);
    dimension.deletable = false;
    dimension.renamable = false;
    dimension.changable = changable;
    db.add_dimension(dimension)
}

fn rights_cube(db: &mut Database, name: &str, d1: ElementId, d2: ElementId) -> OlapResult<ElementId> {
    let id = db.fetch_cube_id();
    let mut cube = Cube::new(id, name, vec![d1, d2], CubeSubtype::Rights);
    cube.deletable = false;
    cube.renamable = false;
    db.add_cube(cube)
}

fn set_cell_text(
    db: &mut Database,
    cube_name: &str,
    coord: Vec<ElementId>,
    value: &str,
    overwrite: bool,
) -> OlapResult<()> {
    let cube = db.find_cube_by_name_mut(cube_name)?;
    if !overwrite && cube.stored_value(&coord).is_some() {
        return Ok(());
    }
    cube.store_text(coord, value.to_string());
    Ok(())
}

/// Create the system database `#_SYSTEM_` with its dimensions, cubes and
/// the built-in principals
pub fn create_system_database(server: &mut Server) -> OlapResult<DatabaseId> {
    let id = server.fetch_database_id();
    let mut db = Database::new(id, names::SYSTEM_DATABASE, DatabaseSubtype::System);
    db.deletable = false;
    db.renamable = false;

    // dimensions
    let user_dim = rights_dimension(&mut db, names::USER_DIMENSION, true)?;
    let user_props_dim = rights_dimension(&mut db, names::USER_PROPERTIES_DIMENSION, true)?;
    let group_dim = rights_dimension(&mut db, names::GROUP_DIMENSION, true)?;
    let role_dim = rights_dimension(&mut db, names::ROLE_DIMENSION, true)?;
    let right_object_dim = rights_dimension(&mut db, names::RIGHT_OBJECT_DIMENSION, false)?;
    let group_props_dim = rights_dimension(&mut db, names::GROUP_PROPERTIES_DIMENSION, true)?;
    let role_props_dim = rights_dimension(&mut db, names::ROLE_PROPERTIES_DIMENSION, true)?;

    // principals: admin plus the built-in sample users, groups and roles
    let mut user_elements = Vec::new();
    for dim in [user_dim, group_dim, role_dim] {
        let dimension = db.dimension_mut(dim)?;
        let admin = dimension.add_element(names::ADMIN_NAME, ElementKind::Text)?;
        let mut ids = vec![admin];
        for principal in BUILTIN_PRINCIPALS {
            ids.push(dimension.add_element(principal, ElementKind::Text)?);
        }
        if dim == user_dim {
            user_elements = ids.clone();
        }
    }

    let password_element = db
        .dimension_mut(user_props_dim)?
        .add_element(names::PASSWORD_PROPERTY, ElementKind::Text)?;

    {
        let dimension = db.dimension_mut(right_object_dim)?;
        dimension.changable = true;
        for name in crate::auth::RIGHT_OBJECT_NAMES {
            dimension.add_element(name, ElementKind::Text)?;
        }
        dimension.changable = false;
    }

    // cubes
    rights_cube(&mut db, names::USER_USER_PROPERTIES_CUBE, user_dim, user_props_dim)?;
    rights_cube(&mut db, names::USER_GROUP_CUBE, user_dim, group_dim)?;
    rights_cube(&mut db, names::ROLE_RIGHT_OBJECT_CUBE, role_dim, right_object_dim)?;
    rights_cube(&mut db, names::GROUP_ROLE_CUBE, group_dim, role_dim)?;
    rights_cube(&mut db, names::ROLE_ROLE_PROPERTIES_CUBE, role_dim, role_props_dim)?;
    rights_cube(&mut db, names::GROUP_GROUP_PROPERTIES_CUBE, group_dim, group_props_dim)?;

    // default passwords
    for (at, principal) in std::iter::once(names::ADMIN_PASSWORD)
        .chain(BUILTIN_PRINCIPALS)
        .enumerate()
    {
        set_cell_text(
            &mut db,
            names::USER_USER_PROPERTIES_CUBE,
            vec![user_elements[at], password_element],
            principal,
            at == 0,
        )?;
    }

    // diagonal memberships: admin in admin group with admin role, and so on
    for at in 0..=BUILTIN_PRINCIPALS.len() {
        let id = at as ElementId;
        set_cell_text(&mut db, names::USER_GROUP_CUBE, vec![id, id], "1", at == 0)?;
        set_cell_text(&mut db, names::GROUP_ROLE_CUBE, vec![id, id], "1", at == 0)?;
    }

    // default rights matrices
    let matrices: [(&str, [&str; 14]); 4] = [
        (names::ADMIN_NAME, ADMIN_RIGHTS),
        (names::POWER_USER_NAME, POWER_USER_RIGHTS),
        (names::EDITOR_NAME, EDITOR_RIGHTS),
        (names::VIEWER_NAME, VIEWER_RIGHTS),
    ];
    for (role_name, matrix) in matrices {
        let role = db.dimension(role_dim)?.find_element_by_name(role_name)?.id;
        for (at, right) in matrix.iter().enumerate() {
            set_cell_text(
                &mut db,
                names::ROLE_RIGHT_OBJECT_CUBE,
                vec![role, at as ElementId],
                right,
                role_name == names::ADMIN_NAME,
            )?;
        }
    }

    db.extensible = false;

    server.register_database(db)?;
    server.system_database = Some(id);

    // user objects for the built-in principals
    for (at, name) in std::iter::once(names::ADMIN_NAME)
        .chain(BUILTIN_PRINCIPALS)
        .enumerate()
    {
        server.users.register_internal(at as ElementId, name);
    }

    log::info!("system database '{}' ready", names::SYSTEM_DATABASE);
    Ok(id)
}

/// Create the system companions of a fresh normal database
pub fn init_normal_database(server: &mut Server, database: DatabaseId) -> OlapResult<()> {
    let (system_user_dim, system_group_dim) = {
        let system = server.system()?;
        (
            system.find_dimension_by_name(names::USER_DIMENSION)?.id,
            system.find_dimension_by_name(names::GROUP_DIMENSION)?.id,
        )
    };

    let db = server.database_mut(database)?;

    // alias dimensions mirroring the system principals
    let user_dim = {
        let id = db.fetch_dimension_id();
        let mut dim = Dimension::new_alias(id, names::USER_DIMENSION, system_user_dim);
        dim.deletable = false;
        dim.renamable = false;
        db.add_dimension(dim)?
    };
    let group_dim = {
        let id = db.fetch_dimension_id();
        let mut dim = Dimension::new_alias(id, names::GROUP_DIMENSION, system_group_dim);
        dim.deletable = false;
        dim.renamable = false;
        db.add_dimension(dim)?
    };

    // meta dimensions
    let cube_dim = db.create_dimension(names::CUBE_DIMENSION, DimensionSubtype::CubeList)?;
    let dimension_dim =
        db.create_dimension(names::DIMENSION_DIMENSION, DimensionSubtype::DimensionList)?;

    // configuration dimension and cube
    let config_dim = db.create_dimension(
        names::CONFIGURATION_DIMENSION,
        DimensionSubtype::Configuration,
    )?;
    db.dimension_mut(config_dim)?
        .add_element(names::CLIENT_CACHE_ELEMENT, ElementKind::Text)?;
    db.dimension_mut(config_dim)?
        .add_element(names::HIDE_ELEMENTS_ELEMENT, ElementKind::Text)?;
    {
        let id = db.fetch_cube_id();
        let mut cube = Cube::new(
            id,
            names::CONFIGURATION_CUBE,
            vec![config_dim],
            CubeSubtype::Configuration,
        );
        cube.deletable = false;
        cube.renamable = false;
        db.add_cube(cube)?;
    }
    let client_cache = db.dimension(config_dim)?.find_element_by_name(names::CLIENT_CACHE_ELEMENT)?.id;
    set_cell_text(db, names::CONFIGURATION_CUBE, vec![client_cache], "N", false)?;

    // per-cube rights
    rights_cube(db, names::GROUP_CUBE_DATA_CUBE, group_dim, cube_dim)?;

    // subset and view registries
    let subset_dim = db.create_dimension(names::SUBSET_DIMENSION, DimensionSubtype::SubsetView)?;
    let view_dim = db.create_dimension(names::VIEW_DIMENSION, DimensionSubtype::SubsetView)?;

    let subset_view_cubes: [(&str, Vec<ElementId>); 4] = [
        (names::SUBSET_LOCAL_CUBE, vec![dimension_dim, user_dim, subset_dim]),
        (names::SUBSET_GLOBAL_CUBE, vec![dimension_dim, subset_dim]),
        (names::VIEW_LOCAL_CUBE, vec![cube_dim, user_dim, view_dim]),
        (names::VIEW_GLOBAL_CUBE, vec![cube_dim, view_dim]),
    ];
    for (name, dims) in subset_view_cubes {
        let id = db.fetch_cube_id();
        let mut cube = Cube::new(id, name, dims, CubeSubtype::SubsetView);
        cube.deletable = false;
        cube.renamable = false;
        db.add_cube(cube)?;
    }

    Ok(())
}

impl Server {
    /// Authenticate an internal user and open a session
    ///
    /// The stored password cell may hold the plain text or its md5 digest.
    pub fn login(&mut self, name: &str, password: &str) -> OlapResult<SessionId> {
        let system = self.system()?;
        let user_dim = system.find_dimension_by_name(names::USER_DIMENSION)?;
        let user_element = user_dim
            .graph
            .find_by_name(name)
            .ok_or_else(|| OlapError::NotAuthorized(format!("unknown user '{}'", name)))?;
        let user_id = user_element.id;
        let user_name = user_element.name.clone();

        let password_element = system
            .find_dimension_by_name(names::USER_PROPERTIES_DIMENSION)?
            .find_element_by_name(names::PASSWORD_PROPERTY)?
            .id;
        let stored = system
            .find_cube_by_name(names::USER_USER_PROPERTIES_CUBE)?
            .stored_value(&[user_id, password_element])
            .and_then(|v| v.as_text().map(|s| s.to_string()))
            .unwrap_or_default();

        let digest = format!("{:x}", md5::compute(password.as_bytes()));
        if stored != password && stored != digest {
            log::warn!("failed login for user '{}'", name);
            return Err(OlapError::NotAuthorized(format!(
                "wrong password for user '{}'",
                name
            )));
        }

        self.users.register_internal(user_id, &user_name);
        let ttl = self.options.session_ttl_seconds;
        let session = self.sessions.create(Some(user_id), false, ttl);
        log::info!("user '{}' logged in", user_name);
        Ok(session)
    }

    /// Open a session for a worker-authenticated external user
    pub fn login_external(
        &mut self,
        name: &str,
        groups: Vec<String>,
        worker: bool,
    ) -> OlapResult<SessionId> {
        let user_id = self.users.register_external(name, groups);
        let ttl = self.options.session_ttl_seconds;
        Ok(self.sessions.create(Some(user_id), worker, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_with_default_password() {
        let mut server = Server::new().unwrap();
        let session = server.login("admin", "admin").unwrap();
        let user = server.sessions.get(session).unwrap().user;
        assert_eq!(server.users.name_of(user.unwrap()).unwrap(), "admin");
    }

    #[test]
    fn test_login_with_md5_stored_password() {
        let mut server = Server::new().unwrap();
        let system = server.system_database.unwrap();
        let (user_el, password_el) = {
            let db = server.database(system).unwrap();
            let user = db
                .find_dimension_by_name(names::USER_DIMENSION)
                .unwrap()
                .find_element_by_name("editor")
                .unwrap()
                .id;
            let prop = db
                .find_dimension_by_name(names::USER_PROPERTIES_DIMENSION)
                .unwrap()
                .find_element_by_name(names::PASSWORD_PROPERTY)
                .unwrap()
                .id;
            (user, prop)
        };

        let digest = format!("{:x}", md5::compute(b"secret"));
        let db = server.database_mut(system).unwrap();
        db.find_cube_by_name_mut(names::USER_USER_PROPERTIES_CUBE)
            .unwrap()
            .store_text(vec![user_el, password_el], digest);

        assert!(server.login("editor", "secret").is_ok());
        assert!(server.login("editor", "wrong").is_err());
    }

    #[test]
    fn test_wrong_user_fails() {
        let mut server = Server::new().unwrap();
        assert!(server.login("nobody", "x").is_err());
    }

    #[test]
    fn test_default_rights_matrix_cells() {
        let server = Server::new().unwrap();
        let system = server.system().unwrap();
        let role_dim = system.find_dimension_by_name(names::ROLE_DIMENSION).unwrap();
        let admin_role = role_dim.find_element_by_name("admin").unwrap().id;
        let viewer_role = role_dim.find_element_by_name("viewer").unwrap().id;
        let cube = system.find_cube_by_name(names::ROLE_RIGHT_OBJECT_CUBE).unwrap();

        // cell data right object sits at index 7
        assert_eq!(
            cube.stored_value(&[admin_role, 7]),
            Some(crate::core::CellValue::Text("S".into()))
        );
        assert_eq!(
            cube.stored_value(&[viewer_role, 7]),
            Some(crate::core::CellValue::Text("R".into()))
        );
    }
}
