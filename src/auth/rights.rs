// Effective-rights derivation
// Role rights come from the system database's group/role/right-object
// cubes; per-database data rights from the group cube-data and group
// dimension-data cubes, cached per user and invalidated by the rights
// token of the database

use crate::auth::{Right, RightObject};
use crate::core::{CubeId, DatabaseId, DimensionId, ElementId, Identifier, OlapResult};
use crate::core::OlapError;
use crate::cubes::CubeSubtype;
use crate::dimensions::DimensionSubtype;
use crate::rules::EvalContext;
use crate::server::{names, Server};

impl Server {
    fn rights_cell_text(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<Option<String>> {
        let mut ctx = EvalContext::new();
        let result = self.read_cell(database, cube, coord, &mut ctx)?;
        if !result.found {
            return Ok(None);
        }
        Ok(result.value.as_text().map(|s| s.to_string()))
    }

    /// Group elements the user belongs to
    fn user_groups(&self, user: Identifier) -> OlapResult<Vec<ElementId>> {
        let system_id = self
            .system_database
            .ok_or_else(|| OlapError::Internal("system database missing".to_string()))?;
        let system = self.database(system_id)?;
        let group_dim = system.find_dimension_by_name(names::GROUP_DIMENSION)?;
        let group_ids: Vec<ElementId> = group_dim.graph.element_ids();

        let user_object = self
            .users
            .get(user)
            .ok_or(OlapError::InvalidSession)?;

        if user_object.external {
            let mut groups = Vec::new();
            for name in &user_object.external_groups {
                if let Some(element) = group_dim.graph.find_by_name(name) {
                    groups.push(element.id);
                }
            }
            return Ok(groups);
        }

        let cube = system.find_cube_by_name(names::USER_GROUP_CUBE)?.id;
        let mut groups = Vec::new();
        for group in group_ids {
            if let Some(text) = self.rights_cell_text(system_id, cube, &[user, group])? {
                if text == "1" {
                    groups.push(group);
                }
            }
        }
        Ok(groups)
    }

    /// Role elements reachable through the user's groups
    fn user_roles(&self, user: Identifier) -> OlapResult<Vec<ElementId>> {
        let system_id = self
            .system_database
            .ok_or_else(|| OlapError::Internal("system database missing".to_string()))?;
        let system = self.database(system_id)?;
        let role_ids: Vec<ElementId> = system
            .find_dimension_by_name(names::ROLE_DIMENSION)?
            .graph
            .element_ids();
        let cube = system.find_cube_by_name(names::GROUP_ROLE_CUBE)?.id;

        let mut roles = Vec::new();
        for group in self.user_groups(user)? {
            for role in &role_ids {
                if roles.contains(role) {
                    continue;
                }
                if let Some(text) = self.rights_cell_text(system_id, cube, &[group, *role])? {
                    if text == "1" {
                        roles.push(*role);
                    }
                }
            }
        }
        Ok(roles)
    }

    fn compute_role_rights(&self, user: Identifier) -> OlapResult<[Right; 14]> {
        let system_id = self
            .system_database
            .ok_or_else(|| OlapError::Internal("system database missing".to_string()))?;
        let system = self.database(system_id)?;
        let right_object_dim = system.find_dimension_by_name(names::RIGHT_OBJECT_DIMENSION)?;
        let cube = system.find_cube_by_name(names::ROLE_RIGHT_OBJECT_CUBE)?.id;

        let roles = self.user_roles(user)?;
        let mut rights = [Right::None; 14];

        for object in RightObject::all() {
            let element = right_object_dim.find_element_by_name(object.name())?.id;
            let mut best = Right::None;
            for role in &roles {
                if let Some(text) = self.rights_cell_text(system_id, cube, &[*role, element])? {
                    best = best.max(Right::from_cell(&text));
                }
            }
            // the splash right only exists for cell data
            if object != RightObject::CellData {
                best = best.clamp_to_delete();
            }
            rights[object as usize] = best;
        }

        Ok(rights)
    }

    /// Role right of a user on a right object, from the cache when valid
    pub fn role_right(&self, user: Identifier, object: RightObject) -> OlapResult<Right> {
        if let Some(user_object) = self.users.get(user) {
            if let Some(rights) = user_object.role_rights {
                return Ok(rights[object as usize]);
            }
        }

        let rights = self.compute_role_rights(user)?;
        if let Some(mut user_object) = self.users.get(user) {
            user_object.role_rights = Some(rights);
            self.users.store(user_object);
        }
        Ok(rights[object as usize])
    }

    /// Fail unless the user's role right reaches the minimum
    ///
    /// Operations without a user are internal and skip the check.
    pub fn check_role_right(
        &self,
        user: Option<Identifier>,
        object: RightObject,
        minimum: Right,
    ) -> OlapResult<()> {
        let user = match user {
            Some(user) => user,
            None => return Ok(()),
        };
        let held = self.role_right(user, object)?;
        if held >= minimum {
            Ok(())
        } else {
            Err(OlapError::NotAuthorized(format!(
                "insufficient '{}' right",
                object.name()
            )))
        }
    }

    fn ensure_fresh_database_rights(&self, user: Identifier, database: DatabaseId) {
        let current = self.users.rights_token(database);
        if let Some(mut user_object) = self.users.get(user) {
            let stale = user_object
                .database_rights
                .get(&database)
                .map(|r| r.seen_token != current)
                .unwrap_or(false);
            if stale {
                user_object.database_rights.remove(&database);
                self.users.store(user_object);
            }
        }
    }

    /// Data right of a user on a cube
    ///
    /// Maximum across the user's groups of the group cube-data cell; a
    /// missing or empty cell grants the maximum right D.
    pub fn cube_data_right(
        &self,
        user: Identifier,
        database: DatabaseId,
        cube: CubeId,
    ) -> OlapResult<Right> {
        self.ensure_fresh_database_rights(user, database);

        if let Some(user_object) = self.users.get(user) {
            if let Some(cached) = user_object
                .database_rights
                .get(&database)
                .and_then(|r| r.cube_rights.get(&cube))
            {
                return Ok(*cached);
            }
        }

        let right = self.compute_cube_data_right(user, database, cube)?;

        if let Some(mut user_object) = self.users.get(user) {
            let token = self.users.rights_token(database);
            let entry = user_object
                .database_rights
                .entry(database)
                .or_default();
            entry.seen_token = token;
            entry.cube_rights.insert(cube, right);
            self.users.store(user_object);
        }
        Ok(right)
    }

    fn compute_cube_data_right(
        &self,
        user: Identifier,
        database: DatabaseId,
        cube: CubeId,
    ) -> OlapResult<Right> {
        let db = self.database(database)?;
        let cube_ref = db.cube(cube)?;

        // system cubes are never listed in the cube dimension; their
        // access is governed by the dimension rights
        match cube_ref.subtype {
            CubeSubtype::Rights | CubeSubtype::Configuration | CubeSubtype::SubsetView => {
                return Ok(Right::Write);
            }
            CubeSubtype::Normal | CubeSubtype::Attributes | CubeSubtype::UserInfo => {}
        }

        let cube_name = cube_ref.name.clone();
        let rights_cube = match db.find_cube_by_name(names::GROUP_CUBE_DATA_CUBE) {
            Ok(rights) => rights.id,
            Err(_) => return Ok(Right::None),
        };
        let cube_element = match db.find_dimension_by_name(names::CUBE_DIMENSION) {
            Ok(meta) => match meta.graph.find_by_name(&cube_name) {
                Some(element) => element.id,
                None => return Ok(Right::None),
            },
            Err(_) => return Ok(Right::None),
        };

        let groups = self.user_groups(user)?;
        if groups.is_empty() {
            return Ok(Right::None);
        }

        let mut best: Option<Right> = None;
        for group in groups {
            match self.rights_cell_text(database, rights_cube, &[group, cube_element])? {
                Some(text) if !text.is_empty() => {
                    let right = Right::from_cell(&text).clamp_to_delete();
                    best = Some(best.map_or(right, |b| b.max(right)));
                }
                // a group without an entry keeps the maximum right
                _ => return Ok(Right::Delete),
            }
        }

        Ok(best.unwrap_or(Right::Delete))
    }

    /// Data right of a user on a dimension element
    ///
    /// Normal dimensions consult the group dimension-data cube: an
    /// element without its own cell inherits the maximum right of its
    /// parents, and an element without parents defaults to D. System,
    /// attribute and user-info dimensions are not tracked there; each
    /// maps onto one role right instead, uniform over its elements.
    pub fn element_data_right(
        &self,
        user: Identifier,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
    ) -> OlapResult<Right> {
        self.ensure_fresh_database_rights(user, database);

        if let Some(user_object) = self.users.get(user) {
            if let Some(cached) = user_object
                .database_rights
                .get(&database)
                .and_then(|r| r.element_rights.get(&(dimension, element)))
            {
                return Ok(*cached);
            }
        }

        let (subtype, dimension_name) = {
            let dim = self.database(database)?.dimension(dimension)?;
            (dim.subtype, dim.name.clone())
        };

        let best = match subtype {
            DimensionSubtype::Normal => {
                self.normal_element_right(user, database, dimension, element, &dimension_name)?
            }
            DimensionSubtype::UserInfo => self.role_right(user, RightObject::UserInfo)?,
            DimensionSubtype::Attributes => {
                self.role_right(user, RightObject::DimensionElement)?
            }
            DimensionSubtype::Rights => self.rights_dimension_right(user, &dimension_name)?,
            DimensionSubtype::Alias
            | DimensionSubtype::CubeList
            | DimensionSubtype::DimensionList
            | DimensionSubtype::Configuration
            | DimensionSubtype::SubsetView => self.role_right(user, RightObject::Rights)?,
        };

        if let Some(mut user_object) = self.users.get(user) {
            let token = self.users.rights_token(database);
            let entry = user_object.database_rights.entry(database).or_default();
            entry.seen_token = token;
            entry.element_rights.insert((dimension, element), best);
            self.users.store(user_object);
        }
        Ok(best)
    }

    /// Element right on a normal dimension, from its group
    /// dimension-data cube
    fn normal_element_right(
        &self,
        user: Identifier,
        database: DatabaseId,
        dimension: DimensionId,
        element: ElementId,
        dimension_name: &str,
    ) -> OlapResult<Right> {
        let rights_cube = match self
            .database(database)?
            .find_cube_by_name(&names::group_dimension_data_cube_name(dimension_name))
        {
            Ok(cube_ref) => cube_ref.id,
            // without a tracking cube every element keeps the recursive
            // default D
            Err(_) => return Ok(Right::Delete),
        };

        let groups = self.user_groups(user)?;
        if groups.is_empty() {
            return Ok(Right::None);
        }

        let mut best = Right::None;
        for group in groups {
            let right =
                self.element_right_recursive(database, rights_cube, group, dimension, element)?;
            best = best.max(right);
        }
        Ok(best)
    }

    /// Right on a system rights dimension, by the dimension it is
    ///
    /// The role dimension itself stays at D: the group/role and
    /// role/right-object cubes carry their own restrictions.
    fn rights_dimension_right(&self, user: Identifier, dimension_name: &str) -> OlapResult<Right> {
        if dimension_name.eq_ignore_ascii_case(names::USER_DIMENSION) {
            self.role_right(user, RightObject::User)
        } else if dimension_name.eq_ignore_ascii_case(names::GROUP_DIMENSION) {
            self.role_right(user, RightObject::Group)
        } else if dimension_name.eq_ignore_ascii_case(names::USER_PROPERTIES_DIMENSION) {
            self.role_right(user, RightObject::Password)
        } else if dimension_name.eq_ignore_ascii_case(names::ROLE_DIMENSION) {
            Ok(Right::Delete)
        } else {
            self.role_right(user, RightObject::Rights)
        }
    }

    fn element_right_recursive(
        &self,
        database: DatabaseId,
        rights_cube: CubeId,
        group: ElementId,
        dimension: DimensionId,
        element: ElementId,
    ) -> OlapResult<Right> {
        if let Some(text) = self.rights_cell_text(database, rights_cube, &[group, element])? {
            if !text.is_empty() {
                return Ok(Right::from_cell(&text).clamp_to_delete());
            }
        }

        let parents = self
            .resolve_dimension(database, dimension)?
            .graph
            .get(element)
            .map(|e| e.parents.clone())
            .unwrap_or_default();
        if parents.is_empty() {
            return Ok(Right::Delete);
        }

        let mut best = Right::None;
        for parent in parents {
            let right =
                self.element_right_recursive(database, rights_cube, group, dimension, parent)?;
            best = best.max(right);
        }
        Ok(best)
    }

    /// Effective right on a cell:
    /// min(cube right, min over dimensions of element right)
    pub fn effective_cell_right(
        &self,
        user: Identifier,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<Right> {
        let mut effective = self.cube_data_right(user, database, cube)?;
        let dims = self.database(database)?.cube(cube)?.dimensions.clone();
        for (element, dimension) in coord.iter().zip(dims) {
            let right = self.element_data_right(user, database, dimension, *element)?;
            effective = effective.min(right);
        }
        Ok(effective)
    }

    /// Fail unless the user may access a cell at the given level
    ///
    /// Reads need R, writes W, deletes D. A splash write needs the S
    /// cell-data role right plus W on the affected cells.
    pub fn check_cell_right(
        &self,
        user: Option<Identifier>,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        minimum: Right,
    ) -> OlapResult<()> {
        let user = match user {
            Some(user) => user,
            None => return Ok(()),
        };

        let role = self.role_right(user, RightObject::CellData)?;
        let effective = self.effective_cell_right(user, database, cube, coord)?;

        let allowed = match minimum {
            Right::Splash => role >= Right::Splash && effective >= Right::Write,
            other => role.clamp_to_delete().min(effective) >= other,
        };

        if allowed {
            Ok(())
        } else {
            Err(OlapError::NotAuthorized(format!(
                "insufficient cell data right (needs {})",
                minimum.as_char()
            )))
        }
    }
}
