// Cell writes
// Validates path type and rights, honors area locks, splashes writes at
// consolidated coordinates down to base cells and feeds the marker bus

use crate::auth::Right;
use crate::core::{
    CellValue, CubeId, DatabaseId, ElementId, Identifier, OlapError, OlapResult, SessionId,
};
use crate::engine::reader::PathType;
use crate::locks::{DeferredRequest, RollbackEntry};
use crate::rules::predicate_matches;
use crate::server::{names, Dispatch, Server};

/// Largest base area a single splash may touch
const MAX_SPLASH_CELLS: usize = 1_000_000;

/// Splash policy for writes at consolidated coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplashMode {
    /// Only base paths may be written
    Disabled,

    /// Base paths write directly; consolidated paths behave like SetBase
    Default,

    /// Distribute the value as an additive delta over the base area
    AddBase,

    /// Scale the base area so its aggregate equals the value
    SetBase,
}

impl SplashMode {
    /// Wire code (0=disabled, 1=default, 2=add, 3=set)
    pub fn code(self) -> u32 {
        match self {
            SplashMode::Disabled => 0,
            SplashMode::Default => 1,
            SplashMode::AddBase => 2,
            SplashMode::SetBase => 3,
        }
    }

    /// Parse a wire code
    pub fn from_code(code: u32) -> OlapResult<Self> {
        match code {
            0 => Ok(SplashMode::Disabled),
            1 => Ok(SplashMode::Default),
            2 => Ok(SplashMode::AddBase),
            3 => Ok(SplashMode::SetBase),
            other => Err(OlapError::InvalidSplashMode(format!(
                "wrong value {} for splash mode",
                other
            ))),
        }
    }
}

impl Server {
    // dispatch layer: suspends writes behind a foreign event lock

    /// Write a cell on behalf of a session, suspending while another
    /// session holds the event lock
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_set_cell(
        &mut self,
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        coord: Vec<ElementId>,
        value: CellValue,
        mode: SplashMode,
        add: bool,
    ) -> OlapResult<Dispatch<()>> {
        let user = self.sessions.use_session(session)?.user;

        if self.state.blocking() && self.state.active_session() != Some(session) {
            let semaphore = self.state.server_event_semaphore;
            self.state.semaphores.enqueue(
                semaphore,
                DeferredRequest::CellSet {
                    session,
                    database,
                    cube,
                    coord,
                    value,
                    mode,
                    add,
                },
            );
            return Ok(Dispatch::Suspended(semaphore));
        }

        self.set_cell(database, cube, &coord, value, mode, add, user, Some(session))?;
        Ok(Dispatch::Done(()))
    }

    /// Clear a cell on behalf of a session, suspending while another
    /// session holds the event lock
    pub fn dispatch_clear_cell(
        &mut self,
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        coord: Vec<ElementId>,
    ) -> OlapResult<Dispatch<()>> {
        let user = self.sessions.use_session(session)?.user;

        if self.state.blocking() && self.state.active_session() != Some(session) {
            let semaphore = self.state.server_event_semaphore;
            self.state.semaphores.enqueue(
                semaphore,
                DeferredRequest::CellClear {
                    session,
                    database,
                    cube,
                    coord,
                },
            );
            return Ok(Dispatch::Suspended(semaphore));
        }

        self.clear_cell(database, cube, &coord, user, Some(session))?;
        Ok(Dispatch::Done(()))
    }

    // cell writes

    /// Write a cell value
    ///
    /// `mode` selects the splash policy for consolidated coordinates;
    /// `add` turns the write into an additive delta and is only valid
    /// with the Disabled, Default and AddBase modes.
    #[allow(clippy::too_many_arguments)]
    pub fn set_cell(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        value: CellValue,
        mode: SplashMode,
        add: bool,
        user: Option<Identifier>,
        session: Option<SessionId>,
    ) -> OlapResult<()> {
        self.database(database)?.check_loaded()?;
        self.validate_coordinates(database, cube, coord)?;

        let path_type = self.path_type(database, cube, coord)?;
        let base_path = self.is_base_path(database, cube, coord)?;

        match (&value, path_type) {
            (CellValue::Text(_), PathType::Numeric) => {
                return Err(OlapError::InvalidPathType(
                    "string value at a numeric path".to_string(),
                ))
            }
            (CellValue::Numeric(_), PathType::Text) => {
                return Err(OlapError::InvalidPathType(
                    "numeric value at a string path".to_string(),
                ))
            }
            _ => {}
        }

        if add && mode == SplashMode::SetBase {
            return Err(OlapError::InvalidSplashMode(
                "add requires splash mode DISABLED, DEFAULT or ADD".to_string(),
            ));
        }

        if !base_path {
            if path_type == PathType::Text {
                return Err(OlapError::InvalidPathType(
                    "cannot write a string consolidation".to_string(),
                ));
            }
            if mode == SplashMode::Disabled {
                return Err(OlapError::InvalidSplashMode(
                    "splash disabled at a consolidated path".to_string(),
                ));
            }
        }

        let needed = if base_path { Right::Write } else { Right::Splash };
        self.check_cell_right(user, database, cube, coord, needed)?;

        let value = self.check_cube_value_policy(database, cube, coord, value)?;
        let (username, event) = self.journal_identity_for(user);

        // compute the base writes
        match (&value, base_path) {
            (CellValue::Text(text), true) => {
                self.apply_text_write(
                    database,
                    cube,
                    coord.to_vec(),
                    text.clone(),
                    session,
                    &username,
                    &event,
                )?;
            }
            (CellValue::Numeric(v), true) => {
                let new_value = if add {
                    let current = self
                        .database(database)?
                        .cube(cube)?
                        .numeric
                        .get(coord)
                        .copied()
                        .unwrap_or(0.0);
                    current + v
                } else {
                    *v
                };
                self.apply_numeric_writes(
                    database,
                    cube,
                    vec![(coord.to_vec(), new_value)],
                    session,
                    &username,
                    &event,
                )?;
            }
            (CellValue::Numeric(v), false) => {
                // an additive write at a consolidated path grows the
                // aggregate, whatever the exact mode
                let mode = if add { SplashMode::AddBase } else { mode };
                let writes = self.compute_splash(database, cube, coord, *v, mode, add)?;
                self.apply_numeric_writes(database, cube, writes, session, &username, &event)?;
            }
            (CellValue::Text(_), false) => unreachable!("string splash rejected above"),
        }

        self.after_cell_write(database, cube)?;
        Ok(())
    }

    fn journal_identity_for(&self, user: Option<Identifier>) -> (String, String) {
        let name = user.and_then(|id| self.users.name_of(id));
        (
            self.state.effective_username(name.as_deref()),
            self.state.effective_event(),
        )
    }

    /// Value policy of rights and configuration cubes
    ///
    /// Rights cells take a single upper-case right character; the splash
    /// right S is accepted only in the role/right-object cube on the
    /// cell-data column. Configuration cells take N, Y or E.
    fn check_cube_value_policy(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        value: CellValue,
    ) -> OlapResult<CellValue> {
        let db = self.database(database)?;
        let cube_ref = db.cube(cube)?;

        match cube_ref.subtype {
            crate::cubes::CubeSubtype::Rights => {
                let text = match &value {
                    CellValue::Text(text) => text.clone(),
                    CellValue::Numeric(_) => return Ok(value),
                };
                if text.is_empty() {
                    return Ok(value);
                }

                let is_system = self.system_database == Some(database);
                let is_role_right_object =
                    cube_ref.name.eq_ignore_ascii_case(names::ROLE_RIGHT_OBJECT_CUBE);

                // inside the system database only the role/right-object
                // cube constrains its values
                if is_system && !is_role_right_object {
                    return Ok(value);
                }

                if text.len() > 1 {
                    return Err(OlapError::InvalidPermission(text));
                }
                let upper = text.to_uppercase();

                let mut allowed = "NRWD".to_string();
                if is_role_right_object {
                    let right_object_dim = db.dimension(cube_ref.dimensions[1])?;
                    let element = right_object_dim.find_element(coord[1])?;
                    if element.name == crate::auth::RightObject::CellData.name() {
                        allowed.push('S');
                    }
                }

                if !allowed.contains(&upper) {
                    return Err(OlapError::InvalidPermission(text));
                }
                Ok(CellValue::Text(upper))
            }

            crate::cubes::CubeSubtype::Configuration => {
                let element = db
                    .dimension(cube_ref.dimensions[0])?
                    .find_element(coord[0])?;
                let constrained = element.name.eq_ignore_ascii_case(names::CLIENT_CACHE_ELEMENT)
                    || element.name.eq_ignore_ascii_case(names::HIDE_ELEMENTS_ELEMENT);
                if !constrained {
                    return Ok(value);
                }

                let text = match &value {
                    CellValue::Text(text) => text.clone(),
                    CellValue::Numeric(_) => return Ok(value),
                };
                let upper = text.to_uppercase();
                if upper.len() != 1 || !"NYE".contains(&upper) {
                    return Err(OlapError::InvalidPermission(text));
                }
                Ok(CellValue::Text(upper))
            }

            _ => Ok(value),
        }
    }

    /// Weighted base expansion of a splash write
    fn compute_splash(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        value: f64,
        mode: SplashMode,
        add: bool,
    ) -> OlapResult<Vec<(Vec<ElementId>, f64)>> {
        let dims = self.database(database)?.cube(cube)?.dimensions.clone();

        let mut base_lists: Vec<Vec<(ElementId, f64)>> = Vec::with_capacity(dims.len());
        for (element, dim) in coord.iter().zip(&dims) {
            let dimension = self.resolve_dimension(database, *dim)?;
            let list = dimension.graph.base_set(*element);
            if list.is_empty() {
                return Err(OlapError::InvalidCoordinates(format!(
                    "no numeric base cells below element {}",
                    element
                )));
            }
            base_lists.push(list);
        }

        let count = base_lists
            .iter()
            .fold(1usize, |acc, l| acc.saturating_mul(l.len()));
        if count > MAX_SPLASH_CELLS {
            return Err(OlapError::InvalidSplashMode(format!(
                "splash area too large ({} base cells)",
                count
            )));
        }

        // enumerate the base area with its weight products
        let mut cells: Vec<(Vec<ElementId>, f64)> = Vec::with_capacity(count);
        let mut odometer = vec![0usize; base_lists.len()];
        loop {
            let mut cell = Vec::with_capacity(base_lists.len());
            let mut weight = 1.0;
            for (slot, list) in odometer.iter().zip(&base_lists) {
                let (element, w) = list[*slot];
                cell.push(element);
                weight *= w;
            }
            cells.push((cell, weight));

            let mut axis = base_lists.len();
            loop {
                if axis == 0 {
                    return self.splash_writes(database, cube, cells, value, mode, add);
                }
                axis -= 1;
                odometer[axis] += 1;
                if odometer[axis] < base_lists[axis].len() {
                    break;
                }
                odometer[axis] = 0;
            }
        }
    }

    fn splash_writes(
        &self,
        database: DatabaseId,
        cube: CubeId,
        cells: Vec<(Vec<ElementId>, f64)>,
        value: f64,
        mode: SplashMode,
        add: bool,
    ) -> OlapResult<Vec<(Vec<ElementId>, f64)>> {
        let cube_ref = self.database(database)?.cube(cube)?;

        let total_weight: f64 = cells.iter().map(|(_, w)| w).sum();
        let aggregate: f64 = cells
            .iter()
            .filter_map(|(cell, w)| cube_ref.numeric.get(cell).map(|v| v * w))
            .sum();

        let mut writes = Vec::new();
        match mode {
            SplashMode::AddBase if !add => {
                // additive delta: untouched cells keep their value, empty
                // cells share the delta evenly
                let count = cells.len();
                let share = value / count as f64;
                for (cell, _) in cells {
                    if cube_ref.numeric.get(&cell).is_none() {
                        writes.push((cell, share));
                    }
                }
            }
            SplashMode::AddBase => {
                // grow the aggregate by the value
                if aggregate != 0.0 {
                    let factor = (aggregate + value) / aggregate;
                    for (cell, _) in cells {
                        if let Some(current) = cube_ref.numeric.get(&cell) {
                            writes.push((cell, current * factor));
                        }
                    }
                } else if total_weight != 0.0 {
                    let share = value / total_weight;
                    for (cell, _) in cells {
                        writes.push((cell, share));
                    }
                }
            }
            SplashMode::SetBase | SplashMode::Default => {
                // scale the aggregate onto the value
                if aggregate != 0.0 {
                    let factor = value / aggregate;
                    for (cell, _) in cells {
                        if let Some(current) = cube_ref.numeric.get(&cell) {
                            writes.push((cell, current * factor));
                        }
                    }
                } else if total_weight != 0.0 {
                    let share = value / total_weight;
                    for (cell, _) in cells {
                        writes.push((cell, share));
                    }
                } else {
                    return Err(OlapError::InvalidSplashMode(
                        "zero total weight below consolidation".to_string(),
                    ));
                }
            }
            SplashMode::Disabled => unreachable!("disabled splash rejected earlier"),
        }

        Ok(writes)
    }

    fn check_lock_and_journal(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        session: Option<SessionId>,
    ) -> OlapResult<()> {
        let prior = self.database(database)?.cube(cube)?.stored_value(coord);
        let cube_ref = self.database_mut(database)?.cube_mut(cube)?;
        if let Some(lock) = cube_ref.locks.find_covering_mut(coord) {
            if Some(lock.session) != session {
                return Err(OlapError::LockedArea);
            }
            lock.record(coord.to_vec(), prior);
        }
        Ok(())
    }

    fn apply_numeric_writes(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        writes: Vec<(Vec<ElementId>, f64)>,
        session: Option<SessionId>,
        username: &str,
        event: &str,
    ) -> OlapResult<()> {
        for (coord, _) in &writes {
            self.check_lock_and_journal(database, cube, coord, session)?;
        }

        {
            let db = self.database_mut(database)?;
            for (coord, value) in &writes {
                db.cube_mut(cube)?.store_numeric(coord.clone(), *value);
                db.cube_journal_record(
                    cube,
                    username,
                    event,
                    "setDouble",
                    vec![
                        coord
                            .iter()
                            .map(|id| id.to_string())
                            .collect::<Vec<_>>()
                            .join(","),
                        value.to_string(),
                    ],
                );
            }
        }

        let written: Vec<Vec<ElementId>> = writes.into_iter().map(|(coord, _)| coord).collect();
        self.invalidate_after_base_writes(database, cube, &written);
        Ok(())
    }

    fn apply_text_write(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        coord: Vec<ElementId>,
        value: String,
        session: Option<SessionId>,
        username: &str,
        event: &str,
    ) -> OlapResult<()> {
        self.check_lock_and_journal(database, cube, &coord, session)?;

        {
            let db = self.database_mut(database)?;
            db.cube_mut(cube)?.store_text(coord.clone(), value.clone());
            db.cube_journal_record(
                cube,
                username,
                event,
                "setString",
                vec![
                    coord
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                    value,
                ],
            );
        }

        self.invalidate_after_base_writes(database, cube, &[coord]);
        Ok(())
    }

    /// Cache, marker and hook maintenance after base cells changed
    fn invalidate_after_base_writes(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        written: &[Vec<ElementId>],
    ) {
        // consolidation cache: drop entries whose base expansion meets a
        // written cell
        if let Ok(db) = self.database(database) {
            if let Ok(cube_ref) = db.cube(cube) {
                let dims = cube_ref.dimensions.clone();
                let graphs: Vec<_> = dims
                    .iter()
                    .filter_map(|d| self.resolve_dimension(database, *d).ok())
                    .map(|dimension| &dimension.graph)
                    .collect();

                if graphs.len() == dims.len() {
                    cube_ref.evict_consolidations(|cached| {
                        written.iter().any(|write| {
                            cached.iter().zip(write).zip(&graphs).all(
                                |((cached_e, written_e), graph)| {
                                    cached_e == written_e
                                        || graph
                                            .base_set(*cached_e)
                                            .iter()
                                            .any(|(base, _)| base == written_e)
                                },
                            )
                        })
                    });
                }

                // memoized rule values of this cube may be stale now
                cube_ref.clear_rule_cache();

                // forward markers into dependent cubes
                for marker in cube_ref.markers.clone() {
                    if written.iter().any(|w| predicate_matches(&marker.source, w)) {
                        if let Ok(target) = db.cube(marker.rule_cube) {
                            target.evict_rule_cache(marker.rule);
                        }
                        self.add_changed_marker_cube(database, marker.rule_cube);
                    }
                }
            }
        }
    }

    /// Rights and configuration hooks plus token propagation
    fn after_cell_write(&mut self, database: DatabaseId, cube: CubeId) -> OlapResult<()> {
        let subtype = self.database(database)?.cube(cube)?.subtype;

        match subtype {
            crate::cubes::CubeSubtype::Rights => {
                if self.system_database == Some(database) {
                    self.users.refresh_all();
                } else {
                    self.users.bump_rights_token(database);
                }
            }
            crate::cubes::CubeSubtype::Configuration => {
                self.refresh_configuration(database, cube)?;
            }
            _ => {}
        }

        self.touch_cube(database, cube)?;
        Ok(())
    }

    /// Re-derive the client-cache and hide-elements flags from the
    /// configuration cube
    fn refresh_configuration(&mut self, database: DatabaseId, cube: CubeId) -> OlapResult<()> {
        let (client_cache, hide_elements) = {
            let db = self.database(database)?;
            let cube_ref = db.cube(cube)?;
            let dimension = db.dimension(cube_ref.dimensions[0])?;

            let cell_of = |name: &str| -> Option<String> {
                let element = dimension.graph.find_by_name(name)?;
                cube_ref
                    .stored_value(&[element.id])
                    .and_then(|v| v.as_text().map(|s| s.to_string()))
            };

            (
                cell_of(names::CLIENT_CACHE_ELEMENT),
                cell_of(names::HIDE_ELEMENTS_ELEMENT),
            )
        };

        let db = self.database_mut(database)?;
        db.client_cache = crate::server::ClientCacheType::from_cell(
            client_cache.as_deref().unwrap_or("N"),
        );
        db.hide_elements = matches!(hide_elements.as_deref(), Some("Y") | Some("E"));
        Ok(())
    }

    // clears

    /// Clear one cell
    pub fn clear_cell(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        user: Option<Identifier>,
        session: Option<SessionId>,
    ) -> OlapResult<()> {
        self.database(database)?.check_loaded()?;
        self.validate_coordinates(database, cube, coord)?;
        self.check_cell_right(user, database, cube, coord, Right::Delete)?;
        self.check_protected_cell(database, cube, coord)?;

        let (username, event) = self.journal_identity_for(user);
        self.check_lock_and_journal(database, cube, coord, session)?;

        {
            let db = self.database_mut(database)?;
            db.cube_mut(cube)?.clear_cell(coord);
            db.cube_journal_record(
                cube,
                &username,
                &event,
                "clearCell",
                vec![coord
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",")],
            );
        }

        self.invalidate_after_base_writes(database, cube, &[coord.to_vec()]);
        self.after_cell_write(database, cube)?;
        Ok(())
    }

    /// The client-cache and hide-elements cells cannot be cleared
    fn check_protected_cell(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<()> {
        let db = self.database(database)?;
        let cube_ref = db.cube(cube)?;
        if cube_ref.subtype != crate::cubes::CubeSubtype::Configuration {
            return Ok(());
        }
        let element = db
            .dimension(cube_ref.dimensions[0])?
            .find_element(coord[0])?;
        if element.name.eq_ignore_ascii_case(names::CLIENT_CACHE_ELEMENT)
            || element.name.eq_ignore_ascii_case(names::HIDE_ELEMENTS_ELEMENT)
        {
            return Err(OlapError::NotAuthorized(format!(
                "cell '{}' is protected",
                element.name
            )));
        }
        Ok(())
    }

    /// Clear every cell inside an area
    pub fn clear_area(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        spec: &[Option<Vec<ElementId>>],
        user: Option<Identifier>,
        session: Option<SessionId>,
    ) -> OlapResult<usize> {
        self.database(database)?.check_loaded()?;
        let area = self.resolve_area(database, cube, spec, false)?;

        // a protected configuration cell anywhere in the area vetoes the
        // clear before any cell is touched
        if self.database(database)?.cube(cube)?.subtype == crate::cubes::CubeSubtype::Configuration
        {
            for coord in area.iter() {
                self.check_protected_cell(database, cube, &coord)?;
            }
        }
        let filled: Vec<Vec<ElementId>> = {
            let cube_ref = self.database(database)?.cube(cube)?;
            cube_ref
                .numeric
                .iter()
                .map(|(coord, _)| coord.clone())
                .chain(cube_ref.strings.iter().map(|(coord, _)| coord.clone()))
                .filter(|coord| area.contains(coord))
                .collect()
        };

        for coord in &filled {
            self.clear_cell(database, cube, coord, user, session)?;
        }
        Ok(filled.len())
    }

    // area locks

    /// Reserve a cube area for a session and open its rollback journal
    pub fn lock_cube_area(
        &mut self,
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        spec: &[Option<Vec<ElementId>>],
    ) -> OlapResult<Identifier> {
        let user = self.sessions.use_session(session)?.user;
        let username = user
            .and_then(|id| self.users.name_of(id))
            .unwrap_or_else(|| crate::server::state::SYSTEM_USERNAME.to_string());

        let area = self.resolve_area(database, cube, spec, false)?;
        let cube_ref = self.database_mut(database)?.cube_mut(cube)?;
        let id = cube_ref.locks.acquire(session, &username, area)?;
        self.touch_cube(database, cube)?;
        Ok(id)
    }

    /// Commit a lock, discarding its rollback journal
    pub fn commit_cube_lock(
        &mut self,
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        lock: Identifier,
    ) -> OlapResult<()> {
        self.sessions.use_session(session)?;
        let cube_ref = self.database_mut(database)?.cube_mut(cube)?;
        match cube_ref.locks.get(lock) {
            Some(held) if held.session == session => {}
            Some(_) => return Err(OlapError::NotAuthorized("lock of another session".into())),
            None => return Err(OlapError::Internal(format!("unknown lock {}", lock))),
        }
        cube_ref.locks.commit(lock)?;
        self.touch_cube(database, cube)?;
        Ok(())
    }

    /// Roll a lock back, restoring the journaled cell values
    pub fn rollback_cube_lock(
        &mut self,
        session: SessionId,
        database: DatabaseId,
        cube: CubeId,
        lock: Identifier,
        steps: Option<usize>,
    ) -> OlapResult<()> {
        self.sessions.use_session(session)?;
        let entries = {
            let cube_ref = self.database_mut(database)?.cube_mut(cube)?;
            match cube_ref.locks.get(lock) {
                Some(held) if held.session == session => {}
                Some(_) => return Err(OlapError::NotAuthorized("lock of another session".into())),
                None => return Err(OlapError::Internal(format!("unknown lock {}", lock))),
            }
            cube_ref.locks.rollback(lock, steps)?
        };
        self.apply_rollback(database, cube, entries)?;
        Ok(())
    }

    /// Replay rollback entries onto the store, newest first
    pub(crate) fn apply_rollback(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        entries: Vec<RollbackEntry>,
    ) -> OlapResult<()> {
        let written: Vec<Vec<ElementId>> = entries.iter().map(|e| e.coord.clone()).collect();

        {
            let db = self.database_mut(database)?;
            let cube_ref = db.cube_mut(cube)?;
            for entry in entries {
                match entry.prior {
                    Some(CellValue::Numeric(value)) => {
                        cube_ref.store_numeric(entry.coord, value);
                    }
                    Some(CellValue::Text(value)) => {
                        cube_ref.store_text(entry.coord, value);
                    }
                    None => {
                        cube_ref.clear_cell(&entry.coord);
                    }
                }
            }
        }

        self.invalidate_after_base_writes(database, cube, &written);
        self.touch_cube(database, cube)?;
        Ok(())
    }

    // queued session writes

    /// Queue a bulk cell write on a session
    pub fn queue_cell_write(
        &mut self,
        session: SessionId,
        write: crate::auth::QueuedCellWrite,
    ) -> OlapResult<usize> {
        let s = self.sessions.use_session(session)?;
        s.queued_writes.push_back(write);
        Ok(s.queued_writes.len())
    }

    /// Replay a session's queued writes in FIFO order
    pub fn flush_queued_writes(
        &mut self,
        session: SessionId,
    ) -> OlapResult<Vec<OlapResult<()>>> {
        let (user, queued) = {
            let s = self.sessions.use_session(session)?;
            (s.user, std::mem::take(&mut s.queued_writes))
        };

        let mut outcomes = Vec::with_capacity(queued.len());
        for write in queued {
            outcomes.push(self.set_cell(
                write.database,
                write.cube,
                &write.coord,
                write.value,
                write.mode,
                false,
                user,
                Some(session),
            ));
        }
        Ok(outcomes)
    }
}
