// Database - named set of dimensions and cubes
// Dimensions and cubes live in id-indexed arenas; companions of an
// attributed dimension (attribute dimension, attribute cube, rights cube)
// are created, renamed and deleted alongside it

use crate::core::{CubeId, DatabaseId, DimensionId, ElementId, OlapError, OlapResult};
use crate::cubes::{Cube, CubeSubtype};
use crate::dimensions::{Dimension, DimensionSubtype};
use crate::elements::ElementKind;
use crate::io::journal::{JournalRecord, JournalWriter};
use crate::server::names;
use crate::tokens::Token;
use std::collections::{BTreeSet, HashMap};

/// Subtype of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseSubtype {
    Normal,
    System,
    UserInfo,
}

impl DatabaseSubtype {
    /// Persistence code of the subtype
    pub fn code(self) -> u32 {
        match self {
            DatabaseSubtype::Normal => 1,
            DatabaseSubtype::System => 2,
            DatabaseSubtype::UserInfo => 3,
        }
    }

    /// Parse a persistence code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(DatabaseSubtype::Normal),
            2 => Some(DatabaseSubtype::System),
            3 => Some(DatabaseSubtype::UserInfo),
            _ => None,
        }
    }
}

/// Load status of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    Unloaded,
    Loading,
    Loaded,
    Changed,
}

/// Client-side caching policy announced by the configuration cube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCacheType {
    /// 'N' - clients must not cache
    Disabled,

    /// 'Y' - clients may cache everything except rule-covered areas
    NoRules,

    /// 'E' - clients may cache everything
    All,
}

impl ClientCacheType {
    /// Parse the configuration cell character
    pub fn from_cell(value: &str) -> Self {
        match value {
            "Y" => ClientCacheType::NoRules,
            "E" => ClientCacheType::All,
            _ => ClientCacheType::Disabled,
        }
    }
}

/// Database of the server
#[derive(Debug)]
pub struct Database {
    /// Server-local identifier
    pub id: DatabaseId,

    /// Display name, unique per server (case-insensitive)
    pub name: String,

    /// Subtype tag
    pub subtype: DatabaseSubtype,

    /// Load status
    pub status: DatabaseStatus,

    /// Version counter, bumped on every mutation inside the database
    pub token: Token,

    /// May the database be deleted
    pub deletable: bool,

    /// May the database be renamed
    pub renamable: bool,

    /// May dimensions and cubes be added or removed
    pub extensible: bool,

    /// Client cache policy, derived from the configuration cube
    pub client_cache: ClientCacheType,

    /// Hide-elements flag, derived from the configuration cube
    pub hide_elements: bool,

    /// Structural journal of the database, when persisted
    pub journal: Option<JournalWriter>,

    /// Per-cube cell journals, when persisted
    pub cube_journals: HashMap<CubeId, JournalWriter>,

    dimensions: Vec<Option<Dimension>>,
    free_dimensions: BTreeSet<DimensionId>,
    dimension_names: HashMap<String, DimensionId>,

    cubes: Vec<Option<Cube>>,
    free_cubes: BTreeSet<CubeId>,
    cube_names: HashMap<String, CubeId>,
}

impl Database {
    /// Create an empty database
    pub fn new(id: DatabaseId, name: &str, subtype: DatabaseSubtype) -> Self {
        Self {
            id,
            name: name.to_string(),
            subtype,
            status: DatabaseStatus::Changed,
            token: Token::new(),
            deletable: subtype == DatabaseSubtype::Normal,
            renamable: subtype == DatabaseSubtype::Normal,
            extensible: true,
            client_cache: ClientCacheType::Disabled,
            hide_elements: false,
            journal: None,
            cube_journals: HashMap::new(),
            dimensions: Vec::new(),
            free_dimensions: BTreeSet::new(),
            dimension_names: HashMap::new(),
            cubes: Vec::new(),
            free_cubes: BTreeSet::new(),
            cube_names: HashMap::new(),
        }
    }

    /// Flip a loaded database to changed so the next save picks it up
    pub fn mark_changed(&mut self) {
        if self.status == DatabaseStatus::Loaded {
            self.status = DatabaseStatus::Changed;
        }
    }

    /// Fail unless the database is loaded
    pub fn check_loaded(&self) -> OlapResult<()> {
        match self.status {
            DatabaseStatus::Unloaded => Err(OlapError::DatabaseNotLoaded(self.name.clone())),
            _ => Ok(()),
        }
    }

    /// Append a record to the database journal, if one is open
    pub fn journal_record(&mut self, username: &str, event: &str, command: &str, operands: Vec<String>) {
        if let Some(journal) = self.journal.as_mut() {
            let record = JournalRecord::new(username, event, command, operands);
            if let Err(err) = journal.append(&record) {
                log::error!("database '{}': journal append failed: {}", self.name, err);
            }
        }
    }

    /// Append a record to a cube journal, if one is open
    pub fn cube_journal_record(
        &mut self,
        cube: CubeId,
        username: &str,
        event: &str,
        command: &str,
        operands: Vec<String>,
    ) {
        if let Some(journal) = self.cube_journals.get_mut(&cube) {
            let record = JournalRecord::new(username, event, command, operands);
            if let Err(err) = journal.append(&record) {
                log::error!("cube journal append failed: {}", err);
            }
        }
    }

    // dimension arena

    /// Reserve the next dimension identifier
    pub fn fetch_dimension_id(&mut self) -> DimensionId {
        match self.free_dimensions.iter().next().copied() {
            Some(id) => {
                self.free_dimensions.remove(&id);
                id
            }
            None => {
                self.dimensions.push(None);
                (self.dimensions.len() - 1) as DimensionId
            }
        }
    }

    /// Insert a constructed dimension into its reserved slot
    pub fn add_dimension(&mut self, dimension: Dimension) -> OlapResult<DimensionId> {
        let key = dimension.name.to_lowercase();
        if self.dimension_names.contains_key(&key) {
            return Err(OlapError::DimensionNameInUse(dimension.name));
        }
        let id = dimension.id;
        while self.dimensions.len() <= id as usize {
            self.free_dimensions.insert(self.dimensions.len() as DimensionId);
            self.dimensions.push(None);
        }
        if self.dimensions[id as usize].is_some() {
            return Err(OlapError::Internal(format!("dimension slot {} not free", id)));
        }
        self.free_dimensions.remove(&id);
        self.dimension_names.insert(key, id);
        self.dimensions[id as usize] = Some(dimension);
        self.mark_changed();
        self.token.bump();
        Ok(id)
    }

    /// Dimension by id, if present
    pub fn lookup_dimension(&self, id: DimensionId) -> Option<&Dimension> {
        self.dimensions.get(id as usize).and_then(|d| d.as_ref())
    }

    /// Dimension by id
    pub fn dimension(&self, id: DimensionId) -> OlapResult<&Dimension> {
        self.lookup_dimension(id)
            .ok_or_else(|| OlapError::DimensionNotFound(format!("dimension id {}", id)))
    }

    /// Mutable dimension by id
    pub fn dimension_mut(&mut self, id: DimensionId) -> OlapResult<&mut Dimension> {
        self.dimensions
            .get_mut(id as usize)
            .and_then(|d| d.as_mut())
            .ok_or_else(|| OlapError::DimensionNotFound(format!("dimension id {}", id)))
    }

    /// Dimension by name, case-insensitive
    pub fn find_dimension_by_name(&self, name: &str) -> OlapResult<&Dimension> {
        self.dimension_names
            .get(&name.to_lowercase())
            .and_then(|id| self.lookup_dimension(*id))
            .ok_or_else(|| OlapError::DimensionNotFound(name.to_string()))
    }

    /// Live dimensions in id order
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().filter_map(|d| d.as_ref())
    }

    /// Number of live dimensions
    pub fn dimension_count(&self) -> usize {
        self.dimensions().count()
    }

    // cube arena

    /// Reserve the next cube identifier
    pub fn fetch_cube_id(&mut self) -> CubeId {
        match self.free_cubes.iter().next().copied() {
            Some(id) => {
                self.free_cubes.remove(&id);
                id
            }
            None => {
                self.cubes.push(None);
                (self.cubes.len() - 1) as CubeId
            }
        }
    }

    /// Insert a constructed cube into its reserved slot
    pub fn add_cube(&mut self, cube: Cube) -> OlapResult<CubeId> {
        let key = cube.name.to_lowercase();
        if self.cube_names.contains_key(&key) {
            return Err(OlapError::CubeNameInUse(cube.name));
        }
        for dim in &cube.dimensions {
            self.dimension(*dim)?;
        }
        if cube.dimensions.is_empty() {
            return Err(OlapError::InvalidCoordinates(
                "cube without dimensions".to_string(),
            ));
        }
        let id = cube.id;
        while self.cubes.len() <= id as usize {
            self.free_cubes.insert(self.cubes.len() as CubeId);
            self.cubes.push(None);
        }
        if self.cubes[id as usize].is_some() {
            return Err(OlapError::Internal(format!("cube slot {} not free", id)));
        }
        self.free_cubes.remove(&id);
        self.cube_names.insert(key, id);
        self.cubes[id as usize] = Some(cube);
        self.mark_changed();
        self.token.bump();
        Ok(id)
    }

    /// Cube by id, if present
    pub fn lookup_cube(&self, id: CubeId) -> Option<&Cube> {
        self.cubes.get(id as usize).and_then(|c| c.as_ref())
    }

    /// Cube by id
    pub fn cube(&self, id: CubeId) -> OlapResult<&Cube> {
        self.lookup_cube(id)
            .ok_or_else(|| OlapError::CubeNotFound(format!("cube id {}", id)))
    }

    /// Mutable cube by id
    pub fn cube_mut(&mut self, id: CubeId) -> OlapResult<&mut Cube> {
        self.cubes
            .get_mut(id as usize)
            .and_then(|c| c.as_mut())
            .ok_or_else(|| OlapError::CubeNotFound(format!("cube id {}", id)))
    }

    /// Cube by name, case-insensitive
    pub fn find_cube_by_name(&self, name: &str) -> OlapResult<&Cube> {
        self.cube_names
            .get(&name.to_lowercase())
            .and_then(|id| self.lookup_cube(*id))
            .ok_or_else(|| OlapError::CubeNotFound(name.to_string()))
    }

    /// Mutable cube by name, case-insensitive
    pub fn find_cube_by_name_mut(&mut self, name: &str) -> OlapResult<&mut Cube> {
        let id = *self
            .cube_names
            .get(&name.to_lowercase())
            .ok_or_else(|| OlapError::CubeNotFound(name.to_string()))?;
        self.cube_mut(id)
    }

    /// Live cubes in id order
    pub fn cubes(&self) -> impl Iterator<Item = &Cube> {
        self.cubes.iter().filter_map(|c| c.as_ref())
    }

    /// Mutable live cubes in id order
    pub fn cubes_mut(&mut self) -> impl Iterator<Item = &mut Cube> {
        self.cubes.iter_mut().filter_map(|c| c.as_mut())
    }

    /// Number of live cubes
    pub fn cube_count(&self) -> usize {
        self.cubes().count()
    }

    // dimension lifecycle with the attributed protocol

    /// Create a dimension and its auto-managed companions
    pub fn create_dimension(
        &mut self,
        name: &str,
        subtype: DimensionSubtype,
    ) -> OlapResult<DimensionId> {
        if !self.extensible {
            return Err(OlapError::NotAuthorized(format!(
                "database '{}' cannot be extended",
                self.name
            )));
        }

        let id = self.fetch_dimension_id();
        let dimension = Dimension::new(id, name, subtype);
        match self.add_dimension(dimension) {
            Ok(id) => id,
            Err(err) => {
                self.free_dimensions.insert(id);
                return Err(err);
            }
        };

        if subtype.is_attributed() {
            if let Err(err) = self.create_attribute_companions(id, name) {
                log::error!("companions of dimension '{}' failed: {}", name, err);
                self.drop_dimension_entry(id);
                return Err(err);
            }
        }

        if subtype == DimensionSubtype::Normal {
            self.create_group_dimension_data_cube(id, name)?;
        }

        self.sync_dimension_list();
        Ok(id)
    }

    fn create_attribute_companions(&mut self, dimension: DimensionId, name: &str) -> OlapResult<()> {
        let attr_dim_name = names::attribute_dimension_name(name);
        let attr_dim_id = self.fetch_dimension_id();
        let mut attr_dim = Dimension::new(attr_dim_id, &attr_dim_name, DimensionSubtype::Attributes);
        attr_dim.deletable = false;
        attr_dim.renamable = false;
        self.add_dimension(attr_dim)?;

        let attr_cube_name = names::attribute_cube_name(name);
        let attr_cube_id = self.fetch_cube_id();
        let mut attr_cube = Cube::new(
            attr_cube_id,
            &attr_cube_name,
            vec![attr_dim_id, dimension],
            CubeSubtype::Attributes,
        );
        attr_cube.deletable = false;
        attr_cube.renamable = false;
        self.add_cube(attr_cube)?;

        Ok(())
    }

    fn create_group_dimension_data_cube(
        &mut self,
        dimension: DimensionId,
        name: &str,
    ) -> OlapResult<()> {
        // rights cubes exist only where a group dimension is present
        let group = match self.find_dimension_by_name(names::GROUP_DIMENSION) {
            Ok(group) => group.id,
            Err(_) => return Ok(()),
        };

        let cube_name = names::group_dimension_data_cube_name(name);
        let cube_id = self.fetch_cube_id();
        let mut cube = Cube::new(cube_id, &cube_name, vec![group, dimension], CubeSubtype::Rights);
        cube.deletable = false;
        cube.renamable = false;
        self.add_cube(cube)?;
        Ok(())
    }

    fn drop_dimension_entry(&mut self, id: DimensionId) {
        if let Some(dimension) = self.dimensions.get_mut(id as usize).and_then(|d| d.take()) {
            self.dimension_names.remove(&dimension.name.to_lowercase());
            self.free_dimensions.insert(id);
        }
    }

    fn drop_cube_entry(&mut self, id: CubeId) {
        if let Some(cube) = self.cubes.get_mut(id as usize).and_then(|c| c.take()) {
            self.cube_names.remove(&cube.name.to_lowercase());
            self.free_cubes.insert(id);
            self.cube_journals.remove(&id);
        }
    }

    /// Delete a dimension and its auto-managed companions
    pub fn delete_dimension(&mut self, id: DimensionId) -> OlapResult<()> {
        let (name, subtype, deletable) = {
            let dimension = self.dimension(id)?;
            (dimension.name.clone(), dimension.subtype, dimension.deletable)
        };
        if !deletable {
            return Err(OlapError::DimensionUndeletable(name));
        }

        // companion cubes go first so the in-use check below only sees
        // genuine user cubes
        if subtype.is_attributed() {
            self.delete_cube_by_name_if_present(&names::attribute_cube_name(&name))?;
        }
        if subtype == DimensionSubtype::Normal {
            self.delete_cube_by_name_if_present(&names::group_dimension_data_cube_name(&name))?;
        }

        let in_use: Vec<String> = self
            .cubes()
            .filter(|cube| cube.uses_dimension(id))
            .map(|cube| cube.name.clone())
            .collect();
        if !in_use.is_empty() {
            return Err(OlapError::DimensionInUse(format!(
                "'{}' used by {}",
                name,
                in_use.join(", ")
            )));
        }

        self.drop_dimension_entry(id);

        if subtype.is_attributed() {
            let attr_name = names::attribute_dimension_name(&name);
            if let Ok(attr) = self.find_dimension_by_name(&attr_name) {
                let attr_id = attr.id;
                self.drop_dimension_entry(attr_id);
            }
        }

        self.sync_dimension_list();
        self.mark_changed();
        self.token.bump();
        Ok(())
    }

    fn delete_cube_by_name_if_present(&mut self, name: &str) -> OlapResult<()> {
        if let Some(id) = self.cube_names.get(&name.to_lowercase()).copied() {
            self.drop_cube_entry(id);
            self.sync_cube_list();
        }
        Ok(())
    }

    /// Rename a dimension and its auto-managed companions
    pub fn rename_dimension(&mut self, id: DimensionId, new_name: &str) -> OlapResult<()> {
        let (old_name, subtype, renamable) = {
            let dimension = self.dimension(id)?;
            (dimension.name.clone(), dimension.subtype, dimension.renamable)
        };
        if !renamable {
            return Err(OlapError::DimensionUnrenamable(old_name));
        }
        if old_name == new_name {
            return Ok(());
        }
        if old_name.to_lowercase() != new_name.to_lowercase()
            && self.dimension_names.contains_key(&new_name.to_lowercase())
        {
            return Err(OlapError::DimensionNameInUse(new_name.to_string()));
        }

        self.rename_dimension_entry(id, new_name)?;

        if subtype.is_attributed() {
            let attr_old = names::attribute_dimension_name(&old_name);
            let attr_new = names::attribute_dimension_name(new_name);
            if let Ok(attr) = self.find_dimension_by_name(&attr_old) {
                let attr_id = attr.id;
                self.rename_dimension_entry(attr_id, &attr_new)?;
            }
            self.rename_cube_entry_by_name(
                &names::attribute_cube_name(&old_name),
                &names::attribute_cube_name(new_name),
            )?;
        }
        if subtype == DimensionSubtype::Normal {
            self.rename_cube_entry_by_name(
                &names::group_dimension_data_cube_name(&old_name),
                &names::group_dimension_data_cube_name(new_name),
            )?;
        }

        self.sync_dimension_list();
        self.mark_changed();
        self.token.bump();
        Ok(())
    }

    fn rename_dimension_entry(&mut self, id: DimensionId, new_name: &str) -> OlapResult<()> {
        let old_key = self.dimension(id)?.name.to_lowercase();
        self.dimension_names.remove(&old_key);
        self.dimension_names.insert(new_name.to_lowercase(), id);
        self.dimension_mut(id)?.name = new_name.to_string();
        Ok(())
    }

    fn rename_cube_entry_by_name(&mut self, old_name: &str, new_name: &str) -> OlapResult<()> {
        if let Some(id) = self.cube_names.get(&old_name.to_lowercase()).copied() {
            self.cube_names.remove(&old_name.to_lowercase());
            self.cube_names.insert(new_name.to_lowercase(), id);
            self.cube_mut(id)?.name = new_name.to_string();
            self.rename_meta_element(names::CUBE_DIMENSION, old_name, new_name);
        }
        Ok(())
    }

    // cube lifecycle

    /// Create a cube over existing dimensions
    pub fn create_cube(
        &mut self,
        name: &str,
        dimensions: Vec<DimensionId>,
        subtype: CubeSubtype,
    ) -> OlapResult<CubeId> {
        if !self.extensible {
            return Err(OlapError::NotAuthorized(format!(
                "database '{}' cannot be extended",
                self.name
            )));
        }

        let id = self.fetch_cube_id();
        let cube = Cube::new(id, name, dimensions, subtype);
        match self.add_cube(cube) {
            Ok(id) => id,
            Err(err) => {
                self.free_cubes.insert(id);
                return Err(err);
            }
        };

        self.sync_cube_list();
        Ok(id)
    }

    /// Delete a cube
    pub fn delete_cube(&mut self, id: CubeId) -> OlapResult<()> {
        let (name, deletable) = {
            let cube = self.cube(id)?;
            (cube.name.clone(), cube.deletable)
        };
        if !deletable {
            return Err(OlapError::CubeUndeletable(name));
        }

        self.drop_cube_entry(id);
        self.remove_meta_element(names::CUBE_DIMENSION, &name);
        self.sync_cube_list();
        self.mark_changed();
        self.token.bump();
        Ok(())
    }

    /// Rename a cube
    pub fn rename_cube(&mut self, id: CubeId, new_name: &str) -> OlapResult<()> {
        let (old_name, renamable) = {
            let cube = self.cube(id)?;
            (cube.name.clone(), cube.renamable)
        };
        if !renamable {
            return Err(OlapError::CubeUnrenamable(old_name));
        }
        if old_name == new_name {
            return Ok(());
        }
        if old_name.to_lowercase() != new_name.to_lowercase()
            && self.cube_names.contains_key(&new_name.to_lowercase())
        {
            return Err(OlapError::CubeNameInUse(new_name.to_string()));
        }

        self.rename_cube_entry_by_name(&old_name, new_name)?;
        self.sync_cube_list();
        self.mark_changed();
        self.token.bump();
        Ok(())
    }

    // meta dimension synchronization

    /// Rebuild the cube-list meta dimension from the live cubes
    pub fn sync_cube_list(&mut self) {
        self.sync_meta_dimension(
            names::CUBE_DIMENSION,
            |db| {
                db.cubes()
                    .filter(|c| matches!(c.subtype, CubeSubtype::Normal | CubeSubtype::UserInfo))
                    .map(|c| c.name.clone())
                    .collect()
            },
        );
    }

    /// Rebuild the dimension-list meta dimension from the live dimensions
    pub fn sync_dimension_list(&mut self) {
        self.sync_meta_dimension(
            names::DIMENSION_DIMENSION,
            |db| {
                db.dimensions()
                    .filter(|d| {
                        matches!(d.subtype, DimensionSubtype::Normal | DimensionSubtype::UserInfo)
                    })
                    .map(|d| d.name.clone())
                    .collect()
            },
        );
    }

    fn sync_meta_dimension(&mut self, meta_name: &str, wanted: fn(&Database) -> Vec<String>) {
        let meta_id = match self.find_dimension_by_name(meta_name) {
            Ok(dimension) => dimension.id,
            Err(_) => return,
        };
        let wanted = wanted(self);

        if let Ok(meta) = self.dimension_mut(meta_id) {
            let current: Vec<(ElementId, String)> = meta
                .graph
                .elements()
                .map(|e| (e.id, e.name.clone()))
                .collect();
            for (id, name) in &current {
                if !wanted.iter().any(|w| w.eq_ignore_ascii_case(name)) {
                    let _ = meta.graph.delete(*id);
                }
            }
            for name in &wanted {
                if meta.graph.find_by_name(name).is_none() {
                    let _ = meta.graph.add(name, ElementKind::Text);
                }
            }
            meta.token.bump();
        }
    }

    fn remove_meta_element(&mut self, meta_name: &str, element: &str) {
        if let Ok(meta) = self.find_dimension_by_name(meta_name) {
            let meta_id = meta.id;
            if let Ok(meta) = self.dimension_mut(meta_id) {
                if let Some(e) = meta.graph.find_by_name(element) {
                    let id = e.id;
                    let _ = meta.graph.delete(id);
                }
            }
        }
    }

    fn rename_meta_element(&mut self, meta_name: &str, old_name: &str, new_name: &str) {
        if let Ok(meta) = self.find_dimension_by_name(meta_name) {
            let meta_id = meta.id;
            if let Ok(meta) = self.dimension_mut(meta_id) {
                if let Some(e) = meta.graph.find_by_name(old_name) {
                    let id = e.id;
                    let _ = meta.graph.rename(id, new_name);
                }
            }
        }
    }

    // element cascade

    /// Delete an element, cascading to cells, rules and attribute cubes
    ///
    /// Fails if any active lock area on any cube mentions the element.
    pub fn delete_element_cascading(
        &mut self,
        dimension: DimensionId,
        element: ElementId,
    ) -> OlapResult<()> {
        let axes: Vec<(CubeId, Vec<usize>)> = self
            .cubes()
            .filter(|cube| cube.uses_dimension(dimension))
            .map(|cube| {
                let axes = cube
                    .dimensions
                    .iter()
                    .enumerate()
                    .filter(|(_, d)| **d == dimension)
                    .map(|(i, _)| i)
                    .collect();
                (cube.id, axes)
            })
            .collect();

        for (cube_id, cube_axes) in &axes {
            let cube = self.cube(*cube_id)?;
            for axis in cube_axes {
                if cube.locks.references_element(*axis, element) {
                    return Err(OlapError::LockedArea);
                }
            }
        }

        self.dimension_mut(dimension)?.delete_element(element)?;

        for (cube_id, cube_axes) in axes {
            if let Ok(cube) = self.cube_mut(cube_id) {
                for axis in cube_axes {
                    cube.purge_element(axis, element);
                }
            }
        }

        self.mark_changed();
        self.token.bump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::new(0, "Demo", DatabaseSubtype::Normal)
    }

    #[test]
    fn test_create_dimension_with_companions() {
        let mut d = db();
        let id = d.create_dimension("Products", DimensionSubtype::Normal).unwrap();

        assert_eq!(d.dimension(id).unwrap().name, "Products");
        assert!(d.find_dimension_by_name("#_Products_").is_ok());
        assert!(d.find_cube_by_name("#_Products").is_ok());

        let attr_cube = d.find_cube_by_name("#_Products").unwrap();
        assert_eq!(attr_cube.subtype, CubeSubtype::Attributes);
        assert_eq!(attr_cube.dimensions.len(), 2);
    }

    #[test]
    fn test_rename_dimension_renames_companions() {
        let mut d = db();
        let id = d.create_dimension("Products", DimensionSubtype::Normal).unwrap();

        d.rename_dimension(id, "Articles").unwrap();

        assert!(d.find_dimension_by_name("Products").is_err());
        assert!(d.find_dimension_by_name("#_Articles_").is_ok());
        assert!(d.find_cube_by_name("#_Articles").is_ok());
        assert!(d.find_cube_by_name("#_Products").is_err());
    }

    #[test]
    fn test_delete_dimension_cascades() {
        let mut d = db();
        let id = d.create_dimension("Products", DimensionSubtype::Normal).unwrap();

        d.delete_dimension(id).unwrap();

        assert!(d.find_dimension_by_name("Products").is_err());
        assert!(d.find_dimension_by_name("#_Products_").is_err());
        assert!(d.find_cube_by_name("#_Products").is_err());
    }

    #[test]
    fn test_delete_dimension_in_use_fails() {
        let mut d = db();
        let x = d.create_dimension("X", DimensionSubtype::Normal).unwrap();
        let y = d.create_dimension("Y", DimensionSubtype::Normal).unwrap();
        d.create_cube("C", vec![x, y], CubeSubtype::Normal).unwrap();

        assert!(matches!(
            d.delete_dimension(x),
            Err(OlapError::DimensionInUse(_))
        ));
    }

    #[test]
    fn test_cube_list_sync() {
        let mut d = db();
        d.create_dimension("#_CUBE_", DimensionSubtype::CubeList)
            .unwrap();
        let x = d.create_dimension("X", DimensionSubtype::Normal).unwrap();
        let c = d.create_cube("Sales", vec![x], CubeSubtype::Normal).unwrap();

        let meta = d.find_dimension_by_name("#_CUBE_").unwrap();
        assert!(meta.graph.find_by_name("Sales").is_some());
        // attribute cube is not listed
        assert!(meta.graph.find_by_name("#_X").is_none());

        d.delete_cube(c).unwrap();
        let meta = d.find_dimension_by_name("#_CUBE_").unwrap();
        assert!(meta.graph.find_by_name("Sales").is_none());
    }

    #[test]
    fn test_delete_element_purges_cells() {
        let mut d = db();
        let x = d.create_dimension("X", DimensionSubtype::Normal).unwrap();
        let y = d.create_dimension("Y", DimensionSubtype::Normal).unwrap();
        let x1 = d.dimension_mut(x).unwrap().add_element("x1", ElementKind::Numeric).unwrap();
        let y1 = d.dimension_mut(y).unwrap().add_element("y1", ElementKind::Numeric).unwrap();
        let c = d.create_cube("C", vec![x, y], CubeSubtype::Normal).unwrap();

        d.cube_mut(c).unwrap().store_numeric(vec![x1, y1], 5.0);
        d.delete_element_cascading(x, x1).unwrap();

        assert_eq!(d.cube(c).unwrap().size_filled(), 0);
        assert!(d.dimension(x).unwrap().find_element(x1).is_err());
    }

    #[test]
    fn test_unextensible_database_rejects_creation() {
        let mut d = db();
        d.extensible = false;
        assert!(d.create_dimension("X", DimensionSubtype::Normal).is_err());
    }
}
