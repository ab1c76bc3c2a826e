// Cell reads
// Rules first, then the store for base paths, then weighted aggregation
// over the base expansion for consolidated numeric paths

use crate::core::{
    CellValue, CubeId, DatabaseId, DimensionId, ElementId, Identifier, OlapError, OlapResult,
    RuleId,
};
use crate::cubes::Area;
use crate::elements::ElementKind;
use crate::locks::LockInfo;
use crate::rules::eval::{evaluate_rule, EvalContext};
use crate::server::Server;

/// Value kind of a coordinate, derived from its elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    Numeric,
    Text,
}

/// Result of one cell read
#[derive(Debug, Clone, PartialEq)]
pub struct CellResult {
    /// Cell value, or the path-type default
    pub value: CellValue,

    /// True if a stored or computed value backs the result
    pub found: bool,

    /// Rule that produced the value, if any
    pub rule: Option<RuleId>,

    /// Lock covering the coordinate, if any
    pub lock: Option<LockInfo>,

    /// Error of this cell inside a bulk read
    pub error: Option<OlapError>,
}

impl CellResult {
    fn empty(path_type: PathType) -> Self {
        Self {
            value: match path_type {
                PathType::Numeric => CellValue::default_numeric(),
                PathType::Text => CellValue::default_text(),
            },
            found: false,
            rule: None,
            lock: None,
            error: None,
        }
    }

    fn failed(error: OlapError) -> Self {
        Self {
            value: CellValue::default_numeric(),
            found: false,
            rule: None,
            lock: None,
            error: Some(error),
        }
    }
}

impl Server {
    /// Validate a coordinate against a cube: arity and element existence
    pub fn validate_coordinates(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<()> {
        let cube_ref = self.database(database)?.cube(cube)?;
        if coord.len() != cube_ref.dimensions.len() {
            return Err(OlapError::InvalidCoordinates(format!(
                "cube '{}' expects {} coordinates, found {}",
                cube_ref.name,
                cube_ref.dimensions.len(),
                coord.len()
            )));
        }
        for (element, dim) in coord.iter().zip(cube_ref.dimensions.clone()) {
            let dimension = self.resolve_dimension(database, dim)?;
            dimension.find_element(*element)?;
        }
        Ok(())
    }

    /// Path type of a coordinate
    ///
    /// A single string-typed element, or a string-valued consolidation,
    /// makes the whole path a string path.
    pub fn path_type(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<PathType> {
        let dims = self.database(database)?.cube(cube)?.dimensions.clone();
        for (element, dim) in coord.iter().zip(dims) {
            let dimension = self.resolve_dimension(database, dim)?;
            let e = dimension.find_element(*element)?;
            match e.kind {
                ElementKind::Text => return Ok(PathType::Text),
                ElementKind::Consolidated if dimension.graph.is_string_consolidated(*element) => {
                    return Ok(PathType::Text)
                }
                _ => {}
            }
        }
        Ok(PathType::Numeric)
    }

    /// True if no coordinate element is consolidated
    pub fn is_base_path(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<bool> {
        let dims = self.database(database)?.cube(cube)?.dimensions.clone();
        for (element, dim) in coord.iter().zip(dims) {
            let dimension = self.resolve_dimension(database, dim)?;
            if !dimension.find_element(*element)?.is_base() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Single-cell read with rights enforcement
    pub fn get_cell_value(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        user: Option<Identifier>,
    ) -> OlapResult<CellResult> {
        self.database(database)?.check_loaded()?;
        self.check_cell_right(user, database, cube, coord, crate::auth::Right::Read)?;
        self.resolve_pending_markers(database, cube);

        let mut ctx = EvalContext::new();
        self.read_cell(database, cube, coord, &mut ctx)
    }

    /// Cell read without rights enforcement; shared by rule evaluation
    /// and the rights derivation itself
    pub(crate) fn read_cell(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
        ctx: &mut EvalContext,
    ) -> OlapResult<CellResult> {
        self.validate_coordinates(database, cube, coord)?;
        let path_type = self.path_type(database, cube, coord)?;
        let cube_ref = self.database(database)?.cube(cube)?;

        // rules come first
        let rule_ids: Vec<RuleId> = cube_ref
            .active_rules()
            .filter(|r| r.matches(coord))
            .map(|r| r.id)
            .collect();

        for rule_id in rule_ids {
            let key = (cube, rule_id, coord.to_vec());
            if ctx.history.contains(&key) {
                // evaluation cycle: this rule contributes no value here
                continue;
            }

            if let Some(value) = cube_ref.cached_rule_value(rule_id, coord) {
                return Ok(CellResult {
                    value,
                    found: true,
                    rule: Some(rule_id),
                    lock: None,
                    error: None,
                });
            }

            ctx.history.insert(key);
            let rule = cube_ref.rule(rule_id)?.clone();
            let evaluated = evaluate_rule(self, database, cube, &rule, coord, ctx)?;

            if let Some(value) = evaluated {
                cube_ref.store_rule_value(rule_id, coord.to_vec(), value.clone());
                return Ok(CellResult {
                    value,
                    found: true,
                    rule: Some(rule_id),
                    lock: None,
                    error: None,
                });
            }
        }

        // base path: plain store lookup
        if self.is_base_path(database, cube, coord)? {
            return Ok(match cube_ref.stored_value(coord) {
                Some(value) => CellResult {
                    value,
                    found: true,
                    rule: None,
                    lock: None,
                    error: None,
                },
                None => CellResult::empty(path_type),
            });
        }

        // string paths never aggregate
        if path_type == PathType::Text {
            return Ok(match cube_ref.stored_value(coord) {
                Some(value) => CellResult {
                    value,
                    found: true,
                    rule: None,
                    lock: None,
                    error: None,
                },
                None => CellResult::empty(path_type),
            });
        }

        // consolidated numeric path: weighted aggregation
        let (value, found) = match cube_ref.cached_consolidation(coord) {
            Some(cached) => cached,
            None => {
                let computed = self.aggregate(database, cube, coord)?;
                cube_ref.store_consolidation(coord.to_vec(), computed.0, computed.1);
                computed
            }
        };

        Ok(CellResult {
            value: CellValue::Numeric(value),
            found,
            rule: None,
            lock: None,
            error: None,
        })
    }

    /// Weighted sum over the base expansion of a consolidated coordinate
    fn aggregate(
        &self,
        database: DatabaseId,
        cube: CubeId,
        coord: &[ElementId],
    ) -> OlapResult<(f64, bool)> {
        let cube_ref = self.database(database)?.cube(cube)?;
        let dims = cube_ref.dimensions.clone();

        // weighted base list per dimension
        let mut base_lists: Vec<Vec<(ElementId, f64)>> = Vec::with_capacity(dims.len());
        for (element, dim) in coord.iter().zip(&dims) {
            let dimension = self.resolve_dimension(database, *dim)?;
            let list = dimension.graph.base_set(*element);
            if list.is_empty() {
                // a dimension without numeric base cells zeroes the sum
                return Ok((0.0, false));
            }
            base_lists.push(list);
        }

        let product: usize = base_lists
            .iter()
            .fold(1usize, |acc, l| acc.saturating_mul(l.len()));

        let mut total = 0.0;
        let mut found = false;

        if product <= cube_ref.numeric.len() {
            // walk the Cartesian product
            let mut odometer = vec![0usize; base_lists.len()];
            loop {
                let mut cell = Vec::with_capacity(base_lists.len());
                let mut weight = 1.0;
                for (slot, list) in odometer.iter().zip(&base_lists) {
                    let (element, w) = list[*slot];
                    cell.push(element);
                    weight *= w;
                }
                if let Some(value) = cube_ref.numeric.get(&cell) {
                    total += weight * value;
                    found = true;
                }

                let mut axis = base_lists.len();
                loop {
                    if axis == 0 {
                        return Ok((total, found));
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

        // sparse side: walk the filled cells and weigh the matches
        let weight_maps: Vec<std::collections::HashMap<ElementId, f64>> = base_lists
            .iter()
            .map(|list| list.iter().copied().collect())
            .collect();

        'cells: for (cell, value) in cube_ref.numeric.iter() {
            let mut weight = 1.0;
            for (element, weights) in cell.iter().zip(&weight_maps) {
                match weights.get(element) {
                    Some(w) => weight *= w,
                    None => continue 'cells,
                }
            }
            total += weight * value;
            found = true;
        }

        Ok((total, found))
    }

    /// Resolve an area description into concrete per-dimension lists
    ///
    /// `None` selects every element of the dimension, or only the base
    /// elements with `base_only`, in position order.
    pub fn resolve_area(
        &self,
        database: DatabaseId,
        cube: CubeId,
        spec: &[Option<Vec<ElementId>>],
        base_only: bool,
    ) -> OlapResult<Area> {
        let dims: Vec<DimensionId> = self.database(database)?.cube(cube)?.dimensions.clone();
        if spec.len() != dims.len() {
            return Err(OlapError::InvalidCoordinates(format!(
                "area expects {} dimensions, found {}",
                dims.len(),
                spec.len()
            )));
        }

        let mut sets = Vec::with_capacity(dims.len());
        for (slot, dim) in spec.iter().zip(&dims) {
            let dimension = self.resolve_dimension(database, *dim)?;
            let set = match slot {
                Some(elements) => {
                    for element in elements {
                        dimension.find_element(*element)?;
                    }
                    elements.clone()
                }
                None => dimension
                    .graph
                    .elements()
                    .filter(|e| !base_only || e.is_base())
                    .map(|e| e.id)
                    .collect(),
            };
            sets.push(set);
        }

        Area::new(sets)
    }

    /// Bulk read over an area, in lexicographic product order
    pub fn get_area_values(
        &self,
        database: DatabaseId,
        cube: CubeId,
        area: &Area,
        skip_empty: bool,
        user: Option<Identifier>,
    ) -> OlapResult<Vec<(Vec<ElementId>, CellResult)>> {
        self.database(database)?.check_loaded()?;
        self.resolve_pending_markers(database, cube);
        let cube_ref = self.database(database)?.cube(cube)?;

        let mut results = Vec::new();
        for coord in area.iter() {
            let mut result = match self.check_cell_right(
                user,
                database,
                cube,
                &coord,
                crate::auth::Right::Read,
            ) {
                Ok(()) => {
                    let mut ctx = EvalContext::new();
                    match self.read_cell(database, cube, &coord, &mut ctx) {
                        Ok(result) => result,
                        Err(err) => CellResult::failed(err),
                    }
                }
                Err(err) => CellResult::failed(err),
            };

            if skip_empty && result.error.is_none() && !result.found {
                continue;
            }

            result.lock = cube_ref.locks.find_covering(&coord).map(|l| l.info());
            results.push((coord, result));
        }

        Ok(results)
    }
}
