// Cube type
// Dimensions are fixed at creation; cells live in two sparse stores, one
// per value kind, and a coordinate is filled in at most one of them

use crate::core::{CellValue, CubeId, DimensionId, ElementId, OlapError, OlapResult, RuleId};
use crate::cubes::CellStore;
use crate::locks::LockSet;
use crate::rules::{Marker, Rule};
use crate::tokens::Token;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Subtype of a cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CubeSubtype {
    /// Plain user-created cube
    Normal,

    /// Auto-managed attribute cube of an attributed dimension
    Attributes,

    /// Rights cube (authorization cells, one-character values)
    Rights,

    /// Per-database configuration cube
    Configuration,

    /// Subset or view storage cube
    SubsetView,

    /// User-defined info cube
    UserInfo,
}

impl CubeSubtype {
    /// Persistence code of the subtype
    pub fn code(self) -> u32 {
        match self {
            CubeSubtype::Normal => 0,
            CubeSubtype::Attributes => 2,
            CubeSubtype::Rights => 3,
            CubeSubtype::Configuration => 7,
            CubeSubtype::SubsetView => 8,
            CubeSubtype::UserInfo => 9,
        }
    }

    /// Parse a persistence code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(CubeSubtype::Normal),
            2 => Some(CubeSubtype::Attributes),
            3 => Some(CubeSubtype::Rights),
            7 => Some(CubeSubtype::Configuration),
            8 => Some(CubeSubtype::SubsetView),
            9 => Some(CubeSubtype::UserInfo),
            _ => None,
        }
    }

    /// Wire type reported in cube listings
    /// (0=normal, 1=system, 2=attribute, 3=user info)
    pub fn wire_type(self) -> u32 {
        match self {
            CubeSubtype::Normal => 0,
            CubeSubtype::Attributes => 2,
            CubeSubtype::UserInfo => 3,
            _ => 1,
        }
    }
}

/// Load status of a cube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeStatus {
    Unloaded,
    Loaded,
    Changed,
}

/// Cube of a database
#[derive(Debug)]
pub struct Cube {
    /// Database-local identifier
    pub id: CubeId,

    /// Display name, unique per database (case-insensitive)
    pub name: String,

    /// Ordered dimension list, fixed at creation
    pub dimensions: Vec<DimensionId>,

    /// Subtype tag
    pub subtype: CubeSubtype,

    /// May the cube be deleted
    pub deletable: bool,

    /// May the cube be renamed
    pub renamable: bool,

    /// Load status
    pub status: CubeStatus,

    /// Numeric cell partition
    pub numeric: CellStore<f64>,

    /// String cell partition
    pub strings: CellStore<String>,

    /// Version counter, bumped on every cell or rule edit
    pub token: Token,

    /// Separate counter driving client-side cache invalidation
    pub client_cache_token: Token,

    /// Rules by id
    pub rules: BTreeMap<RuleId, Rule>,

    /// Markers whose source is this cube
    pub markers: Vec<Marker>,

    /// Active area locks
    pub locks: LockSet,

    next_rule_id: RuleId,
    rule_cache: RwLock<HashMap<(RuleId, Vec<ElementId>), CellValue>>,
    consolidation_cache: RwLock<HashMap<Vec<ElementId>, (f64, bool)>>,
}

impl Cube {
    /// Create an empty cube
    pub fn new(id: CubeId, name: &str, dimensions: Vec<DimensionId>, subtype: CubeSubtype) -> Self {
        Self {
            id,
            name: name.to_string(),
            dimensions,
            subtype,
            deletable: matches!(subtype, CubeSubtype::Normal | CubeSubtype::UserInfo),
            renamable: matches!(subtype, CubeSubtype::Normal | CubeSubtype::UserInfo),
            status: CubeStatus::Changed,
            numeric: CellStore::new(),
            strings: CellStore::new(),
            token: Token::new(),
            client_cache_token: Token::new(),
            rules: BTreeMap::new(),
            markers: Vec::new(),
            locks: LockSet::new(),
            next_rule_id: 0,
            rule_cache: RwLock::new(HashMap::new()),
            consolidation_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Number of dimensions
    pub fn arity(&self) -> usize {
        self.dimensions.len()
    }

    /// True if the cube uses the dimension
    pub fn uses_dimension(&self, dimension: DimensionId) -> bool {
        self.dimensions.contains(&dimension)
    }

    /// Number of filled cells across both partitions
    pub fn size_filled(&self) -> usize {
        self.numeric.len() + self.strings.len()
    }

    /// Stored value at a coordinate, if filled
    pub fn stored_value(&self, coord: &[ElementId]) -> Option<CellValue> {
        if let Some(v) = self.numeric.get(coord) {
            return Some(CellValue::Numeric(*v));
        }
        self.strings.get(coord).map(|s| CellValue::Text(s.clone()))
    }

    /// Store a numeric value, vacating any string cell at the coordinate
    pub fn store_numeric(&mut self, coord: Vec<ElementId>, value: f64) -> Option<CellValue> {
        let prior_string = self.strings.clear(&coord).map(CellValue::Text);
        let prior_numeric = self.numeric.set(coord, value).map(CellValue::Numeric);
        prior_numeric.or(prior_string)
    }

    /// Store a string value, vacating any numeric cell at the coordinate
    pub fn store_text(&mut self, coord: Vec<ElementId>, value: String) -> Option<CellValue> {
        let prior_numeric = self.numeric.clear(&coord).map(CellValue::Numeric);
        let prior_string = self.strings.set(coord, value).map(CellValue::Text);
        prior_string.or(prior_numeric)
    }

    /// Remove the cell at a coordinate
    pub fn clear_cell(&mut self, coord: &[ElementId]) -> Option<CellValue> {
        let numeric = self.numeric.clear(coord).map(CellValue::Numeric);
        let string = self.strings.clear(coord).map(CellValue::Text);
        numeric.or(string)
    }

    /// Bump the cube's change tokens after a cell edit
    pub fn bump_tokens(&mut self) {
        self.token.bump();
        self.client_cache_token.bump();
        if self.status == CubeStatus::Loaded {
            self.status = CubeStatus::Changed;
        }
    }

    /// Delete every cell whose coordinate mentions the element and every
    /// rule referencing it on the given dimension axis
    pub fn purge_element(&mut self, dim_index: usize, element: ElementId) {
        self.numeric
            .retain(|coord, _| coord.get(dim_index) != Some(&element));
        self.strings
            .retain(|coord, _| coord.get(dim_index) != Some(&element));

        let doomed: Vec<RuleId> = self
            .rules
            .values()
            .filter(|rule| rule_references(rule, dim_index, element))
            .map(|rule| rule.id)
            .collect();
        for id in doomed {
            self.rules.remove(&id);
        }

        self.invalidate_caches();
        self.bump_tokens();
    }

    // rules

    /// Allocate the next rule identifier
    pub fn fetch_rule_id(&mut self) -> RuleId {
        let id = self.next_rule_id;
        self.next_rule_id += 1;
        id
    }

    /// Keep the rule id counter ahead of restored rules
    pub fn reserve_rule_ids(&mut self, above: RuleId) {
        if above >= self.next_rule_id {
            self.next_rule_id = above + 1;
        }
    }

    /// Rule by id
    pub fn rule(&self, id: RuleId) -> OlapResult<&Rule> {
        self.rules
            .get(&id)
            .ok_or_else(|| OlapError::RuleNotFound(format!("rule {} in cube '{}'", id, self.name)))
    }

    /// Active rules in id order
    pub fn active_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values().filter(|r| r.active)
    }

    // caches

    /// Drop both evaluation caches
    pub fn invalidate_caches(&self) {
        self.rule_cache.write().clear();
        self.consolidation_cache.write().clear();
    }

    /// Memoized rule value, if present
    pub fn cached_rule_value(&self, rule: RuleId, coord: &[ElementId]) -> Option<CellValue> {
        self.rule_cache
            .read()
            .get(&(rule, coord.to_vec()))
            .cloned()
    }

    /// Memoize a rule value
    pub fn store_rule_value(&self, rule: RuleId, coord: Vec<ElementId>, value: CellValue) {
        self.rule_cache.write().insert((rule, coord), value);
    }

    /// Drop the memoized values of one rule
    pub fn evict_rule_cache(&self, rule: RuleId) {
        self.rule_cache.write().retain(|(r, _), _| *r != rule);
    }

    /// Drop every memoized rule value
    pub fn clear_rule_cache(&self) {
        self.rule_cache.write().clear();
    }

    /// Memoized aggregation and its found flag, if present
    pub fn cached_consolidation(&self, coord: &[ElementId]) -> Option<(f64, bool)> {
        self.consolidation_cache.read().get(coord).copied()
    }

    /// Memoize an aggregation
    pub fn store_consolidation(&self, coord: Vec<ElementId>, value: f64, found: bool) {
        self.consolidation_cache.write().insert(coord, (value, found));
    }

    /// Drop the memoized aggregations the predicate selects
    pub fn evict_consolidations(&self, mut doomed: impl FnMut(&[ElementId]) -> bool) {
        self.consolidation_cache
            .write()
            .retain(|coord, _| !doomed(coord));
    }
}

/// True if the rule mentions the element on the given own-cube axis
fn rule_references(rule: &Rule, dim_index: usize, element: ElementId) -> bool {
    if rule.target.get(dim_index) == Some(&Some(element)) {
        return true;
    }
    let mut refs = Vec::new();
    rule.expr.collect_refs(&mut refs);
    refs.iter()
        .any(|r| r.cube.is_none() && r.slots.get(dim_index).and_then(|s| s.fixed()) == Some(element))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Cube {
        Cube::new(0, "Sales", vec![0, 1], CubeSubtype::Normal)
    }

    #[test]
    fn test_partitions_are_exclusive() {
        let mut c = cube();
        c.store_numeric(vec![0, 0], 5.0);
        assert_eq!(c.stored_value(&[0, 0]), Some(CellValue::Numeric(5.0)));

        let prior = c.store_text(vec![0, 0], "note".to_string());
        assert_eq!(prior, Some(CellValue::Numeric(5.0)));
        assert_eq!(c.numeric.len(), 0);
        assert_eq!(c.stored_value(&[0, 0]), Some(CellValue::Text("note".into())));
    }

    #[test]
    fn test_clear_cell() {
        let mut c = cube();
        c.store_numeric(vec![1, 1], 2.0);
        assert_eq!(c.clear_cell(&[1, 1]), Some(CellValue::Numeric(2.0)));
        assert_eq!(c.stored_value(&[1, 1]), None);
        assert_eq!(c.size_filled(), 0);
    }

    #[test]
    fn test_purge_element_drops_cells() {
        let mut c = cube();
        c.store_numeric(vec![0, 0], 1.0);
        c.store_numeric(vec![1, 0], 2.0);
        c.store_text(vec![0, 1], "x".to_string());

        c.purge_element(0, 0);

        assert_eq!(c.stored_value(&[0, 0]), None);
        assert_eq!(c.stored_value(&[0, 1]), None);
        assert_eq!(c.stored_value(&[1, 0]), Some(CellValue::Numeric(2.0)));
    }

    #[test]
    fn test_tokens_bump_and_status() {
        let mut c = cube();
        c.status = CubeStatus::Loaded;
        let token = c.token.value();
        let cc = c.client_cache_token.value();

        c.bump_tokens();

        assert!(c.token.value() > token);
        assert!(c.client_cache_token.value() > cc);
        assert_eq!(c.status, CubeStatus::Changed);
    }

    #[test]
    fn test_caches() {
        let c = cube();
        c.store_consolidation(vec![5, 5], 42.0, true);
        assert_eq!(c.cached_consolidation(&[5, 5]), Some((42.0, true)));

        c.evict_consolidations(|coord| coord[0] == 5);
        assert_eq!(c.cached_consolidation(&[5, 5]), None);

        c.store_rule_value(3, vec![1, 1], CellValue::Numeric(1.0));
        assert!(c.cached_rule_value(3, &[1, 1]).is_some());
        c.evict_rule_cache(3);
        assert!(c.cached_rule_value(3, &[1, 1]).is_none());
    }
}
