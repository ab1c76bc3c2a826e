// Sparse cell store
// One store per value kind and cube; memory scales with filled cells

use crate::core::ElementId;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Sparse mapping from coordinate tuple to cell value
///
/// Backed by an ordered map so iteration runs in coordinate order and
/// key-prefix ranges can be scanned without touching the rest of the cube.
#[derive(Debug, Clone, Default)]
pub struct CellStore<V> {
    cells: BTreeMap<Vec<ElementId>, V>,
}

impl<V> CellStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    /// Value at a coordinate
    pub fn get(&self, coord: &[ElementId]) -> Option<&V> {
        self.cells.get(coord)
    }

    /// Store a value, returning the previous one
    pub fn set(&mut self, coord: Vec<ElementId>, value: V) -> Option<V> {
        self.cells.insert(coord, value)
    }

    /// Remove a cell, returning its value
    pub fn clear(&mut self, coord: &[ElementId]) -> Option<V> {
        self.cells.remove(coord)
    }

    /// Number of filled cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if no cell is filled
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All filled cells in coordinate order
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<ElementId>, &V)> {
        self.cells.iter()
    }

    /// Filled cells whose coordinate starts with `prefix`, in order
    pub fn iter_prefix<'a>(
        &'a self,
        prefix: &[ElementId],
    ) -> impl Iterator<Item = (&'a Vec<ElementId>, &'a V)> {
        let lower = prefix.to_vec();
        let upper = prefix_upper_bound(prefix);
        let range = match upper {
            Some(upper) => self
                .cells
                .range((Bound::Included(lower), Bound::Excluded(upper))),
            None => self.cells.range((Bound::Included(lower), Bound::Unbounded)),
        };
        range
    }

    /// Keep only the cells the predicate accepts
    pub fn retain(&mut self, mut keep: impl FnMut(&[ElementId], &V) -> bool) {
        self.cells.retain(|coord, value| keep(coord, value));
    }

    /// Drop every cell
    pub fn clear_all(&mut self) {
        self.cells.clear();
    }
}

/// Smallest coordinate greater than every coordinate with the prefix,
/// or None when the prefix cannot be incremented
fn prefix_upper_bound(prefix: &[ElementId]) -> Option<Vec<ElementId>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        match last.checked_add(1) {
            Some(next) => {
                *last = next;
                return Some(upper);
            }
            None => {
                upper.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let mut store: CellStore<f64> = CellStore::new();
        assert!(store.set(vec![0, 1], 5.0).is_none());
        assert_eq!(store.get(&[0, 1]), Some(&5.0));
        assert_eq!(store.set(vec![0, 1], 7.0), Some(5.0));
        assert_eq!(store.clear(&[0, 1]), Some(7.0));
        assert!(store.is_empty());
    }

    #[test]
    fn test_iteration_is_ordered() {
        let mut store: CellStore<f64> = CellStore::new();
        store.set(vec![1, 0], 1.0);
        store.set(vec![0, 1], 2.0);
        store.set(vec![0, 0], 3.0);

        let coords: Vec<Vec<ElementId>> = store.iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(coords, vec![vec![0, 0], vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn test_prefix_scan() {
        let mut store: CellStore<f64> = CellStore::new();
        store.set(vec![0, 0], 1.0);
        store.set(vec![0, 9], 2.0);
        store.set(vec![1, 0], 3.0);

        let hits: Vec<f64> = store.iter_prefix(&[0]).map(|(_, v)| *v).collect();
        assert_eq!(hits, vec![1.0, 2.0]);

        let all: Vec<f64> = store.iter_prefix(&[]).map(|(_, v)| *v).collect();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_prefix_scan_at_id_boundary() {
        let mut store: CellStore<f64> = CellStore::new();
        store.set(vec![ElementId::MAX, 0], 1.0);
        store.set(vec![ElementId::MAX, ElementId::MAX], 2.0);

        let hits: Vec<f64> = store.iter_prefix(&[ElementId::MAX]).map(|(_, v)| *v).collect();
        assert_eq!(hits, vec![1.0, 2.0]);
    }
}
