// Areas - rectangular Cartesian products of element sets
// Used by locks, bulk reads, clears and rule predicates

use crate::core::{ElementId, OlapError, OlapResult};

/// Fully resolved area: one non-empty element list per dimension
///
/// Iteration yields coordinates in the lexicographic product order of the
/// per-dimension lists as given, which is the order bulk reads report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    sets: Vec<Vec<ElementId>>,
}

impl Area {
    /// Build an area from per-dimension element lists
    pub fn new(sets: Vec<Vec<ElementId>>) -> OlapResult<Self> {
        if sets.iter().any(|s| s.is_empty()) {
            return Err(OlapError::InvalidCoordinates(
                "area with empty dimension set".to_string(),
            ));
        }
        Ok(Self { sets })
    }

    /// Per-dimension element lists
    pub fn sets(&self) -> &[Vec<ElementId>] {
        &self.sets
    }

    /// Number of dimensions
    pub fn arity(&self) -> usize {
        self.sets.len()
    }

    /// Number of coordinates in the product (saturating)
    pub fn cell_count(&self) -> usize {
        self.sets
            .iter()
            .fold(1usize, |acc, s| acc.saturating_mul(s.len()))
    }

    /// True if the coordinate lies inside the area
    pub fn contains(&self, coord: &[ElementId]) -> bool {
        coord.len() == self.sets.len()
            && coord
                .iter()
                .zip(&self.sets)
                .all(|(e, set)| set.contains(e))
    }

    /// True if two areas share at least one coordinate
    pub fn overlaps(&self, other: &Area) -> bool {
        self.sets.len() == other.sets.len()
            && self
                .sets
                .iter()
                .zip(&other.sets)
                .all(|(a, b)| a.iter().any(|e| b.contains(e)))
    }

    /// Coordinates in lexicographic product order
    pub fn iter(&self) -> AreaIterator<'_> {
        AreaIterator {
            area: self,
            odometer: vec![0; self.sets.len()],
            done: self.sets.iter().any(|s| s.is_empty()),
        }
    }
}

/// Odometer-style iterator over an area's coordinates
pub struct AreaIterator<'a> {
    area: &'a Area,
    odometer: Vec<usize>,
    done: bool,
}

impl<'a> Iterator for AreaIterator<'a> {
    type Item = Vec<ElementId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let coord: Vec<ElementId> = self
            .odometer
            .iter()
            .zip(&self.area.sets)
            .map(|(i, set)| set[*i])
            .collect();

        // advance the rightmost wheel
        let mut dim = self.area.sets.len();
        loop {
            if dim == 0 {
                self.done = true;
                break;
            }
            dim -= 1;
            self.odometer[dim] += 1;
            if self.odometer[dim] < self.area.sets[dim].len() {
                break;
            }
            self.odometer[dim] = 0;
        }

        Some(coord)
    }
}

/// Parse the identifier form of an area: `a:b:c,d:e,*`
///
/// Commas separate dimensions, colons separate elements, `*` selects all
/// elements of the dimension (returned as `None`).
pub fn parse_area_ids(spec: &str) -> OlapResult<Vec<Option<Vec<ElementId>>>> {
    let mut sets = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part == "*" {
            sets.push(None);
            continue;
        }
        let mut elements = Vec::new();
        for token in part.split(':') {
            let id: ElementId = token.trim().parse().map_err(|_| {
                OlapError::InvalidCoordinates(format!("bad element id '{}'", token))
            })?;
            elements.push(id);
        }
        if elements.is_empty() {
            return Err(OlapError::InvalidCoordinates(format!(
                "empty dimension set in '{}'",
                spec
            )));
        }
        sets.push(Some(elements));
    }

    Ok(sets)
}

/// Parse the identifier form of a path: `a,b,c`
pub fn parse_path_ids(spec: &str) -> OlapResult<Vec<ElementId>> {
    spec.split(',')
        .map(|token| {
            token
                .trim()
                .parse()
                .map_err(|_| OlapError::InvalidCoordinates(format!("bad element id '{}'", token)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_order() {
        let area = Area::new(vec![vec![1, 2], vec![10, 20, 30]]).unwrap();
        let coords: Vec<Vec<ElementId>> = area.iter().collect();
        assert_eq!(coords.len(), 6);
        assert_eq!(coords[0], vec![1, 10]);
        assert_eq!(coords[1], vec![1, 20]);
        assert_eq!(coords[3], vec![2, 10]);
        assert_eq!(coords[5], vec![2, 30]);
    }

    #[test]
    fn test_contains_and_overlaps() {
        let a = Area::new(vec![vec![1, 2], vec![10]]).unwrap();
        let b = Area::new(vec![vec![2, 3], vec![10, 20]]).unwrap();
        let c = Area::new(vec![vec![3], vec![20]]).unwrap();

        assert!(a.contains(&[2, 10]));
        assert!(!a.contains(&[3, 10]));
        assert!(!a.contains(&[2]));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_parse_area() {
        let sets = parse_area_ids("0:1:2,3,*").unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0], Some(vec![0, 1, 2]));
        assert_eq!(sets[1], Some(vec![3]));
        assert_eq!(sets[2], None);

        assert!(parse_area_ids("0:x,1").is_err());
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path_ids("3,1,4").unwrap(), vec![3, 1, 4]);
        assert!(parse_path_ids("3,,4").is_err());
    }
}
