// Markers - cross-cube dependency edges derived from rules
// A write into a marker's source area dirties the target cube's caches

use crate::core::{CubeId, ElementId, RuleId};
use crate::rules::Rule;

/// Directed dependency edge between two cubes
///
/// Stored on the source cube so a base-cell write only has to scan the
/// markers of the cube it touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Rule the marker was derived from
    pub rule: RuleId,

    /// Cube owning the rule (the dependent cube)
    pub rule_cube: CubeId,

    /// Cube whose writes trigger the marker
    pub source_cube: CubeId,

    /// Coordinate predicate on the source cube; `None` matches any element
    pub source: Vec<Option<ElementId>>,

    /// Coordinate predicate on the dependent cube (the rule's target area)
    pub target: Vec<Option<ElementId>>,
}

/// True if the coordinate satisfies the slot predicate
pub fn predicate_matches(predicate: &[Option<ElementId>], coord: &[ElementId]) -> bool {
    predicate.len() == coord.len()
        && predicate
            .iter()
            .zip(coord)
            .all(|(slot, element)| slot.map(|fixed| fixed == *element).unwrap_or(true))
}

/// Derive the markers of a rule
///
/// Every cell reference into a sibling cube yields one marker from that
/// cube back to the rule's cube.
pub fn derive_markers(rule: &Rule, own_cube: CubeId) -> Vec<Marker> {
    let mut refs = Vec::new();
    rule.expr.collect_refs(&mut refs);

    refs.into_iter()
        .filter_map(|cell_ref| {
            let source_cube = cell_ref.cube?;
            if source_cube == own_cube {
                return None;
            }
            Some(Marker {
                rule: rule.id,
                rule_cube: own_cube,
                source_cube,
                source: cell_ref.slots.iter().map(|slot| slot.fixed()).collect(),
                target: rule.target.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{BinOp, CellRef, Expr, RefSlot};
    use chrono::Utc;

    fn rule_with_expr(expr: Expr) -> Rule {
        Rule {
            id: 0,
            external_id: None,
            comment: String::new(),
            created_at: Utc::now(),
            active: true,
            text: String::new(),
            target: vec![Some(1), None],
            expr,
        }
    }

    #[test]
    fn test_predicate_matches() {
        assert!(predicate_matches(&[Some(1), None], &[1, 99]));
        assert!(!predicate_matches(&[Some(1), None], &[2, 99]));
        assert!(!predicate_matches(&[Some(1)], &[1, 2]));
    }

    #[test]
    fn test_derive_cross_cube_markers_only() {
        let own = Expr::Ref(CellRef {
            cube: None,
            slots: vec![RefSlot::Fixed(0), RefSlot::FromTarget(1)],
        });
        let cross = Expr::Ref(CellRef {
            cube: Some(7),
            slots: vec![RefSlot::Fixed(3)],
        });
        let rule = rule_with_expr(Expr::Binary(BinOp::Add, Box::new(own), Box::new(cross)));

        let markers = derive_markers(&rule, 2);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].source_cube, 7);
        assert_eq!(markers[0].rule_cube, 2);
        assert_eq!(markers[0].source, vec![Some(3)]);
        assert_eq!(markers[0].target, vec![Some(1), None]);
    }
}
