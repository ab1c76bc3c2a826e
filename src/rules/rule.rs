// Rule type and name resolution
// The textual definition is kept verbatim for persistence; the compiled
// form references elements and cubes by id only

use crate::core::{CubeId, DatabaseId, OlapError, OlapResult, RuleId};
use crate::rules::marker::predicate_matches;
use crate::rules::parser::{parse_rule, RawExpr};
use crate::rules::{CellRef, Expr, Function, RefSlot};
use crate::server::Server;
use chrono::{DateTime, Utc};

/// Compiled rule of a cube
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Cube-local rule identifier
    pub id: RuleId,

    /// Identifier assigned by an external client, if any
    pub external_id: Option<String>,

    /// Free-text comment
    pub comment: String,

    /// Creation or last definition change
    pub created_at: DateTime<Utc>,

    /// Inactive rules are kept but not evaluated
    pub active: bool,

    /// Definition text as submitted
    pub text: String,

    /// Target slot per cube dimension; `None` matches any element
    pub target: Vec<Option<crate::core::ElementId>>,

    /// Compiled expression
    pub expr: Expr,
}

impl Rule {
    /// True if the rule's target area covers the coordinate
    pub fn matches(&self, coord: &[crate::core::ElementId]) -> bool {
        predicate_matches(&self.target, coord)
    }

    /// Parse and resolve a rule definition against a cube
    pub fn compile(
        server: &Server,
        database: DatabaseId,
        cube: CubeId,
        id: RuleId,
        text: &str,
        external_id: Option<String>,
        comment: &str,
    ) -> OlapResult<Rule> {
        let parsed = parse_rule(text)?;
        let db = server.database(database)?;
        let cube_ref = db.cube(cube)?;

        let target = resolve_slots(server, database, &cube_ref.dimensions, &parsed.target)?;
        let expr = compile_expr(server, database, cube, &parsed.expr)?;

        Ok(Rule {
            id,
            external_id,
            comment: comment.to_string(),
            created_at: Utc::now(),
            active: true,
            text: text.to_string(),
            target,
            expr,
        })
    }
}

fn resolve_slots(
    server: &Server,
    database: DatabaseId,
    dimensions: &[crate::core::DimensionId],
    slots: &[Option<String>],
) -> OlapResult<Vec<Option<crate::core::ElementId>>> {
    if slots.len() != dimensions.len() {
        return Err(OlapError::RuleSyntaxError(format!(
            "expected {} coordinates, found {}",
            dimensions.len(),
            slots.len()
        )));
    }

    slots
        .iter()
        .zip(dimensions)
        .map(|(slot, dim)| match slot {
            None => Ok(None),
            Some(name) => {
                let dimension = server.resolve_dimension(database, *dim)?;
                Ok(Some(dimension.find_element_by_name(name)?.id))
            }
        })
        .collect()
}

fn compile_expr(
    server: &Server,
    database: DatabaseId,
    cube: CubeId,
    raw: &RawExpr,
) -> OlapResult<Expr> {
    match raw {
        RawExpr::Number(value) => Ok(Expr::Number(*value)),
        RawExpr::Text(text) => Ok(Expr::Text(text.clone())),
        RawExpr::Binary(op, lhs, rhs) => Ok(Expr::Binary(
            *op,
            Box::new(compile_expr(server, database, cube, lhs)?),
            Box::new(compile_expr(server, database, cube, rhs)?),
        )),
        RawExpr::Call(name, args) => {
            let function = Function::from_name(name)
                .ok_or_else(|| OlapError::RuleSyntaxError(format!("unknown function '{}'", name)))?;
            let (min, max) = function.arity();
            if args.len() < min || args.len() > max {
                return Err(OlapError::RuleSyntaxError(format!(
                    "function '{}' takes {} arguments, found {}",
                    name,
                    min,
                    args.len()
                )));
            }
            let compiled = args
                .iter()
                .map(|arg| compile_expr(server, database, cube, arg))
                .collect::<OlapResult<Vec<_>>>()?;
            Ok(Expr::Call(function, compiled))
        }
        RawExpr::Ref { cube: cube_name, slots } => {
            let db = server.database(database)?;
            let own_dims = db.cube(cube)?.dimensions.clone();
            let (ref_cube, ref_dims) = match cube_name {
                None => (None, own_dims.clone()),
                Some(name) => {
                    let other = db.find_cube_by_name(name)?;
                    let id = if other.id == cube { None } else { Some(other.id) };
                    (id, other.dimensions.clone())
                }
            };

            if slots.len() != ref_dims.len() {
                return Err(OlapError::RuleSyntaxError(format!(
                    "reference expects {} coordinates, found {}",
                    ref_dims.len(),
                    slots.len()
                )));
            }

            let mut resolved = Vec::with_capacity(slots.len());
            for (slot, dim) in slots.iter().zip(&ref_dims) {
                match slot {
                    Some(name) => {
                        let dimension = server.resolve_dimension(database, *dim)?;
                        resolved.push(RefSlot::Fixed(dimension.find_element_by_name(name)?.id));
                    }
                    None => {
                        // a variable slot copies the element the rule is
                        // being evaluated at; the referenced cube must
                        // share the dimension with the rule's cube
                        let axis = own_dims.iter().position(|d| d == dim).ok_or_else(|| {
                            OlapError::RuleSyntaxError(format!(
                                "variable coordinate on dimension {} not shared with the rule's cube",
                                dim
                            ))
                        })?;
                        resolved.push(RefSlot::FromTarget(axis));
                    }
                }
            }

            Ok(Expr::Ref(CellRef {
                cube: ref_cube,
                slots: resolved,
            }))
        }
    }
}
