// Rule evaluation
// The evaluation context carries the rule history used to cut cycles; a
// re-entered (rule, coordinate) pair contributes no value

use crate::core::{CellValue, CubeId, DatabaseId, ElementId, OlapResult, RuleId};
use crate::rules::{BinOp, Expr, Function, Rule};
use crate::server::Server;
use std::collections::HashSet;

/// State threaded through one outermost cell read
#[derive(Debug, Default)]
pub struct EvalContext {
    /// (cube, rule, coordinate) tuples currently being evaluated
    pub history: HashSet<(CubeId, RuleId, Vec<ElementId>)>,
}

impl EvalContext {
    /// Fresh context for an outermost read
    pub fn new() -> Self {
        Self::default()
    }
}

/// Evaluate a rule at a coordinate
///
/// Returns `None` when the rule contributes no value (reserved for
/// cycle cut-off handled by the reader).
pub fn evaluate_rule(
    server: &Server,
    database: DatabaseId,
    cube: CubeId,
    rule: &Rule,
    coord: &[ElementId],
    ctx: &mut EvalContext,
) -> OlapResult<Option<CellValue>> {
    let value = evaluate_expr(server, database, cube, &rule.expr, coord, ctx)?;
    Ok(Some(value))
}

fn numeric(value: &CellValue) -> f64 {
    match value {
        CellValue::Numeric(v) => *v,
        CellValue::Text(s) => s.parse().unwrap_or(0.0),
    }
}

fn truthy(value: &CellValue) -> bool {
    numeric(value) != 0.0
}

fn values_equal(lhs: &CellValue, rhs: &CellValue) -> bool {
    match (lhs, rhs) {
        (CellValue::Numeric(a), CellValue::Numeric(b)) => a == b,
        (CellValue::Text(a), CellValue::Text(b)) => a == b,
        (a, b) => a.to_string() == b.to_string(),
    }
}

fn evaluate_expr(
    server: &Server,
    database: DatabaseId,
    cube: CubeId,
    expr: &Expr,
    coord: &[ElementId],
    ctx: &mut EvalContext,
) -> OlapResult<CellValue> {
    match expr {
        Expr::Number(value) => Ok(CellValue::Numeric(*value)),
        Expr::Text(text) => Ok(CellValue::Text(text.clone())),

        Expr::Binary(op, lhs, rhs) => {
            let left = evaluate_expr(server, database, cube, lhs, coord, ctx)?;
            let right = evaluate_expr(server, database, cube, rhs, coord, ctx)?;
            let result = match op {
                BinOp::Add => CellValue::Numeric(numeric(&left) + numeric(&right)),
                BinOp::Sub => CellValue::Numeric(numeric(&left) - numeric(&right)),
                BinOp::Mul => CellValue::Numeric(numeric(&left) * numeric(&right)),
                BinOp::Div => {
                    let denominator = numeric(&right);
                    if denominator == 0.0 {
                        CellValue::Numeric(0.0)
                    } else {
                        CellValue::Numeric(numeric(&left) / denominator)
                    }
                }
                BinOp::Eq => CellValue::Numeric(if values_equal(&left, &right) { 1.0 } else { 0.0 }),
                BinOp::Ne => CellValue::Numeric(if values_equal(&left, &right) { 0.0 } else { 1.0 }),
                BinOp::Lt => CellValue::Numeric(if numeric(&left) < numeric(&right) { 1.0 } else { 0.0 }),
                BinOp::Le => CellValue::Numeric(if numeric(&left) <= numeric(&right) { 1.0 } else { 0.0 }),
                BinOp::Gt => CellValue::Numeric(if numeric(&left) > numeric(&right) { 1.0 } else { 0.0 }),
                BinOp::Ge => CellValue::Numeric(if numeric(&left) >= numeric(&right) { 1.0 } else { 0.0 }),
            };
            Ok(result)
        }

        Expr::Call(function, args) => match function {
            Function::If => {
                let condition = evaluate_expr(server, database, cube, &args[0], coord, ctx)?;
                let branch = if truthy(&condition) { &args[1] } else { &args[2] };
                evaluate_expr(server, database, cube, branch, coord, ctx)
            }
            Function::Abs => {
                let v = evaluate_expr(server, database, cube, &args[0], coord, ctx)?;
                Ok(CellValue::Numeric(numeric(&v).abs()))
            }
            Function::Round => {
                let v = evaluate_expr(server, database, cube, &args[0], coord, ctx)?;
                Ok(CellValue::Numeric(numeric(&v).round()))
            }
            Function::Floor => {
                let v = evaluate_expr(server, database, cube, &args[0], coord, ctx)?;
                Ok(CellValue::Numeric(numeric(&v).floor()))
            }
            Function::Ceil => {
                let v = evaluate_expr(server, database, cube, &args[0], coord, ctx)?;
                Ok(CellValue::Numeric(numeric(&v).ceil()))
            }
            Function::IsEmpty => {
                let empty = match &args[0] {
                    Expr::Ref(cell_ref) => {
                        let target = cell_ref.cube.unwrap_or(cube);
                        let concrete = cell_ref.resolve(coord);
                        !server.read_cell(database, target, &concrete, ctx)?.found
                    }
                    other => {
                        let v = evaluate_expr(server, database, cube, other, coord, ctx)?;
                        v.is_empty()
                    }
                };
                Ok(CellValue::Numeric(if empty { 1.0 } else { 0.0 }))
            }
            Function::Min => {
                let mut best = f64::INFINITY;
                for arg in args {
                    let v = evaluate_expr(server, database, cube, arg, coord, ctx)?;
                    best = best.min(numeric(&v));
                }
                Ok(CellValue::Numeric(best))
            }
            Function::Max => {
                let mut best = f64::NEG_INFINITY;
                for arg in args {
                    let v = evaluate_expr(server, database, cube, arg, coord, ctx)?;
                    best = best.max(numeric(&v));
                }
                Ok(CellValue::Numeric(best))
            }
            Function::Concat => {
                let mut out = String::new();
                for arg in args {
                    let v = evaluate_expr(server, database, cube, arg, coord, ctx)?;
                    out.push_str(&v.to_string());
                }
                Ok(CellValue::Text(out))
            }
        },

        Expr::Ref(cell_ref) => {
            let target = cell_ref.cube.unwrap_or(cube);
            let concrete = cell_ref.resolve(coord);
            Ok(server.read_cell(database, target, &concrete, ctx)?.value)
        }
    }
}
