//! Variable-usage queries over expressions and statements.

use crate::buffer::{BufferRegion, Range};
use crate::expr::{Expr, PrimExpr};
use crate::stmt::Stmt;

/// Whether the variable occurs anywhere in the expression.
pub fn uses_var_expr(expr: &Expr, var_id: u64) -> bool {
    match &**expr {
        PrimExpr::Int { .. } | PrimExpr::Float { .. } => false,
        PrimExpr::Var(var) => var.id() == var_id,
        PrimExpr::Cast { value, .. } => uses_var_expr(value, var_id),
        PrimExpr::Binary { lhs, rhs, .. } => {
            uses_var_expr(lhs, var_id) || uses_var_expr(rhs, var_id)
        }
        PrimExpr::Not(value) => uses_var_expr(value, var_id),
        PrimExpr::Select { condition, true_value, false_value } => {
            uses_var_expr(condition, var_id)
                || uses_var_expr(true_value, var_id)
                || uses_var_expr(false_value, var_id)
        }
        PrimExpr::BufferLoad { indices, .. } => {
            indices.iter().any(|index| uses_var_expr(index, var_id))
        }
    }
}

fn uses_var_range(range: &Range, var_id: u64) -> bool {
    uses_var_expr(&range.min, var_id) || uses_var_expr(&range.extent, var_id)
}

fn uses_var_regions(regions: &[BufferRegion], var_id: u64) -> bool {
    regions.iter().any(|region| region.region.iter().any(|range| uses_var_range(range, var_id)))
}

/// Whether the variable occurs anywhere in the statement, including iterator
/// domains, buffer regions, and block init subtrees.
pub fn uses_var_stmt(stmt: &Stmt, var_id: u64) -> bool {
    match stmt {
        Stmt::For(f) => {
            uses_var_expr(&f.min, var_id)
                || uses_var_expr(&f.extent, var_id)
                || uses_var_stmt(&f.body, var_id)
        }
        Stmt::BlockRealize(realize) => {
            let block = &realize.block;
            realize.iter_values.iter().any(|value| uses_var_expr(value, var_id))
                || uses_var_expr(&realize.predicate, var_id)
                || block.iter_vars.iter().any(|iter_var| uses_var_range(&iter_var.dom, var_id))
                || uses_var_regions(&block.reads, var_id)
                || uses_var_regions(&block.writes, var_id)
                || block
                    .match_buffers
                    .iter()
                    .any(|mb| mb.source.region.iter().any(|range| uses_var_range(range, var_id)))
                || uses_var_stmt(&block.body, var_id)
                || block.init.as_ref().is_some_and(|init| uses_var_stmt(init, var_id))
        }
        Stmt::Seq(children) => children.iter().any(|child| uses_var_stmt(child, var_id)),
        Stmt::BufferStore { value, indices, .. } => {
            uses_var_expr(value, var_id) || indices.iter().any(|index| uses_var_expr(index, var_id))
        }
        Stmt::IfThenElse { condition, then_case, else_case } => {
            uses_var_expr(condition, var_id)
                || uses_var_stmt(then_case, var_id)
                || else_case.as_ref().is_some_and(|s| uses_var_stmt(s, var_id))
        }
        Stmt::Evaluate(expr) => uses_var_expr(expr, var_id),
    }
}
