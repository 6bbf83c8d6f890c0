//! Generic statement/expression mutator framework.
//!
//! A mutator overrides the per-variant hooks it cares about and delegates the
//! rest to the default walks. The walks preserve node identity: a subtree
//! whose children come back unchanged is returned as the original `Rc`, so
//! untouched loops and blocks keep their stable ids across a rewrite.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::buffer::{BufferRegion, MatchBufferRegion, Range};
use crate::expr::{Expr, PrimExpr, Var};
use crate::stmt::{Block, BlockRealize, IterVar, Stmt};

pub trait StmtExprMutator: Sized {
    fn visit_expr(&mut self, expr: &Expr) -> Expr {
        walk_expr(self, expr)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Stmt {
        walk_stmt(self, stmt)
    }

    /// `expr` is the expression node wrapping `var`; returning it unchanged
    /// keeps identity.
    fn visit_var(&mut self, var: &Rc<Var>, expr: &Expr) -> Expr {
        let _ = var;
        expr.clone()
    }

    fn visit_block(&mut self, block: &Rc<Block>) -> Rc<Block> {
        walk_block(self, block)
    }
}

pub fn walk_expr<M: StmtExprMutator>(m: &mut M, expr: &Expr) -> Expr {
    match &**expr {
        PrimExpr::Int { .. } | PrimExpr::Float { .. } => expr.clone(),
        PrimExpr::Var(var) => m.visit_var(var, expr),
        PrimExpr::Cast { dtype, value } => {
            let new_value = m.visit_expr(value);
            if Rc::ptr_eq(&new_value, value) {
                expr.clone()
            } else {
                PrimExpr::cast(*dtype, &new_value)
            }
        }
        PrimExpr::Binary { op, lhs, rhs } => {
            let new_lhs = m.visit_expr(lhs);
            let new_rhs = m.visit_expr(rhs);
            if Rc::ptr_eq(&new_lhs, lhs) && Rc::ptr_eq(&new_rhs, rhs) {
                expr.clone()
            } else {
                PrimExpr::binary(*op, &new_lhs, &new_rhs)
            }
        }
        PrimExpr::Not(value) => {
            let new_value = m.visit_expr(value);
            if Rc::ptr_eq(&new_value, value) { expr.clone() } else { PrimExpr::not_(&new_value) }
        }
        PrimExpr::Select { condition, true_value, false_value } => {
            let new_condition = m.visit_expr(condition);
            let new_true = m.visit_expr(true_value);
            let new_false = m.visit_expr(false_value);
            if Rc::ptr_eq(&new_condition, condition)
                && Rc::ptr_eq(&new_true, true_value)
                && Rc::ptr_eq(&new_false, false_value)
            {
                expr.clone()
            } else {
                PrimExpr::select(&new_condition, &new_true, &new_false)
            }
        }
        PrimExpr::BufferLoad { buffer, indices } => {
            let mut changed = false;
            let new_indices: SmallVec<[Expr; 4]> = indices
                .iter()
                .map(|index| {
                    let new_index = m.visit_expr(index);
                    changed |= !Rc::ptr_eq(&new_index, index);
                    new_index
                })
                .collect();
            if changed {
                Rc::new(PrimExpr::BufferLoad { buffer: buffer.clone(), indices: new_indices })
            } else {
                expr.clone()
            }
        }
    }
}

pub fn walk_stmt<M: StmtExprMutator>(m: &mut M, stmt: &Stmt) -> Stmt {
    match stmt {
        Stmt::For(f) => {
            let min = m.visit_expr(&f.min);
            let extent = m.visit_expr(&f.extent);
            let body = m.visit_stmt(&f.body);
            if Rc::ptr_eq(&min, &f.min)
                && Rc::ptr_eq(&extent, &f.extent)
                && stmt_identical(&body, &f.body)
            {
                stmt.clone()
            } else {
                Stmt::For(crate::stmt::For::new_full(
                    f.loop_var.clone(),
                    min,
                    extent,
                    f.kind,
                    body,
                    f.thread_binding.clone(),
                    f.annotations.clone(),
                ))
            }
        }
        Stmt::BlockRealize(realize) => {
            let mut changed = false;
            let iter_values: Vec<Expr> = realize
                .iter_values
                .iter()
                .map(|value| {
                    let new_value = m.visit_expr(value);
                    changed |= !Rc::ptr_eq(&new_value, value);
                    new_value
                })
                .collect();
            let predicate = m.visit_expr(&realize.predicate);
            changed |= !Rc::ptr_eq(&predicate, &realize.predicate);
            let block = m.visit_block(&realize.block);
            changed |= !Rc::ptr_eq(&block, &realize.block);
            if changed {
                Stmt::BlockRealize(BlockRealize::new(iter_values, predicate, block))
            } else {
                stmt.clone()
            }
        }
        Stmt::Seq(children) => {
            let mut changed = false;
            let new_children: Vec<Stmt> = children
                .iter()
                .map(|child| {
                    let new_child = m.visit_stmt(child);
                    changed |= !stmt_identical(&new_child, child);
                    new_child
                })
                .collect();
            if changed { Stmt::Seq(new_children) } else { stmt.clone() }
        }
        Stmt::BufferStore { buffer, value, indices } => {
            let new_value = m.visit_expr(value);
            let mut changed = !Rc::ptr_eq(&new_value, value);
            let new_indices: SmallVec<[Expr; 4]> = indices
                .iter()
                .map(|index| {
                    let new_index = m.visit_expr(index);
                    changed |= !Rc::ptr_eq(&new_index, index);
                    new_index
                })
                .collect();
            if changed {
                Stmt::BufferStore { buffer: buffer.clone(), value: new_value, indices: new_indices }
            } else {
                stmt.clone()
            }
        }
        Stmt::IfThenElse { condition, then_case, else_case } => {
            let new_condition = m.visit_expr(condition);
            let new_then = m.visit_stmt(then_case);
            let new_else = else_case.as_ref().map(|s| m.visit_stmt(s));
            let changed = !Rc::ptr_eq(&new_condition, condition)
                || !stmt_identical(&new_then, then_case)
                || match (&new_else, else_case) {
                    (Some(a), Some(b)) => !stmt_identical(a, b),
                    (None, None) => false,
                    _ => true,
                };
            if changed {
                Stmt::IfThenElse {
                    condition: new_condition,
                    then_case: Box::new(new_then),
                    else_case: new_else.map(Box::new),
                }
            } else {
                stmt.clone()
            }
        }
        Stmt::Evaluate(expr) => {
            let new_expr = m.visit_expr(expr);
            if Rc::ptr_eq(&new_expr, expr) { stmt.clone() } else { Stmt::Evaluate(new_expr) }
        }
    }
}

pub fn walk_block<M: StmtExprMutator>(m: &mut M, block: &Rc<Block>) -> Rc<Block> {
    let mut changed = false;

    let iter_vars: Vec<IterVar> = block
        .iter_vars
        .iter()
        .map(|iter_var| {
            let (dom, dom_changed) = walk_range(m, &iter_var.dom);
            changed |= dom_changed;
            IterVar::new(dom, iter_var.var.clone(), iter_var.iter_type)
        })
        .collect();

    let reads = walk_regions(m, &block.reads, &mut changed);
    let writes = walk_regions(m, &block.writes, &mut changed);

    let match_buffers: Vec<MatchBufferRegion> = block
        .match_buffers
        .iter()
        .map(|mb| {
            let (region, region_changed) = walk_region(m, &mb.source);
            changed |= region_changed;
            MatchBufferRegion::new(mb.buffer.clone(), region)
        })
        .collect();

    let body = m.visit_stmt(&block.body);
    changed |= !stmt_identical(&body, &block.body);

    let init = block.init.as_ref().map(|init| {
        let new_init = m.visit_stmt(init);
        changed |= !stmt_identical(&new_init, init);
        new_init
    });

    if changed {
        Block::new_full(
            iter_vars,
            reads,
            writes,
            block.name_hint.clone(),
            body,
            init,
            block.alloc_buffers.clone(),
            match_buffers,
            block.annotations.clone(),
        )
    } else {
        block.clone()
    }
}

fn walk_range<M: StmtExprMutator>(m: &mut M, range: &Range) -> (Range, bool) {
    let min = m.visit_expr(&range.min);
    let extent = m.visit_expr(&range.extent);
    let changed = !Rc::ptr_eq(&min, &range.min) || !Rc::ptr_eq(&extent, &range.extent);
    (Range::new(min, extent), changed)
}

fn walk_region<M: StmtExprMutator>(m: &mut M, region: &BufferRegion) -> (BufferRegion, bool) {
    let mut changed = false;
    let ranges: Vec<Range> = region
        .region
        .iter()
        .map(|range| {
            let (new_range, range_changed) = walk_range(m, range);
            changed |= range_changed;
            new_range
        })
        .collect();
    (BufferRegion::new(region.buffer.clone(), ranges), changed)
}

fn walk_regions<M: StmtExprMutator>(
    m: &mut M,
    regions: &[BufferRegion],
    changed: &mut bool,
) -> Vec<BufferRegion> {
    regions
        .iter()
        .map(|region| {
            let (new_region, region_changed) = walk_region(m, region);
            *changed |= region_changed;
            new_region
        })
        .collect()
}

/// Structural identity check used by the walks to decide whether a parent
/// must be rebuilt. Exact for shared nodes, element-wise for the rest.
pub fn stmt_identical(a: &Stmt, b: &Stmt) -> bool {
    match (a, b) {
        (Stmt::For(x), Stmt::For(y)) => Rc::ptr_eq(x, y),
        (Stmt::BlockRealize(x), Stmt::BlockRealize(y)) => Rc::ptr_eq(x, y),
        (Stmt::Seq(x), Stmt::Seq(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| stmt_identical(a, b))
        }
        (
            Stmt::BufferStore { buffer: b1, value: v1, indices: i1 },
            Stmt::BufferStore { buffer: b2, value: v2, indices: i2 },
        ) => {
            Rc::ptr_eq(b1, b2)
                && Rc::ptr_eq(v1, v2)
                && i1.len() == i2.len()
                && i1.iter().zip(i2).all(|(a, b)| Rc::ptr_eq(a, b))
        }
        (
            Stmt::IfThenElse { condition: c1, then_case: t1, else_case: e1 },
            Stmt::IfThenElse { condition: c2, then_case: t2, else_case: e2 },
        ) => {
            Rc::ptr_eq(c1, c2)
                && stmt_identical(t1, t2)
                && match (e1, e2) {
                    (Some(a), Some(b)) => stmt_identical(a, b),
                    (None, None) => true,
                    _ => false,
                }
        }
        (Stmt::Evaluate(x), Stmt::Evaluate(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}
