//! Variable substitution with simplification and block reuse tracking.
//!
//! The substituter rewrites every occurrence of a mapped var, re-simplifies
//! any expression whose subtree changed, and records each rewritten block as
//! an `(old, new)` pair so the schedule can re-link srefs after the install.
//! Nothing else about the tree changes.

use std::collections::HashMap;
use std::rc::Rc;

use loft_arith::Analyzer;
use loft_ir::functor::{StmtExprMutator, walk_block, walk_expr};
use loft_ir::{Block, Expr, Stmt, Var};

use crate::state::BlockReuse;

/// Substitution plan: var id to replacement expression.
pub type VarSubst = HashMap<u64, Expr>;

struct Substituter<'a> {
    sub: &'a VarSubst,
    analyzer: Option<&'a Analyzer>,
    reuse: Option<&'a mut BlockReuse>,
}

impl StmtExprMutator for Substituter<'_> {
    fn visit_expr(&mut self, expr: &Expr) -> Expr {
        let result = walk_expr(self, expr);
        if !Rc::ptr_eq(&result, expr) {
            if let Some(analyzer) = self.analyzer {
                return analyzer.simplify(&result);
            }
        }
        result
    }

    fn visit_var(&mut self, var: &Rc<Var>, expr: &Expr) -> Expr {
        self.sub.get(&var.id()).cloned().unwrap_or_else(|| expr.clone())
    }

    fn visit_block(&mut self, block: &Rc<Block>) -> Rc<Block> {
        let result = walk_block(self, block);
        if !Rc::ptr_eq(&result, block) {
            if let Some(reuse) = self.reuse.as_deref_mut() {
                reuse.insert(block, &result);
            }
        }
        result
    }
}

pub fn substitute_stmt(
    stmt: &Stmt,
    sub: &VarSubst,
    analyzer: &Analyzer,
    reuse: &mut BlockReuse,
) -> Stmt {
    Substituter { sub, analyzer: Some(analyzer), reuse: Some(reuse) }.visit_stmt(stmt)
}

pub fn substitute_block(
    block: &Rc<Block>,
    sub: &VarSubst,
    analyzer: &Analyzer,
    reuse: &mut BlockReuse,
) -> Rc<Block> {
    Substituter { sub, analyzer: Some(analyzer), reuse: Some(reuse) }.visit_block(block)
}

/// Plain substitution over an expression, no simplifier.
pub fn substitute_expr(expr: &Expr, sub: &VarSubst) -> Expr {
    Substituter { sub, analyzer: None, reuse: None }.visit_expr(expr)
}

/// Plain var-for-var renaming over a statement, no simplifier, no tracking.
pub fn substitute_vars_stmt(stmt: &Stmt, sub: &VarSubst) -> Stmt {
    Substituter { sub, analyzer: None, reuse: None }.visit_stmt(stmt)
}
