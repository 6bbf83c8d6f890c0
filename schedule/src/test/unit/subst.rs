use std::collections::HashMap;
use std::rc::Rc;

use loft_arith::Analyzer;
use loft_dtype::DType;
use loft_ir::{PrimExpr, Var};

use crate::state::BlockReuse;
use crate::subst::{substitute_block, substitute_expr, substitute_stmt};
use crate::test::helpers::{find_block, gemm_module};

#[test]
fn substitution_simplifies_changed_subtrees() {
    let vi = Var::new("vi", DType::Int32);
    // vi*16 + 4 with vi = 0 folds all the way down.
    let expr = PrimExpr::add(
        &PrimExpr::mul(&PrimExpr::var(&vi), &PrimExpr::int32(16)),
        &PrimExpr::int32(4),
    );
    let sub = HashMap::from([(vi.id(), PrimExpr::int32(0))]);

    let mut reuse = BlockReuse::default();
    let analyzer = Analyzer::new();
    let stmt = loft_ir::Stmt::Evaluate(expr);
    let rewritten = substitute_stmt(&stmt, &sub, &analyzer, &mut reuse);
    let loft_ir::Stmt::Evaluate(result) = rewritten else { panic!("wrong statement kind") };
    assert_eq!(result.as_int(), Some(4));
}

#[test]
fn plain_substitution_does_not_simplify() {
    let vi = Var::new("vi", DType::Int32);
    let expr = PrimExpr::mul(&PrimExpr::var(&vi), &PrimExpr::int32(16));
    let sub = HashMap::from([(vi.id(), PrimExpr::int32(0))]);
    let result = substitute_expr(&expr, &sub);
    // Still a multiplication, not folded to zero.
    assert!(result.as_int().is_none());
}

#[test]
fn block_rewrites_are_tracked() {
    let module = gemm_module(16, true);
    let state = crate::state::ScheduleState::new(module);
    let block = state.get_block(find_block(&state, "update"));
    let vi = block.iter_vars[0].var.clone();

    let sub = HashMap::from([(vi.id(), PrimExpr::int32(0))]);
    let analyzer = Analyzer::new();
    let mut reuse = BlockReuse::default();
    let rewritten = substitute_block(&block, &sub, &analyzer, &mut reuse);

    assert!(!Rc::ptr_eq(&rewritten, &block));
    assert_eq!(reuse.len(), 1);
    assert_eq!(reuse.get(block.id()).unwrap().id(), rewritten.id());
    assert_eq!(reuse.old_of(rewritten.id()), Some(block.id()));

    // The write region collapsed to the substituted point.
    assert!(rewritten.writes[0].region[0].min.is_zero());
}

#[test]
fn identity_substitution_preserves_the_block() {
    let module = gemm_module(16, true);
    let state = crate::state::ScheduleState::new(module);
    let block = state.get_block(find_block(&state, "update"));

    let sub = HashMap::new();
    let analyzer = Analyzer::new();
    let mut reuse = BlockReuse::default();
    let rewritten = substitute_block(&block, &sub, &analyzer, &mut reuse);

    assert!(Rc::ptr_eq(&rewritten, &block));
    assert!(reuse.is_empty());
}

#[test]
fn reuse_supersedes_previous_pairs() {
    let module = gemm_module(16, true);
    let state = crate::state::ScheduleState::new(module);
    let block = state.get_block(find_block(&state, "update"));
    let vi = block.iter_vars[0].var.clone();
    let analyzer = Analyzer::new();

    let mut reuse = BlockReuse::default();
    let first = substitute_block(
        &block,
        &HashMap::from([(vi.id(), PrimExpr::int32(0))]),
        &analyzer,
        &mut reuse,
    );
    // A later stage maps the same source block to its final replacement.
    let second = substitute_block(
        &block,
        &HashMap::from([(vi.id(), PrimExpr::int32(1))]),
        &analyzer,
        &mut reuse,
    );

    assert_eq!(reuse.len(), 1);
    assert_eq!(reuse.get(block.id()).unwrap().id(), second.id());
    assert_eq!(reuse.old_of(first.id()), None);
    assert_eq!(reuse.old_of(second.id()), Some(block.id()));
}
