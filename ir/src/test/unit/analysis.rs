use loft_dtype::DType;

use crate::analysis::{uses_var_expr, uses_var_stmt};
use crate::buffer::{Buffer, BufferRegion, Range};
use crate::expr::{PrimExpr, Var};
use crate::stmt::{Block, BlockRealize, IterType, IterVar, Stmt};

#[test]
fn expr_usage() {
    let x = Var::new("x", DType::Int32);
    let y = Var::new("y", DType::Int32);
    let expr = PrimExpr::add(&PrimExpr::mul(&PrimExpr::var(&x), &PrimExpr::int32(4)), &PrimExpr::int32(1));
    assert!(uses_var_expr(&expr, x.id()));
    assert!(!uses_var_expr(&expr, y.id()));
}

#[test]
fn stmt_usage_sees_regions_and_init() {
    let vi = Var::new("vi", DType::Int32);
    let hidden = Var::new("h", DType::Int32);
    let buffer = Buffer::new("C", vec![PrimExpr::int32(8)], DType::Float32);

    // `hidden` occurs only in the init subtree.
    let init = Stmt::store(
        &buffer,
        PrimExpr::float(0.0, DType::Float32),
        vec![PrimExpr::var(&hidden)],
    );
    let body = Stmt::store(
        &buffer,
        PrimExpr::float(1.0, DType::Float32),
        vec![PrimExpr::var(&vi)],
    );
    let block = Block::new_full(
        vec![IterVar::new(Range::from_extent(&PrimExpr::int32(8)), vi.clone(), IterType::DataPar)],
        vec![],
        vec![BufferRegion::new(buffer, vec![Range::point(&PrimExpr::var(&vi))])],
        "c",
        body,
        Some(init),
        vec![],
        vec![],
        Default::default(),
    );
    let stmt = Stmt::BlockRealize(BlockRealize::new(
        vec![PrimExpr::int32(0)],
        PrimExpr::true_(),
        block,
    ));

    assert!(uses_var_stmt(&stmt, vi.id()));
    assert!(uses_var_stmt(&stmt, hidden.id()));
    assert!(!uses_var_stmt(&stmt, Var::new("other", DType::Int32).id()));
}
