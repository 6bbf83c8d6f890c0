use std::collections::HashMap;
use std::rc::Rc;

use loft_dtype::DType;

use crate::buffer::{Buffer, BufferRegion, Range};
use crate::expr::{Expr, PrimExpr, Var};
use crate::functor::{StmtExprMutator, stmt_identical, walk_stmt};
use crate::stmt::{Block, BlockRealize, For, IterType, IterVar, Stmt};

/// Renames vars through a map, nothing else.
struct Renamer {
    map: HashMap<u64, Expr>,
}

impl StmtExprMutator for Renamer {
    fn visit_var(&mut self, var: &Rc<Var>, expr: &Expr) -> Expr {
        self.map.get(&var.id()).cloned().unwrap_or_else(|| expr.clone())
    }
}

fn small_block() -> (Rc<Var>, Stmt) {
    let i = Var::new("i", DType::Int32);
    let vi = Var::new("vi", DType::Int32);
    let buffer = Buffer::new("B", vec![PrimExpr::int32(16)], DType::Float32);
    let store = Stmt::store(
        &buffer,
        PrimExpr::float(1.0, DType::Float32),
        vec![PrimExpr::var(&vi)],
    );
    let block = Block::new(
        vec![IterVar::new(
            Range::from_extent(&PrimExpr::int32(16)),
            vi.clone(),
            IterType::DataPar,
        )],
        vec![],
        vec![BufferRegion::new(buffer, vec![Range::point(&PrimExpr::var(&vi))])],
        "write",
        store,
    );
    let realize = BlockRealize::new(vec![PrimExpr::var(&i)], PrimExpr::true_(), block);
    let body = Stmt::For(For::serial(i.clone(), &PrimExpr::int32(16), Stmt::BlockRealize(realize)));
    (i, body)
}

#[test]
fn identity_walk_preserves_nodes() {
    let (_, body) = small_block();
    let mut renamer = Renamer { map: HashMap::new() };
    let walked = walk_stmt(&mut renamer, &body);
    assert!(stmt_identical(&walked, &body));
    let (old_for, new_for) = (body.as_for().unwrap(), walked.as_for().unwrap());
    assert!(Rc::ptr_eq(old_for, new_for));
}

#[test]
fn renaming_rebuilds_only_the_touched_spine() {
    let (i, body) = small_block();
    let j = Var::new("j", DType::Int32);
    let mut renamer = Renamer { map: HashMap::from([(i.id(), PrimExpr::var(&j))]) };
    let walked = walk_stmt(&mut renamer, &body);

    // The loop binding site is untouched; only the realize value changed.
    let new_for = walked.as_for().unwrap();
    assert_eq!(new_for.loop_var.name, "i");
    let realize = new_for.body.as_block_realize().unwrap();
    assert_eq!(realize.iter_values[0].as_var().unwrap().name, "j");

    // The inner block contains no `i`, so it keeps its identity and id.
    let old_block = &body.as_for().unwrap().body.as_block_realize().unwrap().block;
    assert!(Rc::ptr_eq(&realize.block, old_block));
}

#[test]
fn block_region_substitution_rebuilds_block() {
    let (_, body) = small_block();
    let old_block = body.as_for().unwrap().body.as_block_realize().unwrap().block.clone();
    let vi = old_block.iter_vars[0].var.clone();

    let mut renamer = Renamer { map: HashMap::from([(vi.id(), PrimExpr::int32(3))]) };
    let walked = walk_stmt(&mut renamer, &body);
    let new_block = &walked.as_for().unwrap().body.as_block_realize().unwrap().block;

    assert!(!Rc::ptr_eq(new_block, &old_block));
    assert_ne!(new_block.id(), old_block.id());
    assert_eq!(new_block.writes[0].region[0].min.as_int(), Some(3));
}
