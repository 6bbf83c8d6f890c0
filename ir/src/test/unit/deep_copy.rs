use loft_dtype::DType;

use crate::buffer::{Buffer, BufferRegion, Range};
use crate::deep_copy::{deep_copy_func, deep_copy_func_with_index_dtype};
use crate::expr::{PrimExpr, Var};
use crate::prim_func::PrimFunc;
use crate::stmt::{Block, BlockRealize, For, IterType, IterVar, Stmt};

fn copy_src() -> PrimFunc {
    let a_param = Var::new("a", DType::Handle);
    let a = Buffer::new("A", vec![PrimExpr::int32(16), PrimExpr::int32(16)], DType::Float32);
    let i = Var::new("i", DType::Int32);
    let vi = Var::new("vi", DType::Int32);

    let store = Stmt::store(
        &a,
        PrimExpr::float(0.0, DType::Float32),
        vec![PrimExpr::var(&vi), PrimExpr::int32(0)],
    );
    let block = Block::new(
        vec![IterVar::new(Range::from_extent(&PrimExpr::int32(16)), vi.clone(), IterType::DataPar)],
        vec![],
        vec![BufferRegion::new(
            a.clone(),
            vec![Range::point(&PrimExpr::var(&vi)), Range::point(&PrimExpr::int32(0))],
        )],
        "clear",
        store,
    );
    let realize = BlockRealize::new(vec![PrimExpr::var(&i)], PrimExpr::true_(), block);
    let body = Stmt::For(For::serial(i, &PrimExpr::int32(16), Stmt::BlockRealize(realize)));
    PrimFunc::new(vec![a_param.clone()], vec![(a_param, a)], body)
}

#[test]
fn copies_have_fresh_identity() {
    let func = copy_src();
    let copied = deep_copy_func(&func);

    let old_buffer = func.param_buffers().next().unwrap();
    let new_buffer = copied.param_buffers().next().unwrap();
    assert_ne!(old_buffer.id(), new_buffer.id());

    let old_block = &func.body.as_for().unwrap().body.as_block_realize().unwrap().block;
    let new_block = &copied.body.as_for().unwrap().body.as_block_realize().unwrap().block;
    assert_ne!(old_block.id(), new_block.id());
    assert_ne!(old_block.iter_vars[0].var.id(), new_block.iter_vars[0].var.id());
    assert_eq!(new_block.name_hint, "clear");
}

#[test]
fn shared_vars_are_copied_once() {
    let func = copy_src();
    let copied = deep_copy_func(&func);

    // The loop var and the realize binding must still be the same var.
    let new_for = copied.body.as_for().unwrap();
    let realize = new_for.body.as_block_realize().unwrap();
    assert_eq!(realize.iter_values[0].as_var().unwrap().id(), new_for.loop_var.id());
}

#[test]
fn index_dtype_normalization() {
    let func = copy_src();
    let copied = deep_copy_func_with_index_dtype(&func, DType::Int64);

    let new_for = copied.body.as_for().unwrap();
    assert_eq!(new_for.loop_var.dtype, DType::Int64);
    assert_eq!(new_for.extent.dtype(), DType::Int64);

    let block = &new_for.body.as_block_realize().unwrap().block;
    assert_eq!(block.iter_vars[0].var.dtype, DType::Int64);
    assert_eq!(block.iter_vars[0].dom.extent.dtype(), DType::Int64);
    // Index constants inside write regions follow the target width.
    assert_eq!(block.writes[0].region[1].min.dtype(), DType::Int64);
    // The element dtype is untouched.
    let buffer = copied.param_buffers().next().unwrap();
    assert_eq!(buffer.dtype, DType::Float32);
    assert_eq!(buffer.shape[0].dtype(), DType::Int64);
}
