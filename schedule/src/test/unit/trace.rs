use loft_ir::Annotations;

use crate::test::helpers::{find_block, find_loop, gemm_module, gemm_module_with_predicate, mma_intrin, tiled_gemm_module};
use crate::tensorize::TensorIntrin;
use crate::trace::{AttrValue, Schedule, instruction_kind};

#[test]
fn instruction_kinds_are_registered() {
    let blockize = instruction_kind("Blockize").unwrap();
    assert_eq!(blockize.num_inputs, 1);
    assert_eq!(blockize.num_attrs, 1);
    assert_eq!(blockize.num_decisions, 0);
    assert!(!blockize.is_pure);
    assert_eq!(blockize.num_outputs, 1);

    let tensorize = instruction_kind("Tensorize").unwrap();
    assert_eq!(tensorize.num_inputs, 1);
    assert_eq!(tensorize.num_attrs, 2);
    assert_eq!(tensorize.num_decisions, 0);
    assert!(!tensorize.is_pure);
    assert_eq!(tensorize.num_outputs, 0);

    assert!(instruction_kind("Reorder").is_none());
}

#[test]
fn schedule_records_applied_primitives() {
    let mut sch = Schedule::new(gemm_module(32, true));
    let loop_i = find_loop(&sch.state, "i");
    sch.blockize(loop_i, true).unwrap();

    assert_eq!(sch.trace().len(), 1);
    let instruction = &sch.trace()[0];
    assert_eq!(instruction.kind, "Blockize");
    assert_eq!(instruction.inputs, ["loop:i"]);
    assert_eq!(
        instruction.attrs,
        [("preserve_unit_iters", AttrValue::Bool(true))]
    );
}

#[test]
fn failed_primitives_record_nothing() {
    let mut sch = Schedule::new(gemm_module_with_predicate(32));
    let loop_i = find_loop(&sch.state, "i");
    assert!(sch.blockize(loop_i, false).is_err());
    assert!(sch.trace().is_empty());
}

#[test]
fn tensorize_records_both_attributes() {
    TensorIntrin::register("trace_mma", mma_intrin(16, Annotations::new()));
    let mut sch = Schedule::new(tiled_gemm_module(8, 16, Annotations::new()));
    let loop_ii = find_loop(&sch.state, "ii");
    sch.tensorize(loop_ii, "trace_mma", false).unwrap();

    assert_eq!(sch.trace().len(), 1);
    let instruction = &sch.trace()[0];
    assert_eq!(instruction.kind, "Tensorize");
    assert_eq!(instruction.attrs.len(), 2);
    assert_eq!(instruction.attrs[0], ("intrin", AttrValue::Str("trace_mma".to_string())));
    assert_eq!(
        instruction.attrs[1],
        ("preserve_unit_iters", AttrValue::Bool(false))
    );

    // The blockized and tensorized block is in place.
    assert_eq!(
        sch.state.get_block(find_block(&sch.state, "update_o")).match_buffers.len(),
        3
    );
}
