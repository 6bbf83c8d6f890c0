use loft_ir::Stmt;

use crate::blockize_group::blockize_blocks;
use crate::state::ScheduleState;
use crate::test::helpers::{
    assert_realize_sizes, find_block, find_loop, reduction_siblings_module, scalar_blocks_module,
    sibling_blocks_module,
};

// ===== S4: two consecutive siblings =====

#[test]
fn two_siblings_collapse_into_one_outer_block() {
    let mut state = ScheduleState::new(sibling_blocks_module(&["B1", "B2"], 16));
    let b1 = find_block(&state, "B1");
    let b2 = find_block(&state, "B2");
    let outer_sref = blockize_blocks(&mut state, &[b1, b2], false).unwrap();

    let outer = state.get_block(outer_sref);
    assert_eq!(outer.name_hint, "outer_B1_B2_");
    assert_eq!(outer.iter_vars.len(), 1);
    assert_eq!(outer.iter_vars[0].var.name, "vi");
    assert_eq!(outer.iter_vars[0].dom.extent.as_int(), Some(16));

    // The outer realize binds the collected loop var.
    let outer_realize = state.get_block_realize(outer_sref);
    assert_eq!(outer_realize.iter_values.len(), 1);
    assert_eq!(outer_realize.iter_values[0].as_var().unwrap().name, "i");
    assert!(outer_realize.predicate.is_const_true());

    // Its body is the sequence of the two inner realizations, with every
    // original iterator renamed with the `_i` suffix and rebound to the
    // outer iterator.
    let Stmt::Seq(children) = &outer.body else { panic!("outer body is not a sequence") };
    assert_eq!(children.len(), 2);
    for (child, name) in children.iter().zip(["B1", "B2"]) {
        let Stmt::BlockRealize(inner_realize) = child else { panic!("not a realize") };
        let inner = &inner_realize.block;
        assert_eq!(inner.name_hint, name);
        assert_eq!(inner.iter_vars.len(), 1);
        assert!(inner.iter_vars[0].var.name.ends_with("_i"));
        assert_eq!(
            inner_realize.iter_values[0].as_var().unwrap().id(),
            outer.iter_vars[0].var.id()
        );
    }

    // The union of the writes covers both destination buffers, first-seen
    // order preserved.
    assert_eq!(outer.writes.len(), 2);
    assert_eq!(outer.writes[0].buffer.name, "D0");
    assert_eq!(outer.writes[1].buffer.name, "D1");
    for write in &outer.writes {
        assert_eq!(write.region[0].extent.as_int(), Some(16));
    }

    assert_realize_sizes(&state);
}

// ===== S5: non-consecutive targets =====

#[test]
#[should_panic(expected = "Target blocks must be consecutive!")]
fn non_consecutive_targets_are_fatal() {
    let mut state = ScheduleState::new(sibling_blocks_module(&["B1", "X", "B2"], 16));
    let b1 = find_block(&state, "B1");
    let b2 = find_block(&state, "B2");
    let _ = blockize_blocks(&mut state, &[b1, b2], false);
}

// ===== Root LCA: synthesized unit iterator =====

#[test]
fn root_lca_gets_a_dummy_unit_iterator() {
    let mut state = ScheduleState::new(scalar_blocks_module(&["S1", "S2"]));
    let s1 = find_block(&state, "S1");
    let s2 = find_block(&state, "S2");
    let outer_sref = blockize_blocks(&mut state, &[s1, s2], false).unwrap();

    let outer = state.get_block(outer_sref);
    assert_eq!(outer.name_hint, "outer_S1_S2_");
    assert_eq!(outer.iter_vars.len(), 1);
    assert_eq!(outer.iter_vars[0].var.name, "init_o");
    assert!(outer.iter_vars[0].dom.extent.is_one());

    let outer_realize = state.get_block_realize(outer_sref);
    assert_eq!(outer_realize.iter_values.len(), 1);
    assert!(outer_realize.iter_values[0].is_zero());
    assert!(outer_realize.predicate.is_const_true());

    let Stmt::Seq(children) = &outer.body else { panic!("outer body is not a sequence") };
    assert_eq!(children.len(), 2);
}

// ===== Partial runs leave the other siblings alone =====

#[test]
fn partial_run_keeps_non_target_siblings() {
    let mut state = ScheduleState::new(sibling_blocks_module(&["B1", "B2", "X"], 8));
    let b1 = find_block(&state, "B1");
    let b2 = find_block(&state, "B2");
    let outer_sref = blockize_blocks(&mut state, &[b1, b2], false).unwrap();

    let outer = state.get_block(outer_sref);
    assert_eq!(outer.name_hint, "outer_B1_B2_");

    // The loop body is now [outer realize, X's original realize].
    let loop_i = find_loop(&state, "i");
    let f = state.get_for(loop_i);
    let Stmt::Seq(children) = &f.body else { panic!("loop body is not a sequence") };
    assert_eq!(children.len(), 2);
    let Stmt::BlockRealize(last) = &children[1] else { panic!("missing sibling") };
    assert_eq!(last.block.name_hint, "X");
}

// ===== Outer reductions are rejected =====

#[test]
#[should_panic(expected = "No reduction iter vars allowed for the outer loops")]
fn outer_reduction_is_fatal() {
    let mut state = ScheduleState::new(reduction_siblings_module(16));
    let r0 = find_block(&state, "red0");
    let r1 = find_block(&state, "red1");
    let _ = blockize_blocks(&mut state, &[r0, r1], false);
}
