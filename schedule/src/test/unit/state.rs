use crate::analysis::{get_scope_root, lowest_common_ancestor};
use crate::state::ScheduleState;
use crate::test::helpers::{find_block, find_loop, gemm_module};

#[test]
fn sref_tree_shape() {
    let state = ScheduleState::new(gemm_module(32, true));
    let update = find_block(&state, "update");
    let loop_k = find_loop(&state, "k");
    let loop_j = find_loop(&state, "j");
    let loop_i = find_loop(&state, "i");
    let root = find_block(&state, "root");

    assert_eq!(state.parent(update), Some(loop_k));
    assert_eq!(state.parent(loop_k), Some(loop_j));
    assert_eq!(state.parent(loop_j), Some(loop_i));
    assert_eq!(state.parent(loop_i), Some(root));
    assert_eq!(state.parent(root), None);
}

#[test]
fn scope_root_is_the_nearest_block() {
    let state = ScheduleState::new(gemm_module(32, true));
    let update = find_block(&state, "update");
    let loop_j = find_loop(&state, "j");
    let root = find_block(&state, "root");

    assert_eq!(get_scope_root(&state, update), root);
    assert_eq!(get_scope_root(&state, loop_j), root);
    // The scope root of the root itself is the root.
    assert_eq!(get_scope_root(&state, root), root);
}

#[test]
fn lca_of_block_and_enclosing_loop() {
    let state = ScheduleState::new(gemm_module(32, true));
    let update = find_block(&state, "update");
    let loop_k = find_loop(&state, "k");
    let loop_j = find_loop(&state, "j");

    assert_eq!(lowest_common_ancestor(&state, &[update, loop_k]), loop_k);
    assert_eq!(lowest_common_ancestor(&state, &[update, loop_j]), loop_j);
    assert_eq!(lowest_common_ancestor(&state, &[update]), update);
}

#[test]
fn block_realize_and_affine_info() {
    let state = ScheduleState::new(gemm_module(32, true));
    let update = find_block(&state, "update");
    let realize = state.get_block_realize(update);
    assert_eq!(realize.iter_values.len(), 3);
    // Loop-var bindings are affine.
    assert!(state.is_affine_block_binding(update));
    assert!(state.is_affine_block_binding(find_block(&state, "root")));
}
