//! The single-loop blockize primitive.
//!
//! Blockizing a loop wraps the loops at and below it, together with their
//! unique inner block, into a new outer block. Every block iterator binding
//! is factored into `outer * inner_extent + inner` over the loop partition;
//! the inner block keeps the factor expressible in inner loops, the outer
//! block gets the rest, and reduction init statements are re-homed onto the
//! outer block.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use loft_arith::{Analyzer, IntSet, IterMark};
use loft_ir::analysis::{uses_var_expr, uses_var_stmt};
use loft_ir::{
    Annotations, Block, BlockRealize, Expr, For, IterType, IterVar, PrimExpr, Range, Stmt,
};

use crate::analysis::{check_get_single_child_block_realize, get_scope_root};
use crate::error::{Result, SubspaceNotDivisibleSnafu};
use crate::region::{DomMap, eval_set_regions};
use crate::state::{BlockReuse, Replacement, ScheduleState, StmtSRef};
use crate::subst::{VarSubst, substitute_block, substitute_vars_stmt};

/// Trivial subspace division.
///
/// Applies only under a literally-true predicate. Each binding must use only
/// outer loop vars, only inner loop vars, or neither; the unused side is a
/// unit iterator. A binding touching both sides fails the whole division.
pub(crate) fn trivial_subspace_division(
    iter_vars: &[IterVar],
    bindings: &[Expr],
    predicate: &Expr,
    outer_vars: &HashSet<u64>,
    inner_vars: &HashSet<u64>,
) -> Vec<[IterMark; 2]> {
    if !predicate.is_const_true() {
        return vec![];
    }
    let uses_any = |expr: &Expr, vars: &HashSet<u64>| vars.iter().any(|id| uses_var_expr(expr, *id));

    let mut result = Vec::with_capacity(bindings.len() + 1);
    for (iter_var, binding) in iter_vars.iter().zip(bindings) {
        let outer = uses_any(binding, outer_vars);
        let inner = uses_any(binding, inner_vars);
        let mark = IterMark::new(binding.clone(), iter_var.dom.extent.clone());
        match (outer, inner) {
            (true, false) => result.push([mark, IterMark::unit()]),
            (false, true) => result.push([IterMark::unit(), mark]),
            (false, false) => result.push([IterMark::unit(), IterMark::unit()]),
            (true, true) => return vec![],
        }
    }
    result.push([
        IterMark::predicate(PrimExpr::true_()),
        IterMark::predicate(PrimExpr::true_()),
    ]);
    result
}

/// Subspace division over the loops enclosing the block.
///
/// Loops at and below `loop_sref` are inner (with `loop_sref_as_outer`, the
/// demarcation loop itself becomes outer); the inner loops are collected
/// bottom-up into `loops` for later reconstruction. The affine divider runs
/// first, the trivial division is the fallback.
#[allow(clippy::too_many_arguments)]
pub(crate) fn subspace_divide(
    state: &ScheduleState,
    realize: &Rc<BlockRealize>,
    block_sref: StmtSRef,
    loop_sref: StmtSRef,
    loops: &mut Vec<Rc<For>>,
    analyzer: &Analyzer,
    _preserve_unit_iters: bool,
    loop_sref_as_outer: bool,
) -> Vec<[IterMark; 2]> {
    let mut inner_vars: HashSet<u64> = HashSet::new();
    let mut outer_vars: HashSet<u64> = HashSet::new();
    let mut loop_domains: HashMap<u64, Range> = HashMap::new();
    let mut inner = true;

    let mut cursor = state.parent(block_sref);
    while let Some(sref) = cursor {
        let Some(f) = state.try_get_for(sref) else { break };
        if inner {
            loops.push(f.clone());
            inner_vars.insert(f.loop_var.id());
        } else {
            outer_vars.insert(f.loop_var.id());
        }
        loop_domains.insert(f.loop_var.id(), Range::new(f.min.clone(), f.extent.clone()));
        let parent = state.parent(sref);
        if (loop_sref_as_outer && parent == Some(loop_sref)) || sref == loop_sref {
            inner = false;
        }
        cursor = parent;
    }

    let iter_extents: Vec<Expr> =
        realize.block.iter_vars.iter().map(|iter_var| iter_var.dom.extent.clone()).collect();
    let result = loft_arith::subspace_divide(
        &realize.iter_values,
        &iter_extents,
        &loop_domains,
        &inner_vars,
        &realize.predicate,
        analyzer,
    );
    if !result.is_empty() {
        return result;
    }
    trivial_subspace_division(
        &realize.block.iter_vars,
        &realize.iter_values,
        &realize.predicate,
        &outer_vars,
        &inner_vars,
    )
}

/// Derive the iterator vars and bindings of the outer and inner blocks.
///
/// Returns the substitution plan for the original block iterators:
/// `0`, `outer`, `inner`, or `outer * inner_extent + inner` depending on the
/// factor extents and `preserve_unit_iters`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn derive_block_binding(
    iter_vars: &[IterVar],
    division: &[[IterMark; 2]],
    outer_iter_vars: &mut Vec<IterVar>,
    outer_bindings: &mut Vec<Expr>,
    inner_iter_vars: &mut Vec<IterVar>,
    inner_bindings: &mut Vec<Expr>,
    preserve_unit_iters: bool,
    reuse_outer: bool,
) -> VarSubst {
    assert_eq!(
        iter_vars.len() + 1,
        division.len(),
        "expected one division entry per iter var plus the predicate pair"
    );
    let analyzer = Analyzer::new();
    let mut block_var_subst = VarSubst::new();
    for (i, iter_var) in iter_vars.iter().enumerate() {
        let outer_mark = &division[i][0];
        let inner_mark = &division[i][1];
        // binding = outer_mark.source * inner_mark.extent + inner_mark.source
        let outer_iter = if reuse_outer && i < outer_iter_vars.len() {
            let existing = outer_iter_vars[i].clone();
            assert!(
                analyzer.can_prove_equal(&existing.dom.extent, &outer_mark.extent),
                "reused outer iterator must keep its extent"
            );
            assert!(
                analyzer.can_prove_equal(&outer_bindings[i], &outer_mark.source),
                "reused outer iterator must keep its binding"
            );
            existing
        } else {
            let outer_iter = IterVar::new(
                Range::from_extent(&outer_mark.extent),
                iter_var.var.copy_with_suffix("_o"),
                iter_var.iter_type,
            );
            outer_bindings.push(outer_mark.source.clone());
            outer_iter_vars.push(outer_iter.clone());
            outer_iter
        };

        let substitution = if inner_mark.extent.is_one() {
            // No inner iterator is produced for a unit inner factor.
            if outer_mark.extent.is_one() && !preserve_unit_iters {
                PrimExpr::zero(outer_mark.extent.dtype())
            } else {
                PrimExpr::var(&outer_iter.var)
            }
        } else {
            let inner_iter = IterVar::new(
                Range::from_extent(&inner_mark.extent),
                iter_var.var.copy_with_suffix("_i"),
                iter_var.iter_type,
            );
            inner_bindings.push(inner_mark.source.clone());
            inner_iter_vars.push(inner_iter.clone());
            if outer_mark.extent.is_one() {
                PrimExpr::var(&inner_iter.var)
            } else {
                PrimExpr::add(
                    &PrimExpr::mul(&PrimExpr::var(&outer_iter.var), &inner_mark.extent),
                    &PrimExpr::var(&inner_iter.var),
                )
            }
        };
        block_var_subst.insert(iter_var.var.id(), substitution);
    }
    block_var_subst
}

/// Build the inner block realize from the substituted block.
///
/// When the outer block carries the reduction, the inner block's writes are
/// prepended to its reads so the reduction update reads before it writes.
pub(crate) fn generate_inner(
    is_write_reduction: bool,
    iter_vars: Vec<IterVar>,
    iter_values: Vec<Expr>,
    predicate: Expr,
    block: &Rc<Block>,
) -> Rc<BlockRealize> {
    let reads = if is_write_reduction {
        block.writes.iter().chain(&block.reads).cloned().collect()
    } else {
        block.reads.clone()
    };
    let inner = Block::new_full(
        iter_vars,
        reads,
        block.writes.clone(),
        block.name_hint.clone(),
        block.body.clone(),
        None,
        block.alloc_buffers.clone(),
        block.match_buffers.clone(),
        block.annotations.clone(),
    );
    BlockRealize::new(iter_values, predicate, inner)
}

/// Build the init subtree of the outer block.
///
/// The init block iterates only those DataPar inner iterators the init body
/// actually references, and is wrapped in clones of exactly the inner loops
/// that appear in at least one init binding. All new iterator and loop vars
/// are fresh; the renames are threaded through by plain substitution.
pub(crate) fn generate_outer_init(
    block_init: &Stmt,
    inner_realize: &Rc<BlockRealize>,
    loops: &[Rc<For>],
    block_name: String,
) -> Stmt {
    let inner_block = &inner_realize.block;
    let mut subst = VarSubst::new();

    // Step 1: iterators used by the init body.
    let mut iter_vars = Vec::new();
    let mut iter_values = Vec::new();
    assert_eq!(inner_block.iter_vars.len(), inner_realize.iter_values.len());
    for (iter_var, value) in inner_block.iter_vars.iter().zip(&inner_realize.iter_values) {
        if iter_var.iter_type == IterType::DataPar && uses_var_stmt(block_init, iter_var.var.id()) {
            let new_var = iter_var.var.copy_with_suffix("_init");
            subst.insert(iter_var.var.id(), PrimExpr::var(&new_var));
            iter_vars.push(IterVar::new(iter_var.dom.clone(), new_var, iter_var.iter_type));
            iter_values.push(value.clone());
        }
    }

    // Step 2: the init block realization.
    let mut stmt = Stmt::BlockRealize(BlockRealize::new(
        iter_values.clone(),
        inner_realize.predicate.clone(),
        Block::new(
            iter_vars,
            Vec::new(),
            inner_block.writes.clone(),
            block_name,
            block_init.clone(),
        ),
    ));

    // Step 3: the loop nest, restricted to loops an init binding uses.
    for f in loops {
        let is_init_loop =
            iter_values.iter().any(|binding| uses_var_expr(binding, f.loop_var.id()));
        if is_init_loop {
            let new_loop_var = f.loop_var.copy_with_suffix("");
            subst.insert(f.loop_var.id(), PrimExpr::var(&new_loop_var));
            stmt = Stmt::For(f.with_loop_var_and_body(new_loop_var, stmt));
        }
    }

    // Step 4: thread the renames through the subtree.
    substitute_vars_stmt(&stmt, &subst)
}

/// Rewrap a statement in clones of the collected loops, innermost first.
pub(crate) fn make_loop_nest(mut stmt: Stmt, loops: &[Rc<For>]) -> Stmt {
    for f in loops {
        stmt = Stmt::For(f.with_body(stmt));
    }
    stmt
}

/// Stage the blockized realize for the subtree rooted at `loop_sref`.
pub(crate) fn blockize_impl(
    state: &ScheduleState,
    loop_sref: StmtSRef,
    reuse: &mut BlockReuse,
    analyzer: &mut Analyzer,
    preserve_unit_iters: bool,
) -> Result<Rc<BlockRealize>> {
    let _ = state.get_for(loop_sref);
    // Step 1: the unique block realize under the loop.
    let realize = check_get_single_child_block_realize(state, loop_sref)?;
    let block = realize.block.clone();
    let block_sref = state.sref_of(block.id()).expect("realized blocks have srefs");

    // Step 2: subspace division over the loop partition.
    let mut loops: Vec<Rc<For>> = Vec::new();
    let division = subspace_divide(
        state,
        &realize,
        block_sref,
        loop_sref,
        &mut loops,
        analyzer,
        preserve_unit_iters,
        false,
    );
    if division.is_empty() {
        let scope_loop = loops.last().cloned().expect("a blockized loop encloses the block");
        return SubspaceNotDivisibleSnafu { scope_loop, block }.fail();
    }
    let outer_predicate = division[division.len() - 1][0].extent.clone();
    let inner_predicate = division[division.len() - 1][1].extent.clone();

    // Step 3: derive bindings for the outer and inner blocks.
    let mut outer_iter_vars = Vec::new();
    let mut inner_iter_vars = Vec::new();
    let mut outer_bindings = Vec::new();
    let mut inner_bindings = Vec::new();
    let block_var_subst = derive_block_binding(
        &block.iter_vars,
        &division,
        &mut outer_iter_vars,
        &mut outer_bindings,
        &mut inner_iter_vars,
        &mut inner_bindings,
        preserve_unit_iters,
        false,
    );

    // Step 4: substitute the block to the new bindings.
    let mut inner_iter_dom: DomMap = HashMap::new();
    for iter in &inner_iter_vars {
        inner_iter_dom.insert(iter.var.id(), IntSet::from_range(&iter.dom, analyzer));
        analyzer.bind(&iter.var, &iter.dom);
    }
    let block_subst = substitute_block(&block, &block_var_subst, analyzer, reuse);

    // Step 5: the inner block. Its writes are reductions when the original
    // block has an init and any outer iterator is a reduction iterator.
    let has_outer_reduction = block_subst.init.is_some()
        && outer_iter_vars.iter().any(|iter_var| iter_var.iter_type == IterType::CommReduce);
    let inner_realize = generate_inner(
        has_outer_reduction,
        inner_iter_vars,
        inner_bindings,
        inner_predicate,
        &block_subst,
    );
    reuse.insert(&block, &inner_realize.block);

    // Step 6: the outer block.
    let outer_block = Block::new_full(
        outer_iter_vars,
        eval_set_regions(&block_subst.reads, &inner_iter_dom, analyzer),
        eval_set_regions(&block_subst.writes, &inner_iter_dom, analyzer),
        format!("{}_o", block_subst.name_hint),
        make_loop_nest(Stmt::BlockRealize(inner_realize.clone()), &loops),
        block_subst.init.as_ref().map(|init| {
            generate_outer_init(
                init,
                &inner_realize,
                &loops,
                format!("{}_init", block_subst.name_hint),
            )
        }),
        Vec::new(),
        Vec::new(),
        Annotations::new(),
    );
    Ok(BlockRealize::new(outer_bindings, outer_predicate, outer_block))
}

/// Blockize the subtree rooted at `loop_sref` and install the result.
///
/// Returns the sref of the new outer block. On failure the schedule state is
/// left untouched.
pub fn blockize(
    state: &mut ScheduleState,
    loop_sref: StmtSRef,
    preserve_unit_iters: bool,
) -> Result<StmtSRef> {
    let mut analyzer = Analyzer::new();
    let mut reuse = BlockReuse::default();
    let blockized =
        blockize_impl(state, loop_sref, &mut reuse, &mut analyzer, preserve_unit_iters)?;
    let new_block_id = blockized.block.id();
    state.replace(loop_sref, Replacement::Stmt(Stmt::BlockRealize(blockized)), &reuse);

    let result = state.sref_of(new_block_id).expect("the outer block was installed");
    let scope_root = get_scope_root(state, result);
    let scope_affine = state.is_affine_block_binding(scope_root);
    state.update_scope_block_info(scope_root);
    state.set_affine_block_binding(scope_root, scope_affine);
    Ok(result)
}
