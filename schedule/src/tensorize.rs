//! The tensorize primitive and the tensor intrinsic registry.
//!
//! Tensorize blockizes the target if it is a loop, structurally matches the
//! blockized region against the intrinsic descriptor, and replaces the block
//! body with the intrinsic implementation. The implementation's buffer
//! parameters become `MatchBufferRegion`s aliasing subregions of the current
//! program's buffers at the matched base indices.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use loft_arith::Analyzer;
use loft_dtype::DType;
use loft_ir::deep_copy::deep_copy_func_with_index_dtype;
use loft_ir::{
    Block, BlockRealize, BufferRegion, Expr, MatchBufferRegion, PrimExpr, PrimFunc, Range, Stmt,
};

use crate::analysis::get_scope_root;
use crate::blockize::blockize_impl;
use crate::comparator::TensorizeComparator;
use crate::error::{IntrinNotFoundSnafu, Result};
use crate::state::{BlockReuse, Replacement, SRefStmt, ScheduleState, StmtSRef};

/// A hardware tensor intrinsic: an abstract computation (`desc`) and the
/// implementation that replaces a region matching it (`impl_`). Both are
/// primitive functions whose body is a single top-level block realize and
/// whose ordered parameters map to buffers.
#[derive(Debug, Clone)]
pub struct TensorIntrin {
    pub desc: PrimFunc,
    pub impl_: PrimFunc,
}

// Thread-local intrinsic registry. Registration never mutates an intrinsic
// in place; tensorize deep-copies the implementation before rewriting it.
thread_local! {
    static INTRIN_REGISTRY: RefCell<HashMap<String, Rc<TensorIntrin>>> =
        RefCell::new(HashMap::new());
}

impl TensorIntrin {
    pub fn new(desc: PrimFunc, impl_: PrimFunc) -> Rc<Self> {
        assert_eq!(
            desc.params.len(),
            impl_.params.len(),
            "descriptor and implementation must have matching parameter lists"
        );
        Rc::new(Self { desc, impl_ })
    }

    pub fn register(name: impl Into<String>, intrin: Rc<TensorIntrin>) {
        INTRIN_REGISTRY.with(|registry| {
            registry.borrow_mut().insert(name.into(), intrin);
        });
    }

    pub fn get(name: &str) -> Option<Rc<TensorIntrin>> {
        INTRIN_REGISTRY.with(|registry| registry.borrow().get(name).cloned())
    }
}

/// Tensorize the block or loop at `sref` against the intrinsic.
pub fn tensorize(
    state: &mut ScheduleState,
    sref: StmtSRef,
    intrin: &TensorIntrin,
    preserve_unit_iters: bool,
) -> Result<()> {
    // Step 1: blockize the subtree if the target is a loop.
    let (block_realize, old_block) = match state.node(sref).stmt.clone() {
        SRefStmt::Block(block) => (state.get_block_realize(sref), Some(block)),
        SRefStmt::For(_) => {
            let mut analyzer = Analyzer::new();
            let mut reuse = BlockReuse::default();
            let realize =
                blockize_impl(state, sref, &mut reuse, &mut analyzer, preserve_unit_iters)?;
            (realize, None)
        }
    };

    // Step 2: normalize the implementation's index width to the widest
    // integer bound in the matched block's regions.
    let mut index_bits = 0usize;
    for region in block_realize.block.reads.iter().chain(&block_realize.block.writes) {
        for range in &region.region {
            let dtype = range.min.dtype();
            if dtype.is_int() {
                index_bits = index_bits.max(dtype.bits());
            }
        }
    }
    assert!(index_bits > 0, "the matched block accesses no buffer regions with integer bounds");
    let index_dtype =
        DType::int_with_bits(index_bits).expect("region bounds use a standard integer width");
    let intrin_impl = deep_copy_func_with_index_dtype(&intrin.impl_, index_dtype);

    // Step 3: structural match against the descriptor.
    let analyzer = Analyzer::new();
    let mut comparator = TensorizeComparator::new(&analyzer);
    comparator.compare(&block_realize, &intrin.desc.body)?;

    // Step 4: region of each implementation buffer, from the implementation
    // block's own reads and writes.
    let impl_block = intrin_impl
        .root_realize()
        .expect("the intrinsic implementation body must be a single block realize")
        .block
        .clone();
    let mut impl2region: HashMap<u64, Vec<Range>> = HashMap::new();
    for region in impl_block.reads.iter().chain(&impl_block.writes) {
        impl2region.entry(region.buffer.id()).or_insert_with(|| region.region.clone());
    }

    // Step 5: a MatchBufferRegion per implementation parameter, pointing the
    // implementation buffer at a subregion of the current buffer.
    let mut match_buffer_regions = Vec::with_capacity(intrin_impl.params.len());
    for (desc_param, impl_param) in intrin.desc.params.iter().zip(&intrin_impl.params) {
        let desc_buffer =
            intrin.desc.buffer_of(desc_param).expect("descriptor parameters map to buffers");
        let impl_buffer = intrin_impl
            .buffer_of(impl_param)
            .expect("implementation parameters map to buffers")
            .clone();
        let cur_buffer = comparator
            .rhs_buffer_map
            .get(&desc_buffer.id())
            .expect("every descriptor buffer was matched")
            .clone();
        let old_region = impl2region
            .get(&impl_buffer.id())
            .expect("implementation buffers are accessed by the implementation block");
        let indices_base = comparator
            .buffer_indices
            .get(&cur_buffer.id())
            .expect("matched buffers carry base indices");
        assert!(
            indices_base.len() >= old_region.len(),
            "matched buffer has fewer dimensions than the implementation region"
        );
        let offset = indices_base.len() - old_region.len();

        let mut new_region = Vec::with_capacity(indices_base.len());
        for index in &indices_base[..offset] {
            new_region.push(Range::new(index.clone(), PrimExpr::one(index.dtype())));
        }
        for (dim, range) in old_region.iter().enumerate() {
            let min = indices_base[offset + dim].clone();
            let extent = cast_if_needed(min.dtype(), &range.extent);
            new_region.push(Range::new(min, extent));
        }
        match_buffer_regions.push(MatchBufferRegion::new(
            impl_buffer,
            BufferRegion::new(cur_buffer, new_region),
        ));
    }

    // Step 6: splice the implementation body, merging annotations with a
    // warn-and-keep policy.
    let matched_block = &block_realize.block;
    let mut annotations = matched_block.annotations.clone();
    for (key, value) in &impl_block.annotations {
        match annotations.get(key) {
            Some(existing) if existing != value => {
                tracing::warn!(
                    key = %key,
                    "conflicting block annotation, the value from the tensor intrinsic is skipped"
                );
            }
            _ => {
                annotations.insert(key.clone(), value.clone());
            }
        }
    }
    let new_block = Block::new_full(
        matched_block.iter_vars.clone(),
        matched_block.reads.clone(),
        matched_block.writes.clone(),
        matched_block.name_hint.clone(),
        impl_block.body.clone(),
        matched_block.init.clone(),
        matched_block.alloc_buffers.clone(),
        match_buffer_regions,
        annotations,
    );
    let new_block_id = new_block.id();

    // Step 7: install and refresh the scope metadata.
    match old_block {
        Some(old) => {
            let mut reuse = BlockReuse::default();
            reuse.insert(&old, &new_block);
            state.replace(sref, Replacement::Block(new_block), &reuse);
        }
        None => {
            let realize = BlockRealize::new(
                block_realize.iter_values.clone(),
                block_realize.predicate.clone(),
                new_block,
            );
            state.replace(sref, Replacement::Stmt(Stmt::BlockRealize(realize)), &BlockReuse::default());
        }
    }
    let result = state.sref_of(new_block_id).expect("the tensorized block was installed");
    let scope_root = get_scope_root(state, result);
    state.update_scope_block_info(scope_root);
    Ok(())
}

/// Tensorize against a registered intrinsic.
pub fn tensorize_by_name(
    state: &mut ScheduleState,
    sref: StmtSRef,
    intrin_name: &str,
    preserve_unit_iters: bool,
) -> Result<()> {
    let intrin = TensorIntrin::get(intrin_name)
        .ok_or_else(|| IntrinNotFoundSnafu { name: intrin_name.to_string() }.build())?;
    tensorize(state, sref, &intrin, preserve_unit_iters)
}

fn cast_if_needed(dtype: DType, expr: &Expr) -> Expr {
    if expr.dtype() == dtype { expr.clone() } else { PrimExpr::cast(dtype, expr) }
}
