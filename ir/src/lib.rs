//! Structured loop-nest IR for tensor programs.
//!
//! The IR is a tree of statement nodes ([`Stmt`]) over pure expression nodes
//! ([`PrimExpr`]). Nodes are immutable and shared by reference; every
//! transformation produces new nodes and leaves the old tree intact.
//!
//! # Module Organization
//!
//! - [`expr`] - Expressions and variables
//! - [`stmt`] - Statements, blocks, loops, iterator variables
//! - [`buffer`] - Buffers, ranges, buffer regions
//! - [`prim_func`] - Primitive functions and modules
//! - [`functor`] - Generic statement/expression mutator framework
//! - [`analysis`] - Variable-usage queries
//! - [`deep_copy`] - Fresh-identity cloning with index-width normalization

use std::cell::Cell;

pub mod analysis;
pub mod buffer;
pub mod deep_copy;
pub mod expr;
pub mod functor;
pub mod prim_func;
pub mod stmt;

#[cfg(test)]
pub mod test;

pub use buffer::{Buffer, BufferRegion, MatchBufferRegion, Range};
pub use expr::{BinOp, Expr, PrimExpr, Var};
pub use prim_func::{IRModule, PrimFunc};
pub use stmt::{AnnValue, Annotations, Block, BlockRealize, For, ForKind, IterType, IterVar, Stmt};

// Thread-local counter for stable node identifiers.
//
// Identity of vars, buffers, blocks, and loops is a monotonic u64, never a
// raw pointer. Cell is !Send + !Sync, keeping the IR single-threaded.
thread_local! {
    static NODE_ID_COUNTER: Cell<u64> = const { Cell::new(0) };
}

pub(crate) fn next_node_id() -> u64 {
    NODE_ID_COUNTER.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        id
    })
}
