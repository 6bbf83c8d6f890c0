//! Arithmetic layer for the loft schedule primitives.
//!
//! Transformations own an [`Analyzer`] as a per-invocation scratchpad: bind
//! the iterator domains that matter, simplify and prove through it, drop it
//! on return. [`IntSet`] provides interval over-approximation for buffer
//! region relaxation, and [`iter_map`] provides the affine factorization of
//! block iterator bindings used by blockization.

pub mod analyzer;
pub mod int_set;
pub mod iter_map;
pub mod linear;

#[cfg(test)]
pub mod test;

pub use analyzer::Analyzer;
pub use int_set::{IntSet, eval_set};
pub use iter_map::{IterMark, subspace_divide};
pub use linear::{LinearForm, try_linear};
