//! Buffers, ranges, and buffer regions.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use loft_dtype::DType;

use crate::expr::{Expr, PrimExpr, Var};
use crate::next_node_id;

/// A multi-dimensional buffer.
///
/// Identity is the stable id; two buffers with identical shape and dtype are
/// still distinct storage.
#[derive(Debug)]
pub struct Buffer {
    id: u64,
    pub name: String,
    /// Opaque data handle.
    pub data: Rc<Var>,
    pub shape: Vec<Expr>,
    pub dtype: DType,
}

impl Buffer {
    pub fn new(name: impl Into<String>, shape: Vec<Expr>, dtype: DType) -> Rc<Self> {
        let name = name.into();
        let data = Var::new(format!("{name}_data"), DType::Handle);
        Rc::new(Self { id: next_node_id(), name, data, shape, dtype })
    }

    /// Buffer with an explicit data handle, used by deep cloning.
    pub fn with_parts(
        name: impl Into<String>,
        data: Rc<Var>,
        shape: Vec<Expr>,
        dtype: DType,
    ) -> Rc<Self> {
        Rc::new(Self { id: next_node_id(), name: name.into(), data, shape, dtype })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Half-open interval `[min, min + extent)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub min: Expr,
    pub extent: Expr,
}

impl Range {
    pub fn new(min: Expr, extent: Expr) -> Self {
        Self { min, extent }
    }

    /// `[0, extent)` with the zero matching the extent's dtype.
    pub fn from_extent(extent: &Expr) -> Self {
        Self { min: PrimExpr::zero(extent.dtype()), extent: extent.clone() }
    }

    /// Single-point range `[min, min + 1)`.
    pub fn point(min: &Expr) -> Self {
        Self { min: min.clone(), extent: PrimExpr::one(min.dtype()) }
    }
}

/// A per-dimension region of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferRegion {
    pub buffer: Rc<Buffer>,
    pub region: Vec<Range>,
}

impl BufferRegion {
    pub fn new(buffer: Rc<Buffer>, region: Vec<Range>) -> Self {
        debug_assert_eq!(buffer.ndim(), region.len());
        Self { buffer, region }
    }

    /// The region covering the whole buffer.
    pub fn full(buffer: &Rc<Buffer>) -> Self {
        let region = buffer.shape.iter().map(Range::from_extent).collect();
        Self { buffer: buffer.clone(), region }
    }
}

/// Declaration that `buffer` aliases `source` in the enclosing scope.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchBufferRegion {
    pub buffer: Rc<Buffer>,
    pub source: BufferRegion,
}

impl MatchBufferRegion {
    pub fn new(buffer: Rc<Buffer>, source: BufferRegion) -> Self {
        Self { buffer, source }
    }
}
