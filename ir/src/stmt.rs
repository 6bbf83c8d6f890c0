//! Statement nodes: loops, blocks, block realizations.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::buffer::{Buffer, BufferRegion, MatchBufferRegion, Range};
use crate::expr::{Expr, Var};
use crate::next_node_id;

/// Iterator classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterType {
    /// Data parallel: instances over this iterator are independent.
    DataPar,
    /// Commutative reduction.
    CommReduce,
    /// No structure assumed.
    Opaque,
}

/// An iteration variable with a domain and a kind. Identity is the var.
#[derive(Debug, Clone, PartialEq)]
pub struct IterVar {
    pub dom: Range,
    pub var: Rc<Var>,
    pub iter_type: IterType,
}

impl IterVar {
    pub fn new(dom: Range, var: Rc<Var>, iter_type: IterType) -> Self {
        Self { dom, var, iter_type }
    }
}

/// Annotation value attached to blocks and loops.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

pub type Annotations = IndexMap<String, AnnValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForKind {
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
    ThreadBinding,
}

/// A loop statement. Identity is the stable id.
#[derive(Debug)]
pub struct For {
    id: u64,
    pub loop_var: Rc<Var>,
    pub min: Expr,
    pub extent: Expr,
    pub kind: ForKind,
    pub body: Stmt,
    pub thread_binding: Option<IterVar>,
    pub annotations: Annotations,
}

impl For {
    pub fn new(loop_var: Rc<Var>, min: Expr, extent: Expr, kind: ForKind, body: Stmt) -> Rc<Self> {
        Self::new_full(loop_var, min, extent, kind, body, None, Annotations::new())
    }

    pub fn new_full(
        loop_var: Rc<Var>,
        min: Expr,
        extent: Expr,
        kind: ForKind,
        body: Stmt,
        thread_binding: Option<IterVar>,
        annotations: Annotations,
    ) -> Rc<Self> {
        Rc::new(Self { id: next_node_id(), loop_var, min, extent, kind, body, thread_binding, annotations })
    }

    /// Serial loop from zero.
    pub fn serial(loop_var: Rc<Var>, extent: &Expr, body: Stmt) -> Rc<Self> {
        let min = crate::expr::PrimExpr::zero(extent.dtype());
        Self::new(loop_var, min, extent.clone(), ForKind::Serial, body)
    }

    /// Fresh loop with the same head and a new body.
    pub fn with_body(&self, body: Stmt) -> Rc<Self> {
        Self::new_full(
            self.loop_var.clone(),
            self.min.clone(),
            self.extent.clone(),
            self.kind,
            body,
            self.thread_binding.clone(),
            self.annotations.clone(),
        )
    }

    /// Fresh loop with a renamed loop var and a new body.
    pub fn with_loop_var_and_body(&self, loop_var: Rc<Var>, body: Stmt) -> Rc<Self> {
        Self::new_full(
            loop_var,
            self.min.clone(),
            self.extent.clone(),
            self.kind,
            body,
            self.thread_binding.clone(),
            self.annotations.clone(),
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for For {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for For {}

impl Hash for For {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A compute block: the unit the schedule layer analyzes and rewrites.
/// Identity is the stable id; rebuilding any field produces a new block.
#[derive(Debug)]
pub struct Block {
    id: u64,
    pub iter_vars: Vec<IterVar>,
    pub reads: Vec<BufferRegion>,
    pub writes: Vec<BufferRegion>,
    pub name_hint: String,
    pub body: Stmt,
    pub init: Option<Stmt>,
    pub alloc_buffers: Vec<Rc<Buffer>>,
    pub match_buffers: Vec<MatchBufferRegion>,
    pub annotations: Annotations,
}

impl Block {
    pub fn new(
        iter_vars: Vec<IterVar>,
        reads: Vec<BufferRegion>,
        writes: Vec<BufferRegion>,
        name_hint: impl Into<String>,
        body: Stmt,
    ) -> Rc<Self> {
        Self::new_full(
            iter_vars,
            reads,
            writes,
            name_hint,
            body,
            None,
            Vec::new(),
            Vec::new(),
            Annotations::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_full(
        iter_vars: Vec<IterVar>,
        reads: Vec<BufferRegion>,
        writes: Vec<BufferRegion>,
        name_hint: impl Into<String>,
        body: Stmt,
        init: Option<Stmt>,
        alloc_buffers: Vec<Rc<Buffer>>,
        match_buffers: Vec<MatchBufferRegion>,
        annotations: Annotations,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: next_node_id(),
            iter_vars,
            reads,
            writes,
            name_hint: name_hint.into(),
            body,
            init,
            alloc_buffers,
            match_buffers,
            annotations,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Instantiation of a block: one value per block iterator plus a predicate.
#[derive(Debug, Clone)]
pub struct BlockRealize {
    pub iter_values: Vec<Expr>,
    pub predicate: Expr,
    pub block: Rc<Block>,
}

impl BlockRealize {
    pub fn new(iter_values: Vec<Expr>, predicate: Expr, block: Rc<Block>) -> Rc<Self> {
        assert_eq!(
            iter_values.len(),
            block.iter_vars.len(),
            "one iter value is required per block iter var"
        );
        Rc::new(Self { iter_values, predicate, block })
    }
}

/// Statement node.
#[derive(Debug, Clone)]
pub enum Stmt {
    For(Rc<For>),
    BlockRealize(Rc<BlockRealize>),
    Seq(Vec<Stmt>),
    BufferStore { buffer: Rc<Buffer>, value: Expr, indices: SmallVec<[Expr; 4]> },
    IfThenElse { condition: Expr, then_case: Box<Stmt>, else_case: Option<Box<Stmt>> },
    Evaluate(Expr),
}

impl Stmt {
    /// Sequence, collapsing the single-statement case.
    pub fn seq(mut stmts: Vec<Stmt>) -> Stmt {
        if stmts.len() == 1 { stmts.pop().unwrap() } else { Stmt::Seq(stmts) }
    }

    pub fn store(buffer: &Rc<Buffer>, value: Expr, indices: Vec<Expr>) -> Stmt {
        Stmt::BufferStore { buffer: buffer.clone(), value, indices: SmallVec::from_vec(indices) }
    }

    pub fn as_for(&self) -> Option<&Rc<For>> {
        match self {
            Stmt::For(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_block_realize(&self) -> Option<&Rc<BlockRealize>> {
        match self {
            Stmt::BlockRealize(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Stmt]> {
        match self {
            Stmt::Seq(s) => Some(s),
            _ => None,
        }
    }
}
