//! Primitive functions and modules.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::buffer::Buffer;
use crate::expr::Var;
use crate::stmt::{BlockRealize, Stmt};

/// A primitive function: an ordered parameter list, a parameter to buffer
/// map, and a statement body.
#[derive(Debug, Clone)]
pub struct PrimFunc {
    pub params: Vec<Rc<Var>>,
    /// Keyed by parameter var id, in parameter order.
    pub buffer_map: IndexMap<u64, Rc<Buffer>>,
    pub body: Stmt,
}

impl PrimFunc {
    pub fn new(params: Vec<Rc<Var>>, buffers: Vec<(Rc<Var>, Rc<Buffer>)>, body: Stmt) -> Self {
        let buffer_map = buffers.into_iter().map(|(var, buffer)| (var.id(), buffer)).collect();
        Self { params, buffer_map, body }
    }

    pub fn buffer_of(&self, param: &Rc<Var>) -> Option<&Rc<Buffer>> {
        self.buffer_map.get(&param.id())
    }

    /// Buffers in parameter order; params without a buffer are skipped.
    pub fn param_buffers(&self) -> impl Iterator<Item = &Rc<Buffer>> {
        self.params.iter().filter_map(|param| self.buffer_of(param))
    }

    /// The single top-level block realization, when the body is one.
    pub fn root_realize(&self) -> Option<&Rc<BlockRealize>> {
        self.body.as_block_realize()
    }
}

/// A collection of named primitive functions.
#[derive(Debug, Clone, Default)]
pub struct IRModule {
    pub funcs: IndexMap<String, PrimFunc>,
}

impl IRModule {
    pub fn single(name: impl Into<String>, func: PrimFunc) -> Self {
        let mut funcs = IndexMap::new();
        funcs.insert(name.into(), func);
        Self { funcs }
    }

    pub fn get(&self, name: &str) -> Option<&PrimFunc> {
        self.funcs.get(name)
    }
}
