//! Fresh-identity cloning of primitive functions.
//!
//! Tensor intrinsic implementations live in a registry and must never be
//! mutated in place: before an implementation is rewritten and spliced into a
//! program, it is deep-copied so every var, buffer, block, and loop gets a
//! fresh identity. The copier can simultaneously normalize the integer width
//! of index expressions (loop bounds, range bounds, shapes, access indices,
//! iterator bindings) to a target dtype.

use std::collections::HashMap;
use std::rc::Rc;

use loft_dtype::DType;
use smallvec::SmallVec;

use crate::buffer::{Buffer, BufferRegion, MatchBufferRegion, Range};
use crate::expr::{Expr, PrimExpr, Var};
use crate::prim_func::PrimFunc;
use crate::stmt::{Block, BlockRealize, For, IterVar, Stmt};

pub struct DeepCopier {
    var_map: HashMap<u64, Rc<Var>>,
    buffer_map: HashMap<u64, Rc<Buffer>>,
    index_dtype: Option<DType>,
    in_index: bool,
}

impl DeepCopier {
    pub fn new(index_dtype: Option<DType>) -> Self {
        Self { var_map: HashMap::new(), buffer_map: HashMap::new(), index_dtype, in_index: false }
    }

    pub fn copy_func(&mut self, func: &PrimFunc) -> PrimFunc {
        let params: Vec<Rc<Var>> = func.params.iter().map(|param| self.copy_var(param)).collect();
        let buffers: Vec<(Rc<Var>, Rc<Buffer>)> = func
            .params
            .iter()
            .filter_map(|param| {
                func.buffer_of(param)
                    .map(|buffer| (self.copy_var(param), self.copy_buffer(buffer)))
            })
            .collect();
        let body = self.copy_stmt(&func.body);
        PrimFunc::new(params, buffers, body)
    }

    fn copy_var(&mut self, var: &Rc<Var>) -> Rc<Var> {
        if let Some(copied) = self.var_map.get(&var.id()) {
            return copied.clone();
        }
        let dtype = match self.index_dtype {
            Some(index_dtype) if var.dtype.is_int() => index_dtype,
            _ => var.dtype,
        };
        let copied = Var::new(var.name.clone(), dtype);
        self.var_map.insert(var.id(), copied.clone());
        copied
    }

    fn copy_buffer(&mut self, buffer: &Rc<Buffer>) -> Rc<Buffer> {
        if let Some(copied) = self.buffer_map.get(&buffer.id()) {
            return copied.clone();
        }
        let data = self.copy_var(&buffer.data);
        let shape = buffer.shape.iter().map(|dim| self.copy_index_expr(dim)).collect();
        let copied = Buffer::with_parts(buffer.name.clone(), data, shape, buffer.dtype);
        self.buffer_map.insert(buffer.id(), copied.clone());
        copied
    }

    fn copy_index_expr(&mut self, expr: &Expr) -> Expr {
        let saved = self.in_index;
        self.in_index = true;
        let copied = self.copy_expr(expr);
        self.in_index = saved;
        copied
    }

    fn copy_expr(&mut self, expr: &Expr) -> Expr {
        match &**expr {
            PrimExpr::Int { value, dtype } => {
                let dtype = match self.index_dtype {
                    Some(index_dtype) if self.in_index && dtype.is_int() => index_dtype,
                    _ => *dtype,
                };
                PrimExpr::int(*value, dtype)
            }
            PrimExpr::Float { value, dtype } => PrimExpr::float(*value, *dtype),
            PrimExpr::Var(var) => PrimExpr::var(&self.copy_var(var)),
            PrimExpr::Cast { dtype, value } => PrimExpr::cast(*dtype, &self.copy_expr(value)),
            PrimExpr::Binary { op, lhs, rhs } => {
                PrimExpr::binary(*op, &self.copy_expr(lhs), &self.copy_expr(rhs))
            }
            PrimExpr::Not(value) => PrimExpr::not_(&self.copy_expr(value)),
            PrimExpr::Select { condition, true_value, false_value } => PrimExpr::select(
                &self.copy_expr(condition),
                &self.copy_expr(true_value),
                &self.copy_expr(false_value),
            ),
            PrimExpr::BufferLoad { buffer, indices } => {
                let buffer = self.copy_buffer(buffer);
                let indices = indices.iter().map(|index| self.copy_index_expr(index)).collect();
                PrimExpr::load(&buffer, indices)
            }
        }
    }

    fn copy_range(&mut self, range: &Range) -> Range {
        Range::new(self.copy_index_expr(&range.min), self.copy_index_expr(&range.extent))
    }

    fn copy_region(&mut self, region: &BufferRegion) -> BufferRegion {
        let buffer = self.copy_buffer(&region.buffer);
        let ranges = region.region.iter().map(|range| self.copy_range(range)).collect();
        BufferRegion::new(buffer, ranges)
    }

    fn copy_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::For(f) => {
                let loop_var = self.copy_var(&f.loop_var);
                let min = self.copy_index_expr(&f.min);
                let extent = self.copy_index_expr(&f.extent);
                let body = self.copy_stmt(&f.body);
                let thread_binding = f.thread_binding.as_ref().map(|iv| self.copy_iter_var(iv));
                Stmt::For(For::new_full(
                    loop_var,
                    min,
                    extent,
                    f.kind,
                    body,
                    thread_binding,
                    f.annotations.clone(),
                ))
            }
            Stmt::BlockRealize(realize) => {
                let block = &realize.block;
                let iter_vars: Vec<IterVar> =
                    block.iter_vars.iter().map(|iv| self.copy_iter_var(iv)).collect();
                let reads = block.reads.iter().map(|region| self.copy_region(region)).collect();
                let writes = block.writes.iter().map(|region| self.copy_region(region)).collect();
                let match_buffers = block
                    .match_buffers
                    .iter()
                    .map(|mb| {
                        MatchBufferRegion::new(self.copy_buffer(&mb.buffer), self.copy_region(&mb.source))
                    })
                    .collect();
                let alloc_buffers =
                    block.alloc_buffers.iter().map(|buffer| self.copy_buffer(buffer)).collect();
                let body = self.copy_stmt(&block.body);
                let init = block.init.as_ref().map(|init| self.copy_stmt(init));
                let new_block = Block::new_full(
                    iter_vars,
                    reads,
                    writes,
                    block.name_hint.clone(),
                    body,
                    init,
                    alloc_buffers,
                    match_buffers,
                    block.annotations.clone(),
                );
                let iter_values =
                    realize.iter_values.iter().map(|value| self.copy_index_expr(value)).collect();
                let predicate = self.copy_expr(&realize.predicate);
                Stmt::BlockRealize(BlockRealize::new(iter_values, predicate, new_block))
            }
            Stmt::Seq(children) => {
                Stmt::Seq(children.iter().map(|child| self.copy_stmt(child)).collect())
            }
            Stmt::BufferStore { buffer, value, indices } => {
                let buffer = self.copy_buffer(buffer);
                let value = self.copy_expr(value);
                let indices: SmallVec<[Expr; 4]> =
                    indices.iter().map(|index| self.copy_index_expr(index)).collect();
                Stmt::BufferStore { buffer, value, indices }
            }
            Stmt::IfThenElse { condition, then_case, else_case } => Stmt::IfThenElse {
                condition: self.copy_expr(condition),
                then_case: Box::new(self.copy_stmt(then_case)),
                else_case: else_case.as_ref().map(|s| Box::new(self.copy_stmt(s))),
            },
            Stmt::Evaluate(expr) => Stmt::Evaluate(self.copy_expr(expr)),
        }
    }

    fn copy_iter_var(&mut self, iter_var: &IterVar) -> IterVar {
        IterVar::new(
            self.copy_range(&iter_var.dom),
            self.copy_var(&iter_var.var),
            iter_var.iter_type,
        )
    }
}

/// Clone a function with fresh identities everywhere.
pub fn deep_copy_func(func: &PrimFunc) -> PrimFunc {
    DeepCopier::new(None).copy_func(func)
}

/// Clone a function with fresh identities and all index expressions
/// normalized to the given integer width.
pub fn deep_copy_func_with_index_dtype(func: &PrimFunc, index_dtype: DType) -> PrimFunc {
    DeepCopier::new(Some(index_dtype)).copy_func(func)
}
