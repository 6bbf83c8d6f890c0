//! Structural matching of a blockized region against a tensor intrinsic
//! descriptor.
//!
//! The comparator walks both trees in lockstep. Descriptor vars are mapped
//! to current-IR expressions at their definition sites (block iterators and
//! loop heads); descriptor buffers are mapped to current buffers at their
//! first pairing; and every matched buffer records its base indices, one per
//! current dimension, extracted from the first region comparison. Buffer
//! accesses must then agree with those bases up to the descriptor-side
//! offsets.

use std::collections::HashMap;
use std::rc::Rc;

use loft_arith::Analyzer;
use loft_ir::{Block, BlockRealize, Buffer, BufferRegion, Expr, PrimExpr, Stmt};

use crate::error::{Result, StructuralMatchFailureSnafu};
use crate::subst::{VarSubst, substitute_expr};

pub struct TensorizeComparator<'a> {
    analyzer: &'a Analyzer,
    var_map: VarSubst,
    /// Descriptor buffer id to current buffer.
    pub rhs_buffer_map: HashMap<u64, Rc<Buffer>>,
    /// Current buffer id to base index expressions, one per dimension.
    pub buffer_indices: HashMap<u64, Vec<Expr>>,
    is_scope_block: bool,
}

impl<'a> TensorizeComparator<'a> {
    pub fn new(analyzer: &'a Analyzer) -> Self {
        Self {
            analyzer,
            var_map: VarSubst::new(),
            rhs_buffer_map: HashMap::new(),
            buffer_indices: HashMap::new(),
            is_scope_block: true,
        }
    }

    /// Match the blockized realize against the descriptor body.
    pub fn compare(&mut self, lhs: &Rc<BlockRealize>, desc_body: &Stmt) -> Result<()> {
        let Stmt::BlockRealize(rhs) = desc_body else {
            return fail("the descriptor body is not a single block realize");
        };
        self.compare_realize(lhs, rhs)
    }

    fn compare_realize(&mut self, lhs: &Rc<BlockRealize>, rhs: &Rc<BlockRealize>) -> Result<()> {
        let scope = std::mem::replace(&mut self.is_scope_block, false);
        if scope {
            return self.compare_block(&lhs.block, &rhs.block, true);
        }
        if lhs.iter_values.len() != rhs.iter_values.len() {
            return fail("block realize arity mismatch");
        }
        for (lhs_value, rhs_value) in lhs.iter_values.iter().zip(&rhs.iter_values) {
            self.compare_expr(lhs_value, rhs_value)?;
        }
        self.compare_expr(&lhs.predicate, &rhs.predicate)?;
        self.compare_block(&lhs.block, &rhs.block, false)
    }

    fn compare_block(&mut self, lhs: &Rc<Block>, rhs: &Rc<Block>, scope: bool) -> Result<()> {
        if !scope {
            if lhs.iter_vars.len() != rhs.iter_vars.len() {
                return fail("block iterator count mismatch");
            }
            for (lhs_iter, rhs_iter) in lhs.iter_vars.iter().zip(&rhs.iter_vars) {
                if lhs_iter.iter_type != rhs_iter.iter_type {
                    return fail("block iterator kind mismatch");
                }
                let rhs_extent = self.map_expr(&rhs_iter.dom.extent);
                if !self.analyzer.can_prove_equal(&lhs_iter.dom.extent, &rhs_extent) {
                    return fail("block iterator extent mismatch");
                }
                self.var_map.insert(rhs_iter.var.id(), PrimExpr::var(&lhs_iter.var));
            }
            if lhs.init.is_some() != rhs.init.is_some() {
                return fail("block init presence mismatch");
            }
        }
        // Regions first: accesses rely on the bases they record.
        self.compare_regions(&lhs.reads, &rhs.reads)?;
        self.compare_regions(&lhs.writes, &rhs.writes)?;
        self.compare_stmt(&lhs.body, &rhs.body)?;
        if let (Some(lhs_init), Some(rhs_init)) = (&lhs.init, &rhs.init) {
            self.compare_stmt(lhs_init, rhs_init)?;
        }
        Ok(())
    }

    fn compare_regions(&mut self, lhs: &[BufferRegion], rhs: &[BufferRegion]) -> Result<()> {
        if lhs.len() != rhs.len() {
            return fail("buffer region count mismatch");
        }
        for (lhs_region, rhs_region) in lhs.iter().zip(rhs) {
            self.compare_buffer_region(lhs_region, rhs_region)?;
        }
        Ok(())
    }

    fn compare_buffer(&mut self, lhs: &Rc<Buffer>, rhs: &Rc<Buffer>) -> Result<()> {
        if lhs.dtype != rhs.dtype {
            return fail("buffer dtype mismatch");
        }
        match self.rhs_buffer_map.get(&rhs.id()) {
            Some(mapped) if mapped.id() == lhs.id() => Ok(()),
            Some(_) => fail("descriptor buffer maps to two different buffers"),
            None => {
                self.rhs_buffer_map.insert(rhs.id(), lhs.clone());
                Ok(())
            }
        }
    }

    fn compare_buffer_region(&mut self, lhs: &BufferRegion, rhs: &BufferRegion) -> Result<()> {
        self.compare_buffer(&lhs.buffer, &rhs.buffer)?;
        if lhs.region.len() < rhs.region.len() {
            return fail("current region has fewer dimensions than the descriptor");
        }
        let offset = lhs.region.len() - rhs.region.len();

        let mut base = Vec::with_capacity(lhs.region.len());
        for range in &lhs.region[..offset] {
            if !range.extent.is_one() {
                return fail("leading region dimensions must have unit extent");
            }
            base.push(range.min.clone());
        }
        for (dim, rhs_range) in rhs.region.iter().enumerate() {
            let lhs_range = &lhs.region[offset + dim];
            let rhs_extent = self.map_expr(&rhs_range.extent);
            if !self.analyzer.can_prove_equal(&lhs_range.extent, &rhs_extent) {
                return fail("region extent mismatch");
            }
            let rhs_min = self.map_expr(&rhs_range.min);
            base.push(self.analyzer.simplify_sub(&lhs_range.min, &rhs_min));
        }

        match self.buffer_indices.get(&lhs.buffer.id()) {
            Some(existing) => {
                let consistent = existing.len() == base.len()
                    && existing
                        .iter()
                        .zip(&base)
                        .all(|(a, b)| self.analyzer.can_prove_equal(a, b));
                if consistent { Ok(()) } else { fail("inconsistent base indices for buffer") }
            }
            None => {
                self.buffer_indices.insert(lhs.buffer.id(), base);
                Ok(())
            }
        }
    }

    fn compare_buffer_access(
        &mut self,
        lhs_buffer: &Rc<Buffer>,
        lhs_indices: &[Expr],
        rhs_buffer: &Rc<Buffer>,
        rhs_indices: &[Expr],
    ) -> Result<()> {
        self.compare_buffer(lhs_buffer, rhs_buffer)?;
        if lhs_indices.len() < rhs_indices.len() {
            return fail("buffer access has fewer indices than the descriptor");
        }
        let offset = lhs_indices.len() - rhs_indices.len();
        let Some(base) = self.buffer_indices.get(&lhs_buffer.id()) else {
            return fail("buffer accessed before its region was matched");
        };
        if base.len() != lhs_indices.len() {
            return fail("buffer access arity differs from its region arity");
        }
        for (index, base_index) in lhs_indices[..offset].iter().zip(base) {
            if !self.analyzer.can_prove_equal(index, base_index) {
                return fail("leading access index departs from the buffer base");
            }
        }
        for (dim, rhs_index) in rhs_indices.iter().enumerate() {
            let mapped = substitute_expr(rhs_index, &self.var_map);
            let diff = self.analyzer.simplify_sub(&lhs_indices[offset + dim], &mapped);
            if !self.analyzer.can_prove_equal(&diff, &base[offset + dim]) {
                return fail("buffer access offset mismatch");
            }
        }
        Ok(())
    }

    fn compare_stmt(&mut self, lhs: &Stmt, rhs: &Stmt) -> Result<()> {
        match (lhs, rhs) {
            (Stmt::For(lhs_for), Stmt::For(rhs_for)) => {
                let rhs_min = self.map_expr(&rhs_for.min);
                let rhs_extent = self.map_expr(&rhs_for.extent);
                if !self.analyzer.can_prove_equal(&lhs_for.min, &rhs_min)
                    || !self.analyzer.can_prove_equal(&lhs_for.extent, &rhs_extent)
                {
                    return fail("loop bounds mismatch");
                }
                self.var_map.insert(rhs_for.loop_var.id(), PrimExpr::var(&lhs_for.loop_var));
                self.compare_stmt(&lhs_for.body, &rhs_for.body)
            }
            (Stmt::BlockRealize(lhs_realize), Stmt::BlockRealize(rhs_realize)) => {
                self.compare_realize(lhs_realize, rhs_realize)
            }
            (Stmt::Seq(lhs_children), Stmt::Seq(rhs_children)) => {
                if lhs_children.len() != rhs_children.len() {
                    return fail("statement sequence length mismatch");
                }
                for (lhs_child, rhs_child) in lhs_children.iter().zip(rhs_children) {
                    self.compare_stmt(lhs_child, rhs_child)?;
                }
                Ok(())
            }
            (
                Stmt::BufferStore { buffer: lhs_buffer, value: lhs_value, indices: lhs_indices },
                Stmt::BufferStore { buffer: rhs_buffer, value: rhs_value, indices: rhs_indices },
            ) => {
                self.compare_buffer_access(lhs_buffer, lhs_indices, rhs_buffer, rhs_indices)?;
                self.compare_expr(lhs_value, rhs_value)
            }
            (
                Stmt::IfThenElse { condition: lc, then_case: lt, else_case: le },
                Stmt::IfThenElse { condition: rc, then_case: rt, else_case: re },
            ) => {
                self.compare_expr(lc, rc)?;
                self.compare_stmt(lt, rt)?;
                match (le, re) {
                    (Some(lhs_else), Some(rhs_else)) => self.compare_stmt(lhs_else, rhs_else),
                    (None, None) => Ok(()),
                    _ => fail("else branch presence mismatch"),
                }
            }
            (Stmt::Evaluate(lhs_expr), Stmt::Evaluate(rhs_expr)) => {
                self.compare_expr(lhs_expr, rhs_expr)
            }
            _ => fail("statement kind mismatch"),
        }
    }

    fn compare_expr(&mut self, lhs: &Expr, rhs: &Expr) -> Result<()> {
        match (&**lhs, &**rhs) {
            (
                PrimExpr::BufferLoad { buffer: lhs_buffer, indices: lhs_indices },
                PrimExpr::BufferLoad { buffer: rhs_buffer, indices: rhs_indices },
            ) => self.compare_buffer_access(lhs_buffer, lhs_indices, rhs_buffer, rhs_indices),
            (
                PrimExpr::Binary { op: lhs_op, lhs: l1, rhs: l2 },
                PrimExpr::Binary { op: rhs_op, lhs: r1, rhs: r2 },
            ) if lhs_op == rhs_op => {
                self.compare_expr(l1, r1)?;
                self.compare_expr(l2, r2)
            }
            (PrimExpr::Not(lhs_value), PrimExpr::Not(rhs_value)) => {
                self.compare_expr(lhs_value, rhs_value)
            }
            (PrimExpr::Cast { value: lhs_value, .. }, PrimExpr::Cast { value: rhs_value, .. }) => {
                self.compare_expr(lhs_value, rhs_value)
            }
            (
                PrimExpr::Select { condition: lc, true_value: lt, false_value: lf },
                PrimExpr::Select { condition: rc, true_value: rt, false_value: rf },
            ) => {
                self.compare_expr(lc, rc)?;
                self.compare_expr(lt, rt)?;
                self.compare_expr(lf, rf)
            }
            _ => {
                let mapped = self.map_expr(rhs);
                if self.analyzer.can_prove_equal(lhs, &mapped) {
                    Ok(())
                } else {
                    fail("expression mismatch")
                }
            }
        }
    }

    fn map_expr(&self, rhs: &Expr) -> Expr {
        substitute_expr(rhs, &self.var_map)
    }
}

fn fail<T>(reason: impl Into<String>) -> Result<T> {
    StructuralMatchFailureSnafu { reason: reason.into() }.fail()
}
