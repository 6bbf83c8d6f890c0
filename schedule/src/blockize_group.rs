//! The sibling-group blockize primitive.
//!
//! A consecutive run of sibling blocks inside the sequence at their lowest
//! common ancestor is collapsed into one outer block whose body is the
//! sequence of inner realizations. When the LCA is a loop, the loop vars on
//! the path from the scope root down to it become the outer bindings; a
//! root-block LCA collects nothing and gets a synthesized unit iterator.

use std::collections::HashSet;
use std::rc::Rc;

use loft_arith::{Analyzer, IntSet};
use loft_dtype::DType;
use loft_ir::{
    Annotations, Block, BlockRealize, Expr, For, IterType, IterVar, PrimExpr, Range, Stmt, Var,
};

use crate::analysis::{get_scope_root, lowest_common_ancestor};
use crate::blockize::generate_inner;
use crate::error::Result;
use crate::region::{DomMap, eval_set_regions, union_regions};
use crate::state::{BlockReuse, Replacement, SRefStmt, ScheduleState, StmtSRef};
use crate::subst::{VarSubst, substitute_block, substitute_expr};

/// Outer iterator information collected on the path from the scope root to
/// the LCA.
#[derive(Default)]
struct SubstInfo {
    outer_iter_vars: Vec<IterVar>,
    outer_bindings: Vec<Expr>,
    block_var_subst: VarSubst,
}

/// Walks the scope from its root and pairs the loop vars on the root-to-LCA
/// path with the leading iterators of the first target block visited.
/// Only a loop LCA contributes; any other LCA collects nothing.
struct SubstInfoCollector {
    lca_for_id: u64,
    outer_loop_stack: Vec<(Rc<Var>, Expr)>,
    outer_iter_vars: Vec<IterVar>,
    block_var_subst: VarSubst,
    in_lca: bool,
    depth: usize,
    num_outer_iter_vars: usize,
}

fn collect_subst_info(state: &ScheduleState, lca: StmtSRef, block_sref: StmtSRef) -> SubstInfo {
    let scope_root = get_scope_root(state, block_sref);
    if scope_root == lca {
        return SubstInfo::default();
    }
    let Some(lca_for) = state.try_get_for(lca) else {
        return SubstInfo::default();
    };

    let mut collector = SubstInfoCollector {
        lca_for_id: lca_for.id(),
        outer_loop_stack: Vec::new(),
        outer_iter_vars: Vec::new(),
        block_var_subst: VarSubst::new(),
        in_lca: false,
        depth: 0,
        num_outer_iter_vars: 0,
    };
    let root_block = state.get_block(scope_root);
    collector.visit_stmt(&root_block.body);

    let outer_bindings =
        collector.outer_loop_stack.iter().map(|(var, _)| PrimExpr::var(var)).collect();
    SubstInfo {
        outer_iter_vars: collector.outer_iter_vars,
        outer_bindings,
        block_var_subst: collector.block_var_subst,
    }
}

impl SubstInfoCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::For(f) => self.visit_for(f),
            Stmt::BlockRealize(realize) => self.visit_block(&realize.block),
            Stmt::Seq(children) => children.iter().for_each(|child| self.visit_stmt(child)),
            Stmt::IfThenElse { then_case, else_case, .. } => {
                self.visit_stmt(then_case);
                if let Some(else_case) = else_case {
                    self.visit_stmt(else_case);
                }
            }
            Stmt::BufferStore { .. } | Stmt::Evaluate(_) => {}
        }
    }

    fn visit_for(&mut self, f: &Rc<For>) {
        if self.in_lca {
            self.visit_stmt(&f.body);
            return;
        }
        if f.id() == self.lca_for_id {
            self.in_lca = true;
        }
        self.outer_loop_stack.push((f.loop_var.clone(), f.extent.clone()));
        self.depth += 1;
        self.visit_stmt(&f.body);
        self.depth -= 1;
        if !self.in_lca {
            self.outer_loop_stack.pop();
        }
        if self.depth == 0 {
            self.in_lca = false;
        }
    }

    fn visit_block(&mut self, block: &Rc<Block>) {
        if self.in_lca && !block.iter_vars.is_empty() {
            let analyzer = Analyzer::new();
            for (i, iter_var) in block.iter_vars.iter().enumerate() {
                if i < self.outer_loop_stack.len() {
                    let (loop_var, extent) = &self.outer_loop_stack[i];
                    assert!(
                        analyzer.can_prove_equal(extent, &iter_var.dom.extent),
                        "outer loop extent must match the target block iterator extent"
                    );
                    // The information is only collected once, from the first
                    // block visited below the LCA.
                    if self.num_outer_iter_vars == 0 {
                        let outer_var =
                            Var::new(format!("v{}", loop_var.name), iter_var.var.dtype);
                        let outer_iter =
                            IterVar::new(iter_var.dom.clone(), outer_var, iter_var.iter_type);
                        self.block_var_subst
                            .insert(iter_var.var.id(), PrimExpr::var(&outer_iter.var));
                        self.outer_iter_vars.push(outer_iter);
                    }
                }
            }
            self.num_outer_iter_vars += 1;
            return;
        }
        self.visit_stmt(&block.body);
        if let Some(init) = &block.init {
            self.visit_stmt(init);
        }
    }
}

/// Rewrites the LCA subtree, collapsing the run of target realizations.
struct GroupBlockizer<'a> {
    target_ids: HashSet<u64>,
    reuse: &'a mut BlockReuse,
    outer_iter_vars: Vec<IterVar>,
    outer_bindings: Vec<Expr>,
    inner_iter_vars: Vec<IterVar>,
    block_var_subst: VarSubst,
    loop_var_subst: VarSubst,
    read_regions: Vec<loft_ir::BufferRegion>,
    write_regions: Vec<loft_ir::BufferRegion>,
    outer_block_name: String,
    analyzer: Analyzer,
    inner_iter_dom: DomMap,
    first_in: bool,
    target_in: bool,
    blockized: Option<Rc<BlockRealize>>,
}

impl GroupBlockizer<'_> {
    fn rewrite_lca_for(&mut self, f: &Rc<For>) -> Stmt {
        self.first_in = true;
        Stmt::For(f.with_body(self.rewrite_seq(&f.body)))
    }

    fn rewrite_lca_block(&mut self, block: &Rc<Block>) -> Rc<Block> {
        self.first_in = true;
        let body = self.rewrite_seq(&block.body);
        Block::new_full(
            block.iter_vars.clone(),
            block.reads.clone(),
            block.writes.clone(),
            block.name_hint.clone(),
            body,
            block.init.clone(),
            block.alloc_buffers.clone(),
            block.match_buffers.clone(),
            block.annotations.clone(),
        )
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::For(f) => {
                let body = self.visit_stmt(&f.body);
                if self.loop_var_subst.is_empty() {
                    Stmt::For(f.with_body(body))
                } else {
                    let loop_var = self
                        .loop_var_subst
                        .get(&f.loop_var.id())
                        .and_then(|expr| expr.as_var().cloned())
                        .unwrap_or_else(|| f.loop_var.clone());
                    Stmt::For(f.with_loop_var_and_body(loop_var, body))
                }
            }
            Stmt::IfThenElse { condition, then_case, else_case } => {
                let condition = if self.loop_var_subst.is_empty() {
                    condition.clone()
                } else {
                    substitute_expr(condition, &self.loop_var_subst)
                };
                Stmt::IfThenElse {
                    condition,
                    then_case: Box::new(self.visit_stmt(then_case)),
                    else_case: else_case.as_ref().map(|s| Box::new(self.visit_stmt(s))),
                }
            }
            Stmt::BlockRealize(realize) => self.visit_block_realize(realize),
            Stmt::Seq(children) => {
                Stmt::Seq(children.iter().map(|child| self.visit_stmt(child)).collect())
            }
            other => other.clone(),
        }
    }

    fn visit_block_realize(&mut self, realize: &Rc<BlockRealize>) -> Stmt {
        self.inner_iter_vars.clear();
        let block = &realize.block;
        if !(self.first_in && self.target_ids.contains(&block.id())) {
            return Stmt::BlockRealize(realize.clone());
        }
        self.target_in = true;

        // Mint inner iterators for every original block iterator.
        for iter_var in &block.iter_vars {
            let inner_iter = IterVar::new(
                Range::from_extent(&iter_var.dom.extent),
                iter_var.var.copy_with_suffix("_i"),
                iter_var.iter_type,
            );
            self.block_var_subst.insert(iter_var.var.id(), PrimExpr::var(&inner_iter.var));
            self.inner_iter_vars.push(inner_iter);
        }
        let block_subst = substitute_block(block, &self.block_var_subst, &self.analyzer, self.reuse);

        // Accumulate the relaxed reads and writes.
        for iter in &self.inner_iter_vars {
            self.inner_iter_dom
                .insert(iter.var.id(), IntSet::from_range(&iter.dom, &self.analyzer));
        }
        self.read_regions
            .extend(eval_set_regions(&block_subst.reads, &self.inner_iter_dom, &self.analyzer));
        self.write_regions
            .extend(eval_set_regions(&block_subst.writes, &self.inner_iter_dom, &self.analyzer));
        self.outer_block_name.push_str(&block_subst.name_hint);
        self.outer_block_name.push('_');

        let has_outer_reduction = block_subst.init.is_some()
            && self.outer_iter_vars.iter().any(|iter_var| iter_var.iter_type == IterType::CommReduce);
        assert!(
            !has_outer_reduction,
            "No reduction iter vars allowed for the outer loops when blockize multiple blocks"
        );

        let iter_values: Vec<Expr> = realize
            .iter_values
            .iter()
            .map(|value| substitute_expr(value, &self.loop_var_subst))
            .collect();
        let inner_realize = generate_inner(
            has_outer_reduction,
            self.inner_iter_vars.clone(),
            iter_values,
            realize.predicate.clone(),
            &block_subst,
        );
        self.reuse.insert(block, &inner_realize.block);
        Stmt::BlockRealize(inner_realize)
    }

    fn rewrite_seq(&mut self, stmt: &Stmt) -> Stmt {
        let Some(children) = stmt.as_seq() else {
            panic!("Target blocks must not be nested with each other!");
        };
        let mut new_seq: Vec<Stmt> = Vec::with_capacity(children.len());
        let mut seq_body: Vec<Stmt> = Vec::new();
        let mut idx_start: i64 = -1;
        let mut last_found: i64 = -1;
        for (i, child) in children.iter().enumerate() {
            self.target_in = false;
            let rewritten = self.visit_stmt(child);
            if self.target_in {
                if idx_start == -1 {
                    idx_start = i as i64;
                } else {
                    assert_eq!(last_found, i as i64 - 1, "Target blocks must be consecutive!");
                }
                seq_body.push(rewritten);
                last_found = i as i64;
                if i == children.len() - 1 {
                    new_seq.push(self.emit_outer(std::mem::take(&mut seq_body)));
                }
            } else {
                if idx_start != -1 && last_found == i as i64 - 1 {
                    new_seq.push(self.emit_outer(std::mem::take(&mut seq_body)));
                }
                new_seq.push(child.clone());
            }
        }
        if new_seq.len() == 1 { new_seq.pop().unwrap() } else { Stmt::Seq(new_seq) }
    }

    fn emit_outer(&mut self, seq_body: Vec<Stmt>) -> Stmt {
        if self.outer_iter_vars.is_empty() {
            // No outer iterators were collected: synthesize a unit iterator.
            self.outer_bindings.clear();
            let new_var = Var::new("init", DType::Int32);
            let outer_iter = IterVar::new(
                Range::from_extent(&PrimExpr::int32(1)),
                new_var.copy_with_suffix("_o"),
                IterType::DataPar,
            );
            self.outer_iter_vars.push(outer_iter);
            self.outer_bindings.push(PrimExpr::zero(DType::Int32));
        }
        let outer_block = Block::new_full(
            self.outer_iter_vars.clone(),
            union_regions(&self.read_regions),
            union_regions(&self.write_regions),
            self.outer_block_name.clone(),
            Stmt::Seq(seq_body),
            None,
            Vec::new(),
            Vec::new(),
            Annotations::new(),
        );
        let realize =
            BlockRealize::new(self.outer_bindings.clone(), PrimExpr::true_(), outer_block);
        self.blockized = Some(realize.clone());
        Stmt::BlockRealize(realize)
    }
}

/// Blockize a consecutive group of sibling blocks and install the result.
///
/// Returns the sref of the new outer block.
pub fn blockize_blocks(
    state: &mut ScheduleState,
    block_srefs: &[StmtSRef],
    preserve_unit_iters: bool,
) -> Result<StmtSRef> {
    assert!(!block_srefs.is_empty(), "expected at least one target block");
    let _ = preserve_unit_iters;

    let lca = lowest_common_ancestor(state, block_srefs);
    let info = collect_subst_info(state, lca, block_srefs[0]);
    let mut loop_var_subst = VarSubst::new();
    for (iter_var, binding) in info.outer_iter_vars.iter().zip(&info.outer_bindings) {
        if let Some(var) = binding.as_var() {
            loop_var_subst.insert(var.id(), PrimExpr::var(&iter_var.var));
        }
    }

    let mut reuse = BlockReuse::default();
    let (replacement, blockized) = {
        let mut rewriter = GroupBlockizer {
            target_ids: block_srefs.iter().map(|sref| state.get_block(*sref).id()).collect(),
            reuse: &mut reuse,
            outer_iter_vars: info.outer_iter_vars,
            outer_bindings: info.outer_bindings,
            inner_iter_vars: Vec::new(),
            block_var_subst: info.block_var_subst,
            loop_var_subst,
            read_regions: Vec::new(),
            write_regions: Vec::new(),
            outer_block_name: String::from("outer_"),
            analyzer: Analyzer::new(),
            inner_iter_dom: DomMap::new(),
            first_in: false,
            target_in: false,
            blockized: None,
        };
        let replacement = match state.node(lca).stmt.clone() {
            SRefStmt::For(f) => Replacement::Stmt(rewriter.rewrite_lca_for(&f)),
            SRefStmt::Block(block) => Replacement::Block(rewriter.rewrite_lca_block(&block)),
        };
        let blockized = rewriter
            .blockized
            .take()
            .expect("no target block realize found under the lowest common ancestor");
        (replacement, blockized)
    };

    state.replace(lca, replacement, &reuse);
    let result = state.sref_of(blockized.block.id()).expect("the outer block was installed");
    let scope_root = get_scope_root(state, result);
    state.update_scope_block_info(scope_root);
    Ok(result)
}
