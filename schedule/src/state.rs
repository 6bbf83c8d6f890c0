//! Sref tree and schedule state.
//!
//! Srefs are value-copyable handles into an arena owned by the state, so the
//! tree carries no reference cycles. A transformation stages its whole
//! rewritten subtree, then installs it through [`ScheduleState::replace`],
//! which splices the statement in and re-links srefs in a single walk over
//! the owning function: unchanged nodes and reuse-mapped blocks keep their
//! sref identity, vanished nodes are dropped from the arena.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use loft_arith::try_linear;
use loft_ir::{Block, BlockRealize, For, IRModule, Stmt};

/// Value handle identifying an IR node and its parent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtSRef(pub(crate) usize);

/// The node an sref points at. Only blocks and loops are sref'd.
#[derive(Debug, Clone)]
pub enum SRefStmt {
    Block(Rc<Block>),
    For(Rc<For>),
}

impl SRefStmt {
    pub fn node_id(&self) -> u64 {
        match self {
            Self::Block(block) => block.id(),
            Self::For(f) => f.id(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SRefNode {
    pub stmt: SRefStmt,
    pub parent: Option<StmtSRef>,
    /// For block srefs, the realize instantiating the block.
    pub realize: Option<Rc<BlockRealize>>,
}

/// Derived per-block metadata, preserved across sref reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub affine_binding: bool,
}

/// `(old block, new block)` pairs accumulated by a transformation.
///
/// Re-inserting for the same old block supersedes the previous pair, which
/// is how a substituted block is later replaced by the inner block derived
/// from it.
#[derive(Debug, Default)]
pub struct BlockReuse {
    forward: HashMap<u64, Rc<Block>>,
    reverse: HashMap<u64, u64>,
}

impl BlockReuse {
    pub fn insert(&mut self, old: &Rc<Block>, new: &Rc<Block>) {
        if let Some(previous) = self.forward.insert(old.id(), new.clone()) {
            self.reverse.remove(&previous.id());
        }
        self.reverse.insert(new.id(), old.id());
    }

    pub fn get(&self, old_id: u64) -> Option<&Rc<Block>> {
        self.forward.get(&old_id)
    }

    pub fn old_of(&self, new_id: u64) -> Option<u64> {
        self.reverse.get(&new_id).copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// What a `replace` installs at the target sref.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// A statement, for loop targets.
    Stmt(Stmt),
    /// A bare block, for block targets; the enclosing realize is kept.
    Block(Rc<Block>),
}

pub struct ScheduleState {
    pub module: IRModule,
    nodes: Vec<Option<SRefNode>>,
    stmt2ref: HashMap<u64, StmtSRef>,
    block_info: HashMap<StmtSRef, BlockInfo>,
}

impl ScheduleState {
    pub fn new(module: IRModule) -> Self {
        let mut state =
            Self { module, nodes: Vec::new(), stmt2ref: HashMap::new(), block_info: HashMap::new() };
        state.rebuild_srefs(&BlockReuse::default());
        state
    }

    /// The sref of a block or loop node, by stable node id.
    pub fn sref_of(&self, node_id: u64) -> Option<StmtSRef> {
        self.stmt2ref.get(&node_id).copied()
    }

    pub fn node(&self, sref: StmtSRef) -> &SRefNode {
        self.nodes[sref.0].as_ref().expect("stale sref")
    }

    pub fn parent(&self, sref: StmtSRef) -> Option<StmtSRef> {
        self.node(sref).parent
    }

    /// All live srefs, in arena order.
    pub fn srefs(&self) -> impl Iterator<Item = StmtSRef> + '_ {
        (0..self.nodes.len()).filter(|idx| self.nodes[*idx].is_some()).map(StmtSRef)
    }

    pub fn is_block(&self, sref: StmtSRef) -> bool {
        matches!(self.node(sref).stmt, SRefStmt::Block(_))
    }

    pub fn try_get_block(&self, sref: StmtSRef) -> Option<Rc<Block>> {
        match &self.node(sref).stmt {
            SRefStmt::Block(block) => Some(block.clone()),
            SRefStmt::For(_) => None,
        }
    }

    pub fn get_block(&self, sref: StmtSRef) -> Rc<Block> {
        self.try_get_block(sref).expect("the sref does not point to a Block")
    }

    pub fn try_get_for(&self, sref: StmtSRef) -> Option<Rc<For>> {
        match &self.node(sref).stmt {
            SRefStmt::For(f) => Some(f.clone()),
            SRefStmt::Block(_) => None,
        }
    }

    pub fn get_for(&self, sref: StmtSRef) -> Rc<For> {
        self.try_get_for(sref).expect("the sref does not point to a For loop")
    }

    /// The realize instantiating a block sref.
    pub fn get_block_realize(&self, sref: StmtSRef) -> Rc<BlockRealize> {
        self.node(sref).realize.clone().expect("the sref does not point to a realized Block")
    }

    pub fn block_info(&self, sref: StmtSRef) -> Option<BlockInfo> {
        self.block_info.get(&sref).copied()
    }

    pub fn is_affine_block_binding(&self, sref: StmtSRef) -> bool {
        self.block_info.get(&sref).is_some_and(|info| info.affine_binding)
    }

    pub fn set_affine_block_binding(&mut self, sref: StmtSRef, affine_binding: bool) {
        self.block_info.insert(sref, BlockInfo { affine_binding });
    }

    /// Splice `replacement` at the target sref and re-link the sref tree.
    ///
    /// Srefs of unchanged nodes survive; an old block recorded in `reuse`
    /// hands its sref to its replacement; everything else under the target
    /// gets fresh srefs.
    pub fn replace(&mut self, sref: StmtSRef, replacement: Replacement, reuse: &BlockReuse) {
        let target_id = self.node(sref).stmt.node_id();
        let mut module = self.module.clone();
        let mut found = false;
        for (_, func) in module.funcs.iter_mut() {
            if let Some(new_body) = splice_stmt(&func.body, target_id, &replacement) {
                func.body = new_body;
                found = true;
                break;
            }
        }
        assert!(found, "the replacement target is not part of the module");
        self.module = module;
        self.rebuild_srefs(reuse);
    }

    /// Recompute derived block metadata for every block in the scope.
    pub fn update_scope_block_info(&mut self, scope_sref: StmtSRef) {
        let node = self.node(scope_sref).clone();
        if let Some(realize) = &node.realize {
            let affine = binding_is_affine(realize);
            self.block_info.insert(scope_sref, BlockInfo { affine_binding: affine });
        }
        let body = match &node.stmt {
            SRefStmt::Block(block) => block.body.clone(),
            SRefStmt::For(f) => f.body.clone(),
        };
        self.update_info_in(&body);
    }

    fn update_info_in(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::For(f) => self.update_info_in(&f.body),
            Stmt::BlockRealize(realize) => {
                if let Some(sref) = self.sref_of(realize.block.id()) {
                    let affine = binding_is_affine(realize);
                    self.block_info.insert(sref, BlockInfo { affine_binding: affine });
                }
                self.update_info_in(&realize.block.body);
                if let Some(init) = &realize.block.init {
                    self.update_info_in(init);
                }
            }
            Stmt::Seq(children) => children.iter().for_each(|child| self.update_info_in(child)),
            Stmt::IfThenElse { then_case, else_case, .. } => {
                self.update_info_in(then_case);
                if let Some(else_case) = else_case {
                    self.update_info_in(else_case);
                }
            }
            Stmt::BufferStore { .. } | Stmt::Evaluate(_) => {}
        }
    }

    fn rebuild_srefs(&mut self, reuse: &BlockReuse) {
        let old_stmt2ref = std::mem::take(&mut self.stmt2ref);
        let mut kept: HashSet<usize> = HashSet::new();
        let module = self.module.clone();
        for func in module.funcs.values() {
            self.link_stmt(&func.body, None, &old_stmt2ref, reuse, &mut kept);
        }
        for idx in 0..self.nodes.len() {
            if !kept.contains(&idx) && self.nodes[idx].is_some() {
                self.nodes[idx] = None;
                self.block_info.remove(&StmtSRef(idx));
            }
        }
    }

    fn link_stmt(
        &mut self,
        stmt: &Stmt,
        parent: Option<StmtSRef>,
        old: &HashMap<u64, StmtSRef>,
        reuse: &BlockReuse,
        kept: &mut HashSet<usize>,
    ) {
        match stmt {
            Stmt::For(f) => {
                let sref = self.claim_sref(f.id(), None, old, kept);
                self.nodes[sref.0] =
                    Some(SRefNode { stmt: SRefStmt::For(f.clone()), parent, realize: None });
                self.stmt2ref.insert(f.id(), sref);
                self.link_stmt(&f.body, Some(sref), old, reuse, kept);
            }
            Stmt::BlockRealize(realize) => {
                let block = &realize.block;
                let sref = self.claim_sref(block.id(), reuse.old_of(block.id()), old, kept);
                self.nodes[sref.0] = Some(SRefNode {
                    stmt: SRefStmt::Block(block.clone()),
                    parent,
                    realize: Some(realize.clone()),
                });
                self.stmt2ref.insert(block.id(), sref);
                if !self.block_info.contains_key(&sref) {
                    let affine = binding_is_affine(realize);
                    self.block_info.insert(sref, BlockInfo { affine_binding: affine });
                }
                self.link_stmt(&block.body, Some(sref), old, reuse, kept);
                if let Some(init) = &block.init {
                    self.link_stmt(init, Some(sref), old, reuse, kept);
                }
            }
            Stmt::Seq(children) => {
                for child in children {
                    self.link_stmt(child, parent, old, reuse, kept);
                }
            }
            Stmt::IfThenElse { then_case, else_case, .. } => {
                self.link_stmt(then_case, parent, old, reuse, kept);
                if let Some(else_case) = else_case {
                    self.link_stmt(else_case, parent, old, reuse, kept);
                }
            }
            Stmt::BufferStore { .. } | Stmt::Evaluate(_) => {}
        }
    }

    fn claim_sref(
        &mut self,
        node_id: u64,
        reused_from: Option<u64>,
        old: &HashMap<u64, StmtSRef>,
        kept: &mut HashSet<usize>,
    ) -> StmtSRef {
        let existing = old
            .get(&node_id)
            .copied()
            .or_else(|| reused_from.and_then(|old_id| old.get(&old_id).copied()));
        let sref = match existing {
            Some(sref) if !kept.contains(&sref.0) => sref,
            _ => {
                self.nodes.push(None);
                StmtSRef(self.nodes.len() - 1)
            }
        };
        kept.insert(sref.0);
        sref
    }
}

/// A binding is affine when every iterator value is a constant or a linear
/// combination of enclosing loop vars.
fn binding_is_affine(realize: &Rc<BlockRealize>) -> bool {
    realize.iter_values.iter().all(|value| value.as_int().is_some() || try_linear(value).is_some())
}

fn splice_stmt(stmt: &Stmt, target_id: u64, replacement: &Replacement) -> Option<Stmt> {
    match stmt {
        Stmt::For(f) => {
            if f.id() == target_id {
                let Replacement::Stmt(new_stmt) = replacement else {
                    panic!("a loop can only be replaced by a statement");
                };
                return Some(new_stmt.clone());
            }
            splice_stmt(&f.body, target_id, replacement).map(|body| Stmt::For(f.with_body(body)))
        }
        Stmt::BlockRealize(realize) => {
            let block = &realize.block;
            if block.id() == target_id {
                let Replacement::Block(new_block) = replacement else {
                    panic!("a block can only be replaced by a block");
                };
                return Some(Stmt::BlockRealize(BlockRealize::new(
                    realize.iter_values.clone(),
                    realize.predicate.clone(),
                    new_block.clone(),
                )));
            }
            let rebuilt_body = splice_stmt(&block.body, target_id, replacement);
            let rebuilt_init = block
                .init
                .as_ref()
                .and_then(|init| splice_stmt(init, target_id, replacement));
            if rebuilt_body.is_none() && rebuilt_init.is_none() {
                return None;
            }
            let new_block = Block::new_full(
                block.iter_vars.clone(),
                block.reads.clone(),
                block.writes.clone(),
                block.name_hint.clone(),
                rebuilt_body.unwrap_or_else(|| block.body.clone()),
                rebuilt_init.or_else(|| block.init.clone()),
                block.alloc_buffers.clone(),
                block.match_buffers.clone(),
                block.annotations.clone(),
            );
            Some(Stmt::BlockRealize(BlockRealize::new(
                realize.iter_values.clone(),
                realize.predicate.clone(),
                new_block,
            )))
        }
        Stmt::Seq(children) => {
            for (idx, child) in children.iter().enumerate() {
                if let Some(new_child) = splice_stmt(child, target_id, replacement) {
                    let mut new_children = children.clone();
                    new_children[idx] = new_child;
                    return Some(Stmt::Seq(new_children));
                }
            }
            None
        }
        Stmt::IfThenElse { condition, then_case, else_case } => {
            if let Some(new_then) = splice_stmt(then_case, target_id, replacement) {
                return Some(Stmt::IfThenElse {
                    condition: condition.clone(),
                    then_case: Box::new(new_then),
                    else_case: else_case.clone(),
                });
            }
            if let Some(else_stmt) = else_case {
                if let Some(new_else) = splice_stmt(else_stmt, target_id, replacement) {
                    return Some(Stmt::IfThenElse {
                        condition: condition.clone(),
                        then_case: then_case.clone(),
                        else_case: Some(Box::new(new_else)),
                    });
                }
            }
            None
        }
        Stmt::BufferStore { .. } | Stmt::Evaluate(_) => None,
    }
}
