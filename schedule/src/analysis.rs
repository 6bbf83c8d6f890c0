//! Sref navigation helpers.

use std::rc::Rc;

use loft_ir::{BlockRealize, Stmt};

use crate::error::{NotSingleChildBlockSnafu, Result};
use crate::state::{ScheduleState, StmtSRef};

/// The nearest enclosing block sref, or the sref itself at the scope root.
pub fn get_scope_root(state: &ScheduleState, sref: StmtSRef) -> StmtSRef {
    let mut cursor = state.parent(sref);
    while let Some(current) = cursor {
        if state.is_block(current) {
            return current;
        }
        cursor = state.parent(current);
    }
    sref
}

/// The lowest common ancestor of the given srefs.
pub fn lowest_common_ancestor(state: &ScheduleState, srefs: &[StmtSRef]) -> StmtSRef {
    assert!(!srefs.is_empty(), "expected at least one sref");
    let depth = |mut sref: StmtSRef| {
        let mut depth = 0usize;
        while let Some(parent) = state.parent(sref) {
            sref = parent;
            depth += 1;
        }
        depth
    };

    let mut current = srefs[0];
    let mut current_depth = depth(current);
    for &other in &srefs[1..] {
        let mut a = current;
        let mut da = current_depth;
        let mut b = other;
        let mut db = depth(other);
        while da > db {
            a = state.parent(a).expect("depth accounting is consistent");
            da -= 1;
        }
        while db > da {
            b = state.parent(b).expect("depth accounting is consistent");
            db -= 1;
        }
        while a != b {
            a = state.parent(a).expect("srefs share no common ancestor");
            b = state.parent(b).expect("srefs share no common ancestor");
            da -= 1;
        }
        current = a;
        current_depth = da;
    }
    current
}

/// The unique block realize under a loop, descending through single-child
/// loops and singleton sequences.
pub fn check_get_single_child_block_realize(
    state: &ScheduleState,
    loop_sref: StmtSRef,
) -> Result<Rc<BlockRealize>> {
    let f = state.get_for(loop_sref);
    let mut body = f.body.clone();
    loop {
        match body {
            Stmt::For(inner) => body = inner.body.clone(),
            Stmt::BlockRealize(realize) => return Ok(realize),
            Stmt::Seq(children) if children.len() == 1 => {
                body = children.into_iter().next().unwrap();
            }
            _ => {
                return NotSingleChildBlockSnafu { loop_var: f.loop_var.name.clone() }.fail();
            }
        }
    }
}
