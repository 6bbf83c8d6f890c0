//! Instruction kinds and the recording schedule facade.
//!
//! The two primitives are registered as named instruction kinds so a trace
//! can be rendered and replayed by the surrounding tooling. [`Schedule`]
//! owns a [`ScheduleState`] and appends one [`Instruction`] per successful
//! primitive application.

use itertools::Itertools;
use loft_ir::IRModule;

use crate::blockize::blockize;
use crate::blockize_group::blockize_blocks;
use crate::error::Result;
use crate::state::{SRefStmt, ScheduleState, StmtSRef};
use crate::tensorize::tensorize_by_name;

/// Static description of a schedule instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionKind {
    pub name: &'static str,
    pub num_inputs: usize,
    pub num_attrs: usize,
    pub num_decisions: usize,
    pub is_pure: bool,
    pub num_outputs: usize,
}

pub const BLOCKIZE: InstructionKind = InstructionKind {
    name: "Blockize",
    num_inputs: 1,
    num_attrs: 1,
    num_decisions: 0,
    is_pure: false,
    num_outputs: 1,
};

pub const TENSORIZE: InstructionKind = InstructionKind {
    name: "Tensorize",
    num_inputs: 1,
    num_attrs: 2,
    num_decisions: 0,
    is_pure: false,
    num_outputs: 0,
};

pub fn instruction_kind(name: &str) -> Option<&'static InstructionKind> {
    match name {
        "Blockize" => Some(&BLOCKIZE),
        "Tensorize" => Some(&TENSORIZE),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Str(String),
}

/// One recorded primitive application.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: &'static str,
    pub inputs: Vec<String>,
    pub attrs: Vec<(&'static str, AttrValue)>,
}

/// A schedule over one module, recording every applied primitive.
pub struct Schedule {
    pub state: ScheduleState,
    trace: Vec<Instruction>,
}

impl Schedule {
    pub fn new(module: IRModule) -> Self {
        Self { state: ScheduleState::new(module), trace: Vec::new() }
    }

    pub fn trace(&self) -> &[Instruction] {
        &self.trace
    }

    pub fn blockize(&mut self, loop_sref: StmtSRef, preserve_unit_iters: bool) -> Result<StmtSRef> {
        let input = self.describe(loop_sref);
        let result = blockize(&mut self.state, loop_sref, preserve_unit_iters)?;
        self.trace.push(Instruction {
            kind: BLOCKIZE.name,
            inputs: vec![input],
            attrs: vec![("preserve_unit_iters", AttrValue::Bool(preserve_unit_iters))],
        });
        Ok(result)
    }

    pub fn blockize_blocks(
        &mut self,
        block_srefs: &[StmtSRef],
        preserve_unit_iters: bool,
    ) -> Result<StmtSRef> {
        let input = block_srefs.iter().map(|sref| self.describe(*sref)).join(", ");
        let result = blockize_blocks(&mut self.state, block_srefs, preserve_unit_iters)?;
        self.trace.push(Instruction {
            kind: BLOCKIZE.name,
            inputs: vec![format!("[{input}]")],
            attrs: vec![("preserve_unit_iters", AttrValue::Bool(preserve_unit_iters))],
        });
        Ok(result)
    }

    pub fn tensorize(
        &mut self,
        sref: StmtSRef,
        intrin_name: &str,
        preserve_unit_iters: bool,
    ) -> Result<()> {
        let input = self.describe(sref);
        tensorize_by_name(&mut self.state, sref, intrin_name, preserve_unit_iters)?;
        self.trace.push(Instruction {
            kind: TENSORIZE.name,
            inputs: vec![input],
            attrs: vec![
                ("intrin", AttrValue::Str(intrin_name.to_string())),
                ("preserve_unit_iters", AttrValue::Bool(preserve_unit_iters)),
            ],
        });
        Ok(())
    }

    fn describe(&self, sref: StmtSRef) -> String {
        match &self.state.node(sref).stmt {
            SRefStmt::Block(block) => format!("block:{}", block.name_hint),
            SRefStmt::For(f) => format!("loop:{}", f.loop_var.name),
        }
    }
}
