//! Schedule error surface.
//!
//! Recoverable errors leave the schedule state untouched: every primitive
//! stages its new IR locally and installs it in one final `replace` call.
//! Contract violations (misuse of a primitive) panic with a precise message
//! instead of returning an error.

use std::rc::Rc;

use loft_ir::{Block, For};
use snafu::Snafu;

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ScheduleError {
    /// The block iterator bindings admit no outer/inner factorization over
    /// the chosen loops.
    #[snafu(display("The bindings of the inner block can not be blockized."))]
    SubspaceNotDivisible { scope_loop: Rc<For>, block: Rc<Block> },

    /// The matched region does not line up with the intrinsic descriptor.
    #[snafu(display("Structural match failure: {reason}"))]
    StructuralMatchFailure { reason: String },

    /// The blockized loop does not enclose a unique child block realize.
    #[snafu(display("The loop `{loop_var}` does not enclose a unique child block realize"))]
    NotSingleChildBlock { loop_var: String },

    /// Tensorize was asked for an intrinsic that was never registered.
    #[snafu(display("Tensor intrinsic `{name}` is not registered"))]
    IntrinNotFound { name: String },
}

impl ScheduleError {
    /// Long-form rendering naming the IR nodes of interest.
    pub fn detail(&self) -> String {
        match self {
            Self::SubspaceNotDivisible { scope_loop, block } => format!(
                "The bindings of the inner block {} can not be blockized by the loops starting at {}.",
                block.name_hint, scope_loop.loop_var.name,
            ),
            other => other.to_string(),
        }
    }
}
