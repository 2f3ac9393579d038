//! Non-local control-flow signals threaded out of statement execution.
//!
//! Mirrors the shape of the teacher's `InterpreterError::{Break,Continue,
//! Return,Exit}` variants (`interpreter::execution_engine`), collapsed into
//! one enum since this engine doesn't need per-variant `prepend_output`
//! bookkeeping — `StreamIO` buffers carry output, not the signal itself.

use crate::error::BashboxError;

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    /// `break [n]` — unwinds `n` enclosing loops.
    Break(u32),
    /// `continue [n]` — unwinds `n - 1` enclosing loops, then restarts one.
    Continue(u32),
    /// `return [n]` — unwinds to the nearest function/sourced-script call.
    Return(i32),
    /// `exit [n]` — unwinds the whole `run`/`exec` call.
    Exit(i32),
}

/// What a statement/pipeline/command can fail with, distinct from a plain
/// nonzero exit status (which is a normal `Ok` value, not an `Err`).
#[derive(Debug, Clone)]
pub enum Outcome {
    Signal(Signal),
    Error(BashboxError),
}

impl From<BashboxError> for Outcome {
    fn from(e: BashboxError) -> Self {
        Outcome::Error(e)
    }
}

pub type Flow<T> = Result<T, Outcome>;
