//! Error kinds for every phase of the engine, per spec §7.
//!
//! Expansion, arithmetic, and VFS errors are recovered at the command
//! boundary (turned into exit status + a stderr line) by the evaluator;
//! syntax, limit, and cancellation errors propagate out of `Session::run`.

use crate::ast::Position;
use std::fmt;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BashboxError {
    #[error("syntax error at {pos}: {reason}")]
    Syntax { pos: Position, reason: String },

    #[error("{0}")]
    Expansion(#[from] ExpansionError),

    #[error("{0}")]
    Arith(#[from] ArithError),

    #[error("{0}")]
    Vfs(#[from] VfsError),

    #[error("bashbox: {name}: command not found")]
    CommandNotFound { name: String },

    #[error("limit exceeded: {kind}")]
    LimitExceeded { kind: LimitKind },

    #[error("cancelled")]
    Cancelled,

    #[error("a run()/exec() call is already in flight on this session")]
    Reentrant,
}

impl BashboxError {
    /// Conventional exit code for this error, per spec §7.
    pub fn exit_code(&self) -> i32 {
        match self {
            BashboxError::Syntax { .. } => 2,
            BashboxError::Expansion(_) => 1,
            BashboxError::Arith(_) => 1,
            BashboxError::Vfs(_) => 1,
            BashboxError::CommandNotFound { .. } => 127,
            BashboxError::LimitExceeded { .. } => 124,
            BashboxError::Cancelled => 130,
            BashboxError::Reentrant => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Statements,
    CallDepth,
    LoopIterations,
    WallClock,
    VfsBytes,
    PipeBuffer,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LimitKind::Statements => "max statements per run",
            LimitKind::CallDepth => "max function-call depth",
            LimitKind::LoopIterations => "max loop iterations",
            LimitKind::WallClock => "max wall-clock per run",
            LimitKind::VfsBytes => "max VFS bytes",
            LimitKind::PipeBuffer => "max pipe buffer",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExpansionError {
    #[error("bashbox: {name}: unbound variable")]
    UnboundVariable { name: String },
    #[error("bashbox: {name}: {message}")]
    ParameterError { name: String, message: String },
    #[error("bashbox: no match: {pattern}")]
    NoGlobMatch { pattern: String },
    #[error("bashbox: {0}: bad substitution")]
    BadSubstitution(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ArithError {
    #[error("bashbox: arithmetic: division by zero")]
    DivisionByZero,
    #[error("bashbox: arithmetic: invalid token '{0}'")]
    InvalidToken(String),
    #[error("bashbox: arithmetic: {0}")]
    Other(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VfsError {
    #[error("{path}: No such file or directory")]
    NotFound { path: String },
    #[error("{path}: Not a directory")]
    NotDir { path: String },
    #[error("{path}: Is a directory")]
    IsDir { path: String },
    #[error("{path}: File exists")]
    Exists { path: String },
    #[error("{path}: Permission denied")]
    Permission { path: String },
    #[error("{path}: Too many levels of symbolic links")]
    Loop { path: String },
    #[error("{path}: No space left on device")]
    NoSpace { path: String },
    #[error("{path}: {message}")]
    Other { path: String, message: String },
}

impl VfsError {
    pub fn path(&self) -> &str {
        match self {
            VfsError::NotFound { path }
            | VfsError::NotDir { path }
            | VfsError::IsDir { path }
            | VfsError::Exists { path }
            | VfsError::Permission { path }
            | VfsError::Loop { path }
            | VfsError::NoSpace { path }
            | VfsError::Other { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, BashboxError>;
