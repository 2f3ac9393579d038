//! The evaluator — spec §4.4. Walks the AST the way the teacher's
//! `ExecutionEngine` does (`exec_script -> exec_statement -> exec_pipeline
//! -> exec_command`, see `interpreter::execution_engine`), but threads
//! `StreamIO` handles through every call instead of accumulating
//! `String`s, and distinguishes an ordinary nonzero exit status (`Ok`)
//! from non-local control flow (`Err(Outcome::Signal(..))`, see
//! `control.rs`) the way the teacher distinguishes `ExecResult` from
//! `InterpreterError::{Break,Continue,Return,Exit}`.

pub mod control;
pub mod scope;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use regex_lite::Regex;

use crate::ast::{
    AndOrOp, AssignValue, Assignment, CaseTerminator, Command as AstCommand, CompoundCommand, CondBinOp, CondExpr,
    CondUnaryOp, Pipeline, RedirOp, RedirTarget, Redirection, Script, SimpleCommand, Statement,
};
use crate::commands::{CommandContext, CommandRegistry};
use crate::error::{BashboxError, ExpansionError, LimitKind};
use crate::expand::glob::{self, GlobPolicy};
use crate::expand::{self, ExpansionHost};
use crate::stream::StreamIO;
use crate::vfs::{OpenMode, Vfs};

use self::control::{Flow, Outcome, Signal};
use self::scope::{ScopeStack, Value, Variable};

/// Shell options toggled by `set`/`shopt`, cloned (then discarded) across
/// subshell boundaries the same way the variable scope is.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    pub errexit: bool,
    pub nounset: bool,
    pub xtrace: bool,
    pub pipefail: bool,
    pub noexec: bool,
    pub noglob: bool,
    pub globstar: bool,
    pub nullglob: bool,
    pub failglob: bool,
}

impl Flags {
    pub fn as_dash_string(&self) -> String {
        let mut s = String::new();
        if self.errexit {
            s.push('e');
        }
        if self.nounset {
            s.push('u');
        }
        if self.xtrace {
            s.push('x');
        }
        if self.noglob {
            s.push('f');
        }
        if self.noexec {
            s.push('n');
        }
        s
    }
}

/// Resource limits (spec §5). Plain `Copy` data — no behavior attached.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_statements: u64,
    pub max_call_depth: usize,
    pub max_loop_iterations: u64,
    pub max_wall_clock: Duration,
    pub max_vfs_bytes: u64,
    pub max_pipe_buffer: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_statements: 1_000_000,
            max_call_depth: 256,
            max_loop_iterations: 100_000,
            max_wall_clock: Duration::from_secs(30),
            max_vfs_bytes: 64 * 1024 * 1024,
            max_pipe_buffer: 1024 * 1024,
        }
    }
}

/// `Arc<AtomicBool>`-backed cancellation handle, checked at statement
/// boundaries and loop back-edges (spec §5). A plain counter-style flag
/// rather than an async primitive, grounded in the teacher's own
/// `InterpreterState::call_depth`/`command_count` pattern of threading
/// plain counters through the engine (see SPEC_FULL.md §5).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives AST execution against one logical shell's worth of state. A
/// subshell is a second `Evaluator` sharing the VFS, registry, and the
/// run-wide statement/wall-clock budget, but holding its own copies of
/// everything spec §4.4 says a subshell must isolate (scope, cwd, flags,
/// functions, aliases, positional params) — see `fork_subshell`.
pub struct Evaluator {
    pub scope: ScopeStack,
    pub vfs: Rc<RefCell<Vfs>>,
    pub cwd: String,
    pub flags: Flags,
    pub functions: IndexMap<String, Rc<CompoundCommand>>,
    pub aliases: IndexMap<String, String>,
    pub registry: CommandRegistry,
    pub positional: Vec<String>,
    pub arg0: String,
    pub last_exit_status: i32,
    pub last_bg_pid: i32,
    pub users: IndexMap<String, String>,
    pub limits: Limits,
    statement_count: Rc<Cell<u64>>,
    started: Instant,
    cancel: CancellationToken,
}

impl Evaluator {
    pub fn new(
        vfs: Rc<RefCell<Vfs>>,
        cwd: String,
        env: IndexMap<String, String>,
        users: IndexMap<String, String>,
        limits: Limits,
        cancel: CancellationToken,
    ) -> Self {
        let mut scope = ScopeStack::default();
        for (k, v) in env {
            scope.set_scalar(&k, v);
            scope.set_attrs(&k, |a| a.exported = true);
        }
        Evaluator {
            scope,
            vfs,
            cwd,
            flags: Flags::default(),
            functions: IndexMap::new(),
            aliases: IndexMap::new(),
            registry: CommandRegistry::default(),
            positional: Vec::new(),
            arg0: "bashbox".to_string(),
            last_exit_status: 0,
            last_bg_pid: 0,
            users,
            limits,
            statement_count: Rc::new(Cell::new(0)),
            started: Instant::now(),
            cancel,
        }
    }

    /// Lets `Session::exec` hand the evaluator a fresh per-call
    /// cancellation token while reusing the rest of the session's state
    /// across calls (spec §6.1: "sessions are reusable").
    pub fn cancel_token_override(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
        self.statement_count.set(0);
        self.started = Instant::now();
    }

    fn fork_subshell(&self) -> Evaluator {
        Evaluator {
            scope: self.scope.snapshot_for_subshell(),
            vfs: Rc::clone(&self.vfs),
            cwd: self.cwd.clone(),
            flags: self.flags.clone(),
            functions: self.functions.clone(),
            aliases: self.aliases.clone(),
            registry: self.registry.clone(),
            positional: self.positional.clone(),
            arg0: self.arg0.clone(),
            last_exit_status: self.last_exit_status,
            last_bg_pid: self.last_bg_pid,
            users: self.users.clone(),
            limits: self.limits,
            statement_count: Rc::clone(&self.statement_count),
            started: self.started,
            cancel: self.cancel.clone(),
        }
    }

    /// Every statement boundary/loop back-edge checks cancellation, the
    /// statement counter, and the wall clock (spec §5).
    fn check_budget(&mut self) -> Flow<()> {
        if self.cancel.is_cancelled() {
            return Err(Outcome::Error(BashboxError::Cancelled));
        }
        let n = self.statement_count.get() + 1;
        self.statement_count.set(n);
        if n > self.limits.max_statements {
            return Err(Outcome::Error(BashboxError::LimitExceeded { kind: LimitKind::Statements }));
        }
        if self.started.elapsed() > self.limits.max_wall_clock {
            return Err(Outcome::Error(BashboxError::LimitExceeded { kind: LimitKind::WallClock }));
        }
        Ok(())
    }

    pub fn exported_env(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        for name in self.scope.all_names() {
            if let Some(v) = self.scope.get(&name) {
                if v.attrs.exported {
                    out.insert(name, v.as_scalar());
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------
    // Script / statement / pipeline / command
    // -----------------------------------------------------------------

    pub fn exec_script(&mut self, script: &Script, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        let mut status = self.last_exit_status;
        for stmt in &script.statements {
            match self.exec_statement(stmt, stdin, stdout, stderr) {
                Ok(s) => status = s,
                Err(Outcome::Signal(Signal::Break(_))) | Err(Outcome::Signal(Signal::Continue(_))) => continue,
                other => return other,
            }
        }
        Ok(status)
    }

    /// Used by `.`/`source`/`eval`: runs in the caller's own scope (unlike
    /// a subshell) but still lets `return` unwind back to the call site.
    pub fn exec_in_current_scope(&mut self, script: &Script, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        match self.exec_script(script, stdin, stdout, stderr) {
            Ok(s) => Ok(s),
            Err(Outcome::Signal(Signal::Return(n))) => Ok(n),
            other => other,
        }
    }

    fn exec_statement_list(&mut self, stmts: &[Statement], stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        let mut status = self.last_exit_status;
        for stmt in stmts {
            status = self.exec_statement(stmt, stdin, stdout, stderr)?;
        }
        Ok(status)
    }

    fn exec_statement(&mut self, stmt: &Statement, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        self.check_budget()?;
        let mut status = self.last_exit_status;
        let mut last_negated = false;
        let mut last_executed_idx: i64 = -1;
        for (idx, pipeline) in stmt.pipelines.iter().enumerate() {
            if idx > 0 {
                match stmt.operators[idx - 1] {
                    AndOrOp::And => {
                        if status != 0 {
                            continue;
                        }
                    }
                    AndOrOp::Or => {
                        if status == 0 {
                            continue;
                        }
                    }
                }
            }
            status = self.exec_pipeline(pipeline, stdin, stdout, stderr)?;
            last_negated = pipeline.negated;
            last_executed_idx = idx as i64;
            self.last_exit_status = status;
        }

        if stmt.background {
            self.last_bg_pid += 1;
            return Ok(0);
        }

        let was_short_circuited = last_executed_idx < (stmt.pipelines.len() as i64 - 1);
        if self.flags.errexit && status != 0 && !last_negated && !was_short_circuited {
            return Err(Outcome::Signal(Signal::Exit(status)));
        }
        Ok(status)
    }

    fn exec_pipeline(&mut self, pipeline: &Pipeline, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        let n = pipeline.commands.len();
        if n == 1 {
            let status = self.exec_command(&pipeline.commands[0], stdin, stdout, stderr)?;
            return Ok(self.apply_negation(pipeline.negated, status));
        }
        // Strictly sequential: stage n finishes entirely before stage n+1
        // starts, per SPEC_FULL.md §4.4/§5 (no real OS concurrency).
        let mut statuses = Vec::with_capacity(n);
        let mut current_in = stdin.clone();
        for (idx, command) in pipeline.commands.iter().enumerate() {
            let is_last = idx == n - 1;
            let stage_out = if is_last { stdout.clone() } else { StreamIO::pipe(self.limits.max_pipe_buffer) };
            let status = self.exec_command(command, &current_in, &stage_out, stderr)?;
            statuses.push(status);
            current_in = stage_out;
        }
        let status = if self.flags.pipefail {
            statuses.iter().rev().find(|s| **s != 0).copied().unwrap_or(0)
        } else {
            *statuses.last().unwrap()
        };
        Ok(self.apply_negation(pipeline.negated, status))
    }

    fn apply_negation(&self, negated: bool, status: i32) -> i32 {
        if negated {
            if status == 0 {
                1
            } else {
                0
            }
        } else {
            status
        }
    }

    fn exec_command(&mut self, cmd: &AstCommand, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        match cmd {
            AstCommand::Simple(s) => self.exec_simple_command(s, stdin, stdout, stderr),
            AstCommand::Compound(c) => self.exec_compound_command(c, stdin, stdout, stderr),
            AstCommand::FunctionDef(f) => {
                self.functions.insert(f.name.clone(), Rc::new((*f.body).clone()));
                Ok(0)
            }
        }
    }

    // -----------------------------------------------------------------
    // Simple commands: assignments, redirections, dispatch
    // -----------------------------------------------------------------

    fn exec_simple_command(&mut self, cmd: &SimpleCommand, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        let (in_s, out_s, err_s) = self.apply_redirections(&cmd.redirections, stdin, stdout, stderr)?;

        let mut argv = Vec::new();
        if let Some(name) = &cmd.name {
            argv.extend(expand::expand_word(self, name)?);
        }
        for a in &cmd.args {
            argv.extend(expand::expand_word(self, a)?);
        }

        if argv.is_empty() {
            for a in &cmd.assignments {
                self.exec_assignment(a)?;
            }
            // A pure assignment always reports success, regardless of the
            // previous command's status (bash: `false; x=5; echo $?` -> 0).
            self.last_exit_status = 0;
            return Ok(0);
        }

        argv = self.expand_aliases(argv);
        let name = argv[0].clone();
        // Spec §4.4: assignments on a simple command are transient for
        // that command's own invocation unless it resolves to a function
        // or builtin, which run in-process with no subprocess boundary to
        // make "transient" meaningful.
        let persists = self.functions.contains_key(&name) || self.registry.is_builtin(&name);
        let status = if persists {
            for a in &cmd.assignments {
                self.exec_assignment(a)?;
            }
            self.resolve_and_invoke(argv, in_s, out_s, err_s)?
        } else {
            self.with_transient_assignments(&cmd.assignments, |me| me.resolve_and_invoke(argv, in_s, out_s, err_s))?
        };
        self.last_exit_status = status;
        Ok(status)
    }

    fn expand_aliases(&self, mut argv: Vec<String>) -> Vec<String> {
        for _ in 0..8 {
            let Some(replacement) = self.aliases.get(&argv[0]) else { break };
            let mut words: Vec<String> = replacement.split_whitespace().map(|s| s.to_string()).collect();
            if words.is_empty() || words[0] == argv[0] {
                break;
            }
            words.extend_from_slice(&argv[1..]);
            argv = words;
        }
        argv
    }

    fn with_transient_assignments<R>(&mut self, assigns: &[Assignment], f: impl FnOnce(&mut Self) -> Flow<R>) -> Flow<R> {
        let mut saved: Vec<(String, Option<Variable>)> = Vec::with_capacity(assigns.len());
        for a in assigns {
            saved.push((a.name.clone(), self.scope.get(&a.name).cloned()));
        }
        for a in assigns {
            self.exec_assignment(a)?;
        }
        let result = f(self);
        for (name, old) in saved {
            match old {
                Some(v) => self.scope.set_value(&name, v.value),
                None => self.scope.unset(&name),
            }
        }
        result
    }

    fn exec_assignment(&mut self, a: &Assignment) -> Flow<()> {
        if self.scope.is_readonly(&a.name) {
            return Err(Outcome::Error(BashboxError::Expansion(ExpansionError::ParameterError {
                name: a.name.clone(),
                message: "readonly variable".to_string(),
            })));
        }
        match &a.value {
            AssignValue::Scalar(w) => {
                let v = expand::expand_word_to_string(self, w)?;
                if let Some(idx_word) = &a.index {
                    let idx_text = expand::expand_word_to_string(self, idx_word)?;
                    if let Ok(i) = idx_text.parse::<i64>() {
                        let v = if a.append { format!("{}{}", self.scope.get_array_element(&a.name, i).unwrap_or_default(), v) } else { v };
                        self.scope.set_array_element(&a.name, i, v);
                    } else {
                        let prev = if a.append { self.get_assoc_element(&a.name, &idx_text).unwrap_or_default() } else { String::new() };
                        self.scope.set_assoc_element(&a.name, &idx_text, format!("{prev}{v}"));
                    }
                } else if a.append {
                    let prev = self.scope.get_scalar(&a.name).unwrap_or_default();
                    self.scope.set_scalar(&a.name, format!("{prev}{v}"));
                } else {
                    self.scope.set_scalar(&a.name, v);
                }
            }
            AssignValue::IndexedArray(words) => {
                let mut m = indexmap::IndexMap::new();
                let mut i = 0i64;
                for w in words {
                    for field in expand::expand_word(self, w)? {
                        m.insert(i, field);
                        i += 1;
                    }
                }
                self.scope.set_value(&a.name, Value::Indexed(m));
            }
            AssignValue::AssocArray(pairs) => {
                let mut m = indexmap::IndexMap::new();
                for (k, v) in pairs {
                    let key = expand::expand_word_to_string(self, k)?;
                    let value = expand::expand_word_to_string(self, v)?;
                    m.insert(key, value);
                }
                self.scope.set_value(&a.name, Value::Assoc(m));
            }
        }
        Ok(())
    }

    /// Entry point for builtins (`exec`, `command`) that need to dispatch
    /// an argv vector the same way a simple command would, without going
    /// back through alias expansion or assignment handling.
    pub fn dispatch_argv(&mut self, argv: Vec<String>, stdin: StreamIO, stdout: StreamIO, stderr: StreamIO) -> Flow<i32> {
        self.resolve_and_invoke(argv, stdin, stdout, stderr)
    }

    fn resolve_and_invoke(&mut self, argv: Vec<String>, stdin: StreamIO, stdout: StreamIO, stderr: StreamIO) -> Flow<i32> {
        self.check_budget()?;
        let name = argv[0].clone();
        if let Some(body) = self.functions.get(&name).cloned() {
            return self.call_function(&body, &argv, stdin, stdout, stderr);
        }
        if let Some(command) = self.registry.get(&name) {
            let mut ctx = CommandContext { argv: &argv, stdin, stdout, stderr };
            return command.invoke(&mut ctx, self);
        }
        let _ = stderr.write(format!("bashbox: {name}: command not found\n").as_bytes());
        Ok(127)
    }

    fn call_function(&mut self, body: &CompoundCommand, argv: &[String], stdin: StreamIO, stdout: StreamIO, stderr: StreamIO) -> Flow<i32> {
        if self.scope.depth() >= self.limits.max_call_depth {
            return Err(Outcome::Error(BashboxError::LimitExceeded { kind: LimitKind::CallDepth }));
        }
        self.scope.push_frame();
        let saved_positional = std::mem::replace(&mut self.positional, argv[1..].to_vec());
        let saved_arg0 = std::mem::replace(&mut self.arg0, argv[0].clone());
        let result = self.exec_compound_command(body, &stdin, &stdout, &stderr);
        self.positional = saved_positional;
        self.arg0 = saved_arg0;
        self.scope.pop_frame();
        match result {
            Ok(status) => {
                self.last_exit_status = status;
                Ok(status)
            }
            Err(Outcome::Signal(Signal::Return(n))) => {
                self.last_exit_status = n;
                Ok(n)
            }
            other => other,
        }
    }

    // -----------------------------------------------------------------
    // Redirections
    // -----------------------------------------------------------------

    fn apply_redirections(&mut self, redirs: &[Redirection], stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<(StreamIO, StreamIO, StreamIO)> {
        let mut cur_in = stdin.clone();
        let mut cur_out = stdout.clone();
        let mut cur_err = stderr.clone();
        for r in redirs {
            let default_fd = match r.operator {
                RedirOp::Less | RedirOp::LessAnd | RedirOp::LessGreat | RedirOp::TLess | RedirOp::DLess | RedirOp::DLessDash => 0,
                _ => 1,
            };
            let fd = r.fd.unwrap_or(default_fd);
            match &r.target {
                RedirTarget::HereDoc { content, .. } => {
                    cur_in = StreamIO::from_bytes(content.clone().into_bytes());
                }
                RedirTarget::FdAlias(n) => {
                    let src = match n {
                        0 => cur_in.clone(),
                        1 => cur_out.clone(),
                        2 => cur_err.clone(),
                        _ => StreamIO::memory(),
                    };
                    Self::assign_fd(fd, src.dup(), &mut cur_in, &mut cur_out, &mut cur_err);
                }
                RedirTarget::Word(w) => {
                    let text = expand::expand_word_to_string(self, w)?;
                    match r.operator {
                        RedirOp::Less => {
                            cur_in = StreamIO::file(Rc::clone(&self.vfs), self.cwd.clone(), text);
                        }
                        RedirOp::TLess => {
                            cur_in = StreamIO::from_bytes(format!("{text}\n").into_bytes());
                        }
                        RedirOp::Great | RedirOp::Clobber => {
                            self.vfs.borrow_mut().write(&self.cwd, &text, b"", OpenMode::WriteTruncate).map_err(BashboxError::from)?;
                            let s = StreamIO::file(Rc::clone(&self.vfs), self.cwd.clone(), text);
                            Self::assign_fd(fd, s, &mut cur_in, &mut cur_out, &mut cur_err);
                        }
                        RedirOp::DGreat => {
                            if !self.vfs.borrow().exists(&self.cwd, &text) {
                                self.vfs.borrow_mut().write(&self.cwd, &text, b"", OpenMode::WriteTruncate).map_err(BashboxError::from)?;
                            }
                            let s = StreamIO::file(Rc::clone(&self.vfs), self.cwd.clone(), text);
                            Self::assign_fd(fd, s, &mut cur_in, &mut cur_out, &mut cur_err);
                        }
                        RedirOp::LessGreat => {
                            if !self.vfs.borrow().exists(&self.cwd, &text) {
                                self.vfs.borrow_mut().write(&self.cwd, &text, b"", OpenMode::WriteTruncate).map_err(BashboxError::from)?;
                            }
                            let s = StreamIO::file(Rc::clone(&self.vfs), self.cwd.clone(), text);
                            cur_in = s.dup();
                        }
                        RedirOp::AndGreat | RedirOp::AndDGreat => {
                            if matches!(r.operator, RedirOp::AndGreat) || !self.vfs.borrow().exists(&self.cwd, &text) {
                                self.vfs.borrow_mut().write(&self.cwd, &text, b"", OpenMode::WriteTruncate).map_err(BashboxError::from)?;
                            }
                            let s = StreamIO::file(Rc::clone(&self.vfs), self.cwd.clone(), text);
                            cur_out = s.dup();
                            cur_err = s;
                        }
                        RedirOp::GreatAnd | RedirOp::LessAnd => {
                            // `>&name`/`<&name` where `name` isn't a bare fd
                            // digit (those parse as `FdAlias` instead) — rare
                            // in practice; treat as a plain file target.
                            let s = StreamIO::file(Rc::clone(&self.vfs), self.cwd.clone(), text);
                            Self::assign_fd(fd, s, &mut cur_in, &mut cur_out, &mut cur_err);
                        }
                        RedirOp::DLess | RedirOp::DLessDash => unreachable!("here-docs carry a HereDoc target"),
                    }
                }
            }
        }
        Ok((cur_in, cur_out, cur_err))
    }

    fn assign_fd(fd: i32, s: StreamIO, cur_in: &mut StreamIO, cur_out: &mut StreamIO, cur_err: &mut StreamIO) {
        match fd {
            0 => *cur_in = s,
            1 => *cur_out = s,
            2 => *cur_err = s,
            _ => {} // fds beyond 0/1/2 aren't exposed by the Command contract (spec §4.7).
        }
    }

    // -----------------------------------------------------------------
    // Compound commands
    // -----------------------------------------------------------------

    fn exec_compound_command(&mut self, c: &CompoundCommand, stdin: &StreamIO, stdout: &StreamIO, stderr: &StreamIO) -> Flow<i32> {
        match c {
            CompoundCommand::If(chain) => {
                let (i, o, e) = self.apply_redirections(&chain.redirections, stdin, stdout, stderr)?;
                for (cond, body) in &chain.clauses {
                    let status = self.exec_statement_list(cond, &i, &o, &e)?;
                    if status == 0 {
                        return self.exec_statement_list(body, &i, &o, &e);
                    }
                }
                if let Some(else_body) = &chain.else_body {
                    return self.exec_statement_list(else_body, &i, &o, &e);
                }
                Ok(0)
            }
            CompoundCommand::For(f) => {
                let (i, o, e) = self.apply_redirections(&f.redirections, stdin, stdout, stderr)?;
                let words = match &f.words {
                    Some(ws) => {
                        let mut out = Vec::new();
                        for w in ws {
                            out.extend(expand::expand_word(self, w)?);
                        }
                        out
                    }
                    None => self.positional.clone(),
                };
                let mut status = self.last_exit_status;
                let mut n = 0u64;
                for value in words {
                    n += 1;
                    if n > self.limits.max_loop_iterations {
                        return Err(Outcome::Error(BashboxError::LimitExceeded { kind: LimitKind::LoopIterations }));
                    }
                    self.check_budget()?;
                    self.scope.set_scalar(&f.variable, value);
                    match self.exec_statement_list(&f.body, &i, &o, &e) {
                        Ok(s) => status = s,
                        Err(Outcome::Signal(Signal::Break(k))) => {
                            if k > 1 {
                                return Err(Outcome::Signal(Signal::Break(k - 1)));
                            }
                            break;
                        }
                        Err(Outcome::Signal(Signal::Continue(k))) => {
                            if k > 1 {
                                return Err(Outcome::Signal(Signal::Continue(k - 1)));
                            }
                            continue;
                        }
                        other => return other,
                    }
                }
                Ok(status)
            }
            CompoundCommand::CFor(f) => {
                let (i, o, e) = self.apply_redirections(&f.redirections, stdin, stdout, stderr)?;
                if let Some(init) = &f.init {
                    crate::expand::arith::eval(init, &mut self.scope)?;
                }
                let mut status = self.last_exit_status;
                let mut n = 0u64;
                loop {
                    if let Some(cond) = &f.cond {
                        if crate::expand::arith::eval(cond, &mut self.scope)? == 0 {
                            break;
                        }
                    }
                    n += 1;
                    if n > self.limits.max_loop_iterations {
                        return Err(Outcome::Error(BashboxError::LimitExceeded { kind: LimitKind::LoopIterations }));
                    }
                    self.check_budget()?;
                    match self.exec_statement_list(&f.body, &i, &o, &e) {
                        Ok(s) => status = s,
                        Err(Outcome::Signal(Signal::Break(k))) => {
                            if k > 1 {
                                return Err(Outcome::Signal(Signal::Break(k - 1)));
                            }
                            break;
                        }
                        Err(Outcome::Signal(Signal::Continue(k))) => {
                            if k > 1 {
                                return Err(Outcome::Signal(Signal::Continue(k - 1)));
                            }
                        }
                        other => return other,
                    }
                    if let Some(step) = &f.step {
                        crate::expand::arith::eval(step, &mut self.scope)?;
                    }
                }
                Ok(status)
            }
            CompoundCommand::While(l) | CompoundCommand::Until(l) => {
                let until = matches!(c, CompoundCommand::Until(_));
                let (i, o, e) = self.apply_redirections(&l.redirections, stdin, stdout, stderr)?;
                let mut status = self.last_exit_status;
                let mut n = 0u64;
                loop {
                    let cond_status = self.exec_statement_list(&l.condition, &i, &o, &e)?;
                    let keep_going = if until { cond_status != 0 } else { cond_status == 0 };
                    if !keep_going {
                        break;
                    }
                    n += 1;
                    if n > self.limits.max_loop_iterations {
                        return Err(Outcome::Error(BashboxError::LimitExceeded { kind: LimitKind::LoopIterations }));
                    }
                    self.check_budget()?;
                    match self.exec_statement_list(&l.body, &i, &o, &e) {
                        Ok(s) => status = s,
                        Err(Outcome::Signal(Signal::Break(k))) => {
                            if k > 1 {
                                return Err(Outcome::Signal(Signal::Break(k - 1)));
                            }
                            break;
                        }
                        Err(Outcome::Signal(Signal::Continue(k))) => {
                            if k > 1 {
                                return Err(Outcome::Signal(Signal::Continue(k - 1)));
                            }
                            continue;
                        }
                        other => return other,
                    }
                }
                Ok(status)
            }
            CompoundCommand::Case(case) => {
                let (i, o, e) = self.apply_redirections(&case.redirections, stdin, stdout, stderr)?;
                let subject = expand::expand_word_to_string(self, &case.subject)?;
                let mut status = self.last_exit_status;
                let mut force = false;
                for item in &case.items {
                    if !force {
                        let mut hit = false;
                        for p in &item.patterns {
                            let pat = expand::expand_word_to_string(self, p)?;
                            if glob::glob_match(&pat, &subject) {
                                hit = true;
                                break;
                            }
                        }
                        if !hit {
                            continue;
                        }
                    }
                    status = self.exec_statement_list(&item.body, &i, &o, &e)?;
                    match item.terminator {
                        CaseTerminator::Stop => return Ok(status),
                        CaseTerminator::FallThrough => force = true,
                        CaseTerminator::TryNext => force = false,
                    }
                }
                Ok(status)
            }
            CompoundCommand::Subshell(block) => {
                let (i, o, e) = self.apply_redirections(&block.redirections, stdin, stdout, stderr)?;
                let mut child = self.fork_subshell();
                let result = child.exec_statement_list(&block.body, &i, &o, &e);
                self.absorb_subshell_signals(result)
            }
            CompoundCommand::Group(block) => {
                let (i, o, e) = self.apply_redirections(&block.redirections, stdin, stdout, stderr)?;
                self.exec_statement_list(&block.body, &i, &o, &e)
            }
            CompoundCommand::Arithmetic(expr, redirs) => {
                self.apply_redirections(redirs, stdin, stdout, stderr)?;
                let n = crate::expand::arith::eval(expr, &mut self.scope)?;
                Ok(if n != 0 { 0 } else { 1 })
            }
            CompoundCommand::Conditional(expr, redirs) => {
                self.apply_redirections(redirs, stdin, stdout, stderr)?;
                Ok(if self.eval_cond(expr)? { 0 } else { 1 })
            }
        }
    }

    /// A stray `break`/`continue`/`return`/`exit` inside `( … )` ends only
    /// the subshell, never the parent (real bash: `exit` inside a subshell
    /// terminates that subprocess, not the interactive shell around it).
    fn absorb_subshell_signals(&mut self, result: Flow<i32>) -> Flow<i32> {
        match result {
            Ok(s) => Ok(s),
            Err(Outcome::Signal(Signal::Exit(n))) => Ok(n),
            Err(Outcome::Signal(_)) => Ok(0),
            Err(e @ Outcome::Error(_)) => Err(e),
        }
    }

    // -----------------------------------------------------------------
    // `[[ … ]]` / `test` condition evaluation, shared by both surfaces
    // -----------------------------------------------------------------

    pub fn eval_cond(&mut self, expr: &CondExpr) -> Flow<bool> {
        Ok(match expr {
            CondExpr::Binary(op, l, r) => {
                let lv = expand::expand_word_to_string(self, l)?;
                let rv = expand::expand_word_to_string(self, r)?;
                self.eval_binary_test(*op, &lv, &rv)
            }
            CondExpr::Unary(op, w) => {
                let v = expand::expand_word_to_string(self, w)?;
                self.eval_unary_test(*op, &v)
            }
            CondExpr::Not(e) => !self.eval_cond(e)?,
            CondExpr::And(a, b) => self.eval_cond(a)? && self.eval_cond(b)?,
            CondExpr::Or(a, b) => self.eval_cond(a)? || self.eval_cond(b)?,
            CondExpr::Group(e) => self.eval_cond(e)?,
            CondExpr::Word(w) => !expand::expand_word_to_string(self, w)?.is_empty(),
        })
    }

    pub fn eval_unary_test(&mut self, op: CondUnaryOp, operand: &str) -> bool {
        let vfs = self.vfs.borrow();
        match op {
            CondUnaryOp::Exists => vfs.exists(&self.cwd, operand),
            CondUnaryOp::IsDir => vfs.stat(&self.cwd, operand).map(|i| i.is_dir()).unwrap_or(false),
            CondUnaryOp::IsRegular => vfs.stat(&self.cwd, operand).map(|i| i.is_file()).unwrap_or(false),
            CondUnaryOp::IsSymlink => vfs.lstat(&self.cwd, operand).map(|i| i.is_symlink()).unwrap_or(false),
            CondUnaryOp::IsSize => vfs.stat(&self.cwd, operand).map(|i| i.size() > 0).unwrap_or(false),
            CondUnaryOp::IsReadable => vfs.stat(&self.cwd, operand).map(|i| vfs.check_access(i, true, false, false).is_ok()).unwrap_or(false),
            CondUnaryOp::IsWritable => vfs.stat(&self.cwd, operand).map(|i| vfs.check_access(i, false, true, false).is_ok()).unwrap_or(false),
            CondUnaryOp::IsExecutable => vfs.stat(&self.cwd, operand).map(|i| vfs.check_access(i, false, false, true).is_ok()).unwrap_or(false),
            CondUnaryOp::StringLen => !operand.is_empty(),
            CondUnaryOp::StringZero => operand.is_empty(),
            CondUnaryOp::IsVarSet => self.scope.is_set(operand),
            CondUnaryOp::IsNameRef => self.scope.get(operand).map(|v| v.attrs.nameref).unwrap_or(false),
            // No OS-level meaning over an in-memory VFS with no ttys/sockets/setuid bits.
            CondUnaryOp::IsBlock
            | CondUnaryOp::IsChar
            | CondUnaryOp::IsSetGid
            | CondUnaryOp::IsSetUid
            | CondUnaryOp::IsSticky
            | CondUnaryOp::IsSocket
            | CondUnaryOp::IsTerminal => false,
        }
    }

    pub fn eval_binary_test(&mut self, op: CondBinOp, l: &str, r: &str) -> bool {
        match op {
            CondBinOp::StrEq | CondBinOp::StrEqEq => glob::glob_match(r, l),
            CondBinOp::StrNe => !glob::glob_match(r, l),
            CondBinOp::StrMatch => Regex::new(r).map(|re| re.is_match(l)).unwrap_or(false),
            CondBinOp::StrLt => l < r,
            CondBinOp::StrGt => l > r,
            CondBinOp::NumEq => self.to_i64(l) == self.to_i64(r),
            CondBinOp::NumNe => self.to_i64(l) != self.to_i64(r),
            CondBinOp::NumLt => self.to_i64(l) < self.to_i64(r),
            CondBinOp::NumLe => self.to_i64(l) <= self.to_i64(r),
            CondBinOp::NumGt => self.to_i64(l) > self.to_i64(r),
            CondBinOp::NumGe => self.to_i64(l) >= self.to_i64(r),
            CondBinOp::NewerThan => self.vfs_mtime(l) > self.vfs_mtime(r),
            CondBinOp::OlderThan => self.vfs_mtime(l) < self.vfs_mtime(r),
            CondBinOp::SameFile => {
                let vfs = self.vfs.borrow();
                matches!((vfs.resolve(&self.cwd, l), vfs.resolve(&self.cwd, r)), (Ok(a), Ok(b)) if a == b)
            }
        }
    }

    fn to_i64(&mut self, s: &str) -> i64 {
        crate::expand::arith::parse(s).and_then(|e| crate::expand::arith::eval(&e, &mut self.scope)).unwrap_or(0)
    }

    fn vfs_mtime(&self, path: &str) -> u64 {
        self.vfs.borrow().stat(&self.cwd, path).map(|i| i.mtime).unwrap_or(0)
    }
}

impl ExpansionHost for Evaluator {
    fn get_scalar(&mut self, name: &str) -> Option<String> {
        self.scope.get_scalar(name)
    }

    fn get_array_element(&mut self, name: &str, index: i64) -> Option<String> {
        self.scope.get_array_element(name, index)
    }

    fn get_assoc_element(&mut self, name: &str, key: &str) -> Option<String> {
        match &self.scope.get(name)?.value {
            Value::Assoc(m) => m.get(key).cloned(),
            _ => None,
        }
    }

    fn get_array_values(&mut self, name: &str) -> Vec<String> {
        if name == "@" || name == "*" {
            return self.positional.clone();
        }
        match self.scope.get(name).map(|v| &v.value) {
            Some(Value::Indexed(m)) => m.values().cloned().collect(),
            Some(Value::Assoc(m)) => m.values().cloned().collect(),
            Some(Value::Scalar(s)) => vec![s.clone()],
            None => vec![],
        }
    }

    fn get_array_keys(&mut self, name: &str) -> Vec<String> {
        if name == "@" || name == "*" {
            return (1..=self.positional.len()).map(|i| i.to_string()).collect();
        }
        match self.scope.get(name).map(|v| &v.value) {
            Some(Value::Indexed(m)) => m.keys().map(|k| k.to_string()).collect(),
            Some(Value::Assoc(m)) => m.keys().cloned().collect(),
            _ => vec![],
        }
    }

    fn is_set(&mut self, name: &str) -> bool {
        match name {
            "@" | "*" | "#" => true,
            n if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
                let i: usize = n.parse().unwrap_or(0);
                i >= 1 && i <= self.positional.len()
            }
            _ => self.scope.is_set(name),
        }
    }

    fn names_with_prefix(&mut self, prefix: &str) -> Vec<String> {
        self.scope.all_names().into_iter().filter(|n| n.starts_with(prefix)).collect()
    }

    fn assign_scalar(&mut self, name: &str, value: String) {
        self.scope.set_scalar(name, value);
    }

    fn var_attrs_flags(&mut self, name: &str) -> String {
        let Some(var) = self.scope.get(name) else { return String::new() };
        let mut flags = String::new();
        match &var.value {
            Value::Indexed(_) => flags.push('a'),
            Value::Assoc(_) => flags.push('A'),
            Value::Scalar(_) => {}
        }
        if var.attrs.integer {
            flags.push('i');
        }
        if var.attrs.readonly {
            flags.push('r');
        }
        if var.attrs.exported {
            flags.push('x');
        }
        if var.attrs.nameref {
            flags.push('n');
        }
        if var.attrs.lowercase {
            flags.push('l');
        }
        if var.attrs.uppercase {
            flags.push('u');
        }
        flags
    }

    fn declare_repr(&mut self, name: &str) -> String {
        let flags = self.var_attrs_flags(name);
        let dashes = if flags.is_empty() { "--".to_string() } else { format!("-{flags}") };
        let value = match self.scope.get(name).map(|v| &v.value) {
            Some(Value::Scalar(s)) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Some(Value::Indexed(m)) => {
                let items: Vec<String> = m.iter().map(|(k, v)| format!("[{k}]=\"{v}\"")).collect();
                format!("({})", items.join(" "))
            }
            Some(Value::Assoc(m)) => {
                let items: Vec<String> = m.iter().map(|(k, v)| format!("[{k}]=\"{v}\"")).collect();
                format!("({})", items.join(" "))
            }
            None => "\"\"".to_string(),
        };
        format!("declare {dashes} {name}={value}")
    }

    fn positional(&mut self) -> Vec<String> {
        self.positional.clone()
    }

    fn positional_count(&mut self) -> usize {
        self.positional.len()
    }

    fn arg0(&mut self) -> String {
        self.arg0.clone()
    }

    fn last_exit_status(&mut self) -> i32 {
        self.last_exit_status
    }

    fn last_bg_pid(&mut self) -> i32 {
        self.last_bg_pid
    }

    fn shell_pid(&mut self) -> i32 {
        1
    }

    fn shell_flags(&mut self) -> String {
        self.flags.as_dash_string()
    }

    fn ifs(&mut self) -> String {
        self.scope.get_scalar("IFS").unwrap_or_else(|| " \t\n".to_string())
    }

    fn nounset_enabled(&mut self) -> bool {
        self.flags.nounset
    }

    fn noglob_enabled(&mut self) -> bool {
        self.flags.noglob
    }

    fn globstar_enabled(&mut self) -> bool {
        self.flags.globstar
    }

    fn glob_policy(&mut self) -> GlobPolicy {
        if self.flags.failglob {
            GlobPolicy::Fail
        } else if self.flags.nullglob {
            GlobPolicy::Null
        } else {
            GlobPolicy::Pass
        }
    }

    fn lookup_user_home(&mut self, name: &str) -> Option<String> {
        self.users.get(name).cloned()
    }

    fn run_command_substitution(&mut self, script: &Script) -> Result<String, BashboxError> {
        let mut child = self.fork_subshell();
        let stdin = StreamIO::memory();
        let stdout = StreamIO::memory();
        let stderr = StreamIO::memory();
        let result = child.exec_script(script, &stdin, &stdout, &stderr);
        // §9 Open Question, resolved do-not-inherit: the substitution's own
        // failure doesn't trip the *caller's* `set -e`; only the exit
        // status of the simple command containing it does, computed
        // normally by whoever called us.
        match result {
            Ok(_) => {}
            Err(Outcome::Signal(_)) => {}
            Err(Outcome::Error(e)) => return Err(e),
        }
        let mut out = stdout.contents_as_string();
        while out.ends_with('\n') {
            out.pop();
        }
        Ok(out)
    }

    fn eval_arith(&mut self, expr: &crate::ast::ArithExpr) -> Result<i64, BashboxError> {
        crate::expand::arith::eval(expr, &mut self.scope)
    }

    fn glob_pathnames(&mut self, pattern: &str, globstar: bool, policy: GlobPolicy) -> Result<Vec<String>, String> {
        let vfs = self.vfs.borrow();
        glob::expand_pathname(&vfs, &self.cwd, pattern, globstar, policy)
    }

    fn cwd(&mut self) -> String {
        self.cwd.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::session::{Session, SessionConfig};

    fn run(script: &str) -> (String, i32) {
        let mut session = Session::new(SessionConfig::new()).unwrap();
        let result = session.run(script).unwrap();
        (result.stdout, result.exit_code)
    }

    #[test]
    fn errexit_does_not_fire_on_short_circuited_pipeline() {
        let (stdout, code) = run("set -e; false && echo unreachable; echo reached");
        assert_eq!(stdout, "reached\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn errexit_fires_on_last_executed_pipeline() {
        let (stdout, code) = run("set -e; true && false; echo unreachable");
        assert_eq!(stdout, "");
        assert_eq!(code, 1);
    }

    #[test]
    fn negated_pipeline_is_exempt_from_errexit() {
        // `! true` has nonzero status (negation flips 0 -> 1), but POSIX
        // exempts negated pipelines from triggering `errexit` regardless.
        let (stdout, code) = run("set -e; ! true; echo reached");
        assert_eq!(stdout, "reached\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn pipefail_reports_rightmost_nonzero_status() {
        let (_, code) = run("set -o pipefail; true | false | true; exit $?");
        assert_eq!(code, 1);
    }

    #[test]
    fn subshell_exit_does_not_escape_to_parent_loop() {
        let (stdout, code) = run("for i in 1 2 3; do (exit 1; echo never); echo $i; done");
        assert_eq!(stdout, "1\n2\n3\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn command_substitution_failure_does_not_trip_errexit() {
        let (stdout, code) = run("set -e; x=$(false); echo \"ok:$x\"");
        assert_eq!(stdout, "ok:\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn break_with_level_unwinds_multiple_loops() {
        let (stdout, code) = run("for i in 1 2; do for j in 1 2; do break 2; done; echo \"after:$i\"; done; echo done");
        assert_eq!(stdout, "done\n");
        assert_eq!(code, 0);
    }
}
