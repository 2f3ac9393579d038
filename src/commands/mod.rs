//! Command dispatch — spec §4.7.
//!
//! Every command, builtin or reference utility, implements one call
//! contract: `invoke(ctx, eval) -> exit_code`. Builtins take `&mut
//! Evaluator` because only they may mutate session state (cwd, env,
//! functions, shell options, aliases); utilities in `reference_utils`
//! mostly ignore it. Flow-control builtins (`return`, `exit`, `break`,
//! `continue`) escape via `Outcome::Signal` rather than an exit code —
//! the one place this engine lets a "command" raise instead of returning a
//! status, matching how the teacher's own builtins produce
//! `InterpreterError::{Return,Exit,Break,Continue}`.

pub mod builtins;
pub mod reference_utils;

use indexmap::IndexMap;
use std::rc::Rc;

use crate::eval::control::Flow;
use crate::eval::Evaluator;
use crate::stream::StreamIO;

pub struct CommandContext<'a> {
    pub argv: &'a [String],
    pub stdin: StreamIO,
    pub stdout: StreamIO,
    pub stderr: StreamIO,
}

impl<'a> CommandContext<'a> {
    pub fn arg(&self, n: usize) -> Option<&str> {
        self.argv.get(n).map(|s| s.as_str())
    }

    pub fn print(&self, s: &str) {
        let _ = self.stdout.write(s.as_bytes());
    }

    pub fn eprint(&self, s: &str) {
        let _ = self.stderr.write(s.as_bytes());
    }
}

pub trait Command {
    fn invoke(&self, ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32>;
}

impl<F> Command for F
where
    F: Fn(&mut CommandContext, &mut Evaluator) -> Flow<i32>,
{
    fn invoke(&self, ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
        self(ctx, eval)
    }
}

/// Name -> callable table. Cloning only bumps `Rc` refcounts, so a subshell
/// can cheaply carry its own copy that `register`/overrides never leak back
/// out of (spec §4.4 subshell isolation applies to the registry too: a
/// function overriding a builtin name inside `( … )` shouldn't survive it).
#[derive(Clone)]
pub struct CommandRegistry {
    commands: IndexMap<String, Rc<dyn Command>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut reg = CommandRegistry { commands: IndexMap::new() };
        builtins::register_all(&mut reg);
        reference_utils::register_all(&mut reg);
        reg
    }
}

impl CommandRegistry {
    pub fn register(&mut self, name: impl Into<String>, cmd: impl Command + 'static) {
        self.commands.insert(name.into(), Rc::new(cmd));
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        builtins::NAMES.contains(&name)
    }
}
