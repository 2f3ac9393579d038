//! The long-lived state container — spec §6.1. Owns the VFS, the
//! top-level `Evaluator`, and the run-wide cancellation/limit plumbing;
//! `run`/`exec` are the only two entry points an embedding host calls.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::commands::CommandRegistry;
use crate::error::BashboxError;
use crate::eval::control::{Outcome, Signal};
use crate::eval::{CancellationToken, Evaluator, Limits};
use crate::stream::StreamIO;
use crate::vfs::{OpenMode, Vfs};

/// Configuration a caller supplies when constructing a `Session` — spec
/// §6.1's option table, mirrored as a plain struct the way the teacher's
/// `BashOptions` is a plain struct rather than a builder.
#[derive(Default)]
pub struct SessionConfig {
    /// Initial VFS contents: absolute path -> file body bytes.
    pub files: IndexMap<String, Vec<u8>>,
    /// Initial environment: name -> value. All entries are exported.
    pub env: IndexMap<String, String>,
    /// Initial working directory; created if absent from `files`.
    pub cwd: String,
    /// Gate for the `curl` adapter (spec §4.6); the adapter itself is out
    /// of scope for this crate, so this only suppresses/allows a future
    /// host-registered `curl` command from seeing network access granted.
    pub network_enabled: bool,
    pub limits: Limits,
    /// Optional injection of additional utility commands, merged on top
    /// of the builtins and reference utilities already registered.
    pub command_registry: Option<CommandRegistry>,
}

impl SessionConfig {
    pub fn new() -> Self {
        SessionConfig { cwd: "/".to_string(), ..Default::default() }
    }
}

/// `{stdout, stderr, exit_code}` — spec §6.1.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub struct Session {
    vfs: Rc<RefCell<Vfs>>,
    env: IndexMap<String, String>,
    cwd: String,
    users: IndexMap<String, String>,
    limits: Limits,
    registry: CommandRegistry,
    network_enabled: bool,
    /// Carries state (functions, aliases, variables, shell options)
    /// across calls to `run`/`exec` — spec §6.1: "sessions are reusable".
    evaluator: Option<Evaluator>,
    busy: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, BashboxError> {
        let mut vfs = Vfs::new();
        vfs.max_bytes = config.limits.max_vfs_bytes;
        for (path, body) in &config.files {
            let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            let parent = if parent.is_empty() { "/" } else { parent };
            vfs.mkdir("/", parent, true).ok();
            vfs.write("/", path, body, OpenMode::WriteTruncate).map_err(BashboxError::from)?;
        }
        let cwd = if config.cwd.is_empty() { "/".to_string() } else { config.cwd.clone() };
        if !vfs.exists("/", &cwd) {
            vfs.mkdir("/", &cwd, true).map_err(BashboxError::from)?;
        }

        let registry = config.command_registry.unwrap_or_default();

        Ok(Session {
            vfs: Rc::new(RefCell::new(vfs)),
            env: config.env,
            cwd,
            users: IndexMap::new(),
            limits: config.limits,
            registry,
            network_enabled: config.network_enabled,
            evaluator: None,
            busy: false,
        })
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled
    }

    fn evaluator(&mut self) -> &mut Evaluator {
        if self.evaluator.is_none() {
            let mut ev = Evaluator::new(
                Rc::clone(&self.vfs),
                self.cwd.clone(),
                self.env.clone(),
                self.users.clone(),
                self.limits,
                CancellationToken::new(),
            );
            ev.registry = self.registry.clone();
            self.evaluator = Some(ev);
        }
        self.evaluator.as_mut().unwrap()
    }

    /// Synchronous entry point (spec §6.1). Rejects re-entrant calls
    /// (calling back into `run`/`exec` from a custom `Command` while one
    /// is already executing) with `BashboxError::Reentrant`.
    pub fn run(&mut self, script: &str) -> Result<RunResult, BashboxError> {
        self.exec_with_token(script, CancellationToken::new())
    }

    /// Same as `run`, but accepts a caller-supplied `CancellationToken` so
    /// a host can cancel a long-running script from another thread.
    pub fn exec(&mut self, script: &str, cancel: CancellationToken) -> Result<RunResult, BashboxError> {
        self.exec_with_token(script, cancel)
    }

    fn exec_with_token(&mut self, script: &str, cancel: CancellationToken) -> Result<RunResult, BashboxError> {
        if self.busy {
            return Err(BashboxError::Reentrant);
        }
        self.busy = true;
        let result = self.run_inner(script, cancel);
        self.busy = false;
        result
    }

    fn run_inner(&mut self, script: &str, cancel: CancellationToken) -> Result<RunResult, BashboxError> {
        let parsed = match crate::parser::parse(script) {
            Ok(s) => s,
            Err(e) => {
                return Ok(RunResult { stdout: String::new(), stderr: e.to_string(), exit_code: e.exit_code() });
            }
        };

        let stdin = StreamIO::memory();
        let stdout = StreamIO::memory();
        let stderr = StreamIO::memory();

        let ev = self.evaluator();
        ev.cancel_token_override(cancel);

        let outcome = ev.exec_script(&parsed, &stdin, &stdout, &stderr);
        let new_cwd = ev.cwd.clone();
        let last_exit_status = ev.last_exit_status;

        let exit_code = match outcome {
            Ok(status) => status,
            Err(Outcome::Signal(Signal::Exit(n))) => n,
            Err(Outcome::Signal(_)) => last_exit_status,
            Err(Outcome::Error(e)) => {
                let _ = stderr.write(e.to_string().as_bytes());
                let _ = stderr.write(b"\n");
                e.exit_code()
            }
        };

        self.cwd = new_cwd;

        Ok(RunResult { stdout: stdout.contents_as_string(), stderr: stderr.contents_as_string(), exit_code })
    }
}
