//! The 32 builtins spec §4.4 names explicitly. Each is a plain `fn` with
//! the `Command` signature — the blanket `impl<F: Fn(...)> Command for F`
//! in `commands::mod` lets a bare fn item register directly, the way the
//! teacher registers its own `CommandHandler` closures per builtin name.

use crate::error::{BashboxError, ExpansionError};
use crate::eval::control::{Flow, Outcome, Signal};
use crate::eval::scope::Value;
use crate::eval::Evaluator;

use super::{CommandContext, CommandRegistry};

/// Shared by every builtin that mutates a variable's value or removes it —
/// spec §3's "Readonly variables cannot be unset or reassigned", matching
/// the teacher's `check_readonly_error`.
fn check_readonly(eval: &Evaluator, command: &str, name: &str) -> Flow<()> {
    if eval.scope.is_readonly(name) {
        return Err(Outcome::Error(BashboxError::Expansion(ExpansionError::ParameterError {
            name: name.to_string(),
            message: format!("{command}: readonly variable"),
        })));
    }
    Ok(())
}

pub const NAMES: &[&str] = &[
    ":", ".", "[", "alias", "break", "builtin", "cd", "command", "continue", "declare", "eval", "exec", "exit",
    "export", "false", "let", "local", "mapfile", "readarray", "readonly", "return", "set", "shift", "shopt",
    "source", "test", "true", "type", "typeset", "unalias", "unset", "wait",
];

pub fn register_all(reg: &mut CommandRegistry) {
    reg.register(":", noop);
    reg.register(".", dot_source);
    reg.register("[", bracket_test);
    reg.register("alias", alias);
    reg.register("break", break_cmd);
    reg.register("builtin", builtin);
    reg.register("cd", cd);
    reg.register("command", command);
    reg.register("continue", continue_cmd);
    reg.register("declare", declare);
    reg.register("eval", eval_cmd);
    reg.register("exec", exec_cmd);
    reg.register("exit", exit_cmd);
    reg.register("export", export);
    reg.register("false", false_cmd);
    reg.register("let", let_cmd);
    reg.register("local", local);
    reg.register("mapfile", mapfile);
    reg.register("readarray", mapfile);
    reg.register("readonly", readonly);
    reg.register("return", return_cmd);
    reg.register("set", set_cmd);
    reg.register("shift", shift);
    reg.register("shopt", shopt);
    reg.register("source", dot_source);
    reg.register("test", test_cmd);
    reg.register("true", true_cmd);
    reg.register("type", type_cmd);
    reg.register("typeset", declare);
    reg.register("unalias", unalias);
    reg.register("unset", unset);
    reg.register("wait", wait);
}

fn noop(_ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    Ok(0)
}

fn true_cmd(_ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    Ok(0)
}

fn false_cmd(_ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    Ok(1)
}

fn break_cmd(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let n: u32 = ctx.arg(1).and_then(|s| s.parse().ok()).unwrap_or(1).max(1);
    Err(Outcome::Signal(Signal::Break(n)))
}

fn continue_cmd(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let n: u32 = ctx.arg(1).and_then(|s| s.parse().ok()).unwrap_or(1).max(1);
    Err(Outcome::Signal(Signal::Continue(n)))
}

fn return_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let n: i32 = ctx.arg(1).and_then(|s| s.parse().ok()).unwrap_or(eval.last_exit_status);
    Err(Outcome::Signal(Signal::Return(n)))
}

fn exit_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let n: i32 = ctx.arg(1).and_then(|s| s.parse().ok()).unwrap_or(eval.last_exit_status);
    Err(Outcome::Signal(Signal::Exit(n)))
}

/// No subprocess to replace, so `exec cmd …` just runs `cmd` and ends the
/// script with its status — the closest in-process analogue to process
/// replacement. `exec` with only redirections (no command word) is a no-op.
fn exec_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    if ctx.argv.len() <= 1 {
        return Ok(0);
    }
    let argv = ctx.argv[1..].to_vec();
    let status = eval.dispatch_argv(argv, ctx.stdin.clone(), ctx.stdout.clone(), ctx.stderr.clone())?;
    Err(Outcome::Signal(Signal::Exit(status)))
}

fn cd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let target = match ctx.arg(1) {
        Some(t) => t.to_string(),
        None => eval.scope.get_scalar("HOME").unwrap_or_else(|| "/".to_string()),
    };
    let new_cwd = crate::vfs::Vfs::normalize(&eval.cwd, &target);
    let is_dir = eval.vfs.borrow().stat(&eval.cwd, &target).map(|i| i.is_dir()).unwrap_or(false);
    if !is_dir {
        ctx.eprint(&format!("bashbox: cd: {target}: No such file or directory\n"));
        return Ok(1);
    }
    let old = eval.cwd.clone();
    eval.cwd = new_cwd;
    eval.scope.set_scalar("OLDPWD", old);
    eval.scope.set_scalar("PWD", eval.cwd.clone());
    Ok(0)
}

fn alias(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    if ctx.argv.len() == 1 {
        for (name, value) in &eval.aliases {
            ctx.print(&format!("alias {name}='{value}'\n"));
        }
        return Ok(0);
    }
    for arg in &ctx.argv[1..] {
        if let Some((name, value)) = arg.split_once('=') {
            eval.aliases.insert(name.to_string(), value.to_string());
        } else if let Some(value) = eval.aliases.get(arg) {
            ctx.print(&format!("alias {arg}='{value}'\n"));
        } else {
            ctx.eprint(&format!("bashbox: alias: {arg}: not found\n"));
            return Ok(1);
        }
    }
    Ok(0)
}

fn unalias(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    if ctx.arg(1) == Some("-a") {
        eval.aliases.clear();
        return Ok(0);
    }
    for name in &ctx.argv[1..] {
        eval.aliases.shift_remove(name);
    }
    Ok(0)
}

/// Bypasses function lookup: looks the name up directly in the registry.
fn builtin(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let Some(name) = ctx.arg(1) else { return Ok(0) };
    let Some(cmd) = eval.registry.get(name) else {
        ctx.eprint(&format!("bashbox: builtin: {name}: not a shell builtin\n"));
        return Ok(1);
    };
    let mut inner = CommandContext { argv: &ctx.argv[1..], stdin: ctx.stdin.clone(), stdout: ctx.stdout.clone(), stderr: ctx.stderr.clone() };
    cmd.invoke(&mut inner, eval)
}

/// `command [-v] name args…` — runs `name` as a utility/builtin, skipping
/// function lookup (the POSIX "command" contract); `-v` just reports how
/// the name would resolve.
fn command(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut rest = &ctx.argv[1..];
    let verbose = rest.first().map(|s| s.as_str()) == Some("-v");
    if verbose {
        rest = &rest[1..];
    }
    let Some(name) = rest.first() else { return Ok(0) };
    if verbose {
        if eval.registry.contains(name) {
            ctx.print(&format!("{name}\n"));
            return Ok(0);
        }
        ctx.eprint(&format!("bashbox: command: {name}: not found\n"));
        return Ok(1);
    }
    if let Some(cmd) = eval.registry.get(name) {
        let mut inner = CommandContext { argv: rest, stdin: ctx.stdin.clone(), stdout: ctx.stdout.clone(), stderr: ctx.stderr.clone() };
        return cmd.invoke(&mut inner, eval);
    }
    ctx.eprint(&format!("bashbox: {name}: command not found\n"));
    Ok(127)
}

fn dot_source(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let Some(path) = ctx.arg(1) else {
        ctx.eprint("bashbox: .: filename argument required\n");
        return Ok(2);
    };
    let bytes = match eval.vfs.borrow_mut().read(&eval.cwd, path) {
        Ok(b) => b,
        Err(e) => {
            ctx.eprint(&format!("bashbox: {path}: {e}\n"));
            return Ok(1);
        }
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let script = crate::parser::parse(&text)?;
    eval.exec_in_current_scope(&script, &ctx.stdin, &ctx.stdout, &ctx.stderr)
}

fn eval_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let text = ctx.argv[1..].join(" ");
    if text.is_empty() {
        return Ok(0);
    }
    let script = crate::parser::parse(&text)?;
    eval.exec_in_current_scope(&script, &ctx.stdin, &ctx.stdout, &ctx.stderr)
}

fn export(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    if ctx.argv.len() == 1 {
        for (name, value) in eval.exported_env() {
            ctx.print(&format!("declare -x {name}=\"{value}\"\n"));
        }
        return Ok(0);
    }
    for arg in &ctx.argv[1..] {
        let name = if let Some((n, v)) = arg.split_once('=') {
            check_readonly(eval, "export", n)?;
            eval.scope.set_scalar(n, v.to_string());
            n.to_string()
        } else {
            arg.clone()
        };
        eval.scope.set_attrs(&name, |a| a.exported = true);
    }
    Ok(0)
}

fn readonly(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    for arg in &ctx.argv[1..] {
        let name = if let Some((n, v)) = arg.split_once('=') {
            check_readonly(eval, "readonly", n)?;
            eval.scope.set_scalar(n, v.to_string());
            n.to_string()
        } else {
            arg.clone()
        };
        eval.scope.set_attrs(&name, |a| a.readonly = true);
    }
    Ok(0)
}

fn local(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    for arg in &ctx.argv[1..] {
        if let Some((name, value)) = arg.split_once('=') {
            eval.scope.declare_local(name, Some(Value::Scalar(value.to_string())));
        } else {
            eval.scope.declare_local(arg, None);
        }
    }
    Ok(0)
}

fn declare(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut want_export = false;
    let mut want_readonly = false;
    let mut want_integer = false;
    let mut want_array = false;
    let mut want_assoc = false;
    let mut args = ctx.argv[1..].iter().peekable();
    while let Some(a) = args.peek() {
        if let Some(flags) = a.strip_prefix('-') {
            if flags.is_empty() || flags.starts_with('-') {
                break;
            }
            for c in flags.chars() {
                match c {
                    'x' => want_export = true,
                    'r' => want_readonly = true,
                    'i' => want_integer = true,
                    'a' => want_array = true,
                    'A' => want_assoc = true,
                    _ => {}
                }
            }
            args.next();
        } else {
            break;
        }
    }
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (arg.clone(), None),
        };
        if value.is_some() || want_array || want_assoc {
            check_readonly(eval, "declare", &name)?;
        }
        if want_array {
            eval.scope.set_value(&name, Value::Indexed(indexmap::IndexMap::new()));
        } else if want_assoc {
            eval.scope.set_value(&name, Value::Assoc(indexmap::IndexMap::new()));
        } else if let Some(v) = value {
            eval.scope.set_scalar(&name, v);
        } else if !eval.scope.is_set(&name) {
            eval.scope.set_scalar(&name, String::new());
        }
        eval.scope.set_attrs(&name, |a| {
            if want_export {
                a.exported = true;
            }
            if want_readonly {
                a.readonly = true;
            }
            if want_integer {
                a.integer = true;
            }
        });
    }
    Ok(0)
}

fn unset(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut functions_only = false;
    let mut names = &ctx.argv[1..];
    if names.first().map(|s| s.as_str()) == Some("-f") {
        functions_only = true;
        names = &names[1..];
    } else if names.first().map(|s| s.as_str()) == Some("-v") {
        names = &names[1..];
    }
    for name in names {
        if functions_only {
            eval.functions.shift_remove(name);
        } else {
            check_readonly(eval, "unset", name)?;
            eval.scope.unset(name);
            eval.functions.shift_remove(name);
        }
    }
    Ok(0)
}

fn shift(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let n: usize = ctx.arg(1).and_then(|s| s.parse().ok()).unwrap_or(1);
    if n > eval.positional.len() {
        return Ok(1);
    }
    eval.positional.drain(0..n);
    Ok(0)
}

fn set_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut i = 1;
    let mut saw_dashdash = false;
    while i < ctx.argv.len() {
        let a = &ctx.argv[i];
        if !saw_dashdash && a == "--" {
            saw_dashdash = true;
            i += 1;
            continue;
        }
        if !saw_dashdash && a == "-o" {
            i += 1;
            if let Some(opt) = ctx.argv.get(i) {
                apply_set_o(eval, opt, true);
            }
            i += 1;
            continue;
        }
        if !saw_dashdash && a == "+o" {
            i += 1;
            if let Some(opt) = ctx.argv.get(i) {
                apply_set_o(eval, opt, false);
            }
            i += 1;
            continue;
        }
        if !saw_dashdash && (a.starts_with('-') || a.starts_with('+')) && a.len() > 1 {
            let enable = a.starts_with('-');
            for c in a[1..].chars() {
                apply_set_flag(eval, c, enable);
            }
            i += 1;
            continue;
        }
        break;
    }
    if i < ctx.argv.len() {
        eval.positional = ctx.argv[i..].to_vec();
    }
    Ok(0)
}

fn apply_set_flag(eval: &mut Evaluator, c: char, enable: bool) {
    match c {
        'e' => eval.flags.errexit = enable,
        'u' => eval.flags.nounset = enable,
        'x' => eval.flags.xtrace = enable,
        'f' => eval.flags.noglob = enable,
        'n' => eval.flags.noexec = enable,
        _ => {}
    }
}

fn apply_set_o(eval: &mut Evaluator, opt: &str, enable: bool) {
    match opt {
        "errexit" => eval.flags.errexit = enable,
        "nounset" => eval.flags.nounset = enable,
        "xtrace" => eval.flags.xtrace = enable,
        "noglob" => eval.flags.noglob = enable,
        "noexec" => eval.flags.noexec = enable,
        "pipefail" => eval.flags.pipefail = enable,
        _ => {}
    }
}

fn shopt(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut enable = true;
    let mut names = &ctx.argv[1..];
    match names.first().map(|s| s.as_str()) {
        Some("-s") => {
            enable = true;
            names = &names[1..];
        }
        Some("-u") => {
            enable = false;
            names = &names[1..];
        }
        _ => {}
    }
    for name in names {
        match name.as_str() {
            "globstar" => eval.flags.globstar = enable,
            "nullglob" => eval.flags.nullglob = enable,
            "failglob" => eval.flags.failglob = enable,
            _ => {}
        }
    }
    Ok(0)
}

fn let_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut result = 0i64;
    for arg in &ctx.argv[1..] {
        let expr = crate::expand::arith::parse(arg)?;
        result = crate::expand::arith::eval(&expr, &mut eval.scope)?;
    }
    Ok(if result != 0 { 0 } else { 1 })
}

fn mapfile(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut strip_newline = false;
    let mut rest = &ctx.argv[1..];
    if rest.first().map(|s| s.as_str()) == Some("-t") {
        strip_newline = true;
        rest = &rest[1..];
    }
    let name = rest.first().cloned().unwrap_or_else(|| "MAPFILE".to_string());
    let text = String::from_utf8_lossy(&ctx.stdin.read_all()).into_owned();
    let mut m = indexmap::IndexMap::new();
    for (i, mut line) in text.lines().map(|s| s.to_string()).enumerate() {
        if !strip_newline {
            line.push('\n');
        }
        m.insert(i as i64, line);
    }
    eval.scope.set_value(&name, Value::Indexed(m));
    Ok(0)
}

fn type_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut status = 0;
    for name in &ctx.argv[1..] {
        if eval.functions.contains_key(name) {
            ctx.print(&format!("{name} is a function\n"));
        } else if eval.registry.is_builtin(name) {
            ctx.print(&format!("{name} is a shell builtin\n"));
        } else if eval.registry.contains(name) {
            ctx.print(&format!("{name} is a utility\n"));
        } else {
            ctx.print(&format!("bashbox: type: {name}: not found\n"));
            status = 1;
        }
    }
    Ok(status)
}

fn wait(_ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    // No job control (spec Non-goals) — nothing ever runs in the background
    // for real, so there is never anything to wait for.
    Ok(0)
}

fn bracket_test(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    let mut args = ctx.argv[1..].to_vec();
    if args.last().map(|s| s.as_str()) != Some("]") {
        ctx.eprint("bashbox: [: missing closing ']'\n");
        return Ok(2);
    }
    args.pop();
    Ok(run_test(&args, eval))
}

fn test_cmd(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    Ok(run_test(&ctx.argv[1..], eval))
}

fn run_test(args: &[String], eval: &mut Evaluator) -> i32 {
    match args.len() {
        0 => 1,
        1 => if args[0].is_empty() { 1 } else { 0 },
        2 if args[0] == "!" => if args[1].is_empty() { 0 } else { 1 },
        2 => match unary_op(&args[0]) {
            Some(op) => if eval.eval_unary_test(op, &args[1]) { 0 } else { 1 },
            None => 2,
        },
        3 if args[0] == "!" => {
            let inner = run_test(&args[1..], eval);
            if inner == 0 { 1 } else { 0 }
        }
        3 => match binary_op(&args[1]) {
            Some(op) => if eval.eval_binary_test(op, &args[0], &args[2]) { 0 } else { 1 },
            None => 2,
        },
        _ => 2,
    }
}

fn unary_op(s: &str) -> Option<crate::ast::CondUnaryOp> {
    use crate::ast::CondUnaryOp::*;
    Some(match s {
        "-e" => Exists,
        "-d" => IsDir,
        "-f" => IsRegular,
        "-L" | "-h" => IsSymlink,
        "-s" => IsSize,
        "-r" => IsReadable,
        "-w" => IsWritable,
        "-x" => IsExecutable,
        "-n" => StringLen,
        "-z" => StringZero,
        "-v" => IsVarSet,
        "-b" => IsBlock,
        "-c" => IsChar,
        "-p" => IsSocket,
        "-S" => IsSocket,
        "-t" => IsTerminal,
        "-u" => IsSetUid,
        "-g" => IsSetGid,
        "-k" => IsSticky,
        _ => return None,
    })
}

fn binary_op(s: &str) -> Option<crate::ast::CondBinOp> {
    use crate::ast::CondBinOp::*;
    Some(match s {
        "=" | "==" => StrEqEq,
        "!=" => StrNe,
        "<" => StrLt,
        ">" => StrGt,
        "-eq" => NumEq,
        "-ne" => NumNe,
        "-lt" => NumLt,
        "-le" => NumLe,
        "-gt" => NumGt,
        "-ge" => NumGe,
        "-nt" => NewerThan,
        "-ot" => OlderThan,
        "-ef" => SameFile,
        _ => return None,
    })
}
