//! Reference utilities — spec §8 end-to-end scenarios need a handful of
//! real POSIX utilities to exist as in-process commands since bashbox
//! never spawns a subprocess. Not an attempt at a full coreutils; just
//! enough surface (`echo`, `printf`, `cat`, `tr`, `sort`, `wc`) to drive
//! pipelines end to end, built the same way the builtins are: plain `fn`
//! items registered into the same `CommandRegistry`.

use crate::eval::control::Flow;
use crate::eval::Evaluator;

use super::{CommandContext, CommandRegistry};

pub fn register_all(reg: &mut CommandRegistry) {
    reg.register("echo", echo);
    reg.register("printf", printf);
    reg.register("cat", cat);
    reg.register("tr", tr);
    reg.register("sort", sort);
    reg.register("wc", wc);
}

fn echo(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let mut args = &ctx.argv[1..];
    let mut no_newline = false;
    let mut interpret_escapes = false;
    while let Some(a) = args.first() {
        match a.as_str() {
            "-n" => { no_newline = true; args = &args[1..]; }
            "-e" => { interpret_escapes = true; args = &args[1..]; }
            "-E" => { interpret_escapes = false; args = &args[1..]; }
            _ => break,
        }
    }
    let joined = args.join(" ");
    let text = if interpret_escapes { interpret_backslash_escapes(&joined) } else { joined };
    ctx.print(&text);
    if !no_newline {
        ctx.print("\n");
    }
    Ok(0)
}

fn interpret_backslash_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => { out.push('\\'); out.push(other); }
            None => out.push('\\'),
        }
    }
    out
}

/// Supports the conversions spec §8's scenarios exercise: `%s`, `%d`,
/// `%%`, and a literal passthrough for anything else. The format string
/// recycles over remaining arguments the way POSIX `printf` does when
/// there are more operands than conversions.
fn printf(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let Some(fmt) = ctx.arg(1) else { return Ok(0) };
    let fmt = fmt.to_string();
    let operands = &ctx.argv[2..];
    let mut idx = 0usize;
    let mut out = String::new();
    loop {
        let start = idx;
        render_format(&fmt, operands, &mut idx, &mut out);
        if idx == start || idx >= operands.len() {
            break;
        }
    }
    if operands.is_empty() {
        idx = 0;
        render_format(&fmt, operands, &mut idx, &mut out);
    }
    ctx.print(&out);
    Ok(0)
}

fn render_format(fmt: &str, operands: &[String], idx: &mut usize, out: &mut String) {
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => { out.push_str(operands.get(*idx).map(|s| s.as_str()).unwrap_or("")); *idx += 1; }
            Some('d') | Some('i') => {
                let v = operands.get(*idx).and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0);
                out.push_str(&v.to_string());
                *idx += 1;
            }
            Some('b') => { out.push_str(&interpret_backslash_escapes(operands.get(*idx).map(|s| s.as_str()).unwrap_or(""))); *idx += 1; }
            Some(other) => { out.push('%'); out.push(other); }
            None => out.push('%'),
        }
    }
}

fn cat(ctx: &mut CommandContext, eval: &mut Evaluator) -> Flow<i32> {
    if ctx.argv.len() == 1 {
        let data = ctx.stdin.read_all();
        let _ = ctx.stdout.write(&data);
        return Ok(0);
    }
    let mut status = 0;
    for path in &ctx.argv[1..] {
        if path == "-" {
            let data = ctx.stdin.read_all();
            let _ = ctx.stdout.write(&data);
            continue;
        }
        match eval.vfs.borrow_mut().read(&eval.cwd, path) {
            Ok(bytes) => { let _ = ctx.stdout.write(&bytes); }
            Err(e) => { ctx.eprint(&format!("cat: {path}: {e}\n")); status = 1; }
        }
    }
    Ok(status)
}

fn tr(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let mut args = &ctx.argv[1..];
    let delete = args.first().map(|s| s.as_str()) == Some("-d");
    if delete {
        args = &args[1..];
    }
    let from: Vec<char> = args.first().map(|s| interpret_backslash_escapes(s).chars().collect()).unwrap_or_default();
    let to: Vec<char> = args.get(1).map(|s| interpret_backslash_escapes(s).chars().collect()).unwrap_or_default();
    let input = String::from_utf8_lossy(&ctx.stdin.read_all()).into_owned();
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if let Some(pos) = from.iter().position(|f| *f == c) {
            if delete {
                continue;
            }
            out.push(*to.get(pos).or_else(|| to.last()).unwrap_or(&c));
        } else {
            out.push(c);
        }
    }
    ctx.print(&out);
    Ok(0)
}

fn sort(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let reverse = ctx.argv[1..].iter().any(|a| a == "-r");
    let unique = ctx.argv[1..].iter().any(|a| a == "-u");
    let numeric = ctx.argv[1..].iter().any(|a| a == "-n");
    let input = String::from_utf8_lossy(&ctx.stdin.read_all()).into_owned();
    let mut lines: Vec<&str> = input.lines().collect();
    if numeric {
        lines.sort_by(|a, b| {
            let na: f64 = a.trim().parse().unwrap_or(0.0);
            let nb: f64 = b.trim().parse().unwrap_or(0.0);
            na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        lines.sort();
    }
    if reverse {
        lines.reverse();
    }
    if unique {
        lines.dedup();
    }
    for line in lines {
        ctx.print(line);
        ctx.print("\n");
    }
    Ok(0)
}

fn wc(ctx: &mut CommandContext, _eval: &mut Evaluator) -> Flow<i32> {
    let lines_only = ctx.argv[1..].iter().any(|a| a == "-l");
    let words_only = ctx.argv[1..].iter().any(|a| a == "-w");
    let bytes_only = ctx.argv[1..].iter().any(|a| a == "-c");
    let data = ctx.stdin.read_all();
    let text = String::from_utf8_lossy(&data);
    let lines = text.lines().count();
    let words = text.split_whitespace().count();
    let bytes = data.len();
    if lines_only {
        ctx.print(&format!("{lines}\n"));
    } else if words_only {
        ctx.print(&format!("{words}\n"));
    } else if bytes_only {
        ctx.print(&format!("{bytes}\n"));
    } else {
        ctx.print(&format!("{lines} {words} {bytes}\n"));
    }
    Ok(0)
}
