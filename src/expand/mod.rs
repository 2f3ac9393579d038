//! Word-expansion pipeline — spec §4.3. Each step is its own submodule;
//! `expand_word` drives them in the order the spec lists.
//!
//! Per-byte "quoted" state is carried through as `Segment` values all the
//! way to field splitting (spec §4.3 intro + §9 "Expansion pipeline") —
//! collapsing to a single un-annotated `String` earlier is exactly the bug
//! class the spec calls out.

pub mod arith;
pub mod brace;
pub mod glob;
pub mod param;
pub mod split;
pub mod tilde;

use crate::ast::{ArithExpr, Script, Word, WordPart};
use crate::error::BashboxError;

use self::glob::GlobPolicy;
use self::param::ParamResult;

/// One piece of a word's expansion, still tagged with whether it came from
/// a quoted region (so field splitting and globbing can skip it).
#[derive(Debug, Clone)]
pub enum Segment {
    Text(String, bool),
    /// Forces a field boundary regardless of IFS content — used for the
    /// per-element fields an unquoted/quoted `${arr[@]}` produces.
    FieldBreak,
}

/// Everything the expansion pipeline needs from the evaluator, without
/// creating a module cycle between `expand` and `eval`.
pub trait ExpansionHost {
    fn get_scalar(&mut self, name: &str) -> Option<String>;
    fn get_array_element(&mut self, name: &str, index: i64) -> Option<String>;
    fn get_assoc_element(&mut self, name: &str, key: &str) -> Option<String>;
    fn get_array_values(&mut self, name: &str) -> Vec<String>;
    fn get_array_keys(&mut self, name: &str) -> Vec<String>;
    fn is_set(&mut self, name: &str) -> bool;
    fn names_with_prefix(&mut self, prefix: &str) -> Vec<String>;
    fn assign_scalar(&mut self, name: &str, value: String);

    /// Attribute-flag letters for `${name@a}` (e.g. `"rx"`, `"a"`), empty if
    /// the variable has no attributes set.
    fn var_attrs_flags(&mut self, name: &str) -> String;
    /// `declare`-reproducing assignment string for `${name@A}`.
    fn declare_repr(&mut self, name: &str) -> String;

    fn positional(&mut self) -> Vec<String>;
    fn positional_count(&mut self) -> usize;
    fn arg0(&mut self) -> String;
    fn last_exit_status(&mut self) -> i32;
    fn last_bg_pid(&mut self) -> i32;
    fn shell_pid(&mut self) -> i32;
    fn shell_flags(&mut self) -> String;

    fn ifs(&mut self) -> String;
    fn nounset_enabled(&mut self) -> bool;
    fn noglob_enabled(&mut self) -> bool;
    fn globstar_enabled(&mut self) -> bool;
    fn glob_policy(&mut self) -> GlobPolicy;
    fn lookup_user_home(&mut self, name: &str) -> Option<String>;

    fn run_command_substitution(&mut self, script: &Script) -> Result<String, BashboxError>;
    fn eval_arith(&mut self, expr: &ArithExpr) -> Result<i64, BashboxError>;

    /// Matches `pattern` (spec §4.3 step 7) against the VFS rooted at the
    /// current cwd. Kept as a single host call rather than exposing `&Vfs`
    /// directly, since the VFS lives behind a `RefCell` shared with sibling
    /// subshells.
    fn glob_pathnames(&mut self, pattern: &str, globstar: bool, policy: GlobPolicy) -> Result<Vec<String>, String>;
    fn cwd(&mut self) -> String;
}

/// Full pipeline: brace -> (tilde/param/cmdsub/arith) -> field split ->
/// pathname expansion -> quote removal (quote removal is implicit: the
/// segments already hold final literal bytes).
pub fn expand_word(host: &mut dyn ExpansionHost, word: &Word) -> Result<Vec<String>, BashboxError> {
    let mut fields = Vec::new();
    for braced in brace::expand_braces(word) {
        let segments = expand_parts(host, &braced.parts, false)?;
        let ifs = host.ifs();
        for (text, unquoted) in split::split_fields(&segments, &ifs) {
            if unquoted && !host.noglob_enabled() && glob::has_glob_chars(&text) {
                let globstar = host.globstar_enabled();
                let policy = host.glob_policy();
                match host.glob_pathnames(&text, globstar, policy) {
                    Ok(matches) => fields.extend(matches),
                    Err(pattern) => {
                        return Err(BashboxError::Expansion(crate::error::ExpansionError::NoGlobMatch { pattern }))
                    }
                }
            } else {
                fields.push(text);
            }
        }
    }
    Ok(fields)
}

/// Expands a word to one flat string with no field splitting or globbing —
/// used for sub-words inside parameter-expansion operators (`${x:-word}`,
/// patterns, replacements) where a single value is wanted.
pub fn expand_word_to_string(host: &mut dyn ExpansionHost, word: &Word) -> Result<String, BashboxError> {
    let segments = expand_parts(host, &word.parts, false)?;
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Text(t, _) => out.push_str(&t),
            Segment::FieldBreak => {
                let ifs0 = host.ifs().chars().next().unwrap_or(' ');
                out.push(ifs0);
            }
        }
    }
    Ok(out)
}

fn expand_parts(host: &mut dyn ExpansionHost, parts: &[WordPart], in_double_quotes: bool) -> Result<Vec<Segment>, BashboxError> {
    let mut out = Vec::new();
    for part in parts {
        match part {
            WordPart::Literal(s) => out.push(Segment::Text(s.clone(), in_double_quotes)),
            WordPart::SingleQuoted(s) => out.push(Segment::Text(s.clone(), true)),
            WordPart::DoubleQuoted(inner) => {
                out.extend(expand_parts(host, inner, true)?);
            }
            WordPart::Tilde(name) => {
                if in_double_quotes {
                    out.push(Segment::Text(format!("~{}", name.clone().unwrap_or_default()), true));
                } else {
                    out.push(Segment::Text(tilde::expand_tilde(host, name.as_deref()), false));
                }
            }
            WordPart::Param(pe) => {
                let result = param::expand_param(host, pe, in_double_quotes)?;
                push_param_result(host, result, in_double_quotes, &mut out);
            }
            WordPart::CommandSub { script, .. } => {
                let text = host.run_command_substitution(script)?;
                out.push(Segment::Text(text, in_double_quotes));
            }
            WordPart::Arith(expr) => {
                let n = host.eval_arith(expr)?;
                out.push(Segment::Text(n.to_string(), in_double_quotes));
            }
            WordPart::Brace(_) => unreachable!("brace expansion runs before expand_parts"),
        }
    }
    Ok(out)
}

fn push_param_result(_host: &mut dyn ExpansionHost, result: ParamResult, quoted: bool, out: &mut Vec<Segment>) {
    match result {
        ParamResult::Scalar(s) => out.push(Segment::Text(s, quoted)),
        ParamResult::Fields(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(Segment::FieldBreak);
                }
                out.push(Segment::Text(item.clone(), quoted));
            }
        }
    }
}
