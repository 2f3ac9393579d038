//! Parameter & variable expansion — spec §4.3 step 3.

use super::glob::{glob_match, pattern_to_regex};
use super::ExpansionHost;
use crate::ast::{ParamExpansion, ParamOp, PatternAnchor, TransformOp, Word};
use crate::error::{BashboxError, ExpansionError};

pub enum ParamResult {
    Scalar(String),
    /// One entry per array element / matched name — caller decides whether
    /// these stay distinct fields (unquoted/`"${a[@]}"`) or get joined.
    Fields(Vec<String>),
}

pub fn expand_param(host: &mut dyn ExpansionHost, pe: &ParamExpansion, quoted: bool) -> Result<ParamResult, BashboxError> {
    if let Some(ParamOp::ArrayKeys { star }) = &pe.op {
        let keys = host.get_array_keys(&pe.name);
        return Ok(join_or_fields(keys, *star, host));
    }
    if let Some(ParamOp::NamesWithPrefix { star }) = &pe.op {
        let names = host.names_with_prefix(&pe.name);
        return Ok(join_or_fields(names, *star, host));
    }

    let current = read_value(host, pe)?;

    match &pe.op {
        None => Ok(scalar_or_fields(current, host)),
        Some(ParamOp::Length) => {
            let n = match &current {
                ValueKind::Missing => 0,
                ValueKind::Scalar(s) => s.chars().count(),
                ValueKind::Array(items) => items.len(),
            };
            Ok(ParamResult::Scalar(n.to_string()))
        }
        Some(ParamOp::DefaultValue { word, on_unset_only }) => {
            if should_use_alt(&current, *on_unset_only, false) {
                Ok(ParamResult::Scalar(expand_word_flat(host, word)?))
            } else {
                Ok(scalar_or_fields(current, host))
            }
        }
        Some(ParamOp::AssignDefault { word, on_unset_only }) => {
            if should_use_alt(&current, *on_unset_only, false) {
                let value = expand_word_flat(host, word)?;
                host.assign_scalar(&pe.name, value.clone());
                Ok(ParamResult::Scalar(value))
            } else {
                Ok(scalar_or_fields(current, host))
            }
        }
        Some(ParamOp::ErrorIfUnset { word, on_unset_only }) => {
            if should_use_alt(&current, *on_unset_only, false) {
                let message = match word {
                    Some(w) => expand_word_flat(host, w)?,
                    None => "parameter null or not set".to_string(),
                };
                Err(BashboxError::Expansion(ExpansionError::ParameterError { name: pe.name.clone(), message }))
            } else {
                Ok(scalar_or_fields(current, host))
            }
        }
        Some(ParamOp::UseAlternative { word, on_unset_only }) => {
            if should_use_alt(&current, *on_unset_only, true) {
                Ok(ParamResult::Scalar(expand_word_flat(host, word)?))
            } else {
                Ok(ParamResult::Scalar(String::new()))
            }
        }
        Some(ParamOp::Substring { offset, length }) => {
            let s = value_to_string(&current);
            let chars: Vec<char> = s.chars().collect();
            let off = host.eval_arith(offset)?;
            let start = normalize_offset(off, chars.len());
            let end = match length {
                None => chars.len(),
                Some(l) => {
                    let len = host.eval_arith(l)?;
                    if len < 0 {
                        normalize_offset(chars.len() as i64 + len, chars.len())
                    } else {
                        (start + len as usize).min(chars.len())
                    }
                }
            };
            let text: String = if start < end { chars[start..end].iter().collect() } else { String::new() };
            Ok(ParamResult::Scalar(text))
        }
        Some(ParamOp::RemovePrefix { pattern, greedy }) => {
            let s = value_to_string(&current);
            let pat = expand_word_flat(host, pattern)?;
            Ok(ParamResult::Scalar(remove_prefix(&s, &pat, *greedy)))
        }
        Some(ParamOp::RemoveSuffix { pattern, greedy }) => {
            let s = value_to_string(&current);
            let pat = expand_word_flat(host, pattern)?;
            Ok(ParamResult::Scalar(remove_suffix(&s, &pat, *greedy)))
        }
        Some(ParamOp::Replace { pattern, replacement, all, anchor }) => {
            let s = value_to_string(&current);
            let pat = expand_word_flat(host, pattern)?;
            let rep = match replacement {
                Some(w) => expand_word_flat(host, w)?,
                None => String::new(),
            };
            Ok(ParamResult::Scalar(replace(&s, &pat, &rep, *all, *anchor)))
        }
        Some(ParamOp::CaseModify { upper, all, pattern }) => {
            let s = value_to_string(&current);
            let pat = match pattern {
                Some(w) => Some(expand_word_flat(host, w)?),
                None => None,
            };
            Ok(ParamResult::Scalar(case_modify(&s, *upper, *all, pat.as_deref())))
        }
        Some(ParamOp::Indirect) => {
            let target_name = value_to_string(&current);
            let target_pe = ParamExpansion { name: target_name, index: None, op: None };
            expand_param(host, &target_pe, quoted)
        }
        Some(ParamOp::Transform(TransformOp::Q)) => Ok(ParamResult::Scalar(shell_quote(&value_to_string(&current)))),
        Some(ParamOp::Transform(TransformOp::E)) => Ok(ParamResult::Scalar(unescape_ansi_c(&value_to_string(&current)))),
        Some(ParamOp::Transform(TransformOp::LowerA)) => Ok(ParamResult::Scalar(host.var_attrs_flags(&pe.name))),
        Some(ParamOp::Transform(TransformOp::A)) => Ok(ParamResult::Scalar(host.declare_repr(&pe.name))),
        Some(ParamOp::Transform(TransformOp::P)) => Err(BashboxError::Expansion(ExpansionError::BadSubstitution(format!(
            "{}: @P prompt-string expansion has no interactive prompt to expand",
            pe.name
        )))),
        Some(ParamOp::ArrayKeys { .. }) | Some(ParamOp::NamesWithPrefix { .. }) => unreachable!("handled above"),
    }
}

enum ValueKind {
    Missing,
    Scalar(String),
    Array(Vec<String>),
}

fn value_to_string(v: &ValueKind) -> String {
    match v {
        ValueKind::Missing => String::new(),
        ValueKind::Scalar(s) => s.clone(),
        ValueKind::Array(items) => items.first().cloned().unwrap_or_default(),
    }
}

fn read_value(host: &mut dyn ExpansionHost, pe: &ParamExpansion) -> Result<ValueKind, BashboxError> {
    let sigil = pe.index.as_ref().and_then(|w| literal_text(w));
    match sigil.as_deref() {
        Some("@") | Some("*") => {
            if !host.is_set(&pe.name) && pe.name != "@" && pe.name != "*" {
                return Ok(ValueKind::Missing);
            }
            Ok(ValueKind::Array(host.get_array_values(&pe.name)))
        }
        _ => {
            if let Some(name) = &pe.index {
                let idx_text = expand_word_flat(host, name)?;
                if let Ok(i) = idx_text.parse::<i64>() {
                    return Ok(match host.get_array_element(&pe.name, i) {
                        Some(s) => ValueKind::Scalar(s),
                        None => ValueKind::Missing,
                    });
                }
                return Ok(match host.get_assoc_element(&pe.name, &idx_text) {
                    Some(s) => ValueKind::Scalar(s),
                    None => ValueKind::Missing,
                });
            }
            match pe.name.as_str() {
                "@" | "*" => Ok(ValueKind::Array(host.positional())),
                "#" => Ok(ValueKind::Scalar(host.positional_count().to_string())),
                "?" => Ok(ValueKind::Scalar(host.last_exit_status().to_string())),
                "$" => Ok(ValueKind::Scalar(host.shell_pid().to_string())),
                "!" => Ok(ValueKind::Scalar(host.last_bg_pid().to_string())),
                "-" => Ok(ValueKind::Scalar(host.shell_flags())),
                "0" => Ok(ValueKind::Scalar(host.arg0())),
                n if n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty() => {
                    let idx: usize = n.parse().unwrap_or(0);
                    Ok(host.positional().get(idx.saturating_sub(1)).cloned().map(ValueKind::Scalar).unwrap_or(ValueKind::Missing))
                }
                _ => {
                    if !host.is_set(&pe.name) {
                        if host.nounset_enabled() && pe.op.is_none() {
                            return Err(BashboxError::Expansion(ExpansionError::UnboundVariable { name: pe.name.clone() }));
                        }
                        return Ok(ValueKind::Missing);
                    }
                    Ok(host.get_scalar(&pe.name).map(ValueKind::Scalar).unwrap_or(ValueKind::Missing))
                }
            }
        }
    }
}

fn literal_text(w: &Word) -> Option<String> {
    if let [crate::ast::WordPart::Literal(s)] = w.parts.as_slice() {
        Some(s.clone())
    } else {
        None
    }
}

fn scalar_or_fields(v: ValueKind, _host: &mut dyn ExpansionHost) -> ParamResult {
    match v {
        ValueKind::Missing => ParamResult::Scalar(String::new()),
        ValueKind::Scalar(s) => ParamResult::Scalar(s),
        ValueKind::Array(items) => ParamResult::Fields(items),
    }
}

fn join_or_fields(items: Vec<String>, star: bool, host: &mut dyn ExpansionHost) -> ParamResult {
    if star {
        let sep = host.ifs().chars().next().unwrap_or(' ').to_string();
        ParamResult::Scalar(items.join(&sep))
    } else {
        ParamResult::Fields(items)
    }
}

fn should_use_alt(v: &ValueKind, on_unset_only: bool, invert: bool) -> bool {
    let triggers = match v {
        ValueKind::Missing => true,
        ValueKind::Scalar(s) => !on_unset_only && s.is_empty(),
        ValueKind::Array(items) => !on_unset_only && items.iter().all(|s| s.is_empty()),
    };
    if invert {
        !triggers
    } else {
        triggers
    }
}

fn normalize_offset(off: i64, len: usize) -> usize {
    if off < 0 {
        len.saturating_sub((-off) as usize)
    } else {
        (off as usize).min(len)
    }
}

fn expand_word_flat(host: &mut dyn ExpansionHost, word: &Word) -> Result<String, BashboxError> {
    super::expand_word_to_string(host, word)
}

fn remove_prefix(s: &str, pattern: &str, greedy: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    let range: Box<dyn Iterator<Item = usize>> = if greedy { Box::new((0..=chars.len()).rev()) } else { Box::new(0..=chars.len()) };
    for cut in range {
        let candidate: String = chars[..cut].iter().collect();
        if glob_match(pattern, &candidate) {
            return chars[cut..].iter().collect();
        }
    }
    s.to_string()
}

fn remove_suffix(s: &str, pattern: &str, greedy: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    let range: Box<dyn Iterator<Item = usize>> = if greedy { Box::new(0..=chars.len()) } else { Box::new((0..=chars.len()).rev()) };
    for cut in range {
        let candidate: String = chars[cut..].iter().collect();
        if glob_match(pattern, &candidate) {
            return chars[..cut].iter().collect();
        }
    }
    s.to_string()
}

fn replace(s: &str, pattern: &str, replacement: &str, all: bool, anchor: Option<PatternAnchor>) -> String {
    if pattern.is_empty() {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let regex = pattern_to_regex(pattern, false);
    let is_match_at = |start: usize, end: usize| -> bool {
        let candidate: String = chars[start..end].iter().collect();
        regex.is_match(&candidate)
    };
    let mut out = String::new();
    let mut i = 0;
    let mut replaced_once = false;
    while i <= chars.len() {
        if anchor == Some(PatternAnchor::Start) && i != 0 {
            out.extend(&chars[i..]);
            break;
        }
        if replaced_once && !all {
            out.extend(&chars[i..]);
            break;
        }
        let mut found = None;
        let max_end = if anchor == Some(PatternAnchor::End) { i } else { chars.len() };
        for end in (i..=max_end.max(i)).rev() {
            if end == i && !pattern.is_empty() {
                continue;
            }
            if is_match_at(i, end) {
                found = Some(end);
                break;
            }
        }
        if anchor == Some(PatternAnchor::End) {
            found = if chars.len() >= i && is_match_at(i, chars.len()) { Some(chars.len()) } else { None };
        }
        match found {
            Some(end) => {
                out.push_str(replacement);
                replaced_once = true;
                i = end.max(i + 1);
            }
            None => {
                if i < chars.len() {
                    out.push(chars[i]);
                }
                i += 1;
            }
        }
    }
    out
}

fn case_modify(s: &str, upper: bool, all: bool, pattern: Option<&str>) -> String {
    let transform_char = |c: char| if upper { c.to_uppercase().next().unwrap_or(c) } else { c.to_lowercase().next().unwrap_or(c) };
    let matches = |c: char| match pattern {
        Some(p) => glob_match(p, &c.to_string()),
        None => true,
    };
    if all {
        s.chars().map(|c| if matches(c) { transform_char(c) } else { c }).collect()
    } else {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if matches(c) => std::iter::once(transform_char(c)).chain(chars).collect(),
            Some(c) => std::iter::once(c).chain(chars).collect(),
            None => String::new(),
        }
    }
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn unescape_ansi_c(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_prefix_removal_takes_longest_match() {
        assert_eq!(remove_prefix("aaabbb", "a*b", true), "bb");
        assert_eq!(remove_prefix("aaabbb", "a*b", false), "aabbb");
    }

    #[test]
    fn suffix_removal_takes_shortest_by_default() {
        assert_eq!(remove_suffix("file.tar.gz", "*.*", false), "file.tar");
    }
}
