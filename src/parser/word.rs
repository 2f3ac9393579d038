//! Parses one lexer word-token's raw text into `Word` parts: quoting,
//! escapes, parameter/command/arithmetic expansions, tilde and brace forms.

use crate::ast::*;
use crate::error::BashboxError;

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(s: &str) -> Self {
        Cursor { chars: s.chars().collect(), pos: 0 }
    }
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }
    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }
}

pub fn parse_word(raw: &str) -> Result<Word, BashboxError> {
    let mut cur = Cursor::new(raw);
    let parts = parse_parts(&mut cur, false)?;
    Ok(Word { parts })
}

/// `in_double_quotes` disables tilde/brace recognition and single-quote
/// literal-mode, matching bash's quoting rules.
fn parse_parts(cur: &mut Cursor, in_double_quotes: bool) -> Result<Vec<WordPart>, BashboxError> {
    let mut parts = Vec::new();
    let mut literal = String::new();

    if !in_double_quotes {
        if let Some(tilde) = try_parse_tilde(cur) {
            parts.push(tilde);
        }
    }

    while let Some(c) = cur.peek() {
        match c {
            '\'' if !in_double_quotes => {
                flush_literal(&mut parts, &mut literal);
                cur.bump();
                let mut s = String::new();
                loop {
                    match cur.bump() {
                        Some('\'') => break,
                        Some(ch) => s.push(ch),
                        None => return Err(syntax_err("unterminated single quote")),
                    }
                }
                parts.push(WordPart::SingleQuoted(s));
            }
            '"' if !in_double_quotes => {
                flush_literal(&mut parts, &mut literal);
                cur.bump();
                let mut inner_raw = String::new();
                loop {
                    match cur.peek() {
                        Some('"') => {
                            cur.bump();
                            break;
                        }
                        Some('\\') => {
                            inner_raw.push(cur.bump().unwrap());
                            if let Some(ch) = cur.bump() {
                                inner_raw.push(ch);
                            }
                        }
                        Some(ch) => {
                            inner_raw.push(ch);
                            cur.bump();
                        }
                        None => return Err(syntax_err("unterminated double quote")),
                    }
                }
                let mut inner_cur = Cursor::new(&inner_raw);
                let inner_parts = parse_parts(&mut inner_cur, true)?;
                parts.push(WordPart::DoubleQuoted(inner_parts));
            }
            '\\' if !in_double_quotes => {
                cur.bump();
                if let Some(ch) = cur.bump() {
                    literal.push(ch);
                }
            }
            '\\' if in_double_quotes => {
                cur.bump();
                match cur.peek() {
                    Some(ch @ ('$' | '`' | '"' | '\\' | '\n')) => {
                        cur.bump();
                        literal.push(ch);
                    }
                    _ => literal.push('\\'),
                }
            }
            '$' => {
                flush_literal(&mut parts, &mut literal);
                parts.push(parse_dollar(cur)?);
            }
            '`' => {
                flush_literal(&mut parts, &mut literal);
                cur.bump();
                let mut s = String::new();
                loop {
                    match cur.bump() {
                        Some('`') => break,
                        Some('\\') => {
                            if let Some(ch) = cur.bump() {
                                if ch == '`' || ch == '$' || ch == '\\' {
                                    s.push(ch);
                                } else {
                                    s.push('\\');
                                    s.push(ch);
                                }
                            }
                        }
                        Some(ch) => s.push(ch),
                        None => return Err(syntax_err("unterminated backtick substitution")),
                    }
                }
                let script = crate::parser::parse(&s)?;
                parts.push(WordPart::CommandSub { script, legacy: true });
            }
            '{' if !in_double_quotes && looks_like_brace(cur) => {
                flush_literal(&mut parts, &mut literal);
                parts.push(parse_brace(cur)?);
            }
            _ => {
                literal.push(cur.bump().unwrap());
            }
        }
    }
    flush_literal(&mut parts, &mut literal);
    Ok(parts)
}

fn flush_literal(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

fn syntax_err(reason: &str) -> BashboxError {
    BashboxError::Syntax { pos: Position::default(), reason: reason.into() }
}

fn try_parse_tilde(cur: &mut Cursor) -> Option<WordPart> {
    if cur.peek() != Some('~') {
        return None;
    }
    let save = cur.pos;
    cur.bump();
    let mut name = String::new();
    while let Some(c) = cur.peek() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            name.push(c);
            cur.bump();
        } else {
            break;
        }
    }
    match cur.peek() {
        None | Some('/') => Some(WordPart::Tilde(if name.is_empty() { None } else { Some(name) })),
        _ => {
            cur.pos = save;
            None
        }
    }
}

fn parse_dollar(cur: &mut Cursor) -> Result<WordPart, BashboxError> {
    cur.bump(); // '$'
    match cur.peek() {
        Some('(') if cur.peek_at(1) == Some('(') => {
            cur.bump();
            cur.bump();
            let text = read_balanced(cur, "((", "))")?;
            let expr = crate::expand::arith::parse(&text)?;
            Ok(WordPart::Arith(expr))
        }
        Some('(') => {
            cur.bump();
            let text = read_balanced_single(cur, '(', ')')?;
            let script = crate::parser::parse(&text)?;
            Ok(WordPart::CommandSub { script, legacy: false })
        }
        Some('{') => {
            cur.bump();
            let text = read_balanced_single(cur, '{', '}')?;
            Ok(WordPart::Param(parse_param_expansion(&text)?))
        }
        Some(c) if is_name_start(c) => {
            let mut name = String::new();
            while let Some(c) = cur.peek() {
                if c.is_alphanumeric() || c == '_' {
                    name.push(c);
                    cur.bump();
                } else {
                    break;
                }
            }
            Ok(WordPart::Param(ParamExpansion { name, index: None, op: None }))
        }
        Some(c) if is_special_param(c) => {
            cur.bump();
            Ok(WordPart::Param(ParamExpansion { name: c.to_string(), index: None, op: None }))
        }
        _ => Ok(WordPart::Literal("$".to_string())),
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_special_param(c: char) -> bool {
    matches!(c, '@' | '*' | '#' | '?' | '-' | '$' | '!' | '0'..='9')
}

/// Reads text until the given multi-char closer is found at nesting depth 0,
/// tracking the matching opener/closer pair for nested `(( ))` balance.
fn read_balanced(cur: &mut Cursor, _open: &str, _close: &str) -> Result<String, BashboxError> {
    let mut out = String::new();
    let mut depth = 0i32;
    loop {
        if depth == 0 && cur.peek() == Some(')') && cur.peek_at(1) == Some(')') {
            cur.bump();
            cur.bump();
            return Ok(out);
        }
        match cur.bump() {
            Some('(') => {
                depth += 1;
                out.push('(');
            }
            Some(')') => {
                depth -= 1;
                out.push(')');
            }
            Some(c) => out.push(c),
            None => return Err(syntax_err("unterminated arithmetic expansion")),
        }
    }
}

fn read_balanced_single(cur: &mut Cursor, open: char, close: char) -> Result<String, BashboxError> {
    let mut out = String::new();
    let mut depth = 1i32;
    loop {
        match cur.peek() {
            None => return Err(syntax_err("unterminated expansion")),
            Some('\'') if open == '(' => {
                out.push(cur.bump().unwrap());
                loop {
                    match cur.bump() {
                        Some('\'') => {
                            out.push('\'');
                            break;
                        }
                        Some(ch) => out.push(ch),
                        None => return Err(syntax_err("unterminated single quote")),
                    }
                }
            }
            Some(c) if c == open => {
                depth += 1;
                out.push(cur.bump().unwrap());
            }
            Some(c) if c == close => {
                depth -= 1;
                cur.bump();
                if depth == 0 {
                    return Ok(out);
                }
                out.push(c);
            }
            Some(_) => out.push(cur.bump().unwrap()),
        }
    }
}

fn looks_like_brace(cur: &Cursor) -> bool {
    // crude but effective: a `{` is a brace-expansion opener only if its
    // balanced contents contain a top-level `,` or `..`.
    let mut depth = 0i32;
    let mut i = cur.pos;
    let chars = &cur.chars;
    let mut has_comma = false;
    let mut has_range = false;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return has_comma || has_range;
                }
            }
            ',' if depth == 1 => has_comma = true,
            '.' if depth == 1 && chars.get(i + 1) == Some(&'.') => has_range = true,
            _ => {}
        }
        i += 1;
    }
    false
}

fn parse_brace(cur: &mut Cursor) -> Result<WordPart, BashboxError> {
    cur.bump(); // '{'
    let inner = read_balanced_single(cur, '{', '}')?;
    let segments = split_top_level(&inner, ',');
    if segments.len() >= 2 {
        let mut items = Vec::new();
        for seg in segments {
            items.push(BraceItem::Word(parse_word(&seg)?));
        }
        return Ok(WordPart::Brace(items));
    }
    if let Some((start, end, step)) = parse_range(&inner) {
        return Ok(WordPart::Brace(vec![BraceItem::Range { start, end, step }]));
    }
    // not actually a valid brace expression; treat literally as `{inner}`
    Ok(WordPart::Literal(format!("{{{inner}}}")))
}

fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '{' => {
                depth += 1;
                cur.push(c);
            }
            '}' => {
                depth -= 1;
                cur.push(c);
            }
            c if c == sep && depth == 0 => {
                out.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    out.push(cur);
    out
}

fn parse_range(s: &str) -> Option<(BraceBound, BraceBound, i64)> {
    let parts: Vec<&str> = s.split("..").collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let step = if parts.len() == 3 { parts[2].parse::<i64>().ok()? } else { 1 };
    let start = parse_bound(parts[0])?;
    let end = parse_bound(parts[1])?;
    Some((start, end, step))
}

fn parse_bound(s: &str) -> Option<BraceBound> {
    if s.chars().count() == 1 && s.chars().next().unwrap().is_alphabetic() {
        return Some(BraceBound::Char(s.chars().next().unwrap()));
    }
    let width = if (s.starts_with('0') || s.starts_with("-0")) && s.len() > 1 { s.trim_start_matches('-').len() } else { 0 };
    s.parse::<i64>().ok().map(|n| BraceBound::Int(n, width))
}

/// Parses the text between `${` and `}` into a full `ParamExpansion`.
fn parse_param_expansion(text: &str) -> Result<ParamExpansion, BashboxError> {
    let mut cur = Cursor::new(text);

    if cur.peek() == Some('!') && !matches!(cur.peek_at(1), None) && is_indirect_prefix(&cur) {
        cur.bump();
        let name = read_name(&mut cur);
        return match cur.peek() {
            Some('*') => {
                cur.bump();
                Ok(ParamExpansion { name, index: None, op: Some(ParamOp::NamesWithPrefix { star: true }) })
            }
            Some('@') => {
                cur.bump();
                Ok(ParamExpansion { name, index: None, op: Some(ParamOp::NamesWithPrefix { star: false }) })
            }
            Some('[') => {
                cur.bump();
                let idx_text = read_balanced_single(&mut cur, '[', ']')?;
                let star = idx_text == "*";
                Ok(ParamExpansion { name, index: Some(Box::new(literal_word(&idx_text))), op: Some(ParamOp::ArrayKeys { star }) })
            }
            _ => Ok(ParamExpansion { name, index: None, op: Some(ParamOp::Indirect) }),
        };
    }

    if cur.peek() == Some('#') && has_valid_name_after(&cur, 1) {
        cur.bump();
        let name = read_name(&mut cur);
        let index = read_opt_index(&mut cur)?;
        if cur.at_end() {
            return Ok(ParamExpansion { name, index, op: Some(ParamOp::Length) });
        }
        cur.pos = 0;
    }

    let name = read_name(&mut cur);
    let index = read_opt_index(&mut cur)?;

    if cur.at_end() {
        return Ok(ParamExpansion { name, index, op: None });
    }

    let op = parse_param_op(&mut cur)?;
    Ok(ParamExpansion { name, index, op: Some(op) })
}

fn is_indirect_prefix(cur: &Cursor) -> bool {
    // `!` starts an indirection/array-keys form only if followed by a name
    // char; bare `${!}` (pid) is handled as special-param elsewhere.
    cur.peek_at(1).map(|c| c.is_alphanumeric() || c == '_').unwrap_or(false)
}

fn has_valid_name_after(cur: &Cursor, offset: usize) -> bool {
    cur.peek_at(offset).map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
}

fn read_name(cur: &mut Cursor) -> String {
    if let Some(c) = cur.peek() {
        if is_special_param(c) && !c.is_ascii_digit() {
            cur.bump();
            return c.to_string();
        }
        if c.is_ascii_digit() {
            let mut s = String::new();
            while let Some(c) = cur.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    cur.bump();
                } else {
                    break;
                }
            }
            return s;
        }
    }
    let mut s = String::new();
    while let Some(c) = cur.peek() {
        if c.is_alphanumeric() || c == '_' {
            s.push(c);
            cur.bump();
        } else {
            break;
        }
    }
    s
}

fn read_opt_index(cur: &mut Cursor) -> Result<Option<Box<Word>>, BashboxError> {
    if cur.peek() == Some('[') {
        cur.bump();
        let text = read_balanced_single(cur, '[', ']')?;
        return Ok(Some(Box::new(literal_word(&text))));
    }
    Ok(None)
}

fn literal_word(s: &str) -> Word {
    if s == "@" || s == "*" {
        Word { parts: vec![WordPart::Literal(s.to_string())] }
    } else {
        parse_word(s).unwrap_or_else(|_| Word { parts: vec![WordPart::Literal(s.to_string())] })
    }
}

fn parse_param_op(cur: &mut Cursor) -> Result<ParamOp, BashboxError> {
    match cur.peek() {
        Some(':') => {
            cur.bump();
            match cur.peek() {
                Some('-') => {
                    cur.bump();
                    Ok(ParamOp::DefaultValue { word: parse_word(&cur.rest())?, on_unset_only: true })
                }
                Some('=') => {
                    cur.bump();
                    Ok(ParamOp::AssignDefault { word: parse_word(&cur.rest())?, on_unset_only: true })
                }
                Some('?') => {
                    cur.bump();
                    let rest = cur.rest();
                    let word = if rest.is_empty() { None } else { Some(parse_word(&rest)?) };
                    Ok(ParamOp::ErrorIfUnset { word, on_unset_only: true })
                }
                Some('+') => {
                    cur.bump();
                    Ok(ParamOp::UseAlternative { word: parse_word(&cur.rest())?, on_unset_only: true })
                }
                _ => {
                    let rest = cur.rest();
                    let (off, len) = split_substring(&rest);
                    Ok(ParamOp::Substring {
                        offset: crate::expand::arith::parse(off.trim())?,
                        length: match len {
                            Some(l) => Some(crate::expand::arith::parse(l.trim())?),
                            None => None,
                        },
                    })
                }
            }
        }
        Some('-') => {
            cur.bump();
            Ok(ParamOp::DefaultValue { word: parse_word(&cur.rest())?, on_unset_only: false })
        }
        Some('=') => {
            cur.bump();
            Ok(ParamOp::AssignDefault { word: parse_word(&cur.rest())?, on_unset_only: false })
        }
        Some('?') => {
            cur.bump();
            let rest = cur.rest();
            let word = if rest.is_empty() { None } else { Some(parse_word(&rest)?) };
            Ok(ParamOp::ErrorIfUnset { word, on_unset_only: false })
        }
        Some('+') => {
            cur.bump();
            Ok(ParamOp::UseAlternative { word: parse_word(&cur.rest())?, on_unset_only: false })
        }
        Some('#') => {
            cur.bump();
            let greedy = cur.peek() == Some('#');
            if greedy {
                cur.bump();
            }
            Ok(ParamOp::RemovePrefix { pattern: parse_word(&cur.rest())?, greedy })
        }
        Some('%') => {
            cur.bump();
            let greedy = cur.peek() == Some('%');
            if greedy {
                cur.bump();
            }
            Ok(ParamOp::RemoveSuffix { pattern: parse_word(&cur.rest())?, greedy })
        }
        Some('/') => {
            cur.bump();
            let all = cur.peek() == Some('/');
            let anchor = match cur.peek() {
                Some('/') => {
                    cur.bump();
                    None
                }
                Some('#') => {
                    cur.bump();
                    Some(PatternAnchor::Start)
                }
                Some('%') => {
                    cur.bump();
                    Some(PatternAnchor::End)
                }
                _ => None,
            };
            let rest = cur.rest();
            let segs = split_top_level(&rest, '/');
            let pattern = parse_word(segs.first().map(String::as_str).unwrap_or(""))?;
            let replacement = match segs.get(1) {
                Some(r) if !r.is_empty() => Some(parse_word(r)?),
                _ => None,
            };
            Ok(ParamOp::Replace { pattern, replacement, all, anchor })
        }
        Some('^') => {
            cur.bump();
            let all = cur.peek() == Some('^');
            if all {
                cur.bump();
            }
            let rest = cur.rest();
            let pattern = if rest.is_empty() { None } else { Some(parse_word(&rest)?) };
            Ok(ParamOp::CaseModify { upper: true, all, pattern })
        }
        Some(',') => {
            cur.bump();
            let all = cur.peek() == Some(',');
            if all {
                cur.bump();
            }
            let rest = cur.rest();
            let pattern = if rest.is_empty() { None } else { Some(parse_word(&rest)?) };
            Ok(ParamOp::CaseModify { upper: false, all, pattern })
        }
        Some('@') => {
            cur.bump();
            match cur.peek() {
                Some('Q') => Ok(ParamOp::Transform(TransformOp::Q)),
                Some('E') => Ok(ParamOp::Transform(TransformOp::E)),
                Some('P') => Ok(ParamOp::Transform(TransformOp::P)),
                Some('A') => Ok(ParamOp::Transform(TransformOp::A)),
                Some('a') => Ok(ParamOp::Transform(TransformOp::LowerA)),
                other => Err(syntax_err(&format!("bad transform operator @{other:?}"))),
            }
        }
        other => Err(syntax_err(&format!("unsupported parameter expansion operator {other:?}"))),
    }
}

/// Splits a `:offset[:length]` tail (already past the leading `:`) into its
/// arithmetic-text pieces, respecting a top-level `:` only.
fn split_substring(s: &str) -> (&str, Option<&str>) {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b':' if depth == 0 => return (&s[..i], Some(&s[i + 1..])),
            _ => {}
        }
    }
    (s, None)
}
