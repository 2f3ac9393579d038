//! Brace expansion — spec §4.3 step 1. Purely syntactic: runs on the AST
//! `Word` before any variable is looked up, and never touches the VFS.

use crate::ast::{BraceBound, BraceItem, Word, WordPart};

/// Expands every `WordPart::Brace` in `word`, returning the cartesian
/// product of concrete words. A word with no brace parts returns a single
/// clone of itself.
pub fn expand_braces(word: &Word) -> Vec<Word> {
    let mut results: Vec<Vec<WordPart>> = vec![Vec::new()];
    for part in &word.parts {
        match part {
            WordPart::Brace(items) => {
                let alternatives = materialize(items);
                let mut next = Vec::with_capacity(results.len() * alternatives.len().max(1));
                for prefix in &results {
                    for alt in &alternatives {
                        let mut combined = prefix.clone();
                        combined.extend(alt.iter().cloned());
                        next.push(combined);
                    }
                }
                results = next;
            }
            other => {
                for r in &mut results {
                    r.push(other.clone());
                }
            }
        }
    }
    results.into_iter().map(|parts| Word { parts }).collect()
}

fn materialize(items: &[BraceItem]) -> Vec<Vec<WordPart>> {
    let mut out = Vec::new();
    for item in items {
        match item {
            BraceItem::Word(w) => {
                for expanded in expand_braces(w) {
                    out.push(expanded.parts);
                }
            }
            BraceItem::Range { start, end, step } => {
                for text in range_values(*start, *end, *step) {
                    out.push(vec![WordPart::Literal(text)]);
                }
            }
        }
    }
    out
}

fn range_values(start: BraceBound, end: BraceBound, step: i64) -> Vec<String> {
    match (start, end) {
        (BraceBound::Int(a, width), BraceBound::Int(b, _)) => {
            let step = if step == 0 { 1 } else { step.abs() };
            let mut out = Vec::new();
            if a <= b {
                let mut v = a;
                while v <= b {
                    out.push(format_padded(v, width));
                    v += step;
                }
            } else {
                let mut v = a;
                while v >= b {
                    out.push(format_padded(v, width));
                    v -= step;
                }
            }
            out
        }
        (BraceBound::Char(a), BraceBound::Char(b)) => {
            let step = if step == 0 { 1 } else { step.unsigned_abs() as u32 };
            let mut out = Vec::new();
            let (a, b) = (a as u32, b as u32);
            if a <= b {
                let mut v = a;
                while v <= b {
                    if let Some(c) = char::from_u32(v) {
                        out.push(c.to_string());
                    }
                    v += step;
                }
            } else {
                let mut v = a;
                loop {
                    if let Some(c) = char::from_u32(v) {
                        out.push(c.to_string());
                    }
                    if v < b + step {
                        break;
                    }
                    v -= step;
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

fn format_padded(v: i64, width: usize) -> String {
    if width == 0 {
        return v.to_string();
    }
    let neg = v < 0;
    let digits = format!("{:0width$}", v.unsigned_abs(), width = width.saturating_sub(neg as usize));
    if neg {
        format!("-{digits}")
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Word;

    fn lit(s: &str) -> Word {
        Word { parts: vec![WordPart::Literal(s.to_string())] }
    }

    #[test]
    fn comma_list_expands_to_cartesian_product() {
        let w = Word {
            parts: vec![
                WordPart::Literal("a".into()),
                WordPart::Brace(vec![BraceItem::Word(lit("1")), BraceItem::Word(lit("2"))]),
            ],
        };
        let out: Vec<String> = expand_braces(&w)
            .into_iter()
            .map(|w| match &w.parts[..] {
                [WordPart::Literal(a), WordPart::Literal(b)] => format!("{a}{b}"),
                _ => panic!("unexpected shape"),
            })
            .collect();
        assert_eq!(out, vec!["a1".to_string(), "a2".to_string()]);
    }

    #[test]
    fn numeric_range_with_padding() {
        let vals = range_values(BraceBound::Int(1, 2), BraceBound::Int(3, 0), 1);
        assert_eq!(vals, vec!["01".to_string(), "02".to_string(), "03".to_string()]);
    }
}
