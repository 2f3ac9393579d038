//! Quote-aware field splitting — spec §4.3 step 6.
//!
//! Splits the *unquoted* portions of a segment stream on runs of `IFS`
//! whitespace, then on single non-whitespace `IFS` characters, while
//! quoted segments are never split. Returns `(field_text, any_unquoted)`
//! pairs; `any_unquoted` gates pathname expansion (only fields containing
//! at least one unquoted byte are glob-eligible).

use super::Segment;

pub fn split_fields(segments: &[Segment], ifs: &str) -> Vec<(String, bool)> {
    let ws: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    let non_ws: Vec<char> = ifs.chars().filter(|c| !c.is_whitespace()).collect();

    let mut fields: Vec<(String, bool)> = Vec::new();
    let mut current = String::new();
    let mut current_unquoted = false;
    let mut have_field = false;

    let flush = |fields: &mut Vec<(String, bool)>, current: &mut String, current_unquoted: &mut bool, have_field: &mut bool| {
        if *have_field {
            fields.push((std::mem::take(current), *current_unquoted));
        }
        *current_unquoted = false;
        *have_field = false;
    };

    for seg in segments {
        match seg {
            Segment::FieldBreak => {
                flush(&mut fields, &mut current, &mut current_unquoted, &mut have_field);
            }
            Segment::Text(text, true) => {
                current.push_str(text);
                have_field = true;
            }
            Segment::Text(text, false) => {
                for c in text.chars() {
                    if ws.contains(&c) {
                        flush(&mut fields, &mut current, &mut current_unquoted, &mut have_field);
                    } else if non_ws.contains(&c) {
                        have_field = true;
                        flush(&mut fields, &mut current, &mut current_unquoted, &mut have_field);
                    } else {
                        current.push(c);
                        current_unquoted = true;
                        have_field = true;
                    }
                }
            }
        }
    }
    flush(&mut fields, &mut current, &mut current_unquoted, &mut have_field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_ifs_collapses_runs() {
        let segs = vec![Segment::Text("a   b".to_string(), false)];
        let fields = split_fields(&segs, " \t\n");
        assert_eq!(fields, vec![("a".to_string(), true), ("b".to_string(), true)]);
    }

    #[test]
    fn colon_ifs_preserves_empty_field() {
        let segs = vec![Segment::Text("a::b".to_string(), false)];
        let fields = split_fields(&segs, ":");
        assert_eq!(fields, vec![("a".to_string(), true), (String::new(), false), ("b".to_string(), true)]);
    }

    #[test]
    fn quoted_text_is_never_split() {
        let segs = vec![Segment::Text("a b".to_string(), true)];
        let fields = split_fields(&segs, " ");
        assert_eq!(fields, vec![("a b".to_string(), false)]);
    }
}
