//! Shell glob pattern matching, used both for pathname expansion (step 7)
//! and for the pattern arguments to `case`, `${x#pat}`, `${x/pat/rep}`, etc.
//!
//! Patterns are translated to an anchored `regex_lite::Regex` rather than
//! shelling out to the OS glob facility — mirrors
//! `arthur-zhang-just-bash`'s own `shell::glob_expander` translate-then-match
//! strategy, adapted to run against `Vfs::listdir` instead of `std::fs`.

use regex_lite::Regex;

use crate::vfs::Vfs;

/// Translates one glob pattern into a fully-anchored regex matching the
/// whole string. `star_matches_newline` controls whether `*` inside `**`
/// is allowed to cross `/` (only relevant for path patterns, see
/// `expand_pathname`; for plain string matching `**` behaves like `*`).
pub fn pattern_to_regex(pattern: &str, allow_double_star: bool) -> Regex {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if allow_double_star && chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                out.push_str(if allow_double_star { "[^/]*" } else { ".*" });
                i += 1;
            }
            '?' => {
                out.push_str(if allow_double_star { "[^/]" } else { "." });
                i += 1;
            }
            '[' => {
                let start = i;
                i += 1;
                if chars.get(i) == Some(&'!') || chars.get(i) == Some(&'^') {
                    i += 1;
                }
                if chars.get(i) == Some(&']') {
                    i += 1;
                }
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    out.push_str(&regex_lite::escape("["));
                    i = start + 1;
                    continue;
                }
                i += 1;
                let mut class: String = chars[start..i].iter().collect();
                if class.starts_with("[!") {
                    class.replace_range(1..2, "^");
                }
                out.push_str(&class);
            }
            c => {
                out.push_str(&regex_lite::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").unwrap())
}

pub fn glob_match(pattern: &str, text: &str) -> bool {
    pattern_to_regex(pattern, false).is_match(text)
}

pub fn has_glob_chars(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '*' | '?' | '['))
}

#[derive(Debug, Clone, Copy)]
pub enum GlobPolicy {
    Pass,
    Null,
    Fail,
}

/// Pathname expansion (spec §4.3 step 7): matches `field` component-wise
/// against `Vfs::listdir` results, honoring hidden-name and globstar rules.
pub fn expand_pathname(vfs: &Vfs, cwd: &str, field: &str, globstar: bool, policy: GlobPolicy) -> Result<Vec<String>, String> {
    if !has_glob_chars(field) {
        return Ok(vec![field.to_string()]);
    }
    let absolute = field.starts_with('/');
    let components: Vec<&str> = field.trim_start_matches('/').split('/').collect();
    let mut current_dirs = vec![if absolute { "/".to_string() } else { cwd.to_string() }];
    let mut results = Vec::new();
    let mut matched_any = false;

    for (idx, comp) in components.iter().enumerate() {
        let is_last = idx == components.len() - 1;
        if !has_glob_chars(comp) {
            for d in &mut current_dirs {
                *d = join(d, comp);
            }
            if is_last {
                for d in &current_dirs {
                    if vfs.exists(cwd, d) {
                        results.push(d.clone());
                        matched_any = true;
                    }
                }
            }
            continue;
        }
        let mut next_dirs = Vec::new();
        let double_star = globstar && *comp == "**";
        for d in &current_dirs {
            let Ok(names) = vfs.listdir(cwd, d) else { continue };
            let regex = pattern_to_regex(comp, true);
            for name in names {
                if name.starts_with('.') && !comp.starts_with('.') {
                    continue;
                }
                if double_star || regex.is_match(&name) {
                    let full = join(d, &name);
                    if is_last {
                        results.push(full.clone());
                        matched_any = true;
                    } else {
                        next_dirs.push(full);
                    }
                }
            }
        }
        current_dirs = next_dirs;
    }

    if !matched_any {
        return match policy {
            GlobPolicy::Pass => Ok(vec![field.to_string()]),
            GlobPolicy::Null => Ok(vec![]),
            GlobPolicy::Fail => Err(field.to_string()),
        };
    }
    results.sort();
    Ok(results)
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_whole_string() {
        assert!(glob_match("a*c", "abc"));
        assert!(!glob_match("a*c", "abd"));
    }

    #[test]
    fn char_class_matches() {
        assert!(glob_match("[abc]", "b"));
        assert!(glob_match("[!abc]", "d"));
    }

    #[test]
    fn pathname_expansion_finds_matching_file() {
        let mut vfs = Vfs::new();
        vfs.write("/", "/a.txt", b"1", crate::vfs::OpenMode::WriteTruncate).unwrap();
        vfs.write("/", "/b.txt", b"2", crate::vfs::OpenMode::WriteTruncate).unwrap();
        let mut matches = expand_pathname(&vfs, "/", "*.txt", false, GlobPolicy::Pass).unwrap();
        matches.sort();
        assert_eq!(matches, vec!["/a.txt".to_string(), "/b.txt".to_string()]);
    }
}
