//! Spec discovery: walks the project tree, applies include/exclude/suite
//! glob filters, and returns a map of logical key → relative path.

use crate::error::XjetError;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Compile one of xJet's glob patterns into an anchored regex. A value
/// that already looks like a regex literal (`^...$`) is passed through
/// unchanged, matching the source's "a plain RegExp is passed through"
/// escape hatch.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, XjetError> {
    if pattern.starts_with('^') && pattern.ends_with('$') {
        return Regex::new(pattern).map_err(|e| XjetError::Config(e.to_string()));
    }

    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*/?");
                i += 2;
                if chars.get(i) == Some(&'/') {
                    i += 1;
                }
            }
            '*' => {
                out.push_str("[^/]+");
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => {
                let close = chars[i..].iter().position(|&c| c == ']').map(|p| p + i);
                if let Some(close) = close {
                    out.push('[');
                    out.push_str(&chars[i + 1..close].iter().collect::<String>());
                    out.push(']');
                    i = close + 1;
                } else {
                    out.push_str("\\[");
                    i += 1;
                }
            }
            '{' => {
                let close = chars[i..].iter().position(|&c| c == '}').map(|p| p + i);
                if let Some(close) = close {
                    let alts: Vec<String> =
                        chars[i + 1..close].iter().collect::<String>().split(',').map(regex::escape).collect();
                    out.push('(');
                    out.push_str(&alts.join("|"));
                    out.push(')');
                    i = close + 1;
                } else {
                    out.push_str("\\{");
                    i += 1;
                }
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| XjetError::Config(e.to_string()))
}

/// Compiled discovery filters.
pub struct Filters {
    pub files: Vec<Regex>,
    pub suites: Vec<Regex>,
    pub exclude: Vec<Regex>,
}

impl Filters {
    pub fn compile(files: &[String], suites: &[String], exclude: &[String]) -> Result<Self, XjetError> {
        Ok(Self {
            files: files.iter().map(|p| glob_to_regex(p)).collect::<Result<_, _>>()?,
            suites: suites.iter().map(|p| glob_to_regex(p)).collect::<Result<_, _>>()?,
            exclude: exclude.iter().map(|p| glob_to_regex(p)).collect::<Result<_, _>>()?,
        })
    }

    pub fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(rel))
    }

    pub fn is_test_file(&self, rel: &str) -> bool {
        if !self.suites.is_empty() && !self.suites.iter().any(|re| re.is_match(rel)) {
            return false;
        }
        self.files.iter().any(|re| re.is_match(rel))
    }
}

/// Recursively walk `root`, returning `logical_key -> relative path` for
/// every matching file. Keys are the relative path with its extension
/// stripped, so the mapping is stable regardless of traversal order.
pub fn discover(root: &Path, filters: &Filters) -> Result<BTreeMap<String, PathBuf>, XjetError> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.path() == root {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_str = rel.to_string_lossy().replace('\\', "/");

        if filters.is_excluded(&rel_str) {
            continue;
        }
        if entry.file_type().is_dir() {
            continue;
        }
        if !filters.is_test_file(&rel_str) {
            continue;
        }

        let key = rel.with_extension("").to_string_lossy().replace('\\', "/");
        out.insert(key, rel.to_path_buf());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_double_star_and_braces() {
        let re = glob_to_regex("**/*.{test,spec}.ts").unwrap();
        assert!(re.is_match("a/b/c.test.ts"));
        assert!(re.is_match("c.spec.ts"));
        assert!(!re.is_match("c.ts"));
    }

    #[test]
    fn regex_literal_passes_through() {
        let re = glob_to_regex("^foo$").unwrap();
        assert!(re.is_match("foo"));
        assert!(!re.is_match("foobar"));
    }

    #[test]
    fn discovery_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/one.test.ts"), "").unwrap();
        std::fs::write(dir.path().join("two.test.ts"), "").unwrap();
        std::fs::write(dir.path().join("skip.ts"), "").unwrap();

        let filters = Filters::compile(&["**/*.test.ts".into()], &[], &[]).unwrap();
        let files = discover(dir.path(), &filters).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("a/b/one"));
        assert!(files.contains_key("two"));
    }

    #[test]
    fn exclude_wins_over_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.test.ts"), "").unwrap();
        let filters = Filters::compile(&["**/*.test.ts".into()], &[], &["one.test.ts".into()]).unwrap();
        let files = discover(dir.path(), &filters).unwrap();
        assert!(files.is_empty());
    }
}
