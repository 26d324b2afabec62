//! Name matching for bulk variable operations and diagnostics filters.
//!
//! Every operation that filters by name (`set_read_only`, `list_defined`,
//! call-stack rendering, ...) goes through one [`matches`] entry point so
//! that glob and regexp modes behave identically everywhere.
//!
//! Glob syntax is the classic set: `*` (any run), `?` (any one char),
//! `[a-z]` character classes with ranges and leading-`^` negation, and
//! `\x` to match `x` literally.

use std::fmt;

/// How a pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Pattern must equal the text exactly.
    Exact,
    /// Glob matching (`*`, `?`, `[...]`, `\`).
    #[default]
    Glob,
    /// Pattern is a regular expression.
    Regexp,
}

/// Error from a match attempt (only regexp compilation can fail).
#[derive(Debug, Clone, PartialEq)]
pub struct PatternError(pub String);

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad pattern: {}", self.0)
    }
}

impl std::error::Error for PatternError {}

/// Match `text` against `pattern` in the given mode.
pub fn matches(
    mode: MatchMode,
    pattern: &str,
    text: &str,
    no_case: bool,
) -> Result<bool, PatternError> {
    match mode {
        MatchMode::Exact => {
            if no_case {
                Ok(pattern.eq_ignore_ascii_case(text))
            } else {
                Ok(pattern == text)
            }
        }
        MatchMode::Glob => Ok(glob_match(pattern, text, no_case)),
        MatchMode::Regexp => {
            let built = if no_case {
                regex::RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
            } else {
                regex::Regex::new(pattern)
            };
            let re = built.map_err(|e| PatternError(e.to_string()))?;
            Ok(re.is_match(text))
        }
    }
}

/// Glob-match `text` against `pattern`.
pub fn glob_match(pattern: &str, text: &str, no_case: bool) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_inner(&p, &t, no_case)
}

fn chars_eq(a: char, b: char, no_case: bool) -> bool {
    if no_case {
        a.eq_ignore_ascii_case(&b)
    } else {
        a == b
    }
}

fn glob_inner(pattern: &[char], text: &[char], no_case: bool) -> bool {
    let mut pi = 0;
    let mut ti = 0;
    // Backtrack points for the most recent `*`.
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() {
            match pattern[pi] {
                '*' => {
                    // Collapse runs of stars; remember the backtrack point.
                    while pi < pattern.len() && pattern[pi] == '*' {
                        pi += 1;
                    }
                    star_pi = Some(pi);
                    star_ti = ti;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next_pi)) =
                        class_match(pattern, pi, text[ti], no_case)
                    {
                        if matched {
                            pi = next_pi;
                            ti += 1;
                            continue;
                        }
                    }
                    // fall through to backtrack
                }
                '\\' if pi + 1 < pattern.len() => {
                    if chars_eq(pattern[pi + 1], text[ti], no_case) {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if chars_eq(c, text[ti], no_case) {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }
        // Mismatch: retry after the last star, consuming one more char.
        match star_pi {
            Some(sp) => {
                star_ti += 1;
                pi = sp;
                ti = star_ti;
            }
            None => return false,
        }
    }

    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}

/// Match one character against a `[...]` class starting at `pi`.
///
/// Returns `(matched, index_after_class)`, or None for a malformed class
/// (treated as a mismatch by the caller).
fn class_match(pattern: &[char], pi: usize, c: char, no_case: bool) -> Option<(bool, usize)> {
    let mut i = pi + 1;
    let negated = if i < pattern.len() && pattern[i] == '^' {
        i += 1;
        true
    } else {
        false
    };

    let mut matched = false;
    let mut saw_any = false;
    while i < pattern.len() && (pattern[i] != ']' || !saw_any) {
        let lo = pattern[i];
        saw_any = true;
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let hi = pattern[i + 2];
            let (c2, lo2, hi2) = if no_case {
                (
                    c.to_ascii_lowercase(),
                    lo.to_ascii_lowercase(),
                    hi.to_ascii_lowercase(),
                )
            } else {
                (c, lo, hi)
            };
            if c2 >= lo2 && c2 <= hi2 {
                matched = true;
            }
            i += 3;
        } else {
            if chars_eq(lo, c, no_case) {
                matched = true;
            }
            i += 1;
        }
    }
    if i >= pattern.len() {
        return None; // unterminated class
    }
    Some((matched != negated, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match() {
        assert!(glob_match("abc", "abc", false));
        assert!(!glob_match("abc", "abd", false));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("a*c", "abc", false));
        assert!(glob_match("a*c", "ac", false));
        assert!(glob_match("a*c", "axxxxc", false));
        assert!(!glob_match("a*c", "abx", false));
    }

    #[test]
    fn star_backtracks() {
        assert!(glob_match("*ab*ab", "xabxabyab", false));
        assert!(glob_match("a*b*c", "aXbXbXc", false));
    }

    #[test]
    fn question_matches_one() {
        assert!(glob_match("a?c", "abc", false));
        assert!(!glob_match("a?c", "ac", false));
    }

    #[test]
    fn char_class() {
        assert!(glob_match("[abc]", "b", false));
        assert!(!glob_match("[abc]", "d", false));
        assert!(glob_match("[a-z]x", "qx", false));
        assert!(glob_match("[^a-z]", "7", false));
        assert!(!glob_match("[^a-z]", "q", false));
    }

    #[test]
    fn escaped_literal() {
        assert!(glob_match("a\\*b", "a*b", false));
        assert!(!glob_match("a\\*b", "axb", false));
    }

    #[test]
    fn case_insensitive_glob() {
        assert!(glob_match("AbC*", "abcdef", true));
        assert!(!glob_match("AbC*", "abcdef", false));
    }

    #[test]
    fn empty_pattern_and_text() {
        assert!(glob_match("", "", false));
        assert!(glob_match("*", "", false));
        assert!(!glob_match("?", "", false));
    }

    #[test]
    fn exact_mode() {
        assert_eq!(matches(MatchMode::Exact, "a*", "a*", false), Ok(true));
        assert_eq!(matches(MatchMode::Exact, "a*", "ab", false), Ok(false));
    }

    #[test]
    fn regexp_mode() {
        assert_eq!(matches(MatchMode::Regexp, "^a+b$", "aaab", false), Ok(true));
        assert_eq!(matches(MatchMode::Regexp, "^a+b$", "b", false), Ok(false));
        assert!(matches(MatchMode::Regexp, "(", "x", false).is_err());
    }

    #[test]
    fn regexp_no_case() {
        assert_eq!(matches(MatchMode::Regexp, "abc", "ABC", true), Ok(true));
    }
}
