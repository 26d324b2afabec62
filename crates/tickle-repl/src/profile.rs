//! REPL profile files.
//!
//! A profile is a plain `name = value` file (one setting per line, `#`
//! comments) loaded before the first prompt. Settings go through a
//! typed-setter table so a bad value reports the offending line instead
//! of silently sticking.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Settings a profile file may change.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Primary prompt.
    pub prompt: String,
    /// Continuation prompt shown while input is unbalanced.
    pub more_prompt: String,
    /// Name-resolution failures enumerate alternatives.
    pub verbose_errors: bool,
    /// Emit a trace event per dispatched command.
    pub trace_commands: bool,
    /// Nested-evaluation limit.
    pub max_depth: usize,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            prompt: "% ".to_string(),
            more_prompt: "> ".to_string(),
            verbose_errors: false,
            trace_commands: false,
            max_depth: 1000,
        }
    }
}

enum Setter {
    Str(fn(&mut Profile, String)),
    Bool(fn(&mut Profile, bool)),
    Uint(fn(&mut Profile, usize)),
}

const SETTERS: &[(&str, Setter)] = &[
    ("prompt", Setter::Str(|p, v| p.prompt = v)),
    ("more_prompt", Setter::Str(|p, v| p.more_prompt = v)),
    ("verbose_errors", Setter::Bool(|p, v| p.verbose_errors = v)),
    ("trace_commands", Setter::Bool(|p, v| p.trace_commands = v)),
    ("max_depth", Setter::Uint(|p, v| p.max_depth = v)),
];

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl Profile {
    /// Parse profile text. Unknown keys warn and are skipped; malformed
    /// values for known keys are errors.
    pub fn parse(text: &str) -> Result<Self> {
        let mut profile = Profile::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("line {}: expected name = value", lineno + 1))?;
            let key = key.trim();
            let value = value.trim();
            let Some((_, setter)) = SETTERS.iter().find(|(name, _)| *name == key) else {
                tracing::warn!(key, line = lineno + 1, "unknown profile setting");
                continue;
            };
            match setter {
                Setter::Str(set) => set(&mut profile, unquote(value)),
                Setter::Bool(set) => {
                    let parsed = parse_bool(value).with_context(|| {
                        format!("line {}: {key} wants a boolean, got {value:?}", lineno + 1)
                    })?;
                    set(&mut profile, parsed);
                }
                Setter::Uint(set) => {
                    let parsed = value.parse().with_context(|| {
                        format!("line {}: {key} wants an integer, got {value:?}", lineno + 1)
                    })?;
                    set(&mut profile, parsed);
                }
            }
        }
        Ok(profile)
    }

    /// Load from `path`; a missing file is the default profile.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                Self::parse(&text).with_context(|| format!("in profile {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Profile::default()),
            Err(e) => Err(e).with_context(|| format!("couldn't read profile {}", path.display())),
        }
    }
}

/// Strip one layer of matching quotes so prompts can carry spaces.
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Default profile location: `~/.ticklerc` (falling back to the config
/// dir when there is no home).
pub fn default_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".ticklerc"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_settings_and_comments() {
        let profile = Profile::parse(
            "# my setup\nprompt = \"tcl> \"\nverbose_errors = on\nmax_depth = 50\n",
        )
        .unwrap();
        assert_eq!(profile.prompt, "tcl> ");
        assert!(profile.verbose_errors);
        assert_eq!(profile.max_depth, 50);
        assert_eq!(profile.more_prompt, "> ");
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let profile = Profile::parse("no_such_setting = 1\n").unwrap();
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn bad_values_error_with_line() {
        let err = Profile::parse("prompt = ok\nmax_depth = many\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn missing_file_is_default() {
        let profile = Profile::load(Path::new("/nonexistent/.ticklerc")).unwrap();
        assert_eq!(profile, Profile::default());
    }
}
