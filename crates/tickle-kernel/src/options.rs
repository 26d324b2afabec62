//! Flag-style argument resolution for commands.
//!
//! Commands declare their options up front in an [`OptionSet`], then walk
//! the caller's argument vector through [`OptionSet::parse`]. Name lookup
//! does prefix matching: an exact match always wins, a unique prefix
//! resolves, multiple prefixes are an ambiguity error, and a miss is
//! either a hard error (strict) or an explicit [`Lookup::Unchanged`]
//! pass-through that the caller must handle.
//!
//! All name-resolution errors enumerate the valid alternatives sorted and
//! comma-joined with a trailing "or", the same shape the engine uses for
//! unknown commands.

use crate::interpreter::result::{ErrorInfo, ErrorKind};

bitflags::bitflags! {
    /// Per-option behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OptionFlags: u32 {
        /// The option consumes the following argument as its value.
        const MUST_HAVE_VALUE  = 1 << 0;
        /// Terminates option processing (conventionally `--`). Always
        /// emitted last by [`OptionSet::to_argument_list`].
        const END_OF_OPTIONS   = 1 << 1;
        /// Hidden from candidate lists in error messages.
        const UNSAFE           = 1 << 2;
        /// The value is itself a list of options (opaque here).
        const LIST_OF_OPTIONS  = 1 << 3;
        /// Name matching ignores case for this set.
        const NO_CASE          = 1 << 4;
        /// Declared but deliberately not acted on.
        const IGNORED          = 1 << 5;
    }
}

/// One declared option and its runtime presence state.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    name: String,
    flags: OptionFlags,
    present: bool,
    /// Position in the original argument vector, for reconstruction.
    index: Option<usize>,
    value: Option<String>,
}

impl OptionSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> OptionFlags {
        self.flags
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Outcome of a non-failing name lookup.
///
/// `Unchanged` is the non-strict miss: the argument was not recognized
/// and whatever value the caller already had stands. It is a distinct
/// variant precisely so callers cannot mistake it for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Resolved; carries the canonical (declared) option name.
    Match(String),
    /// Not found, and the caller asked for that to be non-fatal.
    Unchanged,
}

/// A declared set of options with presence state.
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    options: Vec<OptionSpec>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option. Names must be unique within the set.
    pub fn declare(&mut self, name: impl Into<String>, flags: OptionFlags) -> &mut Self {
        let name = name.into();
        debug_assert!(
            !self.options.iter().any(|o| o.name == name),
            "duplicate option {name}"
        );
        self.options.push(OptionSpec {
            name,
            flags,
            present: false,
            index: None,
            value: None,
        });
        self
    }

    fn find(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut OptionSpec> {
        self.options.iter_mut().find(|o| o.name == name)
    }

    /// All declared names eligible for candidate lists, sorted.
    fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .options
            .iter()
            .filter(|o| !o.flags.contains(OptionFlags::UNSAFE))
            .map(|o| o.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Resolve `name` against the declared set.
    ///
    /// Exact match wins immediately. Otherwise a unique prefix match
    /// resolves; several prefix matches are an ambiguity error naming
    /// exactly those candidates; no match is a `bad option` error when
    /// `strict`, else [`Lookup::Unchanged`].
    pub fn resolve(
        &self,
        name: &str,
        strict: bool,
        no_case: bool,
    ) -> Result<Lookup, ErrorInfo> {
        let eq = |a: &str, b: &str| {
            if no_case {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };
        if let Some(opt) = self.options.iter().find(|o| eq(&o.name, name)) {
            return Ok(Lookup::Match(opt.name.clone()));
        }

        let has_prefix = |candidate: &str| {
            if no_case {
                candidate
                    .get(..name.len())
                    .is_some_and(|p| p.eq_ignore_ascii_case(name))
            } else {
                candidate.starts_with(name)
            }
        };
        let mut matched: Vec<String> = self
            .options
            .iter()
            .filter(|o| has_prefix(&o.name))
            .map(|o| o.name.clone())
            .collect();

        match matched.len() {
            1 => Ok(Lookup::Match(matched.remove(0))),
            0 if !strict => Ok(Lookup::Unchanged),
            0 => Err(ErrorInfo::with_kind(
                format!(
                    "bad option \"{name}\": must be {}",
                    to_english(&self.visible_names())
                ),
                ErrorKind::Name,
            )),
            _ => {
                matched.sort();
                Err(ErrorInfo::with_kind(
                    format!(
                        "ambiguous option \"{name}\": must be {}",
                        to_english(&matched)
                    ),
                    ErrorKind::Name,
                ))
            }
        }
    }

    /// Record an option as present at position `index` with an optional
    /// value. `name` must be a declared (canonical) name.
    pub fn set_present(&mut self, name: &str, index: usize, value: Option<String>) {
        if let Some(opt) = self.find_mut(name) {
            opt.present = true;
            opt.index = Some(index);
            opt.value = value;
        }
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.find(name).is_some_and(|o| o.present)
    }

    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(|o| o.value.as_deref())
    }

    /// Walk `args`, resolving leading `-`-prefixed words as options, and
    /// return the index of the first non-option argument.
    ///
    /// An `END_OF_OPTIONS` option stops processing (its own index is
    /// recorded, the next argument starts the tail). A non-strict miss
    /// also stops, treating the unknown word as the first tail argument.
    pub fn parse(&mut self, args: &[String], strict: bool) -> Result<usize, ErrorInfo> {
        let no_case = self
            .options
            .iter()
            .any(|o| o.flags.contains(OptionFlags::NO_CASE));
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if !arg.starts_with('-') {
                break;
            }
            let name = match self.resolve(arg, strict, no_case)? {
                Lookup::Match(name) => name,
                Lookup::Unchanged => break,
            };
            let flags = self
                .find(&name)
                .map(|o| o.flags)
                .unwrap_or(OptionFlags::empty());
            if flags.contains(OptionFlags::MUST_HAVE_VALUE) {
                let Some(value) = args.get(i + 1) else {
                    return Err(ErrorInfo::with_kind(
                        format!("missing value for option \"{name}\""),
                        ErrorKind::Name,
                    ));
                };
                self.set_present(&name, i, Some(value.clone()));
                i += 2;
            } else {
                self.set_present(&name, i, None);
                i += 1;
            }
            if flags.contains(OptionFlags::END_OF_OPTIONS) {
                break;
            }
        }
        Ok(i)
    }

    /// Reconstruct a canonical argument list from the present options,
    /// in original argument order, with any `END_OF_OPTIONS` option
    /// forced last.
    pub fn to_argument_list(&self) -> Vec<String> {
        let mut present: Vec<&OptionSpec> =
            self.options.iter().filter(|o| o.present).collect();
        present.sort_by_key(|o| {
            (
                o.flags.contains(OptionFlags::END_OF_OPTIONS),
                o.index.unwrap_or(usize::MAX),
            )
        });
        let mut out = Vec::new();
        for opt in present {
            out.push(opt.name.clone());
            if let Some(value) = &opt.value {
                out.push(value.clone());
            }
        }
        out
    }
}

/// Join alternatives the way error messages expect: `a`, `a or b`,
/// `a, b, or c`.
pub fn to_english(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} or {second}"),
        _ => {
            let (last, rest) = names.split_last().unwrap_or((&names[0], &[]));
            format!("{}, or {last}", rest.join(", "))
        }
    }
}
