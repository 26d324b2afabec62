//! Return codes, interrupts, and error plumbing.
//!
//! Evaluation never uses Rust panics or `?`-style early exit for script
//! control flow. Every evaluation call returns
//! `Result<String, Interrupt>`: the `Ok` side is the command's string
//! result, and the `Err` side is an [`Interrupt`] — which may be a real
//! error, or one of the non-local exits (`return`, `break`, `continue`,
//! custom codes, cancellation) that control constructs intercept.
//!
//! Errors carry an [`ErrorInfo`] whose rendering is fixed: message first,
//! then `    (line N)` when a source line is known, then the accumulated
//! error-info (stack trace) block.

use std::fmt;

/// The closed set of evaluation outcomes, Tcl-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// Evaluation completed; subsequent commands keep running.
    Ok,
    /// A user-facing failure; aborts the current evaluation unit.
    Error,
    /// Early exit from the enclosing procedure.
    Return,
    /// Exit the innermost enclosing loop.
    Break,
    /// Skip to the next iteration of the innermost enclosing loop.
    Continue,
    /// An extension-defined code (from `return -code N`).
    Other(i32),
}

impl ReturnCode {
    /// The numeric code as exposed to `catch`.
    pub fn as_i32(self) -> i32 {
        match self {
            ReturnCode::Ok => 0,
            ReturnCode::Error => 1,
            ReturnCode::Return => 2,
            ReturnCode::Break => 3,
            ReturnCode::Continue => 4,
            ReturnCode::Other(n) => n,
        }
    }

    /// Parse a code name or number, as accepted by `return -code`.
    pub fn parse(text: &str) -> Option<ReturnCode> {
        match text {
            "ok" => Some(ReturnCode::Ok),
            "error" => Some(ReturnCode::Error),
            "return" => Some(ReturnCode::Return),
            "break" => Some(ReturnCode::Break),
            "continue" => Some(ReturnCode::Continue),
            _ => text.parse::<i32>().ok().map(|n| match n {
                0 => ReturnCode::Ok,
                1 => ReturnCode::Error,
                2 => ReturnCode::Return,
                3 => ReturnCode::Break,
                4 => ReturnCode::Continue,
                n => ReturnCode::Other(n),
            }),
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnCode::Ok => write!(f, "ok"),
            ReturnCode::Error => write!(f, "error"),
            ReturnCode::Return => write!(f, "return"),
            ReturnCode::Break => write!(f, "break"),
            ReturnCode::Continue => write!(f, "continue"),
            ReturnCode::Other(n) => write!(f, "{n}"),
        }
    }
}

/// Broad classification of an error, for hosts that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// Malformed script or expression syntax.
    Parse,
    /// Unresolved command, variable, or option name.
    Name,
    /// Illegal state transition (read-only write, undefined read, link loop).
    State,
    /// Cooperative cancellation unwound the evaluation.
    Cancelled,
    /// A wrapped native failure from a host collaborator.
    HostFault,
    /// Anything else (script-raised `error`, arity mistakes, ...).
    #[default]
    General,
}

/// A structured error: message, source line, and error-info block.
///
/// The error-info block is the human-readable evaluation trace built up
/// as the error bubbles through nested evaluations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<usize>,
    pub info: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            kind,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Wrap a native fault. The outer description and the fault's own
    /// message are joined into a fixed two-line message.
    pub fn host_fault(what: impl Into<String>, inner: Option<String>) -> Self {
        let what = what.into();
        let message = match inner {
            Some(inner) if !inner.is_empty() => format!("{what}\n{inner}"),
            _ => what,
        };
        Self {
            kind: ErrorKind::HostFault,
            message,
            ..Self::default()
        }
    }

    /// Record the source line, if none is recorded yet. The first (deepest)
    /// line wins; outer evaluations must not overwrite it.
    pub fn note_line(&mut self, line: usize) {
        if self.line.is_none() {
            self.line = Some(line);
        }
    }

    /// Append one evaluation frame to the error-info block.
    ///
    /// The first frame renders as `while executing`, outer frames as
    /// `invoked from within`.
    pub fn push_frame(&mut self, command_text: &str) {
        let lead = if self.info.is_none() {
            "while executing"
        } else {
            "invoked from within"
        };
        let entry = format!("{lead}\n\"{command_text}\"");
        match &mut self.info {
            Some(info) => {
                info.push('\n');
                info.push_str(&entry);
            }
            None => self.info = Some(entry),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(line) = self.line {
            write!(f, "\n    (line {line})")?;
        }
        if let Some(info) = &self.info {
            write!(f, "\n{info}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorInfo {}

impl From<ErrorInfo> for Interrupt {
    fn from(e: ErrorInfo) -> Self {
        Interrupt::Error(e)
    }
}

/// A non-Ok evaluation outcome.
///
/// True errors and control-flow signals travel through the same channel
/// but are statically distinct, so control constructs can intercept
/// `Break`/`Continue`/`Return` without ever confusing them with failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// A user-facing failure.
    Error(ErrorInfo),
    /// `return` was invoked; carries the return value.
    Return(String),
    /// `break` was invoked.
    Break,
    /// `continue` was invoked.
    Continue,
    /// `return -code N` with an extension-defined code.
    Custom { code: i32, value: String },
    /// The cancellation signal was observed.
    Cancelled,
}

impl Interrupt {
    /// Shorthand for a plain error interrupt.
    pub fn error(message: impl Into<String>) -> Self {
        Interrupt::Error(ErrorInfo::new(message))
    }

    /// The return code this interrupt maps to.
    pub fn code(&self) -> ReturnCode {
        match self {
            Interrupt::Error(_) | Interrupt::Cancelled => ReturnCode::Error,
            Interrupt::Return(_) => ReturnCode::Return,
            Interrupt::Break => ReturnCode::Break,
            Interrupt::Continue => ReturnCode::Continue,
            Interrupt::Custom { code, .. } => ReturnCode::Other(*code),
        }
    }
}

/// Result type threaded through every evaluation call.
pub type EvalResult<T = String> = Result<T, Interrupt>;

/// An ordered batch of independent error outcomes, for combined reporting
/// (e.g. every reason a script lookup was skipped).
///
/// Construction from nested lists flattens to depth 1, preserving the
/// original relative order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultList {
    items: Vec<ErrorInfo>,
}

impl ResultList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ErrorInfo) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorInfo> {
        self.items.iter()
    }

    /// Render with an explicit separator. A single-element list renders
    /// as that element alone, with no separator artifacts.
    pub fn render(&self, separator: &str) -> String {
        self.items
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl From<Vec<ErrorInfo>> for ResultList {
    fn from(items: Vec<ErrorInfo>) -> Self {
        Self { items }
    }
}

impl From<Vec<ResultList>> for ResultList {
    /// Flattens one level: nested lists contribute their elements in order.
    fn from(lists: Vec<ResultList>) -> Self {
        let mut items = Vec::new();
        for list in lists {
            items.extend(list.items);
        }
        Self { items }
    }
}

impl fmt::Display for ResultList {
    /// Space-joined, matching how batched results read when embedded in
    /// a larger message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_code_numbers() {
        assert_eq!(ReturnCode::Ok.as_i32(), 0);
        assert_eq!(ReturnCode::Error.as_i32(), 1);
        assert_eq!(ReturnCode::Return.as_i32(), 2);
        assert_eq!(ReturnCode::Break.as_i32(), 3);
        assert_eq!(ReturnCode::Continue.as_i32(), 4);
        assert_eq!(ReturnCode::Other(5).as_i32(), 5);
    }

    #[test]
    fn return_code_parse_names_and_numbers() {
        assert_eq!(ReturnCode::parse("ok"), Some(ReturnCode::Ok));
        assert_eq!(ReturnCode::parse("break"), Some(ReturnCode::Break));
        assert_eq!(ReturnCode::parse("2"), Some(ReturnCode::Return));
        assert_eq!(ReturnCode::parse("42"), Some(ReturnCode::Other(42)));
        assert_eq!(ReturnCode::parse("bogus"), None);
    }

    #[test]
    fn interrupt_codes() {
        assert_eq!(Interrupt::error("x").code(), ReturnCode::Error);
        assert_eq!(Interrupt::Return("v".into()).code(), ReturnCode::Return);
        assert_eq!(Interrupt::Break.code(), ReturnCode::Break);
        assert_eq!(Interrupt::Continue.code(), ReturnCode::Continue);
        assert_eq!(
            Interrupt::Custom { code: 7, value: String::new() }.code(),
            ReturnCode::Other(7)
        );
        assert_eq!(Interrupt::Cancelled.code(), ReturnCode::Error);
    }

    #[test]
    fn error_rendering_order() {
        let mut e = ErrorInfo::new("can't read \"x\": no such variable");
        e.note_line(3);
        e.push_frame("set y $x");
        assert_eq!(
            e.to_string(),
            "can't read \"x\": no such variable\n    (line 3)\nwhile executing\n\"set y $x\""
        );
    }

    #[test]
    fn error_line_is_sticky() {
        let mut e = ErrorInfo::new("boom");
        e.note_line(2);
        e.note_line(9);
        assert_eq!(e.line, Some(2));
    }

    #[test]
    fn error_frames_accumulate() {
        let mut e = ErrorInfo::new("boom");
        e.push_frame("inner cmd");
        e.push_frame("outer cmd");
        assert_eq!(
            e.info.as_deref(),
            Some("while executing\n\"inner cmd\"\ninvoked from within\n\"outer cmd\"")
        );
    }

    #[test]
    fn host_fault_two_line_message() {
        let e = ErrorInfo::host_fault("couldn't write to stdout", Some("broken pipe".into()));
        assert_eq!(e.kind, ErrorKind::HostFault);
        assert_eq!(e.message, "couldn't write to stdout\nbroken pipe");

        let e = ErrorInfo::host_fault("couldn't write to stdout", None);
        assert_eq!(e.message, "couldn't write to stdout");
    }

    #[test]
    fn result_list_flattens_one_level() {
        let a = ResultList::from(vec![ErrorInfo::new("a1"), ErrorInfo::new("a2")]);
        let b = ResultList::from(vec![ErrorInfo::new("b1")]);
        let flat = ResultList::from(vec![a, b]);
        assert_eq!(flat.len(), 3);
        let names: Vec<String> = flat.iter().map(|e| e.message.clone()).collect();
        assert_eq!(names, vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn result_list_single_element_renders_plain() {
        let list = ResultList::from(vec![ErrorInfo::new("only")]);
        assert_eq!(list.render("\n"), "only");
    }

    #[test]
    fn result_list_render_separator() {
        let list = ResultList::from(vec![ErrorInfo::new("x"), ErrorInfo::new("y")]);
        assert_eq!(list.render(" "), "x y");
        assert_eq!(list.render("\n"), "x\ny");
    }
}
