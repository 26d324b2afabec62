//! Host integration seams.
//!
//! The engine never touches files, consoles, or logging backends
//! directly; it goes through the narrow capabilities here. A host
//! composes the pieces it cares about: a [`SourceChain`] of script
//! providers for `source`-style loads, a [`HostIo`] for prompt and
//! diagnostic I/O, and a [`TraceSink`] for structured trace events.
//! Every capability has a do-nothing or stdlib-backed default, so an
//! embedding host only implements what it wants to change.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::interpreter::result::{ErrorInfo, ErrorKind, ResultList};

bitflags::bitflags! {
    /// Which provider categories a script lookup may consult.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScriptFlags: u32 {
        const NO_FILE_SYSTEM = 1 << 0;
        const NO_STATIC      = 1 << 1;
    }
}

/// Provider category, used by [`ScriptFlags`] to skip whole classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCategory {
    FileSystem,
    Static,
    Other,
}

impl SourceCategory {
    fn skipped_by(self, flags: ScriptFlags) -> bool {
        match self {
            SourceCategory::FileSystem => flags.contains(ScriptFlags::NO_FILE_SYSTEM),
            SourceCategory::Static => flags.contains(ScriptFlags::NO_STATIC),
            SourceCategory::Other => false,
        }
    }
}

/// A resolved script and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptInfo {
    pub name: String,
    pub text: String,
    /// Human-readable origin (path, provider name) for diagnostics.
    pub origin: String,
}

/// One script provider consulted by [`SourceChain`].
pub trait ScriptSource: Send + Sync {
    /// Provider name for skip/miss reporting.
    fn name(&self) -> &str;

    fn category(&self) -> SourceCategory;

    /// `Ok(None)` means "not found here"; `Err` means the provider was
    /// consulted and failed (unreadable file, ...).
    fn get_script(&self, name: &str) -> Result<Option<ScriptInfo>, ErrorInfo>;
}

/// Serves scripts from the file system, optionally under a base directory.
pub struct FileSource {
    base: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self { base: None }
    }

    pub fn rooted(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptSource for FileSource {
    fn name(&self) -> &str {
        "file system"
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::FileSystem
    }

    fn get_script(&self, name: &str) -> Result<Option<ScriptInfo>, ErrorInfo> {
        let path = match &self.base {
            Some(base) => base.join(name),
            None => PathBuf::from(name),
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(ScriptInfo {
                name: name.to_string(),
                text,
                origin: path.display().to_string(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ErrorInfo::host_fault(
                format!("couldn't read file \"{}\"", path.display()),
                Some(e.to_string()),
            )),
        }
    }
}

/// Serves scripts from an in-memory table (embedded or host-registered).
#[derive(Default)]
pub struct StaticSource {
    scripts: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.scripts.insert(name.into(), text.into());
    }
}

impl ScriptSource for StaticSource {
    fn name(&self) -> &str {
        "static scripts"
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Static
    }

    fn get_script(&self, name: &str) -> Result<Option<ScriptInfo>, ErrorInfo> {
        Ok(self.scripts.get(name).map(|text| ScriptInfo {
            name: name.to_string(),
            text: text.clone(),
            origin: format!("static:{name}"),
        }))
    }
}

/// Ordered list of providers tried until one yields the script.
///
/// On exhaustion the error reports the primary failure first, then one
/// itemized line per provider saying why it did not supply the script.
#[derive(Default)]
pub struct SourceChain {
    sources: Vec<Box<dyn ScriptSource>>,
}

impl SourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Box<dyn ScriptSource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get_script(
        &self,
        name: &str,
        flags: ScriptFlags,
    ) -> Result<ScriptInfo, ErrorInfo> {
        let mut reasons = ResultList::new();
        for source in &self.sources {
            if source.category().skipped_by(flags) {
                reasons.push(ErrorInfo::new(format!(
                    "{}: skipped by flags",
                    source.name()
                )));
                continue;
            }
            match source.get_script(name) {
                Ok(Some(info)) => return Ok(info),
                Ok(None) => reasons.push(ErrorInfo::new(format!(
                    "{}: no script named \"{name}\"",
                    source.name()
                ))),
                Err(e) => reasons.push(e),
            }
        }
        let mut message = format!("couldn't get script \"{name}\"");
        let itemized = reasons.render("\n");
        if !itemized.is_empty() {
            message.push('\n');
            message.push_str(&itemized);
        }
        Err(ErrorInfo::with_kind(message, ErrorKind::Name))
    }
}

/// Interactive and diagnostic I/O.
pub trait HostIo: Send + Sync {
    /// `Ok(None)` on end of input.
    fn read_line(&self) -> Result<Option<String>, ErrorInfo>;
    /// Write without a trailing newline.
    fn write(&self, text: &str) -> Result<(), ErrorInfo>;
    fn write_line(&self, text: &str) -> Result<(), ErrorInfo>;
    fn write_error(&self, text: &str) -> Result<(), ErrorInfo>;
}

/// [`HostIo`] over the process's standard streams.
#[derive(Debug, Default)]
pub struct StdIo;

fn io_fault(what: &str, e: io::Error) -> ErrorInfo {
    ErrorInfo::host_fault(what.to_string(), Some(e.to_string()))
}

impl HostIo for StdIo {
    fn read_line(&self) -> Result<Option<String>, ErrorInfo> {
        let mut line = String::new();
        let n = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| io_fault("failed to read standard input", e))?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with(['\n', '\r']) {
            line.pop();
        }
        Ok(Some(line))
    }

    fn write(&self, text: &str) -> Result<(), ErrorInfo> {
        let mut out = io::stdout().lock();
        write!(out, "{text}")
            .and_then(|()| out.flush())
            .map_err(|e| io_fault("failed to write standard output", e))
    }

    fn write_line(&self, text: &str) -> Result<(), ErrorInfo> {
        let mut out = io::stdout().lock();
        writeln!(out, "{text}").map_err(|e| io_fault("failed to write standard output", e))
    }

    fn write_error(&self, text: &str) -> Result<(), ErrorInfo> {
        let mut err = io::stderr().lock();
        writeln!(err, "{text}").map_err(|e| io_fault("failed to write standard error", e))
    }
}

/// How interesting a trace event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TracePriority {
    Debug,
    Info,
    Warning,
    Error,
}

/// A structured trace event from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub category: &'static str,
    pub priority: TracePriority,
    pub message: String,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Collector for engine trace events. No subscriber is always fine.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);
}

/// Discards all events.
#[derive(Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _event: &TraceEvent) {}
}

/// Forwards events to the `tracing` subscriber the host installed.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, event: &TraceEvent) {
        match event.priority {
            TracePriority::Debug => {
                tracing::debug!(category = event.category, "{}", event.message)
            }
            TracePriority::Info => {
                tracing::info!(category = event.category, "{}", event.message)
            }
            TracePriority::Warning => {
                tracing::warn!(category = event.category, "{}", event.message)
            }
            TracePriority::Error => {
                tracing::error!(category = event.category, "{}", event.message)
            }
        }
    }
}

/// Shared readiness gate for host teardown.
///
/// A cooperating thread (UI, shutdown sequence) checks [`HostState::is_idle`]
/// before tearing down shared console resources; the evaluator brackets
/// its host I/O with the begin/finish pairs.
#[derive(Debug, Default)]
pub struct HostState {
    pending_reads: AtomicUsize,
    pending_writes: AtomicUsize,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_read(&self) {
        self.pending_reads.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish_read(&self) {
        self.pending_reads.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn begin_write(&self) {
        self.pending_writes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish_write(&self) {
        self.pending_writes.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pending_reads(&self) -> usize {
        self.pending_reads.load(Ordering::SeqCst)
    }

    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending_reads() == 0 && self.pending_writes() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn static_source_hit_and_miss() {
        let mut source = StaticSource::new();
        source.insert("init", "set x 1");
        let info = source.get_script("init").unwrap().unwrap();
        assert_eq!(info.text, "set x 1");
        assert_eq!(info.origin, "static:init");
        assert!(source.get_script("other").unwrap().is_none());
    }

    #[test]
    fn chain_returns_first_hit() {
        let mut first = StaticSource::new();
        first.insert("a", "from first");
        let mut second = StaticSource::new();
        second.insert("a", "from second");
        let mut chain = SourceChain::new();
        chain.push(Box::new(first));
        chain.push(Box::new(second));
        let info = chain.get_script("a", ScriptFlags::empty()).unwrap();
        assert_eq!(info.text, "from first");
    }

    #[test]
    fn chain_miss_itemizes_providers() {
        let mut chain = SourceChain::new();
        chain.push(Box::new(StaticSource::new()));
        let err = chain.get_script("boot", ScriptFlags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
        let text = err.to_string();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("couldn't get script \"boot\""));
        assert_eq!(
            lines.next(),
            Some("static scripts: no script named \"boot\"")
        );
    }

    #[test]
    fn chain_flags_skip_categories() {
        let mut source = StaticSource::new();
        source.insert("boot", "x");
        let mut chain = SourceChain::new();
        chain.push(Box::new(source));
        let err = chain.get_script("boot", ScriptFlags::NO_STATIC).unwrap_err();
        assert!(err.to_string().contains("static scripts: skipped by flags"));
    }

    #[test]
    fn file_source_missing_is_none() {
        let source = FileSource::rooted("/nonexistent-dir-for-test");
        assert!(source.get_script("missing.tcl").unwrap().is_none());
    }

    #[test]
    fn host_state_counters() {
        let state = HostState::new();
        assert!(state.is_idle());
        state.begin_read();
        state.begin_write();
        assert!(!state.is_idle());
        assert_eq!(state.pending_reads(), 1);
        state.finish_read();
        assert!(!state.is_idle());
        state.finish_write();
        assert!(state.is_idle());
    }

    #[test]
    fn sink_collects_events() {
        struct Collect(Mutex<Vec<String>>);
        impl TraceSink for Collect {
            fn emit(&self, event: &TraceEvent) {
                self.0.lock().unwrap().push(event.to_string());
            }
        }
        let sink = Collect(Mutex::new(Vec::new()));
        sink.emit(&TraceEvent {
            category: "engine",
            priority: TracePriority::Info,
            message: "ready".to_string(),
        });
        assert_eq!(sink.0.lock().unwrap().as_slice(), ["[engine] ready"]);
    }
}
