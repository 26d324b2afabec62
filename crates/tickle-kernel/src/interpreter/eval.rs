//! The evaluation engine.
//!
//! [`Interp`] owns the call stack, the command registry, script-defined
//! procedures, and the host capabilities, and funnels every public entry
//! (script, expression, file, whole-string substitution) into one
//! pipeline: parse, substitute each word per the active [`SubstFlags`],
//! dispatch the first word, and thread the resulting [`Interrupt`]s back
//! up. `Ok` continues with the next command; any interrupt abandons the
//! rest of the current evaluation unit and bubbles to the caller.
//!
//! Cancellation is cooperative: a [`CancelToken`] is checked at every
//! command boundary (and control-flow commands check it per iteration),
//! unwinding with [`Interrupt::Cancelled`], which the top-level entry
//! turns into an [`ErrorKind::Cancelled`] error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::{arity_error, CommandRegistry};
use crate::expr::{self, Value};
use crate::host::{
    HostIo, HostState, ScriptFlags, SourceChain, StdIo, TraceEvent, TracePriority, TraceSink,
    TracingSink,
};
use crate::lexer::{ParseError, Scanner};
use crate::options::to_english;
use crate::parser::{self, ParsedCommand, Part, Word};

use super::frame::{CallStack, FrameId, FrameKind, TeardownToken};
use super::result::{ErrorInfo, ErrorKind, EvalResult, Interrupt};
use super::store::{TraceFn, TraceHook, TraceOp, VariableFlags};

bitflags::bitflags! {
    /// Engine-wide behavior switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EngineFlags: u32 {
        /// Name-resolution failures enumerate valid alternatives.
        const VERBOSE_ERRORS = 1 << 0;
        /// Emit a trace event for every dispatched command.
        const TRACE_COMMANDS = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Which substitution classes are performed on words.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SubstFlags: u32 {
        const VARIABLES   = 1 << 0;
        const COMMANDS    = 1 << 1;
        const BACKSLASHES = 1 << 2;
    }
}

impl Default for SubstFlags {
    fn default() -> Self {
        SubstFlags::all()
    }
}

/// Shared cooperative-cancellation signal.
///
/// Cancellation is requested by bumping a counter (possibly repeatedly,
/// from another thread); the engine observes it at evaluation-loop
/// boundaries and unwinds. The top-level entry resets the counter once
/// the unwind completes so the interpreter stays usable.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicUsize>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current evaluation.
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// One formal parameter of a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<String>,
}

/// A script-defined procedure.
///
/// A trailing parameter literally named `args` is variadic: it collects
/// the remaining arguments as a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Proc {
    pub name: String,
    pub params: Vec<Param>,
    pub body: String,
}

impl Proc {
    /// Render the `wrong # args` usage string.
    pub fn usage(&self) -> String {
        let mut usage = self.name.clone();
        for (i, param) in self.params.iter().enumerate() {
            if param.name == "args" && i == self.params.len() - 1 {
                usage.push_str(" ?arg ...?");
            } else if param.default.is_some() {
                usage.push_str(&format!(" ?{}?", param.name));
            } else {
                usage.push_str(&format!(" {}", param.name));
            }
        }
        usage
    }

    /// Bind `argv[1..]` to the formals.
    fn bind(&self, argv: &[String]) -> Result<Vec<(String, String)>, Interrupt> {
        let args = &argv[1..];
        let variadic = self
            .params
            .last()
            .is_some_and(|p| p.name == "args" && p.default.is_none());
        let mut bound = Vec::with_capacity(self.params.len());
        for (i, param) in self.params.iter().enumerate() {
            if variadic && i == self.params.len() - 1 {
                let rest: Vec<String> = args.iter().skip(i).cloned().collect();
                bound.push(("args".to_string(), make_list(&rest)));
                return Ok(bound);
            }
            let value = match args.get(i) {
                Some(value) => value.clone(),
                None => match &param.default {
                    Some(default) => default.clone(),
                    None => return Err(arity_error(&self.usage())),
                },
            };
            bound.push((param.name.clone(), value));
        }
        if args.len() > self.params.len() {
            return Err(arity_error(&self.usage()));
        }
        Ok(bound)
    }
}

/// Construction-time settings for [`Interp`].
pub struct InterpConfig {
    pub flags: EngineFlags,
    /// Nested-evaluation limit; guards runaway recursion.
    pub max_depth: usize,
    pub io: Arc<dyn HostIo>,
    pub sink: Arc<dyn TraceSink>,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            flags: EngineFlags::empty(),
            max_depth: 1000,
            io: Arc::new(StdIo),
            sink: Arc::new(TracingSink),
        }
    }
}

/// A scripting interpreter instance.
///
/// Single-threaded by construction: evaluation mutates the call stack in
/// place, so all entry points take `&mut self`. The only cross-thread
/// touchpoints are the [`CancelToken`] and the [`HostState`] counters.
pub struct Interp {
    stack: CallStack,
    commands: CommandRegistry,
    procs: HashMap<String, Proc>,
    sources: SourceChain,
    io: Arc<dyn HostIo>,
    sink: Arc<dyn TraceSink>,
    host_state: Arc<HostState>,
    cancel: CancelToken,
    flags: EngineFlags,
    depth: usize,
    max_depth: usize,
    disposed: bool,
}

impl Interp {
    pub fn new() -> Self {
        Self::with_config(InterpConfig::default())
    }

    pub fn with_config(config: InterpConfig) -> Self {
        let mut commands = CommandRegistry::new();
        crate::commands::register_builtins(&mut commands);
        Self {
            stack: CallStack::new(),
            commands,
            procs: HashMap::new(),
            sources: SourceChain::new(),
            io: config.io,
            sink: config.sink,
            host_state: Arc::new(HostState::new()),
            cancel: CancelToken::new(),
            flags: config.flags,
            depth: 0,
            max_depth: config.max_depth,
            disposed: false,
        }
    }

    // ── host wiring ──────────────────────────────────────────────────

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut CallStack {
        &mut self.stack
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    pub fn sources_mut(&mut self) -> &mut SourceChain {
        &mut self.sources
    }

    pub fn io(&self) -> Arc<dyn HostIo> {
        Arc::clone(&self.io)
    }

    pub fn sink(&self) -> Arc<dyn TraceSink> {
        Arc::clone(&self.sink)
    }

    pub fn host_state(&self) -> Arc<HostState> {
        Arc::clone(&self.host_state)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn flags(&self) -> EngineFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: EngineFlags) {
        self.flags = flags;
    }

    pub fn define_proc(&mut self, proc: Proc) {
        self.procs.insert(proc.name.clone(), proc);
    }

    pub fn get_proc(&self, name: &str) -> Option<&Proc> {
        self.procs.get(name)
    }

    /// Tear down the interpreter, freeing every frame including the
    /// global one. Idempotent; also runs on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.stack.free_all_for_teardown(TeardownToken::new());
    }

    // ── public evaluation entries ────────────────────────────────────

    /// Evaluate a script. A top-level `return` yields its value as an
    /// ordinary success; stray `break`/`continue` and unknown custom
    /// codes are errors at this boundary.
    pub fn eval(&mut self, source: &str) -> Result<String, ErrorInfo> {
        let result = self.eval_with(source, SubstFlags::all());
        self.finish(result)
    }

    /// Evaluate an expression to its printed value.
    pub fn eval_expr(&mut self, text: &str) -> Result<String, ErrorInfo> {
        let result = self.expr_value(text).map(|v| v.to_string());
        self.finish(result)
    }

    /// Perform substitutions on a whole string, without word splitting
    /// or command dispatch of the string itself.
    pub fn subst(&mut self, text: &str, subst: SubstFlags) -> Result<String, ErrorInfo> {
        let result = self.subst_text(text, subst);
        self.finish(result)
    }

    /// Resolve `name` through the script-source chain and evaluate it.
    pub fn eval_file(&mut self, name: &str) -> Result<String, ErrorInfo> {
        let info = self.sources.get_script(name, ScriptFlags::empty())?;
        self.eval(&info.text)
    }

    fn finish(&mut self, result: EvalResult) -> Result<String, ErrorInfo> {
        match result {
            Ok(value) => Ok(value),
            Err(Interrupt::Return(value)) => Ok(value),
            Err(Interrupt::Error(e)) => Err(e),
            Err(Interrupt::Break) => {
                Err(ErrorInfo::new("invoked \"break\" outside of a loop"))
            }
            Err(Interrupt::Continue) => {
                Err(ErrorInfo::new("invoked \"continue\" outside of a loop"))
            }
            Err(Interrupt::Custom { code, .. }) => {
                Err(ErrorInfo::new(format!("command returned bad code: {code}")))
            }
            Err(Interrupt::Cancelled) => {
                self.cancel.reset();
                Err(ErrorInfo::with_kind("eval canceled", ErrorKind::Cancelled))
            }
        }
    }

    // ── the evaluation pipeline ──────────────────────────────────────

    /// Evaluate script text under the given substitution flags. This is
    /// the single pipeline every entry funnels into; commands recurse
    /// through it for bodies and bracket substitutions.
    pub fn eval_with(&mut self, source: &str, subst: SubstFlags) -> EvalResult {
        if self.depth >= self.max_depth {
            return Err(Interrupt::Error(ErrorInfo::with_kind(
                "too many nested evaluations (infinite loop?)",
                ErrorKind::State,
            )));
        }
        self.depth += 1;
        let result = self.eval_commands(source, subst);
        self.depth -= 1;
        result
    }

    fn eval_commands(&mut self, source: &str, subst: SubstFlags) -> EvalResult {
        let script = parser::parse_script(source).map_err(parse_interrupt)?;
        let mut result = String::new();
        for command in &script.commands {
            self.check_cancel()?;
            match self.run_command(command, subst) {
                Ok(value) => result = value,
                Err(Interrupt::Error(mut e)) => {
                    e.note_line(command.line);
                    e.push_frame(&command.text);
                    return Err(Interrupt::Error(e));
                }
                Err(other) => return Err(other),
            }
        }
        Ok(result)
    }

    fn run_command(&mut self, command: &ParsedCommand, subst: SubstFlags) -> EvalResult {
        let mut words = Vec::with_capacity(command.words.len());
        for word in &command.words {
            words.push(self.render_word(word, subst)?);
        }
        let Some(name) = words.first().cloned() else {
            return Ok(String::new());
        };

        if self.flags.contains(EngineFlags::TRACE_COMMANDS) {
            self.sink.emit(&TraceEvent {
                category: "command",
                priority: TracePriority::Debug,
                message: command.text.clone(),
            });
        }

        if let Some(proc) = self.procs.get(&name).cloned() {
            return self.call_proc(&proc, &words);
        }
        if let Some(cmd) = self.commands.get(&name) {
            return cmd.execute(self, &words);
        }
        Err(self.unknown_command(&name))
    }

    /// Run a procedure body in a fresh frame. `Return` lands here; a
    /// stray `break`/`continue` escaping the body is an error.
    pub fn call_proc(&mut self, proc: &Proc, argv: &[String]) -> EvalResult {
        let bindings = proc.bind(argv)?;
        let frame = self.stack.push(FrameKind::Procedure(proc.name.clone()), None);
        for (name, value) in bindings {
            if let Some(f) = self.stack.frame_mut(frame) {
                f.vars.obtain(&name, frame).set_scalar(value);
            }
        }
        let result = self.eval_with(&proc.body, SubstFlags::all());
        self.stack.pop();
        match result {
            Err(Interrupt::Return(value)) => Ok(value),
            Err(Interrupt::Break) => {
                Err(Interrupt::error("invoked \"break\" outside of a loop"))
            }
            Err(Interrupt::Continue) => {
                Err(Interrupt::error("invoked \"continue\" outside of a loop"))
            }
            other => other,
        }
    }

    fn unknown_command(&self, name: &str) -> Interrupt {
        let message = if self.flags.contains(EngineFlags::VERBOSE_ERRORS) {
            let mut names = self.commands.names();
            names.extend(self.procs.keys().cloned());
            names.sort();
            names.dedup();
            format!(
                "invalid command name \"{name}\": must be {}",
                to_english(&names)
            )
        } else {
            format!("invalid command name \"{name}\"")
        };
        Interrupt::Error(ErrorInfo::with_kind(message, ErrorKind::Name))
    }

    /// Fail with [`Interrupt::Cancelled`] if cancellation was requested.
    pub fn check_cancel(&self) -> EvalResult<()> {
        if self.cancel.requested() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    // ── substitution ─────────────────────────────────────────────────

    fn render_word(&mut self, word: &Word, subst: SubstFlags) -> EvalResult {
        if word.braced {
            return Ok(match word.parts.first() {
                Some(Part::Literal(text)) => text.clone(),
                _ => String::new(),
            });
        }
        self.render_parts(&word.parts, subst)
    }

    fn render_parts(&mut self, parts: &[Part], subst: SubstFlags) -> EvalResult {
        let mut out = String::new();
        for part in parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Backslash { raw, decoded } => {
                    if subst.contains(SubstFlags::BACKSLASHES) {
                        out.push_str(decoded);
                    } else {
                        out.push_str(raw);
                    }
                }
                Part::Var(var) => {
                    if subst.contains(SubstFlags::VARIABLES) {
                        let name = match &var.index {
                            Some(index) => {
                                format!("{}({})", var.name, self.render_parts(index, subst)?)
                            }
                            None => var.name.clone(),
                        };
                        let value = self.get_var(&name)?;
                        out.push_str(&value);
                    } else {
                        out.push_str(&var.raw);
                    }
                }
                Part::Script { raw, body } => {
                    if subst.contains(SubstFlags::COMMANDS) {
                        let value = self.eval_with(body, SubstFlags::all())?;
                        out.push_str(&value);
                    } else {
                        out.push_str(raw);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Substitute a whole string as a template (no word splitting).
    pub fn subst_text(&mut self, text: &str, subst: SubstFlags) -> EvalResult {
        let parts = parser::parse_template(text).map_err(parse_interrupt)?;
        self.render_parts(&parts, subst)
    }

    /// Substitute then evaluate expression text to a typed [`Value`].
    pub fn expr_value(&mut self, text: &str) -> EvalResult<Value> {
        let substituted = self.subst_text(text, SubstFlags::all())?;
        expr::eval_value(&substituted).map_err(Interrupt::Error)
    }

    // ── variable access ──────────────────────────────────────────────

    /// Read a variable (`name` or `name(index)`), following uplevel
    /// aliasing and link chains.
    pub fn get_var(&mut self, name: &str) -> Result<String, ErrorInfo> {
        let (base, index) = split_array(name);
        let start = self.stack.follow_next(self.stack.current());
        let (frame, real) = self.stack.resolve_link(start, base)?;
        let sink = Arc::clone(&self.sink);

        let Some(var) = self.stack.frame(frame).and_then(|f| f.vars.get(&real)) else {
            return Err(no_such_variable("read", name));
        };
        if var.is_undefined() {
            return Err(no_such_variable("read", name));
        }
        let value = match index {
            Some(idx) => {
                if !var.is_array() {
                    return Err(state_error(format!(
                        "can't read \"{name}\": variable isn't array"
                    )));
                }
                var.element(idx)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        state_error(format!(
                            "can't read \"{name}\": no such element in array"
                        ))
                    })?
            }
            None => {
                if var.is_array() {
                    return Err(state_error(format!(
                        "can't read \"{name}\": variable is array"
                    )));
                }
                var.scalar().unwrap_or_default().to_string()
            }
        };
        var.fire_traces(TraceOp::Read);
        if var.flags.contains(VariableFlags::WATCH_READ) {
            sink.emit(&TraceEvent {
                category: "variable",
                priority: TracePriority::Info,
                message: format!("watch: read {name}"),
            });
        }
        Ok(value)
    }

    /// Write a variable, following uplevel aliasing and link chains.
    /// Returns the stored value.
    pub fn set_var(&mut self, name: &str, value: &str) -> Result<String, ErrorInfo> {
        let (base, index) = split_array(name);
        let start = self.stack.follow_next(self.stack.current());
        let (frame, real) = self.stack.resolve_link(start, base)?;
        let sink = Arc::clone(&self.sink);

        let store_frame = self
            .stack
            .frame_mut(frame)
            .ok_or_else(|| state_error(format!("can't set \"{name}\": frame is gone")))?;
        let var = store_frame.vars.obtain(&real, frame);
        if var.is_read_only() {
            return Err(state_error(format!(
                "can't set \"{name}\": variable is read-only"
            )));
        }
        match index {
            Some(idx) => var.set_element(idx, value),
            None => {
                if var.is_array() {
                    return Err(state_error(format!(
                        "can't set \"{name}\": variable is array"
                    )));
                }
                var.set_scalar(value);
            }
        }
        var.fire_traces(TraceOp::Write);
        if var.flags.contains(VariableFlags::WATCH_WRITE) {
            sink.emit(&TraceEvent {
                category: "variable",
                priority: TracePriority::Info,
                message: format!("watch: write {name}"),
            });
        }
        Ok(value.to_string())
    }

    /// Tombstone a variable: fire unset traces, drop the value, keep
    /// read-only and watchpoint metadata on the record.
    pub fn unset_var(&mut self, name: &str) -> Result<(), ErrorInfo> {
        let (base, _index) = split_array(name);
        let start = self.stack.follow_next(self.stack.current());
        let (frame, real) = self.stack.resolve_link(start, base)?;
        let sink = Arc::clone(&self.sink);

        let Some(var) = self
            .stack
            .frame_mut(frame)
            .and_then(|f| f.vars.get_mut(&real))
        else {
            return Err(no_such_variable("unset", name));
        };
        if var.is_undefined() {
            return Err(no_such_variable("unset", name));
        }
        if var.is_read_only() {
            return Err(state_error(format!(
                "can't unset \"{name}\": variable is read-only"
            )));
        }
        var.fire_traces(TraceOp::Unset);
        let watched = var.flags.contains(VariableFlags::WATCH_UNSET);
        var.make_undefined();
        if watched {
            sink.emit(&TraceEvent {
                category: "variable",
                priority: TracePriority::Info,
                message: format!("watch: unset {name}"),
            });
        }
        Ok(())
    }

    /// Create a link variable `local` in the effective current frame
    /// aliasing `(target, target_name)`. Used by `upvar` and `global`.
    pub fn link_var(
        &mut self,
        target: FrameId,
        target_name: &str,
        local: &str,
    ) -> Result<(), ErrorInfo> {
        let frame = self.stack.follow_next(self.stack.current());
        if frame == target && local == target_name {
            return Err(state_error(format!(
                "can't upvar from variable to itself: \"{local}\""
            )));
        }
        let store_frame = self
            .stack
            .frame_mut(frame)
            .ok_or_else(|| state_error(format!("can't link \"{local}\": frame is gone")))?;
        if let Some(existing) = store_frame.vars.get(local) {
            if !existing.is_undefined() && !existing.is_link() {
                return Err(state_error(format!("variable \"{local}\" already exists")));
            }
        }
        store_frame
            .vars
            .obtain(local, frame)
            .set_link(target, target_name);
        Ok(())
    }

    /// Attach a watchpoint to a variable, creating its record if needed.
    /// `ops` selects which accesses fire (the `WATCH_*` flags).
    pub fn watch_var(
        &mut self,
        name: &str,
        ops: VariableFlags,
        handler: Arc<TraceFn>,
    ) -> Result<(), ErrorInfo> {
        let (base, _index) = split_array(name);
        let start = self.stack.follow_next(self.stack.current());
        let (frame, real) = self.stack.resolve_link(start, base)?;
        let store_frame = self
            .stack
            .frame_mut(frame)
            .ok_or_else(|| state_error(format!("can't watch \"{name}\": frame is gone")))?;
        let var = store_frame.vars.obtain(&real, frame);
        let ops = ops.watchpoints();
        var.flags |= ops;
        var.add_trace(TraceHook { ops, handler });
        Ok(())
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interp {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn parse_interrupt(e: ParseError) -> Interrupt {
    let mut info = ErrorInfo::with_kind(e.to_string(), ErrorKind::Parse);
    info.note_line(e.line());
    Interrupt::Error(info)
}

fn state_error(message: String) -> ErrorInfo {
    ErrorInfo::with_kind(message, ErrorKind::State)
}

fn no_such_variable(verb: &str, name: &str) -> ErrorInfo {
    state_error(format!("can't {verb} \"{name}\": no such variable"))
}

/// Split `name(index)` into base name and element selector.
pub fn split_array(name: &str) -> (&str, Option<&str>) {
    if let Some(open) = name.find('(') {
        if name.ends_with(')') && open > 0 {
            return (&name[..open], Some(&name[open + 1..name.len() - 1]));
        }
    }
    (name, None)
}

/// Quote one list element: braced when it is empty or contains
/// whitespace or braces.
pub fn quote_list_item(item: &str) -> String {
    let needs_braces = item.is_empty()
        || item
            .chars()
            .any(|c| c.is_whitespace() || c == '{' || c == '}');
    if needs_braces {
        format!("{{{item}}}")
    } else {
        item.to_string()
    }
}

/// Join items into list text, quoting as needed.
pub fn make_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| quote_list_item(item))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split list text into elements: whitespace-separated, with braced and
/// quoted elements kept whole.
pub fn split_list(text: &str) -> Result<Vec<String>, ErrorInfo> {
    let mut s = Scanner::new(text);
    let mut items = Vec::new();
    loop {
        s.skip_blank();
        while s.peek() == Some('\n') {
            s.next();
            s.skip_blank();
        }
        if s.eof() {
            break;
        }
        match s.peek() {
            Some('{') => {
                let item = s
                    .read_braced()
                    .map_err(|_| ErrorInfo::with_kind("unmatched open brace in list", ErrorKind::Parse))?;
                items.push(item);
            }
            Some('"') => {
                s.next();
                let mut item = String::new();
                loop {
                    match s.next() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(c) = s.next() {
                                item.push(c);
                            }
                        }
                        Some(c) => item.push(c),
                        None => {
                            return Err(ErrorInfo::with_kind(
                                "unmatched open quote in list",
                                ErrorKind::Parse,
                            ))
                        }
                    }
                }
                items.push(item);
            }
            _ => {
                let mut item = String::new();
                while let Some(c) = s.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    item.push(c);
                    s.next();
                }
                items.push(item);
            }
        }
    }
    Ok(items)
}
