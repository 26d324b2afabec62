//! tickle REPL — interactive console for the tickle runtime.
//!
//! Handles:
//! - Meta-commands: `/help`, `/quit`, `/vars`, `/frames`, `/trace`
//! - Continuation prompting while braces/brackets/quotes are unbalanced
//! - Ctrl-C wired to the interpreter's cancellation token
//! - Command history via rustyline

pub mod profile;

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use tickle_kernel::interpreter::{EngineFlags, Interp, InterpConfig};
use tickle_kernel::lexer::ParseError;
use tickle_kernel::pattern::MatchMode;
use tickle_kernel::FileSource;

use profile::Profile;

/// Result from meta-command handling.
enum MetaResult {
    Continue(Option<String>),
    Exit,
}

/// What [`Repl::push_line`] wants next.
pub enum Feed {
    /// A complete unit was evaluated; optional output to display.
    Done(Option<String>),
    /// Input is unbalanced; show the continuation prompt.
    More,
    /// The user asked to leave.
    Exit,
}

/// REPL state: the interpreter plus any partial input.
pub struct Repl {
    interp: Interp,
    profile: Profile,
    pending: String,
}

impl Repl {
    pub fn new(profile: Profile) -> Self {
        let mut flags = EngineFlags::empty();
        if profile.verbose_errors {
            flags |= EngineFlags::VERBOSE_ERRORS;
        }
        if profile.trace_commands {
            flags |= EngineFlags::TRACE_COMMANDS;
        }
        let mut interp = Interp::with_config(InterpConfig {
            flags,
            max_depth: profile.max_depth,
            ..InterpConfig::default()
        });
        interp.sources_mut().push(Box::new(FileSource::new()));
        Self {
            interp,
            profile,
            pending: String::new(),
        }
    }

    pub fn interp_mut(&mut self) -> &mut Interp {
        &mut self.interp
    }

    pub fn prompt(&self) -> &str {
        if self.pending.is_empty() {
            &self.profile.prompt
        } else {
            &self.profile.more_prompt
        }
    }

    /// Drop any partial input (Ctrl-C at the continuation prompt).
    pub fn abandon_pending(&mut self) {
        self.pending.clear();
    }

    /// Feed one line of input, continuing a partial unit if one is open.
    pub fn push_line(&mut self, line: &str) -> Feed {
        if self.pending.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return Feed::Done(None);
            }
            if trimmed.starts_with('/') {
                return match self.handle_meta_command(trimmed) {
                    MetaResult::Continue(output) => Feed::Done(output),
                    MetaResult::Exit => Feed::Exit,
                };
            }
        }
        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);
        if !input_complete(&self.pending) {
            return Feed::More;
        }
        let source = std::mem::take(&mut self.pending);
        match self.interp.eval(&source) {
            Ok(value) if value.is_empty() => Feed::Done(None),
            Ok(value) => Feed::Done(Some(value)),
            Err(e) => {
                let mut text = e.message.clone();
                if let Some(info) = &e.info {
                    text.push('\n');
                    text.push_str(info);
                }
                Feed::Done(Some(text))
            }
        }
    }

    fn handle_meta_command(&mut self, cmd: &str) -> MetaResult {
        let mut parts = cmd.split_whitespace();
        let command = parts.next().unwrap_or("");
        let arg = parts.next();

        match command {
            "/quit" | "/q" | "/exit" => MetaResult::Exit,
            "/help" | "/h" | "/?" => MetaResult::Continue(Some(HELP_TEXT.to_string())),
            "/vars" => {
                let global = self.interp.stack().global();
                let names = self
                    .interp
                    .stack()
                    .frame(global)
                    .map(|f| f.vars.list_defined(MatchMode::Glob, arg))
                    .unwrap_or_else(|| Ok(Vec::new()));
                match names {
                    Ok(names) if names.is_empty() => {
                        MetaResult::Continue(Some("(no variables set)".to_string()))
                    }
                    Ok(mut names) => {
                        names.sort();
                        MetaResult::Continue(Some(names.join(" ")))
                    }
                    Err(e) => MetaResult::Continue(Some(e.to_string())),
                }
            }
            "/frames" => {
                MetaResult::Continue(Some(self.interp.stack().render(arg, false)))
            }
            "/trace" => {
                let mut flags = self.interp.flags();
                flags.toggle(EngineFlags::TRACE_COMMANDS);
                self.interp.set_flags(flags);
                MetaResult::Continue(Some(format!(
                    "command tracing: {}",
                    if flags.contains(EngineFlags::TRACE_COMMANDS) {
                        "ON"
                    } else {
                        "OFF"
                    }
                )))
            }
            _ => MetaResult::Continue(Some(format!(
                "Unknown command: {command}\nType /help for available commands."
            ))),
        }
    }
}

/// Whether `source` is a complete input unit. Unterminated braces,
/// brackets, and quotes ask for more input; any other parse failure is
/// complete (evaluation will report it properly).
pub fn input_complete(source: &str) -> bool {
    match tickle_kernel::parser::parse_script(source) {
        Ok(_) => true,
        Err(
            ParseError::MissingCloseBrace { .. }
            | ParseError::MissingCloseBracket { .. }
            | ParseError::MissingQuote { .. },
        ) => false,
        Err(_) => true,
    }
}

const HELP_TEXT: &str = r#"tickle — a Tcl-dialect shell

Meta Commands:
  /help, /?         Show this help
  /quit, /q         Exit the REPL
  /vars ?pattern?   List global variables (glob filter)
  /frames ?pattern? Show the call stack
  /trace            Toggle per-command tracing

Language:
  set name ?value?          Read or write a variable
  proc name {args} {body}   Define a procedure
  if / while / for / foreach with break and continue
  expr {...}                Arithmetic and comparisons
  catch {script} ?var?      Trap errors
  source file.tcl           Evaluate a script file

Unfinished lines (open braces, brackets, or quotes) continue on the
next prompt.
"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create history directory: {}", e);
            }
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

/// Run the interactive REPL until EOF or `/quit`.
pub fn run(profile: Profile) -> Result<()> {
    println!("tickle v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");
    println!();

    let mut rl: Editor<(), DefaultHistory> =
        Editor::new().context("Failed to create editor")?;

    let history_path = directories::BaseDirs::new()
        .map(|b| b.data_dir().join("tickle").join("history.txt"));
    if let Some(ref path) = history_path {
        if let Err(e) = rl.load_history(path) {
            let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
            if !is_not_found {
                tracing::warn!("Failed to load history: {}", e);
            }
        }
    }

    let mut repl = Repl::new(profile);
    let cancel = repl.interp_mut().cancel_token();

    loop {
        match rl.readline(repl.prompt()) {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }
                match repl.push_line(&line) {
                    Feed::Done(Some(output)) => println!("{output}"),
                    Feed::Done(None) | Feed::More => {}
                    Feed::Exit => break,
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C: cancel any in-flight eval, drop partial input.
                cancel.cancel();
                repl.abandon_pending();
                cancel.reset();
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unbalanced_input() {
        assert!(input_complete("set x 1"));
        assert!(!input_complete("proc f {} {"));
        assert!(!input_complete("set x [expr {1 +"));
        assert!(!input_complete("set x \"unterminated"));
        // A hard parse error is "complete": eval reports it.
        assert!(input_complete("set x {a}b"));
    }

    #[test]
    fn continuation_accumulates_until_balanced() {
        let mut repl = Repl::new(Profile::default());
        assert!(matches!(repl.push_line("proc f {} {"), Feed::More));
        assert_eq!(repl.prompt(), "> ");
        assert!(matches!(repl.push_line("  return hi"), Feed::More));
        assert!(matches!(repl.push_line("}"), Feed::Done(None)));
        match repl.push_line("f") {
            Feed::Done(Some(out)) => assert_eq!(out, "hi"),
            _ => panic!("expected output"),
        }
    }

    #[test]
    fn errors_render_with_info() {
        let mut repl = Repl::new(Profile::default());
        match repl.push_line("nosuchcmd") {
            Feed::Done(Some(out)) => {
                assert!(out.starts_with("invalid command name \"nosuchcmd\""));
                assert!(out.contains("while executing"));
            }
            _ => panic!("expected error output"),
        }
    }

    #[test]
    fn meta_commands() {
        let mut repl = Repl::new(Profile::default());
        assert!(matches!(repl.push_line("/quit"), Feed::Exit));
        repl.push_line("set alpha 1");
        match repl.push_line("/vars a*") {
            Feed::Done(Some(out)) => assert_eq!(out, "alpha"),
            _ => panic!("expected variable list"),
        }
    }
}
