//! tickle-kernel: an embeddable Tcl-dialect runtime.
//!
//! This crate provides:
//!
//! - **Lexer / Parser**: word- and substitution-aware scanning of script
//!   text into commands, with exact source lines for diagnostics
//! - **Interpreter**: the call stack, variable store, and evaluation
//!   engine with Tcl-style return-code control flow
//! - **Commands**: the builtin command set (`set`, `if`, `while`,
//!   `proc`, `upvar`, ...) behind a registry hosts can extend
//! - **Options**: prefix-matching flag resolution for command arguments
//! - **Expr**: the arithmetic/relational expression evaluator
//! - **Host**: the seams an embedding host implements — script sources,
//!   console I/O, trace sinks, and teardown-readiness state
//! - **Pattern**: glob-style string matching

pub mod commands;
pub mod dispatch;
pub mod expr;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod pattern;

pub use dispatch::{arity_error, Command, CommandRegistry};
pub use host::{
    FileSource, HostIo, HostState, NullSink, ScriptFlags, ScriptInfo, ScriptSource, SourceChain,
    StaticSource, StdIo, TraceEvent, TracePriority, TraceSink, TracingSink,
};
pub use interpreter::{
    CancelToken, EngineFlags, ErrorInfo, ErrorKind, EvalResult, Interp, InterpConfig, Interrupt,
    Proc, ReturnCode, SubstFlags,
};

// Embedding conveniences
pub use interpreter::{make_list, split_list};
pub use options::{Lookup, OptionFlags, OptionSet};
