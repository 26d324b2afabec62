//! Command dispatch — the single execution path for all commands.
//!
//! Every command the engine can invoke implements [`Command`] and lives
//! in a [`CommandRegistry`]. Dispatch order is: script-defined
//! procedures first, then registered commands, then an unknown-command
//! error (which, in verbose mode, enumerates the alternatives the same
//! way option resolution does).
//!
//! `execute` takes the interpreter mutably; the registry hands out
//! cloned `Arc`s so a running command never holds a borrow of the
//! registry it came from.

use std::collections::HashMap;
use std::sync::Arc;

use crate::interpreter::result::{EvalResult, Interrupt};

/// One invocable command.
pub trait Command: Send + Sync {
    /// Canonical name the command registers under.
    fn name(&self) -> &'static str;

    /// Run the command. `argv[0]` is the name as invoked; the remaining
    /// words are fully substituted arguments.
    fn execute(&self, interp: &mut crate::interpreter::Interp, argv: &[String]) -> EvalResult;
}

/// Name → command table.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its canonical name, replacing any
    /// previous registration.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.commands.remove(name).is_some()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// The standard arity failure.
pub fn arity_error(usage: &str) -> Interrupt {
    Interrupt::error(format!("wrong # args: should be \"{usage}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interp;

    struct Nop;
    impl Command for Nop {
        fn name(&self) -> &'static str {
            "nop"
        }
        fn execute(&self, _interp: &mut Interp, _argv: &[String]) -> EvalResult {
            Ok(String::new())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Nop));
        assert!(registry.contains("nop"));
        assert!(registry.get("nop").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn names_are_sorted() {
        struct Named(&'static str);
        impl Command for Named {
            fn name(&self) -> &'static str {
                self.0
            }
            fn execute(&self, _interp: &mut Interp, _argv: &[String]) -> EvalResult {
                Ok(String::new())
            }
        }
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Named("zeta")));
        registry.register(Arc::new(Named("alpha")));
        assert_eq!(registry.names(), ["alpha", "zeta"]);
    }

    #[test]
    fn arity_error_text() {
        let Interrupt::Error(e) = arity_error("set varName ?newValue?") else {
            panic!("expected error interrupt");
        };
        assert_eq!(
            e.to_string(),
            "wrong # args: should be \"set varName ?newValue?\""
        );
    }
}
