//! Expression, substitution, and host I/O commands.

use std::sync::Arc;

use crate::dispatch::{arity_error, Command, CommandRegistry};
use crate::interpreter::result::EvalResult;
use crate::interpreter::{Interp, SubstFlags};
use crate::options::{OptionFlags, OptionSet};

pub fn register(registry: &mut CommandRegistry) {
    registry.register(Arc::new(Expr));
    registry.register(Arc::new(Subst));
    registry.register(Arc::new(Puts));
    registry.register(Arc::new(Source));
}

struct Expr;

impl Command for Expr {
    fn name(&self) -> &'static str {
        "expr"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() < 2 {
            return Err(arity_error("expr arg ?arg ...?"));
        }
        let text = argv[1..].join(" ");
        Ok(interp.expr_value(&text)?.to_string())
    }
}

struct Subst;

impl Command for Subst {
    fn name(&self) -> &'static str {
        "subst"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        let mut set = OptionSet::new();
        set.declare("-nobackslashes", OptionFlags::empty())
            .declare("-nocommands", OptionFlags::empty())
            .declare("-novariables", OptionFlags::empty());
        let tail = set.parse(&argv[1..], true)?;
        let rest = &argv[1 + tail..];
        if rest.len() != 1 {
            return Err(arity_error(
                "subst ?-nobackslashes? ?-nocommands? ?-novariables? string",
            ));
        }
        let mut flags = SubstFlags::all();
        if set.is_present("-nobackslashes") {
            flags.remove(SubstFlags::BACKSLASHES);
        }
        if set.is_present("-nocommands") {
            flags.remove(SubstFlags::COMMANDS);
        }
        if set.is_present("-novariables") {
            flags.remove(SubstFlags::VARIABLES);
        }
        interp.subst_text(&rest[0], flags)
    }
}

struct Puts;

impl Command for Puts {
    fn name(&self) -> &'static str {
        "puts"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        let (newline, text) = match argv.len() {
            2 => (true, &argv[1]),
            3 if argv[1] == "-nonewline" => (false, &argv[2]),
            _ => return Err(arity_error("puts ?-nonewline? string")),
        };
        let io = interp.io();
        let state = interp.host_state();
        state.begin_write();
        let result = if newline {
            io.write_line(text)
        } else {
            io.write(text)
        };
        state.finish_write();
        result?;
        Ok(String::new())
    }
}

struct Source;

impl Command for Source {
    fn name(&self) -> &'static str {
        "source"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 2 {
            return Err(arity_error("source fileName"));
        }
        Ok(interp.eval_file(&argv[1])?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::host::HostIo;
    use crate::interpreter::result::ErrorInfo;
    use crate::interpreter::{Interp, InterpConfig};

    #[derive(Default)]
    struct CaptureIo {
        out: Mutex<String>,
    }

    impl HostIo for CaptureIo {
        fn read_line(&self) -> Result<Option<String>, ErrorInfo> {
            Ok(None)
        }

        fn write(&self, text: &str) -> Result<(), ErrorInfo> {
            self.out.lock().unwrap().push_str(text);
            Ok(())
        }

        fn write_line(&self, text: &str) -> Result<(), ErrorInfo> {
            let mut out = self.out.lock().unwrap();
            out.push_str(text);
            out.push('\n');
            Ok(())
        }

        fn write_error(&self, text: &str) -> Result<(), ErrorInfo> {
            self.write_line(text)
        }
    }

    fn capture_interp() -> (Interp, Arc<CaptureIo>) {
        let io = Arc::new(CaptureIo::default());
        let interp = Interp::with_config(InterpConfig {
            io: Arc::clone(&io) as Arc<dyn HostIo>,
            ..InterpConfig::default()
        });
        (interp, io)
    }

    #[test]
    fn expr_joins_arguments() {
        let mut i = Interp::new();
        assert_eq!(i.eval("expr 1 + 2").unwrap(), "3");
        assert_eq!(i.eval("expr {3 * 4}").unwrap(), "12");
    }

    #[test]
    fn subst_flags() {
        let mut i = Interp::new();
        i.eval("set x 5").unwrap();
        assert_eq!(i.eval("subst {v=$x}").unwrap(), "v=5");
        assert_eq!(i.eval("subst -novariables {v=$x}").unwrap(), "v=$x");
        assert_eq!(i.eval("subst -nocommands {c=[set x]}").unwrap(), "c=[set x]");
        let err = i.eval("subst -nova {v=$x} extra").unwrap_err();
        assert!(err.message.starts_with("wrong # args"));
    }

    #[test]
    fn subst_option_prefix_and_bad_option() {
        let mut i = Interp::new();
        i.eval("set x 5").unwrap();
        assert_eq!(i.eval("subst -novar {v=$x}").unwrap(), "v=$x");
        let err = i.eval("subst -bogus {v}").unwrap_err();
        assert_eq!(
            err.message,
            "bad option \"-bogus\": must be -nobackslashes, -nocommands, or -novariables"
        );
        let err = i.eval("subst -no {v}").unwrap_err();
        assert!(err.message.starts_with("ambiguous option \"-no\""));
    }

    #[test]
    fn puts_writes_through_host_io() {
        let (mut i, io) = capture_interp();
        i.eval("puts hello").unwrap();
        i.eval("puts -nonewline there").unwrap();
        assert_eq!(io.out.lock().unwrap().as_str(), "hello\nthere");
        assert!(i.host_state().is_idle());
    }

    #[test]
    fn source_resolves_through_chain() {
        use crate::host::StaticSource;
        let mut i = Interp::new();
        let mut s = StaticSource::new();
        s.insert("lib.tcl", "proc double {n} { expr {$n * 2} }");
        i.sources_mut().push(Box::new(s));
        i.eval("source lib.tcl").unwrap();
        assert_eq!(i.eval("double 21").unwrap(), "42");
    }
}
