//! Variable commands: `set`, `unset`, `incr`, `append`, `global`, `upvar`.

use std::sync::Arc;

use crate::dispatch::{arity_error, Command, CommandRegistry};
use crate::interpreter::result::{EvalResult, Interrupt};
use crate::interpreter::Interp;

pub fn register(registry: &mut CommandRegistry) {
    registry.register(Arc::new(Set));
    registry.register(Arc::new(Unset));
    registry.register(Arc::new(Incr));
    registry.register(Arc::new(Append));
    registry.register(Arc::new(Global));
    registry.register(Arc::new(Upvar));
}

/// Read a variable's value if it exists; missing counts as empty, but
/// any other failure (read-only links, arrays, link loops) propagates.
fn current_or_empty(interp: &mut Interp, name: &str) -> Result<String, Interrupt> {
    match interp.get_var(name) {
        Ok(value) => Ok(value),
        Err(e) if e.message.ends_with("no such variable") => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn parse_int(text: &str) -> Result<i64, Interrupt> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| Interrupt::error(format!("expected integer but got \"{text}\"")))
}

struct Set;

impl Command for Set {
    fn name(&self) -> &'static str {
        "set"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        match argv.len() {
            2 => Ok(interp.get_var(&argv[1])?),
            3 => Ok(interp.set_var(&argv[1], &argv[2])?),
            _ => Err(arity_error("set varName ?newValue?")),
        }
    }
}

struct Unset;

impl Command for Unset {
    fn name(&self) -> &'static str {
        "unset"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() < 2 {
            return Err(arity_error("unset varName ?varName ...?"));
        }
        for name in &argv[1..] {
            interp.unset_var(name)?;
        }
        Ok(String::new())
    }
}

struct Incr;

impl Command for Incr {
    fn name(&self) -> &'static str {
        "incr"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if !(2..=3).contains(&argv.len()) {
            return Err(arity_error("incr varName ?increment?"));
        }
        let step = match argv.get(2) {
            Some(text) => parse_int(text)?,
            None => 1,
        };
        // An unset variable starts from zero.
        let current = current_or_empty(interp, &argv[1])?;
        let base = if current.is_empty() {
            0
        } else {
            parse_int(&current)?
        };
        Ok(interp.set_var(&argv[1], &(base.wrapping_add(step)).to_string())?)
    }
}

struct Append;

impl Command for Append {
    fn name(&self) -> &'static str {
        "append"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() < 2 {
            return Err(arity_error("append varName ?value value ...?"));
        }
        let mut value = current_or_empty(interp, &argv[1])?;
        for piece in &argv[2..] {
            value.push_str(piece);
        }
        Ok(interp.set_var(&argv[1], &value)?)
    }
}

struct Global;

impl Command for Global {
    fn name(&self) -> &'static str {
        "global"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() < 2 {
            return Err(arity_error("global varName ?varName ...?"));
        }
        let global = interp.stack().global();
        let effective = interp.stack().follow_next(interp.stack().current());
        if effective == global {
            // Already at global scope; nothing to alias.
            return Ok(String::new());
        }
        for name in &argv[1..] {
            interp.link_var(global, name, name)?;
        }
        Ok(String::new())
    }
}

struct Upvar;

impl Command for Upvar {
    fn name(&self) -> &'static str {
        "upvar"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        let (target, _distance, rest) = super::resolve_level(interp, &argv[1..])?;
        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(arity_error(
                "upvar ?level? otherVar localVar ?otherVar localVar ...?",
            ));
        }
        for pair in rest.chunks(2) {
            interp.link_var(target, &pair[0], &pair[1])?;
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interp;

    #[test]
    fn set_reads_and_writes() {
        let mut i = Interp::new();
        assert_eq!(i.eval("set x 5").unwrap(), "5");
        assert_eq!(i.eval("set x").unwrap(), "5");
        let err = i.eval("set x 5 extra").unwrap_err();
        assert_eq!(err.message, "wrong # args: should be \"set varName ?newValue?\"");
    }

    #[test]
    fn unset_tombstones() {
        let mut i = Interp::new();
        i.eval("set x 1; set y 2").unwrap();
        i.eval("unset x y").unwrap();
        let err = i.eval("set x").unwrap_err();
        assert_eq!(err.message, "can't read \"x\": no such variable");
        let err = i.eval("unset x").unwrap_err();
        assert_eq!(err.message, "can't unset \"x\": no such variable");
    }

    #[test]
    fn incr_defaults_and_steps() {
        let mut i = Interp::new();
        assert_eq!(i.eval("incr n").unwrap(), "1");
        assert_eq!(i.eval("incr n").unwrap(), "2");
        assert_eq!(i.eval("incr n 10").unwrap(), "12");
        assert_eq!(i.eval("incr n -2").unwrap(), "10");
        let err = i.eval("set s abc; incr s").unwrap_err();
        assert_eq!(err.message, "expected integer but got \"abc\"");
    }

    #[test]
    fn append_builds_strings() {
        let mut i = Interp::new();
        assert_eq!(i.eval("append s foo bar").unwrap(), "foobar");
        assert_eq!(i.eval("append s !").unwrap(), "foobar!");
    }

    #[test]
    fn upvar_level_zero_aliases_in_frame() {
        let mut i = Interp::new();
        i.eval("set real 7").unwrap();
        i.eval("upvar 0 real alias").unwrap();
        assert_eq!(i.eval("set alias").unwrap(), "7");
        i.eval("set alias 8").unwrap();
        assert_eq!(i.eval("set real").unwrap(), "8");
    }

    #[test]
    fn upvar_bad_level() {
        let mut i = Interp::new();
        let err = i.eval("upvar 5 a b").unwrap_err();
        assert_eq!(err.message, "bad level \"5\"");
    }

    #[test]
    fn global_at_global_scope_is_noop() {
        let mut i = Interp::new();
        i.eval("set g 1").unwrap();
        i.eval("global g").unwrap();
        assert_eq!(i.eval("set g").unwrap(), "1");
    }
}
