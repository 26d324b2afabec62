//! Control-flow commands.
//!
//! Loop commands check the cancellation signal once per iteration, so a
//! cancel request lands within one iteration even when the loop body
//! never yields. `break`/`continue`/`return` travel as [`Interrupt`]
//! variants and are intercepted by the nearest enclosing construct.

use std::sync::Arc;

use crate::dispatch::{arity_error, Command, CommandRegistry};
use crate::interpreter::result::{ErrorInfo, EvalResult, Interrupt, ReturnCode};
use crate::interpreter::{split_list, Interp, Param, Proc, SubstFlags};

pub fn register(registry: &mut CommandRegistry) {
    registry.register(Arc::new(If));
    registry.register(Arc::new(While));
    registry.register(Arc::new(For));
    registry.register(Arc::new(Foreach));
    registry.register(Arc::new(Break));
    registry.register(Arc::new(Continue));
    registry.register(Arc::new(Return));
    registry.register(Arc::new(ErrorCmd));
    registry.register(Arc::new(Catch));
    registry.register(Arc::new(Uplevel));
    registry.register(Arc::new(ProcCmd));
}

const IF_USAGE: &str = "if expr1 ?then? body1 elseif expr2 ?then? body2 ... ?else? bodyN";

/// Run one loop body; returns `Ok(true)` to keep looping, `Ok(false)`
/// on `break`.
fn run_body(interp: &mut Interp, body: &str) -> EvalResult<bool> {
    match interp.eval_with(body, SubstFlags::all()) {
        Ok(_) | Err(Interrupt::Continue) => Ok(true),
        Err(Interrupt::Break) => Ok(false),
        Err(other) => Err(other),
    }
}

struct If;

impl Command for If {
    fn name(&self) -> &'static str {
        "if"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        let mut i = 1;
        loop {
            let Some(cond) = argv.get(i) else {
                return Err(arity_error(IF_USAGE));
            };
            i += 1;
            if argv.get(i).map(String::as_str) == Some("then") {
                i += 1;
            }
            let Some(body) = argv.get(i) else {
                return Err(arity_error(IF_USAGE));
            };
            i += 1;
            if interp.expr_value(cond)?.truthy()? {
                return interp.eval_with(body, SubstFlags::all());
            }
            match argv.get(i).map(String::as_str) {
                None => return Ok(String::new()),
                Some("elseif") => {
                    i += 1;
                    continue;
                }
                Some("else") => {
                    i += 1;
                    let Some(body) = argv.get(i) else {
                        return Err(arity_error(IF_USAGE));
                    };
                    if i + 1 != argv.len() {
                        return Err(arity_error(IF_USAGE));
                    }
                    return interp.eval_with(body, SubstFlags::all());
                }
                Some(_) => return Err(arity_error(IF_USAGE)),
            }
        }
    }
}

struct While;

impl Command for While {
    fn name(&self) -> &'static str {
        "while"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 3 {
            return Err(arity_error("while test body"));
        }
        loop {
            interp.check_cancel()?;
            if !interp.expr_value(&argv[1])?.truthy()? {
                break;
            }
            if !run_body(interp, &argv[2])? {
                break;
            }
        }
        Ok(String::new())
    }
}

struct For;

impl Command for For {
    fn name(&self) -> &'static str {
        "for"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 5 {
            return Err(arity_error("for start test next body"));
        }
        interp.eval_with(&argv[1], SubstFlags::all())?;
        loop {
            interp.check_cancel()?;
            if !interp.expr_value(&argv[2])?.truthy()? {
                break;
            }
            if !run_body(interp, &argv[4])? {
                break;
            }
            // `break` in the next-script also terminates the loop.
            match interp.eval_with(&argv[3], SubstFlags::all()) {
                Ok(_) => {}
                Err(Interrupt::Break) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(String::new())
    }
}

struct Foreach;

impl Command for Foreach {
    fn name(&self) -> &'static str {
        "foreach"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 4 {
            return Err(arity_error("foreach varList list body"));
        }
        let vars = split_list(&argv[1])?;
        if vars.is_empty() {
            return Err(Interrupt::error("foreach varlist is empty"));
        }
        let items = split_list(&argv[2])?;
        let mut index = 0;
        while index < items.len() {
            interp.check_cancel()?;
            for (offset, var) in vars.iter().enumerate() {
                let value = items.get(index + offset).cloned().unwrap_or_default();
                interp.set_var(var, &value)?;
            }
            index += vars.len();
            if !run_body(interp, &argv[3])? {
                break;
            }
        }
        Ok(String::new())
    }
}

struct Break;

impl Command for Break {
    fn name(&self) -> &'static str {
        "break"
    }

    fn execute(&self, _interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 1 {
            return Err(arity_error("break"));
        }
        Err(Interrupt::Break)
    }
}

struct Continue;

impl Command for Continue {
    fn name(&self) -> &'static str {
        "continue"
    }

    fn execute(&self, _interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 1 {
            return Err(arity_error("continue"));
        }
        Err(Interrupt::Continue)
    }
}

struct Return;

impl Command for Return {
    fn name(&self) -> &'static str {
        "return"
    }

    fn execute(&self, _interp: &mut Interp, argv: &[String]) -> EvalResult {
        let mut i = 1;
        let mut code = ReturnCode::Ok;
        if argv.get(i).map(String::as_str) == Some("-code") {
            let Some(word) = argv.get(i + 1) else {
                return Err(arity_error("return ?-code code? ?result?"));
            };
            code = ReturnCode::parse(word).ok_or_else(|| {
                Interrupt::error(format!(
                    "bad completion code \"{word}\": must be ok, error, return, break, continue, or an integer"
                ))
            })?;
            i += 2;
        }
        let value = argv.get(i).cloned().unwrap_or_default();
        if i + 1 < argv.len() {
            return Err(arity_error("return ?-code code? ?result?"));
        }
        Err(match code {
            // A plain return (or -code ok) returns from the caller.
            ReturnCode::Ok | ReturnCode::Return => Interrupt::Return(value),
            ReturnCode::Error => Interrupt::Error(ErrorInfo::new(value)),
            ReturnCode::Break => Interrupt::Break,
            ReturnCode::Continue => Interrupt::Continue,
            ReturnCode::Other(code) => Interrupt::Custom { code, value },
        })
    }
}

struct ErrorCmd;

impl Command for ErrorCmd {
    fn name(&self) -> &'static str {
        "error"
    }

    fn execute(&self, _interp: &mut Interp, argv: &[String]) -> EvalResult {
        if !(2..=3).contains(&argv.len()) {
            return Err(arity_error("error message ?info?"));
        }
        let mut info = ErrorInfo::new(argv[1].clone());
        if let Some(extra) = argv.get(2) {
            if !extra.is_empty() {
                info.info = Some(extra.clone());
            }
        }
        Err(Interrupt::Error(info))
    }
}

struct Catch;

impl Command for Catch {
    fn name(&self) -> &'static str {
        "catch"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if !(2..=3).contains(&argv.len()) {
            return Err(arity_error("catch script ?varName?"));
        }
        let (code, value) = match interp.eval_with(&argv[1], SubstFlags::all()) {
            Ok(value) => (ReturnCode::Ok.as_i32(), value),
            Err(Interrupt::Error(e)) => (ReturnCode::Error.as_i32(), e.message),
            Err(Interrupt::Return(value)) => (ReturnCode::Return.as_i32(), value),
            Err(Interrupt::Break) => (ReturnCode::Break.as_i32(), String::new()),
            Err(Interrupt::Continue) => (ReturnCode::Continue.as_i32(), String::new()),
            Err(Interrupt::Custom { code, value }) => (code, value),
            // Cancellation is not catchable; it must unwind the whole eval.
            Err(Interrupt::Cancelled) => return Err(Interrupt::Cancelled),
        };
        if let Some(var) = argv.get(2) {
            interp.set_var(var, &value)?;
        }
        Ok(code.to_string())
    }
}

struct Uplevel;

impl Command for Uplevel {
    fn name(&self) -> &'static str {
        "uplevel"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        let (target, distance, rest) = super::resolve_level(interp, &argv[1..])?;
        if rest.is_empty() {
            return Err(arity_error("uplevel ?level? arg ?arg ...?"));
        }
        let script = rest.join(" ");
        interp
            .stack_mut()
            .push(crate::interpreter::FrameKind::Uplevel(distance), Some(target));
        let result = interp.eval_with(&script, SubstFlags::all());
        interp.stack_mut().pop();
        result
    }
}

struct ProcCmd;

impl Command for ProcCmd {
    fn name(&self) -> &'static str {
        "proc"
    }

    fn execute(&self, interp: &mut Interp, argv: &[String]) -> EvalResult {
        if argv.len() != 4 {
            return Err(arity_error("proc name args body"));
        }
        let mut params = Vec::new();
        for spec in split_list(&argv[2])? {
            let fields = split_list(&spec)?;
            match fields.as_slice() {
                [name] => params.push(Param {
                    name: name.clone(),
                    default: None,
                }),
                [name, default] => params.push(Param {
                    name: name.clone(),
                    default: Some(default.clone()),
                }),
                [] => {
                    return Err(Interrupt::error(
                        "argument with no name in argument specifier",
                    ))
                }
                _ => {
                    return Err(Interrupt::error(format!(
                        "too many fields in argument specifier \"{spec}\""
                    )))
                }
            }
        }
        interp.define_proc(Proc {
            name: argv[1].clone(),
            params,
            body: argv[3].clone(),
        });
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interp;

    #[test]
    fn if_elseif_else() {
        let mut i = Interp::new();
        i.eval("set x 7").unwrap();
        let script = "if {$x < 5} { set r low } elseif {$x < 10} { set r mid } else { set r high }";
        i.eval(script).unwrap();
        assert_eq!(i.eval("set r").unwrap(), "mid");

        i.eval("set x 50").unwrap();
        i.eval(script).unwrap();
        assert_eq!(i.eval("set r").unwrap(), "high");
    }

    #[test]
    fn if_then_keyword_and_false_without_else() {
        let mut i = Interp::new();
        assert_eq!(i.eval("if 1 then { set r yes }").unwrap(), "yes");
        assert_eq!(i.eval("if 0 { set r no }").unwrap(), "");
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let mut i = Interp::new();
        let script = "
            set sum 0
            set n 0
            while {1} {
                incr n
                if {$n > 10} { break }
                if {$n % 2 == 0} { continue }
                set sum [expr {$sum + $n}]
            }
            set sum
        ";
        assert_eq!(i.eval(script).unwrap(), "25");
    }

    #[test]
    fn for_loop() {
        let mut i = Interp::new();
        let script = "
            set out {}
            for {set i 0} {$i < 4} {incr i} { append out $i }
            set out
        ";
        assert_eq!(i.eval(script).unwrap(), "0123");
    }

    #[test]
    fn foreach_single_and_paired() {
        let mut i = Interp::new();
        i.eval("set out {}; foreach v {a b c} { append out $v }")
            .unwrap();
        assert_eq!(i.eval("set out").unwrap(), "abc");

        i.eval("set out {}; foreach {k v} {a 1 b 2} { append out $k=$v, }")
            .unwrap();
        assert_eq!(i.eval("set out").unwrap(), "a=1,b=2,");
    }

    #[test]
    fn catch_maps_codes() {
        let mut i = Interp::new();
        assert_eq!(i.eval("catch { set x ok } r").unwrap(), "0");
        assert_eq!(i.eval("set r").unwrap(), "ok");
        assert_eq!(i.eval("catch { error boom } r").unwrap(), "1");
        assert_eq!(i.eval("set r").unwrap(), "boom");
        assert_eq!(i.eval("catch { return val } r").unwrap(), "2");
        assert_eq!(i.eval("set r").unwrap(), "val");
        assert_eq!(i.eval("catch { break }").unwrap(), "3");
        assert_eq!(i.eval("catch { continue }").unwrap(), "4");
        assert_eq!(i.eval("catch { return -code 7 custom } r").unwrap(), "7");
        assert_eq!(i.eval("set r").unwrap(), "custom");
    }

    #[test]
    fn return_codes() {
        let mut i = Interp::new();
        i.eval("proc f {} { return -code error bad }").unwrap();
        let err = i.eval("f").unwrap_err();
        assert_eq!(err.message, "bad");

        let err = i.eval("return -code bogus x").unwrap_err();
        assert!(err.message.starts_with("bad completion code \"bogus\""));
    }

    #[test]
    fn break_outside_loop_is_error() {
        let mut i = Interp::new();
        let err = i.eval("break").unwrap_err();
        assert_eq!(err.message, "invoked \"break\" outside of a loop");
        i.eval("proc p {} { continue }").unwrap();
        let err = i.eval("p").unwrap_err();
        assert_eq!(err.message, "invoked \"continue\" outside of a loop");
    }

    #[test]
    fn uplevel_runs_in_caller_scope() {
        let mut i = Interp::new();
        i.eval("proc setter {} { uplevel 1 {set fromproc 99} }")
            .unwrap();
        i.eval("setter").unwrap();
        assert_eq!(i.eval("set fromproc").unwrap(), "99");
    }

    #[test]
    fn uplevel_absolute_level() {
        let mut i = Interp::new();
        i.eval("proc deep {} { uplevel #0 {set topvar 1} }").unwrap();
        i.eval("proc mid {} { deep }").unwrap();
        i.eval("mid").unwrap();
        assert_eq!(i.eval("set topvar").unwrap(), "1");
    }

    #[test]
    fn proc_bad_argument_specs() {
        let mut i = Interp::new();
        let err = i.eval("proc p {{a b c}} {}").unwrap_err();
        assert!(err.message.starts_with("too many fields"));
    }
}
