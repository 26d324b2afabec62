//! Builtin commands.
//!
//! Grouped by concern: variable access in [`var`], control flow in
//! [`control`], and everything else in [`misc`]. Each command is a unit
//! struct implementing [`crate::dispatch::Command`]; arity failures use
//! the standard `wrong # args` shape.

pub mod control;
pub mod misc;
pub mod var;

use crate::dispatch::CommandRegistry;
use crate::interpreter::frame::FrameId;
use crate::interpreter::result::Interrupt;
use crate::interpreter::Interp;

/// Register every builtin into `registry`.
pub fn register_builtins(registry: &mut CommandRegistry) {
    var::register(registry);
    control::register(registry);
    misc::register(registry);
}

/// Parse an optional leading level argument (`N` or `#N`) the way
/// `upvar`/`uplevel` do, defaulting to 1 (the caller's frame).
///
/// Returns the target frame, the stack distance used, and the remaining
/// arguments.
pub(crate) fn resolve_level<'a>(
    interp: &Interp,
    args: &'a [String],
) -> Result<(FrameId, usize, &'a [String]), Interrupt> {
    let (spec, rest) = match args.first() {
        Some(first)
            if first.starts_with('#')
                || (!first.is_empty() && first.chars().all(|c| c.is_ascii_digit())) =>
        {
            (Some(first.as_str()), &args[1..])
        }
        _ => (None, args),
    };
    let depth = interp.stack().depth();
    let bad = || Interrupt::error(format!("bad level \"{}\"", spec.unwrap_or("1")));
    let distance = match spec {
        None => 1,
        Some(s) if s.starts_with('#') => {
            // `#N` addresses frame N from the bottom; `#0` is global.
            let absolute: usize = s[1..].parse().map_err(|_| bad())?;
            depth.checked_sub(absolute + 1).ok_or_else(bad)?
        }
        Some(s) => s.parse().map_err(|_| bad())?,
    };
    let target = interp.stack().frame_at_level(distance).ok_or_else(bad)?;
    Ok((target, distance, rest))
}
