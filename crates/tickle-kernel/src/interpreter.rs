//! The interpreter: frames, variables, results, and the evaluator.
//!
//! Built in layers:
//!
//! - **result**: return codes, error records, and the [`Interrupt`]
//!   control-flow carrier every evaluation threads back up
//! - **store**: per-frame variable records (scalars, arrays, links,
//!   tombstones, watchpoints)
//! - **frame**: the arena-backed call stack with slot recycling and
//!   uplevel aliasing
//! - **eval**: the engine itself, [`Interp`], funneling every entry
//!   through one parse/substitute/dispatch pipeline
//!
//! # Example
//!
//! ```
//! use tickle_kernel::interpreter::Interp;
//!
//! let mut interp = Interp::new();
//! interp.eval("set greeting hello").unwrap();
//! assert_eq!(interp.eval("set greeting").unwrap(), "hello");
//! ```

pub mod eval;
pub mod frame;
pub mod result;
pub mod store;

pub use eval::{
    make_list, quote_list_item, split_array, split_list, CancelToken, EngineFlags, Interp,
    InterpConfig, Param, Proc, SubstFlags,
};
pub use frame::{CallFrame, CallStack, FrameId, FrameKind, TeardownToken, MAX_LINK_HOPS};
pub use result::{ErrorInfo, ErrorKind, EvalResult, Interrupt, ResultList, ReturnCode};
pub use store::{
    AlreadyDefined, TraceFn, TraceHook, TraceOp, VarStore, VarValue, Variable, VariableFlags,
};
