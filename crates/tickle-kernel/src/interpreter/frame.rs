//! Call frames and the call stack.
//!
//! Frames live in an arena owned by [`CallStack`] and are referred to by
//! [`FrameId`] everywhere else — variables link to `(FrameId, name)`
//! pairs, never to references, so alias graphs cannot dangle and cycle
//! detection is a bounded walk instead of a soundness question.
//!
//! Exactly one frame is the global frame. It is created with the stack,
//! is never popped, and can only be freed by presenting a
//! [`TeardownToken`] — a capability minted solely by interpreter
//! disposal. Ordinary `free_all` calls leave it untouched.

use std::fmt;

use crate::pattern::{matches, MatchMode};

use super::result::{ErrorInfo, ErrorKind};
use super::store::VarStore;

/// Maximum hops when following a link chain to its terminus.
pub const MAX_LINK_HOPS: usize = 16;

/// Arena index of a call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

impl FrameId {
    /// The global frame is always slot zero.
    pub fn global() -> FrameId {
        FrameId(0)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// What kind of scope a frame represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// The interpreter-wide global scope.
    Global,
    /// A procedure invocation; carries the procedure name.
    Procedure(String),
    /// A namespace scope; carries the namespace name.
    Namespace(String),
    /// An `uplevel` alias frame; its `next` link points at the frame it
    /// stands in for.
    Uplevel(usize),
}

/// Lifecycle of a frame. The Active → Freed transition happens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Active,
    Freed,
}

/// One lexical/dynamic scope: a variable store plus scope-chain links.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub id: FrameId,
    pub kind: FrameKind,
    pub vars: VarStore,
    /// Lexical parent, for namespace resolution.
    pub parent: Option<FrameId>,
    /// Uplevel/upvar traversal link: the frame this one stands in for.
    /// Distinct from the lexical parent.
    pub next: Option<FrameId>,
    state: FrameState,
}

impl CallFrame {
    fn new(id: FrameId, kind: FrameKind, parent: Option<FrameId>, next: Option<FrameId>) -> Self {
        Self {
            id,
            kind,
            vars: VarStore::new(),
            parent,
            next,
            state: FrameState::Active,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.kind, FrameKind::Global)
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, FrameKind::Namespace(_))
    }

    pub fn is_freed(&self) -> bool {
        self.state == FrameState::Freed
    }

    /// Diagnostic identity, used by call-stack rendering.
    pub fn name(&self) -> String {
        match &self.kind {
            FrameKind::Global => "global".to_string(),
            FrameKind::Procedure(name) => format!("proc {name}"),
            FrameKind::Namespace(name) => format!("namespace {name}"),
            FrameKind::Uplevel(level) => format!("uplevel {level}"),
        }
    }

    /// Run free-finalization: fire unset traces and release variables.
    /// Freeing an already-freed frame is a no-op.
    pub fn free(&mut self) {
        if self.state == FrameState::Freed {
            return;
        }
        for variable in self.vars.iter() {
            if !variable.is_undefined() {
                variable.fire_traces(super::store::TraceOp::Unset);
            }
        }
        self.vars.clear();
        self.state = FrameState::Freed;
    }
}

/// Capability required to free the global frame.
///
/// Only interpreter disposal can mint one, which makes "freed the global
/// frame from some random call stack teardown" unrepresentable rather
/// than merely discouraged.
pub struct TeardownToken(());

impl TeardownToken {
    pub(crate) fn new() -> Self {
        TeardownToken(())
    }
}

/// The dynamic execution context: an arena of frames plus the ordered
/// stack of frames currently in scope (most recent last).
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Option<CallFrame>>,
    stack: Vec<FrameId>,
    /// Recycled arena slots; keeps long-running scripts from growing the
    /// arena one slot per procedure call.
    free_slots: Vec<usize>,
}

impl CallStack {
    /// Create a stack holding just the global frame.
    pub fn new() -> Self {
        let global = CallFrame::new(FrameId::global(), FrameKind::Global, None, None);
        Self {
            frames: vec![Some(global)],
            stack: vec![FrameId::global()],
            free_slots: Vec::new(),
        }
    }

    pub fn global(&self) -> FrameId {
        FrameId::global()
    }

    /// The frame on top of the stack.
    pub fn current(&self) -> FrameId {
        *self.stack.last().unwrap_or(&FrameId::global())
    }

    /// Number of frames currently on the stack (global included).
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn frame(&self, id: FrameId) -> Option<&CallFrame> {
        self.frames.get(id.index()).and_then(|f| f.as_ref())
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut CallFrame> {
        self.frames.get_mut(id.index()).and_then(|f| f.as_mut())
    }

    /// Allocate a frame in the arena and push it onto the stack.
    pub fn push(&mut self, kind: FrameKind, next: Option<FrameId>) -> FrameId {
        // Procedures and uplevel frames resolve names against the global
        // scope lexically; namespaces chain to the current frame.
        let parent = Some(match kind {
            FrameKind::Namespace(_) => self.current(),
            _ => FrameId::global(),
        });
        let id = match self.free_slots.pop() {
            Some(slot) => FrameId(slot),
            None => {
                self.frames.push(None);
                FrameId(self.frames.len() - 1)
            }
        };
        self.frames[id.index()] = Some(CallFrame::new(id, kind, parent, next));
        self.stack.push(id);
        id
    }

    /// Pop the top frame, run its free-finalizer, and drop it from the
    /// arena. The global frame is never popped.
    pub fn pop(&mut self) -> Option<FrameId> {
        if self.stack.len() <= 1 {
            return None;
        }
        let id = self.stack.pop()?;
        if let Some(frame) = self.frame_mut(id) {
            frame.free();
        }
        self.frames[id.index()] = None;
        self.free_slots.push(id.index());
        Some(id)
    }

    /// Follow the `next` relation from `id` to its terminus: the frame an
    /// uplevel/upvar alias actually denotes.
    pub fn follow_next(&self, id: FrameId) -> FrameId {
        let mut current = id;
        let mut hops = 0;
        while let Some(frame) = self.frame(current) {
            match frame.next {
                Some(next) if hops < MAX_LINK_HOPS => {
                    current = next;
                    hops += 1;
                }
                _ => break,
            }
        }
        current
    }

    /// Follow a link-variable chain starting at `(frame, name)` to its
    /// terminus. Chains longer than [`MAX_LINK_HOPS`] are rejected, which
    /// also catches cycles.
    pub fn resolve_link(
        &self,
        frame: FrameId,
        name: &str,
    ) -> Result<(FrameId, String), ErrorInfo> {
        let mut at = (frame, name.to_string());
        for _ in 0..=MAX_LINK_HOPS {
            let target = self
                .frame(at.0)
                .and_then(|f| f.vars.get(&at.1))
                .and_then(|v| v.link_target());
            match target {
                Some((next_frame, next_name)) => {
                    at = (next_frame, next_name.to_string());
                }
                None => return Ok(at),
            }
        }
        Err(ErrorInfo::with_kind(
            format!("too many levels of indirection for \"{name}\""),
            ErrorKind::State,
        ))
    }

    /// Frame stack distance: the frame `level` steps up from the current
    /// one (`uplevel 1` is the caller). `#0`-style absolute addressing is
    /// handled by the caller passing the distance from the top.
    pub fn frame_at_level(&self, level: usize) -> Option<FrameId> {
        if level >= self.stack.len() {
            return None;
        }
        let index = self.stack.len() - 1 - level;
        self.stack.get(index).copied()
    }

    /// Free every non-global frame and reset the stack to just the
    /// global frame. Re-entrant-safe: already-freed frames are no-ops.
    pub fn free_all(&mut self) {
        for slot in self.frames.iter_mut().skip(1) {
            if let Some(frame) = slot {
                frame.free();
            }
            *slot = None;
        }
        self.free_slots = (1..self.frames.len()).rev().collect();
        self.stack.clear();
        self.stack.push(FrameId::global());
    }

    /// Full-teardown variant: also frees the global frame. Only callable
    /// with the capability token minted by interpreter disposal.
    pub fn free_all_for_teardown(&mut self, _token: TeardownToken) {
        self.free_all();
        if let Some(global) = self.frame_mut(FrameId::global()) {
            global.free();
        }
        self.stack.clear();
    }

    /// Render frame identities for diagnostics, space-joined, optionally
    /// filtered by a glob pattern.
    pub fn render(&self, pattern: Option<&str>, no_case: bool) -> String {
        let mut names = Vec::new();
        for id in &self.stack {
            let Some(frame) = self.frame(*id) else {
                continue;
            };
            let name = frame.name();
            let keep = match pattern {
                Some(p) => matches(MatchMode::Glob, p, &name, no_case).unwrap_or(false),
                None => true,
            };
            if keep {
                names.push(name);
            }
        }
        names.join(" ")
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(None, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stack_has_global_frame() {
        let stack = CallStack::new();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current(), FrameId::global());
        assert!(stack.frame(FrameId::global()).unwrap().is_global());
    }

    #[test]
    fn push_and_pop() {
        let mut stack = CallStack::new();
        let id = stack.push(FrameKind::Procedure("p".into()), None);
        assert_eq!(stack.current(), id);
        assert_eq!(stack.depth(), 2);

        assert_eq!(stack.pop(), Some(id));
        assert_eq!(stack.current(), FrameId::global());
        assert!(stack.frame(id).is_none()); // freed and dropped
    }

    #[test]
    fn global_frame_cannot_be_popped() {
        let mut stack = CallStack::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn frame_free_is_idempotent() {
        let mut frame = CallFrame::new(FrameId::global(), FrameKind::Global, None, None);
        frame.vars.obtain("x", FrameId::global()).set_scalar("1");
        frame.free();
        assert!(frame.is_freed());
        assert!(frame.vars.is_empty());
        frame.free(); // second free: no-op, no panic
        assert!(frame.is_freed());
    }

    #[test]
    fn free_all_spares_global() {
        let mut stack = CallStack::new();
        stack
            .frame_mut(FrameId::global())
            .unwrap()
            .vars
            .obtain("g", FrameId::global())
            .set_scalar("kept");
        stack.push(FrameKind::Procedure("p".into()), None);
        stack.push(FrameKind::Procedure("q".into()), None);

        stack.free_all();
        assert_eq!(stack.depth(), 1);
        let global = stack.frame(FrameId::global()).unwrap();
        assert!(!global.is_freed());
        assert_eq!(global.vars.get("g").and_then(|v| v.scalar()), Some("kept"));
    }

    #[test]
    fn teardown_frees_global_too() {
        let mut stack = CallStack::new();
        stack.push(FrameKind::Procedure("p".into()), None);
        stack.free_all_for_teardown(TeardownToken::new());
        assert!(stack.frame(FrameId::global()).unwrap().is_freed());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn follow_next_walks_uplevel_links() {
        let mut stack = CallStack::new();
        let p = stack.push(FrameKind::Procedure("p".into()), None);
        let up = stack.push(FrameKind::Uplevel(1), Some(p));
        assert_eq!(stack.follow_next(up), p);
        assert_eq!(stack.follow_next(p), p);
    }

    #[test]
    fn resolve_link_terminates_at_non_link() {
        let mut stack = CallStack::new();
        let global = FrameId::global();
        let p = stack.push(FrameKind::Procedure("p".into()), None);
        stack
            .frame_mut(global)
            .unwrap()
            .vars
            .obtain("target", global)
            .set_scalar("v");
        stack
            .frame_mut(p)
            .unwrap()
            .vars
            .obtain("alias", p)
            .set_link(global, "target");

        let (frame, name) = stack.resolve_link(p, "alias").unwrap();
        assert_eq!(frame, global);
        assert_eq!(name, "target");
    }

    #[test]
    fn resolve_link_rejects_cycles() {
        let mut stack = CallStack::new();
        let global = FrameId::global();
        {
            let vars = &mut stack.frame_mut(global).unwrap().vars;
            vars.obtain("a", global).set_link(global, "b");
            vars.obtain("b", global).set_link(global, "a");
        }
        let err = stack.resolve_link(global, "a").unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
        assert!(err.message.contains("too many levels of indirection"));
    }

    #[test]
    fn frame_at_level() {
        let mut stack = CallStack::new();
        let p = stack.push(FrameKind::Procedure("p".into()), None);
        let q = stack.push(FrameKind::Procedure("q".into()), None);
        assert_eq!(stack.frame_at_level(0), Some(q));
        assert_eq!(stack.frame_at_level(1), Some(p));
        assert_eq!(stack.frame_at_level(2), Some(FrameId::global()));
        assert_eq!(stack.frame_at_level(3), None);
    }

    #[test]
    fn render_filters_by_pattern() {
        let mut stack = CallStack::new();
        stack.push(FrameKind::Procedure("alpha".into()), None);
        stack.push(FrameKind::Procedure("beta".into()), None);
        assert_eq!(stack.render(None, false), "global proc alpha proc beta");
        assert_eq!(stack.render(Some("proc a*"), false), "proc alpha");
        assert_eq!(stack.render(Some("PROC B*"), true), "proc beta");
    }
}
