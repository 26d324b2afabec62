//! Per-frame variable records.
//!
//! Each call frame owns one [`VarStore`] mapping names to [`Variable`]
//! records. A record is one of three kinds: a scalar, an array of
//! string-keyed elements, or a link (alias) to a variable in another
//! frame. Records are tombstoned rather than removed on unset: the
//! `UNDEFINED` flag marks them logically absent while preserving
//! read-only/watchpoint metadata across redefinition.
//!
//! The store never follows links and never cascades to other frames —
//! that is the evaluator's job.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::pattern::{matches, MatchMode, PatternError};

use super::frame::FrameId;

bitflags! {
    /// Per-variable state and watchpoint flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VariableFlags: u32 {
        /// Writes and unsets are rejected.
        const READ_ONLY = 1 << 0;
        /// Tombstone: record exists but the variable is logically absent.
        const UNDEFINED = 1 << 1;
        /// The record is an alias to a variable in another frame.
        const LINK = 1 << 2;
        /// The record holds array elements.
        const ARRAY = 1 << 3;
        /// Emit a trace event when the variable is read.
        const WATCH_READ = 1 << 4;
        /// Emit a trace event when the variable is written.
        const WATCH_WRITE = 1 << 5;
        /// Emit a trace event when the variable is unset.
        const WATCH_UNSET = 1 << 6;
    }
}

impl VariableFlags {
    /// Just the watchpoint bits.
    pub fn watchpoints(self) -> VariableFlags {
        self & (VariableFlags::WATCH_READ | VariableFlags::WATCH_WRITE | VariableFlags::WATCH_UNSET)
    }

    /// Render the watchpoint bits as a space-joined word list.
    pub fn watchpoint_names(self) -> String {
        let mut names = Vec::new();
        if self.contains(VariableFlags::WATCH_READ) {
            names.push("read");
        }
        if self.contains(VariableFlags::WATCH_WRITE) {
            names.push("write");
        }
        if self.contains(VariableFlags::WATCH_UNSET) {
            names.push("unset");
        }
        names.join(" ")
    }
}

/// Which access fired a variable trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Read,
    Write,
    Unset,
}

impl TraceOp {
    /// The watchpoint flag corresponding to this operation.
    pub fn flag(self) -> VariableFlags {
        match self {
            TraceOp::Read => VariableFlags::WATCH_READ,
            TraceOp::Write => VariableFlags::WATCH_WRITE,
            TraceOp::Unset => VariableFlags::WATCH_UNSET,
        }
    }
}

/// A registered variable trace callback.
pub type TraceFn = dyn Fn(&str, TraceOp) + Send + Sync;

#[derive(Clone)]
pub struct TraceHook {
    /// Which operations fire this hook (watchpoint bits).
    pub ops: VariableFlags,
    pub handler: Arc<TraceFn>,
}

impl fmt::Debug for TraceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceHook").field("ops", &self.ops).finish()
    }
}

/// The payload of a variable record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum VarValue {
    /// No value (undefined tombstone, or a just-created record).
    #[default]
    Unset,
    Scalar(String),
    /// String-keyed elements, ordered for deterministic listing.
    Array(BTreeMap<String, String>),
    /// Alias to `(frame, name)`; never holds a value directly.
    Link(FrameId, String),
}

/// One variable record.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub flags: VariableFlags,
    /// Owning call frame (back-reference, not ownership).
    pub frame: FrameId,
    value: VarValue,
    traces: Vec<TraceHook>,
}

impl Variable {
    fn new(name: impl Into<String>, frame: FrameId) -> Self {
        Self {
            name: name.into(),
            flags: VariableFlags::UNDEFINED,
            frame,
            value: VarValue::Unset,
            traces: Vec::new(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(VariableFlags::READ_ONLY)
    }

    pub fn is_undefined(&self) -> bool {
        self.flags.contains(VariableFlags::UNDEFINED)
    }

    pub fn is_link(&self) -> bool {
        self.flags.contains(VariableFlags::LINK)
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(VariableFlags::ARRAY)
    }

    pub fn value(&self) -> &VarValue {
        &self.value
    }

    /// Read the scalar value; None when undefined, a link, or an array.
    pub fn scalar(&self) -> Option<&str> {
        match (&self.value, self.is_undefined()) {
            (VarValue::Scalar(s), false) => Some(s),
            _ => None,
        }
    }

    /// Read one array element.
    pub fn element(&self, index: &str) -> Option<&str> {
        match (&self.value, self.is_undefined()) {
            (VarValue::Array(map), false) => map.get(index).map(|s| s.as_str()),
            _ => None,
        }
    }

    /// The link target, if this record is a link.
    pub fn link_target(&self) -> Option<(FrameId, &str)> {
        match &self.value {
            VarValue::Link(frame, name) => Some((*frame, name)),
            _ => None,
        }
    }

    /// Store a scalar value, clearing the tombstone.
    ///
    /// The caller is responsible for the read-only check; the store is a
    /// dumb container.
    pub fn set_scalar(&mut self, value: impl Into<String>) {
        self.value = VarValue::Scalar(value.into());
        self.flags -= VariableFlags::UNDEFINED | VariableFlags::ARRAY | VariableFlags::LINK;
    }

    /// Store one array element, converting the record to an array if
    /// needed and clearing the tombstone.
    pub fn set_element(&mut self, index: impl Into<String>, value: impl Into<String>) {
        if !matches!(self.value, VarValue::Array(_)) || self.is_undefined() {
            self.value = VarValue::Array(BTreeMap::new());
        }
        if let VarValue::Array(map) = &mut self.value {
            map.insert(index.into(), value.into());
        }
        self.flags -= VariableFlags::UNDEFINED | VariableFlags::LINK;
        self.flags |= VariableFlags::ARRAY;
    }

    /// Turn the record into a link to `(frame, name)`.
    pub fn set_link(&mut self, frame: FrameId, name: impl Into<String>) {
        self.value = VarValue::Link(frame, name.into());
        self.flags -= VariableFlags::UNDEFINED | VariableFlags::ARRAY;
        self.flags |= VariableFlags::LINK;
    }

    /// Tombstone the record: drop the value, mark undefined, keep
    /// read-only and watchpoint metadata.
    pub fn make_undefined(&mut self) {
        self.value = VarValue::Unset;
        self.flags -= VariableFlags::LINK | VariableFlags::ARRAY;
        self.flags |= VariableFlags::UNDEFINED;
    }

    /// Attach a trace hook.
    pub fn add_trace(&mut self, hook: TraceHook) {
        self.traces.push(hook);
    }

    /// Invoke every trace hook registered for `op`.
    pub fn fire_traces(&self, op: TraceOp) {
        for hook in &self.traces {
            if hook.ops.contains(op.flag()) {
                (hook.handler)(&self.name, op);
            }
        }
    }
}

/// Error from [`VarStore::define`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("variable \"{0}\" already exists")]
pub struct AlreadyDefined(pub String);

/// The variable records for one call frame.
#[derive(Debug, Clone, Default)]
pub struct VarStore {
    vars: BTreeMap<String, Variable>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-name lookup. Does not follow links.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Create a record, or resurrect an undefined one in place
    /// (preserving read-only/watchpoint flags and trace hooks).
    ///
    /// Fails if a record with this name is already defined.
    pub fn define(
        &mut self,
        name: &str,
        frame: FrameId,
    ) -> Result<&mut Variable, AlreadyDefined> {
        if let Some(existing) = self.vars.get(name) {
            if !existing.is_undefined() {
                return Err(AlreadyDefined(name.to_string()));
            }
        }
        let variable = self
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(name, frame));
        Ok(variable)
    }

    /// Get-or-create without the already-defined check; used by plain
    /// `set` which overwrites freely.
    pub fn obtain(&mut self, name: &str, frame: FrameId) -> &mut Variable {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(name, frame))
    }

    /// Bulk-toggle the read-only flag on defined variables matching
    /// `pattern` (all variables when None). Returns how many actually
    /// changed; no-ops are excluded from the count. Undefined variables
    /// are skipped.
    pub fn set_read_only(
        &mut self,
        mode: MatchMode,
        pattern: Option<&str>,
        read_only: bool,
    ) -> Result<usize, PatternError> {
        let mut count = 0;
        for variable in self.vars.values_mut() {
            if variable.is_undefined() {
                continue;
            }
            if let Some(pattern) = pattern {
                if !matches(mode, pattern, &variable.name, false)? {
                    continue;
                }
            }
            if variable.is_read_only() == read_only {
                continue;
            }
            variable.flags.set(VariableFlags::READ_ONLY, read_only);
            count += 1;
        }
        Ok(count)
    }

    /// Bulk-toggle the undefined flag by pattern. Unlike every other bulk
    /// operation this one is NOT filtered by the current undefined state:
    /// it is the primitive that creates tombstones in the first place.
    pub fn set_undefined(
        &mut self,
        mode: MatchMode,
        pattern: Option<&str>,
        undefined: bool,
    ) -> Result<usize, PatternError> {
        let mut count = 0;
        for variable in self.vars.values_mut() {
            if let Some(pattern) = pattern {
                if !matches(mode, pattern, &variable.name, false)? {
                    continue;
                }
            }
            if variable.is_undefined() == undefined {
                continue;
            }
            if undefined {
                variable.make_undefined();
            } else {
                variable.flags -= VariableFlags::UNDEFINED;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Names of defined (non-tombstoned) variables matching `pattern`.
    pub fn list_defined(
        &self,
        mode: MatchMode,
        pattern: Option<&str>,
    ) -> Result<Vec<String>, PatternError> {
        let mut names = Vec::new();
        for variable in self.vars.values() {
            if variable.is_undefined() {
                continue;
            }
            if let Some(pattern) = pattern {
                if !matches(mode, pattern, &variable.name, false)? {
                    continue;
                }
            }
            names.push(variable.name.clone());
        }
        Ok(names)
    }

    /// Names of true procedure-locals: defined, not links, and whose
    /// owning frame (after following the frame "next" relation, which the
    /// caller encodes in `is_local`) is neither global nor a namespace.
    pub fn list_locals(
        &self,
        mode: MatchMode,
        pattern: Option<&str>,
        mut is_local: impl FnMut(FrameId) -> bool,
    ) -> Result<Vec<String>, PatternError> {
        let mut names = Vec::new();
        for variable in self.vars.values() {
            if variable.is_undefined() || variable.is_link() {
                continue;
            }
            if !is_local(variable.frame) {
                continue;
            }
            if let Some(pattern) = pattern {
                if !matches(mode, pattern, &variable.name, false)? {
                    continue;
                }
            }
            names.push(variable.name.clone());
        }
        Ok(names)
    }

    /// Every variable carrying watchpoint flags, as `(name, flags)` pairs
    /// where flags is a space-joined word list.
    pub fn list_watchpoints(&self) -> Vec<(String, String)> {
        let mut result = Vec::new();
        for variable in self.vars.values() {
            let watch = variable.flags.watchpoints();
            if !watch.is_empty() {
                result.push((variable.name.clone(), watch.watchpoint_names()));
            }
        }
        result
    }

    /// Drop every record. Used by frame finalization; unset traces have
    /// already been fired by the caller.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Iterate all records (defined and tombstoned).
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn frame() -> FrameId {
        FrameId::global()
    }

    #[test]
    fn obtain_and_set_scalar() {
        let mut store = VarStore::new();
        store.obtain("x", frame()).set_scalar("5");
        assert_eq!(store.get("x").and_then(|v| v.scalar()), Some("5"));
    }

    #[test]
    fn new_record_is_undefined_until_set() {
        let mut store = VarStore::new();
        store.obtain("x", frame());
        assert!(store.get("x").is_some_and(|v| v.is_undefined()));
        assert_eq!(store.get("x").and_then(|v| v.scalar()), None);
    }

    #[test]
    fn define_fails_on_defined_variable() {
        let mut store = VarStore::new();
        store.obtain("x", frame()).set_scalar("1");
        assert_eq!(
            store.define("x", frame()).unwrap_err(),
            AlreadyDefined("x".into())
        );
    }

    #[test]
    fn define_resurrects_tombstone_preserving_flags() {
        let mut store = VarStore::new();
        let v = store.obtain("x", frame());
        v.set_scalar("1");
        v.flags |= VariableFlags::READ_ONLY | VariableFlags::WATCH_WRITE;
        v.make_undefined();

        let v = store.define("x", frame()).unwrap();
        assert!(v.is_undefined()); // still tombstoned until a value lands
        v.set_scalar("2");
        assert!(v.is_read_only());
        assert!(v.flags.contains(VariableFlags::WATCH_WRITE));
        assert_eq!(v.scalar(), Some("2"));
    }

    #[test]
    fn undefine_drops_value_immediately() {
        let mut store = VarStore::new();
        store.obtain("x", frame()).set_scalar("5");
        store.get_mut("x").unwrap().make_undefined();
        let v = store.get("x").unwrap();
        assert!(v.is_undefined());
        assert_eq!(v.value(), &VarValue::Unset);
    }

    #[test]
    fn array_elements() {
        let mut store = VarStore::new();
        let v = store.obtain("a", frame());
        v.set_element("k1", "v1");
        v.set_element("k2", "v2");
        assert!(v.is_array());
        assert_eq!(v.element("k1"), Some("v1"));
        assert_eq!(v.element("missing"), None);
    }

    #[test]
    fn link_holds_no_value() {
        let mut store = VarStore::new();
        let v = store.obtain("alias", frame());
        v.set_link(FrameId::global(), "target");
        assert!(v.is_link());
        assert_eq!(v.scalar(), None);
        assert_eq!(v.link_target(), Some((FrameId::global(), "target")));
    }

    #[test]
    fn set_read_only_counts_changes_only() {
        let mut store = VarStore::new();
        store.obtain("aa", frame()).set_scalar("1");
        store.obtain("ab", frame()).set_scalar("2");
        store.obtain("zz", frame()).set_scalar("3");
        // aa already read-only: must not count again
        store.get_mut("aa").unwrap().flags |= VariableFlags::READ_ONLY;

        let n = store
            .set_read_only(MatchMode::Glob, Some("a*"), true)
            .unwrap();
        assert_eq!(n, 1);
        assert!(store.get("ab").unwrap().is_read_only());
        assert!(!store.get("zz").unwrap().is_read_only());
    }

    #[test]
    fn set_read_only_skips_undefined() {
        let mut store = VarStore::new();
        store.obtain("gone", frame()); // undefined tombstone
        let n = store.set_read_only(MatchMode::Glob, None, true).unwrap();
        assert_eq!(n, 0);
        assert!(!store.get("gone").unwrap().is_read_only());
    }

    #[test]
    fn set_undefined_acts_on_tombstones_too() {
        let mut store = VarStore::new();
        store.obtain("x", frame()).set_scalar("1");
        store.obtain("gone", frame()); // already undefined

        // Tombstoning "x" counts; "gone" is already undefined, no-op.
        let n = store.set_undefined(MatchMode::Glob, None, true).unwrap();
        assert_eq!(n, 1);

        // And the reverse direction resurrects tombstones, which no other
        // bulk operation may touch.
        let n = store.set_undefined(MatchMode::Glob, None, false).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn list_defined_filters_tombstones_and_pattern() {
        let mut store = VarStore::new();
        store.obtain("apple", frame()).set_scalar("1");
        store.obtain("apricot", frame()).set_scalar("2");
        store.obtain("banana", frame()).set_scalar("3");
        store.get_mut("apricot").unwrap().make_undefined();

        let names = store.list_defined(MatchMode::Glob, Some("a*")).unwrap();
        assert_eq!(names, vec!["apple"]);
    }

    #[test]
    fn list_locals_excludes_links_and_foreign_frames() {
        let mut store = VarStore::new();
        store.obtain("mine", frame()).set_scalar("1");
        store.obtain("alias", frame()).set_link(FrameId::global(), "t");
        let names = store
            .list_locals(MatchMode::Glob, None, |_| true)
            .unwrap();
        assert_eq!(names, vec!["mine"]);

        let names = store
            .list_locals(MatchMode::Glob, None, |_| false)
            .unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn list_watchpoints_renders_flags() {
        let mut store = VarStore::new();
        let v = store.obtain("w", frame());
        v.set_scalar("1");
        v.flags |= VariableFlags::WATCH_READ | VariableFlags::WATCH_UNSET;
        store.obtain("plain", frame()).set_scalar("2");

        let list = store.list_watchpoints();
        assert_eq!(list, vec![("w".to_string(), "read unset".to_string())]);
    }

    #[test]
    fn trace_hooks_fire_for_matching_ops() {
        static WRITES: AtomicUsize = AtomicUsize::new(0);
        let mut store = VarStore::new();
        let v = store.obtain("t", frame());
        v.add_trace(TraceHook {
            ops: VariableFlags::WATCH_WRITE,
            handler: Arc::new(|_, _| {
                WRITES.fetch_add(1, Ordering::SeqCst);
            }),
        });
        v.fire_traces(TraceOp::Write);
        v.fire_traces(TraceOp::Read); // not registered, no fire
        assert_eq!(WRITES.load(Ordering::SeqCst), 1);
    }
}
