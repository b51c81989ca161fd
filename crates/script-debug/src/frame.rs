use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::event::ThreadId;
use crate::script::{Script, ScriptSnapshot};
use crate::value::{Value, Variable};

/// Live variable table of one interpreter frame.
///
/// The interpreter writes to it while running; the debugger only reads it,
/// and only while the owning thread is paused.
#[derive(Clone, Default)]
pub struct Scope(Arc<RwLock<BTreeMap<String, Value>>>);

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.write().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    fn variables(&self) -> Vec<Variable> {
        self.0
            .read()
            .iter()
            .filter(|(_, value)| !matches!(value, Value::Null))
            .map(|(name, value)| Variable::new(name.clone(), value.clone()))
            .collect()
    }
}

// Two scopes are the same scope, not merely equal contents.
impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("len", &self.len()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameKind {
    /// Script entry or function call.
    Call,
    /// A script pulled in by another script.
    Include,
    /// Dynamically generated code.
    Dynamic,
}

/// One entry of a captured call stack.
#[derive(Clone, Debug, PartialEq)]
pub struct StackFrame {
    script: ScriptSnapshot,
    line: u32,
    kind: FrameKind,
    name: String,
    scope: Scope,
}

impl StackFrame {
    pub fn capture(script: &Script, line: u32, kind: FrameKind, scope: &Scope) -> Self {
        Self::from_snapshot(ScriptSnapshot::capture(script), line, kind, scope.clone())
    }

    pub(crate) fn from_snapshot(script: ScriptSnapshot, line: u32, kind: FrameKind, scope: Scope) -> Self {
        let name = format!("{}, line {}", script.title(), line);
        Self {
            script,
            line,
            kind,
            name,
            scope,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn script(&self) -> &ScriptSnapshot {
        &self.script
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == FrameKind::Dynamic || self.script.is_dynamic()
    }
}

/// A stack frame as published by a debug thread.
///
/// Variables are read from the frame's scope on first request and cached.
/// The cache is thrown away whenever the frame is marked dirty, which happens
/// each time the owning thread's stack is replaced.
#[derive(Debug)]
pub struct DebugStackFrame {
    thread: ThreadId,
    frame: StackFrame,
    dirty: AtomicBool,
    variables: Mutex<Vec<Variable>>,
}

impl DebugStackFrame {
    pub(crate) fn new(thread: ThreadId, frame: StackFrame) -> Self {
        Self {
            thread,
            frame,
            dirty: AtomicBool::new(true),
            variables: Mutex::new(Vec::new()),
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn frame(&self) -> &StackFrame {
        &self.frame
    }

    pub fn script(&self) -> &ScriptSnapshot {
        self.frame.script()
    }

    pub fn line(&self) -> u32 {
        self.frame.line()
    }

    pub fn name(&self) -> &str {
        self.frame.name()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn variables(&self) -> Vec<Variable> {
        let mut cache = self.variables.lock();
        if self.dirty.swap(false, Ordering::AcqRel) {
            *cache = self.frame.scope.variables();
        }
        cache.clone()
    }
}
