//! Debug events exchanged between an interpreter and a controlling session.
//!
//! Every event is either a [`RuntimeNotification`] (interpreter to control) or
//! a [`ControlCommand`] (control to interpreter). Both travel through the same
//! ordered queue.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::breakpoint::{Breakpoint, BreakpointAction};
use crate::frame::StackFrame;
use crate::script::{ScriptId, ScriptSnapshot};
use crate::thread::ThreadState;

/// Opaque identity of one logical thread of script execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ThreadId(u64);

static NEXT_OS_THREAD: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<u64> = const { Cell::new(0) };
}

impl ThreadId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// A token bound to the calling OS thread. Stable for the thread's lifetime.
    pub fn current() -> Self {
        CURRENT.with(|current| {
            if current.get() == 0 {
                current.set(NEXT_OS_THREAD.fetch_add(1, Ordering::Relaxed));
            }
            Self(current.get())
        })
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a paused thread should continue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumeMode {
    Resume,
    StepInto,
    StepOver,
    StepReturn,
    ClientRequest,
}

impl ResumeMode {
    pub fn is_step(self) -> bool {
        matches!(
            self,
            ResumeMode::StepInto | ResumeMode::StepOver | ResumeMode::StepReturn
        )
    }

    /// The state a suspended thread moves to once this mode is applied.
    pub fn resulting_state(self) -> ThreadState {
        if self.is_step() {
            ThreadState::Stepping
        } else {
            ThreadState::Resumed
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SuspendReason {
    Breakpoint,
    StepEnd,
    ClientRequest,
    ScriptLoaded,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeNotification {
    EngineStarted,
    ScriptReady {
        thread: ThreadId,
        script: ScriptSnapshot,
        is_root: bool,
    },
    StackFrames {
        thread: ThreadId,
        frames: Vec<StackFrame>,
    },
    Suspended {
        thread: ThreadId,
        frames: Vec<StackFrame>,
        reason: SuspendReason,
    },
    Resumed {
        thread: ThreadId,
        reason: ResumeMode,
    },
    EngineTerminated,
}

impl RuntimeNotification {
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            RuntimeNotification::ScriptReady { thread, .. }
            | RuntimeNotification::StackFrames { thread, .. }
            | RuntimeNotification::Suspended { thread, .. }
            | RuntimeNotification::Resumed { thread, .. } => Some(*thread),
            RuntimeNotification::EngineStarted | RuntimeNotification::EngineTerminated => None,
        }
    }

    /// `true` for notifications after which the interpreter waits for a `Resume`.
    pub fn is_pause(&self) -> bool {
        matches!(
            self,
            RuntimeNotification::ScriptReady { .. } | RuntimeNotification::Suspended { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeNotification::EngineStarted => "engineStarted",
            RuntimeNotification::ScriptReady { .. } => "scriptReady",
            RuntimeNotification::StackFrames { .. } => "stackFrames",
            RuntimeNotification::Suspended { .. } => "suspended",
            RuntimeNotification::Resumed { .. } => "resumed",
            RuntimeNotification::EngineTerminated => "engineTerminated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Resume {
        thread: ThreadId,
        mode: ResumeMode,
    },
    Terminate,
    /// Release every paused thread and stop reporting; the script keeps running.
    Disconnect,
    SetBreakpoint {
        script: ScriptId,
        breakpoint: Breakpoint,
        action: BreakpointAction,
    },
}

impl ControlCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlCommand::Resume { .. } => "resume",
            ControlCommand::Terminate => "terminate",
            ControlCommand::Disconnect => "disconnect",
            ControlCommand::SetBreakpoint { .. } => "setBreakpoint",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DebugEvent {
    Notification(RuntimeNotification),
    Command(ControlCommand),
}

impl DebugEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DebugEvent::Notification(notification) => notification.kind(),
            DebugEvent::Command(command) => command.kind(),
        }
    }
}

impl From<RuntimeNotification> for DebugEvent {
    fn from(value: RuntimeNotification) -> Self {
        DebugEvent::Notification(value)
    }
}

impl From<ControlCommand> for DebugEvent {
    fn from(value: ControlCommand) -> Self {
        DebugEvent::Command(value)
    }
}
