use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{DebugError, DebugResult};
use crate::event::{ResumeMode, SuspendReason, ThreadId};
use crate::frame::{DebugStackFrame, StackFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadState {
    NotStarted,
    Suspended,
    Resumed,
    Stepping,
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreadState::NotStarted => "not started",
            ThreadState::Suspended => "suspended",
            ThreadState::Resumed => "resumed",
            ThreadState::Stepping => "stepping",
            ThreadState::Terminated => "terminated",
        })
    }
}

/// Debugger-side view of one thread of script execution.
#[derive(Debug)]
pub struct DebugThread {
    id: ThreadId,
    name: String,
    state: ThreadState,
    frames: Vec<Arc<DebugStackFrame>>,
    last_suspend: Option<SuspendReason>,
    last_resume: Option<ResumeMode>,
}

impl DebugThread {
    pub(crate) fn new(id: ThreadId) -> Self {
        Self {
            id,
            name: format!("Thread {id}"),
            state: ThreadState::NotStarted,
            frames: Vec::new(),
            last_suspend: None,
            last_resume: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn last_suspend_reason(&self) -> Option<SuspendReason> {
        self.last_suspend
    }

    pub fn last_resume_mode(&self) -> Option<ResumeMode> {
        self.last_resume
    }

    /// Current frames, innermost first.
    pub fn stack_frames(&self) -> Vec<Arc<DebugStackFrame>> {
        self.frames.clone()
    }

    pub fn top_stack_frame(&self) -> Option<Arc<DebugStackFrame>> {
        self.frames.first().cloned()
    }

    pub fn is_suspended(&self) -> bool {
        self.state == ThreadState::Suspended
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    pub fn can_resume(&self) -> bool {
        self.is_suspended()
    }

    pub fn can_step_into(&self) -> bool {
        self.is_suspended()
    }

    pub fn can_step_over(&self) -> bool {
        self.is_suspended()
    }

    pub fn can_step_return(&self) -> bool {
        self.is_suspended()
    }

    fn invalid(&self, action: &'static str) -> DebugError {
        DebugError::InvalidTransition {
            thread: self.id,
            state: self.state,
            action,
        }
    }

    pub(crate) fn suspend(&mut self, reason: SuspendReason) -> DebugResult<()> {
        match self.state {
            ThreadState::NotStarted | ThreadState::Resumed | ThreadState::Stepping => {
                self.state = ThreadState::Suspended;
                self.last_suspend = Some(reason);
                Ok(())
            }
            ThreadState::Suspended | ThreadState::Terminated => Err(self.invalid("suspend")),
        }
    }

    /// Applies a resume decision from the control side. Only a suspended
    /// thread can be resumed.
    pub(crate) fn apply_resume(&mut self, mode: ResumeMode) -> DebugResult<ThreadState> {
        if self.state != ThreadState::Suspended {
            return Err(self.invalid("resume"));
        }
        self.state = mode.resulting_state();
        self.last_resume = Some(mode);
        Ok(self.state)
    }

    /// Records that the interpreter reported running again. Returns whether
    /// the state changed.
    pub(crate) fn note_resumed(&mut self, mode: ResumeMode) -> DebugResult<bool> {
        match self.state {
            ThreadState::Suspended | ThreadState::Resumed | ThreadState::Stepping => {
                let next = mode.resulting_state();
                let changed = next != self.state;
                self.state = next;
                self.last_resume = Some(mode);
                Ok(changed)
            }
            ThreadState::NotStarted | ThreadState::Terminated => Err(self.invalid("run")),
        }
    }

    /// Returns `false` when the thread was already terminated.
    pub(crate) fn terminate(&mut self) -> bool {
        if self.state == ThreadState::Terminated {
            return false;
        }
        self.state = ThreadState::Terminated;
        true
    }

    /// Replaces the stack wholesale. Frames handed out earlier are marked
    /// dirty so their cached variables are not served again.
    pub(crate) fn replace_frames(&mut self, frames: Vec<StackFrame>) -> DebugResult<()> {
        if self.is_terminated() {
            return Err(self.invalid("update frames"));
        }
        for old in &self.frames {
            old.mark_dirty();
        }
        self.frames = frames
            .into_iter()
            .map(|frame| Arc::new(DebugStackFrame::new(self.id, frame)))
            .collect();
        Ok(())
    }

    /// Puts a new innermost frame on top of the current stack.
    pub(crate) fn push_frame(&mut self, frame: StackFrame) -> DebugResult<()> {
        if self.is_terminated() {
            return Err(self.invalid("update frames"));
        }
        for old in &self.frames {
            old.mark_dirty();
        }
        self.frames
            .insert(0, Arc::new(DebugStackFrame::new(self.id, frame)));
        Ok(())
    }
}
