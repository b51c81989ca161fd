use std::fmt;

use serde::Serialize;

use crate::event::{ControlCommand, ThreadId};
use crate::thread::ThreadState;

/// Why a session ended abnormally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionFault {
    /// Kind of the event whose handler failed.
    pub event: String,
    pub message: String,
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler for `{}` panicked: {}", self.event, self.message)
    }
}

/// Receives session updates on the dispatcher thread.
///
/// Callbacks are made after the session state is updated, so the listener
/// may query the session from inside a callback. Keep them short; every
/// other event waits behind a running callback.
pub trait ControlListener: Send + Sync {
    fn on_session_created(&self) {}

    fn on_thread_created(&self, _thread: ThreadId) {}

    fn on_thread_state_changed(&self, _thread: ThreadId, _state: ThreadState) {}

    fn on_stack_frames_changed(&self, _thread: ThreadId) {}

    /// Called exactly once per session. `fault` is set when the session ended
    /// because a handler failed.
    fn on_session_terminated(&self, _fault: Option<&SessionFault>) {}
}

/// Listener that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl ControlListener for NoopListener {}

/// Receives control commands on the dispatcher thread. Implemented by the
/// interpreter side.
///
/// Duplicate commands must be harmless: a second `Resume` for a thread that
/// is already running is ignored.
pub trait CommandHandler: Send + Sync {
    fn handle_command(&self, command: &ControlCommand);

    /// The session is gone and no further commands will arrive. Anything
    /// still waiting for a decision must be released.
    fn session_closed(&self) {}
}

/// A callback recorded while the session state was locked, delivered once
/// the lock is released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControlEvent {
    SessionCreated,
    ThreadCreated { thread: ThreadId },
    ThreadStateChanged { thread: ThreadId, state: ThreadState },
    StackFramesChanged { thread: ThreadId },
    SessionTerminated { fault: Option<SessionFault> },
}

impl ControlEvent {
    pub fn deliver(&self, listener: &dyn ControlListener) {
        match self {
            ControlEvent::SessionCreated => listener.on_session_created(),
            ControlEvent::ThreadCreated { thread } => listener.on_thread_created(*thread),
            ControlEvent::ThreadStateChanged { thread, state } => {
                listener.on_thread_state_changed(*thread, *state)
            }
            ControlEvent::StackFramesChanged { thread } => {
                listener.on_stack_frames_changed(*thread)
            }
            ControlEvent::SessionTerminated { fault } => {
                listener.on_session_terminated(fault.as_ref())
            }
        }
    }
}
