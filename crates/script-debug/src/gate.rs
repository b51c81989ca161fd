use std::collections::HashSet;

use parking_lot::Mutex;

use crate::error::{DebugError, DebugResult};
use crate::event::{RuntimeNotification, ThreadId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Ended,
}

#[derive(Debug)]
struct GateState {
    phase: Phase,
    closed: bool,
    /// Threads that have announced themselves with a `ScriptReady`.
    known: HashSet<ThreadId>,
    paused: HashSet<ThreadId>,
}

/// Synchronous admission check for runtime notifications.
///
/// Tracks which threads have a pause waiting for a decision, so a thread
/// cannot report again until a `Resume` for it has been dispatched.
#[derive(Debug)]
pub(crate) struct ExecutionGate {
    state: Mutex<GateState>,
}

impl ExecutionGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                phase: Phase::Idle,
                closed: false,
                known: HashSet::new(),
                paused: HashSet::new(),
            }),
        }
    }

    pub(crate) fn admit(&self, notification: &RuntimeNotification) -> DebugResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DebugError::Closed);
        }

        match notification {
            RuntimeNotification::EngineStarted => {
                if state.phase == Phase::Ended {
                    return Err(DebugError::Terminated);
                }
                state.phase = Phase::Started;
            }
            RuntimeNotification::EngineTerminated => {
                state.phase = Phase::Ended;
                state.paused.clear();
            }
            _ => {
                match state.phase {
                    Phase::Idle => return Err(DebugError::NotStarted),
                    Phase::Ended => return Err(DebugError::Terminated),
                    Phase::Started => {}
                }
                if let Some(thread) = notification.thread() {
                    let announces = matches!(notification, RuntimeNotification::ScriptReady { .. });
                    if !announces && !state.known.contains(&thread) {
                        return Err(DebugError::UnknownThread(thread));
                    }
                    if state.paused.contains(&thread) {
                        return Err(DebugError::PauseInFlight(thread));
                    }
                    if announces {
                        state.known.insert(thread);
                    }
                    if notification.is_pause() {
                        state.paused.insert(thread);
                    }
                }
            }
        }
        Ok(())
    }

    /// Undoes the pause recorded by `admit` when the notification never made
    /// it into the queue.
    pub(crate) fn revoke(&self, notification: &RuntimeNotification) {
        if notification.is_pause() {
            if let Some(thread) = notification.thread() {
                self.state.lock().paused.remove(&thread);
            }
        }
    }

    /// A `Resume` for the thread has been dispatched.
    pub(crate) fn release(&self, thread: ThreadId) -> bool {
        self.state.lock().paused.remove(&thread)
    }

    pub(crate) fn release_all(&self) {
        self.state.lock().paused.clear();
    }

    pub(crate) fn is_paused(&self, thread: ThreadId) -> bool {
        self.state.lock().paused.contains(&thread)
    }

    /// No further notifications are accepted.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.paused.clear();
    }
}
