//! The ordered event queue and the worker that drains it.
//!
//! Exactly one dispatcher thread exists per session. It pops events in
//! submission order and runs their handlers one at a time:
//!
//! * runtime notifications update the [`DebugTarget`](crate::target::DebugTarget)
//!   and are then reported to the [`ControlListener`];
//! * control commands go through the target's bookkeeping first and are then
//!   handed to the interpreter's [`CommandHandler`].
//!
//! A panicking handler ends the session: it is logged, the target is
//! terminated with a [`SessionFault`], and every paused interpreter thread is
//! released.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{DebugError, DebugResult};
use crate::event::{ControlCommand, DebugEvent, RuntimeNotification};
use crate::listener::{CommandHandler, ControlEvent, ControlListener, SessionFault};
use crate::session::SessionShared;
use crate::target::Outcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// An equal event was still waiting in the queue; this one was dropped.
    Duplicate,
}

#[derive(Debug)]
struct QueueState {
    events: VecDeque<DebugEvent>,
    cancelled: bool,
    closed: bool,
}

#[derive(Debug)]
struct QueueInner {
    state: Mutex<QueueState>,
    available: Condvar,
    dedupe: bool,
}

/// Multi-producer FIFO feeding the dispatcher thread.
#[derive(Clone, Debug)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    pub fn new(dedupe: bool) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    events: VecDeque::new(),
                    cancelled: false,
                    closed: false,
                }),
                available: Condvar::new(),
                dedupe,
            }),
        }
    }

    pub fn submit(&self, event: impl Into<DebugEvent>) -> DebugResult<Submitted> {
        let event = event.into();
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(DebugError::Closed);
        }
        if self.inner.dedupe && state.events.contains(&event) {
            tracing::trace!(
                target: "script_debug.dispatcher",
                event = event.kind(),
                "duplicate event dropped"
            );
            return Ok(Submitted::Duplicate);
        }
        state.events.push_back(event);
        drop(state);
        self.inner.available.notify_one();
        Ok(Submitted::Queued)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the dispatcher once its current handler returns. Events still
    /// queued are never delivered and new submissions fail.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if state.cancelled {
            return;
        }
        state.cancelled = true;
        state.closed = true;
        drop(state);
        self.inner.available.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Blocks until an event is available. `None` once the queue is cancelled,
    /// or closed and drained.
    fn next(&self) -> Option<DebugEvent> {
        let mut state = self.inner.state.lock();
        loop {
            if state.cancelled {
                return None;
            }
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.closed {
                return None;
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Rejects further submissions; returns the number of discarded events.
    fn close(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.closed = true;
        let dropped = state.events.len();
        state.events.clear();
        drop(state);
        self.inner.available.notify_all();
        dropped
    }
}

/// Why the dispatcher loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchExit {
    EngineTerminated,
    Disconnected,
    Cancelled,
    Faulted(SessionFault),
}

enum Flow {
    Continue,
    Stop(DispatchExit),
}

pub(crate) struct Dispatcher {
    pub(crate) queue: EventQueue,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) listener: Arc<dyn ControlListener>,
    pub(crate) execution: Arc<dyn CommandHandler>,
    pub(crate) slow_threshold: Option<Duration>,
}

impl Dispatcher {
    pub(crate) fn spawn(self, name: String) -> DebugResult<JoinHandle<DispatchExit>> {
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(|err| DebugError::Spawn(err.to_string()))
    }

    fn run(self) -> DispatchExit {
        tracing::debug!(target: "script_debug.dispatcher", "dispatcher started");

        let exit = loop {
            let Some(event) = self.queue.next() else {
                break DispatchExit::Cancelled;
            };
            let kind = event.kind();
            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| self.dispatch(event)));
            self.check_slow(kind, started.elapsed());

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop(exit)) => break exit,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    tracing::error!(
                        target: "script_debug.dispatcher",
                        event = kind,
                        panic = %message,
                        "event handler panicked; terminating session"
                    );
                    break self.fail(SessionFault {
                        event: kind.to_owned(),
                        message,
                    });
                }
            }
        };

        let dropped = self.queue.close();
        if dropped > 0 {
            tracing::debug!(
                target: "script_debug.dispatcher",
                dropped,
                "undelivered events discarded"
            );
        }
        self.shared.gate.close();
        if catch_unwind(AssertUnwindSafe(|| self.execution.session_closed())).is_err() {
            tracing::error!(
                target: "script_debug.dispatcher",
                "command handler panicked while closing"
            );
        }

        tracing::debug!(target: "script_debug.dispatcher", ?exit, "dispatcher stopped");
        exit
    }

    fn check_slow(&self, kind: &'static str, elapsed: Duration) {
        if let Some(threshold) = self.slow_threshold {
            if elapsed > threshold {
                tracing::warn!(
                    target: "script_debug.dispatcher",
                    event = kind,
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "slow event handler"
                );
            }
        }
    }

    fn dispatch(&self, event: DebugEvent) -> Flow {
        tracing::debug!(target: "script_debug.dispatcher", event = event.kind(), "dispatch");

        match event {
            DebugEvent::Notification(notification) => {
                let ends_session = matches!(notification, RuntimeNotification::EngineTerminated);
                let outcome = self
                    .shared
                    .target
                    .write()
                    .handle_notification(notification, &self.shared.breakpoints);
                self.finish(outcome);
                if ends_session {
                    Flow::Stop(DispatchExit::EngineTerminated)
                } else {
                    Flow::Continue
                }
            }
            DebugEvent::Command(command) => {
                let outcome = self.shared.target.write().handle_command(&command);
                let deliver = outcome.deliver;
                if deliver {
                    match &command {
                        ControlCommand::Resume { thread, .. } => {
                            self.shared.gate.release(*thread);
                        }
                        ControlCommand::Terminate | ControlCommand::Disconnect => {
                            self.shared.gate.release_all();
                        }
                        ControlCommand::SetBreakpoint { .. } => {}
                    }
                }
                self.finish(outcome);
                if !deliver {
                    return Flow::Continue;
                }

                self.execution.handle_command(&command);
                if command == ControlCommand::Disconnect {
                    Flow::Stop(DispatchExit::Disconnected)
                } else {
                    Flow::Continue
                }
            }
        }
    }

    fn finish(&self, outcome: Outcome) {
        for callback in &outcome.callbacks {
            callback.deliver(self.listener.as_ref());
        }
        for command in outcome.follow_ups {
            if let Err(err) = self.queue.submit(command) {
                tracing::warn!(
                    target: "script_debug.dispatcher",
                    error = %err,
                    "follow-up command not queued"
                );
            }
        }
    }

    fn fail(&self, fault: SessionFault) -> DispatchExit {
        let callbacks = self.shared.target.write().terminate(Some(fault.clone()));
        self.shared.gate.release_all();
        for callback in callbacks {
            self.deliver_guarded(&callback);
        }
        DispatchExit::Faulted(fault)
    }

    fn deliver_guarded(&self, callback: &ControlEvent) {
        let listener = self.listener.as_ref();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback.deliver(listener))) {
            tracing::error!(
                target: "script_debug.dispatcher",
                panic = %panic_message(&*panic),
                "listener panicked during session teardown"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "<non-string panic payload>".to_owned())
}
