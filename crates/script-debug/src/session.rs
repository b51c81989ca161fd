//! Construction of a debug session and the two facades onto it.
//!
//! ```text
//! let channel = DebugChannel::new(&config);
//! let engine = Arc::new(ScriptDebugger::new(channel.notifier(), &config));
//! let session = DebugSession::start(channel, &config, listener, engine.clone())?;
//! ```
//!
//! The interpreter side talks to the session through [`ExecutionNotifier`];
//! the control side through [`DebugSession`]. Neither side ever calls into
//! the other directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use script_debug_config::DebuggerConfig;
use serde::Serialize;

use crate::breakpoint::{Breakpoint, BreakpointAction, BreakpointStore};
use crate::dispatcher::{DispatchExit, Dispatcher, EventQueue};
use crate::error::{DebugError, DebugResult};
use crate::event::{ControlCommand, ResumeMode, RuntimeNotification, SuspendReason, ThreadId};
use crate::frame::{DebugStackFrame, StackFrame};
use crate::gate::ExecutionGate;
use crate::listener::{CommandHandler, ControlListener, SessionFault};
use crate::script::{ScriptId, ScriptSnapshot};
use crate::target::{DebugTarget, ProcessHandle, TargetOptions, TargetState};
use crate::thread::ThreadState;

/// State shared by the dispatcher and both facades.
#[derive(Debug)]
pub(crate) struct SessionShared {
    /// Written only by the dispatcher thread.
    pub(crate) target: RwLock<DebugTarget>,
    pub(crate) gate: ExecutionGate,
    pub(crate) breakpoints: BreakpointStore,
}

/// The queue and shared state of a session that has not started dispatching
/// yet. Hand out [`ExecutionNotifier`]s from it, then pass it to
/// [`DebugSession::start`].
pub struct DebugChannel {
    queue: EventQueue,
    shared: Arc<SessionShared>,
}

impl DebugChannel {
    pub fn new(config: &DebuggerConfig) -> Self {
        Self {
            queue: EventQueue::new(config.dedupe_queued_events),
            shared: Arc::new(SessionShared {
                target: RwLock::new(DebugTarget::new(TargetOptions::from(config))),
                gate: ExecutionGate::new(),
                breakpoints: BreakpointStore::new(),
            }),
        }
    }

    pub fn notifier(&self) -> ExecutionNotifier {
        ExecutionNotifier {
            queue: self.queue.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Interpreter-side entry point. Cheap to clone; every method may be called
/// from any thread.
///
/// After `notify_script_ready` or `notify_suspended` the thread must wait for
/// a `Resume` before reporting anything else; until then further
/// notifications for it fail with [`DebugError::PauseInFlight`].
#[derive(Clone, Debug)]
pub struct ExecutionNotifier {
    queue: EventQueue,
    shared: Arc<SessionShared>,
}

impl ExecutionNotifier {
    fn notify(&self, notification: RuntimeNotification) -> DebugResult<()> {
        self.shared.gate.admit(&notification)?;
        let pause = notification.is_pause().then(|| notification.clone());
        if let Err(err) = self.queue.submit(notification) {
            if let Some(pause) = pause {
                self.shared.gate.revoke(&pause);
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn notify_engine_started(&self) -> DebugResult<()> {
        self.notify(RuntimeNotification::EngineStarted)
    }

    pub fn notify_script_ready(
        &self,
        thread: ThreadId,
        script: ScriptSnapshot,
        is_root: bool,
    ) -> DebugResult<()> {
        self.notify(RuntimeNotification::ScriptReady {
            thread,
            script,
            is_root,
        })
    }

    pub fn notify_stack_frames(&self, thread: ThreadId, frames: Vec<StackFrame>) -> DebugResult<()> {
        self.notify(RuntimeNotification::StackFrames { thread, frames })
    }

    pub fn notify_suspended(
        &self,
        thread: ThreadId,
        frames: Vec<StackFrame>,
        reason: SuspendReason,
    ) -> DebugResult<()> {
        self.notify(RuntimeNotification::Suspended {
            thread,
            frames,
            reason,
        })
    }

    pub fn notify_resumed(&self, thread: ThreadId, reason: ResumeMode) -> DebugResult<()> {
        self.notify(RuntimeNotification::Resumed { thread, reason })
    }

    pub fn notify_engine_terminated(&self) -> DebugResult<()> {
        self.notify(RuntimeNotification::EngineTerminated)
    }

    /// Gives up on a pause without a decision, e.g. after a timeout, so the
    /// thread may report again.
    pub fn abandon_pause(&self, thread: ThreadId) -> bool {
        self.shared.gate.release(thread)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
}

/// Control-side handle of a running session.
///
/// Commands are queued and return immediately; state changes become visible
/// once the dispatcher has processed them and are reported through the
/// [`ControlListener`].
pub struct DebugSession {
    queue: EventQueue,
    shared: Arc<SessionShared>,
    terminate_requested: AtomicBool,
    worker: Mutex<Option<JoinHandle<DispatchExit>>>,
}

impl DebugSession {
    pub fn start(
        channel: DebugChannel,
        config: &DebuggerConfig,
        listener: Arc<dyn ControlListener>,
        execution: Arc<dyn CommandHandler>,
    ) -> DebugResult<Self> {
        let DebugChannel { queue, shared } = channel;
        let dispatcher = Dispatcher {
            queue: queue.clone(),
            shared: Arc::clone(&shared),
            listener,
            execution,
            slow_threshold: config.slow_handler_threshold(),
        };
        let worker = dispatcher.spawn("script-debug-dispatch".to_owned())?;
        tracing::debug!(target: "script_debug.session", "session started");

        Ok(Self {
            queue,
            shared,
            terminate_requested: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn state(&self) -> TargetState {
        self.shared.target.read().state()
    }

    /// Time since the engine reported start, `None` before that.
    pub fn engine_uptime(&self) -> Option<Duration> {
        self.shared.target.read().process().map(ProcessHandle::uptime)
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == TargetState::Terminated
    }

    pub fn fault(&self) -> Option<SessionFault> {
        self.shared.target.read().fault().cloned()
    }

    pub fn threads(&self) -> Vec<ThreadSummary> {
        self.shared
            .target
            .read()
            .registry()
            .threads()
            .map(|thread| ThreadSummary {
                id: thread.id(),
                name: thread.name().to_owned(),
                state: thread.state(),
            })
            .collect()
    }

    pub fn thread_state(&self, thread: ThreadId) -> DebugResult<ThreadState> {
        self.shared
            .target
            .read()
            .thread(thread)
            .map(|thread| thread.state())
            .ok_or(DebugError::UnknownThread(thread))
    }

    /// Why the thread last stopped; `None` if it never did.
    pub fn suspend_reason(&self, thread: ThreadId) -> DebugResult<Option<SuspendReason>> {
        self.shared
            .target
            .read()
            .thread(thread)
            .map(|thread| thread.last_suspend_reason())
            .ok_or(DebugError::UnknownThread(thread))
    }

    /// Frames of the thread, innermost first.
    pub fn stack_frames(&self, thread: ThreadId) -> DebugResult<Vec<Arc<DebugStackFrame>>> {
        self.shared
            .target
            .read()
            .thread(thread)
            .map(|thread| thread.stack_frames())
            .ok_or(DebugError::UnknownThread(thread))
    }

    fn suspended(&self, thread: ThreadId) -> bool {
        self.shared
            .target
            .read()
            .thread(thread)
            .is_some_and(|thread| thread.is_suspended())
    }

    pub fn can_resume(&self, thread: ThreadId) -> bool {
        self.suspended(thread)
    }

    pub fn can_step_into(&self, thread: ThreadId) -> bool {
        self.suspended(thread)
    }

    pub fn can_step_over(&self, thread: ThreadId) -> bool {
        self.suspended(thread)
    }

    pub fn can_step_return(&self, thread: ThreadId) -> bool {
        self.suspended(thread)
    }

    pub fn resume(&self, thread: ThreadId, mode: ResumeMode) -> DebugResult<()> {
        {
            let target = self.shared.target.read();
            if target.is_terminated() {
                return Err(DebugError::Terminated);
            }
            let debug_thread = target
                .thread(thread)
                .ok_or(DebugError::UnknownThread(thread))?;
            if !debug_thread.can_resume() {
                return Err(DebugError::InvalidTransition {
                    thread,
                    state: debug_thread.state(),
                    action: "resume",
                });
            }
        }
        self.queue.submit(ControlCommand::Resume { thread, mode })?;
        Ok(())
    }

    pub fn step_into(&self, thread: ThreadId) -> DebugResult<()> {
        self.resume(thread, ResumeMode::StepInto)
    }

    pub fn step_over(&self, thread: ThreadId) -> DebugResult<()> {
        self.resume(thread, ResumeMode::StepOver)
    }

    pub fn step_return(&self, thread: ThreadId) -> DebugResult<()> {
        self.resume(thread, ResumeMode::StepReturn)
    }

    /// Resumes every suspended thread; returns how many were resumed.
    pub fn resume_all(&self) -> DebugResult<usize> {
        let suspended: Vec<ThreadId> = {
            let target = self.shared.target.read();
            if target.is_terminated() {
                return Err(DebugError::Terminated);
            }
            target
                .registry()
                .threads()
                .filter(|thread| thread.is_suspended())
                .map(|thread| thread.id())
                .collect()
        };
        for &thread in &suspended {
            self.queue.submit(ControlCommand::Resume {
                thread,
                mode: ResumeMode::ClientRequest,
            })?;
        }
        Ok(suspended.len())
    }

    /// Asks the interpreter to stop. The session moves to `Terminated` when
    /// the engine reports its end; repeated calls are no-ops.
    pub fn terminate(&self) -> DebugResult<()> {
        if self.is_terminated() || self.terminate_requested.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(target: "script_debug.session", "terminate requested");
        if let Err(err) = self.queue.submit(ControlCommand::Terminate) {
            self.terminate_requested.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }

    /// Detaches from the interpreter: paused threads continue, the script
    /// runs to completion unobserved and the session terminates.
    pub fn disconnect(&self) -> DebugResult<()> {
        if self.is_terminated() {
            return Ok(());
        }
        tracing::info!(target: "script_debug.session", "disconnect requested");
        self.queue.submit(ControlCommand::Disconnect)?;
        Ok(())
    }

    /// Records the breakpoint and installs it in every loaded script with a
    /// matching resource. Scripts loaded later pick it up when they become
    /// ready.
    pub fn add_breakpoint(&self, breakpoint: Breakpoint) -> DebugResult<()> {
        if !self.shared.breakpoints.add(breakpoint.clone()) {
            return Ok(());
        }
        self.forward_breakpoint(breakpoint, BreakpointAction::Add)
    }

    pub fn remove_breakpoint(&self, breakpoint: &Breakpoint) -> DebugResult<()> {
        if !self.shared.breakpoints.remove(breakpoint) {
            return Ok(());
        }
        self.forward_breakpoint(breakpoint.clone(), BreakpointAction::Remove)
    }

    fn forward_breakpoint(&self, breakpoint: Breakpoint, action: BreakpointAction) -> DebugResult<()> {
        let scripts = self
            .shared
            .target
            .read()
            .scripts_on_stacks(breakpoint.resource());
        for script in scripts {
            self.queue.submit(ControlCommand::SetBreakpoint {
                script,
                breakpoint: breakpoint.clone(),
                action,
            })?;
        }
        Ok(())
    }

    /// Installs a breakpoint in one specific script, bypassing the store.
    pub fn set_breakpoint(&self, script: ScriptId, breakpoint: Breakpoint) -> DebugResult<()> {
        self.queue.submit(ControlCommand::SetBreakpoint {
            script,
            breakpoint,
            action: BreakpointAction::Add,
        })?;
        Ok(())
    }

    pub fn breakpoints(&self) -> &BreakpointStore {
        &self.shared.breakpoints
    }

    /// Stops the dispatcher after its current handler. Queued events are
    /// discarded and paused interpreter threads are released.
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    /// Waits for the dispatcher thread. Returns `None` if it was already
    /// joined.
    pub fn join(&self) -> Option<DispatchExit> {
        let handle = self.worker.lock().take()?;
        match handle.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                tracing::error!(target: "script_debug.session", "dispatcher thread panicked");
                None
            }
        }
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        // The worker is detached rather than joined; it exits on its own once
        // the current handler returns.
        self.queue.cancel();
    }
}
