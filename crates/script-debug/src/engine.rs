//! Interpreter-side half of the bridge.
//!
//! [`ScriptDebugger`] is what an interpreter calls at its pause points. It
//! decides whether a line should stop (breakpoint hit or step boundary),
//! reports the stop through the [`ExecutionNotifier`], and blocks the calling
//! thread until the session sends a decision.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use script_debug_config::DebuggerConfig;

use crate::breakpoint::{Breakpoint, BreakpointAction};
use crate::error::{DebugError, DebugResult};
use crate::event::{ControlCommand, ResumeMode, SuspendReason, ThreadId};
use crate::frame::StackFrame;
use crate::listener::CommandHandler;
use crate::script::{Script, ScriptId, ScriptSnapshot};
use crate::session::ExecutionNotifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Closed {
    Terminated,
    /// The session went away but the script keeps running unobserved.
    Detached,
}

/// A step decision and the stack depth it was taken at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct StepRequest {
    mode: ResumeMode,
    depth: usize,
}

impl StepRequest {
    fn reached(self, depth: usize) -> bool {
        match self.mode {
            ResumeMode::StepInto => true,
            ResumeMode::StepOver => depth <= self.depth,
            ResumeMode::StepReturn => depth < self.depth,
            ResumeMode::Resume | ResumeMode::ClientRequest => false,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    /// Threads blocked in a pause; `Some` once a decision arrived.
    pauses: HashMap<ThreadId, Option<ResumeMode>>,
    steps: HashMap<ThreadId, StepRequest>,
    breakpoints: HashMap<ScriptId, Vec<Breakpoint>>,
    closed: Option<Closed>,
}

pub struct ScriptDebugger {
    notifier: ExecutionNotifier,
    show_dynamic_code: bool,
    resume_timeout: Option<Duration>,
    state: Mutex<EngineState>,
    wake: Condvar,
}

impl ScriptDebugger {
    pub fn new(notifier: ExecutionNotifier, config: &DebuggerConfig) -> Self {
        Self {
            notifier,
            show_dynamic_code: config.show_dynamic_code,
            resume_timeout: config.resume_timeout(),
            state: Mutex::new(EngineState::default()),
            wake: Condvar::new(),
        }
    }

    /// Dynamic code is only reported when configured to be shown.
    pub fn is_tracked(&self, script: &Script) -> bool {
        !script.is_dynamic() || self.show_dynamic_code
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().closed == Some(Closed::Terminated)
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().closed == Some(Closed::Detached)
    }

    pub fn breakpoints(&self, script: ScriptId) -> Vec<Breakpoint> {
        self.state
            .lock()
            .breakpoints
            .get(&script)
            .cloned()
            .unwrap_or_default()
    }

    fn check_open(&self) -> DebugResult<bool> {
        match self.state.lock().closed {
            Some(Closed::Terminated) => Err(DebugError::Terminated),
            Some(Closed::Detached) => Ok(false),
            None => Ok(true),
        }
    }

    pub fn engine_started(&self) -> DebugResult<()> {
        self.notifier.notify_engine_started()
    }

    pub fn engine_terminated(&self) -> DebugResult<()> {
        if self.is_detached() {
            return Ok(());
        }
        self.notifier.notify_engine_terminated()
    }

    /// Reports a script about to run on `thread` and waits for the session's
    /// decision. `depth` is the stack depth before the script's frame is
    /// pushed; `0` means the root script.
    pub fn script_ready(&self, thread: ThreadId, script: &Script, depth: usize) -> DebugResult<()> {
        if !self.check_open()? || !self.is_tracked(script) {
            return Ok(());
        }
        let snapshot = ScriptSnapshot::capture(script);
        self.pause(thread, depth, true, |notifier| {
            notifier.notify_script_ready(thread, snapshot, depth == 0)
        })
    }

    /// Called before each line runs. Stops on an enabled breakpoint or when a
    /// pending step is complete. `capture` is only invoked when the thread
    /// actually stops.
    pub fn process_line(
        &self,
        thread: ThreadId,
        script: &Script,
        line: u32,
        depth: usize,
        capture: impl FnOnce() -> Vec<StackFrame>,
    ) -> DebugResult<()> {
        if !self.check_open()? || !self.is_tracked(script) {
            return Ok(());
        }

        let reason = {
            let state = self.state.lock();
            let hit = state
                .breakpoints
                .get(&script.id())
                .is_some_and(|breakpoints| breakpoints.iter().any(|bp| bp.hits(line)));
            if hit {
                Some(SuspendReason::Breakpoint)
            } else {
                state
                    .steps
                    .get(&thread)
                    .is_some_and(|step| step.reached(depth))
                    .then_some(SuspendReason::StepEnd)
            }
        };
        let Some(reason) = reason else {
            return Ok(());
        };

        tracing::debug!(
            target: "script_debug.engine",
            %thread,
            script = %script.id(),
            line,
            ?reason,
            "suspending"
        );
        let frames = capture();
        self.pause(thread, depth, false, |notifier| {
            notifier.notify_suspended(thread, frames, reason)
        })
    }

    /// Blocks until a decision arrives. With `keep_step`, a plain resume
    /// leaves a pending step in place; script loads use this so a step over
    /// an include still stops after it.
    fn pause(
        &self,
        thread: ThreadId,
        depth: usize,
        keep_step: bool,
        submit: impl FnOnce(&ExecutionNotifier) -> DebugResult<()>,
    ) -> DebugResult<()> {
        // The slot must exist before the notification is queued so a fast
        // decision has somewhere to land.
        self.state.lock().pauses.insert(thread, None);

        if let Err(err) = submit(&self.notifier) {
            let mut state = self.state.lock();
            state.pauses.remove(&thread);
            if state.closed == Some(Closed::Detached) {
                return Ok(());
            }
            return Err(err);
        }

        let started = Instant::now();
        let mut state = self.state.lock();
        let mode = loop {
            if let Some(Some(mode)) = state.pauses.get(&thread).copied() {
                state.pauses.remove(&thread);
                break mode;
            }
            match state.closed {
                Some(Closed::Terminated) => {
                    state.pauses.remove(&thread);
                    return Err(DebugError::Terminated);
                }
                Some(Closed::Detached) => {
                    state.pauses.remove(&thread);
                    return Ok(());
                }
                None => {}
            }
            match self.resume_timeout {
                Some(timeout) => {
                    let timed_out = self.wake.wait_until(&mut state, started + timeout).timed_out();
                    if timed_out && !matches!(state.pauses.get(&thread), Some(Some(_))) {
                        state.pauses.remove(&thread);
                        state.steps.remove(&thread);
                        drop(state);
                        return self.abandon(thread, timeout);
                    }
                }
                None => self.wake.wait(&mut state),
            }
        };

        if mode.is_step() {
            state.steps.insert(thread, StepRequest { mode, depth });
        } else if !keep_step {
            state.steps.remove(&thread);
        }
        drop(state);

        if let Err(err) = self.notifier.notify_resumed(thread, mode) {
            tracing::debug!(
                target: "script_debug.engine",
                %thread,
                error = %err,
                "resume not reported"
            );
        }
        Ok(())
    }

    fn abandon(&self, thread: ThreadId, timeout: Duration) -> DebugResult<()> {
        tracing::warn!(
            target: "script_debug.engine",
            %thread,
            timeout_ms = timeout.as_millis() as u64,
            "no resume decision in time; continuing"
        );
        self.notifier.abandon_pause(thread);
        if let Err(err) = self.notifier.notify_resumed(thread, ResumeMode::ClientRequest) {
            tracing::debug!(
                target: "script_debug.engine",
                %thread,
                error = %err,
                "timed-out resume not reported"
            );
        }
        Err(DebugError::ResumeTimeout(timeout))
    }
}

impl CommandHandler for ScriptDebugger {
    fn handle_command(&self, command: &ControlCommand) {
        let mut state = self.state.lock();
        match command {
            ControlCommand::Resume { thread, mode } => match state.pauses.get_mut(thread) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(*mode);
                    self.wake.notify_all();
                }
                _ => {
                    tracing::debug!(
                        target: "script_debug.engine",
                        %thread,
                        "resume for thread that is not paused ignored"
                    );
                }
            },
            ControlCommand::Terminate => {
                if state.closed.is_none() {
                    state.closed = Some(Closed::Terminated);
                }
                self.wake.notify_all();
            }
            ControlCommand::Disconnect => {
                state.closed = Some(Closed::Detached);
                state.steps.clear();
                state.breakpoints.clear();
                self.wake.notify_all();
            }
            ControlCommand::SetBreakpoint {
                script,
                breakpoint,
                action,
            } => {
                let entries = state.breakpoints.entry(*script).or_default();
                match action {
                    BreakpointAction::Add => {
                        if !entries.contains(breakpoint) {
                            entries.push(breakpoint.clone());
                        }
                    }
                    BreakpointAction::Remove => entries.retain(|entry| entry != breakpoint),
                }
            }
        }
    }

    fn session_closed(&self) {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some(Closed::Terminated);
        }
        self.wake.notify_all();
    }
}
