//! Session lifecycle and the runtime-notification handler.
//!
//! A [`DebugTarget`] is only ever mutated on the dispatcher thread. Every
//! mutating method returns the control callbacks it produced instead of
//! calling the listener directly, so callbacks run after the state lock is
//! released.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use script_debug_config::DebuggerConfig;
use serde::Serialize;

use crate::breakpoint::{BreakpointAction, BreakpointStore};
use crate::event::{ControlCommand, ResumeMode, RuntimeNotification, SuspendReason, ThreadId};
use crate::frame::{FrameKind, Scope, StackFrame};
use crate::listener::{ControlEvent, SessionFault};
use crate::registry::SessionRegistry;
use crate::script::{ScriptId, ScriptSnapshot};
use crate::thread::DebugThread;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetState {
    NotStarted,
    Running,
    Terminated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetOptions {
    pub suspend_on_startup: bool,
    pub suspend_on_script_load: bool,
    pub show_dynamic_code: bool,
}

impl From<&DebuggerConfig> for TargetOptions {
    fn from(config: &DebuggerConfig) -> Self {
        Self {
            suspend_on_startup: config.suspend_on_startup,
            suspend_on_script_load: config.suspend_on_script_load,
            show_dynamic_code: config.show_dynamic_code,
        }
    }
}

/// Stand-in for the debugged engine, created when the engine reports start.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    started_at: Instant,
}

impl ProcessHandle {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Side effects of handling one event.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub(crate) callbacks: Vec<ControlEvent>,
    /// Commands to append to the queue once the current dispatch completes.
    pub(crate) follow_ups: Vec<ControlCommand>,
    /// The execution side should see the command being dispatched.
    pub(crate) deliver: bool,
}

#[derive(Debug)]
pub struct DebugTarget {
    options: TargetOptions,
    state: TargetState,
    process: Option<ProcessHandle>,
    registry: SessionRegistry,
    fault: Option<SessionFault>,
}

impl DebugTarget {
    pub fn new(options: TargetOptions) -> Self {
        Self {
            options,
            state: TargetState::NotStarted,
            process: None,
            registry: SessionRegistry::new(),
            fault: None,
        }
    }

    pub fn options(&self) -> TargetOptions {
        self.options
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TargetState::Terminated
    }

    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn thread(&self, id: ThreadId) -> Option<&DebugThread> {
        self.registry.get(id)
    }

    pub fn fault(&self) -> Option<&SessionFault> {
        self.fault.as_ref()
    }

    /// How a thread continues after a script became ready.
    pub fn resume_mode_for(&self, is_root: bool) -> ResumeMode {
        if self.options.suspend_on_script_load || (is_root && self.options.suspend_on_startup) {
            ResumeMode::StepInto
        } else {
            ResumeMode::Resume
        }
    }

    /// Scripts with the given resource that are currently on any thread's stack.
    pub fn scripts_on_stacks(&self, resource: &str) -> BTreeSet<ScriptId> {
        self.registry
            .threads()
            .flat_map(|thread| thread.stack_frames())
            .filter(|frame| frame.script().resource() == Some(resource))
            .map(|frame| frame.script().id())
            .collect()
    }

    fn visible(&self, frames: Vec<StackFrame>) -> Vec<StackFrame> {
        if self.options.show_dynamic_code {
            return frames;
        }
        frames
            .into_iter()
            .filter(|frame| !frame.is_dynamic())
            .collect()
    }

    pub(crate) fn handle_notification(
        &mut self,
        notification: RuntimeNotification,
        breakpoints: &BreakpointStore,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        if self.is_terminated() {
            tracing::debug!(
                target: "script_debug.target",
                event = notification.kind(),
                "ignoring notification for terminated session"
            );
            return outcome;
        }

        match notification {
            RuntimeNotification::EngineStarted => {
                if self.state == TargetState::NotStarted {
                    self.state = TargetState::Running;
                    self.process = Some(ProcessHandle::new());
                    outcome.callbacks.push(ControlEvent::SessionCreated);
                    tracing::info!(target: "script_debug.target", "engine started");
                } else {
                    tracing::warn!(target: "script_debug.target", "duplicate engine start ignored");
                }
            }
            RuntimeNotification::EngineTerminated => {
                outcome.callbacks = self.terminate(None);
            }
            _ if self.state == TargetState::NotStarted => {
                tracing::warn!(
                    target: "script_debug.target",
                    event = notification.kind(),
                    "notification before engine start dropped"
                );
            }
            RuntimeNotification::ScriptReady {
                thread,
                script,
                is_root,
            } => self.script_ready(thread, script, is_root, breakpoints, &mut outcome),
            RuntimeNotification::StackFrames { thread, frames } => {
                let frames = self.visible(frames);
                let Some(debug_thread) = self.registry.get_mut(thread) else {
                    tracing::warn!(target: "script_debug.target", %thread, "frames for unknown thread dropped");
                    return outcome;
                };
                match debug_thread.replace_frames(frames) {
                    Ok(()) => outcome
                        .callbacks
                        .push(ControlEvent::StackFramesChanged { thread }),
                    Err(err) => {
                        tracing::warn!(target: "script_debug.target", error = %err, "frame update rejected")
                    }
                }
            }
            RuntimeNotification::Suspended {
                thread,
                frames,
                reason,
            } => {
                let frames = self.visible(frames);
                let Some(debug_thread) = self.registry.get_mut(thread) else {
                    tracing::warn!(target: "script_debug.target", %thread, "suspend for unknown thread dropped");
                    return outcome;
                };
                if let Err(err) = debug_thread.suspend(reason) {
                    tracing::warn!(target: "script_debug.target", error = %err, "suspend rejected");
                    return outcome;
                }
                if debug_thread.replace_frames(frames).is_ok() {
                    outcome
                        .callbacks
                        .push(ControlEvent::StackFramesChanged { thread });
                }
                outcome.callbacks.push(ControlEvent::ThreadStateChanged {
                    thread,
                    state: debug_thread.state(),
                });
            }
            RuntimeNotification::Resumed { thread, reason } => {
                let Some(debug_thread) = self.registry.get_mut(thread) else {
                    tracing::warn!(target: "script_debug.target", %thread, "resume for unknown thread dropped");
                    return outcome;
                };
                match debug_thread.note_resumed(reason) {
                    Ok(true) => outcome.callbacks.push(ControlEvent::ThreadStateChanged {
                        thread,
                        state: debug_thread.state(),
                    }),
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!(target: "script_debug.target", error = %err, "resume notification rejected")
                    }
                }
            }
        }

        outcome
    }

    fn script_ready(
        &mut self,
        thread: ThreadId,
        script: ScriptSnapshot,
        is_root: bool,
        breakpoints: &BreakpointStore,
        outcome: &mut Outcome,
    ) {
        let mode = self.resume_mode_for(is_root);
        let show_dynamic = self.options.show_dynamic_code;

        let (debug_thread, created) = self.registry.get_or_create(thread);
        if created {
            outcome.callbacks.push(ControlEvent::ThreadCreated { thread });
        }

        if let Err(err) = debug_thread.suspend(SuspendReason::ScriptLoaded) {
            tracing::warn!(target: "script_debug.target", error = %err, "script load on busy thread dropped");
            return;
        }

        if show_dynamic || !script.is_dynamic() {
            let kind = if script.is_dynamic() {
                FrameKind::Dynamic
            } else if is_root {
                FrameKind::Call
            } else {
                FrameKind::Include
            };
            if let Some(resource) = script.resource() {
                for breakpoint in breakpoints.for_resource(resource) {
                    outcome.follow_ups.push(ControlCommand::SetBreakpoint {
                        script: script.id(),
                        breakpoint,
                        action: BreakpointAction::Add,
                    });
                }
            }
            let frame = StackFrame::from_snapshot(script, 0, kind, Scope::new());
            if debug_thread.push_frame(frame).is_ok() {
                outcome
                    .callbacks
                    .push(ControlEvent::StackFramesChanged { thread });
            }
        }

        outcome.callbacks.push(ControlEvent::ThreadStateChanged {
            thread,
            state: debug_thread.state(),
        });
        outcome.follow_ups.push(ControlCommand::Resume { thread, mode });

        tracing::debug!(
            target: "script_debug.target",
            %thread,
            is_root,
            ?mode,
            "script ready"
        );
    }

    /// Bookkeeping for a command before the execution side sees it.
    pub(crate) fn handle_command(&mut self, command: &ControlCommand) -> Outcome {
        let mut outcome = Outcome::default();

        if self.is_terminated() {
            tracing::debug!(
                target: "script_debug.target",
                command = command.kind(),
                "command for terminated session dropped"
            );
            return outcome;
        }

        match command {
            ControlCommand::Resume { thread, mode } => {
                let Some(debug_thread) = self.registry.get_mut(*thread) else {
                    tracing::warn!(target: "script_debug.target", %thread, "resume for unknown thread dropped");
                    return outcome;
                };
                match debug_thread.apply_resume(*mode) {
                    Ok(state) => {
                        outcome.callbacks.push(ControlEvent::ThreadStateChanged {
                            thread: *thread,
                            state,
                        });
                        outcome.deliver = true;
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: "script_debug.target",
                            error = %err,
                            "duplicate resume dropped"
                        );
                    }
                }
            }
            ControlCommand::Disconnect => {
                outcome.callbacks = self.terminate(None);
                outcome.deliver = true;
            }
            ControlCommand::Terminate | ControlCommand::SetBreakpoint { .. } => {
                outcome.deliver = true;
            }
        }

        outcome
    }

    /// Moves the session to `Terminated`, cascading to every thread. Does
    /// nothing when already terminated.
    pub(crate) fn terminate(&mut self, fault: Option<SessionFault>) -> Vec<ControlEvent> {
        if self.is_terminated() {
            return Vec::new();
        }
        self.state = TargetState::Terminated;
        self.fault = fault.clone();

        let mut callbacks: Vec<_> = self
            .registry
            .terminate_all()
            .into_iter()
            .map(|thread| ControlEvent::ThreadStateChanged {
                thread,
                state: crate::thread::ThreadState::Terminated,
            })
            .collect();
        callbacks.push(ControlEvent::SessionTerminated { fault });

        tracing::info!(
            target: "script_debug.target",
            threads = self.registry.len(),
            faulted = self.fault.is_some(),
            "session terminated"
        );
        callbacks
    }
}
