//! In-process debugging bridge between a script interpreter and a
//! controlling session.
//!
//! The interpreter runs on its own thread and reports pause points through an
//! [`ExecutionNotifier`]; a control surface (an IDE view, a test, the bundled
//! CLI) watches the session through a [`ControlListener`] and steers it with
//! [`DebugSession`]. All traffic in both directions flows through a single
//! ordered queue drained by one dispatcher thread per session.

mod breakpoint;
mod dispatcher;
mod engine;
mod error;
mod event;
mod frame;
mod gate;
pub mod interp;
mod listener;
mod registry;
mod script;
mod session;
mod target;
mod thread;
mod value;

pub use breakpoint::{Breakpoint, BreakpointAction, BreakpointStore};
pub use dispatcher::{DispatchExit, EventQueue, Submitted};
pub use engine::ScriptDebugger;
pub use error::{DebugError, DebugResult};
pub use event::{
    ControlCommand, DebugEvent, ResumeMode, RuntimeNotification, SuspendReason, ThreadId,
};
pub use frame::{DebugStackFrame, FrameKind, Scope, StackFrame};
pub use listener::{CommandHandler, ControlEvent, ControlListener, NoopListener, SessionFault};
pub use registry::SessionRegistry;
pub use script::{Script, ScriptId, ScriptSnapshot};
pub use session::{DebugChannel, DebugSession, ExecutionNotifier, ThreadSummary};
pub use target::{DebugTarget, ProcessHandle, TargetOptions, TargetState};
pub use thread::{DebugThread, ThreadState};
pub use value::{Value, Variable};

pub use script_debug_config::{DebugConfig, DebuggerConfig};
