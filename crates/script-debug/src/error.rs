use std::time::Duration;

use thiserror::Error;

use crate::event::ThreadId;
use crate::thread::ThreadState;

pub type DebugResult<T> = Result<T, DebugError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebugError {
    #[error("unknown debug thread {0}")]
    UnknownThread(ThreadId),
    #[error("thread {thread} cannot {action} while {state}")]
    InvalidTransition {
        thread: ThreadId,
        state: ThreadState,
        action: &'static str,
    },
    #[error("thread {0} is paused and waiting for a resume decision")]
    PauseInFlight(ThreadId),
    #[error("engine has not reported start yet")]
    NotStarted,
    #[error("debug session is terminated")]
    Terminated,
    #[error("debug session event queue is closed")]
    Closed,
    #[error("no resume decision within {0:?}")]
    ResumeTimeout(Duration),
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(String),
}
