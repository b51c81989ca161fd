use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use script_debug::interp::{InterpResult, Interpreter};
use script_debug::{
    CommandHandler, ControlCommand, ControlListener, DebugChannel, DebugSession, DebugStackFrame,
    DebuggerConfig, ExecutionNotifier, FrameKind, Scope, Script, ScriptDebugger, ScriptId,
    ScriptSnapshot, SessionFault, StackFrame, SuspendReason, ThreadId, ThreadState,
};

pub const T1: ThreadId = ThreadId::new(1);
pub const T2: ThreadId = ThreadId::new(2);
pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq)]
pub enum Seen {
    SessionCreated,
    ThreadCreated(ThreadId),
    State(ThreadId, ThreadState),
    Frames(ThreadId),
    Terminated(Option<SessionFault>),
}

/// Receiving end of a recorder, with timeouts on every wait.
pub struct Stream<T>(Receiver<T>);

impl<T: Clone + Debug + PartialEq> Stream<T> {
    pub fn next(&self) -> T {
        self.0
            .recv_timeout(WAIT)
            .expect("timed out waiting for the next recorded item")
    }

    /// Items up to and including the first one equal to `wanted`.
    pub fn until(&self, wanted: &T) -> Vec<T> {
        let mut seen = Vec::new();
        loop {
            let item = self.next();
            let done = &item == wanted;
            seen.push(item);
            if done {
                return seen;
            }
        }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.0.recv_timeout(QUIET), Err(RecvTimeoutError::Timeout))
    }

    pub fn drain(&self) -> Vec<T> {
        self.0.try_iter().collect()
    }
}

/// A one-shot gate a test can wait on.
#[derive(Clone, Default)]
pub struct Latch(Arc<(Mutex<bool>, Condvar)>);

impl Latch {
    pub fn open(&self) {
        let (open, changed) = &*self.0;
        *open.lock() = true;
        changed.notify_all();
    }

    pub fn wait(&self) {
        let (open, changed) = &*self.0;
        let deadline = Instant::now() + WAIT;
        let mut guard = open.lock();
        while !*guard {
            assert!(
                !changed.wait_until(&mut guard, deadline).timed_out(),
                "latch never opened"
            );
        }
    }
}

/// Blocks the dispatcher inside `on_session_created` until released.
#[derive(Clone, Default)]
pub struct Hold {
    pub entered: Latch,
    pub release: Latch,
}

pub struct Recorder {
    tx: Mutex<Sender<Seen>>,
    hold: Option<Hold>,
    panic_on_thread_created: bool,
}

impl ControlListener for Recorder {
    fn on_session_created(&self) {
        let _ = self.tx.lock().send(Seen::SessionCreated);
        if let Some(hold) = &self.hold {
            hold.entered.open();
            hold.release.wait();
        }
    }

    fn on_thread_created(&self, thread: ThreadId) {
        if self.panic_on_thread_created {
            panic!("listener rejected thread {thread}");
        }
        let _ = self.tx.lock().send(Seen::ThreadCreated(thread));
    }

    fn on_thread_state_changed(&self, thread: ThreadId, state: ThreadState) {
        let _ = self.tx.lock().send(Seen::State(thread, state));
    }

    fn on_stack_frames_changed(&self, thread: ThreadId) {
        let _ = self.tx.lock().send(Seen::Frames(thread));
    }

    fn on_session_terminated(&self, fault: Option<&SessionFault>) {
        let _ = self.tx.lock().send(Seen::Terminated(fault.cloned()));
    }
}

/// Stand-in for an interpreter: records every command it is handed.
pub struct CommandLog {
    tx: Mutex<Sender<ControlCommand>>,
    closed: AtomicBool,
    panic_on: Option<&'static str>,
}

impl CommandLog {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CommandHandler for CommandLog {
    fn handle_command(&self, command: &ControlCommand) {
        if self.panic_on == Some(command.kind()) {
            panic!("handler failed on {}", command.kind());
        }
        let _ = self.tx.lock().send(command.clone());
    }

    fn session_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct Setup {
    pub config: DebuggerConfig,
    pub hold: Option<Hold>,
    pub listener_panics_on_thread: bool,
    pub handler_panics_on: Option<&'static str>,
}

pub struct Fixture {
    pub session: DebugSession,
    pub notifier: ExecutionNotifier,
    pub events: Stream<Seen>,
    pub commands: Stream<ControlCommand>,
    pub log: Arc<CommandLog>,
}

impl Setup {
    pub fn with_config(config: DebuggerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn start(self) -> Fixture {
        let (event_tx, event_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();
        let recorder = Arc::new(Recorder {
            tx: Mutex::new(event_tx),
            hold: self.hold,
            panic_on_thread_created: self.listener_panics_on_thread,
        });
        let log = Arc::new(CommandLog {
            tx: Mutex::new(command_tx),
            closed: AtomicBool::new(false),
            panic_on: self.handler_panics_on,
        });

        let channel = DebugChannel::new(&self.config);
        let notifier = channel.notifier();
        let session = DebugSession::start(channel, &self.config, recorder, log.clone()).unwrap();

        Fixture {
            session,
            notifier,
            events: Stream(event_rx),
            commands: Stream(command_rx),
            log,
        }
    }
}

pub fn start() -> Fixture {
    Setup::default().start()
}

pub fn suspend_on_startup() -> DebuggerConfig {
    DebuggerConfig {
        suspend_on_startup: true,
        ..DebuggerConfig::default()
    }
}

pub fn script(id: u64, resource: &str, source: &str) -> Script {
    Script::from_resource(ScriptId::new(id), resource, source)
}

pub fn frame(script: &Script, line: u32) -> StackFrame {
    StackFrame::capture(script, line, FrameKind::Call, &Scope::new())
}

impl Fixture {
    pub fn engine_started(&self) {
        self.notifier.notify_engine_started().unwrap();
        assert_eq!(self.events.next(), Seen::SessionCreated);
    }

    pub fn script_ready(&self, thread: ThreadId, script: &Script, is_root: bool) {
        self.notifier
            .notify_script_ready(thread, ScriptSnapshot::capture(script), is_root)
            .unwrap();
    }

    /// Runs a root script load for `thread` through to its automatic resume.
    pub fn running_thread(&self, thread: ThreadId, script: &Script) -> ThreadState {
        self.script_ready(thread, script, true);
        loop {
            if let ControlCommand::Resume { thread: resumed, mode } = self.commands.next() {
                if resumed == thread {
                    return mode.resulting_state();
                }
            }
        }
    }
}

/// A session wired to a real [`ScriptDebugger`].
pub struct Engine {
    pub session: DebugSession,
    pub debugger: Arc<ScriptDebugger>,
    pub events: Stream<Seen>,
}

pub fn start_engine(config: DebuggerConfig) -> Engine {
    let (event_tx, event_rx) = mpsc::channel();
    let recorder = Arc::new(Recorder {
        tx: Mutex::new(event_tx),
        hold: None,
        panic_on_thread_created: false,
    });
    let channel = DebugChannel::new(&config);
    let debugger = Arc::new(ScriptDebugger::new(channel.notifier(), &config));
    let session = DebugSession::start(channel, &config, recorder, debugger.clone()).unwrap();
    Engine {
        session,
        debugger,
        events: Stream(event_rx),
    }
}

pub type RunResult = (InterpResult<()>, Vec<String>);

impl Engine {
    /// Runs `source` as resource `main.script` on a fresh thread.
    pub fn run(&self, source: &str, resources: &[(&str, &str)]) -> JoinHandle<RunResult> {
        let debugger = Arc::clone(&self.debugger);
        let source = source.to_owned();
        let resources: Vec<(String, String)> = resources
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect();
        std::thread::spawn(move || {
            let mut interp = Interpreter::new().with_debugger(debugger);
            for (name, text) in resources {
                interp = interp.with_resource(name, text);
            }
            let id = interp.next_script_id();
            let result = interp.run(Script::from_resource(id, "main.script", source));
            (result, interp.output().to_vec())
        })
    }

    pub fn controller(&self) -> Controller<'_> {
        Controller {
            session: &self.session,
            events: &self.events,
            last: None,
        }
    }
}

pub struct Stop {
    pub thread: ThreadId,
    pub reason: SuspendReason,
    pub frames: Vec<Arc<DebugStackFrame>>,
}

impl Stop {
    pub fn line(&self) -> u32 {
        self.frames[0].line()
    }
}

/// Turns the raw event stream into user-visible stops. Script-load pauses are
/// resumed by the session itself and are skipped.
pub struct Controller<'a> {
    session: &'a DebugSession,
    events: &'a Stream<Seen>,
    last: Option<Arc<DebugStackFrame>>,
}

impl Controller<'_> {
    pub fn next_stop(&mut self) -> Option<Stop> {
        loop {
            match self.events.next() {
                Seen::State(thread, ThreadState::Suspended) => {
                    if !self.session.can_resume(thread) {
                        continue;
                    }
                    let reason = match self.session.suspend_reason(thread).unwrap() {
                        Some(SuspendReason::ScriptLoaded) | None => continue,
                        Some(reason) => reason,
                    };
                    let frames = self.session.stack_frames(thread).unwrap();
                    let top = frames.first().cloned();
                    if let (Some(top), Some(last)) = (&top, &self.last) {
                        if Arc::ptr_eq(top, last) {
                            continue;
                        }
                    }
                    self.last = top;
                    return Some(Stop {
                        thread,
                        reason,
                        frames,
                    });
                }
                Seen::Terminated(_) => return None,
                _ => {}
            }
        }
    }
}
