use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use script_debug::interp::{InterpError, Interpreter};
use script_debug::{
    Breakpoint, ControlEvent, ControlListener, DebugChannel, DebugConfig, DebugError,
    DebugSession, DebugStackFrame, ResumeMode, Script, ScriptDebugger, SessionFault,
    SuspendReason, ThreadId, ThreadState,
};

/// Room for `interp::MAX_FRAMES` nested frames.
const INTERPRETER_STACK: usize = 8 * 1024 * 1024;

/// Run a script under the debugging bridge with an automatic controller.
///
/// Every session event is printed to stdout as one JSON object per line.
#[derive(Debug, Parser)]
#[command(name = "script-debug", version, about)]
struct Cli {
    /// Script file to run.
    script: PathBuf,

    /// Path to a TOML config file.
    ///
    /// If unset, `SCRIPT_DEBUG_CONFIG` is used as a fallback. When neither is
    /// provided the built-in defaults apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop on the first line of the script.
    #[arg(long)]
    suspend_on_startup: bool,

    /// Line breakpoint, either `LINE` in the root script or `RESOURCE:LINE`.
    #[arg(long = "break", value_name = "[RESOURCE:]LINE")]
    breakpoints: Vec<String>,

    /// How to continue after each stop.
    #[arg(long, value_enum, default_value_t = OnStop::Resume)]
    on_stop: OnStop,

    /// Terminate the script once it stopped this many times.
    #[arg(long, default_value_t = 100)]
    max_stops: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnStop {
    Resume,
    StepInto,
    StepOver,
    StepReturn,
}

impl From<OnStop> for ResumeMode {
    fn from(value: OnStop) -> Self {
        match value {
            OnStop::Resume => ResumeMode::Resume,
            OnStop::StepInto => ResumeMode::StepInto,
            OnStop::StepOver => ResumeMode::StepOver,
            OnStop::StepReturn => ResumeMode::StepReturn,
        }
    }
}

enum Signal {
    Stopped(ThreadId),
    Ended,
}

/// Prints control events and forwards stops to the controller loop.
struct JsonLines {
    signals: mpsc::Sender<Signal>,
}

impl JsonLines {
    fn print(&self, event: ControlEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(target: "script_debug.cli", error = %err, "event not printable"),
        }
    }
}

impl ControlListener for JsonLines {
    fn on_session_created(&self) {
        self.print(ControlEvent::SessionCreated);
    }

    fn on_thread_created(&self, thread: ThreadId) {
        self.print(ControlEvent::ThreadCreated { thread });
    }

    fn on_thread_state_changed(&self, thread: ThreadId, state: ThreadState) {
        self.print(ControlEvent::ThreadStateChanged { thread, state });
        if state == ThreadState::Suspended {
            let _ = self.signals.send(Signal::Stopped(thread));
        }
    }

    fn on_stack_frames_changed(&self, thread: ThreadId) {
        self.print(ControlEvent::StackFramesChanged { thread });
    }

    fn on_session_terminated(&self, fault: Option<&SessionFault>) {
        self.print(ControlEvent::SessionTerminated {
            fault: fault.cloned(),
        });
        let _ = self.signals.send(Signal::Ended);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.clone());
    if cli.suspend_on_startup {
        config.debugger.suspend_on_startup = true;
    }
    script_debug_config::init_tracing(&config.logging);

    let source = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("failed to read {}", cli.script.display()))?;
    let resource = cli.script.display().to_string();
    let base_dir = cli
        .script
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();

    let (signals, stops) = mpsc::channel();
    let channel = DebugChannel::new(&config.debugger);
    let debugger = Arc::new(ScriptDebugger::new(channel.notifier(), &config.debugger));
    let session = DebugSession::start(
        channel,
        &config.debugger,
        Arc::new(JsonLines { signals }),
        debugger.clone(),
    )?;

    for spec in &cli.breakpoints {
        session.add_breakpoint(parse_breakpoint(spec, &resource)?)?;
    }

    let root = resource.clone();
    let worker = std::thread::Builder::new()
        .name("script-interpreter".to_owned())
        .stack_size(INTERPRETER_STACK)
        .spawn(move || {
            let mut interp = Interpreter::new()
                .with_debugger(debugger)
                .with_base_dir(base_dir);
            let id = interp.next_script_id();
            let result = interp.run(Script::from_resource(id, root, source));
            (result, interp.output().to_vec())
        })
        .context("failed to spawn interpreter thread")?;

    let mode = ResumeMode::from(cli.on_stop);
    let mut handled = 0usize;
    let mut last_stop: Option<Arc<DebugStackFrame>> = None;
    for signal in stops {
        let thread = match signal {
            Signal::Stopped(thread) => thread,
            Signal::Ended => break,
        };
        // Script loads are resumed by the session itself.
        if !session.can_resume(thread)
            || session.suspend_reason(thread)? == Some(SuspendReason::ScriptLoaded)
        {
            continue;
        }
        let frames = session.stack_frames(thread)?;
        if let (Some(top), Some(last)) = (frames.first(), last_stop.as_ref()) {
            if Arc::ptr_eq(top, last) {
                continue;
            }
        }
        last_stop = frames.first().cloned();
        print_stop(thread, session.suspend_reason(thread)?, &frames);

        handled += 1;
        let result = if handled >= cli.max_stops {
            session.terminate()
        } else {
            session.resume(thread, mode)
        };
        match result {
            Ok(()) | Err(DebugError::InvalidTransition { .. }) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let (result, output) = worker
        .join()
        .map_err(|_| anyhow::anyhow!("interpreter thread panicked"))?;
    for line in output {
        println!("{}", serde_json::json!({ "output": line }));
    }
    let uptime_ms = session
        .engine_uptime()
        .map(|uptime| uptime.as_millis() as u64);
    let exit = session.join();
    tracing::debug!(target: "script_debug.cli", ?exit, ?uptime_ms, "session finished");

    match result {
        Ok(()) | Err(InterpError::Debug(DebugError::Terminated)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn print_stop(thread: ThreadId, reason: Option<SuspendReason>, frames: &[Arc<DebugStackFrame>]) {
    let frames: Vec<_> = frames
        .iter()
        .map(|frame| {
            let variables: Vec<_> = frame
                .variables()
                .into_iter()
                .map(|variable| {
                    serde_json::json!({
                        "name": variable.name,
                        "value": variable.value_string(),
                    })
                })
                .collect();
            serde_json::json!({
                "name": frame.name(),
                "script": frame.script().title(),
                "line": frame.line(),
                "variables": variables,
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::json!({
            "event": "stopped",
            "thread": thread,
            "reason": reason,
            "frames": frames,
        })
    );
}

fn parse_breakpoint(spec: &str, root: &str) -> anyhow::Result<Breakpoint> {
    let (resource, line) = match spec.rsplit_once(':') {
        Some((resource, line)) => (resource, line),
        None => (root, spec),
    };
    let line: u32 = line
        .trim()
        .parse()
        .with_context(|| format!("invalid breakpoint line in `{spec}`"))?;
    Ok(Breakpoint::new(resource, line))
}

fn load_config(cli_path: Option<PathBuf>) -> DebugConfig {
    let path = cli_path.or_else(|| std::env::var_os("SCRIPT_DEBUG_CONFIG").map(PathBuf::from));
    let Some(path) = path else {
        return DebugConfig::default();
    };

    match DebugConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "script-debug: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            DebugConfig::default()
        }
    }
}
