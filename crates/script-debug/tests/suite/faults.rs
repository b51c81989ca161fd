use script_debug::interp::InterpError;
use script_debug::{
    Breakpoint, DebugError, DebuggerConfig, DispatchExit, ScriptId, SessionFault, TargetState,
    ThreadState,
};

use super::support::{script, start_engine, suspend_on_startup, Seen, Setup, T1};

#[test]
fn panicking_command_handler_faults_the_session() {
    let fx = Setup {
        handler_panics_on: Some("setBreakpoint"),
        ..Setup::default()
    }
    .start();
    fx.engine_started();
    fx.running_thread(T1, &script(1, "main.script", "a"));

    fx.session
        .set_breakpoint(ScriptId::new(1), Breakpoint::new("main.script", 1))
        .unwrap();

    let fault = SessionFault {
        event: "setBreakpoint".to_owned(),
        message: "handler failed on setBreakpoint".to_owned(),
    };
    assert_eq!(fx.session.join(), Some(DispatchExit::Faulted(fault.clone())));

    let seen = fx.events.until(&Seen::Terminated(Some(fault.clone())));
    assert!(seen.contains(&Seen::State(T1, ThreadState::Terminated)));
    assert_eq!(fx.session.state(), TargetState::Terminated);
    assert_eq!(fx.session.fault(), Some(fault));
    assert!(fx.log.is_closed());

    assert_eq!(fx.notifier.notify_engine_terminated(), Err(DebugError::Closed));
    assert_eq!(
        fx.session
            .set_breakpoint(ScriptId::new(1), Breakpoint::new("main.script", 2)),
        Err(DebugError::Closed)
    );
}

#[test]
fn panicking_listener_faults_the_session() {
    let fx = Setup {
        listener_panics_on_thread: true,
        ..Setup::default()
    }
    .start();
    fx.engine_started();
    fx.script_ready(T1, &script(1, "main.script", "a"), true);

    let Some(DispatchExit::Faulted(fault)) = fx.session.join() else {
        panic!("session should have faulted");
    };
    assert_eq!(fault.event, "scriptReady");
    assert_eq!(fault.message, "listener rejected thread #1");

    // Teardown callbacks still reach the listener.
    let seen = fx.events.until(&Seen::Terminated(Some(fault)));
    assert!(!seen.contains(&Seen::ThreadCreated(T1)));
    assert_eq!(fx.session.thread_state(T1), Ok(ThreadState::Terminated));
    assert!(fx.commands.drain().is_empty());
}

#[test]
fn cancel_releases_a_paused_interpreter() {
    let engine = start_engine(suspend_on_startup());
    let run = engine.run("let a = 1\nprint a", &[]);

    let stop = engine.controller().next_stop().expect("stop on first line");
    assert_eq!(stop.line(), 1);

    engine.session.cancel();
    let (result, output) = run.join().unwrap();
    assert!(matches!(result, Err(InterpError::Debug(DebugError::Terminated))));
    assert!(output.is_empty());
    assert_eq!(engine.session.join(), Some(DispatchExit::Cancelled));
    assert!(engine.debugger.is_terminated());
}

#[test]
fn terminate_stops_a_paused_interpreter() {
    let engine = start_engine(suspend_on_startup());
    let run = engine.run("let a = 1\nprint a", &[]);

    let stop = engine.controller().next_stop().expect("stop on first line");
    engine.session.terminate().unwrap();

    let (result, output) = run.join().unwrap();
    assert!(matches!(result, Err(InterpError::Debug(DebugError::Terminated))));
    assert!(output.is_empty());
    assert_eq!(engine.session.join(), Some(DispatchExit::EngineTerminated));
    assert_eq!(engine.session.thread_state(stop.thread), Ok(ThreadState::Terminated));
}

#[test]
fn slow_handlers_do_not_disturb_dispatch() {
    let config = DebuggerConfig {
        slow_handler_warn_ms: 1,
        ..DebuggerConfig::default()
    };
    let engine = start_engine(config);
    let run = engine.run("let a = 1\nprint a + 1", &[]);

    let (result, output) = run.join().unwrap();
    result.unwrap();
    assert_eq!(output, vec!["2".to_owned()]);
    assert_eq!(engine.session.join(), Some(DispatchExit::EngineTerminated));
}
