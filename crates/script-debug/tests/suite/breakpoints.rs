use script_debug::{Breakpoint, DebuggerConfig, FrameKind, ResumeMode, ScriptId, SuspendReason};

use super::support::{start_engine, suspend_on_startup};

#[test]
fn breakpoint_set_before_the_run_is_hit() {
    let engine = start_engine(DebuggerConfig::default());
    engine
        .session
        .add_breakpoint(Breakpoint::new("main.script", 3))
        .unwrap();
    let run = engine.run("let a = 1\nlet b = [1, 2]\nprint a", &[]);
    let mut controller = engine.controller();

    let stop = controller.next_stop().unwrap();
    assert_eq!(stop.reason, SuspendReason::Breakpoint);
    assert_eq!(stop.line(), 3);

    let variables: Vec<_> = stop.frames[0]
        .variables()
        .into_iter()
        .map(|variable| (variable.name.clone(), variable.value_string()))
        .collect();
    assert_eq!(
        variables,
        vec![
            ("a".to_owned(), "1 (int)".to_owned()),
            ("b".to_owned(), "list[2]".to_owned()),
        ]
    );

    engine.session.resume(stop.thread, ResumeMode::Resume).unwrap();
    assert!(controller.next_stop().is_none());
    let (result, output) = run.join().unwrap();
    result.unwrap();
    assert_eq!(output, vec!["1".to_owned()]);
}

#[test]
fn breakpoints_change_while_the_script_is_loaded() {
    let engine = start_engine(DebuggerConfig::default());
    let session = &engine.session;
    session.add_breakpoint(Breakpoint::new("main.script", 1)).unwrap();
    let run = engine.run("let a = 1\nlet b = 2\nlet c = 3\nlet d = 4", &[]);
    let mut controller = engine.controller();

    let first = controller.next_stop().unwrap();
    assert_eq!(first.line(), 1);

    session.add_breakpoint(Breakpoint::new("main.script", 3)).unwrap();
    session.add_breakpoint(Breakpoint::new("main.script", 4)).unwrap();
    session
        .remove_breakpoint(&Breakpoint::new("main.script", 4))
        .unwrap();
    assert_eq!(session.breakpoints().len(), 2);
    session.resume(first.thread, ResumeMode::Resume).unwrap();

    let second = controller.next_stop().unwrap();
    assert_eq!(second.reason, SuspendReason::Breakpoint);
    assert_eq!(second.line(), 3);
    assert_eq!(
        engine.debugger.breakpoints(ScriptId::new(1)),
        vec![
            Breakpoint::new("main.script", 1),
            Breakpoint::new("main.script", 3),
        ]
    );

    session.resume(second.thread, ResumeMode::Resume).unwrap();
    assert!(controller.next_stop().is_none());
    run.join().unwrap().0.unwrap();
}

#[test]
fn disabled_breakpoints_do_not_stop() {
    let engine = start_engine(DebuggerConfig::default());
    engine
        .session
        .add_breakpoint(Breakpoint::new("main.script", 1).disabled())
        .unwrap();
    let run = engine.run("let a = 1\nprint a", &[]);

    assert!(engine.controller().next_stop().is_none());
    run.join().unwrap().0.unwrap();
}

#[test]
fn breakpoint_in_an_included_script() {
    let engine = start_engine(DebuggerConfig::default());
    engine
        .session
        .add_breakpoint(Breakpoint::new("lib.script", 2))
        .unwrap();
    let run = engine.run(
        "let a = 1\ninclude lib.script\nprint a + b",
        &[("lib.script", "let b = 2\nlet c = 3")],
    );
    let mut controller = engine.controller();

    let stop = controller.next_stop().unwrap();
    assert_eq!(stop.reason, SuspendReason::Breakpoint);
    assert_eq!(stop.frames.len(), 2);
    assert_eq!(stop.frames[0].script().title(), "lib.script");
    assert_eq!(stop.frames[0].frame().kind(), FrameKind::Include);
    assert_eq!(stop.frames[0].line(), 2);
    assert_eq!(stop.frames[1].line(), 2);

    engine.session.resume(stop.thread, ResumeMode::Resume).unwrap();
    assert!(controller.next_stop().is_none());
    let (result, output) = run.join().unwrap();
    result.unwrap();
    assert_eq!(output, vec!["3".to_owned()]);
}

fn step_into_everything(config: DebuggerConfig) -> Vec<(u32, bool)> {
    let engine = start_engine(config);
    let run = engine.run("eval let y = 2\nprint y", &[]);
    let mut controller = engine.controller();

    let mut stops = Vec::new();
    while let Some(stop) = controller.next_stop() {
        stops.push((stop.line(), stop.frames[0].frame().is_dynamic()));
        engine.session.step_into(stop.thread).unwrap();
    }
    let (result, output) = run.join().unwrap();
    result.unwrap();
    assert_eq!(output, vec!["2".to_owned()]);
    stops
}

#[test]
fn dynamic_code_is_skipped_by_default() {
    assert_eq!(
        step_into_everything(suspend_on_startup()),
        vec![(1, false), (2, false)]
    );
}

#[test]
fn dynamic_code_is_stepped_through_when_shown() {
    let config = DebuggerConfig {
        show_dynamic_code: true,
        ..suspend_on_startup()
    };
    assert_eq!(
        step_into_everything(config),
        vec![(1, false), (1, true), (2, false)]
    );
}
