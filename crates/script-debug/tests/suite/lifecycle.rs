use script_debug::{
    ControlCommand, DebugError, DispatchExit, ResumeMode, SuspendReason, TargetState, ThreadState,
    ThreadSummary,
};

use super::support::{frame, script, start, Seen, T1, T2};

#[test]
fn reports_before_engine_start_are_rejected() {
    let fx = start();
    let main = script(1, "main.script", "a");

    assert_eq!(
        fx.notifier
            .notify_suspended(T1, vec![frame(&main, 1)], SuspendReason::Breakpoint),
        Err(DebugError::NotStarted)
    );
    assert_eq!(fx.session.state(), TargetState::NotStarted);
    assert!(fx.events.is_quiet());
}

#[test]
fn lifecycle_only_moves_forward() {
    let fx = start();
    assert_eq!(fx.session.state(), TargetState::NotStarted);
    assert_eq!(fx.session.engine_uptime(), None);

    fx.engine_started();
    assert_eq!(fx.session.state(), TargetState::Running);
    let started = fx.session.engine_uptime().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(fx.session.engine_uptime().unwrap() > started);

    fx.notifier.notify_engine_terminated().unwrap();
    assert_eq!(fx.events.next(), Seen::Terminated(None));
    assert_eq!(fx.session.state(), TargetState::Terminated);
    assert_eq!(fx.session.join(), Some(DispatchExit::EngineTerminated));

    assert!(matches!(
        fx.notifier.notify_engine_started(),
        Err(DebugError::Terminated | DebugError::Closed)
    ));
    assert_eq!(fx.session.state(), TargetState::Terminated);
    assert!(fx.log.is_closed());
}

#[test]
fn engine_end_cascades_to_threads() {
    let fx = start();
    fx.engine_started();
    fx.running_thread(T1, &script(1, "main.script", "a"));
    fx.running_thread(T2, &script(2, "worker.script", "a"));
    fx.events.until(&Seen::State(T2, ThreadState::Resumed));

    fx.notifier.notify_engine_terminated().unwrap();
    assert_eq!(
        fx.events.until(&Seen::Terminated(None)),
        vec![
            Seen::State(T1, ThreadState::Terminated),
            Seen::State(T2, ThreadState::Terminated),
            Seen::Terminated(None),
        ]
    );
    assert_eq!(
        fx.session.threads(),
        vec![
            ThreadSummary {
                id: T1,
                name: "Thread #1".to_owned(),
                state: ThreadState::Terminated,
            },
            ThreadSummary {
                id: T2,
                name: "Thread #2".to_owned(),
                state: ThreadState::Terminated,
            },
        ]
    );
}

#[test]
fn repeated_termination_reports_once() {
    let fx = start();
    fx.engine_started();

    fx.session.terminate().unwrap();
    fx.session.terminate().unwrap();
    assert_eq!(fx.commands.next(), ControlCommand::Terminate);
    assert!(fx.commands.is_quiet());
    // Termination completes only when the engine says so.
    assert_eq!(fx.session.state(), TargetState::Running);

    fx.notifier.notify_engine_terminated().unwrap();
    // The second report races the dispatcher shutting down.
    let _ = fx.notifier.notify_engine_terminated();

    assert_eq!(fx.events.next(), Seen::Terminated(None));
    assert_eq!(fx.session.join(), Some(DispatchExit::EngineTerminated));
    assert!(fx.events.drain().is_empty());
    assert_eq!(fx.session.terminate(), Ok(()));
}

#[test]
fn refused_termination_can_be_requested_again() {
    let fx = start();
    fx.engine_started();
    fx.session.cancel();
    assert_eq!(fx.session.join(), Some(DispatchExit::Cancelled));

    // Each attempt reaches the closed queue instead of being swallowed as a repeat.
    assert_eq!(fx.session.terminate(), Err(DebugError::Closed));
    assert_eq!(fx.session.terminate(), Err(DebugError::Closed));
    assert_eq!(fx.session.state(), TargetState::Running);
}

#[test]
fn frames_keep_the_source_seen_at_load() {
    let fx = start();
    fx.engine_started();

    let mut main = script(1, "main.script", "let a = 1\nlet b = 2");
    fx.script_ready(T1, &main, true);
    main.set_source("print 3");
    fx.commands.next();

    let frames = fx.session.stack_frames(T1).unwrap();
    assert_eq!(frames[0].script().source(), "let a = 1\nlet b = 2");
    assert_eq!(frames[0].script().line(2), Some("let b = 2"));
    assert_eq!(frames[0].line(), 0);
}

#[test]
fn control_side_validates_resume_requests() {
    let fx = start();
    fx.engine_started();

    assert_eq!(
        fx.session.resume(T1, ResumeMode::Resume),
        Err(DebugError::UnknownThread(T1))
    );

    fx.running_thread(T1, &script(1, "main.script", "a"));
    assert_eq!(
        fx.session.step_into(T1),
        Err(DebugError::InvalidTransition {
            thread: T1,
            state: ThreadState::Resumed,
            action: "resume",
        })
    );
    assert!(!fx.session.can_resume(T1));
    assert_eq!(fx.session.resume_all(), Ok(0));

    fx.notifier.notify_engine_terminated().unwrap();
    fx.session.join();
    assert_eq!(
        fx.session.resume(T1, ResumeMode::Resume),
        Err(DebugError::Terminated)
    );
    assert_eq!(fx.session.thread_state(T2), Err(DebugError::UnknownThread(T2)));
}

#[test]
fn resume_all_targets_every_suspended_thread() {
    let fx = start();
    fx.engine_started();
    let main = script(1, "main.script", "a\nb");
    let worker = script(2, "worker.script", "a\nb");
    fx.running_thread(T1, &main);
    fx.running_thread(T2, &worker);

    fx.notifier
        .notify_suspended(T1, vec![frame(&main, 2)], SuspendReason::Breakpoint)
        .unwrap();
    fx.notifier
        .notify_suspended(T2, vec![frame(&worker, 1)], SuspendReason::ClientRequest)
        .unwrap();
    while !fx.session.can_resume(T2) {
        fx.events.until(&Seen::State(T2, ThreadState::Suspended));
    }

    assert_eq!(fx.session.resume_all(), Ok(2));
    let mut resumed = vec![fx.commands.next(), fx.commands.next()];
    resumed.sort_by_key(|command| match command {
        ControlCommand::Resume { thread, .. } => thread.as_u64(),
        _ => u64::MAX,
    });
    assert_eq!(
        resumed,
        vec![
            ControlCommand::Resume {
                thread: T1,
                mode: ResumeMode::ClientRequest
            },
            ControlCommand::Resume {
                thread: T2,
                mode: ResumeMode::ClientRequest
            },
        ]
    );
    assert_eq!(fx.session.thread_state(T1), Ok(ThreadState::Resumed));
}
