use script_debug::{ControlCommand, DebugError, ResumeMode, ScriptSnapshot, SuspendReason, ThreadState};

use super::support::{frame, script, start, Hold, Seen, Setup, T1, T2};

#[test]
fn pending_script_load_blocks_further_reports_for_that_thread() {
    let hold = Hold::default();
    let fx = Setup {
        hold: Some(hold.clone()),
        ..Setup::default()
    }
    .start();
    fx.engine_started();
    hold.entered.wait();

    let main = script(1, "main.script", "a\nb");
    fx.script_ready(T1, &main, true);

    assert_eq!(
        fx.notifier.notify_stack_frames(T1, vec![frame(&main, 1)]),
        Err(DebugError::PauseInFlight(T1))
    );
    assert_eq!(
        fx.notifier.notify_resumed(T1, ResumeMode::Resume),
        Err(DebugError::PauseInFlight(T1))
    );
    assert_eq!(
        fx.notifier
            .notify_script_ready(T1, ScriptSnapshot::capture(&main), false),
        Err(DebugError::PauseInFlight(T1))
    );

    // Other threads are unaffected.
    fx.script_ready(T2, &script(2, "worker.script", "a"), true);

    hold.release.open();
    assert_eq!(
        fx.commands.next(),
        ControlCommand::Resume {
            thread: T1,
            mode: ResumeMode::Resume
        }
    );
    assert_eq!(
        fx.commands.next(),
        ControlCommand::Resume {
            thread: T2,
            mode: ResumeMode::Resume
        }
    );

    // The pause is released before the handler sees the resume.
    fx.notifier
        .notify_stack_frames(T1, vec![frame(&main, 2)])
        .unwrap();
    let frames = loop {
        fx.events.until(&Seen::Frames(T1));
        let frames = fx.session.stack_frames(T1).unwrap();
        if frames[0].line() == 2 {
            break frames;
        }
    };
    assert_eq!(frames.len(), 1);
}

#[test]
fn suspend_is_released_by_a_control_side_resume() {
    let fx = start();
    fx.engine_started();
    let main = script(1, "main.script", "a\nb\nc");
    fx.running_thread(T1, &main);
    fx.events.until(&Seen::State(T1, ThreadState::Resumed));

    fx.notifier
        .notify_suspended(T1, vec![frame(&main, 2)], SuspendReason::Breakpoint)
        .unwrap();
    fx.events.until(&Seen::State(T1, ThreadState::Suspended));
    assert!(fx.session.can_step_over(T1));
    assert_eq!(
        fx.notifier.notify_stack_frames(T1, vec![frame(&main, 3)]),
        Err(DebugError::PauseInFlight(T1))
    );

    fx.session.step_over(T1).unwrap();
    assert_eq!(
        fx.commands.next(),
        ControlCommand::Resume {
            thread: T1,
            mode: ResumeMode::StepOver
        }
    );
    assert_eq!(fx.session.thread_state(T1), Ok(ThreadState::Stepping));
    assert!(!fx.session.can_step_over(T1));

    fx.notifier.notify_resumed(T1, ResumeMode::StepOver).unwrap();
    fx.notifier
        .notify_suspended(T1, vec![frame(&main, 3)], SuspendReason::StepEnd)
        .unwrap();
    fx.events.until(&Seen::State(T1, ThreadState::Suspended));
    assert_eq!(fx.session.stack_frames(T1).unwrap()[0].line(), 3);
}

#[test]
fn terminate_releases_every_pending_pause() {
    let hold = Hold::default();
    let fx = Setup {
        hold: Some(hold.clone()),
        ..Setup::default()
    }
    .start();
    fx.engine_started();
    hold.entered.wait();

    fx.script_ready(T1, &script(1, "main.script", "a"), true);
    fx.session.terminate().unwrap();
    hold.release.open();

    // The resume follow-up lands behind the terminate, so the terminate
    // is the command that frees the thread.
    assert_eq!(fx.commands.next(), ControlCommand::Terminate);
    fx.notifier
        .notify_resumed(T1, ResumeMode::ClientRequest)
        .unwrap();
}

#[test]
fn reports_from_an_unannounced_thread_are_refused() {
    let fx = start();
    fx.engine_started();
    let worker = script(2, "worker.script", "a\nb");

    assert_eq!(
        fx.notifier
            .notify_suspended(T2, vec![frame(&worker, 1)], SuspendReason::Breakpoint),
        Err(DebugError::UnknownThread(T2))
    );
    assert_eq!(
        fx.notifier.notify_resumed(T2, ResumeMode::Resume),
        Err(DebugError::UnknownThread(T2))
    );
    assert_eq!(
        fx.notifier.notify_stack_frames(T2, vec![frame(&worker, 1)]),
        Err(DebugError::UnknownThread(T2))
    );
    assert!(fx.events.is_quiet());

    // Nothing was recorded for the thread, so it can still announce itself.
    assert_eq!(fx.running_thread(T2, &worker), ThreadState::Resumed);
    fx.notifier
        .notify_suspended(T2, vec![frame(&worker, 2)], SuspendReason::Breakpoint)
        .unwrap();
    fx.events.until(&Seen::State(T2, ThreadState::Suspended));
}
