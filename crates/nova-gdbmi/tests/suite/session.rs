use std::collections::BTreeMap;
use std::path::PathBuf;

use nova_gdbmi::config::SetupCommand;
use nova_gdbmi::mock::MockDebugger;
use nova_gdbmi::{
    LoadArgs, MessageChannel, MiError, RunState, Session, SessionEvent, StopReason, StoppedEvent,
};

use crate::harness::{
    drain, load_args, loaded, next_message, responder, test_config, wait_for, wait_until,
};

fn command_texts(mock: &MockDebugger) -> Vec<String> {
    mock.commands().into_iter().map(|c| c.command).collect()
}

#[tokio::test]
async fn bring_up_pipelines_setup_and_reports_ready() {
    let h = loaded(|_| None).await;

    assert_eq!(
        command_texts(&h.mock),
        vec![
            "gdb-set target-async on",
            "list-features",
            r#"environment-directory "/work""#,
            r#"file-exec-and-symbols "/work/app""#,
            "enable-frame-filters",
        ]
    );
    let tokens: Vec<_> = h.mock.commands().iter().map(|c| c.token).collect();
    assert_eq!(tokens, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    assert!(h.session.has_feature("exec-run-start-option"));
    assert_eq!(h.session.state(), RunState::Initializing);
}

#[tokio::test]
async fn load_sends_arguments_source_map_setup_and_autorun() {
    let mut config = test_config();
    config.debugger.source_file_map =
        BTreeMap::from([("/build".to_string(), "/src".to_string())]);
    config.debugger.setup_commands = vec![SetupCommand {
        text: "-gdb-set print pretty on".to_string(),
        ignore_failures: true,
    }];
    let (session, mut events) = Session::new(config);
    let (mock, transport) = MockDebugger::spawn(responder(|_| None));

    session
        .load_with_transport(
            transport,
            &LoadArgs {
                program_args: Some("--verbose 1".to_string()),
                tty: Some("/dev/pts/3".to_string()),
                autorun: vec!["set var x=1".to_string()],
                ..load_args()
            },
        )
        .await
        .unwrap();
    wait_for(&mut events, |e| *e == SessionEvent::DebugReady).await;

    let texts = command_texts(&mock);
    assert_eq!(
        &texts[5..],
        &[
            r#"gdb-set substitute-path "/build" "/src""#,
            "gdb-set print pretty on",
            "exec-arguments --verbose 1",
            "inferior-tty-set /dev/pts/3",
            r#"interpreter-exec console "set var x=1""#,
        ]
    );
}

#[tokio::test]
async fn suppressed_bring_up_failure_only_warns() {
    let (session, mut events) = Session::new(test_config());
    let (_mock, transport) = MockDebugger::spawn(responder(|command| {
        (command.name() == "environment-directory")
            .then(|| vec![command.error("No such directory.")])
    }));

    session
        .load_with_transport(transport, &load_args())
        .await
        .unwrap();
    assert_eq!(
        next_message(&mut events, MessageChannel::Stderr).await,
        "WARNING: Error executing command 'environment-directory \"/work\"'\n"
    );
    wait_for(&mut events, |e| *e == SessionEvent::DebugReady).await;
}

#[tokio::test]
async fn failing_bring_up_command_rejects_load() {
    let (session, mut events) = Session::new(test_config());
    let (_mock, transport) = MockDebugger::spawn(responder(|command| {
        (command.name() == "file-exec-and-symbols")
            .then(|| vec![command.error("/work/app: No such file or directory.")])
    }));

    let err = session
        .load_with_transport(transport, &load_args())
        .await
        .unwrap_err();
    assert_eq!(err.message(), "/work/app: No such file or directory.");
    assert_eq!(
        err.command(),
        Some(r#"file-exec-and-symbols "/work/app""#)
    );
    assert!(!drain(&mut events).contains(&SessionEvent::DebugReady));
}

#[tokio::test]
async fn missing_debugger_reports_launch_error_then_quit() {
    let mut config = test_config();
    config.debugger.path = Some(PathBuf::from("/nonexistent/nova-gdbmi-test-gdb"));
    let (session, mut events) = Session::new(config);

    let err = session.load(&load_args()).await.unwrap_err();
    assert!(matches!(err, MiError::Launch(_)), "{err:?}");
    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::LaunchError { .. })
    ));
    assert_eq!(events.recv().await, Some(SessionEvent::Quit));
}

#[tokio::test]
async fn debugger_exit_fails_pending_commands_and_quits_once() {
    let mut h = loaded(|command| (command.name() == "exec-continue").then(Vec::new)).await;

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.continue_(false).await });
    wait_until(|| !h.mock.commands_named("exec-continue").is_empty()).await;
    h.mock.exit();

    assert!(matches!(pending.await.unwrap(), Err(MiError::SessionClosed)));
    wait_for(&mut h.events, |e| *e == SessionEvent::Quit).await;
    assert!(h.session.is_closed());
    assert_eq!(h.session.state(), RunState::Terminated);
    assert!(matches!(
        h.session.send("gdb-version", false).await,
        Err(MiError::SessionClosed)
    ));
    assert!(!drain(&mut h.events).contains(&SessionEvent::Quit));
}

#[tokio::test]
async fn stop_asks_debugger_to_exit() {
    let mut h = loaded(|_| None).await;

    h.session.stop().await.unwrap();
    let exit = h.mock.commands_named("gdb-exit");
    assert_eq!(exit.len(), 1);
    assert_eq!(exit[0].token, None);
    wait_for(&mut h.events, |e| *e == SessionEvent::Quit).await;
    assert!(h.session.is_closed());
}

#[tokio::test]
async fn detach_kills_debugger_after_grace_period() {
    let mut h = loaded(|_| None).await;

    h.session.detach().await.unwrap();
    assert_eq!(h.mock.commands_named("target-detach").len(), 1);
    assert!(h.session.is_closed());
    wait_for(&mut h.events, |e| *e == SessionEvent::Quit).await;
}

#[tokio::test]
async fn unsolicited_results_are_reported() {
    let mut h = loaded(|_| None).await;

    h.mock.emit(r#"^error,msg="boom""#);
    assert_eq!(next_message(&mut h.events, MessageChannel::Stderr).await, "boom\n");
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, SessionEvent::UnexpectedResult { .. })).await,
        SessionEvent::UnexpectedResult {
            token: None,
            class: "error".to_string(),
            message: Some("boom".to_string()),
        }
    );

    h.mock.emit("99^done");
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, SessionEvent::UnexpectedResult { .. })).await,
        SessionEvent::UnexpectedResult {
            token: Some(99),
            class: "done".to_string(),
            message: None,
        }
    );
}

fn stopped(event: SessionEvent) -> StoppedEvent {
    match event {
        SessionEvent::Stopped(stopped) => stopped,
        other => panic!("expected a stop, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_records_drive_events_and_run_state() {
    let mut h = loaded(|_| None).await;

    h.mock.emit(r#"*running,thread-id="all""#);
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, SessionEvent::Running { .. })).await,
        SessionEvent::Running {
            thread_id: Some("all".to_string())
        }
    );
    assert_eq!(h.session.state(), RunState::Running);

    h.mock.emit(
        r#"*stopped,reason="end-stepping-range",frame={addr="0x401136",func="main",args=[]},thread-id="1",stopped-threads="all""#,
    );
    let stop = stopped(wait_for(&mut h.events, |e| matches!(e, SessionEvent::Stopped(_))).await);
    assert_eq!(stop.reason, StopReason::Step);
    assert_eq!(stop.thread_id, Some(1));
    assert!(stop.all_threads_stopped);
    assert_eq!(h.session.state(), RunState::Stopped);

    h.mock.emit(r#"*stopped,reason="signal-received",signal-name="SIGSEGV",thread-id="2""#);
    let stop = stopped(wait_for(&mut h.events, |e| matches!(e, SessionEvent::Stopped(_))).await);
    assert_eq!(stop.reason, StopReason::Signal);
    assert_eq!(stop.signal_name.as_deref(), Some("SIGSEGV"));
    assert!(!stop.all_threads_stopped);

    h.mock.emit(r#"*stopped,reason="exited",exit-code="01""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Stderr).await,
        "Program exited with code 01\n"
    );
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, SessionEvent::Exited { .. })).await,
        SessionEvent::Exited { exit_code: Some(1) }
    );
    assert_eq!(h.session.state(), RunState::Terminated);
}

#[tokio::test]
async fn unknown_stop_reason_is_an_exception() {
    let mut h = loaded(|_| None).await;

    h.mock.emit(r#"*stopped,reason="frobnicated",thread-id="1""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Console).await,
        "Not implemented stop reason (assuming exception): frobnicated\n"
    );
    let stop = stopped(wait_for(&mut h.events, |e| matches!(e, SessionEvent::Stopped(_))).await);
    assert_eq!(stop.reason, StopReason::Exception);
    assert_eq!(stop.raw_reason.as_deref(), Some("frobnicated"));
}

#[tokio::test]
async fn stop_before_start_is_replayed_as_pause() {
    let mut h = loaded(|_| None).await;

    h.mock.emit(r#"*stopped,thread-id="1""#);
    let stop = stopped(wait_for(&mut h.events, |e| matches!(e, SessionEvent::Stopped(_))).await);
    assert_eq!(stop.reason, StopReason::Exception);

    assert!(h.session.start(false).await.unwrap());
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Console).await,
        "Running executable\n"
    );
    let replay = stopped(wait_for(&mut h.events, |e| matches!(e, SessionEvent::Stopped(_))).await);
    assert_eq!(replay.reason, StopReason::Pause);
    assert!(replay.all_threads_stopped);
}

#[tokio::test]
async fn start_uses_run_start_option_when_advertised() {
    let h = loaded(|_| None).await;
    assert!(h.session.start(true).await.unwrap());
    assert_eq!(h.mock.commands_named("exec-run")[0].command, "exec-run --start");
}

#[tokio::test]
async fn start_falls_back_to_entry_breakpoint() {
    let h = loaded(|command| {
        (command.name() == "list-features").then(|| vec![command.done_with("features=[]")])
    })
    .await;

    assert!(h.session.start(true).await.unwrap());
    let texts = command_texts(&h.mock);
    let tail = &texts[texts.len() - 2..];
    assert_eq!(tail, &["break-insert -t -f main", "exec-run"]);
}

#[tokio::test]
async fn reverse_execution_requires_target_support() {
    let h = loaded(|command| {
        (command.name() == "list-target-features")
            .then(|| vec![command.done_with(r#"features=["async","reverse"]"#)])
    })
    .await;
    assert!(h.session.continue_(true).await.unwrap());
    assert!(h.session.step(true).await.unwrap());
    assert!(h.session.next(false).await.unwrap());
    assert_eq!(h.mock.commands_named("exec-continue")[0].command, "exec-continue --reverse");
    assert_eq!(h.mock.commands_named("exec-step")[0].command, "exec-step --reverse");
    assert_eq!(h.mock.commands_named("exec-next")[0].command, "exec-next");
    assert_eq!(h.mock.commands_named("list-target-features").len(), 1);

    let h = loaded(|command| {
        (command.name() == "list-target-features").then(|| vec![command.done_with("features=[]")])
    })
    .await;
    assert!(matches!(
        h.session.step_out(true).await,
        Err(MiError::Unsupported(_))
    ));
    assert!(h.mock.commands_named("exec-finish").is_empty());
}

#[tokio::test]
async fn interrupt_goto_and_user_input() {
    let h = loaded(|command| {
        (command.name() == "exec-jump").then(|| vec![command.running()])
    })
    .await;

    assert!(h.session.interrupt().await.unwrap());
    assert!(h.session.goto(Some("main.c"), 12).await.unwrap());
    h.session.send_user_input("bt", 1, 0).await.unwrap();
    h.session.send_user_input("-gdb-version", 1, 0).await.unwrap();
    h.session.send_mi_command("-thread-select 2", false).await.unwrap();
    h.session.change_variable("x", "4").await.unwrap();

    let texts = command_texts(&h.mock);
    assert_eq!(
        &texts[5..],
        &[
            "exec-interrupt",
            r#"break-insert -t "main.c:12""#,
            r#"exec-jump "main.c:12""#,
            r#"interpreter-exec --thread 1 --frame 0 console "bt""#,
            "gdb-version",
            "thread-select 2",
            "gdb-set var x=4",
        ]
    );
}

#[tokio::test]
async fn output_streams_map_to_channels() {
    let mut h = loaded(|_| None).await;

    h.mock.emit(r#"~"Reading symbols from app...\n""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Console).await,
        "Reading symbols from app...\n"
    );
    h.mock.emit(r#"@"target says hi""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Target).await,
        "target says hi\n"
    );
    h.mock.emit(r#"&"warning: no debugging symbols\n""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Log).await,
        "warning: no debugging symbols\n"
    );
    h.mock.emit("(gdb) ");
    h.mock.emit("hello from the program");
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Stdout).await,
        "hello from the program\n"
    );
}

#[tokio::test]
async fn thread_notifications_become_events() {
    let mut h = loaded(|_| None).await;

    h.mock.emit(r#"=thread-created,id="2",group-id="i1""#);
    h.mock.emit(r#"=thread-exited,id="2",group-id="i1""#);
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, SessionEvent::ThreadCreated { .. })).await,
        SessionEvent::ThreadCreated { id: 2 }
    );
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, SessionEvent::ThreadExited { .. })).await,
        SessionEvent::ThreadExited { id: 2 }
    );
}
