use std::sync::Arc;
use std::time::Duration;

use nova_gdbmi::mock::{MockCommand, MockDebugger, Responder};
use nova_gdbmi::{GdbMiConfig, LoadArgs, Session, SessionEvent};
use tokio::sync::mpsc::UnboundedReceiver;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub session: Session,
    pub events: UnboundedReceiver<SessionEvent>,
    pub mock: MockDebugger,
}

/// Answers the bring-up the way GDB 13 does and defers everything else to
/// `script`. Commands `script` declines get `^done`.
pub fn responder<F>(script: F) -> Responder
where
    F: Fn(&MockCommand) -> Option<Vec<String>> + Send + Sync + 'static,
{
    Arc::new(move |command: &MockCommand| {
        if let Some(lines) = script(command) {
            return lines;
        }
        match command.name() {
            "list-features" => vec![command.done_with(
                r#"features=["frozen-varobjs","pending-breakpoints","thread-info","data-read-memory-bytes","exec-run-start-option"]"#,
            )],
            "exec-run" | "exec-continue" | "exec-next" | "exec-step" | "exec-finish" => {
                vec![command.running()]
            }
            _ => vec![command.done()],
        }
    })
}

pub fn test_config() -> GdbMiConfig {
    let mut config = GdbMiConfig::default();
    config.session.quit_grace_period_ms = 200;
    config
}

/// A session that finished a `load` of `/work/app` against the mock.
pub async fn loaded<F>(script: F) -> Harness
where
    F: Fn(&MockCommand) -> Option<Vec<String>> + Send + Sync + 'static,
{
    loaded_with(test_config(), script).await
}

pub async fn loaded_with<F>(config: GdbMiConfig, script: F) -> Harness
where
    F: Fn(&MockCommand) -> Option<Vec<String>> + Send + Sync + 'static,
{
    let (session, mut events) = Session::new(config);
    let (mock, transport) = MockDebugger::spawn(responder(script));
    session
        .load_with_transport(transport, &load_args())
        .await
        .expect("bring-up succeeds");
    wait_for(&mut events, |event| *event == SessionEvent::DebugReady).await;
    Harness {
        session,
        events,
        mock,
    }
}

pub fn load_args() -> LoadArgs {
    LoadArgs {
        cwd: "/work".to_string(),
        target: "app".to_string(),
        ..LoadArgs::default()
    }
}

pub async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`.
pub async fn wait_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Text of the next message event on `channel`.
pub async fn next_message(
    events: &mut UnboundedReceiver<SessionEvent>,
    channel: nova_gdbmi::MessageChannel,
) -> String {
    match wait_for(events, |event| {
        matches!(event, SessionEvent::Message { channel: c, .. } if *c == channel)
    })
    .await
    {
        SessionEvent::Message { text, .. } => text,
        other => unreachable!("wait_for returned {other:?}"),
    }
}

/// Every event already queued, without waiting.
pub fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// The quoted `file:line` argument of a break-insert, split.
pub fn quoted_location(command: &str) -> Option<(String, u32)> {
    let start = command.find('"')? + 1;
    let end = command.rfind('"')?;
    let (file, line) = command[start..end].rsplit_once(':')?;
    Some((file.to_string(), line.parse().ok()?))
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
