use nova_gdbmi::mock::MockCommand;
use nova_gdbmi::{BreakpointDescriptor, MessageChannel, SessionEvent, StopReason};

use crate::harness::{loaded, next_message, wait_for, Harness};

async fn debugger_with_breakpoint(id: u32) -> Harness {
    loaded(move |command: &MockCommand| {
        (command.name() == "break-insert").then(|| {
            vec![command.done_with(&format!(
                r#"bkpt={{number="{id}",type="breakpoint",file="main.c",line="12"}}"#
            ))]
        })
    })
    .await
}

#[tokio::test]
async fn log_message_is_filled_from_printed_values() {
    let mut h = debugger_with_breakpoint(1).await;

    let descriptor = BreakpointDescriptor {
        log_message: Some("x={x}, y={y}".to_string()),
        ..BreakpointDescriptor::source("main.c", 12)
    };
    h.session.add_breakpoint(&descriptor).await.unwrap();
    assert_eq!(
        h.mock.commands_named("break-commands")[0].command,
        r#"break-commands 1 "print x" "print y""#
    );

    h.mock
        .emit(r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",thread-id="1",stopped-threads="all""#);
    h.mock.emit(r#"~"$1 = 3\n""#);
    h.mock.emit(r#"~"$2 = 4\n""#);

    match wait_for(&mut h.events, |e| matches!(e, SessionEvent::Stopped(_))).await {
        SessionEvent::Stopped(stop) => {
            assert_eq!(stop.reason, StopReason::Breakpoint);
            assert_eq!(stop.breakpoint_id, Some(1));
        }
        other => unreachable!("{other:?}"),
    }

    // The raw `$N = value` lines still reach the console first.
    assert_eq!(next_message(&mut h.events, MessageChannel::Console).await, "$1 = 3\n");
    assert_eq!(next_message(&mut h.events, MessageChannel::Console).await, "$2 = 4\n");
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Console).await,
        "x=3, y=4\n"
    );
}

#[tokio::test]
async fn plain_log_message_is_printed_on_hit() {
    let mut h = debugger_with_breakpoint(3).await;

    let descriptor = BreakpointDescriptor {
        log_message: Some("reached the loop".to_string()),
        ..BreakpointDescriptor::source("main.c", 12)
    };
    h.session.add_breakpoint(&descriptor).await.unwrap();
    assert!(h.mock.commands_named("break-commands").is_empty());

    h.mock.emit(r#"*stopped,reason="breakpoint-hit",bkptno="3",thread-id="1""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Console).await,
        "reached the loop\n"
    );
}

#[tokio::test]
async fn removing_breakpoint_forgets_its_template() {
    let mut h = debugger_with_breakpoint(2).await;

    let descriptor = BreakpointDescriptor {
        log_message: Some("hit".to_string()),
        ..BreakpointDescriptor::source("main.c", 12)
    };
    h.session.add_breakpoint(&descriptor).await.unwrap();
    assert!(h.session.remove_breakpoint(&descriptor).await.unwrap());

    h.mock.emit(r#"*stopped,reason="breakpoint-hit",bkptno="2",thread-id="1""#);
    h.mock.emit(r#"~"after\n""#);
    assert_eq!(
        next_message(&mut h.events, MessageChannel::Console).await,
        "after\n"
    );
}
