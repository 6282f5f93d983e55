use tokio::sync::mpsc;

use super::Session;
use crate::correlator::Resolution;
use crate::event::{MessageChannel, RunState, SessionEvent, StopReason, StoppedEvent};
use crate::mi::{
    classify, is_flushable_partial, AsyncKind, AsyncRecord, LineBuffer, OutputLine, Record,
    ResultClass, StreamKind,
};
use crate::poison::lock;
use crate::transport::TransportEvent;

pub(super) async fn read_loop(session: Session, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    let mut stdout = LineBuffer::new();
    let mut stderr = LineBuffer::new();
    let mut exit_code = None;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Stdout(chunk) => {
                for line in stdout.push(&chunk) {
                    session.handle_line(&line);
                }
                if let Some(partial) = stdout.take_partial_if(is_flushable_partial) {
                    session.emit(SessionEvent::message(MessageChannel::Stdout, partial));
                }
            }
            TransportEvent::Stderr(chunk) => {
                for line in stderr.push(&chunk) {
                    session.emit_line(MessageChannel::Stderr, &line);
                }
                if let Some(partial) = stderr.take_partial_if(|_| true) {
                    session.emit(SessionEvent::message(MessageChannel::Stderr, partial));
                }
            }
            TransportEvent::LaunchFailed(message) => {
                tracing::warn!(target: "nova.gdbmi", %message, "debugger failed to launch");
                session.emit(SessionEvent::LaunchError { message });
            }
            TransportEvent::Exited(code) => {
                exit_code = code;
                break;
            }
        }
    }

    if let Some(rest) = stdout.take_all() {
        session.handle_line(&rest);
    }
    if let Some(rest) = stderr.take_all() {
        session.emit(SessionEvent::message(MessageChannel::Stderr, rest));
    }

    tracing::debug!(target: "nova.gdbmi", ?exit_code, "debugger session ended");
    session.mark_closed().await;
    session.on_quit();
}

fn parse_u32(text: Option<&str>) -> Option<u32> {
    text.and_then(|t| t.trim().parse().ok())
}

/// GDB prints `exit-code` in octal with a leading zero (`"01"`).
fn parse_exit_code(text: &str) -> Option<i32> {
    match text.strip_prefix('0') {
        Some(octal) if !octal.is_empty() => i32::from_str_radix(octal, 8).ok(),
        _ => text.parse().ok(),
    }
}

impl Session {
    fn handle_line(&self, line: &str) {
        match classify(line) {
            OutputLine::Passthrough(text) => self.emit_line(MessageChannel::Stdout, &text),
            OutputLine::Prompt => {}
            OutputLine::Record(record) => {
                tracing::trace!(target: "nova.gdbmi", "<- {line}");
                self.handle_record(record, line);
            }
        }
    }

    fn handle_record(&self, record: Record, line: &str) {
        match record {
            Record::Result(result) => {
                let resolution = lock(&self.inner.correlator, "handle_record").resolve(result);
                match resolution {
                    Resolution::Completed => {}
                    Resolution::SuppressedFailure { command, message } => {
                        tracing::warn!(target: "nova.gdbmi", %command, %message, "suppressed command failure");
                        self.emit_line(
                            MessageChannel::Stderr,
                            &format!("WARNING: Error executing command '{command}'"),
                        );
                    }
                    Resolution::Unmatched(result) => {
                        let message = result.error_message().map(str::to_string);
                        if result.class == ResultClass::Error {
                            self.emit_line(MessageChannel::Stderr, message.as_deref().unwrap_or(line));
                        }
                        tracing::debug!(target: "nova.gdbmi", token = ?result.token, class = result.class.as_str(), "unexpected result record");
                        self.emit(SessionEvent::UnexpectedResult {
                            token: result.token,
                            class: result.class.as_str().to_string(),
                            message,
                        });
                    }
                }
            }
            Record::Stream(stream) => {
                let channel = match stream.kind {
                    StreamKind::Console => MessageChannel::Console,
                    StreamKind::Target => MessageChannel::Target,
                    StreamKind::Log => MessageChannel::Log,
                };
                self.emit_line(channel, &stream.text);
                if stream.kind == StreamKind::Console {
                    let formatted = self.lock_state("logpoint").logpoints.on_console(&stream.text);
                    if let Some(message) = formatted {
                        self.emit_line(MessageChannel::Console, &message);
                    }
                }
            }
            Record::Async(record) => self.handle_async(record),
            Record::Unhandled(text) => {
                tracing::warn!(target: "nova.gdbmi", line = %text, "unparseable MI record");
            }
        }
    }

    fn handle_async(&self, record: AsyncRecord) {
        match (record.kind, record.class.as_str()) {
            (AsyncKind::Exec, "running") => {
                self.set_run_state(RunState::Running);
                self.emit(SessionEvent::Running {
                    thread_id: record.field("thread-id").map(str::to_string),
                });
            }
            (AsyncKind::Exec, "stopped") => self.handle_stopped(&record),
            (AsyncKind::Exec, class) => {
                tracing::debug!(target: "nova.gdbmi", class, "ignoring exec async record");
            }
            (AsyncKind::Notify, "thread-created") => {
                if let Some(id) = parse_u32(record.field("id")) {
                    self.emit(SessionEvent::ThreadCreated { id });
                }
            }
            (AsyncKind::Notify, "thread-exited") => {
                if let Some(id) = parse_u32(record.field("id")) {
                    self.emit(SessionEvent::ThreadExited { id });
                }
            }
            (kind, class) => {
                tracing::trace!(target: "nova.gdbmi", ?kind, class, "async record");
            }
        }
    }

    fn handle_stopped(&self, record: &AsyncRecord) {
        let reason = record.field("reason");
        let stopped = |kind: StopReason| StoppedEvent {
            reason: kind,
            thread_id: parse_u32(record.field("thread-id")),
            all_threads_stopped: record.field("stopped-threads") == Some("all"),
            breakpoint_id: None,
            signal_name: None,
            raw_reason: reason.map(str::to_string),
        };

        match reason {
            Some("breakpoint-hit") => {
                let breakpoint_id = parse_u32(record.field("bkptno"));
                self.emit_stop(StoppedEvent {
                    breakpoint_id,
                    ..stopped(StopReason::Breakpoint)
                });
                if let Some(id) = breakpoint_id {
                    let message = self.lock_state("logpoint").logpoints.on_hit(id);
                    if let Some(message) = message {
                        self.emit_line(MessageChannel::Console, &message);
                    }
                }
            }
            Some("watchpoint-trigger" | "read-watchpoint-trigger" | "access-watchpoint-trigger") => {
                self.emit_stop(stopped(StopReason::Watchpoint));
            }
            Some("function-finished" | "location-reached" | "end-stepping-range") => {
                self.emit_stop(stopped(StopReason::Step));
            }
            Some(
                other @ ("watchpoint-scope" | "solib-event" | "syscall-entry" | "syscall-return"
                | "fork" | "vfork" | "exec"),
            ) => {
                tracing::debug!(target: "nova.gdbmi", reason = other, "treating stop as step end");
                self.emit_stop(stopped(StopReason::Step));
            }
            Some("signal-received") => {
                self.emit_stop(StoppedEvent {
                    signal_name: record.field("signal-name").map(str::to_string),
                    ..stopped(StopReason::Signal)
                });
            }
            Some("exited-normally") => self.exited(Some(0)),
            Some("exited") => {
                let code = record.field("exit-code").unwrap_or_default();
                self.emit_line(
                    MessageChannel::Stderr,
                    &format!("Program exited with code {code}"),
                );
                self.exited(parse_exit_code(code));
            }
            Some(other) => {
                tracing::warn!(target: "nova.gdbmi", reason = other, "unknown stop reason");
                self.emit_line(
                    MessageChannel::Console,
                    &format!("Not implemented stop reason (assuming exception): {other}"),
                );
                self.exception(stopped(StopReason::Exception));
            }
            None => self.exception(stopped(StopReason::Exception)),
        }
    }

    fn set_run_state(&self, next: RunState) {
        let mut state = self.lock_state("run_state");
        if state.run_state != RunState::Terminated {
            state.run_state = next;
        }
    }

    fn emit_stop(&self, event: StoppedEvent) {
        self.set_run_state(RunState::Stopped);
        self.emit(SessionEvent::Stopped(event));
    }

    fn exception(&self, event: StoppedEvent) {
        let quit = {
            let mut state = self.lock_state("exception");
            if !state.started {
                state.crashed = true;
            }
            if state.run_state != RunState::Terminated {
                state.run_state = RunState::Stopped;
            }
            state.quit
        };
        if !quit {
            self.emit(SessionEvent::Stopped(event));
        }
    }

    fn exited(&self, exit_code: Option<i32>) {
        {
            let mut state = self.lock_state("exited");
            state.quit = true;
            state.run_state = RunState::Terminated;
        }
        self.emit(SessionEvent::Exited { exit_code });
    }

    /// Emit `Quit` the first time the debugger goes away.
    pub(super) fn on_quit(&self) {
        let first = {
            let mut state = self.lock_state("quit");
            state.quit = true;
            state.run_state = RunState::Terminated;
            !std::mem::replace(&mut state.quit_emitted, true)
        };
        if first {
            self.emit(SessionEvent::Quit);
        }
    }
}
