use serde::Serialize;

/// Coarse execution state, driven only by records the debugger sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Running,
    Stopped,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Breakpoint,
    Watchpoint,
    Step,
    Signal,
    /// A user pause, or a stop replayed after the program stopped before it was started.
    Pause,
    /// Unknown or missing reason.
    Exception,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    /// Plain text the debugger printed outside of MI records.
    Stdout,
    Stderr,
    /// `~` console stream and engine notices.
    Console,
    /// `@` target output.
    Target,
    /// `&` debugger log stream.
    Log,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoppedEvent {
    pub reason: StopReason,
    pub thread_id: Option<u32>,
    pub all_threads_stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_name: Option<String>,
    /// The raw MI `reason`, when the debugger sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_reason: Option<String>,
}

/// Everything the engine reports to its front end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LaunchError { message: String },
    Quit,
    DebugReady,
    Running { thread_id: Option<String> },
    Stopped(StoppedEvent),
    Exited { exit_code: Option<i32> },
    ThreadCreated { id: u32 },
    ThreadExited { id: u32 },
    Message { channel: MessageChannel, text: String },
    /// A result record nobody was waiting for.
    UnexpectedResult {
        token: Option<u64>,
        class: String,
        message: Option<String>,
    },
}

impl SessionEvent {
    pub(crate) fn message(channel: MessageChannel, text: impl Into<String>) -> Self {
        Self::Message {
            channel,
            text: text.into(),
        }
    }

    /// A message terminated by a newline, like the debugger's own log lines.
    pub(crate) fn line(channel: MessageChannel, text: &str) -> Self {
        let text = if text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{text}\n")
        };
        Self::Message { channel, text }
    }
}
