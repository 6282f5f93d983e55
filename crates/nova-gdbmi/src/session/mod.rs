//! The MI session: one debugger process, its command correlator and the
//! state derived from what it reports.
//!
//! A [`Session`] is a cheap handle (`Arc` inside) and may be cloned into
//! concurrent tasks. Outbound commands are written as soon as they are issued;
//! a single read loop task consumes debugger output in arrival order, resolves
//! pending commands and turns async records into [`SessionEvent`]s.

mod bring_up;
mod control;
mod dispatch;
mod inspect;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::breakpoints::BreakpointTable;
use crate::config::GdbMiConfig;
use crate::correlator::{encode_command, Correlator, ReplyReceiver};
use crate::error::{MiError, Result};
use crate::event::{MessageChannel, RunState, SessionEvent};
use crate::logpoint::LogPoints;
use crate::mi::ResultRecord;
use crate::poison::lock;
use crate::transport::{BoxedWriter, KillHandle, Transport};
use crate::varobj::VariableRegistry;

pub use bring_up::{join_target, AttachArgs, ConnectArgs, LoadArgs, SshLaunch};
pub use inspect::{Register, Scope, StackVariable, Variable};

/// Session-owned tables. Only the session itself mutates these, from
/// records it parsed or commands it issued.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) run_state: RunState,
    pub(crate) started: bool,
    /// Stopped before `start()`; replayed as a pause once the run starts.
    pub(crate) crashed: bool,
    /// The program exited or the debugger went away.
    pub(crate) quit: bool,
    pub(crate) quit_emitted: bool,
    pub(crate) features: Vec<String>,
    pub(crate) target_features: Option<Vec<String>>,
    pub(crate) register_names: Option<Vec<String>>,
    pub(crate) breakpoints: BreakpointTable,
    pub(crate) logpoints: LogPoints,
    pub(crate) variables: VariableRegistry,
}

impl Default for State {
    fn default() -> Self {
        Self {
            run_state: RunState::Initializing,
            started: false,
            crashed: false,
            quit: false,
            quit_emitted: false,
            features: Vec::new(),
            target_features: None,
            register_names: None,
            breakpoints: BreakpointTable::new(),
            logpoints: LogPoints::new(),
            variables: VariableRegistry::new(),
        }
    }
}

struct Inner {
    config: GdbMiConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    correlator: Mutex<Correlator>,
    state: Mutex<State>,
    kill: Mutex<Option<KillHandle>>,
    /// Cancelled once the debugger has exited.
    closed: CancellationToken,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("closed", &self.inner.closed.is_cancelled())
            .finish()
    }
}

/// A command that has been written and awaits its result record.
#[derive(Debug)]
pub(crate) struct PendingReply(ReplyReceiver);

impl PendingReply {
    pub(crate) async fn wait(self) -> Result<ResultRecord> {
        self.0.await.map_err(|_| MiError::SessionClosed)?
    }
}

impl Session {
    /// Create an idle session. Events are delivered on the returned receiver
    /// once a debugger is started with one of the bring-up operations.
    pub fn new(config: GdbMiConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            events,
            writer: tokio::sync::Mutex::new(None),
            correlator: Mutex::new(Correlator::new()),
            state: Mutex::new(State::default()),
            kill: Mutex::new(None),
            closed: CancellationToken::new(),
        });
        (Self { inner }, rx)
    }

    pub fn config(&self) -> &GdbMiConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RunState {
        self.lock_state("state").run_state
    }

    /// Features reported by `-list-features` during bring-up.
    pub fn features(&self) -> Vec<String> {
        self.lock_state("features").features.clone()
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.lock_state("has_feature")
            .features
            .iter()
            .any(|f| f == feature)
    }

    /// A token cancelled when the debugger exits.
    pub fn closed_token(&self) -> CancellationToken {
        self.inner.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    pub(crate) fn lock_state(&self, context: &'static str) -> MutexGuard<'_, State> {
        lock(&self.inner.state, context)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn emit_line(&self, channel: MessageChannel, text: &str) {
        self.emit(SessionEvent::line(channel, text));
    }

    /// Start using `transport` and spawn the read loop.
    pub(crate) async fn attach_transport(&self, transport: Transport) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        if writer.is_some() || self.inner.closed.is_cancelled() {
            return Err(MiError::InvalidArgument(
                "session already has a debugger".to_string(),
            ));
        }
        let pid = transport.pid();
        let (write_half, events, kill) = transport.into_parts();
        *writer = Some(write_half);
        *lock(&self.inner.kill, "attach_transport") = Some(kill);
        tracing::debug!(target: "nova.gdbmi", ?pid, "debugger transport attached");

        tokio::spawn(dispatch::read_loop(self.clone(), events));
        Ok(())
    }

    /// Write `command` with a fresh token without waiting for its result.
    pub(crate) async fn issue(&self, command: &str, suppress_failure: bool) -> Result<PendingReply> {
        let mut writer = self.inner.writer.lock().await;
        let Some(out) = writer.as_mut() else {
            return Err(if self.inner.closed.is_cancelled() {
                MiError::SessionClosed
            } else {
                MiError::NotConnected
            });
        };

        let (token, rx) = {
            let mut correlator = lock(&self.inner.correlator, "issue");
            // Checked under the correlator lock so a concurrent exit either
            // sees this command in `fail_all` or we see the exit here.
            if self.inner.closed.is_cancelled() {
                return Err(MiError::SessionClosed);
            }
            correlator.register(command, suppress_failure)
        };

        let line = encode_command(token, command);
        tracing::trace!(target: "nova.gdbmi", "-> {}", line.trim_end());
        let written = match out.write_all(line.as_bytes()).await {
            Ok(()) => out.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            lock(&self.inner.correlator, "issue").cancel(token, MiError::Io(err));
        }
        Ok(PendingReply(rx))
    }

    /// Send an MI command (without the leading `-`) and wait for its result.
    ///
    /// With `suppress_failure`, an `^error` result is returned as a record
    /// instead of an [`MiError::Command`], and a warning is reported.
    pub async fn send(&self, command: &str, suppress_failure: bool) -> Result<ResultRecord> {
        self.issue(command, suppress_failure).await?.wait().await
    }

    /// Write a line as-is, without a token.
    pub async fn send_raw(&self, line: &str) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        let Some(out) = writer.as_mut() else {
            return Err(MiError::NotConnected);
        };
        tracing::trace!(target: "nova.gdbmi", "-> {line}");
        out.write_all(format!("{line}\n").as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    /// Send an MI command given with or without its leading `-`.
    pub async fn send_mi_command(&self, text: &str, suppress_failure: bool) -> Result<ResultRecord> {
        self.send(strip_dash(text), suppress_failure).await
    }

    /// Route user input: `-cmd` goes out as an MI command, anything else runs
    /// in the console interpreter of the given thread and frame.
    pub async fn send_user_input(
        &self,
        text: &str,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<ResultRecord> {
        self.send(&user_input_command(text, thread_id, frame_level), false)
            .await
    }

    pub(crate) fn kill(&self) {
        if let Some(kill) = lock(&self.inner.kill, "kill").as_mut() {
            kill.kill();
        }
    }

    /// Called by the read loop once the transport has delivered its exit.
    async fn mark_closed(&self) {
        self.inner.closed.cancel();
        lock(&self.inner.correlator, "mark_closed").fail_all(|| MiError::SessionClosed);
        self.inner.writer.lock().await.take();
    }
}

pub(crate) fn strip_dash(text: &str) -> &str {
    text.strip_prefix('-').unwrap_or(text)
}

/// The MI command for one line of user input.
pub fn user_input_command(text: &str, thread_id: u32, frame_level: u32) -> String {
    if let Some(mi) = text.strip_prefix('-') {
        return mi.to_string();
    }
    let mut command = "interpreter-exec ".to_string();
    if thread_id != 0 {
        command.push_str(&format!("--thread {thread_id} --frame {frame_level} "));
    }
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    command.push_str(&format!("console \"{escaped}\""));
    command
}
