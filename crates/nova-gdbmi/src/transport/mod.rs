//! Duplex byte transports carrying MI traffic.
//!
//! Every transport delivers debugger output as an ordered stream of
//! [`TransportEvent`]s: stdout and stderr chunks in arrival order and exactly
//! one terminal `Exited`, which is only sent once stdout has reached EOF so
//! no output is lost behind it.

mod local;
mod remote;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

pub use local::{spawn_local, LocalCommand};
pub use remote::{spawn_ssh, SshArgs, SshAuth};

pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// The channel never became usable (e.g. SSH authentication failed after
    /// the client process started).
    LaunchFailed(String),
    Exited(Option<i32>),
}

/// Requests a forced kill of the debugger (process group on unix).
#[derive(Debug)]
pub struct KillHandle(Option<oneshot::Sender<()>>);

impl KillHandle {
    pub fn kill(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

pub struct Transport {
    writer: BoxedWriter,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    kill: KillHandle,
    pid: Option<u32>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("pid", &self.pid).finish()
    }
}

impl Transport {
    /// Wrap an arbitrary reader/writer pair. Used by tests and by callers that
    /// already own a connected stream.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::select! {
                _ = pump(reader, tx.clone(), TransportEvent::Stdout) => {}
                _ = killed(kill_rx) => {}
            }
            let _ = tx.send(TransportEvent::Exited(None));
        });

        Self {
            writer: Box::new(writer),
            events,
            kill: KillHandle(Some(kill_tx)),
            pid: None,
        }
    }

    /// Take over a spawned debugger. `launch_failure` is reported if the
    /// process exits with status 255 before writing anything (ssh's connection
    /// failure status). `guard` is dropped once the process has exited.
    pub(crate) fn from_child(
        mut child: Child,
        launch_failure: Option<String>,
        guard: Option<tempfile::TempPath>,
    ) -> std::io::Result<Self> {
        let Some(stdin) = child.stdin.take() else {
            return Err(std::io::Error::other("debugger stdin was not captured"));
        };
        let Some(stdout) = child.stdout.take() else {
            return Err(std::io::Error::other("debugger stdout was not captured"));
        };
        let stderr = child.stderr.take();
        let pid = child.id();

        let (tx, events) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (status_tx, status_rx) = oneshot::channel();

        tokio::spawn(wait_child(child, pid, kill_rx, status_tx, guard));

        let stderr_pump =
            stderr.map(|stderr| tokio::spawn(pump(stderr, tx.clone(), TransportEvent::Stderr)));

        tokio::spawn(async move {
            let saw_output = pump(stdout, tx.clone(), TransportEvent::Stdout).await;
            // Stderr is drained before `Exited` so no late output is lost.
            if let Some(stderr_pump) = stderr_pump {
                let _ = stderr_pump.await;
            }
            let code = status_rx.await.ok().flatten();
            if let Some(message) = launch_failure {
                if !saw_output && code == Some(255) {
                    let _ = tx.send(TransportEvent::LaunchFailed(message));
                }
            }
            let _ = tx.send(TransportEvent::Exited(code));
        });

        Ok(Self {
            writer: Box::new(stdin),
            events,
            kill: KillHandle(Some(kill_tx)),
            pid,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BoxedWriter,
        mpsc::UnboundedReceiver<TransportEvent>,
        KillHandle,
    ) {
        (self.writer, self.events, self.kill)
    }
}

/// Forward chunks until EOF or a read error. Returns whether anything was read.
async fn pump<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<TransportEvent>,
    wrap: fn(Vec<u8>) -> TransportEvent,
) -> bool
where
    R: AsyncRead + Unpin,
{
    let mut saw_output = false;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                saw_output = true;
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(target: "nova.gdbmi", error = %err, "debugger pipe read failed");
                break;
            }
        }
    }
    saw_output
}

async fn wait_child(
    mut child: Child,
    pid: Option<u32>,
    kill_rx: oneshot::Receiver<()>,
    status_tx: oneshot::Sender<Option<i32>>,
    guard: Option<tempfile::TempPath>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = killed(kill_rx) => {
            tracing::debug!(target: "nova.gdbmi", ?pid, "killing debugger process group");
            kill_process_group(pid);
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            tracing::warn!(target: "nova.gdbmi", error = %err, "failed to wait for debugger");
            None
        }
    };
    tracing::debug!(target: "nova.gdbmi", ?pid, ?code, "debugger exited");
    drop(guard);
    let _ = status_tx.send(code);
}

/// Resolves only on an explicit [`KillHandle::kill`]; a dropped handle never fires.
async fn killed(rx: oneshot::Receiver<()>) {
    if rx.await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        let Some(pid) = pid else { return };
        // Negative pid targets the process group created by `setpgid(0, 0)` at spawn.
        unsafe {
            let _ = libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}
