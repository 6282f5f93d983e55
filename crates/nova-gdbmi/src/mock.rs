//! A scripted in-process debugger speaking MI over in-memory pipes.
//!
//! Each command the engine writes is parsed into a [`MockCommand`], recorded
//! and handed to a responder closure; the lines it returns are written back in
//! order. Tests can also inject arbitrary output (async or stream records) and
//! simulate the debugger exiting.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::poison::lock;
use crate::transport::Transport;

const PIPE_CAPACITY: usize = 64 * 1024;

/// One line received by the mock debugger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockCommand {
    pub token: Option<u64>,
    /// The command without token and leading `-`.
    pub command: String,
}

impl MockCommand {
    fn parse(line: &str) -> Self {
        let digits = line
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(line.len());
        let token = line[..digits].parse().ok();
        let rest = &line[digits..];
        Self {
            token,
            command: rest.strip_prefix('-').unwrap_or(rest).to_string(),
        }
    }

    /// The MI operation, e.g. `break-insert`.
    pub fn name(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }

    /// A result record for this command; `body` is `class[,results]`.
    pub fn reply(&self, body: &str) -> String {
        match self.token {
            Some(token) => format!("{token}^{body}"),
            None => format!("^{body}"),
        }
    }

    pub fn done(&self) -> String {
        self.reply("done")
    }

    pub fn done_with(&self, results: &str) -> String {
        self.reply(&format!("done,{results}"))
    }

    pub fn running(&self) -> String {
        self.reply("running")
    }

    pub fn error(&self, message: &str) -> String {
        self.reply(&format!("error,msg=\"{}\"", crate::mi::c_escape(message)))
    }
}

pub type Responder = Arc<dyn Fn(&MockCommand) -> Vec<String> + Send + Sync>;

/// Answers every command with `^done`.
pub fn always_done() -> Responder {
    Arc::new(|command: &MockCommand| vec![command.done()])
}

enum Control {
    Emit(String),
    Exit,
}

pub struct MockDebugger {
    commands: Arc<Mutex<Vec<MockCommand>>>,
    control: mpsc::UnboundedSender<Control>,
    shutdown: CancellationToken,
}

impl MockDebugger {
    /// Start the mock; the returned transport is the engine's end of the pipes.
    ///
    /// A raw `-gdb-exit` is answered with `^exit` and ends the debugger; every
    /// other line goes to `responder`.
    pub fn spawn(responder: Responder) -> (Self, Transport) {
        let (engine_end, debugger_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (engine_read, engine_write) = tokio::io::split(engine_end);
        let transport = Transport::from_io(engine_read, engine_write);

        let commands = Arc::new(Mutex::new(Vec::new()));
        let (control, mut control_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let recorded = commands.clone();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(debugger_end);
            let mut lines = BufReader::new(read).lines();
            loop {
                let output = tokio::select! {
                    _ = stop.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let line = line.trim_end_matches('\r');
                            let command = MockCommand::parse(line);
                            lock(&recorded, "mock commands").push(command.clone());
                            if command.token.is_none() && command.name() == "gdb-exit" {
                                let _ = write.write_all(b"^exit\n").await;
                                break;
                            }
                            responder(&command)
                        }
                        Ok(None) | Err(_) => break,
                    },
                    control = control_rx.recv() => match control {
                        Some(Control::Emit(line)) => vec![line],
                        Some(Control::Exit) | None => break,
                    },
                };
                for line in output {
                    if write.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                        return;
                    }
                }
                let _ = write.flush().await;
            }
            let _ = write.shutdown().await;
        });

        (
            Self {
                commands,
                control,
                shutdown,
            },
            transport,
        )
    }

    /// Every line received so far, in order.
    pub fn commands(&self) -> Vec<MockCommand> {
        lock(&self.commands, "mock commands").clone()
    }

    /// Received commands whose operation is `name`.
    pub fn commands_named(&self, name: &str) -> Vec<MockCommand> {
        self.commands()
            .into_iter()
            .filter(|command| command.name() == name)
            .collect()
    }

    /// Write an unsolicited output line (async, stream or plain text).
    pub fn emit(&self, line: impl Into<String>) {
        let _ = self.control.send(Control::Emit(line.into()));
    }

    /// Close the debugger's output, as if the process exited.
    pub fn exit(&self) {
        let _ = self.control.send(Control::Exit);
    }
}

impl Drop for MockDebugger {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
