//! Starting a debugger and running the setup sequence that precedes
//! `DebugReady`.

use std::path::Path;

use super::{strip_dash, user_input_command, PendingReply, Session};
use crate::config::DebuggerFlavor;
use crate::error::{MiError, Result};
use crate::event::SessionEvent;
use crate::mi::{escape, MiValue};
use crate::transport::{spawn_local, spawn_ssh, SshArgs, Transport};

/// Launch a program under a local debugger.
#[derive(Clone, Debug, Default)]
pub struct LoadArgs {
    /// Working directory, in the debugger's path syntax.
    pub cwd: String,
    /// Program to debug; relative paths are resolved against `cwd`.
    pub target: String,
    pub program_args: Option<String>,
    /// An existing terminal for the program's stdio.
    pub tty: Option<String>,
    pub autorun: Vec<String>,
}

/// Attach to a running process or an extended-remote target.
#[derive(Clone, Debug, Default)]
pub struct AttachArgs {
    pub cwd: String,
    pub executable: Option<String>,
    /// A pid, or `extended-remote host:port`.
    pub target: String,
    pub autorun: Vec<String>,
}

/// Connect to a remote target (`gdbserver host:port`).
#[derive(Clone, Debug, Default)]
pub struct ConnectArgs {
    pub cwd: String,
    pub executable: Option<String>,
    pub target: String,
    pub autorun: Vec<String>,
}

/// Run the debugger on another machine over SSH.
#[derive(Clone, Debug, Default)]
pub struct SshLaunch {
    pub ssh: SshArgs,
    /// Remote working directory.
    pub cwd: String,
    pub target: String,
    pub program_args: Option<String>,
    /// Treat `target` as a pid to attach to instead of a program to load.
    pub attach: bool,
    pub autorun: Vec<String>,
}

fn is_windows_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with(['\\', '/'])
        || (bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && matches!(bytes[2], b'\\' | b'/'))
}

/// Resolve `target` against `cwd` using the path syntax `cwd` is written in:
/// POSIX when `cwd` starts with `/`, Windows otherwise.
pub fn join_target(cwd: &str, target: &str) -> String {
    if cwd.starts_with('/') {
        if target.starts_with('/') {
            return target.to_string();
        }
        return format!("{}/{target}", cwd.trim_end_matches('/'));
    }
    if is_windows_absolute(target) || cwd.is_empty() {
        return target.to_string();
    }
    format!("{}\\{target}", cwd.trim_end_matches(['\\', '/']))
}

fn cwd_path(cwd: &str) -> Option<&Path> {
    (!cwd.is_empty()).then(|| Path::new(cwd))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Commands of one bring-up, written before any of them is awaited.
struct BringUp {
    features: Option<PendingReply>,
    replies: Vec<PendingReply>,
}

impl Session {
    /// Turn a spawn result into a transport, reporting launch failures as
    /// events.
    fn launched(&self, spawned: Result<Transport>) -> Result<Transport> {
        spawned.map_err(|err| {
            let message = match &err {
                MiError::Launch(message) => message.clone(),
                other => other.to_string(),
            };
            tracing::warn!(target: "nova.gdbmi", %message, "failed to start debugger");
            self.emit(SessionEvent::LaunchError { message });
            self.on_quit();
            err
        })
    }

    pub async fn load(&self, args: &LoadArgs) -> Result<()> {
        let command = self
            .config()
            .debugger
            .local_command(cwd_path(&args.cwd), &[]);
        let transport = self.launched(spawn_local(&command))?;
        self.load_with_transport(transport, args).await
    }

    /// Like [`Session::load`] over an already connected transport.
    pub async fn load_with_transport(&self, transport: Transport, args: &LoadArgs) -> Result<()> {
        self.attach_transport(transport).await?;
        let target = join_target(&args.cwd, &args.target);
        let mut bring_up = self.init_commands(&args.cwd, Some(&target)).await?;
        if let Some(program_args) = non_empty(&args.program_args) {
            bring_up.push(self.issue(&format!("exec-arguments {program_args}"), false).await?);
        }
        if let Some(tty) = non_empty(&args.tty) {
            bring_up.push(self.issue(&format!("inferior-tty-set {tty}"), false).await?);
        }
        self.issue_autorun(&mut bring_up, &args.autorun).await?;
        self.finish_bring_up(bring_up).await
    }

    pub async fn attach(&self, args: &AttachArgs) -> Result<()> {
        let command = self
            .config()
            .debugger
            .local_command(cwd_path(&args.cwd), &[]);
        let transport = self.launched(spawn_local(&command))?;
        self.attach_with_transport(transport, args).await
    }

    pub async fn attach_with_transport(&self, transport: Transport, args: &AttachArgs) -> Result<()> {
        self.attach_transport(transport).await?;
        let executable = non_empty(&args.executable).map(|exe| join_target(&args.cwd, exe));
        let mut bring_up = self.init_commands(&args.cwd, None).await?;
        if args.target.starts_with("extended-remote") {
            bring_up.push(self.issue(&format!("target-select {}", args.target), false).await?);
            if let Some(exe) = &executable {
                bring_up.push(
                    self.issue(&format!("file-symbol-file \"{}\"", escape(exe)), false)
                        .await?,
                );
            }
        } else {
            if let Some(exe) = &executable {
                bring_up.push(
                    self.issue(&format!("file-exec-and-symbols \"{}\"", escape(exe)), false)
                        .await?,
                );
            }
            bring_up.push(self.issue(&format!("target-attach {}", args.target), false).await?);
        }
        self.issue_autorun(&mut bring_up, &args.autorun).await?;
        self.finish_bring_up(bring_up).await
    }

    pub async fn connect(&self, args: &ConnectArgs) -> Result<()> {
        let trailing: Vec<String> = non_empty(&args.executable)
            .map(|exe| vec![join_target(&args.cwd, exe)])
            .unwrap_or_default();
        let command = self
            .config()
            .debugger
            .local_command(cwd_path(&args.cwd), &trailing);
        let transport = self.launched(spawn_local(&command))?;
        self.connect_with_transport(transport, args).await
    }

    /// The executable, if any, must already have been given to the debugger.
    pub async fn connect_with_transport(&self, transport: Transport, args: &ConnectArgs) -> Result<()> {
        self.attach_transport(transport).await?;
        let mut bring_up = self.init_commands(&args.cwd, None).await?;
        bring_up.push(
            self.issue(&format!("target-select remote {}", args.target), false)
                .await?,
        );
        self.issue_autorun(&mut bring_up, &args.autorun).await?;
        self.finish_bring_up(bring_up).await
    }

    pub async fn ssh(&self, launch: &SshLaunch) -> Result<()> {
        let debugger_command = self.config().debugger.shell_command(&[]);
        let transport = self.launched(spawn_ssh(&launch.ssh, &debugger_command))?;
        self.ssh_with_transport(transport, launch).await
    }

    pub async fn ssh_with_transport(&self, transport: Transport, launch: &SshLaunch) -> Result<()> {
        self.attach_transport(transport).await?;
        let target = (!launch.attach).then(|| join_target(&launch.cwd, &launch.target));
        let mut bring_up = self.init_commands(&launch.cwd, target.as_deref()).await?;
        bring_up.push(
            self.issue(&format!("environment-cd \"{}\"", escape(&launch.cwd)), false)
                .await?,
        );
        if launch.attach {
            bring_up.push(
                self.issue(&format!("target-attach {}", launch.target), false)
                    .await?,
            );
        } else if let Some(program_args) = non_empty(&launch.program_args) {
            bring_up.push(self.issue(&format!("exec-arguments {program_args}"), false).await?);
        }
        self.issue_autorun(&mut bring_up, &launch.autorun).await?;
        self.finish_bring_up(bring_up).await
    }

    /// The setup shared by every bring-up. `target` is `None` when attaching.
    async fn init_commands(&self, cwd: &str, target: Option<&str>) -> Result<BringUp> {
        let debugger = &self.config().debugger;
        let mut replies = vec![self.issue("gdb-set target-async on", true).await?];
        let features = Some(self.issue("list-features", false).await?);
        replies.push(
            self.issue(&format!("environment-directory \"{}\"", escape(cwd)), true)
                .await?,
        );
        if let Some(target) = target {
            replies.push(
                self.issue(&format!("file-exec-and-symbols \"{}\"", escape(target)), false)
                    .await?,
            );
        }
        if debugger.frame_filters {
            replies.push(self.issue("enable-frame-filters", false).await?);
        }
        for (from, to) in &debugger.source_file_map {
            let command = match debugger.flavor {
                DebuggerFlavor::Gdb => {
                    format!("gdb-set substitute-path \"{}\" \"{}\"", escape(from), escape(to))
                }
                DebuggerFlavor::Lldb => format!(
                    "interpreter-exec console \"{}\"",
                    escape(&format!("settings append target.source-map {from} {to}"))
                ),
            };
            replies.push(self.issue(&command, false).await?);
        }
        for setup in &debugger.setup_commands {
            replies.push(
                self.issue(strip_dash(&setup.text), setup.ignore_failures)
                    .await?,
            );
        }
        Ok(BringUp { features, replies })
    }

    async fn issue_autorun(&self, bring_up: &mut BringUp, autorun: &[String]) -> Result<()> {
        for command in autorun {
            bring_up.push(self.issue(&user_input_command(command, 0, 0), false).await?);
        }
        Ok(())
    }

    async fn finish_bring_up(&self, bring_up: BringUp) -> Result<()> {
        if let Some(features) = bring_up.features {
            let features = match features.wait().await {
                Ok(record) => record
                    .result("features")
                    .map(|list| {
                        list.list_values()
                            .filter_map(MiValue::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                Err(err) => {
                    tracing::debug!(target: "nova.gdbmi", error = %err, "list-features failed; assuming none");
                    Vec::new()
                }
            };
            self.lock_state("features").features = features;
        }

        for reply in bring_up.replies {
            reply.wait().await?;
        }
        tracing::info!(target: "nova.gdbmi", "debugger ready");
        self.emit(SessionEvent::DebugReady);
        Ok(())
    }
}

impl BringUp {
    fn push(&mut self, reply: PendingReply) {
        self.replies.push(reply);
    }
}
