use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use super::Transport;
use crate::error::{MiError, Result};

const PASSWORD_ENV: &str = "NOVA_GDBMI_SSH_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    /// Use the agent listening on the inherited `SSH_AUTH_SOCK`.
    Agent,
    KeyFile(PathBuf),
    Password(String),
}

/// Connection settings for running the debugger on a remote host.
#[derive(Debug, Clone)]
pub struct SshArgs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: SshAuth,
    pub forward_x11: bool,
    /// Local X server host; empty means the local unix socket display.
    pub x11_host: String,
    /// TCP port of the X server (6000 + display) or, for the socket case, the display number.
    pub x11_port: u16,
    pub remote_x11_screen: u32,
    /// Shell command run remotely before the debugger, joined with `&&`.
    pub bootstrap: Option<String>,
    /// The OpenSSH client binary.
    pub ssh_program: PathBuf,
}

impl Default for SshArgs {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            auth: SshAuth::Agent,
            forward_x11: false,
            x11_host: String::new(),
            x11_port: 0,
            remote_x11_screen: 0,
            bootstrap: None,
            ssh_program: PathBuf::from("ssh"),
        }
    }
}

impl SshArgs {
    /// `DISPLAY` value pointing the forwarded X11 channel at the local server.
    pub fn local_display(&self) -> String {
        if self.x11_host.is_empty() {
            format!(":{}", self.x11_port)
        } else {
            let display = self.x11_port.checked_sub(6000).unwrap_or(self.x11_port);
            format!("{}:{display}", self.x11_host)
        }
    }

    /// The command line executed on the remote host.
    pub fn remote_command(&self, debugger_command: &str) -> String {
        match self.bootstrap.as_deref().filter(|b| !b.is_empty()) {
            Some(bootstrap) => format!("{bootstrap} && {debugger_command}"),
            None => debugger_command.to_string(),
        }
    }

    /// Arguments passed to the local `ssh` client.
    pub fn ssh_argv(&self, debugger_command: &str) -> Vec<String> {
        let mut argv = vec!["-T".to_string(), "-p".to_string(), self.port.to_string()];
        if !self.user.is_empty() {
            argv.push("-l".to_string());
            argv.push(self.user.clone());
        }
        match &self.auth {
            SshAuth::Agent => {
                argv.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
            }
            SshAuth::KeyFile(path) => {
                argv.extend([
                    "-o".to_string(),
                    "BatchMode=yes".to_string(),
                    "-i".to_string(),
                    path.display().to_string(),
                ]);
            }
            SshAuth::Password(_) => {
                argv.extend([
                    "-o".to_string(),
                    "PreferredAuthentications=password,keyboard-interactive".to_string(),
                ]);
            }
        }
        if self.forward_x11 {
            argv.push("-X".to_string());
        }
        argv.push(self.host.clone());
        argv.push(self.remote_command(debugger_command));
        argv
    }
}

/// Run `debugger_command` on the remote host over the system OpenSSH client.
///
/// Authentication failures happen after the client has started; they are
/// reported as [`super::TransportEvent::LaunchFailed`] when ssh exits with
/// status 255 before producing any output.
pub fn spawn_ssh(args: &SshArgs, debugger_command: &str) -> Result<Transport> {
    if let SshAuth::KeyFile(path) = &args.auth {
        if !path.exists() {
            return Err(MiError::Launch("SSH key file does not exist!".to_string()));
        }
    }
    if args.forward_x11 && args.remote_x11_screen != 0 {
        tracing::debug!(
            target: "nova.gdbmi",
            screen = args.remote_x11_screen,
            "remote X11 screen selection is not supported by the ssh client; ignoring"
        );
    }

    let mut cmd = Command::new(&args.ssh_program);
    cmd.args(args.ssh_argv(debugger_command))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if args.forward_x11 {
        cmd.env("DISPLAY", args.local_display());
    }

    let askpass = match &args.auth {
        SshAuth::Password(password) => {
            let script = write_askpass_script()?;
            cmd.env("SSH_ASKPASS", &script)
                .env("SSH_ASKPASS_REQUIRE", "force")
                .env(PASSWORD_ENV, password);
            Some(script)
        }
        _ => None,
    };

    tracing::debug!(
        target: "nova.gdbmi",
        host = %args.host,
        port = args.port,
        "running debugger over ssh"
    );
    let child = cmd
        .spawn()
        .map_err(|err| MiError::Launch(format!("could not run ssh: {err}")))?;

    let failure = format!("Error running debugger over ssh on {}", args.host);
    Transport::from_child(child, Some(failure), askpass)
        .map_err(|err| MiError::Launch(format!("could not run ssh: {err}")))
}

/// The askpass helper echoes the password from the environment so the secret
/// never lands on disk.
fn write_askpass_script() -> Result<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("nova-gdbmi-askpass-")
        .suffix(".sh")
        .tempfile()
        .map_err(|err| MiError::Launch(format!("could not create askpass helper: {err}")))?;
    writeln!(file, "#!/bin/sh\nprintf '%s\\n' \"${PASSWORD_ENV}\"")?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(file.into_temp_path())
}
