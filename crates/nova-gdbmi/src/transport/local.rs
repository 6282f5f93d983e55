use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use super::Transport;
use crate::error::{MiError, Result};

/// A debugger process to spawn on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Overrides merged over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl std::fmt::Display for LocalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Spawn the debugger with piped stdio in its own process group.
pub fn spawn_local(debugger: &LocalCommand) -> Result<Transport> {
    let mut cmd = Command::new(&debugger.program);
    cmd.args(&debugger.args)
        .envs(&debugger.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &debugger.cwd {
        cmd.current_dir(cwd);
    }

    // Own process group so a forced kill also reaches the inferior.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            // SAFETY: `setpgid` is async-signal-safe and does not allocate.
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    tracing::debug!(target: "nova.gdbmi", command = %debugger, "spawning debugger");
    let child = cmd
        .spawn()
        .map_err(|err| MiError::Launch(format!("{}: {err}", debugger.program.display())))?;
    Transport::from_child(child, None, None)
        .map_err(|err| MiError::Launch(format!("{}: {err}", debugger.program.display())))
}
