//! Execution control and breakpoints.

use tokio::task::JoinSet;

use super::Session;
use crate::breakpoints::{
    insert_command, AddBreakpoint, Breakpoint, BreakpointDescriptor, BreakpointLocation,
    HitCountPolicy,
};
use crate::error::{MiError, Result};
use crate::event::{MessageChannel, SessionEvent, StopReason, StoppedEvent};
use crate::logpoint::LogTemplate;
use crate::mi::{escape, MiValue, ResultClass};

impl Session {
    /// `-exec-run`, optionally stopping at the program's entry.
    ///
    /// Debuggers without `exec-run-start-option` get a temporary breakpoint on
    /// `main` instead. Returns whether the debugger reported `running`.
    pub async fn start(&self, run_to_start: bool) -> Result<bool> {
        let mut command = "exec-run".to_string();
        if run_to_start {
            if self.has_feature("exec-run-start-option") {
                command.push_str(" --start");
            } else {
                self.set_entry_breakpoint("main").await?;
            }
        }
        self.emit_line(MessageChannel::Console, "Running executable");
        let record = self.send(&command, false).await?;

        let crashed = {
            let mut state = self.lock_state("start");
            state.started = true;
            std::mem::take(&mut state.crashed)
        };
        if crashed {
            self.emit(SessionEvent::Stopped(StoppedEvent {
                reason: StopReason::Pause,
                thread_id: None,
                all_threads_stopped: true,
                breakpoint_id: None,
                signal_name: None,
                raw_reason: None,
            }));
        }
        Ok(record.class == ResultClass::Running)
    }

    pub async fn set_entry_breakpoint(&self, entry: &str) -> Result<()> {
        self.send(&format!("break-insert -t -f {entry}"), false)
            .await
            .map(drop)
    }

    /// Whether the target can execute in reverse. Queried once per session.
    pub async fn supports_reverse(&self) -> Result<bool> {
        let cached = self.lock_state("target_features").target_features.clone();
        let features = match cached {
            Some(features) => features,
            None => {
                let features: Vec<String> = match self.send("list-target-features", false).await {
                    Ok(record) => record
                        .result("features")
                        .map(|list| {
                            list.list_values()
                                .filter_map(MiValue::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    Err(MiError::Command { message, .. }) => {
                        tracing::debug!(target: "nova.gdbmi", %message, "list-target-features failed");
                        Vec::new()
                    }
                    Err(err) => return Err(err),
                };
                self.lock_state("target_features").target_features = Some(features.clone());
                features
            }
        };
        Ok(features.iter().any(|f| f == "reverse"))
    }

    async fn execute(&self, command: &str, reverse: bool) -> Result<bool> {
        let command = if reverse {
            if !self.supports_reverse().await? {
                return Err(MiError::Unsupported(format!(
                    "reverse execution ({command}) is not supported by this target"
                )));
            }
            format!("{command} --reverse")
        } else {
            command.to_string()
        };
        let record = self.send(&command, false).await?;
        Ok(record.class == ResultClass::Running)
    }

    /// Returns whether the debugger acknowledged with `done`.
    pub async fn interrupt(&self) -> Result<bool> {
        let record = self.send("exec-interrupt", false).await?;
        Ok(record.class == ResultClass::Done)
    }

    pub async fn continue_(&self, reverse: bool) -> Result<bool> {
        self.execute("exec-continue", reverse).await
    }

    pub async fn next(&self, reverse: bool) -> Result<bool> {
        self.execute("exec-next", reverse).await
    }

    pub async fn step(&self, reverse: bool) -> Result<bool> {
        self.execute("exec-step", reverse).await
    }

    pub async fn step_out(&self, reverse: bool) -> Result<bool> {
        self.execute("exec-finish", reverse).await
    }

    /// Move execution to `file:line` (or `line` in the current file).
    pub async fn goto(&self, file: Option<&str>, line: u32) -> Result<bool> {
        let location = match file.filter(|f| !f.is_empty()) {
            Some(file) => format!("\"{}:{line}\"", escape(file)),
            None => format!("\"{line}\""),
        };
        self.send(&format!("break-insert -t {location}"), false)
            .await?;
        let record = self.send(&format!("exec-jump {location}"), false).await?;
        Ok(record.class == ResultClass::Running)
    }

    pub async fn change_variable(&self, name: &str, value: &str) -> Result<()> {
        self.send(&format!("gdb-set var {name}={value}"), false)
            .await
            .map(drop)
    }

    /// Ask the debugger to quit, killing it if it is still alive after the
    /// configured grace period.
    pub async fn stop(&self) -> Result<()> {
        self.quit_with("-gdb-exit").await
    }

    /// Detach from the program, then end the debugger like [`Session::stop`].
    pub async fn detach(&self) -> Result<()> {
        self.quit_with("-target-detach").await
    }

    async fn quit_with(&self, raw: &str) -> Result<()> {
        self.send_raw(raw).await?;
        let closed = self.closed_token();
        let grace = self.config().session.quit_grace_period();
        if tokio::time::timeout(grace, closed.cancelled()).await.is_err() {
            tracing::warn!(target: "nova.gdbmi", ?grace, "debugger did not exit; killing it");
            self.kill();
            closed.cancelled().await;
        }
        Ok(())
    }

    pub async fn add_breakpoint(&self, descriptor: &BreakpointDescriptor) -> Result<AddBreakpoint> {
        let location = descriptor.location()?;
        if !self.lock_state("add_breakpoint").breakpoints.begin_add(&location) {
            return Ok(AddBreakpoint::AlreadyInstalled);
        }
        let claim = AddClaim {
            session: self,
            location: Some(location.clone()),
        };

        let outcome = self.install_breakpoint(location, descriptor).await;
        let installed = outcome
            .as_ref()
            .ok()
            .and_then(AddBreakpoint::breakpoint)
            .cloned();
        claim.finish(installed);
        outcome
    }

    async fn install_breakpoint(
        &self,
        location: BreakpointLocation,
        descriptor: &BreakpointDescriptor,
    ) -> Result<AddBreakpoint> {
        let policy = descriptor.hit_count_policy();
        if let Some(HitCountPolicy::Unsupported(text)) = &policy {
            tracing::warn!(target: "nova.gdbmi", hit_condition = %text, "unsupported hit count; breaking once");
            self.emit_line(
                MessageChannel::Stderr,
                &format!(
                    "Unsupported break count expression: '{text}'. Only supports 'X' for breaking once after X times or '>X' for ignoring the first X breaks"
                ),
            );
        }

        let command = insert_command(&location, policy.as_ref());
        let record = self.send(&command, false).await?;
        let breakpoint = Breakpoint::from_insert_response(&command, location, descriptor, &record)?;

        let mut follow_up = Ok(());
        if let Some(condition) = descriptor.condition.as_deref().filter(|c| !c.is_empty()) {
            follow_up = self
                .send(&format!("break-condition {} {condition}", breakpoint.id), false)
                .await
                .map(drop);
        }
        if let Some(message) = descriptor.log_message.as_deref().filter(|m| !m.is_empty()) {
            let template = LogTemplate::parse(message);
            let installed = if template.expressions.is_empty() {
                Ok(())
            } else {
                self.send(&template.break_commands(breakpoint.id), false)
                    .await
                    .map(drop)
            };
            if installed.is_ok() {
                self.lock_state("logpoint")
                    .logpoints
                    .register(breakpoint.id, template);
            }
            follow_up = follow_up.and(installed);
        }

        Ok(match follow_up {
            Ok(()) => AddBreakpoint::Added(breakpoint),
            Err(error) => {
                tracing::warn!(target: "nova.gdbmi", id = breakpoint.id, %error, "breakpoint installed without its condition or log message");
                AddBreakpoint::Degraded { breakpoint, error }
            }
        })
    }

    /// Add every breakpoint concurrently; results are in input order.
    pub async fn load_breakpoints(
        &self,
        descriptors: Vec<BreakpointDescriptor>,
    ) -> Vec<Result<AddBreakpoint>> {
        let count = descriptors.len();
        let mut tasks = JoinSet::new();
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let session = self.clone();
            tasks.spawn(async move { (index, session.add_breakpoint(&descriptor).await) });
        }

        let mut results: Vec<Option<Result<AddBreakpoint>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(err) => {
                    tracing::error!(target: "nova.gdbmi", error = %err, "breakpoint task failed");
                }
            }
        }
        results
            .into_iter()
            .map(|result| result.unwrap_or(Err(MiError::SessionClosed)))
            .collect()
    }

    /// Delete an installed breakpoint. Returns false if it was not installed
    /// or the debugger did not confirm the delete.
    pub async fn remove_breakpoint(&self, descriptor: &BreakpointDescriptor) -> Result<bool> {
        let location = descriptor.location()?;
        let id = match self.lock_state("remove_breakpoint").breakpoints.get(&location) {
            Some(breakpoint) => breakpoint.id,
            None => return Ok(false),
        };
        let record = self.send(&format!("break-delete {id}"), false).await?;
        if record.class != ResultClass::Done {
            return Ok(false);
        }
        let mut state = self.lock_state("remove_breakpoint");
        state.breakpoints.remove(&location);
        state.logpoints.remove(id);
        Ok(true)
    }

    /// Delete every breakpoint whose file is `source` (raw-location
    /// breakpoints when `None`). The table is updated before the deletes
    /// are sent; every delete is sent even if an earlier one fails, and the
    /// first failure is returned.
    pub async fn clear_breakpoints(&self, source: Option<&str>) -> Result<()> {
        let removed = {
            let mut state = self.lock_state("clear_breakpoints");
            let removed = state.breakpoints.take_source(source);
            for breakpoint in &removed {
                state.logpoints.remove(breakpoint.id);
            }
            removed
        };

        let mut first_error = None;
        let mut pending = Vec::with_capacity(removed.len());
        for breakpoint in &removed {
            match self.issue(&format!("break-delete {}", breakpoint.id), false).await {
                Ok(reply) => pending.push(reply),
                Err(err) => {
                    tracing::warn!(target: "nova.gdbmi", id = breakpoint.id, error = %err, "failed to send breakpoint delete");
                    first_error.get_or_insert(err);
                }
            }
        }
        for reply in pending {
            if let Err(err) = reply.wait().await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Snapshot of the installed breakpoints, ordered by debugger id.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        let mut breakpoints: Vec<Breakpoint> = self
            .lock_state("breakpoints")
            .breakpoints
            .iter()
            .cloned()
            .collect();
        breakpoints.sort_by_key(|bp| bp.id);
        breakpoints
    }
}

/// An in-flight breakpoint add. Dropping it without [`AddClaim::finish`]
/// (the add future was cancelled) frees the location for the next add.
struct AddClaim<'a> {
    session: &'a Session,
    location: Option<BreakpointLocation>,
}

impl AddClaim<'_> {
    fn finish(mut self, installed: Option<Breakpoint>) {
        if let Some(location) = self.location.take() {
            self.session
                .lock_state("add_breakpoint")
                .breakpoints
                .finish_add(&location, installed);
        }
    }
}

impl Drop for AddClaim<'_> {
    fn drop(&mut self) {
        if let Some(location) = self.location.take() {
            tracing::debug!(target: "nova.gdbmi", ?location, "breakpoint add abandoned");
            self.session
                .lock_state("add_breakpoint")
                .breakpoints
                .finish_add(&location, None);
        }
    }
}
