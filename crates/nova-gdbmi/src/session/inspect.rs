//! Threads, frames, variables and memory.

use serde::Serialize;

use super::Session;
use crate::error::{MiError, Result};
use crate::memory::{self, MemoryRead, UNREADABLE_MESSAGE};
use crate::mi::{escape, quote, MiValue, ResultClass, ResultRecord};
use crate::thread::{FrameId, StackFrame, ThreadInfo};
use crate::varobj::{
    HandleEntry, MemoryReferenceHint, ScopeKey, ScopeKind, VariableHandle, VariableObject,
};

const THREAD_RUNNING: &str = "Selected thread is running.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StackVariable {
    pub name: String,
    pub value: Option<String>,
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Register {
    pub number: u32,
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub name: String,
    pub kind: ScopeKind,
    pub handle: VariableHandle,
}

/// One row of a variables view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    /// The variable object name, usable with the `var-*` operations.
    pub evaluate_name: Option<String>,
    pub value: String,
    pub type_name: Option<String>,
    /// Set when the variable can be expanded.
    pub reference: Option<VariableHandle>,
    pub memory_reference: Option<String>,
}

impl Variable {
    fn plain(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evaluate_name: None,
            value: value.into(),
            type_name: None,
            reference: None,
            memory_reference: None,
        }
    }
}

fn thread_frame_args(thread_id: u32, frame_level: u32) -> String {
    if thread_id == 0 {
        String::new()
    } else {
        format!("--thread {thread_id} --frame {frame_level} ")
    }
}

fn required<'a>(command: &str, record: &'a ResultRecord, path: &str) -> Result<&'a str> {
    record
        .result_str(path)
        .ok_or_else(|| MiError::decode(command, format!("missing {path}")))
}

/// Object name of a local's variable object in scope `handle`.
fn local_object_name(handle: VariableHandle, name: &str) -> String {
    format!("var_{}_{name}", handle.as_u32())
}

/// Top-level fields of a `-var-create` result as one tuple.
fn record_tuple(record: &ResultRecord) -> MiValue {
    MiValue::Tuple(record.results.clone())
}

impl Session {
    /// `-thread-info`. Empty while the selected thread is running.
    pub async fn threads(&self) -> Result<Vec<ThreadInfo>> {
        let record = match self.send("thread-info", false).await {
            Ok(record) => record,
            Err(MiError::Command { message, .. }) if message == THREAD_RUNNING => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        Ok(record
            .result("threads")
            .map(|threads| threads.list_values().filter_map(ThreadInfo::from_mi).collect())
            .unwrap_or_default())
    }

    /// Frames `start..start + levels` of `thread_id` (0 for the current
    /// thread); `levels == 0` means every frame from `start`.
    pub async fn stack(&self, start: u32, levels: u32, thread_id: u32) -> Result<Vec<StackFrame>> {
        let thread = if thread_id == 0 {
            String::new()
        } else {
            format!("--thread {thread_id} ")
        };

        let command = format!("stack-info-depth {thread}").trim_end().to_string();
        let record = self.send(&command, false).await?;
        let depth: u32 = required(&command, &record, "depth")?
            .parse()
            .map_err(|_| MiError::decode(&command, "malformed depth"))?;

        let end = if levels == 0 {
            depth
        } else {
            depth.min(start.saturating_add(levels))
        };
        if end <= start {
            return Ok(Vec::new());
        }

        let command = format!("stack-list-frames {thread}{start} {}", end - 1);
        let record = self.send(&command, false).await?;
        Ok(record
            .result("stack")
            .map(|stack| stack.list_values().filter_map(StackFrame::from_mi).collect())
            .unwrap_or_default())
    }

    pub async fn stack_variables(&self, thread_id: u32, frame_level: u32) -> Result<Vec<StackVariable>> {
        let command = format!(
            "stack-list-variables --thread {thread_id} --frame {frame_level} --simple-values"
        );
        let record = self.send(&command, false).await?;
        let Some(variables) = record.result("variables") else {
            return Ok(Vec::new());
        };
        Ok(variables
            .list_values()
            .filter_map(|var| {
                Some(StackVariable {
                    name: var.lookup_str("name")?.to_string(),
                    value: var.lookup_str("value").map(str::to_string),
                    type_name: var.lookup_str("type").map(str::to_string),
                })
            })
            .collect())
    }

    async fn register_names(&self) -> Result<Vec<String>> {
        if let Some(names) = self.lock_state("register_names").register_names.clone() {
            return Ok(names);
        }
        let command = "data-list-register-names";
        let record = self.send(command, false).await?;
        let names: Vec<String> = match record.result("register-names") {
            Some(list @ MiValue::List(_)) => list
                .list_values()
                .map(|name| name.as_str().unwrap_or_default().to_string())
                .collect(),
            _ => return Err(MiError::decode(command, "register-names is not a list")),
        };
        self.lock_state("register_names").register_names = Some(names.clone());
        Ok(names)
    }

    /// Current register values in natural format. Unnamed registers are skipped.
    pub async fn registers(&self) -> Result<Vec<Register>> {
        let names = self.register_names().await?;
        let command = "data-list-register-values N";
        let record = self.send(command, false).await?;
        let values = match record.result("register-values") {
            Some(list @ MiValue::List(_)) => list,
            _ => return Err(MiError::decode(command, "register-values is not a list")),
        };

        let mut registers = Vec::new();
        for entry in values.list_values() {
            let Some(number) = entry.lookup_str("number").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let name = names.get(number as usize).map(String::as_str).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            registers.push(Register {
                number,
                name: name.to_string(),
                value: entry.lookup_str("value").unwrap_or_default().to_string(),
            });
        }
        Ok(registers)
    }

    /// `-data-evaluate-expression` in the given frame (thread 0: current frame).
    pub async fn evaluate(&self, expression: &str, thread_id: u32, frame_level: u32) -> Result<String> {
        let command = format!(
            "data-evaluate-expression {}{expression}",
            thread_frame_args(thread_id, frame_level)
        );
        let record = self.send(&command, false).await?;
        required(&command, &record, "value").map(str::to_string)
    }

    /// Create a variable object for `expression` evaluated in the given
    /// frame. `name` of `None` lets the debugger pick one.
    pub async fn var_create(
        &self,
        expression: &str,
        name: Option<&str>,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<VariableObject> {
        let command = format!(
            "var-create {}{} @ \"{}\"",
            thread_frame_args(thread_id, frame_level),
            quote(name.unwrap_or("-")),
            escape(expression)
        );
        let record = self.send(&command, false).await?;
        VariableObject::from_mi(&record_tuple(&record))
            .ok_or_else(|| MiError::decode(&command, "missing name"))
    }

    /// Refresh `name` (or every object for `"*"`), patching the tracked
    /// objects. Returns the handles of the objects that changed.
    pub async fn var_update(&self, name: &str) -> Result<Vec<VariableHandle>> {
        let record = self
            .send(&format!("var-update --all-values {}", quote(name)), false)
            .await?;
        let Some(changelist) = record.result("changelist") else {
            return Ok(Vec::new());
        };
        let mut state = self.lock_state("var_update");
        Ok(changelist
            .list_values()
            .filter_map(|change| {
                let handle = state.variables.apply_change(change);
                if handle.is_none() {
                    tracing::trace!(target: "nova.gdbmi", name = change.lookup_str("name"), "change for untracked variable object");
                }
                handle
            })
            .collect())
    }

    pub async fn var_list_children(&self, name: &str) -> Result<Vec<VariableObject>> {
        let record = self
            .send(&format!("var-list-children --all-values {}", quote(name)), false)
            .await?;
        Ok(record
            .result("children")
            .map(|children| children.list_values().filter_map(VariableObject::from_mi).collect())
            .unwrap_or_default())
    }

    /// Assign `expression` to a variable object; returns its new value.
    pub async fn var_assign(&self, name: &str, expression: &str) -> Result<String> {
        let command = format!("var-assign {} {expression}", quote(name));
        let record = self.send(&command, false).await?;
        required(&command, &record, "value").map(str::to_string)
    }

    pub async fn var_evaluate_expression(&self, name: &str) -> Result<String> {
        let command = format!("var-evaluate-expression {}", quote(name));
        let record = self.send(&command, false).await?;
        required(&command, &record, "value").map(str::to_string)
    }

    /// Locals and registers of a frame. Handles are stable for the session.
    pub fn scopes(&self, frame: FrameId) -> Vec<Scope> {
        let mut state = self.lock_state("scopes");
        [(ScopeKind::Locals, "Locals"), (ScopeKind::Registers, "Registers")]
            .into_iter()
            .map(|(kind, name)| Scope {
                name: name.to_string(),
                kind,
                handle: state.variables.scope_handle(ScopeKey {
                    kind,
                    thread_id: frame.thread_id(),
                    level: frame.level(),
                }),
            })
            .collect()
    }

    /// Expand a scope or a compound variable.
    pub async fn variables(&self, handle: VariableHandle) -> Result<Vec<Variable>> {
        let entry = self.lock_state("variables").variables.entry(handle).cloned();
        match entry {
            Some(HandleEntry::Scope(key)) => match key.kind {
                ScopeKind::Registers => Ok(self
                    .registers()
                    .await?
                    .into_iter()
                    .map(|register| Variable::plain(register.name, register.value))
                    .collect()),
                ScopeKind::Locals => self.local_variables(handle, key).await,
            },
            Some(HandleEntry::Object(object)) => {
                let children = self.var_list_children(&object.name).await?;
                let mut variables = Vec::with_capacity(children.len());
                for child in children {
                    variables.push(self.to_variable(child).await);
                }
                Ok(variables)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn local_variables(&self, handle: VariableHandle, key: ScopeKey) -> Result<Vec<Variable>> {
        let locals = self.stack_variables(key.thread_id, key.level).await?;
        let mut variables = Vec::with_capacity(locals.len());
        for local in locals {
            let object_name = local_object_name(handle, &local.name);
            let variable = match self.refresh_or_create(&object_name, &local.name, key).await {
                Ok(object) => self.to_variable(object).await,
                Err(err) => Variable::plain(local.name, format!("<{}>", err.message())),
            };
            variables.push(variable);
        }
        Ok(variables)
    }

    /// Update the named object, creating it when the debugger does not know it.
    async fn refresh_or_create(
        &self,
        object_name: &str,
        expression: &str,
        key: ScopeKey,
    ) -> Result<VariableObject> {
        let known = self
            .lock_state("refresh_or_create")
            .variables
            .object_by_name(object_name)
            .is_some();
        if known {
            match self.var_update(object_name).await {
                Ok(_) => {
                    let tracked = self
                        .lock_state("refresh_or_create")
                        .variables
                        .object_by_name(object_name)
                        .cloned();
                    if let Some(object) = tracked {
                        return Ok(object);
                    }
                }
                Err(err) if err.is_missing_variable_object() => {}
                Err(err) => return Err(err),
            }
        }

        let mut object = self
            .var_create(expression, Some(object_name), key.thread_id, key.level)
            .await?;
        object.expression = expression.to_string();
        Ok(object)
    }

    /// Track `object` and describe it for a variables view.
    async fn to_variable(&self, object: VariableObject) -> Variable {
        let memory_reference = self.memory_reference(&object).await;
        let compound = object.is_compound();
        let handle = self.lock_state("to_variable").variables.track_object(object.clone());
        Variable {
            name: object.expression,
            evaluate_name: Some(object.name),
            value: object.value.unwrap_or_else(|| "<unknown>".to_string()),
            type_name: object.type_name,
            reference: compound.then_some(handle),
            memory_reference,
        }
    }

    /// A memory reference for the variable's value, if it has one.
    pub async fn memory_reference(&self, object: &VariableObject) -> Option<String> {
        match object.memory_reference_hint() {
            MemoryReferenceHint::None => None,
            MemoryReferenceHint::Literal(reference) => Some(reference),
            MemoryReferenceHint::AddressOf(expression) => {
                match self.evaluate(&expression, 0, 0).await {
                    Ok(value) => crate::varobj::address_like(&value),
                    Err(err) => {
                        tracing::debug!(target: "nova.gdbmi", %expression, error = %err, "no address for array value");
                        None
                    }
                }
            }
        }
    }

    /// Read `count` bytes at `reference + offset`.
    pub async fn read_memory(&self, reference: &str, offset: i64, count: u64) -> Result<MemoryRead> {
        let address = memory::resolve_address(reference, offset)?;
        if count == 0 {
            return Ok(MemoryRead::empty(address));
        }

        let command = memory::read_command(address, count);
        let record = self.send(&command, true).await?;
        if record.class == ResultClass::Error {
            let message = record.error_message().unwrap_or_default();
            if message == UNREADABLE_MESSAGE {
                return Ok(MemoryRead::empty(address));
            }
            return Err(MiError::Command {
                message: message.to_string(),
                command,
            });
        }
        MemoryRead::from_response(&command, address, count, &record)
    }

    /// `complete` through the console interpreter. Returns the candidate
    /// lines, or nothing when the debugger has none.
    pub async fn completions(&self, text: &str) -> Result<Vec<String>> {
        let command = format!("complete \"{}\"", escape(text));
        let record = self.send(&command, true).await?;
        if record.class == ResultClass::Error {
            return Err(MiError::Command {
                message: record.error_message().unwrap_or_default().to_string(),
                command,
            });
        }
        Ok(match record.result("matches") {
            Some(list @ MiValue::List(_)) => list
                .list_values()
                .filter_map(MiValue::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        })
    }
}
