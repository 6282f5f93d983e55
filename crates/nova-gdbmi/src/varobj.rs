//! Debugger variable objects and the handle table that keeps front-end
//! references to them stable across refreshes.

use std::collections::HashMap;

use serde::Serialize;

use crate::mi::MiValue;

/// MI flags are `"0"`/`"1"` strings; a missing field is false.
fn flag(value: Option<&str>) -> bool {
    !matches!(value, None | Some("") | Some("0") | Some("false"))
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// One `-var-create` / `-var-list-children` object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VariableObject {
    /// Debugger-side object name.
    pub name: String,
    /// Display expression (`exp`); for children, the field or index.
    pub expression: String,
    pub numchild: u32,
    pub type_name: Option<String>,
    pub value: Option<String>,
    pub thread_id: Option<String>,
    pub frozen: bool,
    pub dynamic: bool,
    pub display_hint: Option<String>,
    pub has_more: bool,
}

impl VariableObject {
    pub fn from_mi(node: &MiValue) -> Option<Self> {
        Some(Self {
            name: node.lookup_str("name")?.to_string(),
            expression: node.lookup_str("exp").unwrap_or_default().to_string(),
            numchild: node
                .lookup_str("numchild")
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
            type_name: owned(node.lookup_str("type")),
            value: owned(node.lookup_str("value")),
            thread_id: owned(node.lookup_str("thread-id")),
            frozen: flag(node.lookup_str("frozen")),
            dynamic: flag(node.lookup_str("dynamic")),
            display_hint: owned(node.lookup_str("displayhint")),
            has_more: flag(node.lookup_str("has_more")),
        })
    }

    /// Patch this object from one `-var-update` changelist entry.
    pub fn apply_changes(&mut self, change: &MiValue) {
        self.value = owned(change.lookup_str("value"));
        if flag(change.lookup_str("type_changed")) {
            if let Some(new_type) = change.lookup_str("new_type") {
                self.type_name = Some(new_type.to_string());
            }
        }
        self.dynamic = flag(change.lookup_str("dynamic"));
        self.display_hint = owned(change.lookup_str("displayhint"));
        self.has_more = flag(change.lookup_str("has_more"));
    }

    /// Whether the front end should offer to expand this object.
    pub fn is_compound(&self) -> bool {
        self.numchild > 0
            || self.value.as_deref() == Some("{...}")
            || (self.dynamic && matches!(self.display_hint.as_deref(), Some("array" | "map")))
    }

    /// How to turn this object into a memory reference for a read.
    pub fn memory_reference_hint(&self) -> MemoryReferenceHint {
        let value = self.value.as_deref().unwrap_or_default();
        if value.is_empty() {
            return MemoryReferenceHint::None;
        }
        // Arrays print as `[N]` without an address.
        if value.starts_with('[') && value.ends_with(']') {
            return MemoryReferenceHint::AddressOf(format!("&({})", self.expression));
        }
        address_like(value)
            .map(MemoryReferenceHint::Literal)
            .unwrap_or(MemoryReferenceHint::None)
    }
}

/// Reduce a printed value to something usable as a memory reference: struct
/// values `{...} 0x1234` keep the text after the closing brace, everything
/// else must start with a number.
pub(crate) fn address_like(value: &str) -> Option<String> {
    let value = match value.strip_prefix('{') {
        Some(rest) => rest[rest.find('}')? + 1..].trim(),
        None => value,
    };
    crate::memory::parse_address(value).map(|_| value.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryReferenceHint {
    None,
    Literal(String),
    /// Evaluate this expression; its value is the reference.
    AddressOf(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Locals,
    Registers,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locals => "locals",
            Self::Registers => "registers",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeKey {
    pub kind: ScopeKind,
    pub thread_id: u32,
    pub level: u32,
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind.as_str(), self.thread_id, self.level)
    }
}

/// Opaque, non-zero reference handed to the front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VariableHandle(u32);

impl VariableHandle {
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug)]
pub enum HandleEntry {
    Scope(ScopeKey),
    Object(VariableObject),
}

/// Arena of scopes and variable objects plus reverse indexes from their
/// stable keys (scope key, object name) to handles.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    next_handle: u32,
    entries: HashMap<VariableHandle, HandleEntry>,
    scopes: HashMap<ScopeKey, VariableHandle>,
    objects: HashMap<String, VariableHandle>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, entry: HandleEntry) -> VariableHandle {
        let handle = VariableHandle(self.next_handle.max(1));
        self.next_handle = handle.0.saturating_add(1);
        self.entries.insert(handle, entry);
        handle
    }

    pub fn scope_handle(&mut self, key: ScopeKey) -> VariableHandle {
        if let Some(handle) = self.scopes.get(&key) {
            return *handle;
        }
        let handle = self.allocate(HandleEntry::Scope(key));
        self.scopes.insert(key, handle);
        handle
    }

    /// Register `object`, reusing the handle of an object with the same name.
    /// A reused entry is overwritten with the fresh data.
    pub fn track_object(&mut self, object: VariableObject) -> VariableHandle {
        if let Some(handle) = self.objects.get(&object.name).copied() {
            self.entries.insert(handle, HandleEntry::Object(object));
            return handle;
        }
        let name = object.name.clone();
        let handle = self.allocate(HandleEntry::Object(object));
        self.objects.insert(name, handle);
        handle
    }

    pub fn entry(&self, handle: VariableHandle) -> Option<&HandleEntry> {
        self.entries.get(&handle)
    }

    pub fn object(&self, handle: VariableHandle) -> Option<&VariableObject> {
        match self.entries.get(&handle)? {
            HandleEntry::Object(object) => Some(object),
            HandleEntry::Scope(_) => None,
        }
    }

    pub fn handle_for(&self, name: &str) -> Option<VariableHandle> {
        self.objects.get(name).copied()
    }

    pub fn object_by_name(&self, name: &str) -> Option<&VariableObject> {
        self.object(self.handle_for(name)?)
    }

    /// Apply a `-var-update` changelist entry to the object it names, if known.
    pub fn apply_change(&mut self, change: &MiValue) -> Option<VariableHandle> {
        let handle = self.handle_for(change.lookup_str("name")?)?;
        if let Some(HandleEntry::Object(object)) = self.entries.get_mut(&handle) {
            object.apply_changes(change);
        }
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
