use serde::{Deserialize, Serialize};

use crate::mi::MiValue;

/// A thread as reported by `-thread-info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub id: u32,
    pub target_id: String,
    pub name: Option<String>,
    /// OS thread / LWP id recovered from `target_id`.
    pub os_thread_id: Option<i64>,
}

impl ThreadInfo {
    pub fn from_mi(value: &MiValue) -> Option<Self> {
        let id = value.lookup_str("id")?.parse().ok()?;
        let target_id = value.lookup_str("target-id").unwrap_or_default().to_string();
        let name = value
            .lookup_str("name")
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let os_thread_id = os_thread_id(&target_id);
        Some(Self {
            id,
            target_id,
            name,
            os_thread_id,
        })
    }

    /// `name [tid]` when both are known, otherwise the best label available.
    pub fn display_name(&self) -> String {
        match (&self.name, self.os_thread_id) {
            (Some(name), Some(tid)) => format!("{name} [{tid}]"),
            (Some(name), None) => name.clone(),
            (None, _) if !self.target_id.is_empty() => self.target_id.clone(),
            (None, _) => "<unnamed>".to_string(),
        }
    }
}

/// Leading integer of `text` after optional whitespace and sign, like C `atol`
/// without overflow wrap.
fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

fn nonzero(value: Option<i64>) -> Option<i64> {
    value.filter(|&v| v != 0)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Recover the OS-level thread id from a debugger target id.
///
/// Recognised shapes, tried in order: `N`, `Thread N`, `Process N`,
/// `Thread ... (LWP N)` and `LWP N`.
pub fn os_thread_id(target_id: &str) -> Option<i64> {
    if let Some(tid) = nonzero(leading_int(target_id)) {
        return Some(tid);
    }

    let thread_rest = strip_prefix_ignore_case(target_id, "thread ");
    if let Some(tid) = thread_rest.and_then(|rest| nonzero(leading_int(rest))) {
        return Some(tid);
    }

    if let Some(tid) = strip_prefix_ignore_case(target_id, "process ")
        .and_then(|rest| nonzero(leading_int(rest)))
    {
        return Some(tid);
    }

    if thread_rest.is_some() {
        if let (Some(lwp), Some(paren)) = (target_id.find("(LWP "), target_id.rfind(')')) {
            let start = lwp + "(LWP ".len();
            if paren > start {
                if let Some(tid) = nonzero(leading_int(&target_id[start..paren])) {
                    return Some(tid);
                }
            }
        }
    }

    strip_prefix_ignore_case(target_id, "lwp ").and_then(|rest| nonzero(leading_int(rest)))
}

/// A DAP-style frame id packing a thread id and a frame level.
///
/// Supports thread ids up to 65535.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn pack(thread_id: u32, level: u32) -> Self {
        Self(level << 16 | (thread_id & 0xffff))
    }

    pub fn thread_id(self) -> u32 {
        self.0 & 0xffff
    }

    pub fn level(self) -> u32 {
        self.0 >> 16
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub level: u32,
    pub address: String,
    /// `func`, or the shared library (`from`) when the function is unknown.
    pub function: String,
    pub file_name: Option<String>,
    /// `fullname`, falling back to `file`.
    pub file: Option<String>,
    pub line: u32,
}

impl StackFrame {
    pub fn from_mi(frame: &MiValue) -> Option<Self> {
        let level = frame.lookup_str("level")?.parse().ok()?;
        let address = frame.lookup_str("addr").unwrap_or_default().to_string();
        let function = frame
            .lookup_str("func")
            .or_else(|| frame.lookup_str("from"))
            .unwrap_or_default()
            .to_string();
        let file_name = frame.lookup_str("file").map(str::to_string);
        let file = frame
            .lookup_str("fullname")
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .or_else(|| file_name.clone());
        let line = frame
            .lookup_str("line")
            .and_then(|line| line.parse().ok())
            .unwrap_or(0);
        Some(Self {
            level,
            address,
            function,
            file_name,
            file,
            line,
        })
    }
}
