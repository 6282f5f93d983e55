//! Log points: breakpoints whose hit prints a message with `{expression}`
//! placeholders filled in by the debugger.
//!
//! The expressions are attached to the breakpoint as `print` commands, so the
//! debugger evaluates them itself on every hit and answers with `$N = value`
//! console lines. Values are matched to placeholders purely by arrival order.

use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;

use regex::Regex;

use crate::mi::escape;

/// Stand-in for a placeholder until its value arrives (U+FFFC, the object
/// replacement character).
pub const MARKER: &str = "\u{fffc}";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]*)\}").expect("valid placeholder regex"))
}

fn value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$[0-9]* *= *(.*)").expect("valid value regex"))
}

/// Expressions simple enough to pass to `print` inside `-break-commands`.
fn is_printable_expression(expr: &str) -> bool {
    !expr.is_empty()
        && expr.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '>' | '&' | '*' | '[' | ']')
        })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogTemplate {
    /// The message with each printable placeholder replaced by [`MARKER`].
    pub text: String,
    /// Expressions in placeholder order, one per marker.
    pub expressions: Vec<String>,
}

impl LogTemplate {
    /// Placeholders whose expression cannot be printed stay as literal text.
    pub fn parse(message: &str) -> Self {
        let mut expressions = Vec::new();
        let text = placeholder_re().replace_all(message, |caps: &regex::Captures<'_>| {
            let expr = &caps[1];
            if is_printable_expression(expr) {
                expressions.push(expr.to_string());
                MARKER.to_string()
            } else {
                caps[0].to_string()
            }
        });
        Self {
            text: text.into_owned(),
            expressions,
        }
    }

    /// `-break-commands` attaching one `print` per placeholder to breakpoint `id`.
    pub fn break_commands(&self, id: u32) -> String {
        let mut command = format!("break-commands {id}");
        for expr in &self.expressions {
            command.push_str(&format!(" \"print {}\"", escape(expr)));
        }
        command
    }

    fn fill(&self, values: &[Option<String>]) -> String {
        let mut out = String::with_capacity(self.text.len());
        for (i, part) in self.text.split(MARKER).enumerate() {
            if i > 0 {
                match values.get(i - 1) {
                    Some(Some(value)) => out.push_str(value),
                    _ => out.push_str(MARKER),
                }
            }
            out.push_str(part);
        }
        out
    }
}

#[derive(Debug)]
struct Collector {
    template: LogTemplate,
    values: Vec<Option<String>>,
}

impl Collector {
    fn is_complete(&self) -> bool {
        self.values.len() >= self.template.expressions.len()
    }
}

/// Log templates by breakpoint id, plus the hits still waiting for values.
#[derive(Debug, Default)]
pub struct LogPoints {
    templates: HashMap<u32, LogTemplate>,
    pending: VecDeque<Collector>,
}

impl LogPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: u32, template: LogTemplate) {
        self.templates.insert(id, template);
    }

    pub fn remove(&mut self, id: u32) {
        self.templates.remove(&id);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.templates.contains_key(&id)
    }

    /// A log-point breakpoint was hit. Returns the message right away when it
    /// has no placeholders; otherwise starts collecting values.
    pub fn on_hit(&mut self, id: u32) -> Option<String> {
        let template = self.templates.get(&id)?.clone();
        let collector = Collector {
            template,
            values: Vec::new(),
        };
        if collector.is_complete() {
            return Some(collector.template.fill(&[]));
        }
        self.pending.push_back(collector);
        None
    }

    /// Feed a console stream line. Lines starting with `$` belong to the oldest
    /// pending hit; a `$` line that is not `$N = value` leaves its marker unresolved.
    pub fn on_console(&mut self, text: &str) -> Option<String> {
        if !text.starts_with('$') {
            return None;
        }
        let collector = self.pending.front_mut()?;
        let value = value_re()
            .captures(text.trim_end())
            .map(|caps| caps[1].trim().to_string());
        if value.is_none() {
            tracing::debug!(target: "nova.gdbmi", line = text, "unrecognised log point value");
        }
        collector.values.push(value);

        if !collector.is_complete() {
            return None;
        }
        let collector = self.pending.pop_front()?;
        Some(collector.template.fill(&collector.values))
    }
}
