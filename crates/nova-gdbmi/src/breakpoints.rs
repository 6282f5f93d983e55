use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{MiError, Result};
use crate::mi::{escape, ResultRecord};

/// Where a breakpoint is placed; also its identity in the installed table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointLocation {
    /// A debugger location string passed through verbatim (`main`, `*0x4005d0`, ...).
    Raw(String),
    Source { file: String, line: u32 },
}

impl BreakpointLocation {
    /// The quoted location argument of `-break-insert`.
    pub fn to_mi(&self) -> String {
        match self {
            Self::Raw(raw) => format!("\"{}\"", escape(raw)),
            Self::Source { file, line } => format!("\"{}:{line}\"", escape(file)),
        }
    }
}

/// Front-end breakpoint description. Either `raw` or `file` + `line` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointDescriptor {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    /// `N` breaks once after N hits, `>N` ignores the first N hits.
    #[serde(default)]
    pub hit_condition: Option<String>,
    /// Template with `{expression}` placeholders.
    #[serde(default)]
    pub log_message: Option<String>,
}

impl BreakpointDescriptor {
    pub fn source(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(file.into()),
            line: Some(line),
            ..Self::default()
        }
    }

    pub fn raw(location: impl Into<String>) -> Self {
        Self {
            raw: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn location(&self) -> Result<BreakpointLocation> {
        if let Some(raw) = &self.raw {
            return Ok(BreakpointLocation::Raw(raw.clone()));
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Ok(BreakpointLocation::Source {
                file: file.clone(),
                line,
            }),
            _ => Err(MiError::InvalidArgument(
                "breakpoint needs a raw location or a file and line".to_string(),
            )),
        }
    }

    pub fn hit_count_policy(&self) -> Option<HitCountPolicy> {
        self.hit_condition
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(HitCountPolicy::parse)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HitCountPolicy {
    /// `>N`: ignore the first N hits.
    SkipFirst(u32),
    /// `N`: stop once, on the Nth hit. `0` means no hit-count modifier.
    BreakAfter(u32),
    /// Anything else; degrades to a one-shot breakpoint.
    Unsupported(String),
}

impl HitCountPolicy {
    pub fn parse(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix('>') {
            return match first_number(rest) {
                Some((count, _)) => Self::SkipFirst(count),
                None => Self::Unsupported(text.to_string()),
            };
        }
        match first_number(text) {
            Some((count, digits)) if digits.len() == text.len() => Self::BreakAfter(count),
            _ => Self::Unsupported(text.to_string()),
        }
    }

    /// Modifiers for `-break-insert`, each followed by a space.
    pub fn modifiers(&self) -> String {
        match self {
            Self::SkipFirst(count) => format!("-i {count} "),
            Self::BreakAfter(0) => String::new(),
            Self::BreakAfter(count) => format!("-t -i {count} "),
            Self::Unsupported(_) => "-t ".to_string(),
        }
    }
}

/// The first run of digits in `text` and its value.
fn first_number(text: &str) -> Option<(u32, &str)> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let digits = &rest[..end];
    Some((digits.parse().ok()?, digits))
}

/// The full `-break-insert` command for a descriptor.
pub fn insert_command(location: &BreakpointLocation, policy: Option<&HitCountPolicy>) -> String {
    let modifiers = policy.map(HitCountPolicy::modifiers).unwrap_or_default();
    format!("break-insert -f {modifiers}{}", location.to_mi())
}

/// A breakpoint the debugger accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub id: u32,
    pub location: BreakpointLocation,
    /// The requested file, or the one the debugger resolved.
    pub file: Option<String>,
    pub line: Option<u32>,
    pub condition: Option<String>,
    pub log_message: Option<String>,
}

impl Breakpoint {
    /// Build from the `bkpt` tuple of a `-break-insert` response.
    pub(crate) fn from_insert_response(
        command: &str,
        location: BreakpointLocation,
        descriptor: &BreakpointDescriptor,
        record: &ResultRecord,
    ) -> Result<Self> {
        let id = record
            .result_str("bkpt.number")
            .and_then(|number| number.parse().ok())
            .ok_or_else(|| MiError::decode(command, "missing bkpt.number"))?;
        let file = descriptor
            .file
            .clone()
            .or_else(|| record.result_str("bkpt.file").map(str::to_string));
        let line = record
            .result_str("bkpt.line")
            .and_then(|line| line.parse().ok());
        Ok(Self {
            id,
            location,
            file,
            line,
            condition: descriptor.condition.clone(),
            log_message: descriptor.log_message.clone(),
        })
    }
}

/// Outcome of adding a breakpoint.
#[derive(Debug)]
pub enum AddBreakpoint {
    Added(Breakpoint),
    /// A breakpoint with the same location is installed (or being installed).
    AlreadyInstalled,
    /// Installed, but setting its condition or log message failed.
    Degraded { breakpoint: Breakpoint, error: MiError },
}

impl AddBreakpoint {
    pub fn is_new(&self) -> bool {
        !matches!(self, Self::AlreadyInstalled)
    }

    pub fn breakpoint(&self) -> Option<&Breakpoint> {
        match self {
            Self::Added(breakpoint) | Self::Degraded { breakpoint, .. } => Some(breakpoint),
            Self::AlreadyInstalled => None,
        }
    }
}

/// Installed breakpoints keyed by location.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    installed: HashMap<BreakpointLocation, Breakpoint>,
    in_flight: HashSet<BreakpointLocation>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `location` for installation. False if it is installed or another
    /// add for it is still waiting on the debugger.
    pub fn begin_add(&mut self, location: &BreakpointLocation) -> bool {
        if self.installed.contains_key(location) || self.in_flight.contains(location) {
            return false;
        }
        self.in_flight.insert(location.clone());
        true
    }

    /// Release a claim from [`Self::begin_add`], recording the breakpoint if it was installed.
    pub fn finish_add(&mut self, location: &BreakpointLocation, installed: Option<Breakpoint>) {
        self.in_flight.remove(location);
        if let Some(breakpoint) = installed {
            self.installed.insert(location.clone(), breakpoint);
        }
    }

    pub fn get(&self, location: &BreakpointLocation) -> Option<&Breakpoint> {
        self.installed.get(location)
    }

    pub fn by_id(&self, id: u32) -> Option<&Breakpoint> {
        self.installed.values().find(|bp| bp.id == id)
    }

    pub fn remove(&mut self, location: &BreakpointLocation) -> Option<Breakpoint> {
        self.installed.remove(location)
    }

    /// Remove and return every breakpoint whose file equals `source`.
    pub fn take_source(&mut self, source: Option<&str>) -> Vec<Breakpoint> {
        let (taken, kept): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(&mut self.installed)
            .into_iter()
            .partition(|(_, bp)| bp.file.as_deref() == source);
        self.installed = kept;
        let mut taken: Vec<Breakpoint> = taken.into_values().collect();
        taken.sort_by_key(|bp| bp.id);
        taken
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.installed.values()
    }
}
