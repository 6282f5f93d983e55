use super::value::{lookup, MiResult, MiValue};

/// Class of a `^` result record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl ResultClass {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "done" => Self::Done,
            "running" => Self::Running,
            "connected" => Self::Connected,
            "error" => Self::Error,
            "exit" => Self::Exit,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Running => "running",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Exit => "exit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*`
    Exec,
    /// `+`
    Status,
    /// `=`
    Notify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// `~`
    Console,
    /// `@`
    Target,
    /// `&`
    Log,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub results: Vec<MiResult>,
}

impl ResultRecord {
    pub fn result(&self, path: &str) -> Option<&MiValue> {
        lookup(&self.results, path)
    }

    pub fn result_str(&self, path: &str) -> Option<&str> {
        self.result(path).and_then(MiValue::as_str)
    }

    /// The `msg` field of an `^error` record.
    pub fn error_message(&self) -> Option<&str> {
        self.result_str("msg")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsyncRecord {
    pub token: Option<u64>,
    pub kind: AsyncKind,
    pub class: String,
    pub results: Vec<MiResult>,
}

impl AsyncRecord {
    pub fn field(&self, path: &str) -> Option<&str> {
        lookup(&self.results, path).and_then(MiValue::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

/// One parsed MI output line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
    /// A line that looked like MI but did not parse; kept for diagnostics.
    Unhandled(String),
}
