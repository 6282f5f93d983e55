use thiserror::Error;

pub type Result<T, E = MiError> = std::result::Result<T, E>;

/// Errors surfaced by the MI engine.
///
/// `Command` is the common case: the debugger answered a command with an
/// `^error` result record. It keeps the debugger's message and the command
/// text that produced it so callers can report both.
#[derive(Error, Debug)]
pub enum MiError {
    #[error("{message} (from {command})")]
    Command { message: String, command: String },
    #[error("could not start debugger: {0}")]
    Launch(String),
    #[error("debugger session closed")]
    SessionClosed,
    #[error("debugger is not running")]
    NotConnected,
    #[error("malformed response to `{command}`: {detail}")]
    Decode { command: String, detail: String },
    #[error("memory read error: expected address {expected}, got {actual}")]
    MemoryAddressMismatch { expected: u64, actual: u64 },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MiError {
    pub(crate) fn decode(command: &str, detail: impl Into<String>) -> Self {
        Self::Decode {
            command: command.to_string(),
            detail: detail.into(),
        }
    }

    /// Human readable message, without the originating command.
    pub fn message(&self) -> String {
        match self {
            Self::Command { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// The command text that produced this error, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Command { command, .. } | Self::Decode { command, .. } => Some(command),
            _ => None,
        }
    }

    /// True for the messages GDB uses when a variable object name is unknown.
    pub fn is_missing_variable_object(&self) -> bool {
        match self {
            Self::Command { message, .. } => {
                message == "Variable object not found" || message.ends_with("does not exist")
            }
            _ => false,
        }
    }
}
