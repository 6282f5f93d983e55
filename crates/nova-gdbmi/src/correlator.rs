//! Matches `^` result records to the commands that produced them.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::{MiError, Result};
use crate::mi::{ResultClass, ResultRecord};

pub(crate) type ReplySender = oneshot::Sender<Result<ResultRecord>>;
pub type ReplyReceiver = oneshot::Receiver<Result<ResultRecord>>;

#[derive(Debug)]
struct PendingCommand {
    command: String,
    suppress_failure: bool,
    reply: ReplySender,
}

/// What happened to a result record handed to [`Correlator::resolve`].
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Delivered to the waiting caller (as success or as [`MiError::Command`]).
    Completed,
    /// An `^error` for a command sent with `suppress_failure`; the caller still
    /// received the record as a success.
    SuppressedFailure { command: String, message: String },
    /// No pending command has this token (or the record had none).
    Unmatched(ResultRecord),
}

/// Owns the token counter and the pending-command table of one session.
#[derive(Debug)]
pub struct Correlator {
    next_token: u64,
    pending: HashMap<u64, PendingCommand>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self {
            next_token: 1,
            pending: HashMap::new(),
        }
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a token for `command` and return it with the completion handle.
    ///
    /// Tokens increase monotonically and wrap on overflow, skipping zero and any
    /// token that is still pending.
    pub fn register(&mut self, command: &str, suppress_failure: bool) -> (u64, ReplyReceiver) {
        let mut token = self.next_token;
        while token == 0 || self.pending.contains_key(&token) {
            token = token.wrapping_add(1);
        }
        self.next_token = token.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            token,
            PendingCommand {
                command: command.to_string(),
                suppress_failure,
                reply: tx,
            },
        );
        (token, rx)
    }

    pub fn resolve(&mut self, record: ResultRecord) -> Resolution {
        let Some(pending) = record.token.and_then(|token| self.pending.remove(&token)) else {
            return Resolution::Unmatched(record);
        };

        if record.class != ResultClass::Error {
            let _ = pending.reply.send(Ok(record));
            return Resolution::Completed;
        }

        let message = record
            .error_message()
            .unwrap_or("Internal error")
            .to_string();
        if pending.suppress_failure {
            let _ = pending.reply.send(Ok(record));
            Resolution::SuppressedFailure {
                command: pending.command,
                message,
            }
        } else {
            let _ = pending.reply.send(Err(MiError::Command {
                message,
                command: pending.command,
            }));
            Resolution::Completed
        }
    }

    /// Forget a command whose write failed; its handle observes `err`.
    pub fn cancel(&mut self, token: u64, err: MiError) {
        if let Some(pending) = self.pending.remove(&token) {
            let _ = pending.reply.send(Err(err));
        }
    }

    /// Fail every pending command, e.g. when the debugger exits.
    pub fn fail_all(&mut self, err: impl Fn() -> MiError) {
        for (_token, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(err()));
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, token: u64) -> bool {
        self.pending.contains_key(&token)
    }
}

/// Wire form of a command: `<token>-<command>\n`.
pub fn encode_command(token: u64, command: &str) -> String {
    format!("{token}-{command}\n")
}
