//! Engine for driving GDB (and `lldb-mi`) through the machine interface.
//!
//! A [`Session`] owns one debugger process, local or over SSH. It writes
//! token-prefixed MI commands, correlates the `^` result records with the
//! callers waiting on them and turns everything else the debugger prints into
//! a typed [`SessionEvent`] stream. Breakpoints, log points, variable objects
//! and thread/frame identities are tracked on the session so a front end can
//! hand out stable handles.

pub mod breakpoints;
pub mod config;
pub mod correlator;
pub mod error;
pub mod event;
pub mod logpoint;
pub mod memory;
pub mod mi;
pub mod session;
pub mod thread;
pub mod transport;
pub mod varobj;

mod poison;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use breakpoints::{AddBreakpoint, Breakpoint, BreakpointDescriptor, BreakpointLocation};
pub use config::{init_tracing, ConfigError, DebuggerFlavor, GdbMiConfig};
pub use error::{MiError, Result};
pub use event::{MessageChannel, RunState, SessionEvent, StopReason, StoppedEvent};
pub use memory::MemoryRead;
pub use session::{
    AttachArgs, ConnectArgs, LoadArgs, Register, Scope, Session, SshLaunch, StackVariable,
    Variable,
};
pub use thread::{FrameId, StackFrame, ThreadInfo};
pub use transport::{SshArgs, SshAuth, Transport};
pub use varobj::{VariableHandle, VariableObject};
