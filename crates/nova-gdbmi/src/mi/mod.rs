//! MI wire format: line splitting, record grammar and c-string escapes.

mod escape;
mod lines;
mod parser;
mod record;
mod value;

pub use escape::{c_escape, c_unescape, escape, quote};
pub use lines::{classify, could_be_output, is_flushable_partial, is_prompt, LineBuffer, OutputLine};
pub use parser::parse_record;
pub use record::{
    AsyncKind, AsyncRecord, Record, ResultClass, ResultRecord, StreamKind, StreamRecord,
};
pub use value::{lookup, MiListItem, MiResult, MiValue};
