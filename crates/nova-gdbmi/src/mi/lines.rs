use super::parser::parse_record;
use super::record::Record;

/// Splits a byte stream into lines, carrying incomplete lines across chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let Some(end) = self.buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buf.split_off(end + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        complete[..end]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Take the pending partial line if `accept` agrees it can be flushed now.
    ///
    /// A partial line ending inside a UTF-8 sequence is always kept.
    pub fn take_partial_if(&mut self, accept: impl FnOnce(&str) -> bool) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let text = std::str::from_utf8(&self.buf).ok()?;
        if !accept(text) {
            return None;
        }
        let text = text.to_string();
        self.buf.clear();
        Some(text)
    }

    /// Take whatever is buffered, regardless of content.
    pub fn take_all(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(text)
    }
}

/// Strip an optional numeric token prefix.
fn strip_token(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// True unless the line starts like an MI record (optional token, then a sigil).
pub fn could_be_output(line: &str) -> bool {
    !matches!(
        strip_token(line).as_bytes().first(),
        Some(b'*' | b'+' | b'=' | b'~' | b'@' | b'&' | b'^')
    )
}

/// True for the interactive `(gdb)` prompt.
pub fn is_prompt(line: &str) -> bool {
    strip_token(line.trim_start()).starts_with("(gdb)")
}

/// A partial line may be shown immediately only when it cannot turn into a
/// record once the rest arrives. A run of digits might still be a token.
pub fn is_flushable_partial(text: &str) -> bool {
    could_be_output(text) && !text.bytes().all(|b| b.is_ascii_digit())
}

/// What the engine should do with one complete line of debugger stdout.
#[derive(Debug, PartialEq, Eq)]
pub enum OutputLine {
    /// Plain text (program output, banners) forwarded as-is.
    Passthrough(String),
    Prompt,
    Record(Record),
}

pub fn classify(line: &str) -> OutputLine {
    if could_be_output(line) {
        if is_prompt(line) {
            OutputLine::Prompt
        } else {
            OutputLine::Passthrough(line.to_string())
        }
    } else {
        OutputLine::Record(parse_record(line))
    }
}
