use super::escape::c_unescape;
use super::record::{
    AsyncKind, AsyncRecord, Record, ResultClass, ResultRecord, StreamKind, StreamRecord,
};
use super::value::{MiListItem, MiResult, MiValue};

/// Parse one MI output line.
///
/// Never fails: a line that does not follow the record grammar comes back as
/// [`Record::Unhandled`] so the caller can log it and keep reading.
pub fn parse_record(line: &str) -> Record {
    let line = line.trim_end_matches('\r');
    match parse_line(line) {
        Some(record) => record,
        None => Record::Unhandled(line.to_string()),
    }
}

fn parse_line(line: &str) -> Option<Record> {
    let mut r = MiReader::new(line);
    let token = r.read_token();
    let sigil = r.next()?;

    let record = match sigil {
        b'^' => {
            let class = ResultClass::parse(r.read_class())?;
            let results = r.read_results()?;
            Record::Result(ResultRecord {
                token,
                class,
                results,
            })
        }
        b'*' | b'+' | b'=' => {
            let kind = match sigil {
                b'*' => AsyncKind::Exec,
                b'+' => AsyncKind::Status,
                _ => AsyncKind::Notify,
            };
            let class = r.read_class().to_string();
            if class.is_empty() {
                return None;
            }
            let results = r.read_results()?;
            Record::Async(AsyncRecord {
                token,
                kind,
                class,
                results,
            })
        }
        b'~' | b'@' | b'&' => {
            let kind = match sigil {
                b'~' => StreamKind::Console,
                b'@' => StreamKind::Target,
                _ => StreamKind::Log,
            };
            let text = r.read_c_string()?;
            r.expect_end()?;
            Record::Stream(StreamRecord { kind, text })
        }
        _ => return None,
    };
    Some(record)
}

struct MiReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> MiReader<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> Option<()> {
        (self.next()? == expected).then_some(())
    }

    fn expect_end(&self) -> Option<()> {
        (self.pos == self.text.len()).then_some(())
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn read_token(&mut self) -> Option<u64> {
        let digits = self.take_while(|b| b.is_ascii_digit());
        digits.parse().ok()
    }

    fn read_class(&mut self) -> &'a str {
        self.take_while(|b| b != b',')
    }

    fn read_results(&mut self) -> Option<Vec<MiResult>> {
        let mut results = Vec::new();
        while self.peek().is_some() {
            self.eat(b',')?;
            results.push(self.read_result()?);
        }
        Some(results)
    }

    fn read_result(&mut self) -> Option<MiResult> {
        let name = self.take_while(|b| b != b'=' && b != b',' && b != b'}' && b != b']');
        if name.is_empty() {
            return None;
        }
        self.eat(b'=')?;
        let value = self.read_value()?;
        Some(MiResult {
            name: name.to_string(),
            value,
        })
    }

    fn read_value(&mut self) -> Option<MiValue> {
        match self.peek()? {
            b'"' => self.read_c_string().map(MiValue::Const),
            b'{' => self.read_tuple(),
            b'[' => self.read_list(),
            _ => None,
        }
    }

    fn read_tuple(&mut self) -> Option<MiValue> {
        self.eat(b'{')?;
        let mut fields = Vec::new();
        if self.peek()? == b'}' {
            self.pos += 1;
            return Some(MiValue::Tuple(fields));
        }
        loop {
            fields.push(self.read_result()?);
            match self.next()? {
                b',' => continue,
                b'}' => return Some(MiValue::Tuple(fields)),
                _ => return None,
            }
        }
    }

    fn read_list(&mut self) -> Option<MiValue> {
        self.eat(b'[')?;
        let mut items = Vec::new();
        if self.peek()? == b']' {
            self.pos += 1;
            return Some(MiValue::List(items));
        }
        loop {
            let item = match self.peek()? {
                b'"' | b'{' | b'[' => MiListItem::Value(self.read_value()?),
                _ => MiListItem::Result(self.read_result()?),
            };
            items.push(item);
            match self.next()? {
                b',' => continue,
                b']' => return Some(MiValue::List(items)),
                _ => return None,
            }
        }
    }

    fn read_c_string(&mut self) -> Option<String> {
        self.eat(b'"')?;
        let start = self.pos;
        loop {
            match self.next()? {
                b'\\' => {
                    self.next()?;
                }
                b'"' => break,
                _ => {}
            }
        }
        Some(c_unescape(&self.text[start..self.pos - 1]))
    }
}
