//! Parser for `p4 -ztag` tagged output.
//!
//! Tagged mode prints one field per line as `... <name> <value>` and separates
//! records with a blank line. Values may span several lines: any unmarked line
//! that follows a field belongs to that field. The format has no escaping or
//! length prefixes, so attribution is purely positional and the parser has to
//! walk the lines in order, remembering the last field it set.

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{P4Error, ZtagError};
use crate::parsers::OutputParser;

/// One logical item (a counter, a change, a user) as field name → value.
pub type Record = BTreeMap<String, String>;

static TAG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.\.\. ([a-zA-Z0-9]+) (.*)$").expect("Invalid tag line regex")
});

/// Incremental line-by-line state machine behind [`parse`].
///
/// Feed it lines (without their terminators) through [`TagReader::push_line`];
/// every completed record is handed back as soon as its closing blank line is
/// seen. Call [`TagReader::finish`] at end of input to flush the last record.
#[derive(Debug, Default)]
pub struct TagReader {
    current: Record,
    last_tag: Option<String>,
    line: usize,
}

impl TagReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line. Returns a record when `line` is a blank terminator
    /// closing a non-empty record.
    pub fn push_line(&mut self, line: &str) -> Result<Option<Record>, ZtagError> {
        self.line += 1;

        if line.is_empty() {
            self.last_tag = None;
            if self.current.is_empty() {
                return Ok(None);
            }
            return Ok(Some(std::mem::take(&mut self.current)));
        }

        if let Some(caps) = TAG_LINE.captures(line) {
            let name = caps[1].to_string();
            self.current.insert(name.clone(), caps[2].to_string());
            self.last_tag = Some(name);
            return Ok(None);
        }

        // Continuation of the last field, which must exist in this record.
        if let Some(tag) = &self.last_tag
            && let Some(value) = self.current.get_mut(tag)
        {
            value.push('\n');
            value.push_str(line);
            return Ok(None);
        }

        Err(ZtagError::Malformed {
            line: self.line,
            content: line.to_string(),
        })
    }

    /// Flush the in-progress record, if it holds any field.
    pub fn finish(self) -> Option<Record> {
        (!self.current.is_empty()).then_some(self.current)
    }
}

/// Strip one `\n` or `\r\n` terminator and decode the line.
///
/// Invalid UTF-8 is a read error (`InvalidData`), as with `BufRead::lines`.
/// Servers with a non-Unicode charset need `P4CHARSET` set so `p4` transcodes.
fn decode_line(buf: &[u8]) -> Result<&str, ZtagError> {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    let buf = buf.strip_suffix(b"\r").unwrap_or(buf);
    std::str::from_utf8(buf)
        .map_err(|e| ZtagError::Read(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Parse a whole tagged stream into records, in the order they close.
///
/// Fails on the first malformed line; records collected before it are
/// discarded. Read errors from `reader` propagate as [`ZtagError::Read`].
pub fn parse<R: BufRead>(mut reader: R) -> Result<Vec<Record>, ZtagError> {
    let mut records = Vec::new();
    let mut state = TagReader::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if let Some(record) = state.push_line(decode_line(&buf)?)? {
            records.push(record);
        }
    }

    records.extend(state.finish());
    Ok(records)
}

/// Async counterpart of [`parse`], for reading straight from a pipe.
pub async fn parse_async<R>(mut reader: R) -> Result<Vec<Record>, ZtagError>
where
    R: AsyncBufRead + Unpin,
{
    let mut records = Vec::new();
    let mut state = TagReader::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if let Some(record) = state.push_line(decode_line(&buf)?)? {
            records.push(record);
        }
    }

    records.extend(state.finish());
    Ok(records)
}

pub fn parse_bytes(data: &[u8]) -> Result<Vec<Record>, ZtagError> {
    parse(data)
}

/// Render a record back into tagged form, fields in key order.
///
/// Multi-line values are written verbatim, so they only round-trip when none
/// of their continuation lines is blank or itself looks like a tagged line.
pub fn to_tagged(record: &Record) -> String {
    record
        .iter()
        .map(|(name, value)| format!("... {name} {value}\n"))
        .collect()
}

/// Render several records, separated by blank lines.
pub fn write_records(records: &[Record]) -> String {
    records
        .iter()
        .map(to_tagged)
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`OutputParser`] adapter for tagged command output.
pub struct ZtagParser;

impl OutputParser for ZtagParser {
    type Output = Vec<Record>;

    fn parse(&self, stdout: &[u8]) -> Result<Vec<Record>, P4Error> {
        Ok(parse_bytes(stdout)?)
    }
}
