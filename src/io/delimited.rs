//! Quote- and escape-aware delimited text codec.
//!
//! This module provides:
//! - **Field-level reading** with explicit end signals: [`DelimitedReader::read_field`]
//! - **Record-level reading** bound to a [`Descriptor`]: [`DelimitedRecords`]
//! - **Field-level writing** with configurable quoting: [`DelimitedWriter`]
//!
//! # Signals
//! [`DelimitedReader::read_field`] distinguishes three outcomes that a plain
//! `Option<String>` would blur:
//! - `Field::Value("")` is an empty field,
//! - `Field::EndOfLine` terminates the current record,
//! - `Field::EndOfData` means the stream ended cleanly.
//!
//! # Design notes
//! - The reader works on bytes; separator, quote and escape must be ASCII, so
//!   multi-byte UTF-8 sequences can never be split by a control character.
//! - Whitespace around a quoted field is always skipped. With `trim` enabled,
//!   unquoted values and the inside of quoted values are trimmed as well.
//! - The writer is a thin layer over `csv::Writer`, whose `QuoteStyle` matches
//!   [`QuoteLevel`] one to one. `csv` only escapes the quote character, so a
//!   dialect with an escape character is quoted here and handed to `csv`
//!   verbatim; inside quotes both the quote and the escape are escaped.

use crate::error::{Error, ParseErrorKind, Result};
use crate::record::{Descriptor, Record};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// When the writer wraps a field in quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteLevel {
    /// Never quote. Fields containing the separator produce ambiguous output.
    Never,
    /// Quote only when the field contains the separator, the quote character
    /// or a line break.
    #[default]
    Minimal,
    /// Quote every field.
    Always,
}

impl From<QuoteLevel> for QuoteStyle {
    fn from(level: QuoteLevel) -> Self {
        match level {
            QuoteLevel::Never => QuoteStyle::Never,
            QuoteLevel::Minimal => QuoteStyle::Necessary,
            QuoteLevel::Always => QuoteStyle::Always,
        }
    }
}

/// Dialect of a delimited file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    pub separator: char,
    pub quote: char,
    /// Escape character inside quoted fields. `None` means quotes are escaped
    /// by doubling them.
    pub escape: Option<char>,
    /// Allow line breaks inside quoted fields.
    pub multiline: bool,
    pub trim: bool,
    pub quote_level: QuoteLevel,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::comma()
    }
}

impl Dialect {
    #[must_use]
    pub fn comma() -> Self {
        Self {
            separator: ',',
            quote: '"',
            escape: None,
            multiline: true,
            trim: false,
            quote_level: QuoteLevel::Minimal,
        }
    }

    #[must_use]
    pub fn semicolon() -> Self {
        Self {
            separator: ';',
            ..Self::comma()
        }
    }

    #[must_use]
    pub fn tab() -> Self {
        Self {
            separator: '\t',
            ..Self::comma()
        }
    }

    #[must_use]
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    #[must_use]
    pub fn with_quote_level(mut self, level: QuoteLevel) -> Self {
        self.quote_level = level;
        self
    }

    #[must_use]
    pub fn with_escape(mut self, escape: Option<char>) -> Self {
        self.escape = escape;
        self
    }

    #[must_use]
    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    /// Check that the control characters are ASCII and distinct.
    ///
    /// # Errors
    /// [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.bytes().map(|_| ())
    }

    fn bytes(&self) -> Result<DialectBytes> {
        let ascii = |c: char, what: &str| -> Result<u8> {
            if c.is_ascii() && c != '\n' && c != '\r' {
                Ok(c as u8)
            } else {
                Err(Error::Config(format!("{what} {c:?} must be a single ASCII character")))
            }
        };
        let separator = ascii(self.separator, "separator")?;
        let quote = ascii(self.quote, "quote")?;
        let escape = self.escape.map(|e| ascii(e, "escape")).transpose()?;
        if separator == quote {
            return Err(Error::Config("separator and quote must differ".into()));
        }
        if escape == Some(separator) {
            return Err(Error::Config("separator and escape must differ".into()));
        }
        Ok(DialectBytes {
            separator,
            quote,
            escape,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct DialectBytes {
    separator: u8,
    quote: u8,
    escape: Option<u8>,
}

/// Outcome of one [`DelimitedReader::read_field`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Value(String),
    /// The current record ended.
    EndOfLine,
    /// The stream ended cleanly.
    EndOfData,
}

/// Field-at-a-time reader over a buffered byte stream.
pub struct DelimitedReader<R> {
    inner: R,
    dialect: Dialect,
    bytes: DialectBytes,
    /// 1-based physical line of the next byte.
    line: u64,
    /// A field was read on the current record and the record is still open.
    in_record: bool,
    eol_pending: bool,
    records: u64,
}

impl<R: BufRead> DelimitedReader<R> {
    /// # Errors
    /// [`Error::Config`] if the dialect is invalid.
    pub fn new(inner: R, dialect: Dialect) -> Result<Self> {
        let bytes = dialect.bytes()?;
        Ok(Self {
            inner,
            dialect,
            bytes,
            line: 1,
            in_record: false,
            eol_pending: false,
            records: 0,
        })
    }

    #[must_use]
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Physical line the reader is positioned on (1-based).
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Number of records completed so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Read the next field.
    ///
    /// # Errors
    /// - [`Error::Io`] if the underlying stream fails.
    /// - [`Error::Parse`] with `MissingQuoteClose`, `MalformedEscape`,
    ///   `MissingSeparator` or `Syntax` (invalid UTF-8).
    pub fn read_field(&mut self) -> Result<Field> {
        if self.eol_pending {
            self.eol_pending = false;
            return Ok(self.end_record());
        }
        let Some(b) = self.peek()? else {
            return Ok(if self.in_record {
                self.end_record()
            } else {
                Field::EndOfData
            });
        };
        if !self.in_record && (b == b'\n' || b == b'\r') {
            // blank line
            self.consume_newline()?;
            return Ok(Field::EndOfLine);
        }
        self.in_record = true;
        self.read_value().map(Field::Value)
    }

    /// Read the remaining fields of the next non-blank record.
    ///
    /// Returns `Ok(None)` at end of data.
    ///
    /// # Errors
    /// See [`read_field`](Self::read_field).
    pub fn read_record(&mut self) -> Result<Option<Vec<String>>> {
        let mut fields = Vec::new();
        loop {
            match self.read_field()? {
                Field::Value(v) => fields.push(v),
                Field::EndOfLine if fields.is_empty() => {}
                Field::EndOfLine => return Ok(Some(fields)),
                Field::EndOfData => return Ok(None),
            }
        }
    }

    /// Read the header row.
    ///
    /// # Errors
    /// [`Error::Parse`] with `MissingHeader` if the stream holds no record.
    pub fn read_header(&mut self) -> Result<Vec<String>> {
        self.read_record()?.ok_or_else(|| {
            Error::parse(ParseErrorKind::MissingHeader, self.line, "stream is empty")
        })
    }

    /// Bind this reader to `descriptor` and iterate typed records.
    ///
    /// With `has_header`, columns are matched to descriptor fields by name and
    /// may appear in any order; otherwise columns are positional.
    ///
    /// # Errors
    /// [`Error::Parse`] with `MissingHeader` if the header is absent or lacks a
    /// declared field.
    pub fn into_records(mut self, descriptor: &Descriptor, has_header: bool) -> Result<DelimitedRecords<R>> {
        let columns = if has_header {
            let header = self.read_header()?;
            descriptor
                .field_names()
                .map(|name| {
                    header.iter().position(|h| h == name).ok_or_else(|| {
                        Error::parse(
                            ParseErrorKind::MissingHeader,
                            1,
                            format!("header lacks column '{name}'"),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            (0..descriptor.len()).collect()
        };
        Ok(DelimitedRecords {
            reader: self,
            columns,
        })
    }

    fn end_record(&mut self) -> Field {
        self.in_record = false;
        self.records += 1;
        Field::EndOfLine
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self
            .inner
            .fill_buf()
            .map_err(|e| Error::io("read delimited stream", e))?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) {
        self.inner.consume(1);
    }

    /// Consume `\n`, `\r\n` or a lone `\r`.
    fn consume_newline(&mut self) -> Result<()> {
        if self.peek()? == Some(b'\r') {
            self.bump();
            if self.peek()? == Some(b'\n') {
                self.bump();
            }
        } else {
            self.bump();
        }
        self.line += 1;
        Ok(())
    }

    fn is_blank(&self, b: u8) -> bool {
        (b == b' ' || b == b'\t') && b != self.bytes.separator
    }

    fn skip_blanks(&mut self) -> Result<()> {
        while let Some(b) = self.peek()? {
            if !self.is_blank(b) {
                break;
            }
            self.bump();
        }
        Ok(())
    }

    fn read_value(&mut self) -> Result<String> {
        let start_line = self.line;
        let mut raw = Vec::new();
        // Leading blanks are kept aside: they belong to an unquoted value but
        // are dropped in front of a quoted one.
        while let Some(b) = self.peek()? {
            if !self.is_blank(b) {
                break;
            }
            raw.push(b);
            self.bump();
        }
        if self.peek()? == Some(self.bytes.quote) {
            self.bump();
            let quoted = self.read_quoted(start_line)?;
            return self.finish(quoted, start_line);
        }
        loop {
            match self.peek()? {
                None => break,
                Some(b) if b == self.bytes.separator => {
                    self.bump();
                    break;
                }
                Some(b'\n' | b'\r') => {
                    self.consume_newline()?;
                    self.eol_pending = true;
                    break;
                }
                Some(b) => {
                    raw.push(b);
                    self.bump();
                }
            }
        }
        self.finish(raw, start_line)
    }

    /// Read the inside of a quoted value, then step past the closing quote,
    /// trailing blanks and the following separator or line break.
    fn read_quoted(&mut self, start_line: u64) -> Result<Vec<u8>> {
        let quote = self.bytes.quote;
        let mut out = Vec::new();
        loop {
            let Some(b) = self.peek()? else {
                return Err(Error::parse(
                    ParseErrorKind::MissingQuoteClose,
                    start_line,
                    "end of data inside quoted field",
                ));
            };
            if Some(b) == self.bytes.escape && b != quote {
                self.bump();
                match self.peek()? {
                    Some(next) if next == quote || Some(next) == self.bytes.escape => {
                        out.push(next);
                        self.bump();
                    }
                    other => {
                        return Err(Error::parse(
                            ParseErrorKind::MalformedEscape,
                            self.line,
                            format!("escape followed by {:?}", other.map(char::from)),
                        ));
                    }
                }
            } else if b == quote {
                self.bump();
                if self.peek()? == Some(quote) {
                    out.push(quote);
                    self.bump();
                } else {
                    break;
                }
            } else if b == b'\n' || b == b'\r' {
                if !self.dialect.multiline {
                    return Err(Error::parse(
                        ParseErrorKind::MissingQuoteClose,
                        start_line,
                        "line break inside quoted field",
                    ));
                }
                if b == b'\r' {
                    self.bump();
                    if self.peek()? == Some(b'\n') {
                        self.bump();
                    }
                    out.push(b'\n');
                } else {
                    self.bump();
                    out.push(b'\n');
                }
                self.line += 1;
            } else {
                out.push(b);
                self.bump();
            }
        }
        self.skip_blanks()?;
        match self.peek()? {
            None => {}
            Some(b) if b == self.bytes.separator => self.bump(),
            Some(b'\n' | b'\r') => {
                self.consume_newline()?;
                self.eol_pending = true;
            }
            Some(other) => {
                return Err(Error::parse(
                    ParseErrorKind::MissingSeparator,
                    self.line,
                    format!("unexpected {:?} after closing quote", char::from(other)),
                ));
            }
        }
        Ok(out)
    }

    fn finish(&self, raw: Vec<u8>, line: u64) -> Result<String> {
        let s = String::from_utf8(raw)
            .map_err(|e| Error::parse(ParseErrorKind::Syntax, line, format!("invalid UTF-8: {e}")))?;
        Ok(if self.dialect.trim {
            s.trim().to_string()
        } else {
            s
        })
    }
}

/// Typed record iterator produced by [`DelimitedReader::into_records`].
pub struct DelimitedRecords<R> {
    reader: DelimitedReader<R>,
    /// Column index for each descriptor field.
    columns: Vec<usize>,
}

impl<R: BufRead> DelimitedRecords<R> {
    /// Next record, or `Ok(None)` at end of data.
    ///
    /// # Errors
    /// See [`DelimitedReader::read_field`].
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(row) = self.reader.read_record()? else {
            return Ok(None);
        };
        let values = self
            .columns
            .iter()
            .map(|&c| row.get(c).cloned().unwrap_or_default())
            .collect();
        Ok(Some(Record::new(values)))
    }

    #[must_use]
    pub fn reader(&self) -> &DelimitedReader<R> {
        &self.reader
    }
}

impl<R: BufRead> Iterator for DelimitedRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Field-at-a-time writer.
///
/// Separators between fields of one record are inserted automatically;
/// `last == true` (or [`end_record`](Self::end_record)) terminates the line.
pub struct DelimitedWriter<W: Write> {
    inner: csv::Writer<W>,
    trim: bool,
    escaping: Option<Escaping>,
}

/// Quoting rules of a dialect with an escape character.
#[derive(Debug, Clone, Copy)]
struct Escaping {
    separator: char,
    quote: char,
    escape: char,
    level: QuoteLevel,
}

impl Escaping {
    fn encode(&self, value: &str) -> String {
        let quoted = match self.level {
            QuoteLevel::Never => false,
            QuoteLevel::Always => true,
            QuoteLevel::Minimal => value
                .chars()
                .any(|c| c == self.separator || c == self.quote || c == '\n' || c == '\r'),
        };
        if !quoted {
            return value.to_string();
        }
        let mut out = String::with_capacity(value.len() + 2);
        out.push(self.quote);
        for c in value.chars() {
            if c == self.quote || c == self.escape {
                out.push(self.escape);
            }
            out.push(c);
        }
        out.push(self.quote);
        out
    }
}

impl<W: Write> DelimitedWriter<W> {
    /// # Errors
    /// [`Error::Config`] if the dialect is invalid.
    pub fn new(inner: W, dialect: &Dialect) -> Result<Self> {
        let bytes = dialect.bytes()?;
        let escaping = dialect.escape.map(|escape| Escaping {
            separator: dialect.separator,
            quote: dialect.quote,
            escape,
            level: dialect.quote_level,
        });
        let quote_style = if escaping.is_some() {
            QuoteStyle::Never
        } else {
            dialect.quote_level.into()
        };
        let inner = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(bytes.separator)
            .quote(bytes.quote)
            .quote_style(quote_style)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(inner);
        Ok(Self {
            inner,
            trim: dialect.trim,
            escaping,
        })
    }

    /// Write one field; `last` terminates the record.
    ///
    /// # Errors
    /// [`Error::Io`] if the underlying stream fails.
    pub fn write_field(&mut self, field: &str, last: bool) -> Result<()> {
        let value = if self.trim { field.trim() } else { field };
        let written = match &self.escaping {
            Some(escaping) => self.inner.write_field(escaping.encode(value)),
            None => self.inner.write_field(value),
        };
        written.map_err(csv_error)?;
        if last {
            self.end_record()?;
        }
        Ok(())
    }

    /// Terminate the current record with a line break.
    ///
    /// # Errors
    /// [`Error::Io`] if the underlying stream fails.
    pub fn end_record(&mut self) -> Result<()> {
        self.inner.write_record(None::<&[u8]>).map_err(csv_error)
    }

    /// Write a whole record.
    ///
    /// # Errors
    /// [`Error::Io`] if the underlying stream fails.
    pub fn write_record<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        if fields.is_empty() {
            return self.end_record();
        }
        let last = fields.len() - 1;
        for (i, f) in fields.iter().enumerate() {
            self.write_field(f.as_ref(), i == last)?;
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| Error::io("flush delimited stream", e))
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn into_inner(self) -> Result<W> {
        self.inner
            .into_inner()
            .map_err(|e| Error::io("flush delimited stream", e.into_error()))
    }
}

fn csv_error(e: csv::Error) -> Error {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => Error::io("write delimited stream", io),
        other => Error::parse(ParseErrorKind::Syntax, 0, format!("{other:?}")),
    }
}
