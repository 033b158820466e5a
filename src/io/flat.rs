//! Line-oriented flat files.
//!
//! A flat file holds one record per physical line, either split on a separator
//! (no quoting) or cut into fixed-width columns. Lines starting with the
//! comment character are skipped. `\n`, `\r\n` and a lone `\r` all end a line.

use crate::diagnostics::DiagnosticSink;
use crate::error::{Error, ParseErrorKind, Result};
use crate::record::{Descriptor, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, Write};

/// One physical line with its 1-based position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    pub number: u64,
}

/// Line reader that skips comments and keeps two counters.
pub struct FlatReader<R> {
    inner: R,
    comment: Option<char>,
    raw_lines: u64,
    lines_processed: u64,
}

impl<R: BufRead> FlatReader<R> {
    /// Reader with the default `#` comment character.
    pub fn new(inner: R) -> Self {
        Self::with_comment(inner, Some('#'))
    }

    pub fn with_comment(inner: R, comment: Option<char>) -> Self {
        Self {
            inner,
            comment,
            raw_lines: 0,
            lines_processed: 0,
        }
    }

    /// Physical lines consumed, comments included.
    #[must_use]
    pub fn raw_lines(&self) -> u64 {
        self.raw_lines
    }

    /// Lines handed out by [`read_line`](Self::read_line).
    #[must_use]
    pub fn lines_processed(&self) -> u64 {
        self.lines_processed
    }

    /// Next non-comment line, or `Ok(None)` at end of data.
    ///
    /// A final line without a terminator is still returned.
    ///
    /// # Errors
    /// [`Error::Io`] if the stream fails, [`Error::Parse`] on invalid UTF-8.
    pub fn read_line(&mut self) -> Result<Option<RawLine>> {
        loop {
            let Some(bytes) = self.read_physical()? else {
                return Ok(None);
            };
            self.raw_lines += 1;
            let text = String::from_utf8(bytes).map_err(|e| {
                Error::parse(
                    ParseErrorKind::Syntax,
                    self.raw_lines,
                    format!("invalid UTF-8: {e}"),
                )
            })?;
            if let Some(c) = self.comment
                && text.starts_with(c)
            {
                continue;
            }
            self.lines_processed += 1;
            return Ok(Some(RawLine {
                text,
                number: self.raw_lines,
            }));
        }
    }

    fn read_physical(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut any = false;
        loop {
            let buf = self
                .inner
                .fill_buf()
                .map_err(|e| Error::io("read flat stream", e))?;
            if buf.is_empty() {
                return Ok(any.then_some(line));
            }
            any = true;
            if let Some(pos) = buf.iter().position(|&b| b == b'\n' || b == b'\r') {
                let cr = buf[pos] == b'\r';
                line.extend_from_slice(&buf[..pos]);
                self.inner.consume(pos + 1);
                if cr {
                    let next = self
                        .inner
                        .fill_buf()
                        .map_err(|e| Error::io("read flat stream", e))?;
                    if next.first() == Some(&b'\n') {
                        self.inner.consume(1);
                    }
                }
                return Ok(Some(line));
            }
            let len = buf.len();
            line.extend_from_slice(buf);
            self.inner.consume(len);
        }
    }

    /// Bind this reader to a layout and descriptor. Columns are positional;
    /// blank lines are skipped.
    pub fn into_records(self, layout: FlatLayout, descriptor: &Descriptor) -> FlatRecords<R> {
        FlatRecords {
            reader: self,
            layout,
            width: descriptor.len(),
        }
    }
}

/// A fixed-width column, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedColumn {
    pub start: usize,
    pub len: usize,
}

/// How a line is cut into field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FlatLayout {
    Delimited { separator: char },
    Fixed { columns: Vec<FixedColumn> },
}

impl FlatLayout {
    /// # Errors
    /// [`Error::Config`] for a line-break separator, or fixed columns that are
    /// missing, empty, past `usize::MAX` or overlapping.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Delimited { separator } => {
                if matches!(separator, '\n' | '\r') {
                    return Err(Error::Config("flat separator must not be a line break".into()));
                }
            }
            Self::Fixed { columns } => {
                if columns.is_empty() {
                    return Err(Error::Config("fixed layout needs at least one column".into()));
                }
                let mut spans = Vec::with_capacity(columns.len());
                for c in columns {
                    if c.len == 0 {
                        return Err(Error::Config(format!("column at {} has zero length", c.start)));
                    }
                    let end = c.start.checked_add(c.len).ok_or_else(|| {
                        Error::Config(format!("column at {} with length {} overflows", c.start, c.len))
                    })?;
                    spans.push((c.start, end));
                }
                spans.sort_unstable();
                if let Some(pair) = spans.windows(2).find(|pair| pair[0].1 > pair[1].0) {
                    return Err(Error::Config(format!(
                        "columns {}..{} and {}..{} overlap",
                        pair[0].0, pair[0].1, pair[1].0, pair[1].1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Split `line` into values. Fixed columns are trimmed; a column past the
    /// end of the line is empty.
    #[must_use]
    pub fn split(&self, line: &str) -> Vec<String> {
        match self {
            Self::Delimited { separator } => line.split(*separator).map(str::to_string).collect(),
            Self::Fixed { columns } => {
                let chars: Vec<char> = line.chars().collect();
                columns
                    .iter()
                    .map(|c| {
                        let start = c.start.min(chars.len());
                        let end = c.start.saturating_add(c.len).min(chars.len());
                        chars[start..end].iter().collect::<String>().trim().to_string()
                    })
                    .collect()
            }
        }
    }

    /// The same layout with an extra first column. Fixed columns shift right
    /// by `width`.
    #[must_use]
    pub fn with_leading_column(&self, width: usize) -> Self {
        match self {
            Self::Delimited { .. } => self.clone(),
            Self::Fixed { columns } => {
                let mut shifted = vec![FixedColumn { start: 0, len: width }];
                shifted.extend(columns.iter().map(|c| FixedColumn {
                    start: c.start.saturating_add(width),
                    len: c.len,
                }));
                Self::Fixed { columns: shifted }
            }
        }
    }

    /// Why `value` cannot be written unchanged as column `index`, if it can't.
    fn lossy(&self, index: usize, value: &str) -> Option<String> {
        if value.contains(['\n', '\r']) {
            return Some("contains a line break".into());
        }
        match self {
            Self::Delimited { separator } => value
                .contains(*separator)
                .then(|| format!("contains the separator {separator:?}")),
            Self::Fixed { columns } => match columns.get(index) {
                None => (!value.is_empty()).then(|| "has no column, value dropped".to_string()),
                Some(c) => (value.chars().count() > c.len)
                    .then(|| format!("truncated to {} characters", c.len)),
            },
        }
    }

    fn join(&self, values: &[&str]) -> String {
        match self {
            Self::Delimited { separator } => values.join(&separator.to_string()),
            Self::Fixed { columns } => {
                let mut out: Vec<char> = Vec::new();
                for (c, v) in columns.iter().zip(values) {
                    let end = c.start + c.len;
                    if out.len() < end {
                        out.resize(end, ' ');
                    }
                    for (slot, ch) in out[c.start..end].iter_mut().zip(v.chars()) {
                        *slot = ch;
                    }
                }
                let line: String = out.into_iter().collect();
                line.trim_end().to_string()
            }
        }
    }
}

/// Typed record iterator produced by [`FlatReader::into_records`].
pub struct FlatRecords<R> {
    reader: FlatReader<R>,
    layout: FlatLayout,
    width: usize,
}

impl<R: BufRead> FlatRecords<R> {
    /// # Errors
    /// See [`FlatReader::read_line`].
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some(line) = self.reader.read_line()? {
            if line.text.trim().is_empty() {
                continue;
            }
            let mut values = self.layout.split(&line.text);
            values.resize(self.width, String::new());
            return Ok(Some(Record::new(values)));
        }
        Ok(None)
    }

    #[must_use]
    pub fn reader(&self) -> &FlatReader<R> {
        &self.reader
    }
}

impl<R: BufRead> Iterator for FlatRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
    Cr,
}

impl LineTerminator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }
}

/// Writes name-to-value maps in the descriptor's field order.
///
/// Values the layout cannot hold (too long for a fixed column, containing the
/// separator or a line break) are still written, and reported to the sink.
pub struct FlatWriter<W: Write> {
    inner: W,
    descriptor: Descriptor,
    layout: FlatLayout,
    terminator: LineTerminator,
    written: u64,
}

impl<W: Write> FlatWriter<W> {
    /// # Errors
    /// [`Error::Config`] if the layout is invalid.
    pub fn new(inner: W, descriptor: Descriptor, layout: FlatLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            inner,
            descriptor,
            layout,
            terminator: LineTerminator::default(),
            written: 0,
        })
    }

    #[must_use]
    pub fn with_terminator(mut self, terminator: LineTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Write one line. A declared field absent from `record` is written empty
    /// and reported to `sink` as a warning.
    ///
    /// # Errors
    /// [`Error::Io`] if the stream fails.
    pub fn write_record(
        &mut self,
        record: &HashMap<String, String>,
        sink: &dyn DiagnosticSink,
    ) -> Result<()> {
        let line = self.written + 1;
        let values: Vec<&str> = self
            .descriptor
            .field_names()
            .map(|name| match record.get(name) {
                Some(v) => v.as_str(),
                None => {
                    sink.warn(&format!("record {line}: field '{name}' missing, content unknown"));
                    ""
                }
            })
            .collect();
        self.write_line(&values, sink)
    }

    /// Write a record already aligned to the descriptor.
    ///
    /// # Errors
    /// [`Error::Io`] if the stream fails.
    pub fn write_values(&mut self, record: &Record, sink: &dyn DiagnosticSink) -> Result<()> {
        let values: Vec<&str> = (0..self.descriptor.len()).map(|i| record.get(i)).collect();
        self.write_line(&values, sink)
    }

    fn write_line(&mut self, values: &[&str], sink: &dyn DiagnosticSink) -> Result<()> {
        let line = self.written + 1;
        for ((i, value), name) in values.iter().enumerate().zip(self.descriptor.field_names()) {
            if let Some(problem) = self.layout.lossy(i, value) {
                sink.warn(&format!("record {line}: field '{name}' {problem}"));
            }
        }
        let text = self.layout.join(values);
        self.inner
            .write_all(text.as_bytes())
            .and_then(|()| self.inner.write_all(self.terminator.as_str().as_bytes()))
            .map_err(|e| Error::io("write flat stream", e))?;
        self.written += 1;
        Ok(())
    }

    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| Error::io("flush flat stream", e))
    }

    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner
            .flush()
            .map_err(|e| Error::io("flush flat stream", e))?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingSink, Level, NullSink};
    use std::io::Cursor;

    fn reader(text: &str) -> FlatReader<Cursor<Vec<u8>>> {
        FlatReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn comments_count_only_as_raw_lines() {
        let mut r = reader("# header\na\r\n#x\nb\rc");
        let got: Vec<RawLine> = std::iter::from_fn(|| r.read_line().unwrap()).collect();
        assert_eq!(
            got.iter().map(|l| l.text.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
        assert_eq!(got.iter().map(|l| l.number).collect::<Vec<_>>(), [2, 4, 5]);
        assert_eq!(r.raw_lines(), 5);
        assert_eq!(r.lines_processed(), 3);
        assert_eq!(r.read_line().unwrap(), None);
    }

    #[test]
    fn empty_stream_is_end_of_data() {
        assert_eq!(reader("").read_line().unwrap(), None);
    }

    #[test]
    fn comment_char_can_be_disabled() {
        let mut r = FlatReader::with_comment(Cursor::new(b"#1\n".to_vec()), None);
        assert_eq!(r.read_line().unwrap().unwrap().text, "#1");
    }

    #[test]
    fn fixed_layout_trims_and_pads_short_lines() {
        let layout = FlatLayout::Fixed {
            columns: vec![
                FixedColumn { start: 0, len: 4 },
                FixedColumn { start: 4, len: 6 },
                FixedColumn { start: 10, len: 3 },
            ],
        };
        assert_eq!(layout.split("0042 Alice"), ["0042", "Alice", ""]);
        assert_eq!(layout.split(""), ["", "", ""]);
    }

    #[test]
    fn records_follow_layout() {
        let d = Descriptor::new(["id", "name", "mail"], &["id"]).unwrap();
        let rows: Vec<Record> = reader("1|Alice|a@x\n\n2|Bob\n")
            .into_records(FlatLayout::Delimited { separator: '|' }, &d)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].values(), ["2", "Bob", ""]);
    }

    #[test]
    fn writer_warns_on_missing_fields() {
        let d = Descriptor::new(["id", "name", "mail"], &["id"]).unwrap();
        let sink = CollectingSink::default();
        let mut w = FlatWriter::new(Vec::new(), d, FlatLayout::Delimited { separator: ';' })
            .unwrap()
            .with_terminator(LineTerminator::CrLf);
        let rec = HashMap::from([
            ("id".to_string(), "7".to_string()),
            ("name".to_string(), "Eve".to_string()),
        ]);
        w.write_record(&rec, &sink).unwrap();
        assert_eq!(w.records_written(), 1);
        assert_eq!(w.into_inner().unwrap(), b"7;Eve;\r\n");
        let warnings = sink.messages(Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'mail'"));
    }

    #[test]
    fn fixed_writer_pads_columns_and_reports_truncation() {
        let d = Descriptor::new(["id", "name"], &["id"]).unwrap();
        let layout = FlatLayout::Fixed {
            columns: vec![FixedColumn { start: 0, len: 3 }, FixedColumn { start: 3, len: 5 }],
        };
        let sink = CollectingSink::default();
        let mut w = FlatWriter::new(Vec::new(), d.clone(), layout.clone()).unwrap();
        w.write_values(&d.record(["1", "Bo"]), &sink).unwrap();
        assert!(sink.is_empty());
        w.write_values(&d.record(["22", "Alexandra"]), &sink).unwrap();
        let text = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(text, "1  Bo\n22 Alexa\n");
        assert_eq!(
            sink.messages(Level::Warn),
            ["record 2: field 'name' truncated to 5 characters"]
        );
        let first = text.lines().next().unwrap();
        assert_eq!(layout.split(first), ["1", "Bo"]);
    }

    #[test]
    fn delimited_writer_reports_embedded_separators() {
        let d = Descriptor::new(["id", "name"], &["id"]).unwrap();
        let sink = CollectingSink::default();
        let mut w = FlatWriter::new(Vec::new(), d.clone(), FlatLayout::Delimited { separator: '|' }).unwrap();
        w.write_values(&d.record(["1", "a|b"]), &sink).unwrap();
        w.write_values(&d.record(["2", "two\nlines"]), &sink).unwrap();
        assert_eq!(
            sink.messages(Level::Warn),
            [
                "record 1: field 'name' contains the separator '|'",
                "record 2: field 'name' contains a line break",
            ]
        );
    }

    #[test]
    fn unsorted_fixed_columns_are_placed_by_start() {
        let d = Descriptor::new(["id", "name"], &["id"]).unwrap();
        let layout = FlatLayout::Fixed {
            columns: vec![FixedColumn { start: 4, len: 2 }, FixedColumn { start: 0, len: 4 }],
        };
        let mut w = FlatWriter::new(Vec::new(), d.clone(), layout.clone()).unwrap();
        w.write_values(&d.record(["7", "Ann"]), &NullSink).unwrap();
        let text = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(text, "Ann 7\n");
        assert_eq!(layout.split(text.trim_end()), ["7", "Ann"]);
    }

    #[test]
    fn broken_fixed_layouts_are_rejected() {
        let fixed = |columns: &[(usize, usize)]| FlatLayout::Fixed {
            columns: columns.iter().map(|&(start, len)| FixedColumn { start, len }).collect(),
        };
        for layout in [
            fixed(&[(usize::MAX, 1)]),
            fixed(&[(0, 4), (3, 2)]),
            fixed(&[(0, 0)]),
            fixed(&[]),
            FlatLayout::Delimited { separator: '\n' },
        ] {
            assert!(matches!(layout.validate(), Err(Error::Config(_))), "{layout:?}");
        }
        assert!(fixed(&[(5, 2), (0, 5)]).validate().is_ok());
    }

    #[test]
    fn split_never_overflows() {
        let layout = FlatLayout::Fixed {
            columns: vec![FixedColumn { start: usize::MAX, len: 1 }],
        };
        assert_eq!(layout.split("abc"), [""]);
    }

    #[test]
    fn leading_column_shifts_fixed_layout() {
        let layout = FlatLayout::Fixed {
            columns: vec![FixedColumn { start: 0, len: 2 }, FixedColumn { start: 2, len: 4 }],
        };
        assert_eq!(
            layout.with_leading_column(3),
            FlatLayout::Fixed {
                columns: vec![
                    FixedColumn { start: 0, len: 3 },
                    FixedColumn { start: 3, len: 2 },
                    FixedColumn { start: 5, len: 4 },
                ],
            }
        );
    }
}
