//! LDIF change-record reader.
//!
//! Accepts what [`LdifWriter`](super::encoder::LdifWriter) produces plus the
//! usual hand-written variations: an optional `version:` line, `#` comments,
//! folded continuation lines, `::` base64 values and entries without a
//! `changetype`, which are read as adds.
//!
//! [`LdifReader::into_records`] reads a directory snapshot instead: every
//! entry becomes a [`Record`] so two exports can be reconciled like any other
//! snapshot.

use super::change::{AddContent, Attribute, AttributeValue, ChangeRecord, Content, ModifyContent, ModifyOp};
use crate::error::{Error, ParseErrorKind, Result};
use crate::io::flat::{FlatReader, RawLine};
use crate::record::{Descriptor, Record};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::io::BufRead;

/// Pull-based LDIF reader.
pub struct LdifReader<R> {
    lines: FlatReader<R>,
    pending: Option<RawLine>,
    started: bool,
    records: u64,
}

/// A logical (unfolded) line and the physical line it starts on.
struct Logical {
    number: u64,
    text: String,
}

impl<R: BufRead> LdifReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            lines: FlatReader::with_comment(inner, None),
            pending: None,
            started: false,
            records: 0,
        }
    }

    /// Change records returned so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Next change record, or `Ok(None)` at end of data.
    ///
    /// # Errors
    /// - [`Error::Parse`] with `UnsupportedChangeType` for `modrdn`, `moddn`
    ///   or any other change type besides add, delete and modify.
    /// - [`Error::Parse`] with `InvalidBase64` or `Syntax` for malformed input.
    /// - [`Error::Io`] if the stream fails.
    pub fn next_change(&mut self) -> Result<Option<ChangeRecord>> {
        let mut block = Vec::new();
        while let Some(line) = self.next_logical()? {
            if line.text.is_empty() {
                if block.is_empty() {
                    continue;
                }
                break;
            }
            if line.text.starts_with('#') {
                continue;
            }
            if !self.started && block.is_empty() && has_name(&line.text, "version") {
                self.started = true;
                continue;
            }
            block.push(line);
        }
        if block.is_empty() {
            return Ok(None);
        }
        self.started = true;
        let change = parse_block(&block)?;
        self.records += 1;
        Ok(Some(change))
    }

    /// Bind this reader to `descriptor` and iterate snapshot entries as records.
    ///
    /// Each declared field takes the values of the attribute of the same name
    /// (case-insensitive), joined by `value_separator`; a field named `dn`
    /// takes the entry's DN unless the entry has such an attribute. Binary
    /// values are base64-encoded. Undeclared attributes are ignored.
    pub fn into_records(self, descriptor: &Descriptor, value_separator: Option<String>) -> LdifRecords<R> {
        LdifRecords {
            reader: self,
            descriptor: descriptor.clone(),
            value_separator,
        }
    }

    fn next_logical(&mut self) -> Result<Option<Logical>> {
        let first = match self.pending.take() {
            Some(l) => l,
            None => match self.lines.read_line()? {
                Some(l) => l,
                None => return Ok(None),
            },
        };
        let mut text = first.text;
        loop {
            match self.lines.read_line()? {
                Some(next) if next.text.starts_with(' ') => text.push_str(&next.text[1..]),
                other => {
                    self.pending = other;
                    break;
                }
            }
        }
        Ok(Some(Logical {
            number: first.number,
            text,
        }))
    }
}

impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<ChangeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_change().transpose()
    }
}

/// Record iterator produced by [`LdifReader::into_records`].
pub struct LdifRecords<R> {
    reader: LdifReader<R>,
    descriptor: Descriptor,
    value_separator: Option<String>,
}

impl<R: BufRead> LdifRecords<R> {
    /// Next entry as a record, or `Ok(None)` at end of data.
    ///
    /// # Errors
    /// - [`Error::Parse`] with `UnsupportedChangeType` for delete or modify
    ///   records, which describe changes rather than entries.
    /// - [`Error::Parse`] with `Syntax` for a multi-valued attribute when no
    ///   value separator is configured.
    /// - Anything [`LdifReader::next_change`] reports.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(change) = self.reader.next_change()? else {
            return Ok(None);
        };
        let line = self.reader.lines.raw_lines();
        let Content::Add(entry) = &change.content else {
            return Err(Error::parse(
                ParseErrorKind::UnsupportedChangeType,
                line,
                format!("{}: snapshot holds a {} record, not an entry", change.dn, change.change_type()),
            ));
        };
        let values = self
            .descriptor
            .field_names()
            .map(|name| match entry.get(name) {
                Some(attribute) => self.join(attribute, line),
                None if name.eq_ignore_ascii_case("dn") => Ok(change.dn.clone()),
                None => Ok(String::new()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Record::new(values)))
    }

    fn join(&self, attribute: &Attribute, line: u64) -> Result<String> {
        let texts: Vec<String> = attribute
            .values
            .iter()
            .map(|v| v.as_text().map_or_else(|| STANDARD.encode(v.as_bytes()), str::to_string))
            .collect();
        match &self.value_separator {
            Some(sep) => Ok(texts.join(sep)),
            None if texts.len() > 1 => Err(syntax(
                line,
                format!(
                    "attribute '{}' has {} values but no value separator is configured",
                    attribute.name,
                    texts.len()
                ),
            )),
            None => Ok(texts.concat()),
        }
    }

    /// Entries read so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.reader.records_read()
    }
}

impl<R: BufRead> Iterator for LdifRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn has_name(line: &str, name: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(n, _)| n.trim().eq_ignore_ascii_case(name))
}

fn syntax(line: u64, detail: impl Into<String>) -> Error {
    Error::parse(ParseErrorKind::Syntax, line, detail)
}

/// Split `name: value`, `name:: base64` into a name and a decoded value.
fn split_line(line: &Logical) -> Result<(&str, AttributeValue)> {
    let Some((name, rest)) = line.text.split_once(':') else {
        return Err(syntax(line.number, format!("expected 'name: value', got '{}'", line.text)));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(syntax(line.number, "empty attribute name"));
    }
    let value = if let Some(encoded) = rest.strip_prefix(':') {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            Error::parse(ParseErrorKind::InvalidBase64, line.number, format!("{name}: {e}"))
        })?;
        match String::from_utf8(bytes) {
            Ok(s) => AttributeValue::Text(s),
            Err(e) => AttributeValue::Binary(e.into_bytes()),
        }
    } else if rest.starts_with('<') {
        return Err(syntax(line.number, format!("{name}: URL values are not supported")));
    } else {
        AttributeValue::Text(rest.trim_start_matches(' ').to_string())
    };
    Ok((name, value))
}

fn parse_block(block: &[Logical]) -> Result<ChangeRecord> {
    let head = &block[0];
    let (name, dn) = split_line(head)?;
    if !name.eq_ignore_ascii_case("dn") {
        return Err(syntax(head.number, format!("record must start with dn, got '{name}'")));
    }
    let AttributeValue::Text(dn) = dn else {
        return Err(syntax(head.number, "dn is not valid UTF-8"));
    };

    let mut body = &block[1..];
    let mut change_type = String::from("add");
    if let Some(first) = body.first()
        && has_name(&first.text, "changetype")
    {
        let (_, value) = split_line(first)?;
        change_type = value.as_text().unwrap_or_default().trim().to_ascii_lowercase();
        body = &body[1..];
    }

    match change_type.as_str() {
        "add" => {
            let mut add = AddContent::default();
            for line in body {
                let (name, value) = split_line(line)?;
                add.add_attribute(Attribute::new(name).with_value(value));
            }
            Ok(ChangeRecord::add(dn, add))
        }
        "delete" => {
            if let Some(extra) = body.first() {
                return Err(syntax(extra.number, "delete record carries attributes"));
            }
            Ok(ChangeRecord::delete(dn))
        }
        "modify" => parse_modify(dn, body),
        other => Err(Error::parse(
            ParseErrorKind::UnsupportedChangeType,
            head.number,
            format!("changetype '{other}'"),
        )),
    }
}

fn parse_modify(dn: String, body: &[Logical]) -> Result<ChangeRecord> {
    let mut modify = ModifyContent::default();
    let mut lines = body.iter();
    while let Some(line) = lines.next() {
        let (keyword, target) = split_line(line)?;
        let Some(op) = ModifyOp::from_keyword(keyword) else {
            return Err(syntax(line.number, format!("unknown modify operation '{keyword}'")));
        };
        let attr_name = target.as_text().unwrap_or_default().trim().to_string();
        let mut attribute = Attribute::new(attr_name);
        for value_line in lines.by_ref() {
            if value_line.text == "-" {
                break;
            }
            let (name, value) = split_line(value_line)?;
            if !attribute.is_named(name) {
                return Err(syntax(
                    value_line.number,
                    format!("value for '{name}' inside '{}' modification", attribute.name),
                ));
            }
            attribute.values.push(value);
        }
        modify.push(op, attribute);
    }
    Ok(ChangeRecord::modify(dn, modify))
}
