//! LDIF change-record encoder.
//!
//! Each [`ChangeRecord`] becomes one block:
//!
//! ```text
//! dn: uid=jdoe,ou=People,dc=example,dc=com
//! changetype: modify
//! replace: mail
//! mail: jdoe@example.com
//! -
//! ```
//!
//! Blocks are separated by one blank line. A DN or value that is not an LDIF
//! safe string (non-ASCII, leading space, colon or `<`, trailing space, or a
//! line break) is written base64-encoded after a double colon. Binary values
//! are always base64-encoded.

use super::change::{AttributeValue, ChangeRecord, Content};
use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::io::Write;

/// Streaming LDIF writer.
pub struct LdifWriter<W: Write> {
    inner: W,
    wrap_column: Option<usize>,
    separate: bool,
    written: u64,
}

impl<W: Write> LdifWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            wrap_column: None,
            separate: false,
            written: 0,
        }
    }

    /// Fold lines longer than `column` characters onto continuation lines
    /// starting with a single space.
    ///
    /// # Errors
    /// [`Error::Config`] if `column` is below 2.
    pub fn with_wrap_column(mut self, column: usize) -> Result<Self> {
        if column < 2 {
            return Err(Error::Config(format!("wrap column {column} is too small")));
        }
        self.wrap_column = Some(column);
        Ok(self)
    }

    /// Number of change records written.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Write the `version: 1` header.
    ///
    /// # Errors
    /// [`Error::Io`] if the stream fails.
    pub fn write_version(&mut self) -> Result<()> {
        self.line("version: 1")?;
        self.separate = true;
        Ok(())
    }

    /// Write one change block.
    ///
    /// # Errors
    /// [`Error::Io`] if the stream fails.
    pub fn write_change(&mut self, change: &ChangeRecord) -> Result<()> {
        if self.separate {
            self.raw(b"\n")?;
        }
        self.value_line("dn", change.dn.as_bytes(), false)?;
        self.line(&format!("changetype: {}", change.change_type()))?;
        match &change.content {
            Content::Add(add) => {
                for attr in add.attributes() {
                    for v in &attr.values {
                        self.attribute_value(&attr.name, v)?;
                    }
                }
            }
            Content::Delete(_) => {}
            Content::Modify(modify) => {
                for m in modify.modifications() {
                    self.line(&format!("{}: {}", m.op.keyword(), m.attribute.name))?;
                    for v in &m.attribute.values {
                        self.attribute_value(&m.attribute.name, v)?;
                    }
                    self.line("-")?;
                }
            }
        }
        self.separate = true;
        self.written += 1;
        Ok(())
    }

    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|e| Error::io("flush ldif stream", e))
    }

    /// # Errors
    /// [`Error::Io`] if flushing fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn attribute_value(&mut self, name: &str, value: &AttributeValue) -> Result<()> {
        let binary = matches!(value, AttributeValue::Binary(_));
        self.value_line(name, value.as_bytes(), binary)
    }

    fn value_line(&mut self, name: &str, value: &[u8], force_base64: bool) -> Result<()> {
        let text = match std::str::from_utf8(value) {
            Ok(s) if !force_base64 && is_safe(s) => s,
            _ => return self.line(&format!("{name}:: {}", STANDARD.encode(value))),
        };
        if text.is_empty() {
            self.line(&format!("{name}:"))
        } else {
            self.line(&format!("{name}: {text}"))
        }
    }

    fn line(&mut self, text: &str) -> Result<()> {
        match self.wrap_column {
            Some(col) if text.chars().count() > col => {
                let chars: Vec<char> = text.chars().collect();
                let (head, mut rest) = chars.split_at(col);
                let mut out: String = head.iter().collect();
                out.push('\n');
                while !rest.is_empty() {
                    let take = rest.len().min(col - 1);
                    out.push(' ');
                    out.extend(&rest[..take]);
                    out.push('\n');
                    rest = &rest[take..];
                }
                self.raw(out.as_bytes())
            }
            _ => {
                self.raw(text.as_bytes())?;
                self.raw(b"\n")
            }
        }
    }

    fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| Error::io("write ldif stream", e))
    }
}

/// Whether `s` can be written verbatim after `name: `.
#[must_use]
pub fn is_safe(s: &str) -> bool {
    let bytes = s.as_bytes();
    if let Some(&first) = bytes.first()
        && matches!(first, b' ' | b':' | b'<')
    {
        return false;
    }
    if bytes.last() == Some(&b' ') {
        return false;
    }
    bytes
        .iter()
        .all(|&b| b.is_ascii() && b != 0 && b != b'\n' && b != b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::change::{AddContent, Attribute, ModifyContent, ModifyOp};

    fn render(changes: &[ChangeRecord]) -> String {
        let mut w = LdifWriter::new(Vec::new());
        for c in changes {
            w.write_change(c).unwrap();
        }
        String::from_utf8(w.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn modify_replace_block() {
        let mut m = ModifyContent::default();
        m.push(ModifyOp::Replace, Attribute::text("mail", ["x@y"]));
        let out = render(&[ChangeRecord::modify("uid=a,dc=x", m)]);
        assert_eq!(
            out,
            "dn: uid=a,dc=x\nchangetype: modify\nreplace: mail\nmail: x@y\n-\n"
        );
    }

    #[test]
    fn blocks_are_separated_by_blank_line() {
        let mut add = AddContent::default();
        add.add_attribute(Attribute::text("cn", ["A"]));
        let out = render(&[ChangeRecord::add("uid=a", add), ChangeRecord::delete("uid=b")]);
        assert_eq!(
            out,
            "dn: uid=a\nchangetype: add\ncn: A\n\ndn: uid=b\nchangetype: delete\n"
        );
    }

    #[test]
    fn version_header_precedes_first_block() {
        let mut w = LdifWriter::new(Vec::new());
        w.write_version().unwrap();
        w.write_change(&ChangeRecord::delete("uid=b")).unwrap();
        assert_eq!(
            w.into_inner().unwrap(),
            b"version: 1\n\ndn: uid=b\nchangetype: delete\n"
        );
    }

    #[test]
    fn unsafe_and_binary_values_are_base64() {
        let mut add = AddContent::default();
        add.add_attribute(Attribute::text("description", [" leading space"]));
        add.add_attribute(Attribute::new("jpegPhoto").with_value(vec![0xff, 0xd8]));
        add.add_attribute(Attribute::text("cn", ["Zoë"]));
        let out = render(&[ChangeRecord::add("cn=Zoë,dc=x", add)]);
        assert!(out.starts_with("dn:: Y249Wm/DqyxkYz14\n"));
        assert!(out.contains("description:: IGxlYWRpbmcgc3BhY2U=\n"));
        assert!(out.contains("jpegPhoto:: /9g=\n"));
        assert!(out.contains("cn:: Wm/Dqw==\n"));
    }

    #[test]
    fn remove_without_values() {
        let mut m = ModifyContent::default();
        m.push(ModifyOp::Remove, Attribute::new("telephoneNumber"));
        let out = render(&[ChangeRecord::modify("uid=a", m)]);
        assert!(out.ends_with("delete: telephoneNumber\n-\n"));
    }

    #[test]
    fn long_lines_are_folded() {
        let mut w = LdifWriter::new(Vec::new()).with_wrap_column(10).unwrap();
        w.write_change(&ChangeRecord::delete("uid=abcdefghijklmnop")).unwrap();
        let out = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "dn: uid=ab\n cdefghijk\n lmnop\nchangetype\n : delete\n"
        );
        assert!(LdifWriter::new(Vec::new()).with_wrap_column(1).is_err());
    }

    #[test]
    fn safe_string_rules() {
        assert!(is_safe("plain value"));
        assert!(is_safe(""));
        assert!(!is_safe(":colon"));
        assert!(!is_safe("<url"));
        assert!(!is_safe("trailing "));
        assert!(!is_safe("two\nlines"));
        assert!(!is_safe("café"));
    }
}
