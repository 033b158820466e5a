//! Error taxonomy shared by the codecs, the reconciliation engine and the
//! directory change model.
//!
//! End of data is never reported through this type: every read API returns
//! `Ok(None)` (or [`Field::EndOfData`](crate::io::delimited::Field::EndOfData))
//! for a clean end of stream, so callers can tell "no more records" apart from a
//! stream that broke mid-record.

use std::fmt;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a [`Error::Parse`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A quoted field was not closed before the end of the line or stream.
    MissingQuoteClose,
    /// The escape character was followed by something other than a quote or itself.
    MalformedEscape,
    /// A closing quote was followed by something other than a separator or line end.
    MissingSeparator,
    /// The stream ended before a header row could be read.
    MissingHeader,
    /// A field name does not exist in the record descriptor.
    UnknownField,
    /// An LDIF `changetype` this crate does not model.
    UnsupportedChangeType,
    /// A `::` value was not valid base64.
    InvalidBase64,
    /// Any other structural problem in the input.
    Syntax,
}

impl ParseErrorKind {
    /// Stable code for the kind, used in diagnostics.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingQuoteClose => "MISSING_QUOTE_CLOSE",
            Self::MalformedEscape => "MALFORMED_ESCAPE",
            Self::MissingSeparator => "MISSING_SEPARATOR",
            Self::MissingHeader => "MISSING_HEADER",
            Self::UnknownField => "UNKNOWN_FIELD",
            Self::UnsupportedChangeType => "UNSUPPORTED_CHANGE_TYPE",
            Self::InvalidBase64 => "INVALID_BASE64",
            Self::Syntax => "SYNTAX",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Opening, reading, writing or closing a stream failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The input is malformed. Fatal for the current stream only.
    #[error("line {line}: {kind}: {detail}")]
    Parse {
        kind: ParseErrorKind,
        line: u64,
        detail: String,
    },

    /// A documented caller responsibility was not met.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// An operation the target type does not support. Always a defect.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn parse(kind: ParseErrorKind, line: u64, detail: impl Into<String>) -> Self {
        Self::Parse {
            kind,
            line,
            detail: detail.into(),
        }
    }

    /// The parse kind, if this is a [`Error::Parse`].
    #[must_use]
    pub const fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            Self::Parse { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io("i/o failure", source)
    }
}
