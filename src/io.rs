//! Text codecs and file plumbing.
//!
//! - [`delimited`]: quote/escape-aware separated values
//! - [`flat`]: one record per line, delimited or fixed-width
//! - [`compression`]: transparent gzip/zstd by extension or magic bytes
//! - [`atomic`]: temp-file-then-rename output and in-place repacking

pub mod atomic;
pub mod compression;
pub mod delimited;
pub mod flat;

pub use atomic::{AtomicFile, repack_in_place, write_atomic};
pub use compression::{Codec, CompressedWriter, open_reader};
pub use delimited::{DelimitedReader, DelimitedRecords, DelimitedWriter, Dialect, Field, QuoteLevel};
pub use flat::{FixedColumn, FlatLayout, FlatReader, FlatRecords, FlatWriter, LineTerminator, RawLine};
