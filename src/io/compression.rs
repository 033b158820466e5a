//! Transparent compression for snapshot inputs and reconciliation outputs.
//!
//! Readers are detected by file extension first and by magic bytes second, so a
//! gzip snapshot renamed to `.csv` is still decoded. Writers are selected by
//! extension only.
//!
//! ## Built-in codecs
//! - **Gzip** (`.gz`, `.gzip`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`, `.zstd`) via `zstd` (feature: `compression-zstd`)
//!
//! ## Design notes
//! Compressed writers hold a trailer that must be written before the file is
//! renamed into place. [`CompressedWriter::finish`] does this explicitly and
//! hands back the inner writer, which is what [`super::atomic::AtomicFile`]
//! relies on. Dropping an unfinished writer is only safe for plain output.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A compression format known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    #[cfg(feature = "compression-gzip")]
    Gzip,
    #[cfg(feature = "compression-zstd")]
    Zstd,
}

impl Codec {
    /// Codecs compiled into this build, `None` excluded.
    const ENABLED: &'static [Codec] = &[
        #[cfg(feature = "compression-gzip")]
        Codec::Gzip,
        #[cfg(feature = "compression-zstd")]
        Codec::Zstd,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => "gzip",
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => "zstd",
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => &[".gz", ".gzip"],
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => &[".zst", ".zstd"],
        }
    }

    fn magic(self) -> &'static [u8] {
        match self {
            Self::None => &[],
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => &[0x1f, 0x8b],
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
        }
    }

    /// Codec implied by the path's extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let lower = path.as_ref().to_string_lossy().to_lowercase();
        Self::ENABLED
            .iter()
            .copied()
            .find(|c| c.extensions().iter().any(|ext| lower.ends_with(ext)))
            .unwrap_or(Self::None)
    }

    /// Codec whose signature starts `prefix`.
    #[must_use]
    pub fn from_magic(prefix: &[u8]) -> Self {
        Self::ENABLED
            .iter()
            .copied()
            .find(|c| prefix.starts_with(c.magic()))
            .unwrap_or(Self::None)
    }
}

/// Wrap `reader` with the decoder implied by `path_hint` or, failing that, by
/// the stream's leading bytes.
///
/// # Errors
/// Fails if the stream cannot be peeked or the decoder cannot be initialized.
pub fn wrap_reader<R: Read + 'static>(reader: R, path_hint: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let mut buffered = BufReader::new(reader);
    let codec = match Codec::from_path(&path_hint) {
        Codec::None => {
            let head = buffered.fill_buf().context("peek stream header")?;
            Codec::from_magic(head)
        }
        c => c,
    };
    Ok(match codec {
        Codec::None => Box::new(buffered),
        #[cfg(feature = "compression-gzip")]
        Codec::Gzip => Box::new(BufReader::new(flate2::bufread::MultiGzDecoder::new(buffered))),
        #[cfg(feature = "compression-zstd")]
        Codec::Zstd => Box::new(BufReader::new(
            zstd::stream::read::Decoder::with_buffer(buffered).context("init zstd decoder")?,
        )),
    })
}

/// Open `path` for buffered reading, decompressing if needed.
///
/// # Errors
/// Fails if the file cannot be opened or the decoder cannot be initialized.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    wrap_reader(file, path).with_context(|| format!("detect compression of {}", path.display()))
}

enum Sink<W: Write> {
    Plain(BufWriter<W>),
    #[cfg(feature = "compression-gzip")]
    Gzip(flate2::write::GzEncoder<BufWriter<W>>),
    #[cfg(feature = "compression-zstd")]
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<W>>),
}

/// Buffered writer that optionally compresses, with an explicit `finish`.
pub struct CompressedWriter<W: Write> {
    sink: Sink<W>,
    codec: Codec,
}

impl<W: Write> CompressedWriter<W> {
    /// # Errors
    /// Fails if the encoder cannot be initialized.
    pub fn new(inner: W, codec: Codec) -> io::Result<Self> {
        let buffered = BufWriter::new(inner);
        let sink = match codec {
            Codec::None => Sink::Plain(buffered),
            #[cfg(feature = "compression-gzip")]
            Codec::Gzip => Sink::Gzip(flate2::write::GzEncoder::new(
                buffered,
                flate2::Compression::default(),
            )),
            #[cfg(feature = "compression-zstd")]
            Codec::Zstd => Sink::Zstd(zstd::stream::write::Encoder::new(buffered, 3)?),
        };
        Ok(Self { sink, codec })
    }

    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Write any trailer, flush and return the inner writer.
    ///
    /// # Errors
    /// Fails if the trailer or the buffered bytes cannot be written.
    pub fn finish(self) -> io::Result<W> {
        let buffered = match self.sink {
            Sink::Plain(w) => w,
            #[cfg(feature = "compression-gzip")]
            Sink::Gzip(e) => e.finish()?,
            #[cfg(feature = "compression-zstd")]
            Sink::Zstd(e) => e.finish()?,
        };
        buffered.into_inner().map_err(io::IntoInnerError::into_error)
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Plain(w) => w.write(buf),
            #[cfg(feature = "compression-gzip")]
            Sink::Gzip(e) => e.write(buf),
            #[cfg(feature = "compression-zstd")]
            Sink::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain(w) => w.flush(),
            #[cfg(feature = "compression-gzip")]
            Sink::Gzip(e) => e.flush(),
            #[cfg(feature = "compression-zstd")]
            Sink::Zstd(e) => e.flush(),
        }
    }
}
