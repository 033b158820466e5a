//! Temp-file-then-rename output.
//!
//! Every file this crate produces is written to a temporary file in the
//! destination's directory, flushed, synced and then persisted over the
//! destination. If anything fails before the rename, the temporary file is
//! removed on drop and the destination is left as it was.

use super::compression::{Codec, CompressedWriter, open_reader};
use anyhow::{Context, Result};
use std::fs::create_dir_all;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Pending replacement of `destination`. Compresses according to the
/// destination's extension.
pub struct AtomicFile {
    destination: PathBuf,
    writer: CompressedWriter<NamedTempFile>,
}

impl AtomicFile {
    /// Create a temporary file next to `destination`, creating parent
    /// directories if needed.
    ///
    /// # Errors
    /// Fails if the directory or temporary file cannot be created.
    pub fn create(destination: impl AsRef<Path>) -> Result<Self> {
        let destination = destination.as_ref().to_path_buf();
        let dir = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        let tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        let writer = CompressedWriter::new(tmp, Codec::from_path(&destination))
            .with_context(|| format!("init encoder for {}", destination.display()))?;
        Ok(Self {
            destination,
            writer,
        })
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Finish, sync and rename over the destination.
    ///
    /// # Errors
    /// Fails if flushing, syncing or renaming fails. The destination is then
    /// unchanged.
    pub fn commit(self) -> Result<()> {
        let dest = self.destination;
        let tmp = self
            .writer
            .finish()
            .with_context(|| format!("finish {}", dest.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("sync temp file for {}", dest.display()))?;
        tmp.persist(&dest)
            .map_err(|e| e.error)
            .with_context(|| format!("rename temp file over {}", dest.display()))?;
        tracing::debug!(target: "ironrecon", path = %dest.display(), "committed");
        Ok(())
    }
}

impl AtomicFile {
    /// Drop the temporary file and leave the destination as it was.
    pub fn discard(self) {
        tracing::debug!(target: "ironrecon", path = %self.destination.display(), "discarded");
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Run `fill` against a fresh [`AtomicFile`] and commit it on success.
///
/// # Errors
/// Whatever `fill` returns, or a commit failure. The destination is only
/// replaced when both succeed.
pub fn write_atomic<T>(
    destination: impl AsRef<Path>,
    fill: impl FnOnce(&mut AtomicFile) -> Result<T>,
) -> Result<T> {
    let mut file = AtomicFile::create(destination)?;
    let out = fill(&mut file)?;
    file.commit()?;
    Ok(out)
}

/// Rewrite `path` through `transform`, swapping the result in only once it is
/// complete.
///
/// # Errors
/// Fails if the source cannot be read, `transform` fails, or the swap fails.
/// In every case the original file is left intact.
pub fn repack_in_place<T>(
    path: impl AsRef<Path>,
    transform: impl FnOnce(Box<dyn BufRead>, &mut AtomicFile) -> Result<T>,
) -> Result<T> {
    let path = path.as_ref();
    let reader = open_reader(path)?;
    write_atomic(path, |out| transform(reader, out))
        .with_context(|| format!("repack {}", path.display()))
}
