//! Temporary snapshot files.

use crate::io::atomic::write_atomic;
use crate::io::delimited::{DelimitedWriter, Dialect};
use crate::record::{Descriptor, Record};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory of snapshot files, removed on drop.
pub struct SnapshotDir {
    dir: TempDir,
}

impl SnapshotDir {
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create snapshot dir")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `records` with a header row. A `.gz` or `.zst` name is compressed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_delimited(
        &self,
        name: &str,
        descriptor: &Descriptor,
        dialect: &Dialect,
        records: &[Record],
    ) -> Result<PathBuf> {
        let path = self.file(name);
        write_atomic(&path, |out| {
            let mut w = DelimitedWriter::new(out, dialect)?;
            w.write_record(&descriptor.field_names().collect::<Vec<_>>())?;
            for r in records {
                w.write_record(r.values())?;
            }
            w.flush()?;
            Ok(())
        })?;
        Ok(path)
    }

    /// Write raw text.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.file(name);
        write_atomic(&path, |out| Ok(out.write_all(text.as_bytes())?))?;
        Ok(path)
    }

    /// Read a file back as text.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn read_text(&self, name: &str) -> Result<String> {
        let path = self.file(name);
        std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
