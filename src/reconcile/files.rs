//! File-level reconciliation.
//!
//! These helpers open two snapshot files (transparently decompressing them),
//! optionally sort them by key, reconcile them and write the result through a
//! temporary file that only replaces the destination once complete.
//!
//! Output shapes:
//! - [`reconcile_files`] writes the input's own format with a leading
//!   `TRANSACTION` column: flat input gives flat output in the same layout,
//!   everything else gives delimited text with a header,
//! - [`reconcile_files_to_ldif`] writes LDIF change records.

use super::{Delta, ReconcileStats, Reconciler};
use crate::config::{InputFormat, ReconcileConfig};
use crate::diagnostics::TracingSink;
use crate::directory::reader::LdifReader;
use crate::error::Result as ReconResult;
use crate::io::atomic::AtomicFile;
use crate::io::compression::open_reader;
use crate::io::delimited::{DelimitedReader, DelimitedWriter};
use crate::io::flat::{FlatLayout, FlatReader, FlatWriter};
use crate::record::{Descriptor, Record};
use crate::sort::ExternalSorter;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Name of the column holding the transaction code in reconciled output.
pub const TRANSACTION_COLUMN: &str = "TRANSACTION";

/// Width of the transaction column in fixed-width output.
const TRANSACTION_WIDTH: usize = 3;

type Records = Box<dyn Iterator<Item = ReconResult<Record>>>;

/// Open `path` as a record stream according to `config`.
///
/// # Errors
/// Fails if the file cannot be opened, its header is missing or incomplete,
/// or sorting fails.
pub fn open_records(config: &ReconcileConfig, descriptor: &Descriptor, path: &Path) -> Result<Records> {
    let reader = open_reader(path)?;
    let records: Records = match &config.input {
        InputFormat::Delimited => Box::new(
            DelimitedReader::new(reader, config.dialect.clone())?
                .into_records(descriptor, true)
                .with_context(|| format!("read header of {}", path.display()))?,
        ),
        InputFormat::Flat { layout } => Box::new(
            FlatReader::with_comment(reader, config.comment_char).into_records(layout.clone(), descriptor),
        ),
        InputFormat::Ldif => {
            Box::new(LdifReader::new(reader).into_records(descriptor, config.ldif.value_separator.clone()))
        }
    };
    if !config.sort_inputs {
        return Ok(records);
    }
    let sorted = ExternalSorter::new(descriptor.clone(), config.chunk_size)?
        .sort(records)
        .with_context(|| format!("sort {}", path.display()))?;
    Ok(Box::new(sorted))
}

/// Reconcile two snapshot files into a file whose first column is the
/// transaction code (`CRE`, `UPD`, `DEL`, and `NIL` when unchanged records
/// are emitted). Deleted rows carry the old values, all other rows the new
/// ones.
///
/// Flat input is written back in its own layout without a header, the
/// transaction code taking a leading 3-character column in fixed-width
/// layouts. Delimited and LDIF input give delimited output with a header row.
///
/// # Errors
/// Fails on any I/O, parse or configuration error. `output` is left untouched
/// on failure.
pub fn reconcile_files(
    config: &ReconcileConfig,
    old: impl AsRef<Path>,
    new: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<ReconcileStats> {
    let (old, new, output) = (old.as_ref(), new.as_ref(), output.as_ref());
    let (reconciler, old_records, new_records) = prepare(config, old, new)?;
    tracing::info!(
        target: "ironrecon",
        old = %old.display(),
        new = %new.display(),
        output = %output.display(),
        "reconciling to {} output",
        if matches!(config.input, InputFormat::Flat { .. }) { "flat" } else { "delimited" }
    );

    write_output(config, output, |out| {
        let stats = match &config.input {
            InputFormat::Flat { layout } => write_flat(&reconciler, layout, old_records, new_records, out),
            InputFormat::Delimited | InputFormat::Ldif => {
                write_delimited(config, &reconciler, old_records, new_records, out)
            }
        };
        stats.with_context(|| format!("reconcile {} against {}", old.display(), new.display()))
    })
}

fn write_delimited(
    config: &ReconcileConfig,
    reconciler: &Reconciler,
    old_records: Records,
    new_records: Records,
    out: &mut AtomicFile,
) -> Result<ReconcileStats> {
    let mut writer = DelimitedWriter::new(out, &config.dialect)?;
    let mut header = vec![TRANSACTION_COLUMN];
    header.extend(reconciler.descriptor().field_names());
    writer.write_record(&header)?;
    let stats = reconciler.run(old_records, new_records, &mut |delta: Delta| -> ReconResult<()> {
        writer.write_field(delta.transaction.code(), false)?;
        writer.write_record(delta.record.values())
    })?;
    writer.flush()?;
    Ok(stats)
}

fn write_flat(
    reconciler: &Reconciler,
    layout: &FlatLayout,
    old_records: Records,
    new_records: Records,
    out: &mut AtomicFile,
) -> Result<ReconcileStats> {
    let fields = std::iter::once(TRANSACTION_COLUMN).chain(reconciler.descriptor().field_names());
    let descriptor = Descriptor::new(fields, &[TRANSACTION_COLUMN])?;
    let mut writer = FlatWriter::new(out, descriptor, layout.with_leading_column(TRANSACTION_WIDTH))?;
    let stats = reconciler.run(old_records, new_records, &mut |delta: Delta| -> ReconResult<()> {
        let mut values = Vec::with_capacity(delta.record.values().len() + 1);
        values.push(delta.transaction.code().to_string());
        values.extend(delta.record.into_values());
        writer.write_values(&Record::new(values), &TracingSink)
    })?;
    writer.flush()?;
    Ok(stats)
}

/// Reconcile two snapshot files into an LDIF change file using the
/// configured DN template.
///
/// # Errors
/// Fails on any I/O, parse or configuration error, including a missing DN
/// template. `output` is left untouched on failure.
pub fn reconcile_files_to_ldif(
    config: &ReconcileConfig,
    old: impl AsRef<Path>,
    new: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<ReconcileStats> {
    let (old, new, output) = (old.as_ref(), new.as_ref(), output.as_ref());
    let mapper = config.mapper()?;
    let (reconciler, old_records, new_records) = prepare(config, old, new)?;
    tracing::info!(
        target: "ironrecon",
        old = %old.display(),
        new = %new.display(),
        output = %output.display(),
        "reconciling to ldif output"
    );

    write_output(config, output, |out| {
        let mut writer = config.ldif_writer(out)?;
        writer.write_version()?;
        let stats = reconciler
            .run(old_records, new_records, &mut |delta: Delta| -> ReconResult<()> {
                match mapper.map(&delta) {
                    Some(change) => writer.write_change(&change),
                    None => Ok(()),
                }
            })
            .with_context(|| format!("reconcile {} against {}", old.display(), new.display()))?;
        writer.flush()?;
        Ok(stats)
    })
}

/// Fill a temporary file and swap it over `output`, unless the run changed
/// nothing and `skip_empty_output` is set.
fn write_output(
    config: &ReconcileConfig,
    output: &Path,
    fill: impl FnOnce(&mut AtomicFile) -> Result<ReconcileStats>,
) -> Result<ReconcileStats> {
    let mut file = AtomicFile::create(output)?;
    let stats = fill(&mut file)?;
    if config.skip_empty_output && stats.changes() == 0 {
        tracing::info!(target: "ironrecon", output = %output.display(), "snapshots match, output not written");
        file.discard();
    } else {
        file.commit()?;
    }
    Ok(stats)
}

fn prepare(config: &ReconcileConfig, old: &Path, new: &Path) -> Result<(Reconciler, Records, Records)> {
    config.validate().context("invalid reconciliation config")?;
    let descriptor = config.descriptor()?;
    let reconciler = Reconciler::new(descriptor.clone(), config.options())?;
    let old_records = open_records(config, &descriptor, old)?;
    let new_records = open_records(config, &descriptor, new)?;
    Ok((reconciler, old_records, new_records))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Delimited,
    Ldif,
}

/// One independent reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub old: PathBuf,
    pub new: PathBuf,
    pub output: PathBuf,
    pub kind: OutputKind,
}

impl FileJob {
    pub fn delimited(old: impl Into<PathBuf>, new: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
            output: output.into(),
            kind: OutputKind::Delimited,
        }
    }

    pub fn ldif(old: impl Into<PathBuf>, new: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            kind: OutputKind::Ldif,
            ..Self::delimited(old, new, output)
        }
    }

    /// # Errors
    /// See [`reconcile_files`] and [`reconcile_files_to_ldif`].
    pub fn run(&self, config: &ReconcileConfig) -> Result<ReconcileStats> {
        match self.kind {
            OutputKind::Delimited => reconcile_files(config, &self.old, &self.new, &self.output),
            OutputKind::Ldif => reconcile_files_to_ldif(config, &self.old, &self.new, &self.output),
        }
    }
}

/// Run independent jobs, in parallel with the `parallel-io` feature.
///
/// Results are returned in job order; one failing job does not stop the others.
#[must_use]
pub fn reconcile_many(config: &ReconcileConfig, jobs: &[FileJob]) -> Vec<Result<ReconcileStats>> {
    #[cfg(feature = "parallel-io")]
    {
        use rayon::prelude::*;
        jobs.par_iter().map(|job| job.run(config)).collect()
    }
    #[cfg(not(feature = "parallel-io"))]
    {
        jobs.iter().map(|job| job.run(config)).collect()
    }
}
