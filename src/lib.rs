//! # Ironrecon
//!
//! A **snapshot reconciliation engine** for keyed, tabular data. Given an old
//! and a new snapshot of the same dataset, both sorted by key, Ironrecon
//! classifies every record as created, updated, deleted or unchanged, and can
//! render the result as a delimited or flat change file, or as LDIF directory changes.
//!
//! ## Key Features
//!
//! - **Bounded memory** - both snapshots are streamed through fixed-size chunks
//! - **Composite, typed keys** - text or numeric comparison per key field
//! - **Delimited codec** - configurable separator, quote, escape and trimming
//! - **Flat codec** - one record per line, delimited or fixed-width
//! - **LDIF** - change records, encoder, reader, DN namespace rewriting and directory exports as snapshots
//! - **External sort** - spill-to-disk sorting for unsorted inputs (feature: `spilling`)
//! - **Transparent compression** - gzip and zstd inputs and outputs
//! - **Atomic output** - destinations are only replaced by complete files
//!
//! ## Quick Start
//!
//! ```
//! use ironrecon::*;
//!
//! # fn main() -> ironrecon::Result<()> {
//! let d = Descriptor::new(["id", "name"], &["id"])?;
//! let old = vec![d.record(["1", "Ann"]), d.record(["2", "Bob"])];
//! let new = vec![d.record(["2", "Robert"]), d.record(["3", "Cid"])];
//!
//! let (deltas, stats) = Reconciler::new(d, ReconcileOptions::default())?
//!     .reconcile(old.into_iter().map(Ok), new.into_iter().map(Ok))?;
//!
//! let codes: Vec<_> = deltas.iter().map(|x| x.transaction.code()).collect();
//! assert_eq!(codes, ["DEL", "UPD", "CRE"]);
//! assert_eq!(stats.processed, 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Files
//!
//! ```no_run
//! use ironrecon::ReconcileConfig;
//! use ironrecon::reconcile::reconcile_files;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ReconcileConfig::from_json_file("people.json")?;
//! let stats = reconcile_files(&config, "people.old.csv.gz", "people.new.csv.gz", "people.delta.csv")?;
//! println!("{} created, {} deleted", stats.created, stats.deleted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel-io` - run independent file jobs on the Rayon pool
//! - `compression-gzip` / `compression-zstd` - compressed snapshots
//! - `spilling` - external sort with on-disk runs
//! - `metrics` - run metrics collection
//!
//! ## Module Overview
//!
//! - [`record`] - descriptors, keys and records
//! - [`reconcile`] - the chunked merge-diff and file-level jobs
//! - [`io`] - delimited and flat codecs, compression, atomic output
//! - [`sort`] - key-ordered external sort
//! - [`directory`] - LDIF change records, encoder, reader and mapping
//! - [`config`] - JSON job configuration
//! - [`diagnostics`] - warning sinks for recoverable problems
//! - [`testing`] - fixtures and assertions for tests

pub mod config;
pub mod diagnostics;
pub mod directory;
pub mod error;
pub mod io;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod reconcile;
pub mod record;
pub mod sort;
pub mod testing;

// General re-exports
pub use config::{InputFormat, LdifConfig, ReconcileConfig};
pub use diagnostics::{DiagnosticSink, TracingSink};
pub use directory::{ChangeMapper, ChangeRecord, LdifReader, LdifRecords, LdifWriter, NamespaceSubstitution};
pub use error::{Error, ParseErrorKind, Result};
pub use io::{DelimitedReader, DelimitedWriter, Dialect, FlatLayout, FlatReader, FlatWriter};
pub use reconcile::{Delta, DeltaSink, RecordSource, ReconcileOptions, ReconcileStats, Reconciler};
pub use record::{Descriptor, Key, Record, Transaction};
pub use sort::ExternalSorter;

// Gated re-exports
#[cfg(feature = "metrics")]
pub use metrics::MetricsCollector;
