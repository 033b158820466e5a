//! Chunked merge-diff of two key-sorted record streams.
//!
//! The [`Reconciler`] walks an *old* and a *new* snapshot in a single forward
//! pass and classifies every record:
//!
//! | situation                          | transaction |
//! |------------------------------------|-------------|
//! | key only in old                    | `Delete`    |
//! | key only in new                    | `Create`    |
//! | key in both, a non-key field differs | `Update`  |
//! | key in both, all fields equal      | `Nothing`   |
//!
//! Both inputs must be sorted ascending by
//! [`Descriptor::compare`](crate::record::Descriptor::compare). This is not
//! verified; unsorted input yields an unspecified classification.
//!
//! ## Chunking
//! Each side is pulled into an owned buffer of at most `chunk_size` records.
//! When a buffer drains it is refilled from its stream before anything else is
//! classified, while the other side's unconsumed records stay where they are.
//! A record is only classified `Create` or `Delete` for lack of a counterpart
//! once the other stream is exhausted, so the output does not depend on the
//! chunk size.
//!
//! ```
//! use ironrecon::reconcile::{ReconcileOptions, Reconciler};
//! use ironrecon::record::{Descriptor, Transaction};
//!
//! # fn main() -> ironrecon::Result<()> {
//! let d = Descriptor::new(["id", "name"], &["id"])?;
//! let old = vec![d.record(["1", "A"]), d.record(["2", "B"])];
//! let new = vec![d.record(["2", "B2"]), d.record(["3", "C"])];
//!
//! let (deltas, stats) = Reconciler::new(d, ReconcileOptions::default())?
//!     .reconcile(old.into_iter().map(Ok), new.into_iter().map(Ok))?;
//! let marks: Vec<_> = deltas.iter().map(|x| x.transaction).collect();
//! assert_eq!(marks, [Transaction::Delete, Transaction::Update, Transaction::Create]);
//! assert_eq!(stats.processed, 3);
//! # Ok(())
//! # }
//! ```

pub mod files;

pub use files::{FileJob, reconcile_files, reconcile_files_to_ldif, reconcile_many};

use crate::error::{Error, Result};
use crate::record::{Descriptor, Record, Transaction};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Default number of records buffered per side.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// A pull-based stream of records.
///
/// Implemented for every iterator of `Result<Record>`, which covers
/// [`DelimitedRecords`](crate::io::DelimitedRecords),
/// [`FlatRecords`](crate::io::FlatRecords),
/// [`LdifRecords`](crate::directory::LdifRecords) and
/// [`SortedRecords`](crate::sort::SortedRecords).
pub trait RecordSource {
    /// Next record, or `Ok(None)` once the stream is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;
}

impl<I> RecordSource for I
where
    I: Iterator<Item = Result<Record>>,
{
    fn next_record(&mut self) -> Result<Option<Record>> {
        self.next().transpose()
    }
}

/// One classified record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub transaction: Transaction,
    /// The new record, or the old one for `Delete`.
    pub record: Record,
    /// The old record, for `Update` and `Nothing`.
    pub previous: Option<Record>,
}

impl Delta {
    /// Non-key fields that differ between `previous` and `record`.
    #[must_use]
    pub fn changed_fields(&self, descriptor: &Descriptor) -> Vec<usize> {
        self.previous
            .as_ref()
            .map(|old| descriptor.changed_fields(old, &self.record))
            .unwrap_or_default()
    }
}

/// Receiver of classified records, in ascending key order.
pub trait DeltaSink {
    /// # Errors
    /// Any error aborts the run and is returned by [`Reconciler::run`].
    fn accept(&mut self, delta: Delta) -> Result<()>;
}

impl DeltaSink for Vec<Delta> {
    fn accept(&mut self, delta: Delta) -> Result<()> {
        self.push(delta);
        Ok(())
    }
}

impl<F> DeltaSink for F
where
    F: FnMut(Delta) -> Result<()>,
{
    fn accept(&mut self, delta: Delta) -> Result<()> {
        self(delta)
    }
}

/// Per-run counters.
///
/// `processed` is the number of classifications; it always equals
/// `unchanged + created + updated + deleted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub processed: u64,
    pub unchanged: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Refills of one side while the other still held buffered records.
    pub chunks_merged: u64,
    pub old_records: u64,
    pub new_records: u64,
}

impl ReconcileStats {
    /// Count for a single transaction marker.
    #[must_use]
    pub fn count(&self, transaction: Transaction) -> u64 {
        match transaction {
            Transaction::Nothing => self.unchanged,
            Transaction::Create => self.created,
            Transaction::Update => self.updated,
            Transaction::Delete => self.deleted,
        }
    }

    /// Records created, updated or deleted.
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.created + self.updated + self.deleted
    }

    fn tally(&mut self, transaction: Transaction) {
        self.processed += 1;
        match transaction {
            Transaction::Nothing => self.unchanged += 1,
            Transaction::Create => self.created += 1,
            Transaction::Update => self.updated += 1,
            Transaction::Delete => self.deleted += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub chunk_size: usize,
    /// Hand `Nothing` deltas to the sink. They are counted either way.
    pub emit_unchanged: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            emit_unchanged: false,
        }
    }
}

impl ReconcileOptions {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_emit_unchanged(mut self, emit: bool) -> Self {
        self.emit_unchanged = emit;
        self
    }
}

/// The merge-diff engine.
#[derive(Debug, Clone)]
pub struct Reconciler {
    descriptor: Descriptor,
    options: ReconcileOptions,
}

impl Reconciler {
    /// # Errors
    /// [`Error::Config`] if `options.chunk_size` is 0.
    pub fn new(descriptor: Descriptor, options: ReconcileOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(Error::Config("chunk size must be at least 1".into()));
        }
        Ok(Self {
            descriptor,
            options,
        })
    }

    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile `old` against `new`, pushing deltas into `sink`.
    ///
    /// # Errors
    /// The first error raised by either source or by the sink. Deltas already
    /// accepted by the sink stay accepted.
    pub fn run<O, N, S>(&self, old: O, new: N, sink: &mut S) -> Result<ReconcileStats>
    where
        O: RecordSource,
        N: RecordSource,
        S: DeltaSink + ?Sized,
    {
        let mut old = Chunk::new(old, self.options.chunk_size);
        let mut new = Chunk::new(new, self.options.chunk_size);
        let mut stats = ReconcileStats::default();

        loop {
            if old.needs_fill() {
                let carried = new.buffer.len();
                if old.fill()? && carried > 0 {
                    stats.chunks_merged += 1;
                    tracing::debug!(target: "ironrecon", side = "old", carried, "chunk refilled");
                }
            }
            if new.needs_fill() {
                let carried = old.buffer.len();
                if new.fill()? && carried > 0 {
                    stats.chunks_merged += 1;
                    tracing::debug!(target: "ironrecon", side = "new", carried, "chunk refilled");
                }
            }

            let step = match (old.buffer.front(), new.buffer.front()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(o), Some(n)) => self.descriptor.compare(o, n),
            };
            let delta = match step {
                Ordering::Less => Delta {
                    transaction: Transaction::Delete,
                    record: old.pop(),
                    previous: None,
                },
                Ordering::Greater => Delta {
                    transaction: Transaction::Create,
                    record: new.pop(),
                    previous: None,
                },
                Ordering::Equal => {
                    let previous = old.pop();
                    let record = new.pop();
                    let transaction = if self.descriptor.payload_equal(&previous, &record) {
                        Transaction::Nothing
                    } else {
                        Transaction::Update
                    };
                    Delta {
                        transaction,
                        record,
                        previous: Some(previous),
                    }
                }
            };

            stats.tally(delta.transaction);
            if delta.transaction != Transaction::Nothing || self.options.emit_unchanged {
                sink.accept(delta)?;
            }
        }

        stats.old_records = old.read;
        stats.new_records = new.read;
        tracing::info!(
            target: "ironrecon",
            processed = stats.processed,
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            unchanged = stats.unchanged,
            chunks_merged = stats.chunks_merged,
            "reconciliation finished"
        );
        Ok(stats)
    }

    /// Reconcile into a vector.
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub fn reconcile<O, N>(&self, old: O, new: N) -> Result<(Vec<Delta>, ReconcileStats)>
    where
        O: RecordSource,
        N: RecordSource,
    {
        let mut deltas = Vec::new();
        let stats = self.run(old, new, &mut deltas)?;
        Ok((deltas, stats))
    }
}

/// Owned window over one side's stream.
struct Chunk<S> {
    source: S,
    buffer: VecDeque<Record>,
    size: usize,
    exhausted: bool,
    loads: u64,
    read: u64,
}

impl<S: RecordSource> Chunk<S> {
    fn new(source: S, size: usize) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            size,
            exhausted: false,
            loads: 0,
            read: 0,
        }
    }

    fn needs_fill(&self) -> bool {
        self.buffer.is_empty() && !self.exhausted
    }

    /// Load up to `size` records. Returns whether this was a refill after an
    /// earlier load that brought in at least one record.
    fn fill(&mut self) -> Result<bool> {
        while self.buffer.len() < self.size {
            match self.source.next_record()? {
                Some(r) => self.buffer.push_back(r),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if self.buffer.is_empty() {
            return Ok(false);
        }
        self.read += self.buffer.len() as u64;
        self.loads += 1;
        Ok(self.loads > 1)
    }

    /// Callers check `front()` first.
    fn pop(&mut self) -> Record {
        self.buffer.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Descriptor {
        Descriptor::new(["id", "name"], &["id"]).unwrap()
    }

    fn rows(d: &Descriptor, data: &[(&str, &str)]) -> Vec<Result<Record>> {
        data.iter().map(|(k, v)| Ok(d.record([*k, *v]))).collect()
    }

    fn run(chunk: usize, old: &[(&str, &str)], new: &[(&str, &str)]) -> (Vec<Delta>, ReconcileStats) {
        let d = people();
        let r = Reconciler::new(d.clone(), ReconcileOptions::default().with_chunk_size(chunk)).unwrap();
        r.reconcile(rows(&d, old).into_iter(), rows(&d, new).into_iter())
            .unwrap()
    }

    #[test]
    fn empty_old_creates_everything() {
        let (deltas, stats) = run(2, &[], &[("1", "a"), ("2", "b"), ("3", "c")]);
        assert!(deltas.iter().all(|d| d.transaction == Transaction::Create));
        assert_eq!(stats.created, 3);
        assert_eq!(stats.new_records, 3);
        assert_eq!(stats.chunks_merged, 0);
    }

    #[test]
    fn empty_new_deletes_everything() {
        let (deltas, stats) = run(1, &[("1", "a"), ("2", "b")], &[]);
        assert_eq!(deltas.len(), 2);
        assert!(deltas.iter().all(|d| d.transaction == Transaction::Delete));
        assert_eq!(stats.deleted, 2);
    }

    #[test]
    fn unchanged_records_are_counted_but_not_emitted() {
        let (deltas, stats) = run(10, &[("1", "a"), ("2", "b")], &[("1", "a"), ("2", "b")]);
        assert!(deltas.is_empty());
        assert_eq!(stats.unchanged, 2);
        assert_eq!(stats.processed, 2);
    }

    #[test]
    fn boundary_record_is_carried_to_the_next_chunk() {
        // old chunk 1 = [1, 2]; new chunk 1 = [3, 4]. Key 3 must wait for old
        // chunk 2 instead of being created when old chunk 1 drains.
        let (deltas, stats) = run(
            2,
            &[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d")],
            &[("3", "c"), ("4", "x")],
        );
        let got: Vec<(Transaction, &str)> = deltas
            .iter()
            .map(|d| (d.transaction, d.record.get(0)))
            .collect();
        assert_eq!(
            got,
            [
                (Transaction::Delete, "1"),
                (Transaction::Delete, "2"),
                (Transaction::Update, "4"),
            ]
        );
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.chunks_merged, 1);
    }

    #[test]
    fn update_keeps_previous_record() {
        let (deltas, _) = run(1, &[("2", "B")], &[("2", "B2")]);
        assert_eq!(deltas[0].transaction, Transaction::Update);
        assert_eq!(deltas[0].previous.as_ref().unwrap().get(1), "B");
        assert_eq!(deltas[0].changed_fields(&people()), [1]);
    }

    #[test]
    fn zero_chunk_size_is_a_configuration_error() {
        let err = Reconciler::new(people(), ReconcileOptions::default().with_chunk_size(0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn sink_errors_abort_the_run() {
        let d = people();
        let r = Reconciler::new(d.clone(), ReconcileOptions::default()).unwrap();
        let mut seen = 0;
        let mut sink = |_: Delta| -> Result<()> {
            seen += 1;
            Err(Error::PreconditionViolation("sink full".into()))
        };
        let res = r.run(
            rows(&d, &[("1", "a")]).into_iter(),
            rows(&d, &[]).into_iter(),
            &mut sink,
        );
        assert!(res.is_err());
        assert_eq!(seen, 1);
    }
}
