//! External sort by key.
//!
//! Reconciliation needs both snapshots in ascending key order. Inputs that do
//! not fit in one run are cut into sorted runs, each spilled to an anonymous
//! temporary file, and merged back with a k-way merge.
//!
//! ## Design notes
//! - Runs are sorted with a stable sort and ties in the merge go to the lower
//!   run index, so records with equal keys keep their input order.
//! - Spilled records are framed as a little-endian `u32` length followed by the
//!   `postcard` encoding of the [`Record`].
//! - Without the `spilling` feature every input is sorted in memory.

use crate::error::{Error, Result};
use crate::io::atomic::repack_in_place;
use crate::io::delimited::{DelimitedReader, DelimitedWriter, Dialect};
use crate::record::{Descriptor, Record};
use std::path::{Path, PathBuf};

/// Sorts record streams by a descriptor's key.
#[derive(Debug, Clone)]
pub struct ExternalSorter {
    descriptor: Descriptor,
    run_size: usize,
    #[cfg_attr(not(feature = "spilling"), allow(dead_code))]
    temp_dir: Option<PathBuf>,
}

impl ExternalSorter {
    /// Sorter holding at most `run_size` records in memory at a time.
    ///
    /// # Errors
    /// [`Error::Config`] if `run_size` is 0.
    pub fn new(descriptor: Descriptor, run_size: usize) -> Result<Self> {
        if run_size == 0 {
            return Err(Error::Config("sort run size must be at least 1".into()));
        }
        Ok(Self {
            descriptor,
            run_size,
            temp_dir: None,
        })
    }

    /// Spill runs into `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sort `input` and return the records in ascending key order.
    ///
    /// # Errors
    /// The first error of `input`, or [`Error::Io`] if a run cannot be spilled.
    pub fn sort<I>(&self, input: I) -> Result<SortedRecords>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut input = input.into_iter();
        let first = self.next_run(&mut input)?;
        if first.len() < self.run_size {
            return Ok(SortedRecords::memory(first));
        }
        self.sort_runs(first, input)
    }

    fn next_run(&self, input: &mut impl Iterator<Item = Result<Record>>) -> Result<Vec<Record>> {
        let mut run = Vec::new();
        for rec in input.by_ref().take(self.run_size) {
            run.push(rec?);
        }
        run.sort_by(|a, b| self.descriptor.compare(a, b));
        Ok(run)
    }

    #[cfg(feature = "spilling")]
    fn sort_runs(
        &self,
        first: Vec<Record>,
        mut input: impl Iterator<Item = Result<Record>>,
    ) -> Result<SortedRecords> {
        let dir = self.temp_dir.as_deref();
        let mut runs = vec![spill::Run::write(&first, dir)?];
        drop(first);
        loop {
            let run = self.next_run(&mut input)?;
            if run.is_empty() {
                break;
            }
            let last = run.len() < self.run_size;
            runs.push(spill::Run::write(&run, dir)?);
            if last {
                break;
            }
        }
        tracing::debug!(target: "ironrecon", runs = runs.len(), "merging spilled sort runs");
        Ok(SortedRecords {
            inner: Inner::Merge(spill::Merge::new(self.descriptor.clone(), runs)?),
        })
    }

    #[cfg(not(feature = "spilling"))]
    fn sort_runs(
        &self,
        mut all: Vec<Record>,
        input: impl Iterator<Item = Result<Record>>,
    ) -> Result<SortedRecords> {
        for rec in input {
            all.push(rec?);
        }
        all.sort_by(|a, b| self.descriptor.compare(a, b));
        Ok(SortedRecords::memory(all))
    }
}

/// Records in ascending key order, produced by [`ExternalSorter::sort`].
pub struct SortedRecords {
    inner: Inner,
}

enum Inner {
    Memory(std::vec::IntoIter<Record>),
    #[cfg(feature = "spilling")]
    Merge(spill::Merge),
}

impl SortedRecords {
    fn memory(records: Vec<Record>) -> Self {
        Self {
            inner: Inner::Memory(records.into_iter()),
        }
    }

    /// Whether any run was spilled to disk.
    #[must_use]
    pub fn spilled(&self) -> bool {
        !matches!(self.inner, Inner::Memory(_))
    }
}

impl Iterator for SortedRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Memory(it) => it.next().map(Ok),
            #[cfg(feature = "spilling")]
            Inner::Merge(m) => m.next_record().transpose(),
        }
    }
}

/// Sort a headered delimited file by key, in place.
///
/// Returns the number of data records written.
///
/// # Errors
/// Fails if the file cannot be read, parsed or replaced. The original file is
/// left intact on failure.
pub fn sort_file_in_place(
    path: impl AsRef<Path>,
    dialect: &Dialect,
    descriptor: &Descriptor,
    run_size: usize,
) -> anyhow::Result<u64> {
    let path = path.as_ref();
    let sorter = ExternalSorter::new(descriptor.clone(), run_size)?;
    repack_in_place(path, |input, out| {
        let records = DelimitedReader::new(input, dialect.clone())?.into_records(descriptor, true)?;
        let mut writer = DelimitedWriter::new(out, dialect)?;
        writer.write_record(&descriptor.field_names().collect::<Vec<_>>())?;
        let mut n = 0;
        for rec in sorter.sort(records)? {
            writer.write_record(rec?.values())?;
            n += 1;
        }
        writer.flush()?;
        tracing::debug!(target: "ironrecon", path = %path.display(), records = n, "sorted in place");
        Ok(n)
    })
}

#[cfg(feature = "spilling")]
mod spill {
    use crate::error::{Error, Result};
    use crate::record::{Descriptor, Key, Record};
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;
    use std::fs::File;
    use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
    use std::path::Path;

    #[derive(Debug)]
    struct HeapEntry {
        key: Key,
        run: usize,
        record: Record,
    }

    impl PartialEq for HeapEntry {
        fn eq(&self, other: &Self) -> bool {
            self.key == other.key && self.run == other.run
        }
    }

    impl Eq for HeapEntry {}

    impl PartialOrd for HeapEntry {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for HeapEntry {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.key.cmp(&other.key).then(self.run.cmp(&other.run))
        }
    }

    /// A sorted run spilled to an anonymous temporary file.
    pub(super) struct Run {
        reader: BufReader<File>,
    }

    impl Run {
        pub(super) fn write(records: &[Record], dir: Option<&Path>) -> Result<Self> {
            let file = match dir {
                Some(d) => tempfile::tempfile_in(d),
                None => tempfile::tempfile(),
            }
            .map_err(|e| Error::io("create sort run", e))?;
            let mut w = BufWriter::new(file);
            for rec in records {
                let bytes = postcard::to_allocvec(rec).map_err(|e| {
                    Error::io("encode sort run", io::Error::new(io::ErrorKind::InvalidData, e))
                })?;
                let len = u32::try_from(bytes.len()).map_err(|_| {
                    Error::io(
                        "encode sort run",
                        io::Error::new(io::ErrorKind::InvalidData, "record too large"),
                    )
                })?;
                w.write_all(&len.to_le_bytes())
                    .and_then(|()| w.write_all(&bytes))
                    .map_err(|e| Error::io("write sort run", e))?;
            }
            let mut file = w
                .into_inner()
                .map_err(|e| Error::io("flush sort run", e.into_error()))?;
            file.seek(SeekFrom::Start(0))
                .map_err(|e| Error::io("rewind sort run", e))?;
            Ok(Self {
                reader: BufReader::new(file),
            })
        }

        fn next(&mut self) -> Result<Option<Record>> {
            let mut len = [0u8; 4];
            match self.reader.read_exact(&mut len) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(Error::io("read sort run", e)),
            }
            let mut buf = vec![0u8; u32::from_le_bytes(len) as usize];
            self.reader
                .read_exact(&mut buf)
                .map_err(|e| Error::io("read sort run", e))?;
            postcard::from_bytes(&buf)
                .map(Some)
                .map_err(|e| Error::io("decode sort run", io::Error::new(io::ErrorKind::InvalidData, e)))
        }
    }

    /// K-way merge over spilled runs.
    pub(super) struct Merge {
        descriptor: Descriptor,
        runs: Vec<Run>,
        heap: BinaryHeap<Reverse<HeapEntry>>,
    }

    impl Merge {
        pub(super) fn new(descriptor: Descriptor, mut runs: Vec<Run>) -> Result<Self> {
            let mut heap = BinaryHeap::with_capacity(runs.len());
            for (i, run) in runs.iter_mut().enumerate() {
                if let Some(record) = run.next()? {
                    heap.push(Reverse(HeapEntry {
                        key: descriptor.key(&record),
                        run: i,
                        record,
                    }));
                }
            }
            Ok(Self {
                descriptor,
                runs,
                heap,
            })
        }

        pub(super) fn next_record(&mut self) -> Result<Option<Record>> {
            let Some(Reverse(top)) = self.heap.pop() else {
                return Ok(None);
            };
            if let Some(record) = self.runs[top.run].next()? {
                self.heap.push(Reverse(HeapEntry {
                    key: self.descriptor.key(&record),
                    run: top.run,
                    record,
                }));
            }
            Ok(Some(top.record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Descriptor {
        Descriptor::new(["id", "name"], &["id"])
            .unwrap()
            .numeric("id")
            .unwrap()
    }

    fn ids(records: SortedRecords) -> Vec<String> {
        records
            .map(|r| r.unwrap().get(0).to_string())
            .collect()
    }

    #[test]
    fn small_input_sorts_in_memory() {
        let d = people();
        let input = ["3", "1", "2"].map(|id| Ok(d.record([id, "x"])));
        let sorted = ExternalSorter::new(d.clone(), 10).unwrap().sort(input).unwrap();
        assert!(!sorted.spilled());
        assert_eq!(ids(sorted), ["1", "2", "3"]);
    }

    #[test]
    fn large_input_merges_runs_and_keeps_ties_stable() {
        let d = people();
        let mut input = Vec::new();
        for i in (0..25).rev() {
            input.push(Ok(d.record([i.to_string(), format!("first-{i}")])));
        }
        input.push(Ok(d.record(["7", "second-7"])));
        let sorted = ExternalSorter::new(d.clone(), 4).unwrap().sort(input).unwrap();
        #[cfg(feature = "spilling")]
        assert!(sorted.spilled());
        let out: Vec<Record> = sorted.collect::<Result<_>>().unwrap();
        assert_eq!(out.len(), 26);
        assert!(out.windows(2).all(|w| d.compare(&w[0], &w[1]).is_le()));
        let sevens: Vec<&str> = out.iter().filter(|r| r.get(0) == "7").map(|r| r.get(1)).collect();
        assert_eq!(sevens, ["first-7", "second-7"]);
    }

    #[test]
    fn input_errors_propagate() {
        let d = people();
        let input = vec![
            Ok(d.record(["1", "a"])),
            Err(Error::Config("broken source".into())),
        ];
        assert!(ExternalSorter::new(d, 1).unwrap().sort(input).is_err());
    }

    #[test]
    fn zero_run_size_is_rejected() {
        assert!(matches!(ExternalSorter::new(people(), 0), Err(Error::Config(_))));
    }
}
