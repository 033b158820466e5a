//! Deterministic datasets.

use crate::error::Result;
use crate::record::{Descriptor, Record};

/// Field names of [`people_descriptor`].
pub const PEOPLE_FIELDS: [&str; 4] = ["uid", "cn", "mail", "telephoneNumber"];

/// `uid, cn, mail, telephoneNumber`, keyed by `uid`.
///
/// # Panics
///
/// Never: the declaration is static and valid.
#[must_use]
pub fn people_descriptor() -> Descriptor {
    Descriptor::new(PEOPLE_FIELDS, &["uid"]).expect("static descriptor is valid")
}

/// Collects rows for one snapshot and sorts them by key on build.
pub struct SnapshotBuilder<'a> {
    descriptor: &'a Descriptor,
    rows: Vec<Record>,
}

impl<'a> SnapshotBuilder<'a> {
    #[must_use]
    pub fn new(descriptor: &'a Descriptor) -> Self {
        Self {
            descriptor,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn row<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(self.descriptor.record(values));
        self
    }

    #[must_use]
    pub fn rows(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.rows.extend(records);
        self
    }

    /// Rows in ascending key order.
    #[must_use]
    pub fn build(mut self) -> Vec<Record> {
        let d = self.descriptor;
        self.rows.sort_by(|a, b| d.compare(a, b));
        self.rows
    }
}

/// Turn owned records into a record source.
pub fn as_source(records: Vec<Record>) -> impl Iterator<Item = Result<Record>> {
    records.into_iter().map(Ok)
}

struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.0 / 65536
    }
}

/// `count` people with zero-padded uids `u000000..`, sorted by key.
///
/// # Example
///
/// ```
/// use ironrecon::testing::generate_people;
///
/// let people = generate_people(3, 7);
/// assert_eq!(people[2].get(0), "u000002");
/// ```
#[must_use]
pub fn generate_people(count: usize, seed: u32) -> Vec<Record> {
    let mut rng = Lcg(seed);
    (0..count)
        .map(|i| {
            let phone = if rng.next() % 4 == 0 {
                String::new()
            } else {
                format!("+1-555-{:04}", rng.next() % 10_000)
            };
            Record::new(vec![
                format!("u{i:06}"),
                format!("Person {i}"),
                format!("p{i}.{}@example.com", rng.next() % 100),
                phone,
            ])
        })
        .collect()
}

/// Derive a new snapshot from `old`: roughly a tenth of the rows are dropped,
/// a tenth get a new mail address, and `created` fresh rows are appended
/// after the last existing uid. Output stays sorted.
#[must_use]
pub fn evolve_people(old: &[Record], seed: u32, created: usize) -> Vec<Record> {
    let mut rng = Lcg(seed);
    let mut out: Vec<Record> = old
        .iter()
        .filter_map(|r| match rng.next() % 10 {
            0 => None,
            1 => {
                let mut values = r.values().to_vec();
                values[2] = format!("changed.{}@example.org", rng.next() % 1000);
                Some(Record::new(values))
            }
            _ => Some(r.clone()),
        })
        .collect();
    let base = old.len();
    out.extend((0..created).map(|i| {
        Record::new(vec![
            format!("u{:06}", base + i),
            format!("New {i}"),
            format!("new{i}@example.com"),
            String::new(),
        ])
    }));
    out
}
