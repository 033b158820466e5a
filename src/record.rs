//! Keyed record model.
//!
//! A [`Descriptor`] declares the ordered field list of a dataset and which of
//! those fields form the key. Records are plain value vectors aligned to the
//! descriptor; the descriptor is what gives them identity and order:
//!
//! - [`Descriptor::key`] extracts the key fields in declared order.
//! - [`Descriptor::compare`] orders two records by key only. It is a pure
//!   function of the two keys and must agree with the order the inputs to
//!   [`Reconciler`](crate::reconcile::Reconciler) were sorted by.
//! - [`Descriptor::payload_equal`] compares the non-key fields.
//!
//! ```
//! use ironrecon::record::Descriptor;
//!
//! let d = Descriptor::new(["id", "name"], &["id"]).unwrap().numeric("id").unwrap();
//! let a = d.record(["9", "Nine"]);
//! let b = d.record(["10", "Ten"]);
//! assert!(d.compare(&a, &b).is_lt()); // numeric, not "10" < "9"
//! ```

use crate::error::{Error, ParseErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One declared field of a [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Compare this field numerically when it is part of the key.
    pub numeric: bool,
}

/// Field layout and key definition shared by the old and new snapshot.
#[derive(Debug, Clone)]
pub struct Descriptor {
    fields: Vec<FieldSpec>,
    key: Vec<usize>,
    index: HashMap<String, usize>,
}

impl Descriptor {
    /// Declare `fields` in order and select `key` (by name, in key order).
    ///
    /// # Errors
    /// [`Error::Config`] if the key is empty, names an undeclared field, or a
    /// field name is declared twice.
    pub fn new<I, S>(fields: I, key: &[&str]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<FieldSpec> = fields
            .into_iter()
            .map(|name| FieldSpec {
                name: name.into(),
                numeric: false,
            })
            .collect();
        let mut index = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if index.insert(f.name.clone(), i).is_some() {
                return Err(Error::Config(format!("field '{}' declared twice", f.name)));
            }
        }
        if key.is_empty() {
            return Err(Error::Config("key must name at least one field".into()));
        }
        let key = key
            .iter()
            .map(|k| {
                index
                    .get(*k)
                    .copied()
                    .ok_or_else(|| Error::Config(format!("key field '{k}' is not declared")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields, key, index })
    }

    /// Mark `name` as numeric for key ordering.
    ///
    /// # Errors
    /// [`Error::Config`] if the field is not declared.
    pub fn numeric(mut self, name: &str) -> Result<Self> {
        let i = self
            .index_of(name)
            .ok_or_else(|| Error::Config(format!("numeric field '{name}' is not declared")))?;
        self.fields[i].numeric = true;
        Ok(self)
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Indices of the key fields, in key order.
    #[must_use]
    pub fn key_fields(&self) -> &[usize] {
        &self.key
    }

    #[must_use]
    pub fn is_key_field(&self, index: usize) -> bool {
        self.key.contains(&index)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from positional values. Missing trailing values become
    /// empty; surplus values are dropped.
    pub fn record<I, S>(&self, values: I) -> Record
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        values.resize(self.fields.len(), String::new());
        Record { values }
    }

    /// Build a record from a name → value map. Absent fields become empty.
    ///
    /// # Errors
    /// [`Error::Parse`] with [`ParseErrorKind::UnknownField`] if the map names a
    /// field the descriptor does not declare.
    pub fn record_from_map(&self, map: &HashMap<String, String>) -> Result<Record> {
        if let Some(unknown) = map.keys().find(|k| !self.index.contains_key(*k)) {
            return Err(Error::parse(
                ParseErrorKind::UnknownField,
                0,
                format!("field '{unknown}' is not declared"),
            ));
        }
        let values = self
            .fields
            .iter()
            .map(|f| map.get(&f.name).cloned().unwrap_or_default())
            .collect();
        Ok(Record { values })
    }

    /// Extract the key of `record`.
    #[must_use]
    pub fn key(&self, record: &Record) -> Key {
        Key {
            parts: self
                .key
                .iter()
                .map(|&i| KeyPart {
                    value: record.get(i).to_string(),
                    numeric: self.fields[i].numeric,
                })
                .collect(),
        }
    }

    /// Order two records by key.
    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for &i in &self.key {
            let ord = compare_values(a.get(i), b.get(i), self.fields[i].numeric);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Whether two records carry the same non-key content. Fields are compared
    /// over the whole declaration; an absent value counts as empty.
    #[must_use]
    pub fn payload_equal(&self, a: &Record, b: &Record) -> bool {
        (0..self.fields.len())
            .filter(|i| !self.is_key_field(*i))
            .all(|i| a.get(i) == b.get(i))
    }

    /// Indices of non-key fields whose values differ between `old` and `new`.
    #[must_use]
    pub fn changed_fields(&self, old: &Record, new: &Record) -> Vec<usize> {
        (0..self.fields.len())
            .filter(|i| !self.is_key_field(*i) && old.get(*i) != new.get(*i))
            .collect()
    }
}

fn compare_values(a: &str, b: &str, numeric: bool) -> Ordering {
    if !numeric {
        return a.cmp(b);
    }
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        // unparseable values sort after every number
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
        }
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i128>() {
        return Some(Number::Int(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Number::Float)
}

/// Ordered key values of one record.
#[derive(Debug, Clone)]
pub struct Key {
    parts: Vec<KeyPart>,
}

#[derive(Debug, Clone)]
struct KeyPart {
    value: String,
    numeric: bool,
}

impl Key {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.value.as_str())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(&other.parts)
                .all(|(a, b)| compare_values(&a.value, &b.value, a.numeric) == Ordering::Equal)
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.parts.iter().zip(&other.parts) {
            let ord = compare_values(&a.value, &b.value, a.numeric);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.parts.len().cmp(&other.parts.len())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.values().collect();
        f.write_str(&joined.join("|"))
    }
}

/// Positional field values of one row, aligned to a [`Descriptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    values: Vec<String>,
}

impl Record {
    #[must_use]
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// Value at `index`, or `""` if the record is shorter.
    #[must_use]
    pub fn get(&self, index: usize) -> &str {
        self.values.get(index).map_or("", String::as_str)
    }

    /// Value of the field called `name`, or `""`.
    #[must_use]
    pub fn get_named<'a>(&'a self, descriptor: &Descriptor, name: &str) -> &'a str {
        descriptor.index_of(name).map_or("", |i| self.get(i))
    }

    /// Key of this record under `descriptor`.
    #[must_use]
    pub fn key(&self, descriptor: &Descriptor) -> Key {
        descriptor.key(self)
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    /// Name → value view of this record.
    #[must_use]
    pub fn to_map(&self, descriptor: &Descriptor) -> HashMap<String, String> {
        descriptor
            .field_names()
            .enumerate()
            .map(|(i, n)| (n.to_string(), self.get(i).to_string()))
            .collect()
    }
}

/// How a record differs from its counterpart in the other snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transaction {
    Nothing,
    Create,
    Update,
    Delete,
}

impl Transaction {
    /// Three-letter code persisted in reconciled output.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Nothing => "NIL",
            Self::Create => "CRE",
            Self::Update => "UPD",
            Self::Delete => "DEL",
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Transaction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NIL" => Ok(Self::Nothing),
            "CRE" => Ok(Self::Create),
            "UPD" => Ok(Self::Update),
            "DEL" => Ok(Self::Delete),
            other => Err(Error::parse(
                ParseErrorKind::Syntax,
                0,
                format!("unknown transaction code '{other}'"),
            )),
        }
    }
}
