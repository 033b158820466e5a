//! Job configuration.
//!
//! A [`ReconcileConfig`] describes one dataset: how its snapshots are encoded,
//! which fields they carry, which of those form the key, and how changes are
//! rendered as LDIF. It is usually loaded from JSON:
//!
//! ```json
//! {
//!   "fields": ["uid", "cn", "mail"],
//!   "key": ["uid"],
//!   "chunk_size": 5000,
//!   "dialect": { "separator": ";" },
//!   "ldif": {
//!     "dn_template": "uid={uid},ou=People,dc=example,dc=com",
//!     "object_classes": ["inetOrgPerson"],
//!     "namespace": { "source": "dc=example,dc=com", "target": "dc=corp,dc=net" }
//!   }
//! }
//! ```
//!
//! Every key is optional except `fields` and `key`; see [`ReconcileConfig::default`].

use crate::directory::encoder::LdifWriter;
use crate::directory::mapping::ChangeMapper;
use crate::directory::namespace::NamespaceSubstitution;
use crate::error::{Error, Result};
use crate::io::delimited::Dialect;
use crate::io::flat::FlatLayout;
use crate::reconcile::{DEFAULT_CHUNK_SIZE, ReconcileOptions};
use crate::record::Descriptor;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// How snapshot files are encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum InputFormat {
    /// Delimited text with a header row, read with the configured dialect.
    #[default]
    Delimited,
    /// Flat lines without header; columns are positional. Reconciled output
    /// uses the same layout behind a transaction column.
    Flat { layout: FlatLayout },
    /// LDIF directory export; one entry per record, multi-valued attributes
    /// joined by `ldif.value_separator`.
    Ldif,
}

/// LDIF rendering options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LdifConfig {
    pub dn_template: String,
    pub object_classes: Vec<String>,
    pub value_separator: Option<String>,
    pub namespace: Option<NamespaceSubstitution>,
    pub wrap_column: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub input: InputFormat,
    pub dialect: Dialect,
    pub fields: Vec<String>,
    pub key: Vec<String>,
    /// Fields compared numerically when part of the key.
    pub numeric: Vec<String>,
    pub chunk_size: usize,
    /// Comment character of flat input.
    pub comment_char: Option<char>,
    pub emit_unchanged: bool,
    /// Sort inputs by key before reconciling.
    pub sort_inputs: bool,
    /// Leave the output file alone when nothing was created, updated or deleted.
    pub skip_empty_output: bool,
    pub ldif: LdifConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            input: InputFormat::default(),
            dialect: Dialect::default(),
            fields: Vec::new(),
            key: Vec::new(),
            numeric: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            comment_char: Some('#'),
            emit_unchanged: false,
            sort_inputs: false,
            skip_empty_output: false,
            ldif: LdifConfig::default(),
        }
    }
}

impl ReconcileConfig {
    /// Minimal configuration for `fields` keyed by `key`.
    pub fn new<I, S>(fields: I, key: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            key: key.iter().map(|k| (*k).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Parse and validate JSON.
    ///
    /// # Errors
    /// [`Error::Config`] if the JSON is malformed or the result is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    /// Fails if the file cannot be read or [`from_json_str`](Self::from_json_str) fails.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("load config {}", path.display()))
    }

    /// # Errors
    /// [`Error::Config`] for a zero chunk size, an empty or undeclared key, an
    /// invalid dialect or flat layout, or an invalid LDIF setup.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.key.is_empty() {
            return Err(Error::Config("key must name at least one field".into()));
        }
        self.dialect.validate()?;
        if let InputFormat::Flat { layout } = &self.input {
            layout.validate()?;
        }
        let descriptor = self.descriptor()?;
        if !self.ldif.dn_template.is_empty() {
            ChangeMapper::new(descriptor, &self.ldif.dn_template)?;
        }
        if let Some(col) = self.ldif.wrap_column
            && col < 2
        {
            return Err(Error::Config(format!("wrap_column {col} is too small")));
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::Config`] if the key or a numeric field is undeclared.
    pub fn descriptor(&self) -> Result<Descriptor> {
        let key: Vec<&str> = self.key.iter().map(String::as_str).collect();
        let mut descriptor = Descriptor::new(self.fields.iter().cloned(), &key)?;
        for name in &self.numeric {
            descriptor = descriptor.numeric(name)?;
        }
        Ok(descriptor)
    }

    #[must_use]
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            chunk_size: self.chunk_size,
            emit_unchanged: self.emit_unchanged,
        }
    }

    /// # Errors
    /// [`Error::Config`] if no DN template is configured, or the template is invalid.
    pub fn mapper(&self) -> Result<ChangeMapper> {
        if self.ldif.dn_template.is_empty() {
            return Err(Error::Config("ldif.dn_template is required for LDIF output".into()));
        }
        let mut mapper = ChangeMapper::new(self.descriptor()?, &self.ldif.dn_template)?
            .with_object_classes(self.ldif.object_classes.iter().cloned());
        if let Some(sep) = &self.ldif.value_separator {
            mapper = mapper.with_value_separator(sep.clone());
        }
        if let Some(ns) = &self.ldif.namespace {
            mapper = mapper.with_namespace(ns.clone());
        }
        Ok(mapper)
    }

    /// LDIF writer over `inner` with the configured folding.
    ///
    /// # Errors
    /// [`Error::Config`] if `wrap_column` is too small.
    pub fn ldif_writer<W: Write>(&self, inner: W) -> Result<LdifWriter<W>> {
        let writer = LdifWriter::new(inner);
        match self.ldif.wrap_column {
            Some(col) => writer.with_wrap_column(col),
            None => Ok(writer),
        }
    }
}
