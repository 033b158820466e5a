//! Turns reconciliation deltas into directory change records.
//!
//! | delta     | change                                              |
//! |-----------|-----------------------------------------------------|
//! | `Create`  | add with every non-empty field (and object classes) |
//! | `Delete`  | delete                                              |
//! | `Update`  | modify: `add` for newly filled fields, `delete` for emptied ones, `replace` otherwise |
//! | `Nothing` | none                                                |
//!
//! The DN comes from a template such as `uid={uid},ou=People,dc=example,dc=com`
//! whose `{field}` placeholders are filled with RDN-escaped record values.

use super::change::{AddContent, Attribute, ChangeRecord, ModifyContent, ModifyOp};
use super::namespace::NamespaceSubstitution;
use crate::error::{Error, ParseErrorKind, Result};
use crate::reconcile::Delta;
use crate::record::{Descriptor, Record, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(usize),
}

/// Parsed DN template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnTemplate {
    parts: Vec<Part>,
}

impl DnTemplate {
    /// Parse `template` against `descriptor`. `{{` and `}}` are literal braces.
    ///
    /// # Errors
    /// - [`Error::Parse`] with `UnknownField` if a placeholder names an
    ///   undeclared field.
    /// - [`Error::Config`] for an unbalanced brace.
    pub fn parse(template: &str, descriptor: &Descriptor) -> Result<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                    let Some(index) = descriptor.index_of(name.trim()) else {
                        return Err(Error::parse(
                            ParseErrorKind::UnknownField,
                            0,
                            format!("dn template placeholder '{{{name}}}'"),
                        ));
                    };
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Field(index));
                }
                '}' => {
                    return Err(Error::Config(format!("unbalanced '}}' in dn template '{template}'")));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        if parts.is_empty() {
            return Err(Error::Config("dn template is empty".into()));
        }
        Ok(Self { parts })
    }

    /// Fill the template from `record`.
    #[must_use]
    pub fn render(&self, record: &Record) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                Part::Literal(s) => s.clone(),
                Part::Field(i) => escape_rdn_value(record.get(*i)),
            })
            .collect()
    }
}

/// Escape a value for use inside an RDN.
#[must_use]
pub fn escape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let edge = (i == 0 && (c == ' ' || c == '#')) || (i == last && c == ' ');
        if edge || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Maps deltas of one dataset to change records.
#[derive(Debug, Clone)]
pub struct ChangeMapper {
    descriptor: Descriptor,
    template: DnTemplate,
    object_classes: Vec<String>,
    value_separator: Option<String>,
    namespace: Option<NamespaceSubstitution>,
}

impl ChangeMapper {
    /// # Errors
    /// See [`DnTemplate::parse`].
    pub fn new(descriptor: Descriptor, dn_template: &str) -> Result<Self> {
        let template = DnTemplate::parse(dn_template, &descriptor)?;
        Ok(Self {
            descriptor,
            template,
            object_classes: Vec::new(),
            value_separator: None,
            namespace: None,
        })
    }

    /// Object classes emitted first on every add.
    #[must_use]
    pub fn with_object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Split field values on `separator` into multiple attribute values.
    #[must_use]
    pub fn with_value_separator(mut self, separator: impl Into<String>) -> Self {
        let sep = separator.into();
        self.value_separator = (!sep.is_empty()).then_some(sep);
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: NamespaceSubstitution) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// DN of `record`, after namespace substitution.
    #[must_use]
    pub fn dn(&self, record: &Record) -> String {
        let dn = self.template.render(record);
        match &self.namespace {
            Some(ns) => ns.apply(&dn),
            None => dn,
        }
    }

    /// Change record for `delta`, or `None` for an unchanged record.
    #[must_use]
    pub fn map(&self, delta: &Delta) -> Option<ChangeRecord> {
        let dn = self.dn(&delta.record);
        match delta.transaction {
            Transaction::Nothing => None,
            Transaction::Delete => Some(ChangeRecord::delete(dn)),
            Transaction::Create => {
                let mut add = AddContent::default();
                if !self.object_classes.is_empty() {
                    add.add_attribute(Attribute::text("objectClass", self.object_classes.iter().cloned()));
                }
                for (i, name) in self.descriptor.field_names().enumerate() {
                    let values = self.values(delta.record.get(i));
                    if !values.is_empty() {
                        add.add_attribute(Attribute::text(name, values));
                    }
                }
                Some(ChangeRecord::add(dn, add))
            }
            Transaction::Update => {
                let mut modify = ModifyContent::default();
                let Some(old) = &delta.previous else {
                    return Some(ChangeRecord::modify(dn, modify));
                };
                let names: Vec<&str> = self.descriptor.field_names().collect();
                for i in self.descriptor.changed_fields(old, &delta.record) {
                    let before = self.values(old.get(i));
                    let after = self.values(delta.record.get(i));
                    let (op, values) = match (before.is_empty(), after.is_empty()) {
                        (true, false) => (ModifyOp::Add, after),
                        (false, true) => (ModifyOp::Remove, Vec::new()),
                        _ => (ModifyOp::Replace, after),
                    };
                    modify.push(op, Attribute::text(names[i], values));
                }
                Some(ChangeRecord::modify(dn, modify))
            }
        }
    }

    fn values(&self, raw: &str) -> Vec<String> {
        let parts: Vec<&str> = match &self.value_separator {
            Some(sep) => raw.split(sep.as_str()).collect(),
            None => vec![raw],
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}
