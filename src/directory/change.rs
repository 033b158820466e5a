//! Directory change records.
//!
//! A [`ChangeRecord`] pairs a distinguished name with one of three content
//! variants. The variant decides which operations are meaningful: an add
//! carries a full attribute set, a delete carries nothing, and a modify carries
//! an ordered list of attribute modifications.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One attribute value. Binary values are always base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

/// A named, possibly multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    /// Attribute without values; in a modify `Remove` this drops the whole attribute.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Attribute with text values.
    pub fn text<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(|v| AttributeValue::Text(v.into())).collect(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<AttributeValue>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Attribute names are case-insensitive.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Full attribute set of a new entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddContent {
    attributes: Vec<Attribute>,
}

impl AddContent {
    /// Add `attribute`. Values of an attribute already present are appended to it.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.is_named(&attribute.name)) {
            Some(existing) => existing.values.extend(attribute.values),
            None => self.attributes.push(attribute),
        }
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }
}

/// Content of a delete. Carries no attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteContent;

/// Kind of a single attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifyOp {
    Add,
    Replace,
    Remove,
}

impl ModifyOp {
    /// Keyword used on the wire.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "delete",
        }
    }

    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "replace" => Some(Self::Replace),
            "delete" => Some(Self::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub op: ModifyOp,
    pub attribute: Attribute,
}

/// Ordered attribute modifications of an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyContent {
    modifications: Vec<Modification>,
}

impl ModifyContent {
    pub fn push(&mut self, op: ModifyOp, attribute: Attribute) {
        self.modifications.push(Modification { op, attribute });
    }

    #[must_use]
    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
}

impl ChangeType {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Modify => "modify",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Add(AddContent),
    Delete(DeleteContent),
    Modify(ModifyContent),
}

impl Content {
    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Add(_) => ChangeType::Add,
            Self::Delete(_) => ChangeType::Delete,
            Self::Modify(_) => ChangeType::Modify,
        }
    }

    /// Add an attribute to the content. On a modify this appends an `Add`
    /// modification.
    ///
    /// # Errors
    /// [`Error::UnsupportedOperation`] on a delete.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<()> {
        match self {
            Self::Add(c) => c.add_attribute(attribute),
            Self::Modify(c) => c.push(ModifyOp::Add, attribute),
            Self::Delete(_) => {
                return Err(Error::UnsupportedOperation("delete content carries no attributes"));
            }
        }
        Ok(())
    }
}

/// A distinguished name and what happens to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub dn: String,
    pub content: Content,
}

impl ChangeRecord {
    pub fn add(dn: impl Into<String>, content: AddContent) -> Self {
        Self {
            dn: dn.into(),
            content: Content::Add(content),
        }
    }

    pub fn delete(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            content: Content::Delete(DeleteContent),
        }
    }

    pub fn modify(dn: impl Into<String>, content: ModifyContent) -> Self {
        Self {
            dn: dn.into(),
            content: Content::Modify(content),
        }
    }

    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        self.content.change_type()
    }
}
