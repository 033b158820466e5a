//! Directory change records and their LDIF wire format.
//!
//! - [`change`]: the change model (`Add`, `Delete`, `Modify` contents)
//! - [`encoder`]: streaming LDIF writer
//! - [`reader`]: LDIF change reader, and snapshot entries as records
//! - [`namespace`]: DN suffix substitution
//! - [`mapping`]: reconciliation deltas to change records

pub mod change;
pub mod encoder;
pub mod mapping;
pub mod namespace;
pub mod reader;

pub use change::{
    AddContent, Attribute, AttributeValue, ChangeRecord, ChangeType, Content, DeleteContent, Modification,
    ModifyContent, ModifyOp,
};
pub use encoder::LdifWriter;
pub use mapping::{ChangeMapper, DnTemplate};
pub use namespace::NamespaceSubstitution;
pub use reader::{LdifReader, LdifRecords};
