//! Recognised tags as plain values.

use std::fmt;

use crate::atom::AtomId;
use crate::span::Span;

/// Index of a descriptor in a [`crate::TagTypeTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagTypeId(pub u16);

impl TagTypeId {
    /// `<...>` that no registered start-tag grammar accepted.
    pub const UNREGISTERED_START: TagTypeId = TagTypeId(0);
    /// `</...>` that no registered end-tag grammar accepted.
    pub const UNREGISTERED_END: TagTypeId = TagTypeId(1);

    pub fn is_unregistered(self) -> bool {
        self == Self::UNREGISTERED_START || self == Self::UNREGISTERED_END
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagRole {
    Start,
    End,
}

/// A tag found in a document.
///
/// `Tag` holds no reference to its document; names resolve through the
/// owning source's atom table and types through its tag-type table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    pub span: Span,
    /// Delimiter plus name, excluding attributes and the closing delimiter.
    pub name_span: Span,
    pub type_id: TagTypeId,
    pub name: AtomId,
    pub role: TagRole,
}

impl Tag {
    pub fn begin(&self) -> usize {
        self.span.begin()
    }

    pub fn end(&self) -> usize {
        self.span.end()
    }

    pub fn is_unregistered(&self) -> bool {
        self.type_id.is_unregistered()
    }

    pub fn is_start(&self) -> bool {
        self.role == TagRole::Start
    }

    pub fn is_end(&self) -> bool {
        self.role == TagRole::End
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.span.fmt(f)
    }
}

/// Attribute of a normal start tag, as spans into the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: Span,
    /// Value without its quotes; `None` for a bare attribute.
    pub value: Option<Span>,
}
