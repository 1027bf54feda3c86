//! Tag-type descriptors and the immutable table that orders them.
//!
//! A [`TagType`] is plain data plus two function pointers: a position
//! predicate and a constructor. The table is built once, is immutable
//! afterwards and is shared between sources through an `Arc`.
//!
//! Invariants:
//! - Ids 0 and 1 are the reserved unregistered start/end types; they never
//!   appear in candidate lists.
//! - Candidate lists are sorted by `(precedence, id)`, so equal precedence
//!   keeps registration order.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::matcher::MatchCx;
use crate::tag::{Tag, TagRole, TagTypeId};

pub mod builtin;

pub use builtin::ids;

/// Decides whether a tag of this type may begin at `pos` in the current
/// position context. Not consulted for server tags.
pub type ValidateFn = fn(&mut MatchCx<'_>, usize, TagTypeId) -> Result<bool>;

/// Builds a tag of this type at `pos`, or returns `None` when the text there
/// does not follow the type's grammar. Running off the end of the text also
/// means "not this type".
pub type ConstructFn = fn(&mut MatchCx<'_>, usize, TagTypeId) -> Result<Option<Tag>>;

#[derive(Clone)]
pub struct TagType {
    pub description: &'static str,
    /// Lowercase; always starts with `<`.
    pub start_delimiter: &'static str,
    pub closing_delimiter: &'static str,
    pub role: TagRole,
    /// Lower runs first.
    pub precedence: i32,
    /// Valid at any position, including inside other tags.
    pub is_server_tag: bool,
    /// Gets its own position sub-cache.
    pub separately_cached: bool,
    /// Markup inside the tag's extent is not recognised (except server tags).
    pub masks_enclosed: bool,
    pub validate_position: ValidateFn,
    pub try_construct: ConstructFn,
}

impl fmt::Debug for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagType")
            .field("description", &self.description)
            .field("start_delimiter", &self.start_delimiter)
            .field("closing_delimiter", &self.closing_delimiter)
            .field("role", &self.role)
            .field("precedence", &self.precedence)
            .field("is_server_tag", &self.is_server_tag)
            .field("separately_cached", &self.separately_cached)
            .field("masks_enclosed", &self.masks_enclosed)
            .finish_non_exhaustive()
    }
}

impl TagType {
    /// Descriptor with the common defaults: start role, masks its content,
    /// standard position check, not separately cached.
    pub fn new(
        description: &'static str,
        start_delimiter: &'static str,
        closing_delimiter: &'static str,
        precedence: i32,
        try_construct: ConstructFn,
    ) -> Self {
        Self {
            description,
            start_delimiter,
            closing_delimiter,
            role: TagRole::Start,
            precedence,
            is_server_tag: false,
            separately_cached: false,
            masks_enclosed: true,
            validate_position: crate::matcher::position_is_valid,
            try_construct,
        }
    }

    pub fn server(mut self) -> Self {
        self.is_server_tag = true;
        self
    }

    pub fn separately_cached(mut self) -> Self {
        self.separately_cached = true;
        self
    }

    pub fn end_role(mut self) -> Self {
        self.role = TagRole::End;
        self
    }

    pub fn with_validator(mut self, validate_position: ValidateFn) -> Self {
        self.validate_position = validate_position;
        self
    }

    /// Name every tag of this type carries: the delimiter without its `<`.
    pub fn delimiter_name(&self) -> &'static str {
        self.start_delimiter
            .strip_prefix('<')
            .unwrap_or(self.start_delimiter)
    }
}

pub struct TagTypeTable {
    types: Vec<TagType>,
    /// Indexed by the byte following `<`.
    dispatch: Vec<Box<[TagTypeId]>>,
    separately_cached: Box<[TagTypeId]>,
}

impl fmt::Debug for TagTypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTypeTable")
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

impl TagTypeTable {
    /// Builder preloaded with the reserved and built-in HTML/XML types.
    pub fn builder() -> TagTypeTableBuilder {
        TagTypeTableBuilder::new()
    }

    /// The built-in types only, shared.
    pub fn html() -> Arc<Self> {
        Arc::new(Self::builder().build())
    }

    pub fn get(&self, id: TagTypeId) -> Option<&TagType> {
        self.types.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagTypeId, &TagType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(idx, t)| (TagTypeId(idx as u16), t))
    }

    /// Registered types that could start with `<` followed by `second`, in
    /// trial order.
    pub fn candidates(&self, second: u8) -> &[TagTypeId] {
        &self.dispatch[second as usize]
    }

    pub fn separately_cached(&self) -> &[TagTypeId] {
        &self.separately_cached
    }

    pub fn is_server_tag(&self, id: TagTypeId) -> bool {
        self.get(id).is_some_and(|t| t.is_server_tag)
    }

    pub fn masks_enclosed(&self, id: TagTypeId) -> bool {
        self.get(id).is_some_and(|t| t.masks_enclosed)
    }

    pub fn description(&self, id: TagTypeId) -> &'static str {
        self.get(id).map_or("unknown tag type", |t| t.description)
    }
}

impl Default for TagTypeTable {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct TagTypeTableBuilder {
    types: Vec<TagType>,
}

impl TagTypeTableBuilder {
    pub fn new() -> Self {
        Self {
            types: builtin::default_types(),
        }
    }

    /// Append a type. Equal precedence sorts after the types registered
    /// before it.
    pub fn register(&mut self, tag_type: TagType) -> TagTypeId {
        debug_assert!(
            tag_type.start_delimiter.starts_with('<'),
            "tag type delimiters start with '<'"
        );
        debug_assert!(
            !tag_type.start_delimiter.bytes().any(|b| b.is_ascii_uppercase()),
            "tag type delimiters are lowercase"
        );
        let id = TagTypeId(self.types.len() as u16);
        self.types.push(tag_type);
        id
    }

    pub fn build(self) -> TagTypeTable {
        let mut order: Vec<TagTypeId> = (0..self.types.len())
            .map(|idx| TagTypeId(idx as u16))
            .filter(|id| !id.is_unregistered())
            .collect();
        order.sort_by_key(|id| (self.types[id.0 as usize].precedence, *id));

        let mut dispatch: Vec<Vec<TagTypeId>> = vec![Vec::new(); 256];
        for &id in &order {
            let delimiter = self.types[id.0 as usize].start_delimiter.as_bytes();
            match delimiter.get(1) {
                Some(&second) => dispatch[second as usize].push(id),
                None => {
                    for list in &mut dispatch {
                        list.push(id);
                    }
                }
            }
        }
        let separately_cached = order
            .iter()
            .copied()
            .filter(|id| self.types[id.0 as usize].separately_cached)
            .collect();

        TagTypeTable {
            types: self.types,
            dispatch: dispatch.into_iter().map(Vec::into_boxed_slice).collect(),
            separately_cached,
        }
    }
}

impl Default for TagTypeTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
