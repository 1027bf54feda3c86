//! Markup tag recognition over whole documents and bounded-memory streams.
//!
//! [`Source`] gives random access to the tags of an in-memory document,
//! matching lazily and remembering every answer in a [`PositionCache`].
//! [`StreamedSource`] walks a reader once, front to back, yielding tags,
//! character references and text while holding only a sliding window.
//!
//! Both recognise tags through the same [`TagTypeTable`]: an ordered set of
//! tag grammars keyed by their start delimiter.

pub mod atom;
pub mod cache;
pub mod charref;
pub mod error;
pub mod issue;
pub mod matcher;
pub mod source;
pub mod span;
pub mod streamed;
pub mod streamed_text;
pub mod tag;
pub mod tag_type;
pub mod text;

pub use crate::atom::{AtomId, AtomTable};
pub use crate::cache::{CacheLookup, Links, PositionCache, SubCache};
pub use crate::charref::{BasicCharRefDecoder, CharRef, CharRefDecoder, decode_text};
pub use crate::error::{Error, Result};
pub use crate::issue::{DiscardIssues, Issue, IssueCollector, IssueKind, IssueSink, LogIssueSink};
pub use crate::matcher::{MatchResult, MatchStats};
pub use crate::source::{Nodes, RowColumn, Segment, Source, SourceConfig};
pub use crate::span::Span;
pub use crate::streamed::{
    BufferConfig, SegmentKind, StreamConfig, StreamedSegment, StreamedSource,
};
pub use crate::streamed_text::{DEFAULT_INITIAL_CAPACITY, StreamedParseText, StreamedText};
pub use crate::tag::{Attribute, Tag, TagRole, TagTypeId};
pub use crate::tag_type::{TagType, TagTypeTable, TagTypeTableBuilder, ids};
pub use crate::text::{LowerText, ParseText, RawText};
