//! Whole-document random access.
//!
//! A [`Source`] owns the document text, its lowercased parse copy, the atom
//! table for tag names and the position cache. Lookups go through the cache
//! first and only match positions nothing has looked at yet; an eager
//! [`Source::full_sequential_parse`] replaces the cache with the complete
//! ordered tag list and links neighbours.
//!
//! Tags are plain values. Anything that needs the text (names, attributes,
//! debug output) is asked of the `Source` that produced them.

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use crate::atom::{AtomId, AtomTable};
use crate::cache::{CacheLookup, PositionCache};
use crate::error::{Error, Result};
use crate::issue::{Issue, IssueSink, LogIssueSink};
use crate::matcher::{
    MatchCx, MatchResult, MatchStats, PositionContext, Watermark, is_self_closing, match_at,
};
use crate::span::Span;
use crate::tag::{Attribute, Tag, TagRole, TagTypeId};
use crate::tag_type::{TagTypeTable, ids};
use crate::text::{LowerText, ParseText};

mod attributes;
mod lines;
mod search;

pub use lines::RowColumn;

use lines::LineIndex;

#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub tag_types: Arc<TagTypeTable>,
    /// Elements whose content is not parsed for markup during a sequential
    /// pass. Matched case-insensitively.
    pub raw_text_elements: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            tag_types: TagTypeTable::html(),
            raw_text_elements: vec!["script".to_string()],
        }
    }
}

/// Piece of the document yielded by [`Source::nodes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Tag(Tag),
    Text(Span),
}

impl Segment {
    pub fn span(&self) -> Span {
        match self {
            Segment::Tag(tag) => tag.span,
            Segment::Text(span) => *span,
        }
    }
}

pub struct Source {
    text: String,
    parse_text: LowerText,
    atoms: AtomTable,
    table: Arc<TagTypeTable>,
    raw_text_elements: Vec<AtomId>,
    cache: PositionCache,
    all_tags: Option<Vec<Tag>>,
    lines: OnceCell<LineIndex>,
    issues: Box<dyn IssueSink>,
    stats: MatchStats,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("len", &self.text.len())
            .field("cached_positions", &self.cache.len())
            .field("all_tags", &self.all_tags.as_ref().map(Vec::len))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Source {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_config(text, SourceConfig::default())
    }

    pub fn with_config(text: impl Into<String>, config: SourceConfig) -> Self {
        let text = text.into();
        let mut atoms = AtomTable::new();
        let raw_text_elements = config
            .raw_text_elements
            .iter()
            .filter_map(|name| atoms.intern(name).ok())
            .collect();
        Self {
            parse_text: LowerText::new(&text),
            text,
            atoms,
            cache: PositionCache::new(&config.tag_types),
            table: config.tag_types,
            raw_text_elements,
            all_tags: None,
            lines: OnceCell::new(),
            issues: Box::new(LogIssueSink),
            stats: MatchStats::default(),
        }
    }

    pub fn with_issue_sink(mut self, sink: impl IssueSink + 'static) -> Self {
        self.issues = Box::new(sink);
        self
    }

    pub fn set_issue_sink(&mut self, sink: Box<dyn IssueSink>) {
        self.issues = sink;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn table(&self) -> &TagTypeTable {
        &self.table
    }

    pub fn cache(&self) -> &PositionCache {
        &self.cache
    }

    pub fn stats(&self) -> MatchStats {
        self.stats
    }

    /// Original text of `span`; empty when the span does not fall on
    /// character boundaries inside the document.
    pub fn text_of(&self, span: Span) -> &str {
        self.text.get(span.range()).unwrap_or_default()
    }

    /// Lowercased tag name.
    pub fn tag_name(&self, tag: &Tag) -> &str {
        self.atoms.resolve(tag.name).unwrap_or_default()
    }

    /// Tag beginning exactly at `pos`, registered or not.
    ///
    /// Cached answers (including "no tag here") are returned without
    /// matching; otherwise the result is matched against the current cache
    /// contents and recorded.
    pub fn tag_at(&mut self, pos: usize) -> Result<Option<Tag>> {
        match self.cache.lookup(pos) {
            CacheLookup::Tag(tag) => {
                self.stats.cache_hits += 1;
                return Ok(Some(tag));
            }
            CacheLookup::NoTag => {
                self.stats.cache_hits += 1;
                return Ok(None);
            }
            CacheLookup::Unknown => {}
        }
        if self.parse_text.as_bytes().get(pos) != Some(&b'<') {
            return Ok(None);
        }
        let found = self.match_cached(pos)?.any_tag();
        self.cache.add(pos, found);
        Ok(found)
    }

    fn match_cached(&mut self, pos: usize) -> Result<MatchResult> {
        let mut cx = MatchCx::new(
            &mut self.parse_text,
            &mut self.atoms,
            &self.table,
            PositionContext::Cached(&self.cache),
            self.issues.as_mut(),
            &mut self.stats,
        );
        match_at(&mut cx, pos)
    }

    /// Eager pass over every `<` in document order.
    ///
    /// Replaces the cache with the complete result and returns the
    /// registered tags. Unregistered tags already reported by earlier
    /// lookups are not reported again.
    pub fn full_sequential_parse(&mut self) -> Result<&[Tag]> {
        let reported: Vec<usize> = self
            .cache
            .default_sub_cache()
            .tags()
            .filter(Tag::is_unregistered)
            .map(|tag| tag.begin())
            .collect();
        let mut sink = SkipReported {
            inner: self.issues.as_mut(),
            reported: &reported,
        };

        let mut watermark = Watermark::start();
        let mut registered = Vec::new();
        let mut matched = Vec::new();
        let mut from = 0;
        while let Some(lt) = self.parse_text.find_byte(b'<', from, None)? {
            let mut cx = MatchCx::new(
                &mut self.parse_text,
                &mut self.atoms,
                &self.table,
                PositionContext::Watermark(watermark),
                &mut sink,
                &mut self.stats,
            );
            match match_at(&mut cx, lt)? {
                MatchResult::Tag(tag) => {
                    let self_closing = is_self_closing(&mut self.parse_text, &tag)?;
                    watermark =
                        watermark.after(&tag, &self.table, &self.raw_text_elements, self_closing);
                    registered.push(tag);
                    matched.push(tag);
                }
                MatchResult::Unregistered(tag) => matched.push(tag),
                MatchResult::NotATag => {}
            }
            from = lt + 1;
        }

        self.cache.clear();
        self.cache.bulk_load(&matched);
        log::debug!(
            target: "markup.source",
            "full pass: {} registered tags, {} unregistered",
            registered.len(),
            matched.len() - registered.len()
        );
        Ok(self.all_tags.insert(registered).as_slice())
    }

    /// Every registered tag in document order, running the full pass on
    /// first use.
    pub fn all_tags(&mut self) -> Result<&[Tag]> {
        if self.all_tags.is_none() {
            self.full_sequential_parse()?;
        }
        Ok(self.all_tags.as_deref().unwrap_or_default())
    }

    /// Result of the last full pass, if one has run since the last mutation.
    pub fn tags(&self) -> Option<&[Tag]> {
        self.all_tags.as_deref()
    }

    /// Registered tags lying entirely within `span`.
    pub fn all_tags_in(&mut self, span: Span) -> Result<Vec<Tag>> {
        let tags = self.all_tags()?;
        let first = tags.partition_point(|tag| tag.begin() < span.begin());
        Ok(tags[first..]
            .iter()
            .take_while(|tag| tag.begin() < span.end())
            .filter(|tag| span.encloses(tag.span))
            .copied()
            .collect())
    }

    /// Tags and the text between them, in document order.
    ///
    /// Every registered tag is yielded, server tags nested inside an earlier
    /// tag included. Text already covered by a yielded tag is not repeated.
    pub fn nodes(&mut self) -> Result<Nodes<'_>> {
        let len = self.text.len();
        let tags = self.all_tags()?;
        Ok(Nodes {
            tags,
            next: 0,
            pos: 0,
            len,
        })
    }

    /// Attribute spans of a normal start tag; empty for every other type.
    pub fn attributes(&self, tag: &Tag) -> Vec<Attribute> {
        if tag.type_id != ids::NORMAL_START {
            return Vec::new();
        }
        attributes::parse_attributes(self.parse_text.as_bytes(), tag)
    }

    pub fn row_column(&self, pos: usize) -> RowColumn {
        let bytes = self.text.as_bytes();
        self.lines
            .get_or_init(|| LineIndex::new(bytes))
            .row_column(bytes, pos)
    }

    /// `(r<row>,c<col>,p<pos>)-(r<row>,c<col>,p<pos>)`.
    pub fn debug_span(&self, span: Span) -> String {
        format!(
            "{}-{}",
            self.row_column(span.begin()),
            self.row_column(span.end())
        )
    }

    /// Short tag rendering, type description and position, e.g.
    /// `<?xml ?> (XML declaration) ((r1,c1,p0)-(r1,c40,p39))`.
    pub fn debug_info(&self, tag: &Tag) -> String {
        format!(
            "{} ({}) ({})",
            debug_tag(&self.table, tag, self.tag_name(tag)),
            self.table.description(tag.type_id),
            self.debug_span(tag.span)
        )
    }

    /// Blank `span` in the parse text so no markup is recognised inside it.
    ///
    /// Every cached result is dropped, including the full-pass tag list.
    pub fn ignore_when_parsing(&mut self, span: Span) -> Result<()> {
        if span.end() > self.text.len() {
            return Err(Error::IndexOutOfBounds {
                pos: span.end(),
                len: self.text.len(),
            });
        }
        self.parse_text.blank(span);
        self.cache.clear();
        self.all_tags = None;
        log::debug!(target: "markup.source", "ignoring {span} when parsing; cache cleared");
        Ok(())
    }
}

/// `<name>` / `</name>` for normal tags, `delimiter closing` otherwise.
pub(crate) fn debug_tag(table: &TagTypeTable, tag: &Tag, name: &str) -> String {
    match tag.type_id {
        ids::NORMAL_START | TagTypeId::UNREGISTERED_START => format!("<{name}>"),
        ids::NORMAL_END | TagTypeId::UNREGISTERED_END => format!("</{name}>"),
        id => match table.get(id) {
            Some(tag_type) => format!(
                "{} {}",
                tag_type.start_delimiter, tag_type.closing_delimiter
            ),
            None if tag.role == TagRole::End => format!("</{name}>"),
            None => format!("<{name}>"),
        },
    }
}

/// Forwards issues except those at already reported positions.
struct SkipReported<'a> {
    inner: &'a mut dyn IssueSink,
    reported: &'a [usize],
}

impl IssueSink for SkipReported<'_> {
    fn report(&mut self, issue: Issue) {
        if self.reported.binary_search(&issue.pos).is_err() {
            self.inner.report(issue);
        }
    }
}

/// Iterator returned by [`Source::nodes`].
#[derive(Clone, Debug)]
pub struct Nodes<'a> {
    tags: &'a [Tag],
    next: usize,
    pos: usize,
    len: usize,
}

impl Iterator for Nodes<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if let Some(&tag) = self.tags.get(self.next) {
            if self.pos < tag.begin() {
                let text = Span::ordered(self.pos, tag.begin());
                self.pos = tag.begin();
                return Some(Segment::Text(text));
            }
            self.next += 1;
            self.pos = self.pos.max(tag.end());
            return Some(Segment::Tag(tag));
        }
        if self.pos < self.len {
            let text = Span::ordered(self.pos, self.len);
            self.pos = self.len;
            return Some(Segment::Text(text));
        }
        None
    }
}
