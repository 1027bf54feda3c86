//! Tag resolution at a single position.
//!
//! `match_at` answers "what tag, if any, begins at this `<`?":
//! 1. candidates come from the table's first-byte dispatch, already in
//!    precedence order;
//! 2. a candidate whose delimiter is not at the position is skipped;
//! 3. non-server candidates must pass their position check;
//! 4. the first constructor that succeeds wins;
//! 5. otherwise the `<...>` run becomes an unregistered tag, reported once.
//!
//! Position checks run in one of two modes. During a sequential pass the
//! caller threads a [`Watermark`] through consecutive matches. For on-demand
//! lookups only what is already cached is consulted. The two modes can
//! disagree on content that has never been visited (raw-text bodies in
//! particular); that difference is part of the contract.

use crate::atom::{AtomId, AtomTable};
use crate::cache::PositionCache;
use crate::error::{Error, Result, until_end};
use crate::issue::{Issue, IssueKind, IssueSink};
use crate::span::Span;
use crate::tag::{Tag, TagRole, TagTypeId};
use crate::tag_type::TagTypeTable;
use crate::tag_type::builtin::is_whitespace;
use crate::text::ParseText;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Tag(Tag),
    NotATag,
    /// Best-effort `<...>` span that no grammar accepted.
    Unregistered(Tag),
}

impl MatchResult {
    /// The tag found, registered or not.
    pub fn any_tag(self) -> Option<Tag> {
        match self {
            MatchResult::Tag(tag) | MatchResult::Unregistered(tag) => Some(tag),
            MatchResult::NotATag => None,
        }
    }
}

/// Matcher instrumentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// `match_at` calls that reached candidate resolution.
    pub match_attempts: u64,
    /// Lookups answered from the position cache.
    pub cache_hits: u64,
    pub unregistered: u64,
}

/// Sequential-pass position boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Watermark {
    /// Non-server tags may begin at or after this position.
    At(usize),
    /// Inside the content of raw-text element `name`, from `from` on.
    RawText { name: AtomId, from: usize },
}

impl Watermark {
    pub fn start() -> Self {
        Watermark::At(0)
    }

    /// Watermark after `tag` has been accepted.
    ///
    /// Unregistered tags and types that do not mask their content leave it
    /// unchanged. Server tags move it like any other tag.
    pub fn after(
        self,
        tag: &Tag,
        table: &TagTypeTable,
        raw_text_elements: &[AtomId],
        self_closing: bool,
    ) -> Self {
        if tag.is_unregistered() {
            return self;
        }
        let Some(tag_type) = table.get(tag.type_id) else {
            return self;
        };
        if !tag_type.masks_enclosed {
            return self;
        }
        match self {
            Watermark::RawText { name, from } => {
                if tag.role == TagRole::End && tag.name == name {
                    Watermark::At(tag.end())
                } else if tag.end() > from {
                    Watermark::RawText {
                        name,
                        from: tag.end(),
                    }
                } else {
                    self
                }
            }
            Watermark::At(end) => {
                if tag.end() <= end {
                    return self;
                }
                if tag.role == TagRole::Start
                    && !self_closing
                    && raw_text_elements.contains(&tag.name)
                {
                    Watermark::RawText {
                        name: tag.name,
                        from: tag.end(),
                    }
                } else {
                    Watermark::At(tag.end())
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum PositionContext<'a> {
    Watermark(Watermark),
    /// On-demand mode: only tags already in the cache mask positions.
    Cached(&'a PositionCache),
}

/// Everything a tag-type predicate or constructor may touch.
pub struct MatchCx<'a> {
    text: &'a mut dyn ParseText,
    atoms: &'a mut AtomTable,
    table: &'a TagTypeTable,
    context: PositionContext<'a>,
    issues: &'a mut dyn IssueSink,
    stats: &'a mut MatchStats,
    name_buf: Vec<u8>,
}

impl<'a> MatchCx<'a> {
    pub fn new(
        text: &'a mut dyn ParseText,
        atoms: &'a mut AtomTable,
        table: &'a TagTypeTable,
        context: PositionContext<'a>,
        issues: &'a mut dyn IssueSink,
        stats: &'a mut MatchStats,
    ) -> Self {
        Self {
            text,
            atoms,
            table,
            context,
            issues,
            stats,
            name_buf: Vec::new(),
        }
    }

    pub fn table(&self) -> &'a TagTypeTable {
        self.table
    }

    pub fn context(&self) -> PositionContext<'a> {
        self.context
    }

    pub fn set_context(&mut self, context: PositionContext<'a>) {
        self.context = context;
    }

    /// Open raw-text element and the position its content is checked from.
    pub fn raw_text_element(&self) -> Option<(AtomId, usize)> {
        match self.context {
            PositionContext::Watermark(Watermark::RawText { name, from }) => Some((name, from)),
            _ => None,
        }
    }

    /// Lowercased byte at `pos`; `None` past the end of the text.
    pub fn byte_at(&mut self, pos: usize) -> Result<Option<u8>> {
        until_end(self.text.byte_at(pos))
    }

    pub fn starts_with_at(&mut self, pos: usize, needle: &[u8]) -> Result<bool> {
        self.text.starts_with_at(pos, needle)
    }

    pub fn find_byte(&mut self, needle: u8, from: usize) -> Result<Option<usize>> {
        self.text.find_byte(needle, from, None)
    }

    pub fn find_seq(&mut self, needle: &[u8], from: usize) -> Result<Option<usize>> {
        self.text.find_seq(needle, from, None)
    }

    pub fn intern(&mut self, name: &str) -> Result<AtomId> {
        self.atoms.intern(name).map_err(|_| Error::AtomTableFull)
    }

    /// Intern the (lowercased) text of `[begin, end)` as a name.
    pub fn intern_range(&mut self, begin: usize, end: usize) -> Result<AtomId> {
        self.name_buf.clear();
        self.text.copy_range(begin, end, &mut self.name_buf)?;
        self.atoms
            .intern_bytes(&self.name_buf)
            .map_err(|_| Error::AtomTableFull)
    }

    pub fn resolve(&self, name: AtomId) -> Option<&str> {
        self.atoms.resolve(name)
    }

    pub fn stats(&self) -> MatchStats {
        *self.stats
    }
}

/// Standard position check used by every non-server type.
pub fn position_is_valid(cx: &mut MatchCx<'_>, pos: usize, _id: TagTypeId) -> Result<bool> {
    Ok(match cx.context {
        PositionContext::Watermark(Watermark::At(end)) => pos >= end,
        // Raw-text content admits only its own end tag, which has its own
        // check.
        PositionContext::Watermark(Watermark::RawText { .. }) => false,
        PositionContext::Cached(cache) => !cache.masks_position(pos, cx.table),
    })
}

pub fn match_at(cx: &mut MatchCx<'_>, pos: usize) -> Result<MatchResult> {
    if cx.byte_at(pos)? != Some(b'<') {
        log::debug!(target: "markup.matcher", "match_at({pos}) called off a '<'");
        return Ok(MatchResult::NotATag);
    }
    cx.stats.match_attempts = cx.stats.match_attempts.saturating_add(1);
    let Some(second) = cx.byte_at(pos + 1)? else {
        return Ok(MatchResult::NotATag);
    };

    let table = cx.table;
    for &id in table.candidates(second) {
        let Some(tag_type) = table.get(id) else {
            continue;
        };
        if !cx.starts_with_at(pos, tag_type.start_delimiter.as_bytes())? {
            continue;
        }
        if !tag_type.is_server_tag && !(tag_type.validate_position)(cx, pos, id)? {
            continue;
        }
        if let Some(tag) = until_end((tag_type.try_construct)(cx, pos, id))?.flatten() {
            #[cfg(any(test, feature = "debug-stats"))]
            log::trace!(
                target: "markup.matcher",
                "{} at {}: {}",
                tag_type.description,
                pos,
                tag.span
            );
            return Ok(MatchResult::Tag(tag));
        }
    }
    unregistered_at(cx, pos)
}

fn unregistered_at(cx: &mut MatchCx<'_>, pos: usize) -> Result<MatchResult> {
    let is_end = cx.starts_with_at(pos, b"</")?;
    let type_id = if is_end {
        TagTypeId::UNREGISTERED_END
    } else {
        TagTypeId::UNREGISTERED_START
    };
    if !position_is_valid(cx, pos, type_id)? {
        return Ok(MatchResult::NotATag);
    }

    let name_begin = pos + if is_end { 2 } else { 1 };
    let mut name_end = name_begin;
    while let Some(b) = cx.byte_at(name_end)? {
        if is_whitespace(b) || matches!(b, b'<' | b'>' | b'/') {
            break;
        }
        name_end += 1;
    }
    if name_end == name_begin {
        return Ok(MatchResult::NotATag);
    }

    let mut close = name_end;
    loop {
        match cx.byte_at(close)? {
            Some(b'>') => break,
            Some(b'<') | None => return Ok(MatchResult::NotATag),
            Some(_) => close += 1,
        }
    }

    let name = cx.intern_range(name_begin, name_end)?;
    let tag = Tag {
        span: Span::ordered(pos, close + 1),
        name_span: Span::ordered(pos, name_end),
        type_id,
        name,
        role: if is_end { TagRole::End } else { TagRole::Start },
    };
    cx.stats.unregistered = cx.stats.unregistered.saturating_add(1);
    let display_name = cx.resolve(name).unwrap_or_default().to_string();
    let (kind, message) = if is_end {
        (
            IssueKind::UnregisteredEndTag,
            format!("unregistered end tag </{display_name}> ignored"),
        )
    } else {
        (
            IssueKind::UnregisteredStartTag,
            format!("unregistered start tag <{display_name}> ignored"),
        )
    };
    cx.issues.report(Issue { pos, kind, message });
    Ok(MatchResult::Unregistered(tag))
}

/// `tag` ends in `/>`.
pub(crate) fn is_self_closing(text: &mut dyn ParseText, tag: &Tag) -> Result<bool> {
    if tag.span.len() < 2 {
        return Ok(false);
    }
    text.starts_with_at(tag.end() - 2, b"/>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueCollector;
    use crate::tag_type::{TagType, ids};
    use crate::text::LowerText;
    use test_case::test_case;

    struct Harness {
        text: LowerText,
        atoms: AtomTable,
        table: TagTypeTable,
        issues: IssueCollector,
        stats: MatchStats,
    }

    impl Harness {
        fn new(input: &str) -> Self {
            Self::with_table(input, TagTypeTable::default())
        }

        fn with_table(input: &str, table: TagTypeTable) -> Self {
            Self {
                text: LowerText::new(input),
                atoms: AtomTable::new(),
                table,
                issues: IssueCollector::new(),
                stats: MatchStats::default(),
            }
        }

        fn match_with(&mut self, pos: usize, watermark: Watermark) -> MatchResult {
            let mut cx = MatchCx::new(
                &mut self.text,
                &mut self.atoms,
                &self.table,
                PositionContext::Watermark(watermark),
                &mut self.issues,
                &mut self.stats,
            );
            match_at(&mut cx, pos).unwrap()
        }

        fn name(&self, tag: &Tag) -> &str {
            self.atoms.resolve(tag.name).unwrap()
        }
    }

    fn bang_a(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
        let Some(close) = cx.find_byte(b'>', pos)? else {
            return Ok(None);
        };
        let name = cx.intern("!a")?;
        Ok(Some(Tag {
            span: Span::ordered(pos, close + 1),
            name_span: Span::ordered(pos, pos + 3),
            type_id: id,
            name,
            role: TagRole::Start,
        }))
    }

    #[test_case(1, 2 => "specific" ; "specific declaration ranked first")]
    #[test_case(2, 1 => "generic" ; "generic declaration ranked first")]
    #[test_case(7, 7 => "specific" ; "tie keeps registration order")]
    fn lower_precedence_wins(specific: i32, generic: i32) -> &'static str {
        let mut builder = TagTypeTable::builder();
        let specific_id = builder.register(TagType::new("specific", "<!ab", ">", specific, bang_a));
        let generic_id = builder.register(TagType::new("generic", "<!a", ">", generic, bang_a));
        let mut h = Harness::with_table("<!abc>", builder.build());
        let MatchResult::Tag(tag) = h.match_with(0, Watermark::start()) else {
            panic!("expected a tag");
        };
        if tag.type_id == specific_id {
            "specific"
        } else {
            assert_eq!(tag.type_id, generic_id);
            "generic"
        }
    }

    #[test]
    fn comment_beats_markup_declaration() {
        let mut h = Harness::new("<!-- x -->");
        let MatchResult::Tag(tag) = h.match_with(0, Watermark::start()) else {
            panic!("expected a tag");
        };
        assert_eq!(tag.type_id, ids::COMMENT);
    }

    #[test]
    fn unregistered_tags_are_reported_once_per_match() {
        let mut h = Harness::new("a <1x y> b");
        let result = h.match_with(2, Watermark::start());
        let MatchResult::Unregistered(tag) = result else {
            panic!("expected unregistered, got {result:?}");
        };
        assert_eq!(tag.span, Span::new(2, 8).unwrap());
        assert_eq!(h.name(&tag), "1x");
        assert_eq!(h.stats.unregistered, 1);
        let issues = h.issues.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::UnregisteredStartTag);
        assert_eq!(issues[0].pos, 2);
    }

    #[test]
    fn lone_lt_is_not_a_tag() {
        let mut h = Harness::new("a < b");
        assert_eq!(h.match_with(2, Watermark::start()), MatchResult::NotATag);
        assert!(h.issues.is_empty());
        let mut h = Harness::new("x<");
        assert_eq!(h.match_with(1, Watermark::start()), MatchResult::NotATag);
    }

    #[test]
    fn off_lt_position_is_not_a_tag() {
        let mut h = Harness::new("<p>");
        assert_eq!(h.match_with(1, Watermark::start()), MatchResult::NotATag);
        assert_eq!(h.stats.match_attempts, 0);
    }

    #[test]
    fn watermark_blocks_normal_tags_but_not_server_tags() {
        let mut h = Harness::new(r#"<a title="<b> <%x%>">"#);
        assert_eq!(h.match_with(10, Watermark::At(21)), MatchResult::NotATag);
        let MatchResult::Tag(tag) = h.match_with(14, Watermark::At(21)) else {
            panic!("expected server tag");
        };
        assert_eq!(tag.type_id, ids::SERVER_COMMON);
    }

    #[test]
    fn raw_text_admits_only_its_end_tag() {
        let mut h = Harness::new("<p></style></script ><!--c-->");
        let script = h.atoms.intern("script").unwrap();
        let raw = Watermark::RawText {
            name: script,
            from: 0,
        };
        assert_eq!(h.match_with(0, raw), MatchResult::NotATag);
        assert_eq!(h.match_with(3, raw), MatchResult::NotATag);
        let MatchResult::Tag(end) = h.match_with(11, raw) else {
            panic!("expected </script>");
        };
        assert_eq!(end.type_id, ids::NORMAL_END);
        assert_eq!(end.end(), 21);
        assert_eq!(h.match_with(21, raw), MatchResult::NotATag);
    }

    #[test]
    fn server_tags_advance_the_watermark() {
        let mut h = Harness::new("<% a <b> %>c");
        let table = TagTypeTable::default();
        let MatchResult::Tag(server) = h.match_with(0, Watermark::start()) else {
            panic!("expected server tag");
        };
        assert_eq!(server.type_id, ids::SERVER_COMMON);
        let wm = Watermark::start().after(&server, &table, &[], false);
        assert_eq!(wm, Watermark::At(11));
        assert_eq!(h.match_with(5, wm), MatchResult::NotATag);
    }

    #[test]
    fn doctype_leaves_the_watermark_alone() {
        let mut h = Harness::new("<!doctype x [<!entity e 'v'>]>");
        let table = TagTypeTable::default();
        let MatchResult::Tag(doctype) = h.match_with(0, Watermark::start()) else {
            panic!("expected doctype");
        };
        assert_eq!(doctype.type_id, ids::DOCTYPE);
        let wm = Watermark::start().after(&doctype, &table, &[], false);
        assert_eq!(wm, Watermark::start());
        let MatchResult::Tag(entity) = h.match_with(13, wm) else {
            panic!("expected markup declaration");
        };
        assert_eq!(entity.type_id, ids::MARKUP_DECLARATION);
    }

    #[test]
    fn watermark_enters_and_leaves_raw_text() {
        let mut h = Harness::new("<script><b></script><br/>");
        let table = TagTypeTable::default();
        let script = h.atoms.intern("script").unwrap();
        let MatchResult::Tag(open) = h.match_with(0, Watermark::start()) else {
            panic!("expected <script>");
        };
        let wm = Watermark::start().after(&open, &table, &[script], false);
        assert_eq!(wm, Watermark::RawText { name: script, from: 8 });
        assert_eq!(h.match_with(8, wm), MatchResult::NotATag);
        let MatchResult::Tag(close) = h.match_with(11, wm) else {
            panic!("expected </script>");
        };
        let wm = wm.after(&close, &table, &[script], false);
        assert_eq!(wm, Watermark::At(20));
        let MatchResult::Tag(br) = h.match_with(20, wm) else {
            panic!("expected <br/>");
        };
        assert!(is_self_closing(&mut h.text, &br).unwrap());
    }

    #[test]
    fn self_closing_raw_text_element_does_not_open_content() {
        let table = TagTypeTable::default();
        let mut h = Harness::new("<script/>");
        let script = h.atoms.intern("script").unwrap();
        let MatchResult::Tag(tag) = h.match_with(0, Watermark::start()) else {
            panic!("expected tag");
        };
        let wm = Watermark::start().after(&tag, &table, &[script], true);
        assert_eq!(wm, Watermark::At(9));
    }
}
