//! Forward-only segmentation over a reader.
//!
//! [`StreamedSource`] yields tags, character references and text in
//! document order while keeping only a sliding window of the input. Tags
//! are matched with the same matcher as [`crate::Source`], in watermark
//! mode, so a complete stream yields exactly the registered tags of a full
//! sequential pass.
//!
//! Text is cut where markup begins. Without coalescing (or with a fixed
//! buffer) a text run is also cut at buffer capacity, on a UTF-8 boundary.
//! Tags are never cut: a tag that does not fit a fixed buffer fails with
//! `Error::BufferOverflow`.
//!
//! Server tags nested inside an emitted tag follow it directly, so a
//! segment may begin before the previous one ends.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use tools::utf8::floor_char_boundary;

use crate::atom::{AtomId, AtomTable};
use crate::charref::{BasicCharRefDecoder, CharRef, CharRefDecoder};
use crate::error::{Error, Result, until_end};
use crate::issue::{IssueSink, LogIssueSink};
use crate::matcher::{
    MatchCx, MatchResult, MatchStats, PositionContext, Watermark, is_self_closing, match_at,
};
use crate::source::debug_tag;
use crate::span::Span;
use crate::streamed_text::{DEFAULT_INITIAL_CAPACITY, StreamedParseText, StreamedText};
use crate::tag::Tag;
use crate::tag_type::TagTypeTable;
use crate::text::ParseText;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferConfig {
    /// Grows on demand, starting at `initial_capacity` bytes.
    Auto { initial_capacity: usize },
    /// Caller-supplied buffer; its length is the capacity.
    Fixed(Vec<u8>),
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig::Auto {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub tag_types: Arc<TagTypeTable>,
    pub buffer: BufferConfig,
    /// Emit each run of text between markup as one segment, growing an
    /// auto buffer as needed. Ignored for fixed buffers.
    pub coalescing: bool,
    /// Emit character references as their own segments.
    pub split_character_references: bool,
    pub raw_text_elements: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tag_types: TagTypeTable::html(),
            buffer: BufferConfig::default(),
            coalescing: false,
            split_character_references: true,
            raw_text_elements: vec!["script".to_string()],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Tag(Tag),
    Text,
    CharacterReference(char),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamedSegment {
    pub span: Span,
    pub kind: SegmentKind,
}

impl StreamedSegment {
    fn tag(tag: Tag) -> Self {
        Self {
            span: tag.span,
            kind: SegmentKind::Tag(tag),
        }
    }

    fn text(begin: usize, end: usize) -> Self {
        Self {
            span: Span::ordered(begin, end),
            kind: SegmentKind::Text,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match &self.kind {
            SegmentKind::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == SegmentKind::Text
    }
}

/// Markup found but not yet consumed.
enum Markup {
    Tag(Tag),
    CharRef(usize, CharRef),
}

pub struct StreamedSource<R> {
    text: StreamedParseText<R>,
    atoms: AtomTable,
    table: Arc<TagTypeTable>,
    raw_text_elements: Vec<AtomId>,
    decoder: Box<dyn CharRefDecoder>,
    issues: Box<dyn IssueSink>,
    stats: MatchStats,
    watermark: Watermark,
    coalescing: bool,
    split_character_references: bool,
    /// Next position not yet covered by an emitted or queued segment.
    pos: usize,
    /// Segments already matched but not yet returned.
    pending: VecDeque<StreamedSegment>,
    current: Option<StreamedSegment>,
    failed: bool,
}

impl<R> fmt::Debug for StreamedSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedSource")
            .field("pos", &self.pos)
            .field("watermark", &self.watermark)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<R: Read> StreamedSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, StreamConfig::default())
    }

    pub fn with_config(reader: R, config: StreamConfig) -> Self {
        let text = match config.buffer {
            BufferConfig::Auto { initial_capacity } => {
                StreamedText::with_initial_capacity(reader, initial_capacity.max(1))
            }
            BufferConfig::Fixed(buffer) => StreamedText::with_buffer(reader, buffer),
        };
        Self::from_parts(text, config.tag_types, &config.raw_text_elements, config.coalescing)
            .split_character_references(config.split_character_references)
    }

    fn from_parts(
        text: StreamedText<R>,
        table: Arc<TagTypeTable>,
        raw_text_elements: &[String],
        coalescing: bool,
    ) -> Self {
        let mut atoms = AtomTable::new();
        let raw_text_elements = raw_text_elements
            .iter()
            .filter_map(|name| atoms.intern(name).ok())
            .collect();
        Self {
            text: StreamedParseText::new(text),
            atoms,
            table,
            raw_text_elements,
            decoder: Box::new(BasicCharRefDecoder),
            issues: Box::new(LogIssueSink),
            stats: MatchStats::default(),
            watermark: Watermark::start(),
            coalescing,
            split_character_references: true,
            pos: 0,
            pending: VecDeque::new(),
            current: None,
            failed: false,
        }
    }

    fn split_character_references(mut self, split: bool) -> Self {
        self.split_character_references = split;
        self
    }

    pub fn with_issue_sink(mut self, sink: impl IssueSink + 'static) -> Self {
        self.issues = Box::new(sink);
        self
    }

    pub fn with_char_ref_decoder(mut self, decoder: impl CharRefDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// Current capacity of the window buffer.
    pub fn buffer_size(&self) -> usize {
        self.text.text().capacity()
    }

    pub fn stats(&self) -> MatchStats {
        self.stats
    }

    pub fn table(&self) -> &TagTypeTable {
        &self.table
    }

    /// Segment most recently returned by [`StreamedSource::next_segment`].
    pub fn current_segment(&self) -> Option<&StreamedSegment> {
        self.current.as_ref()
    }

    pub fn tag_name(&self, tag: &Tag) -> &str {
        self.atoms.resolve(tag.name).unwrap_or_default()
    }

    /// Text of `span`, which must still lie inside the window.
    ///
    /// The segment just returned is always available; older ones may have
    /// been discarded.
    pub fn text_of(&self, span: Span) -> Result<Cow<'_, str>> {
        let window = self.text.text();
        let window_begin = window.window_begin();
        if span.begin() < window_begin {
            return Err(Error::DiscardedPosition { pos: span.begin() });
        }
        if span.end() > window.window_end() {
            return Err(Error::IndexOutOfBounds {
                pos: span.end(),
                len: window.window_end(),
            });
        }
        let bytes = &window.current_buffer_content()
            [span.begin() - window_begin..span.end() - window_begin];
        Ok(String::from_utf8_lossy(bytes))
    }

    /// `<?xml ?> (XML declaration) ((p0)-(p39))` style rendering; rows and
    /// columns are not tracked while streaming.
    pub fn debug_info(&self, tag: &Tag) -> String {
        format!(
            "{} ({}) ({})",
            debug_tag(&self.table, tag, self.tag_name(tag)),
            self.table.description(tag.type_id),
            tag.span
        )
    }

    /// Next segment in document order, or `None` at the end of the input.
    ///
    /// After an error every further call returns `Ok(None)`.
    pub fn next_segment(&mut self) -> Result<Option<StreamedSegment>> {
        if self.failed {
            return Ok(None);
        }
        match self.advance() {
            Ok(segment) => {
                self.current = segment;
                Ok(segment)
            }
            Err(err) => {
                self.failed = true;
                self.current = None;
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<StreamedSegment>> {
        if let Some(segment) = self.pending.pop_front() {
            return Ok(Some(segment));
        }
        let begin = self.pos;
        self.text.text_mut().set_min_required_begin(begin)?;
        let Some(first) = until_end(self.text.byte_at(begin))? else {
            return Ok(None);
        };
        if let Some(markup) = self.markup_at(begin, first)? {
            return self.accept(markup).map(Some);
        }
        self.scan_text(begin, begin + 1)
    }

    fn in_raw_text(&self) -> bool {
        matches!(self.watermark, Watermark::RawText { .. })
    }

    fn match_here(&mut self, pos: usize) -> Result<MatchResult> {
        let mut cx = MatchCx::new(
            &mut self.text,
            &mut self.atoms,
            &self.table,
            PositionContext::Watermark(self.watermark),
            self.issues.as_mut(),
            &mut self.stats,
        );
        match_at(&mut cx, pos)
    }

    /// Tag or character reference starting at `pos`. Nothing is consumed
    /// until the result is accepted.
    fn markup_at(&mut self, pos: usize, first: u8) -> Result<Option<Markup>> {
        match first {
            b'<' => match self.match_here(pos)? {
                MatchResult::Tag(tag) => Ok(Some(Markup::Tag(tag))),
                MatchResult::Unregistered(_) | MatchResult::NotATag => Ok(None),
            },
            b'&' if self.split_character_references && !self.in_raw_text() => {
                match self.decoder.decode_at(self.text.text_mut(), pos) {
                    Ok(found) => Ok(found.map(|char_ref| Markup::CharRef(pos, char_ref))),
                    // A window too small for the reference itself: keep `&`
                    // as text rather than failing the stream.
                    Err(err) if err.is_buffer_overflow() && pos == self.pos => Ok(None),
                    Err(err) => Err(err),
                }
            }
            _ => Ok(None),
        }
    }

    fn accept(&mut self, markup: Markup) -> Result<StreamedSegment> {
        match markup {
            Markup::Tag(tag) => {
                self.accept_tag(tag)?;
                Ok(StreamedSegment::tag(tag))
            }
            Markup::CharRef(pos, char_ref) => {
                self.pos = char_ref.end;
                Ok(StreamedSegment {
                    span: Span::ordered(pos, char_ref.end),
                    kind: SegmentKind::CharacterReference(char_ref.ch),
                })
            }
        }
    }

    /// Advance past `tag` and queue the tags nested inside it.
    ///
    /// A nested server tag may end after `tag` does; the covered region
    /// then extends to its end and is searched as well.
    fn accept_tag(&mut self, tag: Tag) -> Result<()> {
        self.advance_watermark(&tag)?;
        let mut covered = self.pos.max(tag.end());
        let mut from = tag.begin() + 1;
        while let Some(lt) = self.text.find_byte(b'<', from, Some(covered))? {
            if let MatchResult::Tag(inner) = self.match_here(lt)? {
                self.advance_watermark(&inner)?;
                covered = covered.max(inner.end());
                self.pending.push_back(StreamedSegment::tag(inner));
            }
            from = lt + 1;
        }
        self.pos = covered;
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "markup.stream",
            "{} {}: {} nested",
            self.table.description(tag.type_id),
            tag.span,
            self.pending.len()
        );
        Ok(())
    }

    fn advance_watermark(&mut self, tag: &Tag) -> Result<()> {
        let self_closing = is_self_closing(&mut self.text, tag)?;
        self.watermark = self
            .watermark
            .after(tag, &self.table, &self.raw_text_elements, self_closing);
        Ok(())
    }

    /// Text starting at `begin`; markup candidates are looked for from
    /// `from` on.
    fn scan_text(&mut self, begin: usize, from: usize) -> Result<Option<StreamedSegment>> {
        let limit = if self.coalescing && self.text.text().is_growable() {
            None
        } else {
            Some(begin + self.text.text().capacity())
        };
        let mut from = from;
        loop {
            let candidate = if self.split_character_references && !self.in_raw_text() {
                self.text.find_either(b'<', b'&', from, limit)?
            } else {
                self.text.find_byte(b'<', from, limit)?
            };
            let Some(at) = candidate else {
                let end = self.text_end(begin, limit)?;
                self.pos = end;
                return Ok(Some(StreamedSegment::text(begin, end)));
            };
            let first = self.text.byte_at(at)?;
            match self.markup_at(at, first) {
                Ok(Some(markup)) => {
                    let segment = self.accept(markup)?;
                    self.pending.push_front(segment);
                    return Ok(Some(StreamedSegment::text(begin, at)));
                }
                Ok(None) => from = at + 1,
                Err(err) if err.is_buffer_overflow() => {
                    // Markup and text do not fit together; return the text
                    // and match again from a fresh window.
                    log::debug!(
                        target: "markup.stream",
                        "markup at {at} does not fit behind text at {begin}; splitting"
                    );
                    self.pos = at;
                    return Ok(Some(StreamedSegment::text(begin, at)));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// End of a text run that found no markup before `limit`.
    fn text_end(&mut self, begin: usize, limit: Option<usize>) -> Result<usize> {
        if let Some(len) = self.text.text().known_len()
            && limit.is_none_or(|limit| len <= limit)
        {
            return Ok(len);
        }
        let Some(limit) = limit else {
            return self.text.text().len();
        };
        let bytes = self.text.text_mut().slice(begin, limit)?;
        let cut = floor_char_boundary(bytes);
        Ok(if cut == 0 { limit } else { begin + cut })
    }
}

impl StreamedSource<io::Empty> {
    /// Stream over text that is already in memory; the length is known
    /// from the start and nothing is ever discarded.
    pub fn from_text(text: &str) -> Self {
        Self::from_text_with_config(text, StreamConfig::default())
    }

    /// As [`StreamedSource::from_text`]; the buffer setting of `config` is
    /// ignored.
    pub fn from_text_with_config(text: &str, config: StreamConfig) -> Self {
        Self::from_parts(
            StreamedText::from_bytes(text.as_bytes().to_vec()),
            config.tag_types,
            &config.raw_text_elements,
            config.coalescing,
        )
        .split_character_references(config.split_character_references)
    }
}

impl<R: Read> Iterator for StreamedSource<R> {
    type Item = Result<StreamedSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}

impl<R: Read> std::iter::FusedIterator for StreamedSource<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueCollector;
    use crate::tag_type::ids;

    /// `(begin, end, kind)` with `T`ag, te`x`t and character `R`eference.
    fn summary(segment: &StreamedSegment) -> (usize, usize, char) {
        let kind = match segment.kind {
            SegmentKind::Tag(_) => 'T',
            SegmentKind::Text => 'x',
            SegmentKind::CharacterReference(_) => 'R',
        };
        (segment.span.begin(), segment.span.end(), kind)
    }

    fn collect<R: Read>(source: StreamedSource<R>) -> Vec<(usize, usize, char)> {
        source.map(|segment| summary(&segment.unwrap())).collect()
    }

    fn fixed(input: &str, capacity: usize) -> StreamedSource<&[u8]> {
        StreamedSource::with_config(
            input.as_bytes(),
            StreamConfig {
                buffer: BufferConfig::Fixed(vec![0; capacity]),
                ..StreamConfig::default()
            },
        )
    }

    fn auto(input: &str, initial_capacity: usize, coalescing: bool) -> StreamedSource<&[u8]> {
        StreamedSource::with_config(
            input.as_bytes(),
            StreamConfig {
                buffer: BufferConfig::Auto { initial_capacity },
                coalescing,
                ..StreamConfig::default()
            },
        )
    }

    #[test]
    fn splits_tags_text_and_references() {
        let mut source = StreamedSource::from_text("<p>Fish &amp; chips</p>");
        let mut seen = Vec::new();
        while let Some(segment) = source.next_segment().unwrap() {
            assert_eq!(source.current_segment(), Some(&segment));
            seen.push((summary(&segment), source.text_of(segment.span).unwrap().into_owned()));
        }
        assert_eq!(
            seen,
            vec![
                ((0, 3, 'T'), "<p>".to_string()),
                ((3, 8, 'x'), "Fish ".to_string()),
                ((8, 13, 'R'), "&amp;".to_string()),
                ((13, 19, 'x'), " chips".to_string()),
                ((19, 23, 'T'), "</p>".to_string()),
            ]
        );
        assert_eq!(source.current_segment(), None);
    }

    #[test]
    fn references_stay_in_text_when_not_split() {
        let config = StreamConfig {
            split_character_references: false,
            ..StreamConfig::default()
        };
        let source = StreamedSource::from_text_with_config("<p>Fish &amp; chips</p>", config);
        assert_eq!(collect(source), vec![(0, 3, 'T'), (3, 19, 'x'), (19, 23, 'T')]);
    }

    #[test]
    fn decoded_reference_character() {
        let mut source = StreamedSource::from_text("&#x20AC;&euro");
        let first = source.next_segment().unwrap().unwrap();
        assert_eq!(first.kind, SegmentKind::CharacterReference('\u{20AC}'));
        // No terminating ';': plain text.
        let second = source.next_segment().unwrap().unwrap();
        assert_eq!(summary(&second), (8, 13, 'x'));
    }

    #[test]
    fn fixed_buffer_chunks_text_on_char_boundaries() {
        let mut source = fixed("ééééé<b>", 4);
        let mut seen = Vec::new();
        while let Some(segment) = source.next_segment().unwrap() {
            seen.push((summary(&segment), source.text_of(segment.span).unwrap().into_owned()));
            if segment.span.begin() == 4 {
                assert!(matches!(
                    source.text_of(Span::new(0, 4).unwrap()),
                    Err(Error::DiscardedPosition { pos: 0 })
                ));
            }
        }
        assert_eq!(
            seen,
            vec![
                ((0, 4, 'x'), "éé".to_string()),
                ((4, 8, 'x'), "éé".to_string()),
                ((8, 10, 'x'), "é".to_string()),
                ((10, 13, 'T'), "<b>".to_string()),
            ]
        );
        assert_eq!(source.buffer_size(), 4);
    }

    #[test]
    fn tag_larger_than_fixed_buffer_fails_and_fuses() {
        let mut source = fixed("<p class='long'>", 4);
        let err = source.next().unwrap().unwrap_err();
        assert!(err.is_buffer_overflow());
        assert!(source.next().is_none());
        assert!(source.next_segment().unwrap().is_none());
    }

    #[test]
    fn coalescing_grows_to_hold_the_whole_run() {
        let mut source = auto("abcdefghij<b>", 4, true);
        let text = source.next_segment().unwrap().unwrap();
        assert_eq!(summary(&text), (0, 10, 'x'));
        assert_eq!(source.text_of(text.span).unwrap(), "abcdefghij");
        assert_eq!(source.buffer_size(), 16);
        let tag = source.next_segment().unwrap().unwrap();
        assert_eq!(source.tag_name(tag.as_tag().unwrap()), "b");
        assert!(source.next_segment().unwrap().is_none());
    }

    #[test]
    fn without_coalescing_text_comes_in_capacity_chunks() {
        let source = auto("abcdefghij<b>", 4, false);
        assert_eq!(
            collect(source),
            vec![(0, 4, 'x'), (4, 8, 'x'), (8, 10, 'x'), (10, 13, 'T')]
        );
    }

    #[test]
    fn raw_text_content_is_a_single_run() {
        let source = StreamedSource::from_text("<script>a<b>&amp;</script><i>");
        assert_eq!(
            collect(source),
            vec![(0, 8, 'T'), (8, 17, 'x'), (17, 26, 'T'), (26, 29, 'T')]
        );
    }

    #[test]
    fn nested_server_tags_follow_their_enclosing_tag() {
        let mut source = StreamedSource::from_text(r#"<a href="<%=url%>">x</a>"#);
        let mut types = Vec::new();
        let mut spans = Vec::new();
        while let Some(segment) = source.next_segment().unwrap() {
            types.push(segment.as_tag().map(|tag| tag.type_id));
            spans.push(summary(&segment));
        }
        assert_eq!(
            spans,
            vec![(0, 19, 'T'), (9, 17, 'T'), (19, 20, 'x'), (20, 24, 'T')]
        );
        assert_eq!(types[1], Some(ids::SERVER_COMMON));
    }

    #[test]
    fn server_tag_overhang_hides_the_tags_it_covers() {
        const INPUT: &str = r#"<a b="<%" ><i>%>"#;
        let source = StreamedSource::from_text(INPUT);
        assert_eq!(collect(source), vec![(0, 11, 'T'), (6, 16, 'T')]);
        let mut eager = crate::Source::new(INPUT);
        let begins: Vec<usize> = eager.all_tags().unwrap().iter().map(Tag::begin).collect();
        assert_eq!(begins, vec![0, 6]);
    }

    #[test]
    fn comment_opener_inside_script_is_text() {
        const INPUT: &str = "<script>x='<!--';</script><p>a</p><!-- z -->";
        let source = StreamedSource::from_text(INPUT);
        assert_eq!(
            collect(source),
            vec![
                (0, 8, 'T'),
                (8, 17, 'x'),
                (17, 26, 'T'),
                (26, 29, 'T'),
                (29, 30, 'x'),
                (30, 34, 'T'),
                (34, 44, 'T'),
            ]
        );
    }

    #[test]
    fn unregistered_tags_are_text() {
        let collector = IssueCollector::new();
        let source = StreamedSource::from_text("a <1x> b").with_issue_sink(collector.clone());
        assert_eq!(collect(source), vec![(0, 8, 'x')]);
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn debug_info_uses_plain_positions() {
        let mut source =
            StreamedSource::from_text("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<root/>");
        let segment = source.next_segment().unwrap().unwrap();
        let tag = segment.as_tag().copied().unwrap();
        assert_eq!(
            source.debug_info(&tag),
            "<?xml ?> (XML declaration) ((p0)-(p39))"
        );
        assert_eq!(source.stats().match_attempts, 1);
    }
}
