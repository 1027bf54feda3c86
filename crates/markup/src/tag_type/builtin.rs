//! Built-in HTML, XML and server-side tag grammars.

use crate::error::Result;
use crate::matcher::{MatchCx, position_is_valid};
use crate::span::Span;
use crate::tag::{Tag, TagRole, TagTypeId};

use super::TagType;

/// Ids of the built-in types; stable because the builder registers them
/// first and in this order.
pub mod ids {
    use crate::tag::TagTypeId;

    pub const UNREGISTERED_START: TagTypeId = TagTypeId::UNREGISTERED_START;
    pub const UNREGISTERED_END: TagTypeId = TagTypeId::UNREGISTERED_END;
    pub const SERVER_COMMENT: TagTypeId = TagTypeId(2);
    pub const COMMENT: TagTypeId = TagTypeId(3);
    pub const CDATA_SECTION: TagTypeId = TagTypeId(4);
    pub const XML_DECLARATION: TagTypeId = TagTypeId(5);
    pub const SERVER_COMMON: TagTypeId = TagTypeId(6);
    pub const DOCTYPE: TagTypeId = TagTypeId(7);
    pub const MARKUP_DECLARATION: TagTypeId = TagTypeId(8);
    pub const PROCESSING_INSTRUCTION: TagTypeId = TagTypeId(9);
    pub const NORMAL_END: TagTypeId = TagTypeId(10);
    pub const NORMAL_START: TagTypeId = TagTypeId(11);
}

const MARKUP_DECLARATION_KEYWORDS: [&[u8]; 4] = [b"element", b"attlist", b"entity", b"notation"];

pub(crate) fn default_types() -> Vec<TagType> {
    let mut unregistered_start = TagType::new("unregistered", "<", ">", i32::MAX, never);
    unregistered_start.masks_enclosed = false;
    let mut unregistered_end = TagType::new("/unregistered", "</", ">", i32::MAX, never).end_role();
    unregistered_end.masks_enclosed = false;

    let mut doctype_type =
        TagType::new("document type declaration", "<!doctype", ">", 20, doctype);
    doctype_type.masks_enclosed = false;

    let types = vec![
        unregistered_start,
        unregistered_end,
        TagType::new("server comment", "<%--", "--%>", 5, delimited).server(),
        TagType::new("comment", "<!--", "-->", 10, delimited).separately_cached(),
        TagType::new("CDATA section", "<![cdata[", "]]>", 10, delimited).separately_cached(),
        TagType::new("XML declaration", "<?xml", "?>", 10, xml_declaration),
        TagType::new("server tag", "<%", "%>", 15, delimited).server(),
        doctype_type,
        TagType::new("markup declaration", "<!", ">", 30, markup_declaration),
        TagType::new("processing instruction", "<?", "?>", 30, processing_instruction),
        TagType::new("/normal", "</", ">", 50, normal_end)
            .end_role()
            .with_validator(end_tag_position_is_valid),
        TagType::new("normal", "<", ">", 60, normal_start),
    ];
    debug_assert_eq!(types.len(), ids::NORMAL_START.0 as usize + 1);
    types
}

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0C)
}

pub(crate) fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

pub(crate) fn is_name_char(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit() || b == b'.' || b == b'-'
}

fn never(_: &mut MatchCx<'_>, _: usize, _: TagTypeId) -> Result<Option<Tag>> {
    Ok(None)
}

/// Scan a name starting at `from`; returns the position after it, or `None`
/// when no name starts there.
fn scan_name(cx: &mut MatchCx<'_>, from: usize) -> Result<Option<usize>> {
    match cx.byte_at(from)? {
        Some(b) if is_name_start(b) => {}
        _ => return Ok(None),
    }
    let mut pos = from + 1;
    while let Some(b) = cx.byte_at(pos)? {
        if !is_name_char(b) {
            break;
        }
        pos += 1;
    }
    Ok(Some(pos))
}

fn named_by_delimiter(
    cx: &mut MatchCx<'_>,
    pos: usize,
    end: usize,
    id: TagTypeId,
) -> Result<Option<Tag>> {
    let Some(tag_type) = cx.table().get(id) else {
        return Ok(None);
    };
    let (role, delimiter, name) = (
        tag_type.role,
        tag_type.start_delimiter,
        tag_type.delimiter_name(),
    );
    let name = cx.intern(name)?;
    Ok(Some(Tag {
        span: Span::ordered(pos, end),
        name_span: Span::ordered(pos, pos + delimiter.len()),
        type_id: id,
        name,
        role,
    }))
}

/// Everything from the start delimiter to the first closing delimiter.
fn delimited(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
    let Some(tag_type) = cx.table().get(id) else {
        return Ok(None);
    };
    let (open, close) = (
        tag_type.start_delimiter.len(),
        tag_type.closing_delimiter.as_bytes(),
    );
    let Some(close_at) = cx.find_seq(close, pos + open)? else {
        return Ok(None);
    };
    named_by_delimiter(cx, pos, close_at + close.len(), id)
}

fn xml_declaration(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
    // `<?xml-stylesheet` is a processing instruction, not a declaration.
    match cx.byte_at(pos + 5)? {
        Some(b) if is_whitespace(b) || b == b'?' => delimited(cx, pos, id),
        _ => Ok(None),
    }
}

fn processing_instruction(
    cx: &mut MatchCx<'_>,
    pos: usize,
    id: TagTypeId,
) -> Result<Option<Tag>> {
    let Some(target_end) = scan_name(cx, pos + 2)? else {
        return Ok(None);
    };
    let Some(close_at) = cx.find_seq(b"?>", target_end)? else {
        return Ok(None);
    };
    // Name is `?` plus the target.
    let name = cx.intern_range(pos + 1, target_end)?;
    Ok(Some(Tag {
        span: Span::ordered(pos, close_at + 2),
        name_span: Span::ordered(pos, target_end),
        type_id: id,
        name,
        role: TagRole::Start,
    }))
}

/// Position of the first `>` at or after `from` that is outside quotes
/// (and, with `subset`, outside a `[...]` internal subset).
fn find_declaration_close(cx: &mut MatchCx<'_>, from: usize, subset: bool) -> Result<Option<usize>> {
    let mut pos = from;
    let mut in_subset = false;
    while let Some(b) = cx.byte_at(pos)? {
        match b {
            b'"' | b'\'' => {
                let Some(close) = cx.find_byte(b, pos + 1)? else {
                    return Ok(None);
                };
                pos = close + 1;
                continue;
            }
            b'[' if subset => in_subset = true,
            b']' if subset => in_subset = false,
            b'>' if !in_subset => return Ok(Some(pos)),
            _ => {}
        }
        pos += 1;
    }
    Ok(None)
}

fn doctype(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
    let Some(close) = find_declaration_close(cx, pos + "<!doctype".len(), true)? else {
        return Ok(None);
    };
    named_by_delimiter(cx, pos, close + 1, id)
}

fn markup_declaration(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
    let mut keyword_end = None;
    for keyword in MARKUP_DECLARATION_KEYWORDS {
        if cx.starts_with_at(pos + 2, keyword)? {
            keyword_end = Some(pos + 2 + keyword.len());
            break;
        }
    }
    let Some(keyword_end) = keyword_end else {
        return Ok(None);
    };
    match cx.byte_at(keyword_end)? {
        Some(b) if is_whitespace(b) => {}
        _ => return Ok(None),
    }
    let Some(close) = find_declaration_close(cx, keyword_end, false)? else {
        return Ok(None);
    };
    let name = cx.intern_range(pos + 1, keyword_end)?;
    Ok(Some(Tag {
        span: Span::ordered(pos, close + 1),
        name_span: Span::ordered(pos, keyword_end),
        type_id: id,
        name,
        role: TagRole::Start,
    }))
}

/// Inside raw-text content only the end tag closing that element may begin.
fn end_tag_position_is_valid(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<bool> {
    if let Some((name, from)) = cx.raw_text_element() {
        if pos < from {
            return Ok(false);
        }
        let Some(expected) = cx.resolve(name).map(|s| s.as_bytes().to_vec()) else {
            return Ok(false);
        };
        if !cx.starts_with_at(pos + 2, &expected)? {
            return Ok(false);
        }
        return Ok(match cx.byte_at(pos + 2 + expected.len())? {
            Some(b) => !is_name_char(b),
            None => false,
        });
    }
    position_is_valid(cx, pos, id)
}

fn normal_end(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
    let Some(name_end) = scan_name(cx, pos + 2)? else {
        return Ok(None);
    };
    let mut p = name_end;
    loop {
        match cx.byte_at(p)? {
            Some(b) if is_whitespace(b) => p += 1,
            Some(b'>') => break,
            _ => return Ok(None),
        }
    }
    let name = cx.intern_range(pos + 2, name_end)?;
    Ok(Some(Tag {
        span: Span::ordered(pos, p + 1),
        name_span: Span::ordered(pos, name_end),
        type_id: id,
        name,
        role: TagRole::End,
    }))
}

fn normal_start(cx: &mut MatchCx<'_>, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
    let Some(name_end) = scan_name(cx, pos + 1)? else {
        return Ok(None);
    };
    let Some(end) = find_start_tag_end(cx, name_end)? else {
        return Ok(None);
    };
    let name = cx.intern_range(pos + 1, name_end)?;
    Ok(Some(Tag {
        span: Span::ordered(pos, end),
        name_span: Span::ordered(pos, name_end),
        type_id: id,
        name,
        role: TagRole::Start,
    }))
}

/// End (exclusive) of a start tag whose attributes begin at `from`.
///
/// Quoted attribute values may contain `>` and `<`. Server tags inside the
/// tag are stepped over. Any other `<` means this is not a start tag.
fn find_start_tag_end(cx: &mut MatchCx<'_>, from: usize) -> Result<Option<usize>> {
    let mut pos = from;
    let mut after_equals = false;
    while let Some(b) = cx.byte_at(pos)? {
        match b {
            b'>' => return Ok(Some(pos + 1)),
            b'/' if cx.byte_at(pos + 1)? == Some(b'>') => return Ok(Some(pos + 2)),
            b'"' | b'\'' if after_equals => {
                let Some(close) = cx.find_byte(b, pos + 1)? else {
                    return Ok(None);
                };
                pos = close + 1;
                after_equals = false;
                continue;
            }
            b'<' => {
                if !cx.starts_with_at(pos, b"<%")? {
                    return Ok(None);
                }
                let Some(close) = cx.find_seq(b"%>", pos + 2)? else {
                    return Ok(None);
                };
                pos = close + 2;
                after_equals = false;
                continue;
            }
            b'=' => after_equals = true,
            b if is_whitespace(b) => {}
            _ => after_equals = false,
        }
        pos += 1;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;
    use crate::issue::DiscardIssues;
    use crate::matcher::{MatchResult, MatchStats, PositionContext, Watermark, match_at};
    use crate::tag_type::TagTypeTable;
    use crate::text::LowerText;

    fn first_match(input: &str) -> (MatchResult, AtomTable) {
        let table = TagTypeTable::default();
        let mut text = LowerText::new(input);
        let mut atoms = AtomTable::new();
        let mut stats = MatchStats::default();
        let mut issues = DiscardIssues;
        let result = {
            let mut cx = MatchCx::new(
                &mut text,
                &mut atoms,
                &table,
                PositionContext::Watermark(Watermark::start()),
                &mut issues,
                &mut stats,
            );
            match_at(&mut cx, 0).unwrap()
        };
        (result, atoms)
    }

    fn tag_of(input: &str) -> (Tag, String) {
        match first_match(input) {
            (MatchResult::Tag(tag), atoms) => {
                let name = atoms.resolve(tag.name).unwrap().to_string();
                (tag, name)
            }
            (other, _) => panic!("expected a tag in {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn normal_start_tag_with_quoted_gt() {
        let input = r#"<A href="x>y" title='<b>'>rest"#;
        let (tag, name) = tag_of(input);
        assert_eq!(tag.type_id, ids::NORMAL_START);
        assert_eq!(name, "a");
        assert_eq!(&input[tag.span.range()], r#"<A href="x>y" title='<b>'>"#);
        assert_eq!(&input[tag.name_span.range()], "<A");
    }

    #[test]
    fn self_closing_start_tag() {
        let (tag, _) = tag_of("<br/>x");
        assert_eq!(tag.span, Span::new(0, 5).unwrap());
    }

    #[test]
    fn unquoted_lt_rejects_start_tag() {
        let (result, _) = first_match("<a <b>");
        assert!(matches!(result, MatchResult::NotATag));
    }

    #[test]
    fn server_tag_inside_start_tag_is_stepped_over() {
        let input = r#"<a href=<%= url %>>x"#;
        let (tag, _) = tag_of(input);
        assert_eq!(tag.end(), input.len() - 1);
    }

    #[test]
    fn end_tag_allows_trailing_whitespace() {
        let (tag, name) = tag_of("</DIV  >");
        assert_eq!(tag.type_id, ids::NORMAL_END);
        assert_eq!(tag.role, TagRole::End);
        assert_eq!(name, "div");
        assert_eq!(tag.end(), 8);
    }

    #[test]
    fn end_tag_rejects_attributes() {
        let (result, _) = first_match("</div class=x>");
        assert!(matches!(result, MatchResult::Unregistered(_)));
    }

    #[test]
    fn comment_and_cdata() {
        let (tag, name) = tag_of("<!-- a <b> -->c");
        assert_eq!((tag.type_id, name.as_str(), tag.end()), (ids::COMMENT, "!--", 14));
        let (tag, name) = tag_of("<![CDATA[ <x> ]]>");
        assert_eq!(tag.type_id, ids::CDATA_SECTION);
        assert_eq!(name, "![cdata[");
        assert_eq!(tag.end(), 17);
    }

    #[test]
    fn xml_declaration_versus_processing_instruction() {
        let (tag, name) = tag_of(r#"<?xml version="1.0"?>"#);
        assert_eq!((tag.type_id, name.as_str()), (ids::XML_DECLARATION, "?xml"));
        let (tag, name) = tag_of(r#"<?xml-stylesheet href="a.css"?>"#);
        assert_eq!(
            (tag.type_id, name.as_str()),
            (ids::PROCESSING_INSTRUCTION, "?xml-stylesheet")
        );
    }

    #[test]
    fn doctype_spans_internal_subset() {
        let input = "<!DOCTYPE x [\n <!ELEMENT g (#PCDATA)>\n <!ENTITY p \"<p>\">\n]>tail";
        let (tag, name) = tag_of(input);
        assert_eq!(tag.type_id, ids::DOCTYPE);
        assert_eq!(name, "!doctype");
        assert_eq!(&input[tag.end()..], "tail");
    }

    #[test]
    fn markup_declaration_respects_quotes() {
        let input = "<!ENTITY p \"<p>\">z";
        let (tag, name) = tag_of(input);
        assert_eq!(tag.type_id, ids::MARKUP_DECLARATION);
        assert_eq!(name, "!entity");
        assert_eq!(&input[tag.end()..], "z");
    }

    #[test]
    fn server_comment_beats_server_tag() {
        let (tag, name) = tag_of("<%-- x %> --%>");
        assert_eq!((tag.type_id, name.as_str()), (ids::SERVER_COMMENT, "%--"));
        assert_eq!(tag.end(), 14);
        let (tag, _) = tag_of("<%= x %>");
        assert_eq!(tag.type_id, ids::SERVER_COMMON);
    }

    #[test]
    fn unterminated_comment_is_unregistered() {
        let (result, atoms) = first_match("<!-- never closed > x");
        let MatchResult::Unregistered(tag) = result else {
            panic!("expected unregistered, got {result:?}");
        };
        assert_eq!(tag.type_id, TagTypeId::UNREGISTERED_START);
        assert_eq!(atoms.resolve(tag.name), Some("!--"));
        assert_eq!(tag.end(), 19);
    }
}
