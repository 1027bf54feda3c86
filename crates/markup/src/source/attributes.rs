//! Attribute spans of a normal start tag.
//!
//! Works on the lowercased bytes between the end of the tag name and the
//! closing `>`. Server tags (`<% ... %>`) between attributes or inside
//! quoted values are stepped over.

use crate::span::Span;
use crate::tag::{Attribute, Tag};
use crate::tag_type::builtin::is_whitespace;

pub(crate) fn parse_attributes(bytes: &[u8], tag: &Tag) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    let end = tag.end().saturating_sub(1).min(bytes.len());
    let mut i = tag.name_span.end();

    while i < end {
        let b = bytes[i];
        if is_whitespace(b) || b == b'/' || b == b'=' {
            i += 1;
            continue;
        }
        if bytes[i..end].starts_with(b"<%") {
            i = skip_server_tag(bytes, i, end);
            continue;
        }

        let name_begin = i;
        while i < end
            && !is_whitespace(bytes[i])
            && !matches!(bytes[i], b'=' | b'>' | b'/')
            && !bytes[i..end].starts_with(b"<%")
        {
            i += 1;
        }
        if i == name_begin {
            i += 1;
            continue;
        }
        let name = Span::ordered(name_begin, i);

        let mut j = i;
        while j < end && is_whitespace(bytes[j]) {
            j += 1;
        }
        if j >= end || bytes[j] != b'=' {
            attributes.push(Attribute { name, value: None });
            continue;
        }
        j += 1;
        while j < end && is_whitespace(bytes[j]) {
            j += 1;
        }

        let value = match bytes.get(j) {
            Some(&quote @ (b'"' | b'\'')) if j < end => {
                let value_begin = j + 1;
                let close = find_closing_quote(bytes, value_begin, end, quote);
                i = (close + 1).min(end);
                Span::ordered(value_begin, close)
            }
            _ => {
                let value_begin = j;
                while j < end
                    && !is_whitespace(bytes[j])
                    && !(bytes[j] == b'/' && j + 1 == end)
                {
                    j += 1;
                }
                i = j;
                Span::ordered(value_begin, j)
            }
        };
        attributes.push(Attribute {
            name,
            value: Some(value),
        });
    }
    attributes
}

fn skip_server_tag(bytes: &[u8], from: usize, end: usize) -> usize {
    memchr::memmem::find(&bytes[from + 2..end], b"%>").map_or(end, |rel| from + 2 + rel + 2)
}

/// Position of the closing quote, or `end` for an unterminated value.
fn find_closing_quote(bytes: &[u8], from: usize, end: usize, quote: u8) -> usize {
    let mut i = from;
    while i < end {
        if bytes[i] == quote {
            return i;
        }
        if bytes[i..end].starts_with(b"<%") {
            i = skip_server_tag(bytes, i, end);
            continue;
        }
        i += 1;
    }
    end
}
