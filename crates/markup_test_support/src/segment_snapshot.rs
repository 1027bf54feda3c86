use std::io::Read;

use markup::{Segment, SegmentKind, Source, Span, StreamedSource, Tag};

use crate::escape_text;

fn tag_line(description: &str, span: Span, text: &str) -> String {
    format!(
        "TAG {description} {}..{} \"{}\"",
        span.begin(),
        span.end(),
        escape_text(text)
    )
}

fn text_line(span: Span, text: &str) -> String {
    format!("TEXT {}..{} \"{}\"", span.begin(), span.end(), escape_text(text))
}

/// One line per segment of a complete stream.
///
/// Text is read right after each segment is returned, while it is still in
/// the window.
pub fn format_stream<R: Read>(source: &mut StreamedSource<R>) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    while let Some(segment) = source
        .next_segment()
        .map_err(|err| format!("stream failed after {} segments: {err}", out.len()))?
    {
        let text = source
            .text_of(segment.span)
            .map_err(|err| format!("segment {} text unavailable: {err}", segment.span))?;
        let line = match segment.kind {
            SegmentKind::Tag(tag) => {
                tag_line(source.table().description(tag.type_id), segment.span, &text)
            }
            SegmentKind::Text => text_line(segment.span, &text),
            SegmentKind::CharacterReference(ch) => format!(
                "CHARREF {}..{} U+{:04X}",
                segment.span.begin(),
                segment.span.end(),
                ch as u32
            ),
        };
        out.push(line);
    }
    Ok(out)
}

/// Tag lines only, for comparison against [`format_source_tags`].
pub fn stream_tag_lines(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| line.starts_with("TAG "))
        .cloned()
        .collect()
}

pub fn format_tags(source: &Source, tags: &[Tag]) -> Vec<String> {
    tags.iter()
        .map(|tag| {
            tag_line(
                source.table().description(tag.type_id),
                tag.span,
                source.text_of(tag.span),
            )
        })
        .collect()
}

/// Every registered tag of a full sequential pass.
pub fn format_source_tags(source: &mut Source) -> Result<Vec<String>, String> {
    let tags = source
        .all_tags()
        .map_err(|err| format!("full pass failed: {err}"))?
        .to_vec();
    Ok(format_tags(source, &tags))
}

/// Tags and text of [`Source::nodes`].
pub fn format_source_nodes(source: &mut Source) -> Result<Vec<String>, String> {
    let nodes: Vec<Segment> = source
        .nodes()
        .map_err(|err| format!("full pass failed: {err}"))?
        .collect();
    Ok(nodes
        .iter()
        .map(|node| match node {
            Segment::Tag(tag) => tag_line(
                source.table().description(tag.type_id),
                tag.span,
                source.text_of(tag.span),
            ),
            Segment::Text(span) => text_line(*span, source.text_of(*span)),
        })
        .collect())
}
