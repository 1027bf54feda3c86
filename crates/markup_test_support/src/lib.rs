use std::fmt::Write;

/// Escape `text` for one-line snapshot output.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch.is_control() => {
                let _ = write!(&mut out, "\\u{{{:04X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Readable report of the first difference between two snapshots, with two
/// lines of context on either side.
pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    const MISSING: &str = "<missing>";
    let line = |lines: &[String], idx: usize| lines.get(idx).map_or(MISSING, String::as_str).to_owned();

    let total = expected.len().max(actual.len());
    let mut out = String::new();
    match (0..total).find(|&idx| line(expected, idx) != line(actual, idx)) {
        Some(first) => {
            let from = first.saturating_sub(2);
            let to = (first + 3).min(total);
            let _ = writeln!(&mut out, "snapshots differ at line {}:", first + 1);
            for idx in from..to {
                let marker = if idx == first { ">" } else { " " };
                let _ = writeln!(&mut out, "{marker} {:>4} expected: {}", idx + 1, line(expected, idx));
                let _ = writeln!(&mut out, "{marker} {:>4}   actual: {}", idx + 1, line(actual, idx));
            }
        }
        None => {
            let _ = writeln!(&mut out, "snapshots are identical");
        }
    }
    let _ = writeln!(
        &mut out,
        "expected {} lines, actual {} lines",
        expected.len(),
        actual.len()
    );
    out
}

pub mod fixtures;

#[cfg(feature = "markup")]
pub mod segment_snapshot;
