use std::fmt;

use memchr::memchr2;
use tools::utf8::char_count_lossy;

/// 1-based row and column of a byte position.
///
/// Columns count characters, not bytes. `\n`, `\r\n` and a lone `\r` all
/// end a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowColumn {
    pub row: usize,
    pub column: usize,
    pub pos: usize,
}

impl fmt::Display for RowColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(r{},c{},p{})", self.row, self.column, self.pos)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &[u8]) -> Self {
        let mut starts = vec![0];
        let mut i = 0;
        while let Some(rel) = memchr2(b'\n', b'\r', &text[i..]) {
            let at = i + rel;
            let next = if text[at] == b'\r' && text.get(at + 1) == Some(&b'\n') {
                at + 2
            } else {
                at + 1
            };
            starts.push(next);
            i = next;
        }
        Self { starts }
    }

    /// Positions past the end clamp to the end of the text.
    pub(crate) fn row_column(&self, text: &[u8], pos: usize) -> RowColumn {
        let pos = pos.min(text.len());
        let row = self.starts.partition_point(|&start| start <= pos);
        let line_start = self.starts[row - 1];
        RowColumn {
            row,
            column: char_count_lossy(&text[line_start..pos]) + 1,
            pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(text: &str, pos: usize) -> (usize, usize) {
        let index = LineIndex::new(text.as_bytes());
        let rc = index.row_column(text.as_bytes(), pos);
        (rc.row, rc.column)
    }

    #[test]
    fn all_line_break_styles() {
        let text = "ab\ncd\r\nef\rgh";
        assert_eq!(rc(text, 0), (1, 1));
        assert_eq!(rc(text, 2), (1, 3));
        assert_eq!(rc(text, 3), (2, 1));
        assert_eq!(rc(text, 7), (3, 1));
        assert_eq!(rc(text, 10), (4, 1));
        assert_eq!(rc(text, 12), (4, 3));
    }

    #[test]
    fn columns_count_characters() {
        assert_eq!(rc("é<b>", 2), (1, 2));
    }

    #[test]
    fn display_format() {
        let rc = RowColumn {
            row: 1,
            column: 40,
            pos: 39,
        };
        assert_eq!(rc.to_string(), "(r1,c40,p39)");
    }
}
