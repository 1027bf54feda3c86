//! Case-folded, random-access views of document text.
//!
//! Tag matching runs against a `ParseText`: every byte is ASCII-lowercased
//! so delimiters and names compare with plain byte equality. Two views
//! implement it: [`LowerText`] holds the whole document, and
//! [`crate::streamed_text::StreamedParseText`] reads through a sliding
//! window over an `io::Read`.
//!
//! Positions are absolute byte offsets. Reading past the end of the text
//! fails with `Error::IndexOutOfBounds`; the search helpers report that as
//! "not found".

use memchr::{memchr, memchr2, memmem, memrchr};

use crate::error::{Error, Result, until_end};
use crate::span::Span;

pub trait ParseText {
    /// Lowercased byte at `pos`.
    fn byte_at(&mut self, pos: usize) -> Result<u8>;

    /// Document length, once it is known.
    fn known_len(&self) -> Option<usize>;

    /// `needle` (lowercase) occurs at `pos`. Running off the end is `false`.
    fn starts_with_at(&mut self, pos: usize, needle: &[u8]) -> Result<bool> {
        for (i, &b) in needle.iter().enumerate() {
            match until_end(self.byte_at(pos + i))? {
                Some(actual) if actual == b => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// First occurrence of `needle` in `[from, limit)`.
    fn find_byte(&mut self, needle: u8, from: usize, limit: Option<usize>) -> Result<Option<usize>> {
        let mut pos = from;
        while limit.is_none_or(|limit| pos < limit) {
            match until_end(self.byte_at(pos))? {
                Some(b) if b == needle => return Ok(Some(pos)),
                Some(_) => pos += 1,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// First occurrence of either needle in `[from, limit)`.
    fn find_either(
        &mut self,
        a: u8,
        b: u8,
        from: usize,
        limit: Option<usize>,
    ) -> Result<Option<usize>> {
        let mut pos = from;
        while limit.is_none_or(|limit| pos < limit) {
            match until_end(self.byte_at(pos))? {
                Some(x) if x == a || x == b => return Ok(Some(pos)),
                Some(_) => pos += 1,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// First occurrence of `needle` (lowercase) starting in `[from, limit)`.
    fn find_seq(&mut self, needle: &[u8], from: usize, limit: Option<usize>) -> Result<Option<usize>> {
        let Some((&first, _)) = needle.split_first() else {
            return Ok(Some(from));
        };
        let mut pos = from;
        while let Some(candidate) = self.find_byte(first, pos, limit)? {
            if self.starts_with_at(candidate, needle)? {
                return Ok(Some(candidate));
            }
            pos = candidate + 1;
        }
        Ok(None)
    }

    /// Last occurrence of `needle` in `[floor, from]`.
    fn rfind_byte(&mut self, needle: u8, from: usize, floor: usize) -> Result<Option<usize>> {
        let mut pos = from;
        loop {
            if pos < floor {
                return Ok(None);
            }
            if let Some(b) = until_end(self.byte_at(pos))?
                && b == needle
            {
                return Ok(Some(pos));
            }
            match pos.checked_sub(1) {
                Some(prev) => pos = prev,
                None => return Ok(None),
            }
        }
    }

    /// Last occurrence of `needle` (lowercase) starting in `[floor, from]`.
    fn rfind_seq(&mut self, needle: &[u8], from: usize, floor: usize) -> Result<Option<usize>> {
        let Some((&first, _)) = needle.split_first() else {
            return Ok(Some(from));
        };
        let mut pos = from;
        while let Some(candidate) = self.rfind_byte(first, pos, floor)? {
            if self.starts_with_at(candidate, needle)? {
                return Ok(Some(candidate));
            }
            match candidate.checked_sub(1) {
                Some(prev) => pos = prev,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Append the lowercased bytes of `[begin, end)` to `out`.
    fn copy_range(&mut self, begin: usize, end: usize, out: &mut Vec<u8>) -> Result<()> {
        for pos in begin..end {
            out.push(self.byte_at(pos)?);
        }
        Ok(())
    }
}

/// Access to the unfolded document bytes, for collaborators whose syntax is
/// case-sensitive (character references).
pub trait RawText {
    fn raw_byte_at(&mut self, pos: usize) -> Result<u8>;
}

impl RawText for &[u8] {
    fn raw_byte_at(&mut self, pos: usize) -> Result<u8> {
        self.get(pos).copied().ok_or(Error::IndexOutOfBounds {
            pos,
            len: self.len(),
        })
    }
}

/// In-memory lowercased copy of the whole document.
#[derive(Clone, Debug)]
pub struct LowerText {
    bytes: Vec<u8>,
}

impl LowerText {
    pub fn new(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_ascii_lowercase(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite `span` with spaces so no markup is recognised inside it.
    pub fn blank(&mut self, span: Span) {
        let end = span.end().min(self.bytes.len());
        let begin = span.begin().min(end);
        self.bytes[begin..end].fill(b' ');
    }

    fn window(&self, from: usize, limit: Option<usize>) -> &[u8] {
        let end = limit.map_or(self.bytes.len(), |l| l.min(self.bytes.len()));
        if from >= end {
            return &[];
        }
        &self.bytes[from..end]
    }
}

impl ParseText for LowerText {
    fn byte_at(&mut self, pos: usize) -> Result<u8> {
        self.bytes.get(pos).copied().ok_or(Error::IndexOutOfBounds {
            pos,
            len: self.bytes.len(),
        })
    }

    fn known_len(&self) -> Option<usize> {
        Some(self.bytes.len())
    }

    fn starts_with_at(&mut self, pos: usize, needle: &[u8]) -> Result<bool> {
        Ok(self
            .bytes
            .get(pos..pos.saturating_add(needle.len()))
            .is_some_and(|s| s == needle))
    }

    fn find_byte(&mut self, needle: u8, from: usize, limit: Option<usize>) -> Result<Option<usize>> {
        Ok(memchr(needle, self.window(from, limit)).map(|rel| from + rel))
    }

    fn find_either(
        &mut self,
        a: u8,
        b: u8,
        from: usize,
        limit: Option<usize>,
    ) -> Result<Option<usize>> {
        Ok(memchr2(a, b, self.window(from, limit)).map(|rel| from + rel))
    }

    fn find_seq(&mut self, needle: &[u8], from: usize, limit: Option<usize>) -> Result<Option<usize>> {
        // The match may extend past `limit`; only its start is bounded.
        let extended = limit.map(|l| l.saturating_add(needle.len().saturating_sub(1)));
        Ok(memmem::find(self.window(from, extended), needle)
            .map(|rel| from + rel)
            .filter(|&pos| limit.is_none_or(|l| pos < l)))
    }

    fn rfind_byte(&mut self, needle: u8, from: usize, floor: usize) -> Result<Option<usize>> {
        let end = from.saturating_add(1).min(self.bytes.len());
        if floor >= end {
            return Ok(None);
        }
        Ok(memrchr(needle, &self.bytes[floor..end]).map(|rel| floor + rel))
    }

    fn rfind_seq(&mut self, needle: &[u8], from: usize, floor: usize) -> Result<Option<usize>> {
        let end = from
            .saturating_add(needle.len())
            .min(self.bytes.len());
        if floor >= end {
            return Ok(None);
        }
        Ok(memmem::rfind(&self.bytes[floor..end], needle).map(|rel| floor + rel))
    }

    fn copy_range(&mut self, begin: usize, end: usize, out: &mut Vec<u8>) -> Result<()> {
        let slice = self.bytes.get(begin..end).ok_or(Error::IndexOutOfBounds {
            pos: end,
            len: self.bytes.len(),
        })?;
        out.extend_from_slice(slice);
        Ok(())
    }
}
