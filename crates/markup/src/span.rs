//! Byte spans into a document.

use std::fmt;

use crate::error::{Error, Result};

/// Half-open byte range `[begin, end)` into the document text.
///
/// Invariant: `begin <= end`. Ordering is by `(begin, end)`, so a full
/// traversal sorted by span is sorted by start position first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    begin: usize,
    end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Result<Self> {
        if begin > end {
            return Err(Error::InvalidSpan { begin, end });
        }
        Ok(Self { begin, end })
    }

    /// Construct a span whose bounds the caller has already ordered.
    pub(crate) fn ordered(begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end, "span begin must be <= end");
        Self { begin, end }
    }

    pub fn begin(self) -> usize {
        self.begin
    }

    pub fn end(self) -> usize {
        self.end
    }

    pub fn len(self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(self) -> bool {
        self.begin == self.end
    }

    /// `other` lies entirely within `self`.
    pub fn encloses(self, other: Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// `pos` lies strictly inside the span; the bounds themselves are outside.
    pub fn strictly_contains(self, pos: usize) -> bool {
        self.begin < pos && pos < self.end
    }

    pub fn range(self) -> std::ops::Range<usize> {
        self.begin..self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(p{})-(p{})", self.begin, self.end)
    }
}
