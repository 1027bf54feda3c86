//! Sliding-window text over an `io::Read`.
//!
//! `StreamedText` keeps only the bytes between `window_begin` and the end of
//! what has been read so far. Consumers promise, through
//! [`StreamedText::set_min_required_begin`], which prefix they no longer
//! need; that prefix is dropped lazily, the next time the window has to be
//! refilled. Reading below the window fails with
//! `Error::DiscardedPosition`.
//!
//! Invariants:
//! - `window_begin <= min_required_begin`.
//! - `buf.len()` is the capacity; `buf[..filled]` holds the window.
//! - `len` is only known once a read has returned 0 bytes (or the text was
//!   supplied whole).

use std::io::{self, Read};

use memchr::{memchr, memchr2};

use crate::error::{Error, Result, until_end};
use crate::text::{ParseText, RawText};

/// Initial capacity of an auto-growing window.
pub const DEFAULT_INITIAL_CAPACITY: usize = 8192;

#[derive(Debug)]
pub struct StreamedText<R> {
    reader: R,
    buf: Vec<u8>,
    filled: usize,
    window_begin: usize,
    min_required_begin: usize,
    len: Option<usize>,
    growable: bool,
}

impl<R: Read> StreamedText<R> {
    /// Auto-growing window with [`DEFAULT_INITIAL_CAPACITY`].
    pub fn new(reader: R) -> Self {
        Self::with_initial_capacity(reader, DEFAULT_INITIAL_CAPACITY)
    }

    /// Auto-growing window. Growth doubles the capacity, or jumps straight to
    /// the required size when doubling is not enough.
    pub fn with_initial_capacity(reader: R, capacity: usize) -> Self {
        Self::build(reader, vec![0; capacity], true)
    }

    /// Fixed window over a caller-supplied buffer; its length is the
    /// capacity and it never grows.
    pub fn with_buffer(reader: R, buffer: Vec<u8>) -> Self {
        Self::build(reader, buffer, false)
    }

    fn build(reader: R, buf: Vec<u8>, growable: bool) -> Self {
        Self {
            reader,
            buf,
            filled: 0,
            window_begin: 0,
            min_required_begin: 0,
            len: None,
            growable,
        }
    }
}

impl StreamedText<io::Empty> {
    /// Whole text resident up front: the length is known and nothing is ever
    /// discarded.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            reader: io::empty(),
            buf: bytes,
            filled: len,
            window_begin: 0,
            min_required_begin: 0,
            len: Some(len),
            growable: false,
        }
    }
}

impl<R: Read> StreamedText<R> {
    /// Raw byte at `pos`, reading (and discarding) as needed.
    pub fn byte_at(&mut self, pos: usize) -> Result<u8> {
        self.ensure_available(pos)?;
        Ok(self.buf[pos - self.window_begin])
    }

    /// Bytes of `[begin, end)`; the whole range must fit in the window.
    pub fn slice(&mut self, begin: usize, end: usize) -> Result<&[u8]> {
        if begin > end {
            return Err(Error::InvalidSpan { begin, end });
        }
        if end > begin {
            self.ensure_available(end - 1)?;
        }
        if begin < self.window_begin {
            return Err(Error::DiscardedPosition { pos: begin });
        }
        if end > self.window_end() {
            return Err(Error::IndexOutOfBounds {
                pos: end,
                len: self.window_end(),
            });
        }
        Ok(&self.buf[begin - self.window_begin..end - self.window_begin])
    }

    /// Declare that positions below `pos` are no longer needed.
    ///
    /// The watermark may move backwards as long as it stays inside the
    /// current window; nothing is discarded until more input is read.
    pub fn set_min_required_begin(&mut self, pos: usize) -> Result<()> {
        if pos < self.window_begin {
            return Err(Error::AlreadyDiscarded { pos });
        }
        self.min_required_begin = pos;
        Ok(())
    }

    /// Total length; unknown until the end of the stream has been observed.
    pub fn len(&self) -> Result<usize> {
        self.len.ok_or(Error::LengthUnknown)
    }

    pub fn known_len(&self) -> Option<usize> {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_growable(&self) -> bool {
        self.growable
    }

    pub fn window_begin(&self) -> usize {
        self.window_begin
    }

    pub fn window_end(&self) -> usize {
        self.window_begin + self.filled
    }

    pub fn min_required_begin(&self) -> usize {
        self.min_required_begin
    }

    /// Bytes currently held in the window.
    pub fn current_buffer_content(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Window bytes from `pos` (which must already be available) to the end
    /// of what has been read.
    fn window_from(&self, pos: usize) -> &[u8] {
        &self.buf[pos - self.window_begin..self.filled]
    }

    fn ensure_available(&mut self, pos: usize) -> Result<()> {
        loop {
            if pos < self.window_begin {
                return Err(Error::DiscardedPosition { pos });
            }
            if pos < self.window_end() {
                return Ok(());
            }
            if let Some(len) = self.len {
                return Err(Error::IndexOutOfBounds { pos, len });
            }
            self.read_more(pos)?;
        }
    }

    fn read_more(&mut self, pos: usize) -> Result<()> {
        if self.min_required_begin > self.window_begin {
            self.discard_prefix()?;
            if self.len.is_some() {
                return Ok(());
            }
        }
        if pos < self.window_begin {
            return Ok(());
        }

        let required = pos - self.window_begin + 1;
        if required > self.buf.len() {
            if !self.growable {
                return Err(Error::BufferOverflow {
                    capacity: self.buf.len(),
                    required,
                });
            }
            let capacity = (self.buf.len() * 2).max(required);
            log::debug!(
                target: "markup.stream",
                "growing window buffer {} -> {} for position {}",
                self.buf.len(),
                capacity,
                pos
            );
            self.buf.resize(capacity, 0);
        }

        let read = loop {
            match self.reader.read(&mut self.buf[self.filled..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };
        if read == 0 {
            self.len = Some(self.window_end());
        } else {
            self.filled += read;
        }
        Ok(())
    }

    fn discard_prefix(&mut self) -> Result<()> {
        let window_end = self.window_end();
        if self.min_required_begin >= window_end {
            let skip = self.min_required_begin - window_end;
            let skipped = io::copy(&mut (&mut self.reader).take(skip as u64), &mut io::sink())?;
            let skipped = skipped as usize;
            self.window_begin = window_end + skipped;
            self.filled = 0;
            if skipped < skip {
                self.len = Some(self.window_begin);
            }
            #[cfg(any(test, feature = "debug-stats"))]
            log::trace!(
                target: "markup.stream",
                "skipped {} bytes; window now starts at {}",
                skipped,
                self.window_begin
            );
            return Ok(());
        }
        let shift = self.min_required_begin - self.window_begin;
        self.buf.copy_within(shift..self.filled, 0);
        self.filled -= shift;
        self.window_begin = self.min_required_begin;
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "markup.stream",
            "discarded {} bytes; window now starts at {}",
            shift,
            self.window_begin
        );
        Ok(())
    }
}

impl<R: Read> RawText for StreamedText<R> {
    fn raw_byte_at(&mut self, pos: usize) -> Result<u8> {
        self.byte_at(pos)
    }
}

/// Lowercasing [`ParseText`] view over a [`StreamedText`].
///
/// Needles passed to the search methods must be lowercase; an uppercase
/// needle never matches.
#[derive(Debug)]
pub struct StreamedParseText<R> {
    text: StreamedText<R>,
}

impl<R: Read> StreamedParseText<R> {
    pub fn new(text: StreamedText<R>) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &StreamedText<R> {
        &self.text
    }

    pub fn text_mut(&mut self) -> &mut StreamedText<R> {
        &mut self.text
    }

    pub fn into_inner(self) -> StreamedText<R> {
        self.text
    }
}

impl<R: Read> ParseText for StreamedParseText<R> {
    fn byte_at(&mut self, pos: usize) -> Result<u8> {
        Ok(self.text.byte_at(pos)?.to_ascii_lowercase())
    }

    fn known_len(&self) -> Option<usize> {
        self.text.known_len()
    }

    fn find_byte(&mut self, needle: u8, from: usize, limit: Option<usize>) -> Result<Option<usize>> {
        let mut pos = from;
        loop {
            if limit.is_some_and(|limit| pos >= limit) {
                return Ok(None);
            }
            if until_end(self.text.ensure_available(pos))?.is_none() {
                return Ok(None);
            }
            let mut window = self.text.window_from(pos);
            if let Some(limit) = limit {
                window = &window[..window.len().min(limit - pos)];
            }
            let hit = if needle.is_ascii_uppercase() {
                None
            } else if needle.is_ascii_lowercase() {
                memchr2(needle, needle.to_ascii_uppercase(), window)
            } else {
                memchr(needle, window)
            };
            if let Some(rel) = hit {
                return Ok(Some(pos + rel));
            }
            pos += window.len();
        }
    }

    /// Letters are folded byte by byte; other needles scan whole windows.
    fn find_either(
        &mut self,
        a: u8,
        b: u8,
        from: usize,
        limit: Option<usize>,
    ) -> Result<Option<usize>> {
        let mut pos = from;
        loop {
            if limit.is_some_and(|limit| pos >= limit) {
                return Ok(None);
            }
            if until_end(self.text.ensure_available(pos))?.is_none() {
                return Ok(None);
            }
            let mut window = self.text.window_from(pos);
            if let Some(limit) = limit {
                window = &window[..window.len().min(limit - pos)];
            }
            let hit = if a.is_ascii_alphabetic() || b.is_ascii_alphabetic() {
                window.iter().position(|byte| {
                    let byte = byte.to_ascii_lowercase();
                    byte == a || byte == b
                })
            } else {
                memchr2(a, b, window)
            };
            if let Some(rel) = hit {
                return Ok(Some(pos + rel));
            }
            pos += window.len();
        }
    }
}
