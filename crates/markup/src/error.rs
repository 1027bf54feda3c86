//! Error type shared by the text views, the matcher and both sources.
//!
//! Malformed markup never produces an `Error`; it degrades to an
//! unregistered tag plus an issue report. The variants below are contract
//! violations (positions, buffers, spans) or reader failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid span: begin {begin} is greater than end {end}")]
    InvalidSpan { begin: usize, end: usize },

    #[error("position {pos} has been discarded")]
    DiscardedPosition { pos: usize },

    #[error("cannot set minimum required buffer begin to already discarded position {pos}")]
    AlreadyDiscarded { pos: usize },

    #[error("fixed buffer of capacity {capacity} cannot hold the {required} characters required")]
    BufferOverflow { capacity: usize, required: usize },

    #[error("position {pos} is out of bounds (length {len})")]
    IndexOutOfBounds { pos: usize, len: usize },

    #[error("atom table has no identifiers left")]
    AtomTableFull,

    #[error("length of the streamed text is not known until the end of the stream is reached")]
    LengthUnknown,

    #[error("reader failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Error::IndexOutOfBounds { .. })
    }

    pub fn is_buffer_overflow(&self) -> bool {
        matches!(self, Error::BufferOverflow { .. })
    }
}

/// Convert "ran off the end of the text" into `None`.
///
/// Scanning and construction treat the end of the document as "not found";
/// every other error still propagates.
pub(crate) fn until_end<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_out_of_bounds() => Ok(None),
        Err(err) => Err(err),
    }
}
