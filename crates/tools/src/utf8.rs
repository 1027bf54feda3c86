//! UTF-8 boundary helpers for byte-addressed text windows.
//!
//! Callers hold raw bytes that may end in the middle of a multi-byte
//! sequence (a sliding window over a stream, a bounded text chunk). These
//! helpers locate character boundaries without decoding the whole slice.

/// Length of the UTF-8 sequence introduced by `first`, or 0 when `first` is
/// not a valid lead byte.
pub fn utf8_seq_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// True for `10xxxxxx` bytes.
pub fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Largest cut point `<= bytes.len()` that does not split a complete-looking
/// multi-byte sequence at the end of `bytes`.
///
/// - Only the trailing (at most 3) bytes are inspected.
/// - Invalid lead bytes are treated as single-byte units so callers always
///   make progress on malformed input.
/// - Returns 0 only when the whole slice is an incomplete sequence prefix.
pub fn floor_char_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let lookback = len.min(3);
    for back in 1..=lookback {
        let idx = len - back;
        let b = bytes[idx];
        if is_continuation(b) {
            continue;
        }
        let seq = utf8_seq_len(b);
        if seq == 0 || idx + seq <= len {
            return len;
        }
        return idx;
    }
    len
}

/// Number of complete characters in `bytes`, counting each invalid byte as
/// one character (the U+FFFD replacement convention).
pub fn char_count_lossy(bytes: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        let seq = utf8_seq_len(bytes[i]);
        let step = if seq == 0 { 1 } else { seq };
        i = (i + step).min(bytes.len());
        count += 1;
    }
    count
}
