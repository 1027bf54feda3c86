//! Character references (`&amp;`, `&#123;`, `&#x1F4A9;`).
//!
//! The streaming source hands `&` positions to a [`CharRefDecoder`]; the
//! decoder reads the unfolded bytes, since reference names are
//! case-sensitive.
//!
//! [`BasicCharRefDecoder`] covers a deliberately small set:
//! - named: `amp`, `lt`, `gt`, `quot`, `apos`, `nbsp`, `copy`, `reg`, `euro`;
//! - numeric, semicolon-terminated, at most 7 decimal or 6 hex digits;
//! - only valid Unicode scalar values.
//!
//! Anything else is not a reference and stays text.

use crate::error::{Result, until_end};
use crate::text::RawText;

const MAX_HEX_DIGITS: usize = 6;
const MAX_DEC_DIGITS: usize = 7;
const MAX_NAME_LEN: usize = 8;

const NAMED: [(&[u8], char); 9] = [
    (b"amp", '&'),
    (b"lt", '<'),
    (b"gt", '>'),
    (b"quot", '"'),
    (b"apos", '\''),
    (b"nbsp", '\u{00A0}'),
    (b"copy", '\u{00A9}'),
    (b"reg", '\u{00AE}'),
    (b"euro", '\u{20AC}'),
];

/// A decoded reference ending (exclusively) at `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharRef {
    pub ch: char,
    pub end: usize,
}

pub trait CharRefDecoder {
    /// Decode the reference starting at `pos`, which holds `&`.
    ///
    /// Returns `None` when the bytes there do not form a reference,
    /// including when the text ends first.
    fn decode_at(&self, text: &mut dyn RawText, pos: usize) -> Result<Option<CharRef>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BasicCharRefDecoder;

impl CharRefDecoder for BasicCharRefDecoder {
    fn decode_at(&self, text: &mut dyn RawText, pos: usize) -> Result<Option<CharRef>> {
        if byte(text, pos)? != Some(b'&') {
            return Ok(None);
        }
        match byte(text, pos + 1)? {
            Some(b'#') => match byte(text, pos + 2)? {
                Some(b'x' | b'X') => numeric(text, pos + 3, 16, MAX_HEX_DIGITS),
                Some(_) => numeric(text, pos + 2, 10, MAX_DEC_DIGITS),
                None => Ok(None),
            },
            Some(_) => named(text, pos + 1),
            None => Ok(None),
        }
    }
}

fn byte(text: &mut dyn RawText, pos: usize) -> Result<Option<u8>> {
    until_end(text.raw_byte_at(pos))
}

fn numeric(
    text: &mut dyn RawText,
    digits_start: usize,
    radix: u32,
    max_digits: usize,
) -> Result<Option<CharRef>> {
    let mut value: u32 = 0;
    let mut pos = digits_start;
    loop {
        let Some(b) = byte(text, pos)? else {
            return Ok(None);
        };
        if b == b';' {
            break;
        }
        if pos - digits_start == max_digits {
            return Ok(None);
        }
        let Some(digit) = char::from(b).to_digit(radix) else {
            return Ok(None);
        };
        value = value * radix + digit;
        pos += 1;
    }
    if pos == digits_start {
        return Ok(None);
    }
    Ok(char::from_u32(value).map(|ch| CharRef { ch, end: pos + 1 }))
}

fn named(text: &mut dyn RawText, name_start: usize) -> Result<Option<CharRef>> {
    let mut name = [0u8; MAX_NAME_LEN];
    let mut len = 0;
    loop {
        let Some(b) = byte(text, name_start + len)? else {
            return Ok(None);
        };
        if b == b';' {
            break;
        }
        if len == MAX_NAME_LEN || !b.is_ascii_alphanumeric() {
            return Ok(None);
        }
        name[len] = b;
        len += 1;
    }
    let found = NAMED
        .iter()
        .find(|(candidate, _)| *candidate == &name[..len])
        .map(|&(_, ch)| CharRef {
            ch,
            end: name_start + len + 1,
        });
    Ok(found)
}

/// Replace every reference `decoder` recognises in `s`; everything else is
/// copied unchanged.
pub fn decode_text(s: &str, decoder: &dyn CharRefDecoder) -> String {
    let mut bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut copy_start = 0;
    let mut i = 0;
    while let Some(rel) = memchr::memchr(b'&', &s.as_bytes()[i..]) {
        let amp = i + rel;
        // In-memory text never fails to read.
        match decoder.decode_at(&mut bytes, amp).ok().flatten() {
            Some(char_ref) => {
                out.push_str(&s[copy_start..amp]);
                out.push(char_ref.ch);
                copy_start = char_ref.end;
                i = char_ref.end;
            }
            None => i = amp + 1,
        }
    }
    out.push_str(&s[copy_start..]);
    out
}
