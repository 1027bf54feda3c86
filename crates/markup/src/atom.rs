//! Interned, ASCII-folded tag names.

use std::collections::HashMap;

/// Interned name identifier. Two tags of the same document have equal
/// `AtomId`s exactly when their folded names are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

/// Per-document name table.
///
/// Invariant: ASCII letters are stored lowercase; non-ASCII bytes are kept
/// as-is.
#[derive(Debug, Default)]
pub struct AtomTable {
    names: Vec<Box<str>>,
    map: HashMap<Box<str>, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Result<AtomId, AtomError> {
        if let Some(id) = self.get(name) {
            return Ok(id);
        }
        let folded: Box<str> = name.to_ascii_lowercase().into_boxed_str();
        let id = AtomId(
            self.names
                .len()
                .try_into()
                .map_err(|_| AtomError::OutOfIds)?,
        );
        self.names.push(folded.clone());
        self.map.insert(folded, id);
        Ok(id)
    }

    /// Intern raw name bytes taken from the document.
    ///
    /// Invalid UTF-8 is replaced (U+FFFD) so any byte run has a name.
    pub fn intern_bytes(&mut self, name: &[u8]) -> Result<AtomId, AtomError> {
        match std::str::from_utf8(name) {
            Ok(s) => self.intern(s),
            Err(_) => self.intern(&String::from_utf8_lossy(name)),
        }
    }

    /// Look a name up without interning it.
    pub fn get(&self, name: &str) -> Option<AtomId> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            return self.map.get(name.to_ascii_lowercase().as_str()).copied();
        }
        self.map.get(name).copied()
    }

    pub fn resolve(&self, id: AtomId) -> Option<&str> {
        self.names.get(id.0 as usize).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomError {
    OutOfIds,
}
