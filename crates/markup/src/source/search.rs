//! Forward and backward tag searches over the position cache.
//!
//! Searches walk a sub-cache in position order. Cached entries answer
//! directly, scanned gaps are jumped over and unscanned gaps are searched
//! for the next candidate delimiter, which is then resolved through
//! [`Source::tag_at`]. A gap walked from its near edge is marked scanned
//! once the walk has passed through it.

use super::Source;
use crate::atom::AtomTable;
use crate::error::Result;
use crate::tag::{Tag, TagTypeId};
use crate::text::ParseText;

impl Source {
    /// First tag beginning at or after `pos`.
    ///
    /// Without a type filter unregistered tags are skipped. With a filter
    /// only tags of that type are returned, which for the reserved
    /// unregistered types means the degraded tags themselves.
    pub fn find_next_tag(&mut self, pos: usize, tag_type: Option<TagTypeId>) -> Result<Option<Tag>> {
        match tag_type {
            None => self.next_in_default(pos, |tag, _| !tag.is_unregistered()),
            Some(id) => self.next_of_type(pos, id),
        }
    }

    /// Last tag beginning at or before `pos`; filtering as for
    /// [`Source::find_next_tag`].
    pub fn find_previous_tag(
        &mut self,
        pos: usize,
        tag_type: Option<TagTypeId>,
    ) -> Result<Option<Tag>> {
        match tag_type {
            None => self.previous_in_default(pos, |tag, _| !tag.is_unregistered()),
            Some(id) => self.previous_of_type(pos, id),
        }
    }

    /// First tag named `name` (case-insensitive) beginning at or after
    /// `pos`, unregistered tags included.
    pub fn find_next_named_tag(&mut self, pos: usize, name: &str) -> Result<Option<Tag>> {
        let name = name.to_ascii_lowercase();
        self.next_in_default(pos, |tag, atoms| atoms.get(&name) == Some(tag.name))
    }

    pub fn find_previous_named_tag(&mut self, pos: usize, name: &str) -> Result<Option<Tag>> {
        let name = name.to_ascii_lowercase();
        self.previous_in_default(pos, |tag, atoms| atoms.get(&name) == Some(tag.name))
    }

    /// Next registered tag after `tag`, through the neighbour links when a
    /// full pass has run.
    pub fn next_tag_after(&mut self, tag: &Tag) -> Result<Option<Tag>> {
        if let Some(links) = self.cache.links(tag.begin()) {
            return Ok(links.next);
        }
        self.find_next_tag(tag.begin() + 1, None)
    }

    pub fn previous_tag_before(&mut self, tag: &Tag) -> Result<Option<Tag>> {
        if let Some(links) = self.cache.links(tag.begin()) {
            return Ok(links.previous);
        }
        match tag.begin().checked_sub(1) {
            Some(pos) => self.find_previous_tag(pos, None),
            None => Ok(None),
        }
    }

    fn next_of_type(&mut self, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
        let Some(tag_type) = self.table.get(id) else {
            return Ok(None);
        };
        let delimiter = tag_type.start_delimiter.as_bytes();
        if tag_type.separately_cached {
            return self.next_in_type_cache(pos, id, delimiter);
        }
        let mut from = pos;
        while let Some(at) = self.parse_text.find_seq(delimiter, from, None)? {
            if let Some(tag) = self.tag_at(at)?
                && tag.type_id == id
            {
                return Ok(Some(tag));
            }
            from = at + 1;
        }
        Ok(None)
    }

    fn previous_of_type(&mut self, pos: usize, id: TagTypeId) -> Result<Option<Tag>> {
        let Some(tag_type) = self.table.get(id) else {
            return Ok(None);
        };
        let delimiter = tag_type.start_delimiter.as_bytes();
        if tag_type.separately_cached {
            return self.previous_in_type_cache(pos, id, delimiter);
        }
        let mut from = pos;
        while let Some(at) = self.parse_text.rfind_seq(delimiter, from, 0)? {
            if let Some(tag) = self.tag_at(at)?
                && tag.type_id == id
            {
                return Ok(Some(tag));
            }
            match at.checked_sub(1) {
                Some(prev) => from = prev,
                None => break,
            }
        }
        Ok(None)
    }

    fn next_in_default(
        &mut self,
        pos: usize,
        accept: impl Fn(&Tag, &AtomTable) -> bool,
    ) -> Result<Option<Tag>> {
        let mut pos = pos;
        loop {
            let sub = self.cache.default_sub_cache();
            let gap = match sub.search(pos) {
                Ok(idx) => {
                    let Some(entry) = sub.entry(idx).copied() else {
                        return Ok(None);
                    };
                    if let Some(tag) = entry.tag
                        && accept(&tag, &self.atoms)
                    {
                        return Ok(Some(tag));
                    }
                    pos = entry.pos + 1;
                    continue;
                }
                Err(gap) => gap,
            };
            let gap_end = sub.gap_end(gap);
            if sub.gap_scanned(gap) {
                match gap_end {
                    Some(end) => pos = end,
                    None => return Ok(None),
                }
                continue;
            }
            let contiguous = pos == sub.gap_start(gap);

            match self.parse_text.find_byte(b'<', pos, gap_end)? {
                Some(lt) => {
                    let found = self.tag_at(lt)?;
                    if contiguous {
                        self.cache.default_sub_cache_mut().mark_gap_scanned(gap);
                    }
                    if let Some(tag) = found
                        && accept(&tag, &self.atoms)
                    {
                        return Ok(Some(tag));
                    }
                    pos = lt + 1;
                }
                None => {
                    if contiguous {
                        self.cache.default_sub_cache_mut().mark_gap_scanned(gap);
                    }
                    match gap_end {
                        Some(end) => pos = end,
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    fn previous_in_default(
        &mut self,
        pos: usize,
        accept: impl Fn(&Tag, &AtomTable) -> bool,
    ) -> Result<Option<Tag>> {
        let len = self.parse_text.len();
        let Some(last) = len.checked_sub(1) else {
            return Ok(None);
        };
        let mut pos = pos.min(last);
        loop {
            let sub = self.cache.default_sub_cache();
            let gap = match sub.search(pos) {
                Ok(idx) => {
                    let Some(entry) = sub.entry(idx).copied() else {
                        return Ok(None);
                    };
                    if let Some(tag) = entry.tag
                        && accept(&tag, &self.atoms)
                    {
                        return Ok(Some(tag));
                    }
                    match entry.pos.checked_sub(1) {
                        Some(prev) => pos = prev,
                        None => return Ok(None),
                    }
                    continue;
                }
                Err(gap) => gap,
            };
            let gap_start = sub.gap_start(gap);
            if sub.gap_scanned(gap) {
                match gap_start.checked_sub(1) {
                    Some(prev) => pos = prev,
                    None => return Ok(None),
                }
                continue;
            }
            let contiguous = pos + 1 == sub.gap_end(gap).unwrap_or(len);

            match self.parse_text.rfind_byte(b'<', pos, gap_start)? {
                Some(lt) => {
                    let found = self.tag_at(lt)?;
                    if contiguous {
                        // The new entry at `lt` split the gap; mark its upper half.
                        self.cache.default_sub_cache_mut().mark_gap_scanned(gap + 1);
                    }
                    if let Some(tag) = found
                        && accept(&tag, &self.atoms)
                    {
                        return Ok(Some(tag));
                    }
                    match lt.checked_sub(1) {
                        Some(prev) => pos = prev,
                        None => return Ok(None),
                    }
                }
                None => {
                    if contiguous {
                        self.cache.default_sub_cache_mut().mark_gap_scanned(gap);
                    }
                    match gap_start.checked_sub(1) {
                        Some(prev) => pos = prev,
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    fn next_in_type_cache(
        &mut self,
        pos: usize,
        id: TagTypeId,
        delimiter: &[u8],
    ) -> Result<Option<Tag>> {
        let mut pos = pos;
        loop {
            let Some(sub) = self.cache.sub_cache(id) else {
                return Ok(None);
            };
            let gap = match sub.search(pos) {
                Ok(idx) => {
                    let Some(entry) = sub.entry(idx).copied() else {
                        return Ok(None);
                    };
                    if entry.tag.is_some() {
                        return Ok(entry.tag);
                    }
                    pos = entry.pos + 1;
                    continue;
                }
                Err(gap) => gap,
            };
            let gap_end = sub.gap_end(gap);
            if sub.gap_scanned(gap) {
                match gap_end {
                    Some(end) => pos = end,
                    None => return Ok(None),
                }
                continue;
            }
            let contiguous = pos == sub.gap_start(gap);

            match self.parse_text.find_seq(delimiter, pos, gap_end)? {
                Some(at) => {
                    let found = self.tag_at(at)?.filter(|tag| tag.type_id == id);
                    if let Some(sub) = self.cache.sub_cache_mut(id) {
                        let idx = sub.insert(at, found);
                        if contiguous {
                            sub.mark_gap_scanned(idx);
                        }
                    }
                    if found.is_some() {
                        return Ok(found);
                    }
                    pos = at + 1;
                }
                None => {
                    if contiguous && let Some(sub) = self.cache.sub_cache_mut(id) {
                        sub.mark_gap_scanned(gap);
                    }
                    match gap_end {
                        Some(end) => pos = end,
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    fn previous_in_type_cache(
        &mut self,
        pos: usize,
        id: TagTypeId,
        delimiter: &[u8],
    ) -> Result<Option<Tag>> {
        let len = self.parse_text.len();
        let Some(last) = len.checked_sub(1) else {
            return Ok(None);
        };
        let mut pos = pos.min(last);
        loop {
            let Some(sub) = self.cache.sub_cache(id) else {
                return Ok(None);
            };
            let gap = match sub.search(pos) {
                Ok(idx) => {
                    let Some(entry) = sub.entry(idx).copied() else {
                        return Ok(None);
                    };
                    if entry.tag.is_some() {
                        return Ok(entry.tag);
                    }
                    match entry.pos.checked_sub(1) {
                        Some(prev) => pos = prev,
                        None => return Ok(None),
                    }
                    continue;
                }
                Err(gap) => gap,
            };
            let gap_start = sub.gap_start(gap);
            if sub.gap_scanned(gap) {
                match gap_start.checked_sub(1) {
                    Some(prev) => pos = prev,
                    None => return Ok(None),
                }
                continue;
            }
            let contiguous = pos + 1 == sub.gap_end(gap).unwrap_or(len);

            match self.parse_text.rfind_seq(delimiter, pos, gap_start)? {
                Some(at) => {
                    let found = self.tag_at(at)?.filter(|tag| tag.type_id == id);
                    if let Some(sub) = self.cache.sub_cache_mut(id) {
                        let idx = sub.insert(at, found);
                        if contiguous {
                            sub.mark_gap_scanned(idx + 1);
                        }
                    }
                    if found.is_some() {
                        return Ok(found);
                    }
                    match at.checked_sub(1) {
                        Some(prev) => pos = prev,
                        None => return Ok(None),
                    }
                }
                None => {
                    if contiguous && let Some(sub) = self.cache.sub_cache_mut(id) {
                        sub.mark_gap_scanned(gap);
                    }
                    match gap_start.checked_sub(1) {
                        Some(prev) => pos = prev,
                        None => return Ok(None),
                    }
                }
            }
        }
    }
}
