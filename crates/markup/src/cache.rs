//! Position → tag cache.
//!
//! A [`PositionCache`] is one default [`SubCache`] covering every tag type
//! plus one sub-cache per separately cached type. Each sub-cache is a sorted
//! vector of entries; an entry records either a tag or an explicit "no tag
//! begins here". Between consecutive entries lies a gap; a gap flagged as
//! scanned is known to contain no tag start relevant to that sub-cache, so
//! lookups there answer [`CacheLookup::NoTag`] without matching and searches
//! jump straight over it.
//!
//! Invariants:
//! - entries are strictly increasing by position;
//! - inserting into a scanned gap keeps both halves scanned;
//! - no cached tag is longer than the sub-cache's `longest` span;
//! - links exist only after [`PositionCache::bulk_load`] and are dropped by
//!   [`PositionCache::clear`].

use crate::tag::{Tag, TagTypeId};
use crate::tag_type::TagTypeTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLookup {
    /// Nothing cached for this position.
    Unknown,
    /// Known not to start a tag.
    NoTag,
    Tag(Tag),
}

/// Registered neighbours wired by a bulk load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Links {
    pub previous: Option<Tag>,
    pub next: Option<Tag>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CacheEntry {
    pub(crate) pos: usize,
    pub(crate) tag: Option<Tag>,
    pub(crate) gap_before_scanned: bool,
    pub(crate) links: Option<Links>,
}

#[derive(Clone, Debug, Default)]
pub struct SubCache {
    filter: Option<TagTypeId>,
    entries: Vec<CacheEntry>,
    tail_gap_scanned: bool,
    longest: usize,
}

impl SubCache {
    fn new(filter: Option<TagTypeId>) -> Self {
        Self {
            filter,
            entries: Vec::new(),
            tail_gap_scanned: false,
            longest: 0,
        }
    }

    /// Type this sub-cache is restricted to; `None` for the default one.
    pub fn filter(&self) -> Option<TagTypeId> {
        self.filter
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached tags in position order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.iter().filter_map(|e| e.tag)
    }

    /// `Ok(idx)` for an entry at `pos`, `Err(idx)` for the gap before entry
    /// `idx` (`idx == len()` is the tail gap).
    pub(crate) fn search(&self, pos: usize) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&pos, |e| e.pos)
    }

    pub(crate) fn entry(&self, idx: usize) -> Option<&CacheEntry> {
        self.entries.get(idx)
    }

    pub fn lookup(&self, pos: usize) -> CacheLookup {
        match self.search(pos) {
            Ok(idx) => match self.entries[idx].tag {
                Some(tag) => CacheLookup::Tag(tag),
                None => CacheLookup::NoTag,
            },
            Err(gap) if self.gap_scanned(gap) => CacheLookup::NoTag,
            Err(_) => CacheLookup::Unknown,
        }
    }

    pub(crate) fn gap_scanned(&self, gap: usize) -> bool {
        match self.entries.get(gap) {
            Some(entry) => entry.gap_before_scanned,
            None => self.tail_gap_scanned,
        }
    }

    /// First position inside gap `gap`.
    pub(crate) fn gap_start(&self, gap: usize) -> usize {
        match gap.checked_sub(1).and_then(|prev| self.entries.get(prev)) {
            Some(prev) => prev.pos + 1,
            None => 0,
        }
    }

    /// Position of the entry closing gap `gap`; `None` for the tail gap.
    pub(crate) fn gap_end(&self, gap: usize) -> Option<usize> {
        self.entries.get(gap).map(|e| e.pos)
    }

    pub(crate) fn mark_gap_scanned(&mut self, gap: usize) {
        match self.entries.get_mut(gap) {
            Some(entry) => entry.gap_before_scanned = true,
            None => self.tail_gap_scanned = true,
        }
    }

    /// Record `tag` (or its absence) at `pos`; returns the entry index.
    pub(crate) fn insert(&mut self, pos: usize, tag: Option<Tag>) -> usize {
        if let Some(tag) = tag {
            self.longest = self.longest.max(tag.span.len());
        }
        match self.search(pos) {
            Ok(idx) => {
                self.entries[idx].tag = tag;
                idx
            }
            Err(gap) => {
                let scanned = self.gap_scanned(gap);
                self.entries.insert(
                    gap,
                    CacheEntry {
                        pos,
                        tag,
                        gap_before_scanned: scanned,
                        links: None,
                    },
                );
                gap
            }
        }
    }

    /// Some cached tag accepted by `accept` has `pos` strictly inside it.
    ///
    /// Only entries beginning less than the longest cached span before `pos`
    /// are examined; no other tag can reach it.
    pub(crate) fn encloses(&self, pos: usize, accept: impl Fn(&Tag) -> bool) -> bool {
        let index = |pos| match self.search(pos) {
            Ok(idx) | Err(idx) => idx,
        };
        let first = index(pos.saturating_sub(self.longest));
        self.entries[first..index(pos)]
            .iter()
            .filter_map(|e| e.tag)
            .any(|tag| tag.span.strictly_contains(pos) && accept(&tag))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.tail_gap_scanned = false;
        self.longest = 0;
    }

    fn load(&mut self, tags: impl Iterator<Item = Tag>) {
        self.entries.clear();
        self.entries.extend(tags.map(|tag| CacheEntry {
            pos: tag.begin(),
            tag: Some(tag),
            gap_before_scanned: true,
            links: None,
        }));
        self.tail_gap_scanned = true;
        self.longest = self
            .entries
            .iter()
            .filter_map(|e| e.tag)
            .map(|tag| tag.span.len())
            .max()
            .unwrap_or(0);
    }
}

#[derive(Clone, Debug)]
pub struct PositionCache {
    default: SubCache,
    by_type: Vec<SubCache>,
    bulk_loaded: bool,
}

impl PositionCache {
    pub fn new(table: &TagTypeTable) -> Self {
        Self {
            default: SubCache::new(None),
            by_type: table
                .separately_cached()
                .iter()
                .map(|&id| SubCache::new(Some(id)))
                .collect(),
            bulk_loaded: false,
        }
    }

    pub fn lookup(&self, pos: usize) -> CacheLookup {
        self.default.lookup(pos)
    }

    /// Record the result of matching at `pos` in the default sub-cache and,
    /// for separately cached types, in that type's sub-cache too.
    pub fn add(&mut self, pos: usize, tag: Option<Tag>) {
        self.default.insert(pos, tag);
        if let Some(tag) = tag
            && let Some(sub) = self.sub_cache_mut(tag.type_id)
        {
            sub.insert(pos, Some(tag));
        }
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(target: "markup.cache", "add {pos}: {tag:?}");
    }

    /// Replace the whole cache with the complete ordered result of a
    /// sequential pass: every gap becomes scanned and registered tags are
    /// linked to their registered neighbours.
    ///
    /// `tags` must be sorted by `begin` and contain every tag the pass found,
    /// unregistered ones included.
    pub fn bulk_load(&mut self, tags: &[Tag]) {
        debug_assert!(
            tags.windows(2).all(|w| w[0].begin() < w[1].begin()),
            "bulk load requires strictly increasing tag positions"
        );
        self.default.load(tags.iter().copied());
        for sub in &mut self.by_type {
            let filter = sub.filter;
            sub.load(tags.iter().copied().filter(|t| Some(t.type_id) == filter));
        }

        let mut previous: Option<usize> = None;
        for idx in 0..self.default.entries.len() {
            let Some(tag) = self.default.entries[idx].tag else {
                continue;
            };
            if tag.is_unregistered() {
                continue;
            }
            let prev_tag = previous.and_then(|p| self.default.entries[p].tag);
            self.default.entries[idx].links = Some(Links {
                previous: prev_tag,
                next: None,
            });
            if let Some(p) = previous
                && let Some(links) = self.default.entries[p].links.as_mut()
            {
                links.next = Some(tag);
            }
            previous = Some(idx);
        }
        self.bulk_loaded = true;
        log::debug!(
            target: "markup.cache",
            "bulk loaded {} tags into {} sub-caches",
            tags.len(),
            1 + self.by_type.len()
        );
    }

    pub fn clear(&mut self) {
        self.default.clear();
        for sub in &mut self.by_type {
            sub.clear();
        }
        self.bulk_loaded = false;
    }

    pub fn is_bulk_loaded(&self) -> bool {
        self.bulk_loaded
    }

    /// Registered neighbours of the tag beginning at `pos`, if bulk loaded.
    pub fn links(&self, pos: usize) -> Option<Links> {
        let idx = self.default.search(pos).ok()?;
        self.default.entries[idx].links
    }

    pub fn default_sub_cache(&self) -> &SubCache {
        &self.default
    }

    pub(crate) fn default_sub_cache_mut(&mut self) -> &mut SubCache {
        &mut self.default
    }

    pub fn sub_cache(&self, id: TagTypeId) -> Option<&SubCache> {
        self.by_type.iter().find(|s| s.filter == Some(id))
    }

    pub(crate) fn sub_cache_mut(&mut self, id: TagTypeId) -> Option<&mut SubCache> {
        self.by_type.iter_mut().find(|s| s.filter == Some(id))
    }

    /// On-demand position check: `pos` lies strictly inside some cached
    /// registered, non-server tag that hides its content.
    ///
    /// Every tag type lands in the default sub-cache, so it alone is
    /// consulted. Nothing is matched here.
    pub fn masks_position(&self, pos: usize, table: &TagTypeTable) -> bool {
        self.default.encloses(pos, |tag| {
            !tag.is_unregistered()
                && !table.is_server_tag(tag.type_id)
                && table.masks_enclosed(tag.type_id)
        })
    }

    /// Entries across all sub-caches.
    pub fn len(&self) -> usize {
        self.default.len() + self.by_type.iter().map(SubCache::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomId;
    use crate::span::Span;
    use crate::tag::TagRole;
    use crate::tag_type::ids;

    fn tag(begin: usize, end: usize, type_id: TagTypeId) -> Tag {
        Tag {
            span: Span::new(begin, end).unwrap(),
            name_span: Span::new(begin, begin + 1).unwrap(),
            type_id,
            name: AtomId(0),
            role: TagRole::Start,
        }
    }

    #[test]
    fn three_state_lookup() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        let p = tag(4, 7, ids::NORMAL_START);
        assert_eq!(cache.lookup(4), CacheLookup::Unknown);
        cache.add(4, Some(p));
        cache.add(9, None);
        assert_eq!(cache.lookup(4), CacheLookup::Tag(p));
        assert_eq!(cache.lookup(9), CacheLookup::NoTag);
        assert_eq!(cache.lookup(5), CacheLookup::Unknown);
    }

    #[test]
    fn separately_cached_types_land_in_both_sub_caches() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        let comment = tag(0, 10, ids::COMMENT);
        cache.add(0, Some(comment));
        cache.add(12, Some(tag(12, 15, ids::NORMAL_START)));
        assert_eq!(cache.default_sub_cache().len(), 2);
        assert_eq!(cache.sub_cache(ids::COMMENT).unwrap().len(), 1);
        assert_eq!(cache.sub_cache(ids::CDATA_SECTION).unwrap().len(), 0);
        assert!(cache.sub_cache(ids::NORMAL_START).is_none());
    }

    #[test]
    fn inserting_into_scanned_gap_keeps_it_scanned() {
        let mut sub = SubCache::new(None);
        sub.insert(10, None);
        sub.mark_gap_scanned(0);
        assert_eq!(sub.lookup(3), CacheLookup::NoTag);
        sub.insert(5, None);
        assert_eq!(sub.lookup(3), CacheLookup::NoTag);
        assert_eq!(sub.lookup(7), CacheLookup::NoTag);
        assert_eq!(sub.lookup(11), CacheLookup::Unknown);
        assert_eq!(sub.gap_start(1), 6);
        assert_eq!(sub.gap_end(1), Some(10));
        assert_eq!(sub.gap_end(2), None);
    }

    #[test]
    fn bulk_load_links_registered_neighbours() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        let a = tag(0, 3, ids::NORMAL_START);
        let junk = tag(3, 8, TagTypeId::UNREGISTERED_START);
        let b = tag(8, 12, ids::NORMAL_END);
        cache.bulk_load(&[a, junk, b]);
        assert!(cache.is_bulk_loaded());
        assert_eq!(
            cache.links(0),
            Some(Links {
                previous: None,
                next: Some(b)
            })
        );
        assert_eq!(cache.links(3), None);
        assert_eq!(
            cache.links(8),
            Some(Links {
                previous: Some(a),
                next: None
            })
        );
        assert_eq!(cache.lookup(5), CacheLookup::NoTag);
        assert_eq!(cache.lookup(100), CacheLookup::NoTag);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.lookup(0), CacheLookup::Unknown);
        assert!(!cache.is_bulk_loaded());
    }

    #[test]
    fn masking_uses_only_cached_tags() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        assert!(!cache.masks_position(5, &table));
        cache.add(0, Some(tag(0, 10, ids::NORMAL_START)));
        assert!(cache.masks_position(5, &table));
        assert!(!cache.masks_position(0, &table));
        assert!(!cache.masks_position(10, &table));

        // Server tags and non-masking types never hide positions.
        let mut cache = PositionCache::new(&table);
        cache.add(0, Some(tag(0, 10, ids::SERVER_COMMON)));
        cache.add(20, Some(tag(20, 40, ids::DOCTYPE)));
        assert!(!cache.masks_position(5, &table));
        assert!(!cache.masks_position(25, &table));
    }

    #[test]
    fn masking_looks_past_nearer_entries() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        cache.add(0, Some(tag(0, 30, ids::COMMENT)));
        cache.add(5, None);
        cache.add(8, Some(tag(8, 9, ids::SERVER_COMMON)));
        assert!(cache.masks_position(12, &table));
    }

    #[test]
    fn masking_finds_an_outer_tag_cached_after_an_inner_one() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        cache.add(8, Some(tag(8, 11, ids::NORMAL_START)));
        cache.add(0, Some(tag(0, 19, ids::NORMAL_START)));
        assert!(cache.masks_position(14, &table));
        assert!(!cache.masks_position(19, &table));
    }

    #[test]
    fn masking_ignores_tags_that_end_before_the_position() {
        let table = TagTypeTable::default();
        let mut cache = PositionCache::new(&table);
        cache.add(0, Some(tag(0, 50, ids::COMMENT)));
        cache.add(60, Some(tag(60, 63, ids::NORMAL_START)));
        assert!(!cache.masks_position(70, &table));
        assert!(cache.masks_position(61, &table));
        assert!(cache.masks_position(49, &table));
    }
}
