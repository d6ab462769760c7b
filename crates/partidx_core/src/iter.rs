//! Ordered, optionally wrapping iteration over key collections.

use crate::collection::Collection;
use crate::error::CoreResult;
use crate::heal::{Loaded, ReadMode};
use crate::index::{CollectionIndex, IndexState};
use std::cmp::Ordering;
use std::ops::Bound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// From `start` to `stop` or the end of the keyspace.
    Head,
    /// From the first key up to where the head began.
    Wrapped,
    Done,
}

/// Iterator returned by [`CollectionIndex::keycollections`].
///
/// Each step takes the index lock, finds the next key, and reads its
/// collection through the self-healing path. Keys whose collection turns
/// out to be unrecoverable are skipped; keys whose record is missing yield
/// an empty collection.
pub struct KeyCollections<'a> {
    index: &'a CollectionIndex,
    start: Option<Vec<u8>>,
    /// Exclusive end of the head phase.
    head_end: Option<Vec<u8>>,
    /// Exclusive end of the wrapped phase; `None` means no wrap.
    wrap_end: Option<Vec<u8>>,
    rotate: bool,
    cursor: Option<Vec<u8>>,
    phase: Phase,
    emitted: usize,
    limit: Option<usize>,
}

impl<'a> KeyCollections<'a> {
    pub(crate) fn new(
        index: &'a CollectionIndex,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        rotate: bool,
        size: usize,
    ) -> Self {
        let order = index.config().key_order;
        let stop_after_start = match (start, stop) {
            (Some(start), Some(stop)) => order.compare(stop, start) == Ordering::Greater,
            (None, Some(_)) => true,
            _ => false,
        };

        let head_end = stop.filter(|_| stop_after_start).map(<[u8]>::to_vec);
        // a stop at or before start ends the wrapped phase early
        let wrap_end = if rotate && !stop_after_start {
            start.map(|start| stop.unwrap_or(start).to_vec())
        } else {
            None
        };

        Self {
            index,
            start: start.map(<[u8]>::to_vec),
            head_end,
            wrap_end,
            rotate,
            cursor: None,
            phase: Phase::Head,
            emitted: 0,
            limit: rotate.then_some(size),
        }
    }

    /// Starts over from the configured start key.
    pub fn restart(&mut self) -> CoreResult<()> {
        self.cursor = None;
        self.phase = Phase::Head;
        self.emitted = 0;
        if self.rotate {
            self.limit = Some(self.index.size()?);
        }
        Ok(())
    }

    fn step(&mut self) -> CoreResult<Option<(Vec<u8>, Collection)>> {
        loop {
            if self.limit.is_some_and(|limit| self.emitted >= limit) {
                self.phase = Phase::Done;
            }
            let (lower, upper) = match self.phase {
                Phase::Done => return Ok(None),
                Phase::Head => (
                    match (&self.cursor, &self.start) {
                        (Some(cursor), _) => Bound::Excluded(cursor.clone()),
                        (None, Some(start)) => Bound::Included(start.clone()),
                        (None, None) => Bound::Unbounded,
                    },
                    self.head_end.clone(),
                ),
                Phase::Wrapped => (
                    self.cursor
                        .clone()
                        .map_or(Bound::Unbounded, Bound::Excluded),
                    self.wrap_end.clone(),
                ),
            };

            let found = self
                .index
                .with_state(|state| next_collection(state, lower, upper))?;
            match found {
                Some((key, collection)) => {
                    self.cursor = Some(key.clone());
                    if let Some(collection) = collection {
                        self.emitted += 1;
                        return Ok(Some((key, collection)));
                    }
                }
                None => {
                    self.cursor = None;
                    self.phase = match self.phase {
                        Phase::Head if self.wrap_end.is_some() => Phase::Wrapped,
                        _ => Phase::Done,
                    };
                }
            }
        }
    }
}

/// Reads the first key in `(lower, upper)`; the collection is `None` when
/// the key turned out to be unrecoverable.
fn next_collection(
    state: &mut IndexState,
    lower: Bound<Vec<u8>>,
    upper: Option<Vec<u8>>,
) -> CoreResult<Option<(Vec<u8>, Option<Collection>)>> {
    let upper = upper.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
    let lower = match &lower {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    };
    let Some(entry) = state.table.first_in_range(lower, upper)? else {
        return Ok(None);
    };

    state.stats.record_read();
    let key = entry.key.clone();
    let collection = match state.read_healing(entry, ReadMode::Keep)? {
        Loaded::Intact { collection, .. } => Some(collection),
        Loaded::Missing { .. } => Some(Collection::new(state.layout)),
        Loaded::Lost => None,
    };
    Ok(Some((key, collection)))
}

impl Iterator for KeyCollections<'_> {
    type Item = CoreResult<(Vec<u8>, Collection)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(item) => item.map(Ok),
            Err(err) => {
                self.phase = Phase::Done;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::collection::{Collection, ElementLayout};
    use crate::config::Config;
    use crate::index::CollectionIndex;

    fn index(keys: &[&[u8; 2]]) -> CollectionIndex {
        let layout = ElementLayout::new(2, 1).unwrap();
        let index = CollectionIndex::open_in_memory(Config::new(2, layout)).unwrap();
        let one = Collection::from_elements(layout, [b"x1"]).unwrap();
        for key in keys {
            index.put(&key[..], &one).unwrap();
        }
        index
    }

    fn walk(
        index: &CollectionIndex,
        start: Option<&str>,
        stop: Option<&str>,
        rotate: bool,
    ) -> Vec<String> {
        index
            .keycollections(start.map(str::as_bytes), stop.map(str::as_bytes), rotate)
            .unwrap()
            .map(|item| String::from_utf8(item.unwrap().0).unwrap())
            .collect()
    }

    #[test]
    fn plain_iteration_is_ordered() {
        let index = index(&[b"cc", b"aa", b"bb", b"dd"]);
        assert_eq!(walk(&index, None, None, false), ["aa", "bb", "cc", "dd"]);
        assert_eq!(walk(&index, Some("bb"), None, false), ["bb", "cc", "dd"]);
        assert_eq!(walk(&index, Some("ab"), Some("cc"), false), ["bb"]);
    }

    #[test]
    fn rotation_wraps_once() {
        let index = index(&[b"cc", b"aa", b"bb", b"dd"]);
        assert_eq!(walk(&index, Some("cc"), None, true), ["cc", "dd", "aa", "bb"]);
        assert_eq!(walk(&index, Some("cb"), None, true), ["cc", "dd", "aa", "bb"]);
        assert_eq!(walk(&index, Some("cc"), Some("bb"), true), ["cc", "dd", "aa"]);
        assert_eq!(walk(&index, Some("bb"), Some("dd"), true), ["bb", "cc"]);
        assert_eq!(walk(&index, Some("zz"), None, true), ["aa", "bb", "cc", "dd"]);
    }

    #[test]
    fn restart_begins_again() {
        let index = index(&[b"aa", b"bb"]);
        let mut iter = index.keycollections(Some(&b"bb"[..]), None, true).unwrap();
        assert_eq!(iter.by_ref().count(), 2);
        assert!(iter.next().is_none());
        iter.restart().unwrap();
        assert_eq!(iter.next().unwrap().unwrap().0, b"bb");
    }

    #[test]
    fn interleaved_removal_is_observed() {
        let index = index(&[b"aa", b"bb", b"cc"]);
        let mut iter = index.keycollections(None, None, false).unwrap();
        assert_eq!(iter.next().unwrap().unwrap().0, b"aa");
        index.delete(b"bb").unwrap();
        assert_eq!(iter.next().unwrap().unwrap().0, b"cc");
        assert!(iter.next().is_none());
    }
}
