//! The sorted element set.

use crate::error::{CoreError, CoreResult};
use crate::order::KeyOrder;
use std::cmp::Ordering;

/// Shape of a collection element.
///
/// An element is `element_size` bytes; its first `key_size` bytes are the
/// element key that orders and deduplicates the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementLayout {
    element_size: usize,
    key_size: usize,
    order: KeyOrder,
}

impl ElementLayout {
    /// Creates a layout ordered by [`KeyOrder::Natural`].
    ///
    /// # Errors
    ///
    /// Fails when `key_size` is zero or larger than `element_size`, or the
    /// element does not fit the two-byte width field of the blob header.
    pub fn new(element_size: usize, key_size: usize) -> CoreResult<Self> {
        if key_size == 0 || key_size > element_size {
            return Err(CoreError::invalid_config(format!(
                "element key of {key_size} bytes does not fit an element of {element_size} bytes"
            )));
        }
        if element_size > usize::from(u16::MAX) {
            return Err(CoreError::invalid_config(format!(
                "element size {element_size} exceeds {}",
                u16::MAX
            )));
        }
        Ok(Self {
            element_size,
            key_size,
            order: KeyOrder::Natural,
        })
    }

    /// Sets the order used to compare element keys.
    #[must_use]
    pub const fn with_order(mut self, order: KeyOrder) -> Self {
        self.order = order;
        self
    }

    /// Returns the element width in bytes.
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.element_size
    }

    /// Returns the element key width in bytes.
    #[must_use]
    pub const fn key_size(&self) -> usize {
        self.key_size
    }

    /// Returns the element key order.
    #[must_use]
    pub const fn order(&self) -> KeyOrder {
        self.order
    }

    /// Returns the element key of `element`.
    #[must_use]
    pub fn key_of<'a>(&self, element: &'a [u8]) -> &'a [u8] {
        &element[..self.key_size.min(element.len())]
    }
}

/// A set of fixed-width elements, sorted and unique by element key.
///
/// Elements are stored back to back in one buffer, which is also the body
/// of the exported blob.
///
/// # Example
///
/// ```rust
/// use partidx_core::{Collection, ElementLayout};
///
/// let layout = ElementLayout::new(4, 2).unwrap();
/// let mut refs = Collection::new(layout);
/// refs.insert(b"bb01").unwrap();
/// refs.insert(b"aa01").unwrap();
/// refs.insert(b"bb02").unwrap(); // replaces "bb01"
///
/// let all: Vec<&[u8]> = refs.iter().collect();
/// assert_eq!(all, vec![&b"aa01"[..], &b"bb02"[..]]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    layout: ElementLayout,
    data: Vec<u8>,
}

impl Collection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(layout: ElementLayout) -> Self {
        Self {
            layout,
            data: Vec::new(),
        }
    }

    /// Creates an empty collection with room for `elements` elements.
    #[must_use]
    pub fn with_capacity(layout: ElementLayout, elements: usize) -> Self {
        Self {
            layout,
            data: Vec::with_capacity(elements * layout.element_size),
        }
    }

    /// Builds a collection from elements in any order.
    ///
    /// Later elements replace earlier ones with the same element key.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidElement`] on a wrongly sized element.
    pub fn from_elements<I, E>(layout: ElementLayout, elements: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = E>,
        E: AsRef<[u8]>,
    {
        let mut collection = Self::new(layout);
        for element in elements {
            collection.insert(element.as_ref())?;
        }
        Ok(collection)
    }

    /// Returns the element layout.
    #[must_use]
    pub const fn layout(&self) -> &ElementLayout {
        &self.layout
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.layout.element_size
    }

    /// Returns true if the collection holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the raw element bytes, in order.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterates over elements in element key order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.data.chunks_exact(self.layout.element_size)
    }

    /// Iterates over element keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.iter().map(|e| self.layout.key_of(e))
    }

    /// Inserts an element, returning the element it replaced.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidElement`] on a wrongly sized element.
    pub fn insert(&mut self, element: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let size = self.layout.element_size;
        if element.len() != size {
            return Err(CoreError::InvalidElement {
                expected: size,
                actual: element.len(),
            });
        }

        match self.search(self.layout.key_of(element)) {
            Ok(i) => {
                let slot = &mut self.data[i * size..(i + 1) * size];
                let old = slot.to_vec();
                slot.copy_from_slice(element);
                Ok(Some(old))
            }
            Err(i) => {
                let at = i * size;
                self.data.splice(at..at, element.iter().copied());
                Ok(None)
            }
        }
    }

    /// Returns the element with the given element key.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let i = self.search(key).ok()?;
        Some(self.element(i))
    }

    /// Returns true if an element with this element key exists.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.search(key).is_ok()
    }

    /// Removes and returns the element with the given element key.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let size = self.layout.element_size;
        let i = self.search(key).ok()?;
        Some(self.data.drain(i * size..(i + 1) * size).collect())
    }

    /// Returns the union of `self` and `incoming`.
    ///
    /// On an element key present in both, the element from `incoming` is kept.
    #[must_use]
    pub fn merge(&self, incoming: &Collection) -> Collection {
        let order = self.layout.order;
        let mut merged = Collection::with_capacity(self.layout, self.len() + incoming.len());
        let mut ours = self.iter().peekable();
        let mut theirs = incoming.iter().peekable();

        loop {
            let next = match (ours.peek(), theirs.peek()) {
                (Some(a), Some(b)) => {
                    match order.compare(self.layout.key_of(a), self.layout.key_of(b)) {
                        Ordering::Less => ours.next(),
                        Ordering::Greater => theirs.next(),
                        Ordering::Equal => {
                            ours.next();
                            theirs.next()
                        }
                    }
                }
                (Some(_), None) => ours.next(),
                (None, Some(_)) => theirs.next(),
                (None, None) => break,
            };
            if let Some(element) = next {
                merged.data.extend_from_slice(element);
            }
        }
        merged
    }

    /// Moves every element matching `predicate` into a new collection.
    pub fn extract_if<F>(&mut self, mut predicate: F) -> Collection
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut kept = Vec::with_capacity(self.data.len());
        let mut extracted = Collection::new(self.layout);
        for element in self.data.chunks_exact(self.layout.element_size) {
            if predicate(element) {
                extracted.data.extend_from_slice(element);
            } else {
                kept.extend_from_slice(element);
            }
        }
        self.data = kept;
        extracted
    }

    /// Releases unused buffer capacity.
    pub fn trim(&mut self) {
        self.data.shrink_to_fit();
    }

    fn element(&self, i: usize) -> &[u8] {
        let size = self.layout.element_size;
        &self.data[i * size..(i + 1) * size]
    }

    fn search(&self, key: &[u8]) -> Result<usize, usize> {
        let order = self.layout.order;
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match order.compare(self.layout.key_of(self.element(mid)), key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn layout() -> ElementLayout {
        ElementLayout::new(6, 3).unwrap()
    }

    fn coll(elements: &[&[u8]]) -> Collection {
        Collection::from_elements(layout(), elements.iter()).unwrap()
    }

    #[test]
    fn layout_validation() {
        assert!(ElementLayout::new(10, 0).is_err());
        assert!(ElementLayout::new(10, 11).is_err());
        assert!(ElementLayout::new(70_000, 12).is_err());
        let l = ElementLayout::new(90, 10).unwrap().with_order(KeyOrder::Base64);
        assert_eq!(l.element_size(), 90);
        assert_eq!(l.key_size(), 10);
        assert_eq!(l.order(), KeyOrder::Base64);
    }

    #[test]
    fn insert_keeps_sorted_and_unique() {
        let mut c = coll(&[b"ccc001", b"aaa001", b"bbb001"]);
        assert_eq!(c.len(), 3);
        let replaced = c.insert(b"bbb002").unwrap();
        assert_eq!(replaced.as_deref(), Some(&b"bbb001"[..]));
        let keys: Vec<_> = c.keys().collect();
        assert_eq!(keys, vec![&b"aaa"[..], &b"bbb"[..], &b"ccc"[..]]);
        assert_eq!(c.get(b"bbb"), Some(&b"bbb002"[..]));
    }

    #[test]
    fn insert_rejects_wrong_width() {
        let mut c = Collection::new(layout());
        assert!(matches!(
            c.insert(b"short"),
            Err(CoreError::InvalidElement {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn remove_by_element_key() {
        let mut c = coll(&[b"aaa001", b"bbb001"]);
        assert_eq!(c.remove(b"aaa").as_deref(), Some(&b"aaa001"[..]));
        assert!(c.remove(b"aaa").is_none());
        assert!(c.remove(b"zz").is_none());
        assert_eq!(c.len(), 1);
        assert!(c.contains(b"bbb"));
    }

    #[test]
    fn merge_prefers_incoming() {
        let old = coll(&[b"aaa001", b"bbb001", b"ddd001"]);
        let delta = coll(&[b"bbb999", b"ccc001"]);
        let merged = old.merge(&delta);
        let all: Vec<_> = merged.iter().collect();
        assert_eq!(
            all,
            vec![&b"aaa001"[..], &b"bbb999"[..], &b"ccc001"[..], &b"ddd001"[..]]
        );
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let old = coll(&[b"aaa001", b"bbb001"]);
        assert_eq!(old.merge(&Collection::new(layout())), old);
        assert_eq!(Collection::new(layout()).merge(&old), old);
    }

    #[test]
    fn extract_if_splits() {
        let mut c = coll(&[b"aaa001", b"bbb002", b"ccc001", b"ddd002"]);
        let evens = c.extract_if(|e| e[5] == b'2');
        assert_eq!(c.len(), 2);
        assert_eq!(evens.len(), 2);
        assert!(evens.contains(b"bbb") && evens.contains(b"ddd"));
        assert!(c.contains(b"aaa") && c.contains(b"ccc"));
    }

    #[test]
    fn base64_element_order() {
        let l = ElementLayout::new(2, 1).unwrap().with_order(KeyOrder::Base64);
        let c = Collection::from_elements(l, [b"0x", b"ax", b"Ax"]).unwrap();
        let keys: Vec<_> = c.keys().collect();
        assert_eq!(keys, vec![&b"A"[..], &b"a"[..], &b"0"[..]]);
    }

    proptest! {
        #[test]
        fn merge_matches_map_union(
            a in prop::collection::vec((0u8..40, any::<u8>()), 0..60),
            b in prop::collection::vec((0u8..40, any::<u8>()), 0..60),
        ) {
            let l = ElementLayout::new(2, 1).unwrap();
            let ca = Collection::from_elements(l, a.iter().map(|(k, v)| [*k, *v])).unwrap();
            let cb = Collection::from_elements(l, b.iter().map(|(k, v)| [*k, *v])).unwrap();

            let mut expected: BTreeMap<u8, u8> = a.iter().copied().collect();
            expected.extend(b.iter().copied());

            let merged = ca.merge(&cb);
            let got: Vec<(u8, u8)> = merged.iter().map(|e| (e[0], e[1])).collect();
            prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
        }
    }
}
