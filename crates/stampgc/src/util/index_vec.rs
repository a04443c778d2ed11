//! IndexVec - a vector indexed by a typed key.
//!
//! Every stamp-indexed table in this crate (class descriptors, type tests,
//! scan descriptors, dispatch entries) is an [`IndexVec`] keyed by
//! [`StampId`](crate::StampId), so a table can never be indexed with an
//! offset, a slot number or any other unrelated integer.
//!
//! # Example
//!
//! ```
//! use stampgc::util::{Idx, IndexVec};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq)]
//! struct SlotId(u32);
//!
//! impl Idx for SlotId {
//!     fn from_usize(idx: usize) -> Self { SlotId(idx as u32) }
//!     fn index(self) -> usize { self.0 as usize }
//! }
//!
//! let mut slots: IndexVec<SlotId, &str> = IndexVec::new();
//! let id = slots.push("car");
//! assert_eq!(slots[id], "car");
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Types usable as an [`IndexVec`] key
pub trait Idx: Copy + Eq {
    /// Convert from a raw position
    fn from_usize(idx: usize) -> Self;

    /// Raw position for slice indexing
    fn index(self) -> usize;
}

impl Idx for usize {
    #[inline]
    fn from_usize(idx: usize) -> Self {
        idx
    }

    #[inline]
    fn index(self) -> usize {
        self
    }
}

/// A `Vec<T>` that only accepts `I` as an index
#[derive(Clone, PartialEq, Eq)]
pub struct IndexVec<I, T> {
    raw: Vec<T>,
    _marker: PhantomData<fn(&I)>,
}

impl<I, T> IndexVec<I, T> {
    /// Create an empty table
    #[inline]
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Create an empty table with room for `capacity` entries
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            _marker: PhantomData,
        }
    }

    /// Number of entries, including empty positions
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Slice view of the underlying storage
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.raw
    }
}

impl<I: Idx, T> IndexVec<I, T> {
    /// Append a value and return its typed index
    #[inline]
    pub fn push(&mut self, value: T) -> I {
        let index = self.raw.len();
        self.raw.push(value);
        I::from_usize(index)
    }

    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.raw.get(index.index())
    }

    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.raw.get_mut(index.index())
    }

    /// Iterate over `(index, value)` pairs in index order
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, value)| (I::from_usize(i), value))
    }

    /// Iterate over values in index order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.raw.iter()
    }

    /// Grow the table with `fill()` until `index` is a valid position
    pub fn ensure_contains_elem(&mut self, index: I, fill: impl FnMut() -> T) -> &mut T {
        let min_len = index.index() + 1;
        if self.raw.len() < min_len {
            self.raw.resize_with(min_len, fill);
        }
        &mut self.raw[index.index()]
    }
}

impl<I: Idx, T: Clone> IndexVec<I, T> {
    /// Create a table of `len` copies of `elem`
    pub fn from_elem_n(elem: T, len: usize) -> Self {
        Self {
            raw: vec![elem; len],
            _marker: PhantomData,
        }
    }
}

impl<I, T> Default for IndexVec<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T: fmt::Debug> fmt::Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}

impl<I: Idx, T> Index<I> for IndexVec<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: I) -> &T {
        &self.raw[index.index()]
    }
}

impl<I: Idx, T> IndexMut<I> for IndexVec<I, T> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut T {
        &mut self.raw[index.index()]
    }
}

impl<I, T> FromIterator<T> for IndexVec<I, T> {
    fn from_iter<It: IntoIterator<Item = T>>(iter: It) -> Self {
        Self {
            raw: iter.into_iter().collect(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct TestId(u32);

    impl Idx for TestId {
        fn from_usize(idx: usize) -> Self {
            TestId(idx as u32)
        }

        fn index(self) -> usize {
            self.0 as usize
        }
    }

    #[test]
    fn test_push_and_index() {
        let mut vec: IndexVec<TestId, i32> = IndexVec::new();
        let a = vec.push(10);
        let b = vec.push(20);

        assert_eq!(a, TestId(0));
        assert_eq!(b, TestId(1));
        assert_eq!(vec[a], 10);
        assert_eq!(vec[b], 20);
        assert_eq!(vec.len(), 2);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let vec: IndexVec<TestId, i32> = IndexVec::new();
        assert!(vec.get(TestId(3)).is_none());
        assert!(vec.is_empty());
    }

    #[test]
    fn test_ensure_contains_elem_fills_gaps() {
        let mut vec: IndexVec<TestId, Option<&str>> = IndexVec::new();
        *vec.ensure_contains_elem(TestId(3), || None) = Some("three");

        assert_eq!(vec.len(), 4);
        assert_eq!(vec[TestId(0)], None);
        assert_eq!(vec[TestId(3)], Some("three"));
    }

    #[test]
    fn test_iter_enumerated_order() {
        let vec: IndexVec<TestId, char> = ['a', 'b', 'c'].into_iter().collect();
        let pairs: Vec<_> = vec.iter_enumerated().map(|(i, c)| (i.0, *c)).collect();
        assert_eq!(pairs, vec![(0, 'a'), (1, 'b'), (2, 'c')]);
    }

    #[test]
    fn test_from_elem_n() {
        let vec: IndexVec<TestId, u8> = IndexVec::from_elem_n(7, 5);
        assert_eq!(vec.as_slice(), &[7, 7, 7, 7, 7]);
    }
}
