//! Stamps - integer type tags for heap-allocatable classes
//!
//! Every heap-allocatable class owns exactly one [`StampId`]. Stamps are
//! handed out in pre-order over the primary inheritance forest, so the stamps
//! of a class and all of its primary descendants form one contiguous
//! [`StampRange`]:
//!
//! ```text
//! Object      #1  [1, 5]
//! ├─ Number   #2  [2, 3]
//! │  └─ Integer #3 [3, 3]
//! ├─ String   #4  [4, 4]
//! └─ HashTable #5 [5, 5]
//! ```
//!
//! Stamp `0` is reserved for "no class" and never appears inside a range.

use crate::util::Idx;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique integer tag of a heap-allocatable class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StampId(pub u32);

impl StampId {
    /// Reserved "no class" stamp
    pub const NONE: StampId = StampId(0);

    /// First stamp handed out by the registry
    pub const FIRST: StampId = StampId(1);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        StampId(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The stamp that follows this one
    ///
    /// Registries bound stamps by [`MetadataConfig::max_stamp`], which is
    /// below `u32::MAX`, so this never wraps for a registered stamp.
    ///
    /// [`MetadataConfig::max_stamp`]: crate::config::MetadataConfig::max_stamp
    #[inline]
    pub const fn next(self) -> StampId {
        StampId(self.0 + 1)
    }
}

impl Idx for StampId {
    #[inline]
    fn from_usize(idx: usize) -> Self {
        debug_assert!(idx <= u32::MAX as usize, "stamp {} overflows u32", idx);
        StampId(idx as u32)
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inclusive range of stamps owned by a class
///
/// `low` is the class's own stamp; `high` is the largest stamp among its
/// primary descendants. Leaves have `low == high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StampRange {
    pub low: StampId,
    pub high: StampId,
}

impl StampRange {
    #[inline]
    pub const fn new(low: StampId, high: StampId) -> Self {
        Self { low, high }
    }

    /// Range covering a single stamp
    #[inline]
    pub const fn leaf(stamp: StampId) -> Self {
        Self {
            low: stamp,
            high: stamp,
        }
    }

    /// Inclusive membership test, the O(1) primary type test
    #[inline]
    pub const fn contains(&self, stamp: StampId) -> bool {
        self.low.0 <= stamp.0 && stamp.0 <= self.high.0
    }

    #[inline]
    pub const fn contains_range(&self, other: &StampRange) -> bool {
        self.low.0 <= other.low.0 && other.high.0 <= self.high.0
    }

    /// True when `other` is inside this range and not equal to it
    #[inline]
    pub fn strictly_contains(&self, other: &StampRange) -> bool {
        self.contains_range(other) && self != other
    }

    #[inline]
    pub const fn overlaps(&self, other: &StampRange) -> bool {
        self.low.0 <= other.high.0 && other.low.0 <= self.high.0
    }

    #[inline]
    pub const fn is_leaf(&self) -> bool {
        self.low.0 == self.high.0
    }

    /// A well-formed range never starts at the reserved stamp and never runs backwards
    #[inline]
    pub const fn is_well_formed(&self) -> bool {
        self.low.0 != 0 && self.low.0 <= self.high.0
    }

    /// Number of stamps in the range
    #[inline]
    pub const fn len(&self) -> usize {
        (self.high.0 - self.low.0) as usize + 1
    }

    /// Smallest range covering both
    #[inline]
    pub fn hull(&self, other: &StampRange) -> StampRange {
        StampRange {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = StampId> {
        (self.low.0..=self.high.0).map(StampId)
    }
}

impl fmt::Display for StampRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low.0, self.high.0)
    }
}
