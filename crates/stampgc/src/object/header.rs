//! Object Header - stamp and mark word of a managed object
//!
//! Object Header Layout (16 bytes on 64-bit):
//! ┌─────────────────────────────────────────┐
//! │         Mark Word (8 bytes)             │  <- AtomicUsize
//! │  - Bit 1: Finalized                     │
//! │  - Other bits: owned by the collector   │
//! ├─────────────────────────────────────────┤
//! │         Stamp Word (8 bytes)            │
//! │  - Bits 0-31: StampId                   │
//! │  - Bit 32: Foreign origin               │
//! └─────────────────────────────────────────┘
//!
//! Field offsets in scan descriptors are measured from the start of the
//! header, so no traced field may start below [`HEADER_SIZE`].

use crate::stamp::StampId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Size of object header in bytes
pub const HEADER_SIZE: usize = std::mem::size_of::<ObjectHeader>();

/// Minimum object alignment (bytes)
pub const OBJECT_ALIGNMENT: usize = 8;

/// Mark word bit recording that finalization ran
pub const FINALIZED_BIT: usize = 1;
pub const FINALIZED_MASK: usize = 1 << FINALIZED_BIT;

const STAMP_MASK: u64 = 0xFFFF_FFFF;
const FOREIGN_BIT: u64 = 1 << 32;

/// Where an object's storage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Allocated by the collector in managed memory
    Managed,
    /// Created outside managed memory for interop
    Foreign,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Managed => write!(f, "managed"),
            Origin::Foreign => write!(f, "foreign"),
        }
    }
}

/// Object Header
///
/// Every managed object starts with this header. The stamp word is written
/// once at allocation and never changes; the mark word is owned by the
/// collector.
#[repr(C)]
#[derive(Debug)]
pub struct ObjectHeader {
    /// Mark word: atomic for concurrent marking
    pub mark_word: AtomicUsize,
    /// Stamp and origin bit
    pub stamp_word: u64,
}

impl ObjectHeader {
    /// Header for an object allocated in managed memory
    pub fn new(stamp: StampId) -> Self {
        Self {
            mark_word: AtomicUsize::new(0),
            stamp_word: u64::from(stamp.get()),
        }
    }

    /// Header for an object created outside managed memory
    pub fn foreign(stamp: StampId) -> Self {
        Self {
            mark_word: AtomicUsize::new(0),
            stamp_word: u64::from(stamp.get()) | FOREIGN_BIT,
        }
    }

    #[inline]
    pub fn stamp(&self) -> StampId {
        StampId((self.stamp_word & STAMP_MASK) as u32)
    }

    #[inline]
    pub fn origin(&self) -> Origin {
        if self.stamp_word & FOREIGN_BIT != 0 {
            Origin::Foreign
        } else {
            Origin::Managed
        }
    }

    /// Record that finalization ran
    /// Returns true if it had already run
    #[inline]
    pub fn set_finalized(&self) -> bool {
        self.mark_word.fetch_or(FINALIZED_MASK, Ordering::AcqRel) & FINALIZED_MASK != 0
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.mark_word.load(Ordering::Acquire) & FINALIZED_MASK != 0
    }

    /// View the header of the object at `address`
    ///
    /// # Safety
    ///
    /// `address` must point to a live object that starts with an
    /// `ObjectHeader` and outlives the returned reference.
    #[inline]
    pub unsafe fn from_address<'a>(address: usize) -> &'a ObjectHeader {
        &*(address as *const ObjectHeader)
    }

    /// Read the stamp of the object at `address`
    ///
    /// # Safety
    ///
    /// Same contract as [`ObjectHeader::from_address`].
    #[inline]
    pub unsafe fn read_stamp(address: usize) -> StampId {
        Self::from_address(address).stamp()
    }
}
