//! Tagged references - address payload plus preserved tag bits
//!
//! A tagged reference word packs an object address together with tag bits
//! that the collector never interprets:
//!
//! ```text
//! 64-bit Tagged Word:
//! ┌──────────────────┬──────────────────────────────────┬──────────┐
//! │  High tag bits   │           Address                │ Low tag  │
//! │ (high_tag_mask)  │                                  │ (0..=3)  │
//! └──────────────────┴──────────────────────────────────┴──────────┘
//! ```
//!
//! Some low tag values mark immediates (fixnums, characters) whose payload
//! is not an address at all. Those words, and the null word, are never
//! traced or relocated.

use crate::error::{Result, StampError};
use serde::{Deserialize, Serialize};

/// Bit layout of tagged reference words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagScheme {
    /// Number of low bits used as tag, bounded by object alignment
    pub low_tag_bits: u32,
    /// High bits carried alongside the address and preserved verbatim
    pub high_tag_mask: usize,
    /// Bitset of low tag values that denote immediates
    pub immediate_tags: u32,
}

impl Default for TagScheme {
    /// Three low tag bits; even tags are immediates, odd tags are pointers
    fn default() -> Self {
        Self {
            low_tag_bits: 3,
            high_tag_mask: 0,
            immediate_tags: 0b0101_0101,
        }
    }
}

impl TagScheme {
    #[inline]
    pub const fn low_mask(&self) -> usize {
        (1usize << self.low_tag_bits) - 1
    }

    /// Every bit that is not part of the address
    #[inline]
    pub const fn tag_mask(&self) -> usize {
        self.low_mask() | self.high_tag_mask
    }

    #[inline]
    pub const fn low_tag(&self, word: usize) -> u32 {
        (word & self.low_mask()) as u32
    }

    #[inline]
    pub const fn is_immediate(&self, word: usize) -> bool {
        self.immediate_tags & (1 << self.low_tag(word)) != 0
    }

    /// Non-null word whose low tag names a heap pointer
    #[inline]
    pub const fn is_pointer(&self, word: usize) -> bool {
        word != 0 && !self.is_immediate(word)
    }

    /// Address payload with every tag bit cleared
    #[inline]
    pub const fn address(&self, word: usize) -> usize {
        word & !self.tag_mask()
    }

    #[inline]
    pub const fn tag_bits(&self, word: usize) -> usize {
        word & self.tag_mask()
    }

    /// Combine an address with tag bits
    pub fn encode(&self, address: usize, tag_bits: usize) -> Result<usize> {
        let tag_mask = self.tag_mask();
        if address & tag_mask != 0 || tag_bits & !tag_mask != 0 {
            return Err(StampError::TagCollision { address, tag_mask });
        }
        Ok(address | tag_bits)
    }

    /// Replace the address payload of `word`, keeping its tag bits bit-for-bit
    pub fn retarget(&self, word: usize, new_address: usize) -> Result<usize> {
        self.encode(new_address, self.tag_bits(word))
    }
}
