//! Word alignment helpers used by layout validation.

/// Size of one traced slot (a machine word)
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Round `value` up to the next multiple of `alignment` (a power of two)
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Check whether a byte offset sits on a word boundary
#[inline]
pub const fn is_word_aligned(offset: usize) -> bool {
    offset % WORD_SIZE == 0
}
