//! Utility types shared by the metadata tables.

pub mod alignment;
pub mod index_vec;

pub use alignment::{align_up, is_word_aligned, WORD_SIZE};
pub use index_vec::{Idx, IndexVec};
