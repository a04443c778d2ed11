//! Object Module - object header and tagged reference encoding
//!
//! - `header`: the two-word header every heap object starts with
//! - `tagged`: bit layout of tagged references

pub mod header;
pub mod tagged;

pub use header::{ObjectHeader, Origin, HEADER_SIZE, OBJECT_ALIGNMENT};
pub use tagged::TagScheme;
