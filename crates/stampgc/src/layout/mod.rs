//! Layout Module - scan descriptors
//!
//! Components:
//! - `field`: declared field kinds and the `scan_descriptor!` macro
//! - `descriptor`: validation and compilation into flat slot lists
//! - `table`: stamp-indexed descriptor table

pub mod descriptor;
pub mod field;
pub mod table;

pub use descriptor::{ReferenceVisitor, ScanDescriptor, Slot, SlotKind, TrailingLayout};
pub use field::{field_width_of, FieldDescriptor, FieldKind, LayoutSpec};
pub use table::ScanTable;
