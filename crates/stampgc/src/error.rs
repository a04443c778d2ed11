//! Error Module - stampgc error types
//!
//! Almost every error here is an initialization-time configuration error:
//! the metadata tables are built once, and a table that fails validation
//! must never reach the collector. Callers treat them as fatal.
//!
//! # Error Categories
//!
//! ## Registry Errors
//! - `DuplicateClass`, `UnknownClass` - malformed hierarchy declarations
//! - `OverlappingStamps`, `OverlappingRanges`, `RangeNotNested` - bad numbering
//! - `InheritanceCycle`, `UndeclaredAmbiguity` - hierarchy shape problems
//!
//! ## Layout Errors
//! - `FieldOutOfBounds`, `MisalignedField`, `FieldsOverlap`, ... - a scan
//!   descriptor that does not match the object's real layout
//!
//! ## Dispatch Errors
//! - `ForbiddenKindPolicy`, `UnboundRoutine`, `UnpairedDispatch`
//!
//! ## Root / Relocation Errors
//! - `DuplicateRoot`, `RootTableFrozen`, `TagCollision`, `InvalidForwarding`
//!
//! Invoking a `Forbidden` dispatch entry is *not* an error value: it is an
//! internal-consistency violation in the collector and panics.

use crate::config::ConfigError;
use crate::dispatch::Phase;
use crate::registry::ClassKind;
use crate::stamp::{StampId, StampRange};
use thiserror::Error;

/// Main error type for all stampgc operations
#[derive(Debug, Error)]
pub enum StampError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Two declarations share a class name
    #[error("Class `{name}` is declared more than once")]
    DuplicateClass { name: String },

    /// A parent or secondary base names an undeclared class
    #[error("Class `{referenced_by}` refers to unknown class `{name}`")]
    UnknownClass { name: String, referenced_by: String },

    /// Lookup of a stamp that no class owns
    #[error("No class is registered for stamp {stamp}")]
    UnknownStamp { stamp: StampId },

    /// A pre-numbered class uses the reserved stamp 0
    #[error("Class `{class}` uses the reserved stamp 0")]
    ReservedStamp { class: String },

    /// Two classes (possibly from different modules) claim the same stamp
    #[error(
        "Stamp {stamp} registered twice: `{first}` (module `{first_module}`) and `{second}` (module `{second_module}`)"
    )]
    OverlappingStamps {
        stamp: StampId,
        first: String,
        first_module: String,
        second: String,
        second_module: String,
    },

    /// Two ranges intersect without one containing the other
    #[error("Ranges of `{first}` {first_range} and `{second}` {second_range} overlap without nesting")]
    OverlappingRanges {
        first: String,
        first_range: StampRange,
        second: String,
        second_range: StampRange,
    },

    /// A range is malformed or does not start at the class's own stamp
    #[error("Class `{class}` has invalid range {range} for stamp {stamp}")]
    InvalidRange {
        class: String,
        stamp: StampId,
        range: StampRange,
    },

    /// The innermost range enclosing a class is not its primary parent's
    #[error("Range of `{class}` is enclosed by `{enclosing}` but its primary parent is `{parent}`")]
    RangeNotNested {
        class: String,
        enclosing: String,
        parent: String,
    },

    /// A stamp lies above the configured limit
    #[error("Class `{class}` uses stamp {stamp}, above the limit of {max}")]
    StampOutOfRange { class: String, stamp: StampId, max: u32 },

    /// Some declarations carry stamps and some do not
    #[error("Class `{class}` mixes pre-numbered and unnumbered declarations")]
    MixedNumbering { class: String },

    /// The inheritance graph loops back on itself
    #[error("Inheritance cycle through class `{class}`")]
    InheritanceCycle { class: String },

    /// Explicit ambiguity policy is on and a multiply-inherited class lacks the annotation
    #[error("Class `{class}` is reached through secondary base `{base}` and must be annotated ambiguous")]
    UndeclaredAmbiguity { class: String, base: String },

    /// Instantiable class smaller than an object header
    #[error("Class `{class}` has size {size}, smaller than the {minimum}-byte object header")]
    SizeTooSmall {
        class: String,
        size: usize,
        minimum: usize,
    },

    /// Declared size disagrees with the size carried by the layout
    #[error("Class `{class}` declares size {declared} but its layout is {layout} bytes")]
    SizeMismatch {
        class: String,
        declared: usize,
        layout: usize,
    },

    /// A field extends past the class's fixed size
    #[error("Field `{field}` of `{class}` at offset {offset} lies outside the {size}-byte object")]
    FieldOutOfBounds {
        class: String,
        field: String,
        offset: usize,
        size: usize,
    },

    /// A traced field is not word-aligned
    #[error("Field `{field}` of `{class}` at offset {offset} is not word-aligned")]
    MisalignedField {
        class: String,
        field: String,
        offset: usize,
    },

    /// A field overlaps the object header
    #[error("Field `{field}` of `{class}` at offset {offset} overlaps the object header")]
    FieldOverlapsHeader {
        class: String,
        field: String,
        offset: usize,
    },

    /// Two fields share bytes
    #[error("Fields `{first}` and `{second}` of `{class}` overlap")]
    FieldsOverlap {
        class: String,
        first: String,
        second: String,
    },

    /// A reference field whose real width is not one word
    #[error("Field `{field}` of `{class}` is {actual} bytes wide, expected {expected}")]
    FieldWidthMismatch {
        class: String,
        field: String,
        expected: usize,
        actual: usize,
    },

    /// More than one trailing variable-length array
    #[error("Class `{class}` declares more than one trailing array")]
    MultipleTrailingArrays { class: String },

    /// A trailing array inside an embedded array or element
    #[error("Trailing array `{field}` of `{class}` is nested inside another array")]
    NestedTrailingArray { class: String, field: String },

    /// A trailing array that does not start at the end of the fixed part
    #[error("Trailing array `{field}` of `{class}` starts at {offset}, expected {size}")]
    TrailingArrayNotAtEnd {
        class: String,
        field: String,
        offset: usize,
        size: usize,
    },

    /// The length field of a trailing array is unusable
    #[error("Length field of trailing array `{field}` in `{class}` is invalid: {reason}")]
    InvalidLengthField {
        class: String,
        field: String,
        reason: String,
    },

    /// Array stride is zero or too small for its element fields
    #[error("Array `{field}` of `{class}` has invalid stride {stride}")]
    InvalidStride {
        class: String,
        field: String,
        stride: usize,
    },

    /// A container payload or mixin was given a non-forbidden dispatch entry
    #[error("Class `{class}` of kind {kind:?} must have a forbidden {phase} entry")]
    ForbiddenKindPolicy {
        class: String,
        kind: ClassKind,
        phase: Phase,
    },

    /// A layout artifact names a routine nobody bound
    #[error("Class `{class}` uses unbound routine `{routine}`")]
    UnboundRoutine { class: String, routine: String },

    /// A stamp has an entry in one dispatch table but not the other
    #[error("Stamp {stamp} has no {missing_from} entry")]
    UnpairedDispatch { stamp: StampId, missing_from: Phase },

    /// The same static location registered twice as a root
    #[error("Root `{name}` at {address:#x} is already registered")]
    DuplicateRoot { name: String, address: usize },

    /// Root registration after the table was frozen
    #[error("Cannot register root `{name}`: the global root table is frozen")]
    RootTableFrozen { name: String },

    /// A relocated address would clobber tag bits
    #[error("Address {address:#x} collides with tag mask {tag_mask:#x}")]
    TagCollision { address: usize, tag_mask: usize },

    /// A forwarding entry is unusable
    #[error("Invalid forwarding {old:#x} -> {new:#x}: {reason}")]
    InvalidForwarding {
        old: usize,
        new: usize,
        reason: String,
    },

    /// Process-wide metadata was installed twice
    #[error("Metadata is already installed")]
    AlreadyInstalled,

    /// Malformed layout artifact
    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StampError {
    /// Check if this error indicates a bug in the collector or this crate
    /// rather than a bad declaration
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            StampError::UnknownStamp { .. }
                | StampError::UnpairedDispatch { .. }
                | StampError::TagCollision { .. }
                | StampError::InvalidForwarding { .. }
        )
    }

    /// Check if this error came from validating a scan descriptor
    pub fn is_layout_error(&self) -> bool {
        matches!(
            self,
            StampError::SizeTooSmall { .. }
                | StampError::SizeMismatch { .. }
                | StampError::FieldOutOfBounds { .. }
                | StampError::MisalignedField { .. }
                | StampError::FieldOverlapsHeader { .. }
                | StampError::FieldsOverlap { .. }
                | StampError::FieldWidthMismatch { .. }
                | StampError::MultipleTrailingArrays { .. }
                | StampError::NestedTrailingArray { .. }
                | StampError::TrailingArrayNotAtEnd { .. }
                | StampError::InvalidLengthField { .. }
                | StampError::InvalidStride { .. }
        )
    }
}

/// Result type alias for stampgc operations
pub type Result<T> = std::result::Result<T, StampError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_stamps_names_both_modules() {
        let err = StampError::OverlappingStamps {
            stamp: StampId(7),
            first: "Cons".to_string(),
            first_module: "core".to_string(),
            second: "Weak".to_string(),
            second_module: "ext".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#7"));
        assert!(msg.contains("`Cons` (module `core`)"));
        assert!(msg.contains("`Weak` (module `ext`)"));
    }

    #[test]
    fn test_classification() {
        assert!(StampError::UnknownStamp { stamp: StampId(3) }.is_bug());
        assert!(!StampError::DuplicateClass { name: "A".into() }.is_bug());

        let layout = StampError::MisalignedField {
            class: "Cons".into(),
            field: "car".into(),
            offset: 9,
        };
        assert!(layout.is_layout_error());
        assert!(!layout.is_bug());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StampError = io_err.into();
        assert!(matches!(err, StampError::Io(_)));
    }
}
