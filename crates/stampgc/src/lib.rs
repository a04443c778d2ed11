//! # stampgc - Type Stamps and Collector Dispatch Metadata
//!
//! stampgc builds the read-only tables a tracing collector consults for a
//! managed runtime with a large, mostly single-rooted class hierarchy:
//!
//! - **Stamp Registry**: one integer stamp per heap-allocatable class, with
//!   a contiguous stamp range covering each class's primary subtree
//! - **Type Tests**: O(1) `is_a` per class, with a confirming check for
//!   classes reached through secondary inheritance
//! - **Scan Descriptors**: per-stamp offsets of owning, tagged and fixable
//!   slots, embedded arrays and one trailing variable-length array
//! - **Finalize / Deallocate Dispatch**: per-stamp cleanup tables with an
//!   explicit `Forbidden` entry for classes that must never reach them
//! - **Global Root Table**: static slots referencing the heap, rewritten on
//!   every relocating cycle
//!
//! Everything is validated once at initialization. A wrong range or field
//! offset would corrupt the heap silently, so construction rejects it with
//! a [`StampError`] instead.
//!
//! ## Quick Start
//!
//! ```rust
//! use stampgc::{ClassDecl, ClassSpec, LayoutSpec, MetadataBuilder, MetadataConfig};
//!
//! fn main() -> Result<(), stampgc::StampError> {
//!     let mut builder = MetadataBuilder::new(MetadataConfig::default());
//!     builder
//!         .class(ClassDecl::new("Object").abstract_class())
//!         .class(ClassDecl::new("Number").parent("Object").abstract_class())
//!         .class(ClassSpec::new(ClassDecl::new("Integer").parent("Number"))
//!             .layout(LayoutSpec::new(24).data("value", 16, 8)))
//!         .class(ClassSpec::new(ClassDecl::new("Cons").parent("Object"))
//!             .layout(LayoutSpec::new(32).tagged("car", 16).tagged("cdr", 24)));
//!     let metadata = builder.build()?;
//!
//!     let integer = metadata.lookup("Integer").unwrap();
//!     assert!(metadata.is_a(integer, "Number"));
//!     assert!(!metadata.is_a(metadata.lookup("Cons").unwrap(), "Number"));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │        ClassSpec / LayoutArtifact (layout tool output)     │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               ▼
//!                     ┌───────────────────┐
//!                     │  Stamp Registry   │
//!                     └─────────┬─────────┘
//!          ┌────────────────────┼─────────────────────┐
//!          ▼                    ▼                     ▼
//!   ┌─────────────┐    ┌────────────────┐   ┌───────────────────┐
//!   │ Type Tests  │    │  Scan Table    │   │ Finalize/Dealloc  │
//!   └─────────────┘    └────────────────┘   └───────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//!     runtime is_a        mark / relocate           sweep
//!                               ▲
//!                     ┌─────────┴─────────┐
//!                     │ Global Root Table │
//!                     └───────────────────┘
//! ```
//!
//! ### Stamp Ranges
//!
//! Stamps are handed out in pre-order, so every class's primary subtree is
//! one contiguous range:
//!
//! ```text
//! Object   #1 [#1..=#5]
//! ├── Number   #2 [#2..=#3]
//! │   └── Integer  #3
//! ├── String   #4
//! └── HashTable #5
//! ```
//!
//! ### Tagged References
//!
//! ```text
//! 64-bit Tagged Word:
//! ┌──────────────┬────────────────────────────────┬─────────┐
//! │ High tags    │            Address             │ Low tag │
//! └──────────────┴────────────────────────────────┴─────────┘
//! ```
//!
//! Relocation rewrites only the address bits; every tag bit survives.
//!
//! ## Safety
//!
//! Object-level entry points (`scan`, `finalize`, `reclaim`, relocation)
//! take raw addresses and are `unsafe`. Callers must guarantee:
//!
//! 1. **The address starts with an [`ObjectHeader`]** whose stamp is registered
//! 2. **The world is stopped** (or the object is condemned) for the duration
//! 3. **Dispatch routines do not allocate** managed memory or block
//!
//! ### Thread Safety
//!
//! - [`GcMetadata`] is `Send + Sync`; lookups take no locks
//! - Static root registration is guarded by a mutex and closes on freeze

pub mod artifact;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod logging;
pub mod metadata;
pub mod object;
pub mod registry;
pub mod relocate;
pub mod roots;
pub mod stamp;
pub mod standard;
pub mod typetest;
pub mod util;

pub use artifact::{BindingMode, ClassRecord, LayoutArtifact, PolicyRecord, RoutineBindings};
pub use config::{AmbiguityPolicy, ConfigError, MetadataConfig};
pub use dispatch::{DispatchPolicy, DispatchTable, DispatchTarget, Outcome, Phase, Routine};
pub use error::{Result, StampError};
pub use layout::{FieldDescriptor, FieldKind, LayoutSpec, ReferenceVisitor, ScanDescriptor, ScanTable};
pub use metadata::{ClassSpec, GcMetadata, MetadataBuilder, MetadataSummary, Reclaimed};
pub use object::{ObjectHeader, Origin, TagScheme, HEADER_SIZE};
pub use registry::{ClassDecl, ClassDescriptor, ClassKind, RegistryBuilder, StampRegistry};
pub use relocate::{relocate_object_fields, Forwarding, ForwardingMap, RelocationStats};
pub use roots::{freeze_static_roots, register_static_root, GlobalRootSlot, GlobalRootTable, RootKind, RootTableBuilder};
pub use stamp::{StampId, StampRange};
pub use typetest::{TypePredicate, TypeTest, TypeTests};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
