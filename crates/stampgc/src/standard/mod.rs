//! Standard Hierarchy - the runtime's core classes
//!
//! ```text
//! Object (abstract)
//! ├── Number (abstract)
//! │   ├── Integer
//! │   ├── Bignum
//! │   ├── Ratio
//! │   └── DoubleFloat
//! ├── Cons                      + Sequence
//! ├── Symbol
//! ├── Array (abstract)
//! │   ├── String
//! │   └── Vector                + Sequence
//! ├── HashTable
//! ├── Stream (abstract)
//! │   └── FileStream
//! ├── Mutex
//! ├── ForeignPointer
//! ├── Function (abstract)
//! │   └── Closure
//! ├── Package
//! └── Instance
//!     └── FuncallableInstance   + Function
//! HashTableStorage (container payload)
//! Sequence (abstract mixin)
//! ```
//!
//! Layouts are derived from the `#[repr(C)]` structs in [`objects`], so
//! offsets and sizes always match what the allocator lays out.

pub mod objects;

use crate::config::MetadataConfig;
use crate::dispatch::{DispatchPolicy, Routine};
use crate::error::Result;
use crate::layout::{FieldDescriptor, LayoutSpec};
use crate::metadata::{ClassSpec, GcMetadata, MetadataBuilder};
use crate::registry::{ClassDecl, ClassKind};
use crate::scan_descriptor;
use crate::util::WORD_SIZE;
use std::mem::offset_of;

/// Module name the standard classes are registered under
pub const STANDARD_MODULE: &str = "core";

/// Cleanup routines the standard classes dispatch to
#[derive(Debug, Clone)]
pub struct StandardRoutines {
    /// Finalize `FileStream`: flush and close the descriptor
    pub close_stream: Routine,
    /// Finalize `Mutex`: destroy the OS handle
    pub destroy_mutex: Routine,
    /// Deallocate `ForeignPointer`: release memory owned by foreign code
    pub release_foreign: Routine,
}

impl Default for StandardRoutines {
    fn default() -> Self {
        Self {
            close_stream: Routine::new("close-stream", |target| {
                log::trace!("close-stream on {} at {:#x}", target.class, target.address);
            }),
            destroy_mutex: Routine::new("destroy-mutex", |target| {
                log::trace!("destroy-mutex on {} at {:#x}", target.class, target.address);
            }),
            release_foreign: Routine::new("release-foreign", |target| {
                log::trace!("release-foreign on {} at {:#x}", target.class, target.address);
            }),
        }
    }
}

fn hash_table_storage_layout() -> LayoutSpec {
    use objects::HashTableStorage;

    scan_descriptor!(HashTableStorage => [capacity: data]).field(
        FieldDescriptor::trailing(
            "pairs",
            offset_of!(HashTableStorage, pairs),
            offset_of!(HashTableStorage, capacity),
            2 * WORD_SIZE,
            vec![
                FieldDescriptor::tagged("key", 0),
                FieldDescriptor::tagged("value", WORD_SIZE),
            ],
        )
        .measured(0),
    )
}

/// Class specs of the standard hierarchy, in declaration order
pub fn standard_hierarchy(routines: &StandardRoutines) -> Vec<ClassSpec> {
    use objects as o;

    let class = |decl: ClassDecl| ClassSpec::new(decl.module(STANDARD_MODULE));
    let abstract_class = |name: &str, parent: Option<&str>| {
        let decl = ClassDecl::new(name).abstract_class();
        class(match parent {
            Some(parent) => decl.parent(parent),
            None => decl,
        })
    };

    vec![
        abstract_class("Object", None),
        abstract_class("Number", Some("Object")),
        class(ClassDecl::new("Integer").parent("Number")).layout(scan_descriptor!(o::Integer => [value: data])),
        class(ClassDecl::new("Bignum").parent("Number")).layout(scan_descriptor!(o::Bignum => [
            limb_count: data,
            limbs: trailing(limb_count, data(8)),
        ])),
        class(ClassDecl::new("Ratio").parent("Number")).layout(scan_descriptor!(o::Ratio => [
            numerator: tagged,
            denominator: tagged,
        ])),
        class(ClassDecl::new("DoubleFloat").parent("Number")).layout(scan_descriptor!(o::DoubleFloat => [value: data])),
        class(ClassDecl::new("Cons").parent("Object").secondary("Sequence")).layout(scan_descriptor!(o::Cons => [
            car: tagged,
            cdr: tagged,
        ])),
        class(ClassDecl::new("Symbol").parent("Object")).layout(scan_descriptor!(o::Symbol => [
            name: owning,
            package: tagged,
            cells: embedded(tagged),
            plist: tagged,
            flags: data,
            hash: data,
        ])),
        abstract_class("Array", Some("Object")),
        class(ClassDecl::new("String").parent("Array")).layout(scan_descriptor!(o::String => [
            length: data,
            bytes: trailing(length, data(1)),
        ])),
        class(ClassDecl::new("Vector").parent("Array").secondary("Sequence")).layout(scan_descriptor!(o::Vector => [
            length: data,
            elements: trailing(length, tagged),
        ])),
        class(ClassDecl::new("HashTable").parent("Object")).layout(scan_descriptor!(o::HashTable => [
            storage: owning,
            count: data,
            cursor: fixable,
            test: tagged,
        ])),
        abstract_class("Stream", Some("Object")),
        class(ClassDecl::new("FileStream").parent("Stream"))
            .layout(scan_descriptor!(o::FileStream => [
                path: owning,
                buffer: raw,
                position: data,
                fd: data,
                mode: data,
            ]))
            .finalize(DispatchPolicy::Routine(routines.close_stream.clone())),
        class(ClassDecl::new("Mutex").parent("Object"))
            .layout(scan_descriptor!(o::Mutex => [
                name: tagged,
                handle: raw,
            ]))
            .finalize(DispatchPolicy::Routine(routines.destroy_mutex.clone())),
        class(ClassDecl::new("ForeignPointer").parent("Object"))
            .layout(scan_descriptor!(o::ForeignPointer => [
                address: raw,
                size: data,
            ]))
            .deallocate(DispatchPolicy::Routine(routines.release_foreign.clone())),
        abstract_class("Function", Some("Object")),
        class(ClassDecl::new("Closure").parent("Function")).layout(scan_descriptor!(o::Closure => [
            entry: raw,
            name: tagged,
            env_count: data,
            env: trailing(env_count, tagged),
        ])),
        class(ClassDecl::new("Package").parent("Object")).layout(scan_descriptor!(o::Package => [
            name: owning,
            symbols: owning,
            uses: tagged,
        ])),
        class(ClassDecl::new("Instance").parent("Object")).layout(scan_descriptor!(o::Instance => [
            class: tagged,
            slot_count: data,
            slots: trailing(slot_count, tagged),
        ])),
        class(ClassDecl::new("FuncallableInstance").parent("Instance").secondary("Function")).layout(
            scan_descriptor!(o::FuncallableInstance => [
                class: tagged,
                entry: raw,
                function: tagged,
                slot_count: data,
                slots: trailing(slot_count, tagged),
            ]),
        ),
        class(ClassDecl::new("HashTableStorage").kind(ClassKind::ContainerPayload)).layout(hash_table_storage_layout()),
        class(ClassDecl::new("Sequence").kind(ClassKind::AbstractMixin)),
    ]
}

/// Metadata for the standard hierarchy with the default configuration
pub fn standard_metadata() -> Result<GcMetadata> {
    standard_metadata_with(MetadataConfig::default(), &StandardRoutines::default())
}

pub fn standard_metadata_with(config: MetadataConfig, routines: &StandardRoutines) -> Result<GcMetadata> {
    let mut builder = MetadataBuilder::new(config);
    builder.classes(standard_hierarchy(routines));
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SlotKind;
    use crate::typetest::TypeTest;
    use std::mem::size_of;

    #[test]
    fn test_standard_metadata_builds() {
        let metadata = standard_metadata().unwrap();
        assert_eq!(metadata.registry().len(), 23);
        assert_eq!(metadata.lookup("Object"), Some(crate::stamp::StampId(1)));
    }

    #[test]
    fn test_layouts_follow_structs() {
        let metadata = standard_metadata().unwrap();
        let scans = metadata.scan_table();
        let descriptor = |name: &str| scans.descriptor(metadata.lookup(name).unwrap()).unwrap();

        assert_eq!(descriptor("Cons").size(), size_of::<objects::Cons>());
        assert_eq!(descriptor("Symbol").traced_slot_count(), 5);
        assert!(descriptor("Integer").is_leaf_object());
        assert!(descriptor("String").is_leaf_object());

        let table = descriptor("HashTable");
        assert!(table
            .slots()
            .iter()
            .any(|slot| slot.kind == SlotKind::Fixable && slot.offset == offset_of!(objects::HashTable, cursor)));

        let storage = descriptor("HashTableStorage").trailing().unwrap();
        assert_eq!(storage.stride, 16);
        assert_eq!(storage.slots.len(), 2);
    }

    #[test]
    fn test_secondary_bases() {
        let metadata = standard_metadata().unwrap();
        let stamp = |name: &str| metadata.lookup(name).unwrap();

        assert!(metadata.is_a(stamp("Cons"), "Sequence"));
        assert!(metadata.is_a(stamp("Vector"), "Sequence"));
        assert!(!metadata.is_a(stamp("String"), "Sequence"));
        assert!(metadata.is_a(stamp("FuncallableInstance"), "Function"));
        assert!(metadata.is_a(stamp("FuncallableInstance"), "Instance"));
        assert!(!metadata.is_a(stamp("Instance"), "Function"));
        assert!(matches!(metadata.type_test("Function"), Some(TypeTest::RangeWithConfirm { .. })));
        assert!(metadata.registry().class("FuncallableInstance").unwrap().ambiguous);
    }

    #[test]
    fn test_routines_wired() {
        let metadata = standard_metadata().unwrap();
        let stamp = |name: &str| metadata.lookup(name).unwrap();
        let finalize = metadata.finalize_table();
        let deallocate = metadata.deallocate_table();

        assert_eq!(finalize.policy(stamp("FileStream")).unwrap().routine_name(), Some("close-stream"));
        assert_eq!(finalize.policy(stamp("Mutex")).unwrap().routine_name(), Some("destroy-mutex"));
        assert_eq!(
            deallocate.policy(stamp("ForeignPointer")).unwrap().routine_name(),
            Some("release-foreign")
        );
        assert!(finalize.policy(stamp("HashTableStorage")).unwrap().is_forbidden());
        assert!(deallocate.policy(stamp("Sequence")).unwrap().is_forbidden());
    }
}
