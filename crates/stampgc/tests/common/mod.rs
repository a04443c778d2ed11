//! Shared fixtures for the stampgc integration tests
//!
//! Objects are laid out in word buffers owned by a [`TestHeap`], so tests
//! can hand real addresses to the unsafe entry points without a collector.

#![allow(dead_code)]

use stampgc::{
    ClassDecl, ClassSpec, GcMetadata, LayoutSpec, MetadataBuilder, MetadataConfig, ObjectHeader, StampId,
};

/// Object, Number, Integer, String, HashTable: the five-class example
///
/// Expected numbering: Object #1 [#1..=#5], Number #2 [#2..=#3],
/// Integer #3, String #4, HashTable #5.
pub fn example_metadata() -> GcMetadata {
    let mut builder = MetadataBuilder::new(MetadataConfig::default());
    builder
        .class(ClassDecl::new("Object").abstract_class())
        .class(ClassDecl::new("Number").parent("Object").abstract_class())
        .class(ClassSpec::new(ClassDecl::new("Integer").parent("Number")).layout(LayoutSpec::new(24).data("value", 16, 8)))
        .class(
            ClassSpec::new(ClassDecl::new("String").parent("Object")).layout(
                LayoutSpec::new(24)
                    .data("length", 16, 8)
                    .trailing("bytes", 24, 16, 1, Vec::new()),
            ),
        )
        .class(ClassSpec::new(ClassDecl::new("HashTable").parent("Object")).layout(LayoutSpec::new(24).owning("storage", 16)));
    builder.build().expect("example hierarchy should build")
}

/// Word-aligned backing store for hand-built objects
#[derive(Default)]
pub struct TestHeap {
    objects: Vec<Box<[usize]>>,
}

impl TestHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object of `words` words with `stamp` in its header and
    /// `fields` written after the header; returns its address
    pub fn alloc(&mut self, stamp: StampId, words: usize, fields: &[usize]) -> usize {
        assert!(words >= 2 + fields.len(), "object too small for its fields");
        let mut object = vec![0usize; words].into_boxed_slice();
        let address = object.as_mut_ptr() as usize;
        unsafe {
            std::ptr::write(address as *mut ObjectHeader, ObjectHeader::new(stamp));
        }
        object[2..2 + fields.len()].copy_from_slice(fields);
        self.objects.push(object);
        address
    }

    /// Like [`TestHeap::alloc`] but marks the object as foreign-created
    pub fn alloc_foreign(&mut self, stamp: StampId, words: usize) -> usize {
        let address = self.alloc(stamp, words, &[]);
        unsafe {
            std::ptr::write(address as *mut ObjectHeader, ObjectHeader::foreign(stamp));
        }
        address
    }

    /// Read word `index` of the object at `address`
    pub fn word(&self, address: usize, index: usize) -> usize {
        unsafe { *((address as *const usize).add(index)) }
    }
}

/// Stamp of `name`, panicking if it is not registered
pub fn stamp(metadata: &GcMetadata, name: &str) -> StampId {
    metadata
        .lookup(name)
        .unwrap_or_else(|| panic!("class `{name}` is not registered"))
}
