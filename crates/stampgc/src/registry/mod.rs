//! Stamp Registry - unique stamp and primary range per class
//!
//! The registry is built once by [`RegistryBuilder`] and read-only
//! afterwards. Lookups by stamp are a single indexed load; lookups by name
//! go through an `FxHashMap`.

pub mod builder;

pub use builder::{ClassDecl, RegistryBuilder};

use crate::error::{Result, StampError};
use crate::stamp::{StampId, StampRange};
use crate::util::IndexVec;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a class plays in the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassKind {
    /// Ordinary class; instances are independent heap objects
    #[default]
    Plain,
    /// Backing store owned by another object (hash-table storage, vector
    /// payload); never finalized or deallocated on its own
    ContainerPayload,
    /// Pure mixin reached only as a secondary base; never instantiated
    AbstractMixin,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassKind::Plain => write!(f, "plain"),
            ClassKind::ContainerPayload => write!(f, "container-payload"),
            ClassKind::AbstractMixin => write!(f, "abstract-mixin"),
        }
    }
}

/// Everything the collector knows about one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    /// Module that registered the class
    pub module: String,
    /// Own stamp, always `range.low`
    pub stamp: StampId,
    /// Stamps of this class and all primary descendants
    pub range: StampRange,
    pub kind: ClassKind,
    pub is_abstract: bool,
    /// Byte size of the fixed part, header included
    pub size: usize,
    /// Reached through a secondary base; type tests against those bases
    /// need the confirming walk
    pub ambiguous: bool,
    pub parent: Option<StampId>,
    /// Declared secondary bases
    pub secondary: Vec<StampId>,
    /// Sorted classes this class is-a only through its own secondary bases
    pub secondary_ancestors: Vec<StampId>,
}

impl ClassDescriptor {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.range.is_leaf()
    }

    /// Can objects carry this stamp
    #[inline]
    pub fn is_instantiable(&self) -> bool {
        !self.is_abstract && self.kind != ClassKind::AbstractMixin
    }

    /// Binary search over the secondary closure
    #[inline]
    pub fn has_secondary_ancestor(&self, stamp: StampId) -> bool {
        self.secondary_ancestors.binary_search(&stamp).is_ok()
    }
}

/// Registry of every heap-allocatable class
#[derive(Debug, Clone, Default)]
pub struct StampRegistry {
    classes: IndexVec<StampId, Option<ClassDescriptor>>,
    by_name: FxHashMap<String, StampId>,
}

impl StampRegistry {
    pub(crate) fn from_parts(
        classes: IndexVec<StampId, Option<ClassDescriptor>>,
        by_name: FxHashMap<String, StampId>,
    ) -> Self {
        Self { classes, by_name }
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Largest stamp in use, `StampId::NONE` when empty
    pub fn max_stamp(&self) -> StampId {
        self.iter().last().map_or(StampId::NONE, |class| class.stamp)
    }

    pub fn lookup(&self, name: &str) -> Option<StampId> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor(&self, stamp: StampId) -> Option<&ClassDescriptor> {
        self.classes.get(stamp).and_then(Option::as_ref)
    }

    /// Descriptor for a stamp, failing on unregistered stamps
    pub fn classify(&self, stamp: StampId) -> Result<&ClassDescriptor> {
        self.descriptor(stamp)
            .ok_or(StampError::UnknownStamp { stamp })
    }

    pub fn class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.lookup(name).and_then(|stamp| self.descriptor(stamp))
    }

    pub fn range_of(&self, name: &str) -> Option<StampRange> {
        self.class(name).map(|class| class.range)
    }

    /// Descriptors in stamp order
    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.classes.iter().filter_map(Option::as_ref)
    }

    /// The class itself followed by its primary ancestors
    pub fn primary_chain(&self, stamp: StampId) -> PrimaryChain<'_> {
        PrimaryChain {
            registry: self,
            next: self.descriptor(stamp),
        }
    }

    /// Primary subclass test, O(1)
    pub fn is_primary_subclass(&self, stamp: StampId, ancestor: StampId) -> bool {
        self.descriptor(ancestor)
            .is_some_and(|class| class.range.contains(stamp))
    }

    /// Direct primary children of a class, in stamp order
    pub fn children(&self, stamp: StampId) -> impl Iterator<Item = &ClassDescriptor> + '_ {
        self.iter().filter(move |class| class.parent == Some(stamp))
    }
}

/// Iterator over a class and its primary ancestors
pub struct PrimaryChain<'a> {
    registry: &'a StampRegistry,
    next: Option<&'a ClassDescriptor>,
}

impl<'a> Iterator for PrimaryChain<'a> {
    type Item = &'a ClassDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current
            .parent
            .and_then(|parent| self.registry.descriptor(parent));
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataConfig;

    fn example() -> StampRegistry {
        let mut builder = RegistryBuilder::new(&MetadataConfig::default());
        builder
            .declare(ClassDecl::new("Object").abstract_class())
            .declare(ClassDecl::new("Number").parent("Object").abstract_class())
            .declare(ClassDecl::new("Integer").parent("Number").size(24))
            .declare(ClassDecl::new("String").parent("Object").size(24))
            .declare(ClassDecl::new("HashTable").parent("Object").size(32));
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_and_classify_agree() {
        let registry = example();
        for class in registry.iter() {
            let looked_up = registry.lookup(&class.name).unwrap();
            assert_eq!(looked_up, class.stamp);
            assert_eq!(registry.classify(looked_up).unwrap().name, class.name);
        }
    }

    #[test]
    fn test_classify_unknown_stamp() {
        let registry = example();
        assert!(matches!(
            registry.classify(StampId(99)),
            Err(StampError::UnknownStamp { .. })
        ));
        assert!(registry.classify(StampId::NONE).is_err());
    }

    #[test]
    fn test_primary_chain() {
        let registry = example();
        let integer = registry.lookup("Integer").unwrap();
        let names: Vec<_> = registry
            .primary_chain(integer)
            .map(|class| class.name.as_str())
            .collect();
        assert_eq!(names, vec!["Integer", "Number", "Object"]);
    }

    #[test]
    fn test_children_and_max_stamp() {
        let registry = example();
        let object = registry.lookup("Object").unwrap();
        let children: Vec<_> = registry
            .children(object)
            .map(|class| class.name.as_str())
            .collect();
        assert_eq!(children, vec!["Number", "String", "HashTable"]);
        assert_eq!(registry.max_stamp(), StampId(5));
    }
}
