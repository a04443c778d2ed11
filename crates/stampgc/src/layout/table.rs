//! Scan Table - stamp-indexed scan descriptors
//!
//! The collector's entry point for marking and relocation: the stamp is read
//! from the object header and the matching descriptor drives the walk.

use crate::error::{Result, StampError};
use crate::layout::descriptor::{ReferenceVisitor, ScanDescriptor};
use crate::object::{ObjectHeader, TagScheme};
use crate::stamp::StampId;
use crate::util::IndexVec;

/// Scan descriptors for every class that has a layout
#[derive(Debug, Clone, Default)]
pub struct ScanTable {
    descriptors: IndexVec<StampId, Option<ScanDescriptor>>,
    scheme: TagScheme,
}

impl ScanTable {
    pub fn new(scheme: TagScheme) -> Self {
        Self {
            descriptors: IndexVec::new(),
            scheme,
        }
    }

    pub(crate) fn insert(&mut self, stamp: StampId, descriptor: ScanDescriptor) {
        *self.descriptors.ensure_contains_elem(stamp, || None) = Some(descriptor);
    }

    #[inline]
    pub fn descriptor(&self, stamp: StampId) -> Option<&ScanDescriptor> {
        self.descriptors.get(stamp).and_then(Option::as_ref)
    }

    pub fn tag_scheme(&self) -> &TagScheme {
        &self.scheme
    }

    /// Number of classes with a descriptor
    pub fn len(&self) -> usize {
        self.descriptors.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(stamp, descriptor)` pairs in stamp order
    pub fn iter(&self) -> impl Iterator<Item = (StampId, &ScanDescriptor)> + '_ {
        self.descriptors
            .iter_enumerated()
            .filter_map(|(stamp, descriptor)| descriptor.as_ref().map(|d| (stamp, d)))
    }

    /// Descriptor of the object at `address`
    ///
    /// # Safety
    ///
    /// `address` must point to a live object starting with an `ObjectHeader`.
    #[inline]
    pub unsafe fn descriptor_of(&self, address: usize) -> Result<&ScanDescriptor> {
        let stamp = ObjectHeader::read_stamp(address);
        self.descriptor(stamp)
            .ok_or(StampError::UnknownStamp { stamp })
    }

    /// Visit every traced reference of the object at `address`
    ///
    /// # Safety
    ///
    /// `address` must point to a live object starting with an
    /// `ObjectHeader`, not mutated concurrently during the scan.
    pub unsafe fn scan<V: ReferenceVisitor + ?Sized>(&self, address: usize, visitor: &mut V) -> Result<()> {
        let descriptor = self.descriptor_of(address)?;
        descriptor.for_each_reference(address, &self.scheme, visitor);
        Ok(())
    }

    /// Visit every fixable raw-pointer slot of the object at `address`
    ///
    /// # Safety
    ///
    /// Same contract as [`ScanTable::scan`].
    pub unsafe fn for_each_fixable(&self, address: usize, f: impl FnMut(*mut usize)) -> Result<()> {
        let descriptor = self.descriptor_of(address)?;
        descriptor.for_each_fixable(address, f);
        Ok(())
    }

    /// Size of the object at `address`, trailing elements included
    ///
    /// # Safety
    ///
    /// Same contract as [`ScanTable::scan`].
    pub unsafe fn object_size(&self, address: usize) -> Result<usize> {
        Ok(self.descriptor_of(address)?.object_size(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutSpec;

    struct Count(usize);

    impl ReferenceVisitor for Count {
        fn visit_owning(&mut self, _slot: *mut usize) {
            self.0 += 1;
        }

        fn visit_tagged(&mut self, _slot: *mut usize) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_scan_reads_stamp_from_header() {
        let mut table = ScanTable::new(TagScheme::default());
        let layout = LayoutSpec::new(32).owning("car", 16).tagged("cdr", 24);
        table.insert(StampId(3), ScanDescriptor::compile("Cons", &layout, true).unwrap());

        let mut object: [usize; 4] = [0, 3, 0x1000, 0x2001];
        let address = object.as_mut_ptr() as usize;
        let mut count = Count(0);
        unsafe {
            table.scan(address, &mut count).unwrap();
            assert_eq!(table.object_size(address).unwrap(), 32);
        }
        assert_eq!(count.0, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_stamp_is_an_error() {
        let table = ScanTable::new(TagScheme::default());
        let mut object: [usize; 2] = [0, 7];
        let result = unsafe { table.scan(object.as_mut_ptr() as usize, &mut Count(0)) };
        assert!(matches!(
            result,
            Err(StampError::UnknownStamp { stamp }) if stamp == StampId(7)
        ));
    }
}
