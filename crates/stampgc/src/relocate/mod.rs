//! Relocation helpers
//!
//! After the collector moves objects, every reference into a moved object
//! must be rewritten. This module rewrites the fields of one object using
//! its scan descriptor; the global root table rewrites static slots the
//! same way (see [`crate::roots`]).
//!
//! - Owning slots are replaced with the new address.
//! - Tagged slots get a new address payload; tag bits are kept bit-for-bit.
//! - Fixable raw pointers are adjusted but were never traced.

pub mod forwarding;

pub use forwarding::{Forwarding, ForwardingMap};

use crate::error::Result;
use crate::layout::{ReferenceVisitor, ScanTable};
use crate::object::TagScheme;

/// Counts of rewritten slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationStats {
    pub owning: usize,
    pub tagged: usize,
    pub fixable: usize,
}

impl RelocationStats {
    pub fn total(&self) -> usize {
        self.owning + self.tagged + self.fixable
    }
}

/// Rewrite one slot holding an untagged address
///
/// # Safety
///
/// `slot` must be valid for reads and writes.
#[inline]
pub unsafe fn fix_owning_slot(slot: *mut usize, forwarding: &(impl Forwarding + ?Sized)) -> bool {
    let old = *slot;
    if old == 0 {
        return false;
    }
    match forwarding.forward(old) {
        Some(new) if new != old => {
            *slot = new;
            true
        }
        _ => false,
    }
}

/// Rewrite one slot holding a tagged word
///
/// # Safety
///
/// `slot` must be valid for reads and writes.
pub unsafe fn fix_tagged_slot(
    slot: *mut usize,
    scheme: &TagScheme,
    forwarding: &(impl Forwarding + ?Sized),
) -> Result<bool> {
    let word = *slot;
    if !scheme.is_pointer(word) {
        return Ok(false);
    }
    let old = scheme.address(word);
    match forwarding.forward(old) {
        Some(new) if new != old => {
            *slot = scheme.retarget(word, new)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

struct FixupVisitor<'a, F: Forwarding + ?Sized> {
    scheme: &'a TagScheme,
    forwarding: &'a F,
    stats: RelocationStats,
    error: Option<crate::error::StampError>,
}

impl<F: Forwarding + ?Sized> ReferenceVisitor for FixupVisitor<'_, F> {
    fn visit_owning(&mut self, slot: *mut usize) {
        if unsafe { fix_owning_slot(slot, self.forwarding) } {
            self.stats.owning += 1;
        }
    }

    fn visit_tagged(&mut self, slot: *mut usize) {
        match unsafe { fix_tagged_slot(slot, self.scheme, self.forwarding) } {
            Ok(true) => self.stats.tagged += 1,
            Ok(false) => {}
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }
}

/// Rewrite every owning, tagged and fixable slot of the object at `address`
///
/// A slot that cannot be rewritten does not stop the pass; the first such
/// error is returned once every other slot is fixed.
///
/// # Safety
///
/// `address` must point to a live object starting with an `ObjectHeader`
/// whose stamp is in `table`, with no concurrent access during the call.
pub unsafe fn relocate_object_fields(
    table: &ScanTable,
    address: usize,
    forwarding: &(impl Forwarding + ?Sized),
) -> Result<RelocationStats> {
    let mut visitor = FixupVisitor {
        scheme: table.tag_scheme(),
        forwarding,
        stats: RelocationStats::default(),
        error: None,
    };
    table.scan(address, &mut visitor)?;

    let mut stats = visitor.stats;
    table.for_each_fixable(address, |slot| {
        if fix_owning_slot(slot, forwarding) {
            stats.fixable += 1;
        }
    })?;

    match visitor.error {
        Some(err) => Err(err),
        None => Ok(stats),
    }
}
