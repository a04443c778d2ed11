//! Forwarding - old address to new address during relocation
//!
//! The collector owns the real forwarding state; the metadata layer only
//! needs to ask "where did this address go". [`ForwardingMap`] is the
//! in-memory implementation used by tests, tools and simple collectors.
//! Entries cover whole objects, so interior pointers resolve to the same
//! offset inside the moved copy.

use crate::error::{Result, StampError};
use crate::object::OBJECT_ALIGNMENT;
use std::collections::BTreeMap;

/// Highest address a relocated object may start at (user-space half)
const MAX_USER_ADDRESS: usize = 0x0000_7FFF_FFFF_FFFF;

/// Source of forwarding information
pub trait Forwarding {
    /// New address of whatever lived at `old`, or `None` if it did not move
    fn forward(&self, old: usize) -> Option<usize>;
}

/// Forwarding entries keyed by old object start
#[derive(Debug, Clone, Default)]
pub struct ForwardingMap {
    /// old start -> (object size, new start)
    entries: BTreeMap<usize, (usize, usize)>,
}

impl ForwardingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the `size`-byte object at `old` moved to `new`
    ///
    /// # Validation
    /// - `size` is non-zero
    /// - `new` is non-null, aligned and in user space
    /// - the old span does not overlap an existing entry
    pub fn insert(&mut self, old: usize, size: usize, new: usize) -> Result<()> {
        let invalid = |reason: &str| StampError::InvalidForwarding {
            old,
            new,
            reason: reason.to_string(),
        };

        if size == 0 {
            return Err(invalid("object size is zero"));
        }
        if new == 0 {
            return Err(invalid("new address is null"));
        }
        if new % OBJECT_ALIGNMENT != 0 || old % OBJECT_ALIGNMENT != 0 {
            return Err(invalid("address is not object-aligned"));
        }
        if new > MAX_USER_ADDRESS {
            return Err(invalid("new address is outside user space"));
        }
        let old_end = old.checked_add(size).ok_or_else(|| invalid("old span overflows"))?;

        if let Some((&start, &(prev_size, _))) = self.entries.range(..old_end).next_back() {
            if start + prev_size > old {
                return Err(invalid("old span overlaps an existing entry"));
            }
        }

        self.entries.insert(old, (size, new));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Forwarding for ForwardingMap {
    fn forward(&self, old: usize) -> Option<usize> {
        let (&start, &(size, new)) = self.entries.range(..=old).next_back()?;
        let offset = old - start;
        (offset < size).then_some(new + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_start_and_interior() {
        let mut map = ForwardingMap::new();
        map.insert(0x1000, 32, 0x8000).unwrap();

        assert_eq!(map.forward(0x1000), Some(0x8000));
        assert_eq!(map.forward(0x1018), Some(0x8018));
        assert_eq!(map.forward(0x1020), None);
        assert_eq!(map.forward(0x0ff8), None);
    }

    #[test]
    fn test_insert_validation() {
        let mut map = ForwardingMap::new();
        assert!(map.insert(0x1000, 0, 0x8000).is_err());
        assert!(map.insert(0x1000, 16, 0).is_err());
        assert!(map.insert(0x1000, 16, 0x8004).is_err());
        assert!(map.insert(0x1000, 16, 0xFFFF_8000_0000_0000).is_err());

        map.insert(0x1000, 32, 0x8000).unwrap();
        let overlap = map.insert(0x1010, 16, 0x9000);
        assert!(matches!(overlap, Err(StampError::InvalidForwarding { .. })));
        assert!(map.insert(0x1020, 16, 0x9000).is_ok());
        assert_eq!(map.len(), 2);
    }
}
