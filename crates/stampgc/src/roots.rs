//! Global Root Table - process-wide static slots referencing the heap
//!
//! Runtime modules register their static reference slots during
//! initialization; registration closes when the table is frozen. After
//! that the slot set never changes.
//!
//! # Root Kinds
//!
//! - **Owning** - slot holds an untagged address (or 0)
//! - **Tagged** - slot holds a tagged word; only the address payload is
//!   rewritten on relocation, every tag bit is preserved
//!
//! Fix-up is unconditional and visits every slot on each relocating
//! cycle. Slots are independent, so the visiting order carries no meaning.

use crate::error::{Result, StampError};
use crate::logging::{log_event, MetadataEvent};
use crate::object::TagScheme;
use crate::relocate::{fix_owning_slot, fix_tagged_slot, Forwarding};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What a root slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    Owning,
    Tagged,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Owning => write!(f, "owning"),
            RootKind::Tagged => write!(f, "tagged"),
        }
    }
}

/// One static location holding a heap reference
#[derive(Debug, Clone, Copy)]
pub struct GlobalRootSlot {
    /// Diagnostic name
    pub name: &'static str,
    pub location: &'static AtomicUsize,
    pub kind: RootKind,
}

impl GlobalRootSlot {
    /// Address of the slot itself
    pub fn address(&self) -> usize {
        self.location as *const AtomicUsize as usize
    }

    /// Current word stored in the slot
    pub fn load(&self) -> usize {
        self.location.load(Ordering::Acquire)
    }
}

/// Fix-up counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RootFixupStats {
    pub visited: usize,
    pub updated: usize,
}

/// Collects root slots until the table is built
#[derive(Debug, Default)]
pub struct RootTableBuilder {
    slots: Vec<GlobalRootSlot>,
    seen: FxHashSet<usize>,
}

impl RootTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot; the same location may only be registered once
    pub fn add(
        &mut self,
        name: &'static str,
        location: &'static AtomicUsize,
        kind: RootKind,
    ) -> Result<&mut Self> {
        let slot = GlobalRootSlot {
            name,
            location,
            kind,
        };
        if !self.seen.insert(slot.address()) {
            return Err(StampError::DuplicateRoot {
                name: name.to_string(),
                address: slot.address(),
            });
        }
        log::trace!("root `{}` ({}) at {:#x}", name, kind, slot.address());
        self.slots.push(slot);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn build(self, scheme: TagScheme) -> GlobalRootTable {
        GlobalRootTable {
            slots: self.slots.into_boxed_slice(),
            scheme,
        }
    }
}

/// Frozen set of global root slots
#[derive(Debug)]
pub struct GlobalRootTable {
    slots: Box<[GlobalRootSlot]>,
    scheme: TagScheme,
}

impl GlobalRootTable {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlobalRootSlot> + '_ {
        self.slots.iter()
    }

    pub fn tag_scheme(&self) -> &TagScheme {
        &self.scheme
    }

    /// Call `f` with every slot that currently references an object, and
    /// the object's address
    ///
    /// Null slots and tagged slots holding immediates are skipped.
    pub fn enumerate(&self, mut f: impl FnMut(&GlobalRootSlot, usize)) {
        for slot in self.slots.iter() {
            let word = slot.load();
            let address = match slot.kind {
                RootKind::Owning if word != 0 => word,
                RootKind::Tagged if self.scheme.is_pointer(word) => self.scheme.address(word),
                _ => continue,
            };
            f(slot, address);
        }
    }

    /// Rewrite every slot whose referent moved
    ///
    /// Must run while no mutator touches the slots. A slot that cannot be
    /// rewritten keeps its old word; the remaining slots are still fixed and
    /// the first error is returned afterwards.
    pub fn fixup(&self, forwarding: &(impl Forwarding + ?Sized)) -> Result<RootFixupStats> {
        let mut stats = RootFixupStats::default();
        let mut first_error = None;
        for slot in self.slots.iter() {
            stats.visited += 1;
            let ptr = slot.location.as_ptr();
            // SAFETY: `location` is a live `'static` atomic; the collector
            // holds the world stopped during fix-up.
            let updated = unsafe {
                match slot.kind {
                    RootKind::Owning => Ok(fix_owning_slot(ptr, forwarding)),
                    RootKind::Tagged => fix_tagged_slot(ptr, &self.scheme, forwarding),
                }
            };
            match updated {
                Ok(true) => stats.updated += 1,
                Ok(false) => {}
                Err(err) => {
                    log::warn!("root `{}` not fixed up: {}", slot.name, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        log_event(MetadataEvent::RootsFixedUp {
            visited: stats.visited,
            updated: stats.updated,
        });
        match first_error {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    /// Clear every slot at shutdown
    pub fn teardown(&self) {
        for slot in self.slots.iter() {
            slot.location.store(0, Ordering::Release);
        }
        log_event(MetadataEvent::RootsTornDown {
            count: self.slots.len(),
        });
    }
}

#[derive(Default)]
struct StaticRoots {
    pending: RootTableBuilder,
    frozen: Option<Arc<GlobalRootTable>>,
}

lazy_static::lazy_static! {
    static ref STATIC_ROOTS: Mutex<StaticRoots> = Mutex::new(StaticRoots::default());
}

/// Register a static slot with the process-wide root table
///
/// Only valid during initialization, before [`freeze_static_roots`].
pub fn register_static_root(
    name: &'static str,
    location: &'static AtomicUsize,
    kind: RootKind,
) -> Result<()> {
    let mut roots = STATIC_ROOTS.lock();
    if roots.frozen.is_some() {
        return Err(StampError::RootTableFrozen {
            name: name.to_string(),
        });
    }
    roots.pending.add(name, location, kind)?;
    Ok(())
}

/// Close registration and return the process-wide root table
///
/// Later calls return the same table.
pub fn freeze_static_roots(scheme: TagScheme) -> Arc<GlobalRootTable> {
    let mut roots = STATIC_ROOTS.lock();
    if let Some(table) = &roots.frozen {
        if table.scheme != scheme {
            log::warn!("global root table already frozen with a different tag scheme");
        }
        return table.clone();
    }

    let table = Arc::new(std::mem::take(&mut roots.pending).build(scheme));
    log_event(MetadataEvent::RootsFrozen { count: table.len() });
    log::debug!("global root table frozen with {} slots", table.len());
    roots.frozen = Some(table.clone());
    table
}

/// The frozen process-wide root table, if any
pub fn static_roots() -> Option<Arc<GlobalRootTable>> {
    STATIC_ROOTS.lock().frozen.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocate::ForwardingMap;

    fn leak(word: usize) -> &'static AtomicUsize {
        Box::leak(Box::new(AtomicUsize::new(word)))
    }

    #[test]
    fn test_duplicate_location_rejected() {
        let slot = leak(0);
        let mut builder = RootTableBuilder::new();
        builder.add("nil", slot, RootKind::Owning).unwrap();
        let err = builder.add("nil-again", slot, RootKind::Tagged).unwrap_err();
        assert!(matches!(err, StampError::DuplicateRoot { .. }));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_enumerate_skips_null_and_immediates() {
        let mut builder = RootTableBuilder::new();
        builder
            .add("symbol-table", leak(0x1000), RootKind::Owning)
            .unwrap()
            .add("empty", leak(0), RootKind::Owning)
            .unwrap()
            .add("fixnum", leak(42 << 3), RootKind::Tagged)
            .unwrap()
            .add("package", leak(0x2000 | 0b011), RootKind::Tagged)
            .unwrap();
        let table = builder.build(TagScheme::default());

        let mut seen = Vec::new();
        table.enumerate(|slot, address| seen.push((slot.name, address)));
        assert_eq!(seen, vec![("symbol-table", 0x1000), ("package", 0x2000)]);
    }

    #[test]
    fn test_fixup_preserves_tags() {
        let owning = leak(0x1008);
        let tagged = leak(0x1000 | 0b101);
        let unmoved = leak(0x4000);
        let mut builder = RootTableBuilder::new();
        builder
            .add("owning", owning, RootKind::Owning)
            .unwrap()
            .add("tagged", tagged, RootKind::Tagged)
            .unwrap()
            .add("unmoved", unmoved, RootKind::Owning)
            .unwrap();
        let table = builder.build(TagScheme::default());

        let mut forwarding = ForwardingMap::new();
        forwarding.insert(0x1000, 32, 0x8000).unwrap();

        let stats = table.fixup(&forwarding).unwrap();
        assert_eq!(stats, RootFixupStats { visited: 3, updated: 2 });
        assert_eq!(owning.load(Ordering::Relaxed), 0x8008);
        assert_eq!(tagged.load(Ordering::Relaxed), 0x8000 | 0b101);
        assert_eq!(unmoved.load(Ordering::Relaxed), 0x4000);
    }

    #[test]
    fn test_fixup_continues_past_collision() {
        struct Shifted;
        impl Forwarding for Shifted {
            fn forward(&self, old: usize) -> Option<usize> {
                match old {
                    0x1000 => Some(0x1004),
                    0x2000 => Some(0x9000),
                    _ => None,
                }
            }
        }

        let colliding = leak(0x1001);
        let owning = leak(0x2000);
        let mut builder = RootTableBuilder::new();
        builder
            .add("colliding", colliding, RootKind::Tagged)
            .unwrap()
            .add("owning", owning, RootKind::Owning)
            .unwrap();
        let table = builder.build(TagScheme::default());

        let err = table.fixup(&Shifted).unwrap_err();
        assert!(matches!(err, StampError::TagCollision { .. }));
        assert_eq!(colliding.load(Ordering::Relaxed), 0x1001);
        assert_eq!(owning.load(Ordering::Relaxed), 0x9000);
    }

    #[test]
    fn test_teardown_clears_slots() {
        let slot = leak(0x1000);
        let mut builder = RootTableBuilder::new();
        builder.add("t", slot, RootKind::Owning).unwrap();
        let table = builder.build(TagScheme::default());
        table.teardown();
        assert_eq!(slot.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_static_registration_closes_on_freeze() {
        static FEATURES: AtomicUsize = AtomicUsize::new(0x3000);
        static LATE: AtomicUsize = AtomicUsize::new(0);

        register_static_root("features", &FEATURES, RootKind::Owning).unwrap();
        let table = freeze_static_roots(TagScheme::default());
        assert!(table.iter().any(|slot| slot.name == "features"));

        let err = register_static_root("late", &LATE, RootKind::Owning).unwrap_err();
        assert!(matches!(err, StampError::RootTableFrozen { .. }));
        assert!(Arc::ptr_eq(&table, &freeze_static_roots(TagScheme::default())));
        assert!(static_roots().is_some());
    }
}
