//! Dispatch Module - finalize and deallocate tables
//!
//! Two stamp-indexed tables, one per release phase. Every registered stamp
//! has exactly one policy per phase:
//!
//! - `Routine`: run type-specific cleanup, report [`Outcome::Handled`]
//! - `Trivial`: nothing to release, report [`Outcome::Trivial`]
//! - `Forbidden`: reaching it is a collector bug; aborts with a diagnostic
//!
//! Routines run under a global pause or on condemned objects. They must
//! not allocate managed memory or block, and a routine that panics takes
//! the collector down with it.

use crate::error::{Result, StampError};
use crate::logging::{log_event, MetadataEvent};
use crate::object::Origin;
use crate::stamp::StampId;
use crate::util::IndexVec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Release phase a table serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Finalize,
    Deallocate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Finalize => write!(f, "finalize"),
            Phase::Deallocate => write!(f, "deallocate"),
        }
    }
}

/// Object handed to a routine
///
/// Carries the most-derived identity so one routine body can serve several
/// classes and still run the right in-place cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTarget<'a> {
    pub stamp: StampId,
    pub class: &'a str,
    pub address: usize,
    pub origin: Origin,
}

type RoutineBody = dyn Fn(&DispatchTarget<'_>) + Send + Sync;

/// Named cleanup routine
#[derive(Clone)]
pub struct Routine {
    name: Arc<str>,
    body: Arc<RoutineBody>,
}

impl Routine {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&DispatchTarget<'_>) + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, target: &DispatchTarget<'_>) {
        (self.body)(target)
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Routine").field(&self.name).finish()
    }
}

/// What a table does for one stamp
#[derive(Debug, Clone)]
pub enum DispatchPolicy {
    Routine(Routine),
    Trivial,
    Forbidden,
}

impl DispatchPolicy {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DispatchPolicy::Forbidden)
    }

    pub fn routine_name(&self) -> Option<&str> {
        match self {
            DispatchPolicy::Routine(routine) => Some(routine.name()),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPolicy::Routine(routine) => write!(f, "routine `{}`", routine.name()),
            DispatchPolicy::Trivial => write!(f, "trivial"),
            DispatchPolicy::Forbidden => write!(f, "forbidden"),
        }
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A routine ran
    Handled,
    /// Nothing to release
    Trivial,
}

#[derive(Debug, Clone)]
struct DispatchEntry {
    class: Arc<str>,
    policy: DispatchPolicy,
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub handled: u64,
    pub trivial: u64,
}

/// Stamp-indexed table for one release phase
#[derive(Debug)]
pub struct DispatchTable {
    phase: Phase,
    entries: IndexVec<StampId, Option<DispatchEntry>>,
    handled: AtomicU64,
    trivial: AtomicU64,
}

impl DispatchTable {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            entries: IndexVec::new(),
            handled: AtomicU64::new(0),
            trivial: AtomicU64::new(0),
        }
    }

    pub(crate) fn insert(&mut self, stamp: StampId, class: &str, policy: DispatchPolicy) {
        *self.entries.ensure_contains_elem(stamp, || None) = Some(DispatchEntry {
            class: Arc::from(class),
            policy,
        });
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn policy(&self, stamp: StampId) -> Option<&DispatchPolicy> {
        self.entry(stamp).map(|entry| &entry.policy)
    }

    pub fn contains(&self, stamp: StampId) -> bool {
        self.entry(stamp).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(stamp, policy)` pairs in stamp order
    pub fn iter(&self) -> impl Iterator<Item = (StampId, &DispatchPolicy)> + '_ {
        self.entries
            .iter_enumerated()
            .filter_map(|(stamp, entry)| entry.as_ref().map(|e| (stamp, &e.policy)))
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            handled: self.handled.load(Ordering::Relaxed),
            trivial: self.trivial.load(Ordering::Relaxed),
        }
    }

    /// Run the policy for `stamp` on the object at `address`
    ///
    /// # Panics
    ///
    /// On a `Forbidden` entry or an unregistered stamp. Both mean the
    /// collector reached a state it must never reach.
    pub fn invoke(&self, stamp: StampId, address: usize, origin: Origin) -> Outcome {
        let Some(entry) = self.entry(stamp) else {
            log::error!("{} of unregistered stamp {} at {:#x}", self.phase, stamp, address);
            panic!("{} of unregistered stamp {}", self.phase, stamp);
        };

        match &entry.policy {
            DispatchPolicy::Routine(routine) => {
                log::trace!("{} `{}` via `{}` at {:#x}", self.phase, entry.class, routine.name(), address);
                routine.call(&DispatchTarget {
                    stamp,
                    class: &entry.class,
                    address,
                    origin,
                });
                self.handled.fetch_add(1, Ordering::Relaxed);
                Outcome::Handled
            }
            DispatchPolicy::Trivial => {
                self.trivial.fetch_add(1, Ordering::Relaxed);
                Outcome::Trivial
            }
            DispatchPolicy::Forbidden => {
                log::error!(
                    "forbidden {} of class `{}` (stamp {}) at {:#x}",
                    self.phase,
                    entry.class,
                    stamp,
                    address
                );
                log_event(MetadataEvent::ForbiddenDispatch {
                    phase: self.phase,
                    class: entry.class.to_string(),
                    stamp,
                });
                panic!(
                    "forbidden {} of class `{}` (stamp {})",
                    self.phase, entry.class, stamp
                );
            }
        }
    }

    #[inline]
    fn entry(&self, stamp: StampId) -> Option<&DispatchEntry> {
        self.entries.get(stamp).and_then(Option::as_ref)
    }
}

/// Check that both tables cover exactly the same stamps
pub fn verify_paired(finalize: &DispatchTable, deallocate: &DispatchTable) -> Result<()> {
    for (stamp, _) in finalize.iter() {
        if !deallocate.contains(stamp) {
            return Err(StampError::UnpairedDispatch {
                stamp,
                missing_from: deallocate.phase(),
            });
        }
    }
    for (stamp, _) in deallocate.iter() {
        if !finalize.contains(stamp) {
            return Err(StampError::UnpairedDispatch {
                stamp,
                missing_from: finalize.phase(),
            });
        }
    }
    Ok(())
}
