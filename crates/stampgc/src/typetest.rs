//! Type-Test Generator - O(1) `is_a` per class
//!
//! Each class gets one of three strategies:
//!
//! | Strategy           | Test                                       |
//! |--------------------|--------------------------------------------|
//! | `Exact`            | `stamp == K`                               |
//! | `Range`            | `low <= stamp <= high`                     |
//! | `RangeWithConfirm` | range hit, else hull pre-filter + confirm  |
//!
//! `RangeWithConfirm` is chosen for classes that have implementers outside
//! their primary range, i.e. classes used as a secondary base. The hull
//! covers every such implementer's range, so stamps outside it are rejected
//! in O(1). Only stamps inside the hull walk the object's primary chain and
//! search the secondary closure of each ambiguous class on it.

use crate::object::ObjectHeader;
use crate::registry::StampRegistry;
use crate::stamp::{StampId, StampRange};
use crate::util::IndexVec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Test strategy for one class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum TypeTest {
    Exact { stamp: StampId },
    Range { range: StampRange },
    RangeWithConfirm { range: StampRange, hull: StampRange },
}

impl TypeTest {
    /// The primary part of the test; never gives a false positive
    #[inline]
    pub fn primary_hit(&self, stamp: StampId) -> bool {
        match *self {
            TypeTest::Exact { stamp: k } => stamp == k,
            TypeTest::Range { range } | TypeTest::RangeWithConfirm { range, .. } => {
                range.contains(stamp)
            }
        }
    }

    pub fn needs_confirm(&self) -> bool {
        matches!(self, TypeTest::RangeWithConfirm { .. })
    }
}

impl fmt::Display for TypeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTest::Exact { stamp } => write!(f, "exact {}", stamp),
            TypeTest::Range { range } => write!(f, "range {}", range),
            TypeTest::RangeWithConfirm { range, hull } => {
                write!(f, "range {} + confirm in {}", range, hull)
            }
        }
    }
}

/// Per-stamp data the confirming walk needs
#[derive(Debug, Clone, Default)]
struct ConfirmNode {
    parent: Option<StampId>,
    /// Sorted; empty unless the class is ambiguous
    secondary: Box<[StampId]>,
}

/// Slow-path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeTestStats {
    /// Stamps that fell into a hull and needed the walk
    pub confirm_checks: u64,
    /// Walks that found the class
    pub confirm_hits: u64,
}

/// Generated type tests for every registered class
#[derive(Debug)]
pub struct TypeTests {
    tests: IndexVec<StampId, Option<TypeTest>>,
    nodes: IndexVec<StampId, ConfirmNode>,
    confirm_checks: AtomicU64,
    confirm_hits: AtomicU64,
}

impl TypeTests {
    /// Generate tests from a built registry
    pub fn build(registry: &StampRegistry) -> Self {
        let len = registry.max_stamp().get() as usize + 1;
        let mut nodes: IndexVec<StampId, ConfirmNode> =
            IndexVec::from_elem_n(ConfirmNode::default(), len);
        let mut hulls: IndexVec<StampId, Option<StampRange>> = IndexVec::from_elem_n(None, len);

        for class in registry.iter() {
            nodes[class.stamp] = ConfirmNode {
                parent: class.parent,
                secondary: class.secondary_ancestors.clone().into_boxed_slice(),
            };
            for &target in &class.secondary_ancestors {
                let hull = &mut hulls[target];
                *hull = Some(match *hull {
                    Some(existing) => existing.hull(&class.range),
                    None => class.range,
                });
            }
        }

        let mut tests: IndexVec<StampId, Option<TypeTest>> = IndexVec::from_elem_n(None, len);
        for class in registry.iter() {
            let test = match hulls[class.stamp] {
                Some(hull) => TypeTest::RangeWithConfirm {
                    range: class.range,
                    hull,
                },
                None if class.is_leaf() => TypeTest::Exact { stamp: class.stamp },
                None => TypeTest::Range { range: class.range },
            };
            tests[class.stamp] = Some(test);
        }

        log::debug!(
            "type tests generated: {} classes, {} with confirmation",
            registry.len(),
            tests.iter().flatten().filter(|t| t.needs_confirm()).count()
        );

        Self {
            tests,
            nodes,
            confirm_checks: AtomicU64::new(0),
            confirm_hits: AtomicU64::new(0),
        }
    }

    /// Strategy chosen for `target`
    pub fn strategy(&self, target: StampId) -> Option<TypeTest> {
        self.tests.get(target).copied().flatten()
    }

    /// Direct predicate for hot call sites
    pub fn predicate(&self, target: StampId) -> Option<TypePredicate<'_>> {
        self.strategy(target).map(|test| TypePredicate {
            target,
            test,
            tests: self,
        })
    }

    /// Is an object with stamp `stamp` an instance of `target`
    ///
    /// Unregistered targets match nothing.
    pub fn is_a(&self, stamp: StampId, target: StampId) -> bool {
        match self.strategy(target) {
            Some(test) => self.run(test, target, stamp),
            None => false,
        }
    }

    /// `is_a` on the object at `address`
    ///
    /// # Safety
    ///
    /// `address` must point to a live object starting with an `ObjectHeader`.
    pub unsafe fn is_a_object(&self, address: usize, target: StampId) -> bool {
        self.is_a(ObjectHeader::read_stamp(address), target)
    }

    pub fn stats(&self) -> TypeTestStats {
        TypeTestStats {
            confirm_checks: self.confirm_checks.load(Ordering::Relaxed),
            confirm_hits: self.confirm_hits.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn run(&self, test: TypeTest, target: StampId, stamp: StampId) -> bool {
        if test.primary_hit(stamp) {
            return true;
        }
        match test {
            TypeTest::RangeWithConfirm { hull, .. } if hull.contains(stamp) => {
                self.confirm(stamp, target)
            }
            _ => false,
        }
    }

    /// Walk the primary chain of `stamp` looking for `target` among the
    /// secondary ancestors of each class on it
    #[cold]
    fn confirm(&self, stamp: StampId, target: StampId) -> bool {
        self.confirm_checks.fetch_add(1, Ordering::Relaxed);

        let mut current = Some(stamp);
        while let Some(class) = current {
            let Some(node) = self.nodes.get(class) else {
                return false;
            };
            if node.secondary.binary_search(&target).is_ok() {
                self.confirm_hits.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            current = node.parent;
        }
        false
    }
}

/// Copyable `is_a` predicate bound to one target class
#[derive(Debug, Clone, Copy)]
pub struct TypePredicate<'a> {
    target: StampId,
    test: TypeTest,
    tests: &'a TypeTests,
}

impl<'a> TypePredicate<'a> {
    pub fn target(&self) -> StampId {
        self.target
    }

    pub fn test(&self) -> TypeTest {
        self.test
    }

    #[inline]
    pub fn matches(&self, stamp: StampId) -> bool {
        self.tests.run(self.test, self.target, stamp)
    }

    /// # Safety
    ///
    /// `address` must point to a live object starting with an `ObjectHeader`.
    #[inline]
    pub unsafe fn matches_object(&self, address: usize) -> bool {
        self.matches(ObjectHeader::read_stamp(address))
    }
}
