//! GC Metadata - every table the collector consults, built in one pass
//!
//! [`MetadataBuilder`] takes one [`ClassSpec`] per class (declaration,
//! optional layout, optional dispatch policies), validates everything and
//! produces an immutable [`GcMetadata`]. The result can be installed as the
//! process-wide instance exactly once.
//!
//! Build order:
//!
//! ```text
//! config ──► registry ──┬─► scan table
//!                       ├─► type tests
//!                       └─► finalize / deallocate tables ──► pairing check
//! ```

use crate::config::MetadataConfig;
use crate::dispatch::{verify_paired, DispatchPolicy, DispatchTable, Outcome, Phase};
use crate::error::{Result, StampError};
use crate::layout::{LayoutSpec, ReferenceVisitor, ScanDescriptor, ScanTable};
use crate::logging::{log_event, set_console_output, MetadataEvent};
use crate::object::{ObjectHeader, HEADER_SIZE};
use crate::registry::{ClassDecl, ClassDescriptor, ClassKind, RegistryBuilder, StampRegistry};
use crate::stamp::StampId;
use crate::typetest::{TypePredicate, TypeTest, TypeTestStats, TypeTests};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::OnceLock;

/// Full description of one class
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub decl: ClassDecl,
    /// Field layout; instantiable classes without one are header-only
    pub layout: Option<LayoutSpec>,
    /// `None` selects the default for the class's kind
    pub finalize: Option<DispatchPolicy>,
    pub deallocate: Option<DispatchPolicy>,
}

impl ClassSpec {
    pub fn new(decl: ClassDecl) -> Self {
        Self {
            decl,
            layout: None,
            finalize: None,
            deallocate: None,
        }
    }

    pub fn layout(mut self, layout: LayoutSpec) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn finalize(mut self, policy: DispatchPolicy) -> Self {
        self.finalize = Some(policy);
        self
    }

    pub fn deallocate(mut self, policy: DispatchPolicy) -> Self {
        self.deallocate = Some(policy);
        self
    }
}

impl From<ClassDecl> for ClassSpec {
    fn from(decl: ClassDecl) -> Self {
        Self::new(decl)
    }
}

/// Default policy when a class does not name one
pub fn default_policy(class: &ClassDescriptor) -> DispatchPolicy {
    if class.is_abstract || class.kind != ClassKind::Plain {
        DispatchPolicy::Forbidden
    } else {
        DispatchPolicy::Trivial
    }
}

/// Collects class specs and builds [`GcMetadata`]
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    config: MetadataConfig,
    specs: Vec<ClassSpec>,
}

impl MetadataBuilder {
    pub fn new(config: MetadataConfig) -> Self {
        Self {
            config,
            specs: Vec::new(),
        }
    }

    pub fn class(&mut self, spec: impl Into<ClassSpec>) -> &mut Self {
        self.specs.push(spec.into());
        self
    }

    pub fn classes(&mut self, specs: impl IntoIterator<Item = ClassSpec>) -> &mut Self {
        self.specs.extend(specs);
        self
    }

    /// Add a batch of classes on behalf of `module`
    pub fn module(&mut self, module: &str, specs: impl IntoIterator<Item = ClassSpec>) -> &mut Self {
        self.specs.extend(specs.into_iter().map(|mut spec| {
            spec.decl = spec.decl.module(module);
            spec
        }));
        self
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Validate every declaration and build the tables
    pub fn build(self) -> Result<GcMetadata> {
        let config = self.config;
        config.validate()?;

        let mut registry_builder = RegistryBuilder::new(&config);
        let mut extras: FxHashMap<String, Extras> = FxHashMap::default();
        for spec in self.specs {
            let mut decl = spec.decl;
            if let Some(layout) = &spec.layout {
                if decl.size == 0 {
                    decl.size = layout.size;
                } else if decl.size != layout.size {
                    return Err(StampError::SizeMismatch {
                        class: decl.name,
                        declared: decl.size,
                        layout: layout.size,
                    });
                }
            } else if decl.size == 0 && decl.is_instantiable() {
                decl.size = HEADER_SIZE;
            }
            extras.insert(
                decl.name.clone(),
                Extras {
                    layout: spec.layout,
                    finalize: spec.finalize,
                    deallocate: spec.deallocate,
                },
            );
            registry_builder.declare(decl);
        }
        let registry = registry_builder.build()?;

        let mut scans = ScanTable::new(config.tag_scheme);
        let mut finalize = DispatchTable::new(Phase::Finalize);
        let mut deallocate = DispatchTable::new(Phase::Deallocate);

        for class in registry.iter() {
            log_event(MetadataEvent::ClassRegistered {
                name: class.name.clone(),
                stamp: class.stamp,
                range: class.range,
            });

            let extra = extras.remove(&class.name).unwrap_or_default();

            if class.is_instantiable() {
                let layout = match extra.layout {
                    Some(layout) => layout,
                    None => LayoutSpec::new(class.size),
                };
                let descriptor = ScanDescriptor::compile(&class.name, &layout, config.strict_layouts)?;
                scans.insert(class.stamp, descriptor);
            } else if extra.layout.is_some() {
                log::warn!("layout of non-instantiable class `{}` ignored", class.name);
            }

            let finalize_policy = resolve_policy(class, Phase::Finalize, extra.finalize)?;
            let deallocate_policy = resolve_policy(class, Phase::Deallocate, extra.deallocate)?;
            finalize.insert(class.stamp, &class.name, finalize_policy);
            deallocate.insert(class.stamp, &class.name, deallocate_policy);
        }

        verify_paired(&finalize, &deallocate)?;
        let type_tests = TypeTests::build(&registry);

        let metadata = GcMetadata {
            config,
            registry,
            type_tests,
            scans,
            finalize,
            deallocate,
        };

        for class in metadata.registry.iter().filter(|class| class.ambiguous) {
            log_event(MetadataEvent::AmbiguousClass {
                name: class.name.clone(),
                bases: class
                    .secondary_ancestors
                    .iter()
                    .filter_map(|&stamp| metadata.registry.descriptor(stamp))
                    .map(|base| base.name.clone())
                    .collect(),
            });
        }

        let summary = metadata.summary();
        log_event(MetadataEvent::MetadataBuilt {
            classes: summary.classes,
            ambiguous: summary.ambiguous,
            traced_slots: summary.traced_slots,
            routines: summary.routines,
        });
        log::debug!(
            "metadata built: {} classes, {} scan descriptors, {} routines",
            summary.classes,
            summary.scan_descriptors,
            summary.routines
        );

        Ok(metadata)
    }
}

#[derive(Default)]
struct Extras {
    layout: Option<LayoutSpec>,
    finalize: Option<DispatchPolicy>,
    deallocate: Option<DispatchPolicy>,
}

fn resolve_policy(
    class: &ClassDescriptor,
    phase: Phase,
    requested: Option<DispatchPolicy>,
) -> Result<DispatchPolicy> {
    match requested {
        None => Ok(default_policy(class)),
        Some(policy) if class.kind != ClassKind::Plain && !policy.is_forbidden() => {
            Err(StampError::ForbiddenKindPolicy {
                class: class.name.clone(),
                kind: class.kind,
                phase,
            })
        }
        Some(policy) => Ok(policy),
    }
}

/// Counts describing a built metadata set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetadataSummary {
    pub classes: usize,
    pub abstract_classes: usize,
    pub ambiguous: usize,
    pub max_stamp: StampId,
    pub scan_descriptors: usize,
    pub traced_slots: usize,
    pub routines: usize,
    pub forbidden: usize,
}

/// What [`GcMetadata::reclaim`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reclaimed {
    /// `None` when finalization had already run for this object
    pub finalize: Option<Outcome>,
    pub deallocate: Outcome,
}

/// Immutable metadata consulted by the collector and by runtime type tests
#[derive(Debug)]
pub struct GcMetadata {
    config: MetadataConfig,
    registry: StampRegistry,
    type_tests: TypeTests,
    scans: ScanTable,
    finalize: DispatchTable,
    deallocate: DispatchTable,
}

static INSTALLED: OnceLock<GcMetadata> = OnceLock::new();

impl GcMetadata {
    pub fn builder(config: MetadataConfig) -> MetadataBuilder {
        MetadataBuilder::new(config)
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    pub fn registry(&self) -> &StampRegistry {
        &self.registry
    }

    pub fn type_tests(&self) -> &TypeTests {
        &self.type_tests
    }

    pub fn scan_table(&self) -> &ScanTable {
        &self.scans
    }

    pub fn finalize_table(&self) -> &DispatchTable {
        &self.finalize
    }

    pub fn deallocate_table(&self) -> &DispatchTable {
        &self.deallocate
    }

    // === Queries ===

    /// Class owning `stamp`
    pub fn classify(&self, stamp: StampId) -> Result<&ClassDescriptor> {
        self.registry.classify(stamp)
    }

    pub fn lookup(&self, name: &str) -> Option<StampId> {
        self.registry.lookup(name)
    }

    pub fn type_test(&self, name: &str) -> Option<TypeTest> {
        self.type_tests.strategy(self.registry.lookup(name)?)
    }

    /// Type-test predicate for class `name`
    pub fn predicate(&self, name: &str) -> Option<TypePredicate<'_>> {
        self.type_tests.predicate(self.registry.lookup(name)?)
    }

    /// Is `stamp` an instance of class `target`; unknown names match nothing
    pub fn is_a(&self, stamp: StampId, target: &str) -> bool {
        self.registry
            .lookup(target)
            .is_some_and(|target| self.type_tests.is_a(stamp, target))
    }

    pub fn type_test_stats(&self) -> TypeTestStats {
        self.type_tests.stats()
    }

    // === Collector entry points ===

    /// Visit every traced reference of the object at `address`
    ///
    /// # Safety
    ///
    /// `address` must point to a live object starting with an
    /// `ObjectHeader`, not mutated during the scan.
    pub unsafe fn scan<V: ReferenceVisitor + ?Sized>(&self, address: usize, visitor: &mut V) -> Result<()> {
        self.scans.scan(address, visitor)
    }

    /// Run the finalize entry for the object at `address`
    ///
    /// # Safety
    ///
    /// `address` must point to a condemned object starting with an
    /// `ObjectHeader`.
    ///
    /// # Panics
    ///
    /// When the object's stamp is unregistered or its entry is forbidden.
    pub unsafe fn finalize(&self, address: usize) -> Outcome {
        let header = ObjectHeader::from_address(address);
        self.finalize.invoke(header.stamp(), address, header.origin())
    }

    /// Run the deallocate entry for the object at `address`
    ///
    /// # Safety
    ///
    /// Same contract as [`GcMetadata::finalize`].
    ///
    /// # Panics
    ///
    /// Same conditions as [`GcMetadata::finalize`].
    pub unsafe fn deallocate(&self, address: usize) -> Outcome {
        let header = ObjectHeader::from_address(address);
        self.deallocate.invoke(header.stamp(), address, header.origin())
    }

    /// Finalize (once) and then deallocate the object at `address`
    ///
    /// # Safety
    ///
    /// Same contract as [`GcMetadata::finalize`]. The object must not be
    /// used after this returns.
    pub unsafe fn reclaim(&self, address: usize) -> Reclaimed {
        let header = ObjectHeader::from_address(address);
        let stamp = header.stamp();
        let origin = header.origin();

        let finalize = if header.set_finalized() {
            None
        } else {
            Some(self.finalize.invoke(stamp, address, origin))
        };
        let deallocate = self.deallocate.invoke(stamp, address, origin);

        Reclaimed {
            finalize,
            deallocate,
        }
    }

    pub fn summary(&self) -> MetadataSummary {
        let routines = self
            .finalize
            .iter()
            .chain(self.deallocate.iter())
            .filter(|(_, policy)| policy.routine_name().is_some())
            .count();
        let forbidden = self
            .finalize
            .iter()
            .filter(|(_, policy)| policy.is_forbidden())
            .count();

        MetadataSummary {
            classes: self.registry.len(),
            abstract_classes: self.registry.iter().filter(|c| !c.is_instantiable()).count(),
            ambiguous: self.registry.iter().filter(|c| c.ambiguous).count(),
            max_stamp: self.registry.max_stamp(),
            scan_descriptors: self.scans.len(),
            traced_slots: self
                .scans
                .iter()
                .map(|(_, descriptor)| descriptor.traced_slot_count())
                .sum(),
            routines,
            forbidden,
        }
    }

    // === Process-wide instance ===

    /// Make this the process-wide metadata
    ///
    /// A verbose configuration turns on console echo of metadata events.
    pub fn install(self) -> Result<&'static GcMetadata> {
        let verbose = self.config.verbose;
        INSTALLED.set(self).map_err(|_| StampError::AlreadyInstalled)?;
        if verbose {
            set_console_output(true);
        }
        INSTALLED.get().ok_or(StampError::AlreadyInstalled)
    }

    /// The process-wide metadata, if installed
    pub fn installed() -> Option<&'static GcMetadata> {
        INSTALLED.get()
    }
}
