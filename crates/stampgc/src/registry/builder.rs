//! Registry construction: numbering, validation and ambiguity detection
//!
//! Two input shapes are accepted:
//!
//! 1. **Unnumbered** declarations: stamps are assigned by pre-order
//!    traversal of the primary forest (roots and children in declaration
//!    order), so every subtree is one contiguous range.
//! 2. **Pre-numbered** declarations from the build-time layout tool: the
//!    given stamps and ranges are validated instead of renumbered.
//!
//! Mixing both shapes in one registry is rejected.

use crate::config::{AmbiguityPolicy, MetadataConfig};
use crate::error::{Result, StampError};
use crate::registry::{ClassDescriptor, ClassKind, StampRegistry};
use crate::stamp::{StampId, StampRange};
use crate::util::IndexVec;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Module name used when a declaration does not name one
pub const DEFAULT_MODULE: &str = "core";

/// Declaration of one class as handed to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    pub module: String,
    pub parent: Option<String>,
    pub secondary: Vec<String>,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub size: usize,
    /// Explicit ambiguity annotation; can only force the flag on
    pub ambiguous: bool,
    /// Stamp and range supplied by the layout tool
    pub numbering: Option<(StampId, StampRange)>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: DEFAULT_MODULE.to_string(),
            parent: None,
            secondary: Vec::new(),
            kind: ClassKind::Plain,
            is_abstract: false,
            size: 0,
            ambiguous: false,
            numbering: None,
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn secondary(mut self, base: impl Into<String>) -> Self {
        self.secondary.push(base.into());
        self
    }

    pub fn kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn ambiguous(mut self) -> Self {
        self.ambiguous = true;
        self
    }

    /// Can objects of this class exist
    pub fn is_instantiable(&self) -> bool {
        !self.is_abstract && self.kind != ClassKind::AbstractMixin
    }

    pub fn numbered(mut self, stamp: StampId, range: StampRange) -> Self {
        self.numbering = Some((stamp, range));
        self
    }
}

/// Collects declarations and builds a [`StampRegistry`]
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    policy: AmbiguityPolicy,
    max_stamp: u32,
    decls: Vec<ClassDecl>,
}

impl RegistryBuilder {
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            policy: config.ambiguity_policy,
            max_stamp: config.max_stamp,
            decls: Vec::new(),
        }
    }

    pub fn declare(&mut self, decl: ClassDecl) -> &mut Self {
        self.decls.push(decl);
        self
    }

    /// Declare a batch of classes on behalf of `module`
    pub fn declare_module(
        &mut self,
        module: &str,
        decls: impl IntoIterator<Item = ClassDecl>,
    ) -> &mut Self {
        self.decls
            .extend(decls.into_iter().map(|decl| decl.module(module)));
        self
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Validate the declarations and build the registry
    pub fn build(self) -> Result<StampRegistry> {
        let decls = self.decls;
        let graph = Graph::resolve(&decls)?;
        let order = graph.supers_first(&decls)?;

        let numbering = number_classes(&decls, &graph, self.max_stamp)?;
        let stamp_of = |i: usize| numbering[i].0;

        // Secondary closure, supers before subclasses
        let mut all_supers: Vec<BTreeSet<StampId>> = vec![BTreeSet::new(); decls.len()];
        let mut secondary_ancestors: Vec<Vec<StampId>> = vec![Vec::new(); decls.len()];
        let mut ambiguous = vec![false; decls.len()];

        for &i in &order {
            let decl = &decls[i];

            let mut inherited = BTreeSet::new();
            if let Some(p) = graph.parents[i] {
                inherited.extend(all_supers[p].iter().copied());
                inherited.insert(stamp_of(p));
            }

            let mut own = BTreeSet::new();
            let mut contributing = None;
            for &b in &graph.secondaries[i] {
                if inherited.contains(&stamp_of(b)) {
                    log::warn!(
                        "class `{}` lists `{}` as a secondary base but already inherits it",
                        decl.name,
                        decls[b].name
                    );
                    continue;
                }
                contributing.get_or_insert(b);
                own.insert(stamp_of(b));
                own.extend(all_supers[b].iter().copied());
            }

            let closure: Vec<StampId> = own.difference(&inherited).copied().collect();
            let derived = !closure.is_empty();

            if derived && !decl.ambiguous && self.policy == AmbiguityPolicy::ExplicitOnly {
                let base = contributing.map_or_else(String::new, |b| decls[b].name.clone());
                return Err(StampError::UndeclaredAmbiguity {
                    class: decl.name.clone(),
                    base,
                });
            }
            if decl.ambiguous && !derived {
                log::warn!(
                    "class `{}` is annotated ambiguous but has no secondary base",
                    decl.name
                );
            }

            ambiguous[i] = derived || decl.ambiguous;
            secondary_ancestors[i] = closure;
            inherited.extend(own);
            all_supers[i] = inherited;
        }

        let mut classes: IndexVec<StampId, Option<ClassDescriptor>> = IndexVec::new();
        let mut by_name = FxHashMap::default();
        classes.ensure_contains_elem(StampId::NONE, || None);

        for (i, decl) in decls.iter().enumerate() {
            let (stamp, range) = numbering[i];
            let descriptor = ClassDescriptor {
                name: decl.name.clone(),
                module: decl.module.clone(),
                stamp,
                range,
                kind: decl.kind,
                is_abstract: decl.is_abstract,
                size: decl.size,
                ambiguous: ambiguous[i],
                parent: graph.parents[i].map(stamp_of),
                secondary: graph.secondaries[i].iter().map(|&b| stamp_of(b)).collect(),
                secondary_ancestors: std::mem::take(&mut secondary_ancestors[i]),
            };
            *classes.ensure_contains_elem(stamp, || None) = Some(descriptor);
            by_name.insert(decl.name.clone(), stamp);
        }

        log::debug!(
            "stamp registry built: {} classes, {} ambiguous",
            decls.len(),
            ambiguous.iter().filter(|&&a| a).count()
        );

        Ok(StampRegistry::from_parts(classes, by_name))
    }
}

/// Declarations resolved to indices
struct Graph {
    parents: Vec<Option<usize>>,
    secondaries: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl Graph {
    fn resolve(decls: &[ClassDecl]) -> Result<Self> {
        let mut index: FxHashMap<&str, usize> = FxHashMap::default();
        for (i, decl) in decls.iter().enumerate() {
            if index.insert(decl.name.as_str(), i).is_some() {
                return Err(StampError::DuplicateClass {
                    name: decl.name.clone(),
                });
            }
        }

        let find = |name: &str, referenced_by: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| StampError::UnknownClass {
                    name: name.to_string(),
                    referenced_by: referenced_by.to_string(),
                })
        };

        let mut parents = Vec::with_capacity(decls.len());
        let mut secondaries = Vec::with_capacity(decls.len());
        let mut children = vec![Vec::new(); decls.len()];
        let mut roots = Vec::new();

        for (i, decl) in decls.iter().enumerate() {
            let parent = match &decl.parent {
                Some(name) => Some(find(name, &decl.name)?),
                None => None,
            };
            match parent {
                Some(p) => children[p].push(i),
                None => roots.push(i),
            }
            parents.push(parent);

            let bases = decl
                .secondary
                .iter()
                .map(|name| find(name, &decl.name))
                .collect::<Result<Vec<_>>>()?;
            secondaries.push(bases);
        }

        Ok(Self {
            parents,
            secondaries,
            children,
            roots,
        })
    }

    /// Post-order over parent and secondary edges; fails on cycles
    fn supers_first(&self, decls: &[ClassDecl]) -> Result<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        let edges: Vec<Vec<usize>> = (0..decls.len())
            .map(|i| {
                self.parents[i]
                    .into_iter()
                    .chain(self.secondaries[i].iter().copied())
                    .collect()
            })
            .collect();

        let mut marks = vec![Mark::Unvisited; decls.len()];
        let mut order = Vec::with_capacity(decls.len());

        for start in 0..decls.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::Active;
            let mut stack = vec![(start, 0usize)];

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                match edges[node].get(next) {
                    Some(&succ) => {
                        frame.1 += 1;
                        match marks[succ] {
                            Mark::Active => {
                                return Err(StampError::InheritanceCycle {
                                    class: decls[succ].name.clone(),
                                })
                            }
                            Mark::Unvisited => {
                                marks[succ] = Mark::Active;
                                stack.push((succ, 0));
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        order.push(node);
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }
}

fn number_classes(
    decls: &[ClassDecl],
    graph: &Graph,
    max_stamp: u32,
) -> Result<Vec<(StampId, StampRange)>> {
    let Some(first) = decls.first() else {
        return Ok(Vec::new());
    };

    let first_numbered = first.numbering.is_some();
    if let Some(odd) = decls
        .iter()
        .find(|decl| decl.numbering.is_some() != first_numbered)
    {
        return Err(StampError::MixedNumbering {
            class: odd.name.clone(),
        });
    }

    if first_numbered {
        let numbering: Vec<_> = decls.iter().filter_map(|decl| decl.numbering).collect();
        validate_numbering(decls, graph, &numbering, max_stamp)?;
        Ok(numbering)
    } else {
        let numbering = assign_preorder(decls.len(), graph);
        if let Some((i, &(stamp, _))) = numbering
            .iter()
            .enumerate()
            .find(|(_, (stamp, _))| stamp.get() > max_stamp)
        {
            return Err(StampError::StampOutOfRange {
                class: decls[i].name.clone(),
                stamp,
                max: max_stamp,
            });
        }
        Ok(numbering)
    }
}

fn assign_preorder(len: usize, graph: &Graph) -> Vec<(StampId, StampRange)> {
    enum Visit {
        Enter(usize),
        Exit(usize),
    }

    let mut out = vec![(StampId::NONE, StampRange::leaf(StampId::NONE)); len];
    let mut next = StampId::FIRST;
    let mut stack: Vec<Visit> = graph.roots.iter().rev().map(|&r| Visit::Enter(r)).collect();

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(i) => {
                out[i].0 = next;
                next = next.next();
                stack.push(Visit::Exit(i));
                stack.extend(graph.children[i].iter().rev().map(|&c| Visit::Enter(c)));
            }
            Visit::Exit(i) => {
                out[i].1 = StampRange::new(out[i].0, StampId(next.get() - 1));
            }
        }
    }

    out
}

fn validate_numbering(
    decls: &[ClassDecl],
    graph: &Graph,
    numbering: &[(StampId, StampRange)],
    max_stamp: u32,
) -> Result<()> {
    let name_of = |i: Option<usize>| i.map_or_else(|| "<none>".to_string(), |i| decls[i].name.clone());

    let mut owners: FxHashMap<StampId, usize> = FxHashMap::default();
    for (i, decl) in decls.iter().enumerate() {
        let (stamp, range) = numbering[i];
        if stamp.is_none() {
            return Err(StampError::ReservedStamp {
                class: decl.name.clone(),
            });
        }
        if range.high.get() > max_stamp || stamp.get() > max_stamp {
            return Err(StampError::StampOutOfRange {
                class: decl.name.clone(),
                stamp: StampId(range.high.get().max(stamp.get())),
                max: max_stamp,
            });
        }
        if !range.is_well_formed() || range.low != stamp {
            return Err(StampError::InvalidRange {
                class: decl.name.clone(),
                stamp,
                range,
            });
        }
        if let Some(&prev) = owners.get(&stamp) {
            return Err(StampError::OverlappingStamps {
                stamp,
                first: decls[prev].name.clone(),
                first_module: decls[prev].module.clone(),
                second: decl.name.clone(),
                second_module: decl.module.clone(),
            });
        }
        owners.insert(stamp, i);
    }

    // Laminar sweep: ranges sorted by low, widest first
    let mut sorted: Vec<usize> = (0..decls.len()).collect();
    sorted.sort_by_key(|&i| (numbering[i].1.low, Reverse(numbering[i].1.high)));

    let mut open: Vec<usize> = Vec::new();
    for &i in &sorted {
        let range = numbering[i].1;
        while open
            .last()
            .is_some_and(|&top| numbering[top].1.high < range.low)
        {
            open.pop();
        }

        let enclosing = open.last().copied();
        if let Some(top) = enclosing {
            if !numbering[top].1.contains_range(&range) {
                return Err(StampError::OverlappingRanges {
                    first: decls[top].name.clone(),
                    first_range: numbering[top].1,
                    second: decls[i].name.clone(),
                    second_range: range,
                });
            }
        }
        if enclosing != graph.parents[i] {
            return Err(StampError::RangeNotNested {
                class: decls[i].name.clone(),
                enclosing: name_of(enclosing),
                parent: name_of(graph.parents[i]),
            });
        }
        open.push(i);
    }

    // Every stamp of a range belongs to a primary descendant
    for (i, decl) in decls.iter().enumerate() {
        let (stamp, range) = numbering[i];
        let mut children: Vec<StampRange> =
            graph.children[i].iter().map(|&c| numbering[c].1).collect();
        children.sort_by_key(|child| child.low);

        let mut expected = stamp.next();
        for child in children {
            if child.low != expected {
                return Err(StampError::InvalidRange {
                    class: decl.name.clone(),
                    stamp,
                    range,
                });
            }
            expected = child.high.next();
        }
        if range.high.next() != expected {
            return Err(StampError::InvalidRange {
                class: decl.name.clone(),
                stamp,
                range,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(decls: Vec<ClassDecl>) -> Result<StampRegistry> {
        build_with(decls, &MetadataConfig::default())
    }

    fn build_with(decls: Vec<ClassDecl>, config: &MetadataConfig) -> Result<StampRegistry> {
        let mut builder = RegistryBuilder::new(config);
        for decl in decls {
            builder.declare(decl);
        }
        builder.build()
    }

    fn numbered(name: &str, low: u32, high: u32) -> ClassDecl {
        ClassDecl::new(name).numbered(StampId(low), StampRange::new(StampId(low), StampId(high)))
    }

    #[test]
    fn test_preorder_numbering() {
        let registry = build(vec![
            ClassDecl::new("Object").abstract_class(),
            ClassDecl::new("Number").parent("Object").abstract_class(),
            ClassDecl::new("String").parent("Object"),
            ClassDecl::new("Integer").parent("Number"),
            ClassDecl::new("HashTable").parent("Object"),
        ])
        .unwrap();

        let range = |name: &str| registry.range_of(name).unwrap().to_string();
        assert_eq!(range("Object"), "[1, 5]");
        assert_eq!(range("Number"), "[2, 3]");
        assert_eq!(range("Integer"), "[3, 3]");
        assert_eq!(range("String"), "[4, 4]");
        assert_eq!(range("HashTable"), "[5, 5]");
    }

    #[test]
    fn test_forest_roots_in_declaration_order() {
        let registry = build(vec![
            ClassDecl::new("Object"),
            ClassDecl::new("Sequence").kind(ClassKind::AbstractMixin),
            ClassDecl::new("Cons").parent("Object"),
        ])
        .unwrap();
        assert_eq!(registry.lookup("Object"), Some(StampId(1)));
        assert_eq!(registry.lookup("Cons"), Some(StampId(2)));
        assert_eq!(registry.lookup("Sequence"), Some(StampId(3)));
    }

    #[test]
    fn test_duplicate_and_unknown_classes() {
        let dup = build(vec![ClassDecl::new("A"), ClassDecl::new("A")]);
        assert!(matches!(dup, Err(StampError::DuplicateClass { .. })));

        let unknown = build(vec![ClassDecl::new("A").parent("Missing")]);
        match unknown {
            Err(StampError::UnknownClass {
                name,
                referenced_by,
            }) => {
                assert_eq!(name, "Missing");
                assert_eq!(referenced_by, "A");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cycle_through_secondary_base() {
        let result = build(vec![
            ClassDecl::new("A").secondary("B"),
            ClassDecl::new("B").parent("A"),
        ]);
        assert!(matches!(result, Err(StampError::InheritanceCycle { .. })));
    }

    #[test]
    fn test_secondary_base_marks_ambiguous() {
        let registry = build(vec![
            ClassDecl::new("Object"),
            ClassDecl::new("Function").parent("Object").abstract_class(),
            ClassDecl::new("Instance").parent("Object"),
            ClassDecl::new("FuncallableInstance")
                .parent("Instance")
                .secondary("Function"),
        ])
        .unwrap();

        let fin = registry.class("FuncallableInstance").unwrap();
        let function = registry.lookup("Function").unwrap();
        assert!(fin.ambiguous);
        // Object is inherited through the primary path as well
        assert_eq!(fin.secondary_ancestors, vec![function]);
        assert!(!registry.class("Instance").unwrap().ambiguous);
    }

    #[test]
    fn test_redundant_secondary_base_is_not_ambiguous() {
        let registry = build(vec![
            ClassDecl::new("Object"),
            ClassDecl::new("Cons").parent("Object").secondary("Object"),
        ])
        .unwrap();
        assert!(!registry.class("Cons").unwrap().ambiguous);
    }

    #[test]
    fn test_explicit_policy_requires_annotation() {
        let config = MetadataConfig {
            ambiguity_policy: AmbiguityPolicy::ExplicitOnly,
            ..Default::default()
        };
        let decls = || {
            vec![
                ClassDecl::new("Object"),
                ClassDecl::new("Sequence").kind(ClassKind::AbstractMixin),
                ClassDecl::new("Cons").parent("Object").secondary("Sequence"),
            ]
        };

        match build_with(decls(), &config) {
            Err(StampError::UndeclaredAmbiguity { class, base }) => {
                assert_eq!(class, "Cons");
                assert_eq!(base, "Sequence");
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut annotated = decls();
        annotated[2] = annotated[2].clone().ambiguous();
        assert!(build_with(annotated, &config).is_ok());
    }

    #[test]
    fn test_forced_ambiguity() {
        let registry = build(vec![
            ClassDecl::new("Object"),
            ClassDecl::new("Weak").parent("Object").ambiguous(),
        ])
        .unwrap();
        let weak = registry.class("Weak").unwrap();
        assert!(weak.ambiguous);
        assert!(weak.secondary_ancestors.is_empty());
    }

    #[test]
    fn test_prenumbered_accepted() {
        let registry = build(vec![
            numbered("Object", 1, 5),
            numbered("Number", 2, 3).parent("Object"),
            numbered("Integer", 3, 3).parent("Number"),
            numbered("String", 4, 4).parent("Object"),
            numbered("HashTable", 5, 5).parent("Object"),
        ])
        .unwrap();
        assert_eq!(registry.lookup("String"), Some(StampId(4)));
    }

    #[test]
    fn test_overlapping_stamps_name_both_modules() {
        let result = build(vec![
            numbered("Object", 1, 2),
            numbered("Cons", 2, 2).parent("Object").module("core"),
            numbered("Weak", 2, 2).parent("Object").module("ext"),
        ]);
        match result {
            Err(StampError::OverlappingStamps {
                first,
                first_module,
                second,
                second_module,
                ..
            }) => {
                assert_eq!((first.as_str(), first_module.as_str()), ("Cons", "core"));
                assert_eq!((second.as_str(), second_module.as_str()), ("Weak", "ext"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_crossing_ranges_rejected() {
        let result = build(vec![
            numbered("A", 1, 3),
            numbered("B", 2, 4).parent("A"),
            numbered("C", 3, 3).parent("A"),
            numbered("D", 4, 4).parent("B"),
        ]);
        assert!(matches!(result, Err(StampError::OverlappingRanges { .. })));
    }

    #[test]
    fn test_range_enclosed_by_wrong_class() {
        let result = build(vec![
            numbered("Object", 1, 4),
            numbered("Number", 2, 3).parent("Object"),
            numbered("String", 3, 3).parent("Object"),
            numbered("Integer", 4, 4).parent("Number"),
        ]);
        assert!(matches!(result, Err(StampError::RangeNotNested { .. })));
    }

    #[test]
    fn test_range_gap_rejected() {
        let result = build(vec![numbered("Object", 1, 3), numbered("Cons", 2, 2).parent("Object")]);
        assert!(matches!(result, Err(StampError::InvalidRange { .. })));
    }

    #[test]
    fn test_reserved_and_mixed_numbering() {
        let reserved = build(vec![numbered("Object", 0, 0)]);
        assert!(matches!(reserved, Err(StampError::ReservedStamp { .. })));

        let mixed = build(vec![numbered("Object", 1, 2), ClassDecl::new("Cons").parent("Object")]);
        match mixed {
            Err(StampError::MixedNumbering { class }) => assert_eq!(class, "Cons"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stamp_above_limit_rejected() {
        match build(vec![numbered("Object", u32::MAX, u32::MAX)]) {
            Err(StampError::StampOutOfRange { class, stamp, max }) => {
                assert_eq!(class, "Object");
                assert_eq!(stamp, StampId(u32::MAX));
                assert_eq!(max, MetadataConfig::default().max_stamp);
            }
            other => panic!("unexpected {other:?}"),
        }

        let config = MetadataConfig {
            max_stamp: 4,
            ..Default::default()
        };
        let wide = build_with(
            vec![numbered("Object", 1, 5), numbered("Cons", 2, 5).parent("Object")],
            &config,
        );
        assert!(matches!(wide, Err(StampError::StampOutOfRange { .. })));
    }

    #[test]
    fn test_preorder_respects_limit() {
        let config = MetadataConfig {
            max_stamp: 2,
            ..Default::default()
        };
        let decls = vec![
            ClassDecl::new("Object"),
            ClassDecl::new("Cons").parent("Object"),
            ClassDecl::new("Symbol").parent("Object"),
        ];
        match build_with(decls, &config) {
            Err(StampError::StampOutOfRange { class, stamp, .. }) => {
                assert_eq!(class, "Symbol");
                assert_eq!(stamp, StampId(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_declare_module_sets_origin() {
        let mut builder = RegistryBuilder::new(&MetadataConfig::default());
        builder.declare_module("streams", [ClassDecl::new("Stream"), ClassDecl::new("FileStream").parent("Stream")]);
        let registry = builder.build().unwrap();
        assert_eq!(registry.class("FileStream").unwrap().module, "streams");
    }
}
