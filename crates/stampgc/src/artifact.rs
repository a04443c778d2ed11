//! Layout Artifact - the build-time layout tool's output
//!
//! The layout tool inspects the runtime's type declarations and emits one
//! JSON document per build:
//!
//! ```json
//! {
//!   "build_id": "2024-06-01+abc123",
//!   "classes": [
//!     { "name": "Object", "abstract": true, "finalize": "forbidden", "deallocate": "forbidden" },
//!     { "name": "Cons", "parent": "Object", "secondary": ["Sequence"], "size": 32,
//!       "fields": [ { "name": "car", "offset": 16, "kind": "tagged" },
//!                   { "name": "cdr", "offset": 24, "kind": "tagged" } ],
//!       "finalize": "trivial", "deallocate": { "routine": "free-cons" } }
//!   ]
//! }
//! ```
//!
//! Stamps and ranges are optional; when present they must be present on
//! every class. Routine names are bound to closures through
//! [`RoutineBindings`] when the artifact is loaded.

use crate::config::MetadataConfig;
use crate::dispatch::{DispatchPolicy, Routine};
use crate::error::{Result, StampError};
use crate::layout::{FieldDescriptor, LayoutSpec};
use crate::logging::{log_event, MetadataEvent};
use crate::metadata::{default_policy, ClassSpec, GcMetadata};
use crate::registry::builder::DEFAULT_MODULE;
use crate::registry::{ClassDecl, ClassDescriptor, ClassKind};
use crate::stamp::{StampId, StampRange};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Artifact format understood by this version
pub const FORMAT_VERSION: u32 = 1;

fn format_version() -> u32 {
    FORMAT_VERSION
}

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

/// Dispatch policy as written in an artifact
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRecord {
    /// Use the default for the class's kind
    #[default]
    Default,
    Trivial,
    Forbidden,
    Routine(String),
}

impl PolicyRecord {
    fn is_default(&self) -> bool {
        matches!(self, PolicyRecord::Default)
    }
}

impl From<&DispatchPolicy> for PolicyRecord {
    fn from(policy: &DispatchPolicy) -> Self {
        match policy {
            DispatchPolicy::Routine(routine) => PolicyRecord::Routine(routine.name().to_string()),
            DispatchPolicy::Trivial => PolicyRecord::Trivial,
            DispatchPolicy::Forbidden => PolicyRecord::Forbidden,
        }
    }
}

/// One class as written in an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    #[serde(default = "default_module")]
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<StampId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<StampRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub ambiguous: bool,
    #[serde(default)]
    pub size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "PolicyRecord::is_default")]
    pub finalize: PolicyRecord,
    #[serde(default, skip_serializing_if = "PolicyRecord::is_default")]
    pub deallocate: PolicyRecord,
}

impl ClassRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: default_module(),
            stamp: None,
            range: None,
            parent: None,
            secondary: Vec::new(),
            kind: ClassKind::Plain,
            is_abstract: false,
            ambiguous: false,
            size: 0,
            fields: Vec::new(),
            finalize: PolicyRecord::Default,
            deallocate: PolicyRecord::Default,
        }
    }

    fn numbering(&self) -> Option<(StampId, StampRange)> {
        match (self.stamp, self.range) {
            (Some(stamp), Some(range)) => Some((stamp, range)),
            (Some(stamp), None) => Some((stamp, StampRange::leaf(stamp))),
            (None, Some(range)) => Some((range.low, range)),
            (None, None) => None,
        }
    }

    fn to_decl(&self) -> ClassDecl {
        let mut decl = ClassDecl::new(&self.name).module(&self.module).kind(self.kind).size(self.size);
        if let Some(parent) = &self.parent {
            decl = decl.parent(parent);
        }
        for base in &self.secondary {
            decl = decl.secondary(base);
        }
        if self.is_abstract {
            decl = decl.abstract_class();
        }
        if self.ambiguous {
            decl = decl.ambiguous();
        }
        if let Some((stamp, range)) = self.numbering() {
            decl = decl.numbered(stamp, range);
        }
        decl
    }
}

/// How routine names in an artifact are turned into closures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// Every routine name must be bound
    #[default]
    Strict,
    /// Unbound names get a placeholder that aborts if ever invoked; for
    /// tools that only inspect the tables
    InspectOnly,
}

/// Routine names bound to closures
#[derive(Debug, Clone, Default)]
pub struct RoutineBindings {
    /// Kept in binding order for listings
    routines: IndexMap<String, Routine>,
    mode: BindingMode,
}

impl RoutineBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings that accept any routine name
    pub fn inspect_only() -> Self {
        Self {
            routines: IndexMap::new(),
            mode: BindingMode::InspectOnly,
        }
    }

    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    /// Bind `routine` under its own name
    pub fn bind(&mut self, routine: Routine) -> &mut Self {
        self.routines.insert(routine.name().to_string(), routine);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    /// Bound names, in binding order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.routines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    fn resolve(&self, class: &str, record: &PolicyRecord) -> Result<Option<DispatchPolicy>> {
        let name = match record {
            PolicyRecord::Default => return Ok(None),
            PolicyRecord::Trivial => return Ok(Some(DispatchPolicy::Trivial)),
            PolicyRecord::Forbidden => return Ok(Some(DispatchPolicy::Forbidden)),
            PolicyRecord::Routine(name) => name,
        };

        if let Some(routine) = self.routines.get(name) {
            return Ok(Some(DispatchPolicy::Routine(routine.clone())));
        }
        match self.mode {
            BindingMode::Strict => Err(StampError::UnboundRoutine {
                class: class.to_string(),
                routine: name.clone(),
            }),
            BindingMode::InspectOnly => Ok(Some(DispatchPolicy::Routine(placeholder(name)))),
        }
    }
}

fn placeholder(name: &str) -> Routine {
    let owned = name.to_string();
    Routine::new(name, move |target| {
        log::error!(
            "unbound routine `{}` invoked for class `{}` ({})",
            owned,
            target.class,
            target.stamp
        );
        panic!("unbound routine `{}` invoked for class `{}`", owned, target.class);
    })
}

/// A complete layout artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutArtifact {
    #[serde(default = "format_version")]
    pub format: u32,
    pub build_id: String,
    pub classes: Vec<ClassRecord>,
}

impl LayoutArtifact {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            format: FORMAT_VERSION,
            build_id: build_id.into(),
            classes: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: LayoutArtifact = serde_json::from_str(json)?;
        artifact.check_format()?;
        Ok(artifact)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("reading layout artifact {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn check_format(&self) -> Result<()> {
        if self.format != FORMAT_VERSION {
            return Err(StampError::Artifact(format!(
                "unsupported format {} (expected {})",
                self.format, FORMAT_VERSION
            )));
        }
        if self.build_id.trim().is_empty() {
            return Err(StampError::Artifact("empty build id".to_string()));
        }
        Ok(())
    }

    /// Write out the tables of `metadata` as an artifact, with stamps
    ///
    /// Policies equal to the class's default are written as default.
    pub fn from_metadata(build_id: impl Into<String>, metadata: &GcMetadata) -> Self {
        let registry = metadata.registry();
        let name_of = |stamp: StampId| {
            registry
                .descriptor(stamp)
                .map(|class| class.name.clone())
                .unwrap_or_default()
        };
        let record_of = |class: &ClassDescriptor, policy: Option<&DispatchPolicy>| match policy {
            Some(policy) if !same_policy(policy, &default_policy(class)) => PolicyRecord::from(policy),
            _ => PolicyRecord::Default,
        };

        let classes = registry
            .iter()
            .map(|class| ClassRecord {
                name: class.name.clone(),
                module: class.module.clone(),
                stamp: Some(class.stamp),
                range: Some(class.range),
                parent: class.parent.map(name_of),
                secondary: class.secondary.iter().copied().map(name_of).collect(),
                kind: class.kind,
                is_abstract: class.is_abstract,
                ambiguous: class.ambiguous,
                size: class.size,
                fields: metadata
                    .scan_table()
                    .descriptor(class.stamp)
                    .map(|descriptor| descriptor.fields().to_vec())
                    .unwrap_or_default(),
                finalize: record_of(class, metadata.finalize_table().policy(class.stamp)),
                deallocate: record_of(class, metadata.deallocate_table().policy(class.stamp)),
            })
            .collect();

        Self {
            format: FORMAT_VERSION,
            build_id: build_id.into(),
            classes,
        }
    }

    /// Turn the records into class specs, binding routine names
    pub fn into_specs(self, bindings: &RoutineBindings) -> Result<Vec<ClassSpec>> {
        self.classes
            .into_iter()
            .map(|record| {
                let mut spec = ClassSpec::new(record.to_decl());
                if !record.fields.is_empty() || record.size > 0 {
                    let mut layout = LayoutSpec::new(record.size);
                    for field in record.fields {
                        layout.push(field);
                    }
                    spec.layout = Some(layout);
                }
                spec.finalize = bindings.resolve(&record.name, &record.finalize)?;
                spec.deallocate = bindings.resolve(&record.name, &record.deallocate)?;
                Ok(spec)
            })
            .collect()
    }

    /// Build metadata from this artifact
    pub fn load(self, config: MetadataConfig, bindings: &RoutineBindings) -> Result<GcMetadata> {
        let build_id = self.build_id.clone();
        let specs = self.into_specs(bindings)?;
        let mut builder = GcMetadata::builder(config);
        builder.classes(specs);
        let metadata = builder.build()?;

        log_event(MetadataEvent::ArtifactLoaded {
            build_id,
            classes: metadata.registry().len(),
        });
        Ok(metadata)
    }
}

fn same_policy(a: &DispatchPolicy, b: &DispatchPolicy) -> bool {
    match (a, b) {
        (DispatchPolicy::Trivial, DispatchPolicy::Trivial)
        | (DispatchPolicy::Forbidden, DispatchPolicy::Forbidden) => true,
        (DispatchPolicy::Routine(x), DispatchPolicy::Routine(y)) => x.name() == y.name(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Origin;

    const ARTIFACT: &str = r#"{
        "build_id": "test-1",
        "classes": [
            { "name": "Object", "abstract": true },
            { "name": "Cons", "parent": "Object", "secondary": ["Sequence"], "size": 32,
              "fields": [ { "name": "car", "offset": 16, "kind": "tagged" },
                          { "name": "cdr", "offset": 24, "kind": "tagged" } ] },
            { "name": "FileStream", "parent": "Object", "size": 24,
              "fields": [ { "name": "fd", "offset": 16, "kind": "data", "width": 8 } ],
              "finalize": { "routine": "close-stream" } },
            { "name": "Sequence", "kind": "abstract-mixin" }
        ]
    }"#;

    #[test]
    fn test_policy_record_json() {
        assert_eq!(serde_json::to_string(&PolicyRecord::Trivial).unwrap(), r#""trivial""#);
        assert_eq!(
            serde_json::to_string(&PolicyRecord::Routine("close".into())).unwrap(),
            r#"{"routine":"close"}"#
        );
    }

    #[test]
    fn test_load_with_bindings() {
        let mut bindings = RoutineBindings::new();
        bindings.bind(Routine::new("close-stream", |_| {}));

        let metadata = LayoutArtifact::from_json(ARTIFACT)
            .unwrap()
            .load(MetadataConfig::default(), &bindings)
            .unwrap();

        let cons = metadata.lookup("Cons").unwrap();
        assert!(metadata.is_a(cons, "Sequence"));
        assert!(metadata.is_a(cons, "Object"));
        let stream = metadata.lookup("FileStream").unwrap();
        assert_eq!(
            metadata.finalize_table().policy(stream).and_then(|p| p.routine_name()),
            Some("close-stream")
        );
    }

    #[test]
    fn test_unbound_routine_rejected() {
        let err = LayoutArtifact::from_json(ARTIFACT)
            .unwrap()
            .load(MetadataConfig::default(), &RoutineBindings::new())
            .unwrap_err();
        match err {
            StampError::UnboundRoutine { class, routine } => {
                assert_eq!(class, "FileStream");
                assert_eq!(routine, "close-stream");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "unbound routine `close-stream`")]
    fn test_inspect_only_placeholder_panics_when_called() {
        let metadata = LayoutArtifact::from_json(ARTIFACT)
            .unwrap()
            .load(MetadataConfig::default(), &RoutineBindings::inspect_only())
            .unwrap();
        let stream = metadata.lookup("FileStream").unwrap();
        metadata.finalize_table().invoke(stream, 0x1000, Origin::Managed);
    }

    #[test]
    fn test_unsupported_format() {
        let json = r#"{ "format": 9, "build_id": "x", "classes": [] }"#;
        assert!(matches!(LayoutArtifact::from_json(json), Err(StampError::Artifact(_))));
    }

    #[test]
    fn test_from_metadata_reloads_with_same_stamps() {
        let mut bindings = RoutineBindings::new();
        bindings.bind(Routine::new("close-stream", |_| {}));
        let first = LayoutArtifact::from_json(ARTIFACT)
            .unwrap()
            .load(MetadataConfig::default(), &bindings)
            .unwrap();

        let written = LayoutArtifact::from_metadata("test-2", &first);
        assert!(written.classes.iter().all(|record| record.stamp.is_some()));
        let json = written.to_json_pretty().unwrap();

        let second = LayoutArtifact::from_json(&json)
            .unwrap()
            .load(MetadataConfig::default(), &bindings)
            .unwrap();
        for class in first.registry().iter() {
            assert_eq!(second.lookup(&class.name), Some(class.stamp));
            assert_eq!(second.registry().range_of(&class.name), Some(class.range));
        }
    }
}
