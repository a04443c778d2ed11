//! Shared helpers for stampt commands.

use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use stampgc::{GcMetadata, LayoutArtifact, MetadataConfig, RoutineBindings, StampId};

use crate::error::{Result, StamptError};

/// How command results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned, human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// An artifact rebuilt into metadata tables.
pub struct LoadedArtifact {
    pub build_id: String,
    pub metadata: GcMetadata,
}

/// Read an artifact and rebuild its tables.
///
/// Routines named by the artifact are bound to placeholders: stampt only
/// inspects tables and never dispatches.
pub fn load_artifact(path: &Path, config: &MetadataConfig) -> Result<LoadedArtifact> {
    tracing::debug!("loading artifact {}", path.display());
    let artifact = LayoutArtifact::from_path(path)?;
    let build_id = artifact.build_id.clone();
    let metadata = artifact.load(config.clone(), &RoutineBindings::inspect_only())?;
    Ok(LoadedArtifact { build_id, metadata })
}

/// Parse a stamp written as `12` or `#12`.
pub fn parse_stamp(text: &str) -> Option<StampId> {
    text.strip_prefix('#').unwrap_or(text).parse().ok().map(StampId)
}

/// Resolve a command-line class reference, given by stamp or by name.
pub fn resolve_class(metadata: &GcMetadata, reference: &str) -> Result<StampId> {
    let stamp = match parse_stamp(reference) {
        Some(stamp) => stamp,
        None => metadata
            .lookup(reference)
            .ok_or_else(|| StamptError::UnknownClass(reference.to_string()))?,
    };

    metadata
        .classify(stamp)
        .map(|class| class.stamp)
        .map_err(|_| StamptError::UnknownClass(reference.to_string()))
}

/// Print a serializable report as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampgc::standard::standard_metadata;

    #[test]
    fn test_parse_stamp() {
        assert_eq!(parse_stamp("12"), Some(StampId(12)));
        assert_eq!(parse_stamp("#3"), Some(StampId(3)));
        assert_eq!(parse_stamp("Cons"), None);
        assert_eq!(parse_stamp("#"), None);
    }

    #[test]
    fn test_resolve_class_by_name_and_stamp() {
        let metadata = standard_metadata().unwrap();
        let cons = metadata.lookup("Cons").unwrap();

        assert_eq!(resolve_class(&metadata, "Cons").unwrap(), cons);
        assert_eq!(resolve_class(&metadata, &format!("#{}", cons.get())).unwrap(), cons);
    }

    #[test]
    fn test_resolve_unknown_class() {
        let metadata = standard_metadata().unwrap();
        assert!(matches!(
            resolve_class(&metadata, "Widget"),
            Err(StamptError::UnknownClass(_))
        ));
        assert!(matches!(
            resolve_class(&metadata, "9999"),
            Err(StamptError::UnknownClass(_))
        ));
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }
}
