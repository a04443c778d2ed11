//! Export command implementation.
//!
//! Writes the runtime's standard hierarchy as a layout artifact, the
//! starting point for extension modules and the fixture other commands
//! are tested against.

use std::path::PathBuf;

use stampgc::standard::{standard_metadata_with, StandardRoutines};
use stampgc::LayoutArtifact;

use crate::config::Config;
use crate::error::{Result, StamptError};

/// Arguments for the export command.
#[derive(Debug, Clone)]
pub struct ExportArgs {
    /// Destination file; stdout when absent.
    pub output: Option<PathBuf>,
    pub build_id: String,
    pub force: bool,
}

/// Run the export command.
pub fn run_export(args: ExportArgs, config: &Config) -> Result<()> {
    let metadata = standard_metadata_with(config.metadata.clone(), &StandardRoutines::default())?;
    let json = LayoutArtifact::from_metadata(args.build_id.as_str(), &metadata).to_json_pretty()?;

    match &args.output {
        Some(path) => {
            if path.exists() && !args.force {
                return Err(StamptError::Validation(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            std::fs::write(path, json)?;
            tracing::info!("wrote {} classes to {}", metadata.registry().len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
