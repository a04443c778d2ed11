//! Check command implementation.
//!
//! Rebuilds every table from an artifact. Any layout, numbering or dispatch
//! defect surfaces here as the same error the runtime would raise at
//! startup.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use stampgc::MetadataSummary;

use crate::commands::common::{load_artifact, print_json, OutputFormat};
use crate::config::Config;
use crate::error::{Result, StamptError};

/// Arguments for the check command.
#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub artifact: PathBuf,
    /// Fail unless the artifact carries this build id.
    pub expect_build_id: Option<String>,
    pub format: OutputFormat,
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    artifact: String,
    build_id: String,
    summary: MetadataSummary,
}

/// Run the check command.
pub fn run_check(args: CheckArgs, config: &Config) -> Result<()> {
    let start_time = Instant::now();
    let loaded = load_artifact(&args.artifact, &config.metadata)?;

    if let Some(expected) = &args.expect_build_id {
        if &loaded.build_id != expected {
            return Err(StamptError::Validation(format!(
                "artifact was produced by build `{}`, expected `{}`",
                loaded.build_id, expected
            )));
        }
    }

    let report = CheckReport {
        artifact: args.artifact.display().to_string(),
        build_id: loaded.build_id,
        summary: loaded.metadata.summary(),
    };

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_text(&report),
    }

    if args.verbose {
        eprintln!("Completed in {:.2}s", start_time.elapsed().as_secs_f64());
    }
    Ok(())
}

fn print_text(report: &CheckReport) {
    let summary = &report.summary;
    println!("{}: ok (build {})", report.artifact, report.build_id);
    println!("  classes:          {}", summary.classes);
    println!("  not instantiable: {}", summary.abstract_classes);
    println!("  ambiguous:        {}", summary.ambiguous);
    println!("  max stamp:        {}", summary.max_stamp);
    println!("  scan descriptors: {}", summary.scan_descriptors);
    println!("  traced slots:     {}", summary.traced_slots);
    println!("  routines:         {}", summary.routines);
    println!("  forbidden:        {}", summary.forbidden);
}
