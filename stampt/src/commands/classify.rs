//! Classify and is-a commands.
//!
//! Both answer runtime questions against an artifact's tables, so a
//! suspicious stamp seen in a heap dump can be decoded offline.

use std::path::PathBuf;

use serde::Serialize;
use stampgc::StampRange;

use crate::commands::common::{load_artifact, print_json, resolve_class, OutputFormat};
use crate::config::Config;
use crate::error::{Result, StamptError};

/// Arguments for the classify command.
#[derive(Debug, Clone)]
pub struct ClassifyArgs {
    pub artifact: PathBuf,
    /// Stamp (`12` or `#12`) or class name.
    pub class: String,
    pub format: OutputFormat,
}

/// Arguments for the is-a command.
#[derive(Debug, Clone)]
pub struct IsAArgs {
    pub artifact: PathBuf,
    pub class: String,
    pub target: String,
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct Classification {
    stamp: u32,
    name: String,
    module: String,
    range: StampRange,
    /// The class followed by its primary ancestors
    primary_chain: Vec<String>,
    secondary_ancestors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct IsAReport {
    class: String,
    target: String,
    type_test: String,
    result: bool,
}

/// Run the classify command.
pub fn run_classify(args: ClassifyArgs, config: &Config) -> Result<()> {
    let loaded = load_artifact(&args.artifact, &config.metadata)?;
    let metadata = &loaded.metadata;
    let registry = metadata.registry();

    let stamp = resolve_class(metadata, &args.class)?;
    let class = metadata.classify(stamp)?;

    let report = Classification {
        stamp: class.stamp.get(),
        name: class.name.clone(),
        module: class.module.clone(),
        range: class.range,
        primary_chain: registry.primary_chain(stamp).map(|c| c.name.clone()).collect(),
        secondary_ancestors: class
            .secondary_ancestors
            .iter()
            .filter_map(|&s| registry.descriptor(s))
            .map(|c| c.name.clone())
            .collect(),
    };

    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("{} {} ({}) {}", class.stamp, report.name, report.module, report.range);
            println!("  primary:   {}", report.primary_chain.join(" < "));
            if !report.secondary_ancestors.is_empty() {
                println!("  secondary: {}", report.secondary_ancestors.join(", "));
            }
            Ok(())
        }
    }
}

/// Run the is-a command.
pub fn run_is_a(args: IsAArgs, config: &Config) -> Result<()> {
    let loaded = load_artifact(&args.artifact, &config.metadata)?;
    let metadata = &loaded.metadata;

    let stamp = resolve_class(metadata, &args.class)?;
    let target = metadata.classify(resolve_class(metadata, &args.target)?)?;
    let test = metadata
        .type_test(&target.name)
        .ok_or_else(|| StamptError::UnknownClass(target.name.clone()))?;

    let report = IsAReport {
        class: metadata.classify(stamp)?.name.clone(),
        target: target.name.clone(),
        type_test: test.to_string(),
        result: metadata.is_a(stamp, &target.name),
    };

    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("{}", report.result);
            tracing::debug!("{} is-a {} via {}", report.class, report.target, report.type_test);
            Ok(())
        }
    }
}
