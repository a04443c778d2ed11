//! Dump command implementation.
//!
//! Prints the rebuilt tables one class per row: numbering, type test,
//! scan descriptor shape and both dispatch entries.

use std::path::PathBuf;

use serde::Serialize;
use stampgc::{ClassDescriptor, DispatchTable, GcMetadata, StampId, StampRange};

use crate::commands::common::{load_artifact, print_json, resolve_class, OutputFormat};
use crate::config::Config;
use crate::error::Result;

/// Arguments for the dump command.
#[derive(Debug, Clone)]
pub struct DumpArgs {
    pub artifact: PathBuf,
    /// Restrict output to one class, by name or stamp.
    pub class: Option<String>,
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ClassRow {
    stamp: u32,
    range: StampRange,
    name: String,
    module: String,
    kind: String,
    #[serde(rename = "abstract")]
    is_abstract: bool,
    ambiguous: bool,
    parent: Option<String>,
    secondary: Vec<String>,
    size: usize,
    type_test: String,
    traced_slots: Option<usize>,
    trailing_stride: Option<usize>,
    finalize: String,
    deallocate: String,
}

impl ClassRow {
    fn new(metadata: &GcMetadata, class: &ClassDescriptor) -> Self {
        let registry = metadata.registry();
        let name_of = |stamp: StampId| registry.descriptor(stamp).map(|c: &ClassDescriptor| c.name.clone());
        let scan = metadata.scan_table().descriptor(class.stamp);
        let policy = |table: &DispatchTable| {
            table
                .policy(class.stamp)
                .map_or_else(|| "-".to_string(), |policy| policy.to_string())
        };

        Self {
            stamp: class.stamp.get(),
            range: class.range,
            name: class.name.clone(),
            module: class.module.clone(),
            kind: class.kind.to_string(),
            is_abstract: class.is_abstract,
            ambiguous: class.ambiguous,
            parent: class.parent.and_then(name_of),
            secondary: class.secondary.iter().filter_map(|&s| name_of(s)).collect(),
            size: class.size,
            type_test: metadata
                .type_test(&class.name)
                .map_or_else(|| "-".to_string(), |test| test.to_string()),
            traced_slots: scan.map(|d| d.traced_slot_count()),
            trailing_stride: scan.and_then(|d| d.trailing()).map(|t| t.stride),
            finalize: policy(metadata.finalize_table()),
            deallocate: policy(metadata.deallocate_table()),
        }
    }
}

/// Run the dump command.
pub fn run_dump(args: DumpArgs, config: &Config) -> Result<()> {
    let loaded = load_artifact(&args.artifact, &config.metadata)?;
    let metadata = &loaded.metadata;

    let rows: Vec<ClassRow> = match &args.class {
        Some(reference) => {
            let stamp = resolve_class(metadata, reference)?;
            let class = metadata.classify(stamp)?;
            vec![ClassRow::new(metadata, class)]
        }
        None => metadata
            .registry()
            .iter()
            .map(|class| ClassRow::new(metadata, class))
            .collect(),
    };

    match args.format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Text => {
            print_table(&loaded.build_id, &rows);
            Ok(())
        }
    }
}

fn print_table(build_id: &str, rows: &[ClassRow]) {
    let width = rows.iter().map(|row| row.name.len()).max().unwrap_or(0).max(5) + 1;

    println!("# build {}", build_id);
    println!(
        "{:>5}  {:<10}  {:<width$}  {:<17}  {:>5}  {:>5}  {:<28}  {:<22}  deallocate",
        "stamp", "range", "class", "kind", "size", "slots", "type test", "finalize"
    );
    for row in rows {
        let mut name = row.name.clone();
        if row.ambiguous {
            name.push('*');
        }
        println!(
            "{:>5}  {:<10}  {:<width$}  {:<17}  {:>5}  {:>5}  {:<28}  {:<22}  {}",
            row.stamp,
            row.range.to_string(),
            name,
            row.kind,
            row.size,
            row.traced_slots.map_or_else(|| "-".to_string(), |n| n.to_string()),
            row.type_test,
            row.finalize,
            row.deallocate,
        );
    }
}
