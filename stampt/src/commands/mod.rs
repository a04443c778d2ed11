//! Command modules for the stampt CLI.
//!
//! Every command except `export` reads a layout artifact and rebuilds the
//! metadata tables from it before answering.

pub mod common;

pub mod check;
pub mod classify;
pub mod dump;
pub mod export;

pub use check::{run_check, CheckArgs};
pub use classify::{run_classify, run_is_a, ClassifyArgs, IsAArgs};
pub use dump::{run_dump, DumpArgs};
pub use export::{run_export, ExportArgs};
