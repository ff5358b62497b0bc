pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::LocalStorage;

pub use app::{SnapshotOutcome, SnapshotService};
pub use core::dominance::compute_dominance;
pub use core::parser::parse;
pub use core::{engine::DominanceEngine, pipeline::ReportPipeline};
pub use utils::error::{DominanceError, Result};
